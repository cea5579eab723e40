//! Translation of DICOM attributes into the crate's property names.
//!
//! DcmMeta documents arrive flattened under `DcmMeta/` (see the
//! extension module). Series-wide attributes live in
//! `DcmMeta/global/const`, per-slice lists in `DcmMeta/global/slices`.
//! Whatever is not translated ends up under `DICOM/`.

use crate::property::{PropertyMap, PropertyValue};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use log::{debug, info, warn};

const CONST_PREFIX: &str = "DcmMeta/global/const";
const SLICES_PREFIX: &str = "DcmMeta/global/slices";
const REJECTED_PREFIX: &str = "DcmMeta/global/rejected_slices";

/// Attributes with a direct counterpart, under both their current and
/// their pre-2008 DICOM keywords.
const PLAIN_NAMES: [(&[&str], &str); 8] = [
    (&["SeriesDescription"], "sequenceDescription"),
    (&["PatientName", "PatientsName"], "subjectName"),
    (&["PatientWeight", "PatientsWeight"], "subjectWeight"),
    (
        &["PerformingPhysicianName", "PerformingPhysiciansName"],
        "performingPhysician",
    ),
    (&["NumberOfAverages"], "numberOfAverages"),
    (&["EchoTime"], "echoTime"),
    (&["FlipAngle"], "flipAngle"),
    (
        &["CsaImage/UsedChannelMask", "CSAImageHeaderInfo/UsedChannelMask"],
        "coilChannelMask",
    ),
];

fn parse_digits(text: &str, range: std::ops::Range<usize>) -> Option<u32> {
    match text.get(range) {
        Some(s) if !s.is_empty() => s.parse().ok(),
        _ => Some(0),
    }
}

/// Parse a DICOM time (`TM`, `HHMMSS.FFFFFF`, colons allowed) given as
/// text or as a JSON number.
pub fn parse_tm(value: &PropertyValue) -> Option<NaiveTime> {
    let text = match value {
        PropertyValue::Text(s) => s.trim().replace(':', ""),
        PropertyValue::Int(i) => format!("{:06}", i),
        PropertyValue::Float(f) => format!("{:013.6}", f),
        _ => return None,
    };
    let (whole, frac) = text.split_once('.').unwrap_or((&text, ""));
    if whole.len() < 2 || whole.len() > 6 || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hour = parse_digits(whole, 0..2)?;
    let minute = parse_digits(whole, 2..4)?;
    let second = parse_digits(whole, 4..6)?;
    let nanos = if frac.is_empty() {
        0
    } else {
        (format!("0.{}", frac).parse::<f64>().ok()? * 1e9).round() as u32
    };
    NaiveTime::from_hms_nano_opt(hour, minute, second, nanos)
}

/// Parse a DICOM date (`DA`, `YYYYMMDD`).
pub fn parse_da(value: &PropertyValue) -> Option<NaiveDate> {
    let text = match value {
        PropertyValue::Text(s) => s.trim().to_string(),
        PropertyValue::Int(i) => i.to_string(),
        _ => return None,
    };
    NaiveDate::parse_from_str(&text, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(&text, "%Y-%m-%d"))
        .ok()
}

fn leading_number(value: &PropertyValue) -> Option<i64> {
    value.as_i64().or_else(|| {
        let text = value.as_str()?;
        let digits: String = text.trim().chars().take_while(char::is_ascii_digit).collect();
        digits.parse().ok()
    })
}

fn gender(value: &PropertyValue) -> Option<&'static str> {
    match value.as_str()?.trim().chars().next()? {
        'M' => Some("male"),
        'F' => Some("female"),
        'O' => Some("other"),
        _ => None,
    }
}

fn millis_between(start: NaiveDateTime, end: NaiveDateTime) -> f64 {
    let delta = end - start;
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1000.,
        None => delta.num_milliseconds() as f64,
    }
}

/// The date found first among `names` in `tree`, consuming it.
fn take_date(tree: &mut PropertyMap, names: &[&str]) -> Option<NaiveDate> {
    for name in names {
        if let Some(date) = tree.get(name).and_then(parse_da) {
            let _ = tree.remove(name);
            return Some(date);
        }
    }
    None
}

/// A day for times without a date, so differences of times stay valid.
fn undated() -> NaiveDate {
    NaiveDate::from_ymd_opt(1400, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Move the first of `names` found in `tree` to `target` in `props`.
/// Existing values in `props` are only replaced if `overwrite` is set.
fn transform<F>(
    tree: &mut PropertyMap,
    names: &[&str],
    props: &mut PropertyMap,
    target: &str,
    overwrite: bool,
    convert: F,
) where
    F: Fn(&PropertyValue) -> Option<PropertyValue>,
{
    let name = match names.iter().find(|n| tree.contains(n)) {
        Some(name) => *name,
        None => return,
    };
    if !overwrite && props.contains(target) {
        debug!("keeping {}, not replacing it by {}", target, name);
        return;
    }
    match tree.get(name).and_then(|v| convert(v)) {
        Some(value) => {
            let _ = props.set(target, value);
            let _ = tree.remove(name);
        }
        None => warn!("Cannot interpret DICOM attribute {} as {}", name, target),
    }
}

fn translate_names(tree: &mut PropertyMap, props: &mut PropertyMap, overwrite: bool) {
    transform(tree, &["SeriesNumber"], props, "sequenceNumber", true, |v| {
        v.as_i64().map(PropertyValue::Int)
    });
    transform(tree, &["PatientAge", "PatientsAge"], props, "subjectAge", overwrite, |v| {
        leading_number(v).map(PropertyValue::Int)
    });
    transform(
        tree,
        &["PatientBirthDate", "PatientsBirthDate"],
        props,
        "subjectBirth",
        overwrite,
        |v| {
            parse_da(v)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(PropertyValue::Timestamp)
        },
    );
    transform(tree, &["PatientSex", "PatientsSex"], props, "subjectGender", overwrite, |v| {
        gender(v).map(PropertyValue::from)
    });
    for (names, target) in PLAIN_NAMES.iter() {
        transform(tree, names, props, target, overwrite, |v| Some(v.clone()));
    }
}

fn translate_const(props: &mut PropertyMap) {
    let mut tree = props.branch(CONST_PREFIX);
    let _ = props.remove_branch(CONST_PREFIX);

    if let Some(time) = tree.get("SeriesTime").and_then(parse_tm) {
        let _ = tree.remove("SeriesTime");
        let date = take_date(&mut tree, &["SeriesDate", "AcquisitionDate"]).unwrap_or_else(undated);
        let start = date.and_time(time);

        if let Some(acquired) = tree.get("AcquisitionTime").and_then(parse_tm) {
            let _ = tree.remove("AcquisitionTime");
            let date = take_date(&mut tree, &["AcquisitionDate", "SeriesDate"]).unwrap_or(date);
            let distance = millis_between(start, date.and_time(acquired));
            debug!("computed acquisitionTime {} from AcquisitionTime", distance);
            let _ = props.set("acquisitionTime", distance);
        }
        debug!("computed sequenceStart {} from SeriesTime", start);
        let _ = props.set("sequenceStart", start);
    } else if tree.contains("SeriesTime") {
        warn!("Cannot parse SeriesTime {:?}", tree.get("SeriesTime"));
    }

    translate_names(&mut tree, props, true);
    props.merge_branch("DICOM", tree);
}

fn translate_slices(props: &mut PropertyMap, slices: usize) {
    let mut tree = props.branch(SLICES_PREFIX);
    let _ = props.remove_branch(SLICES_PREFIX);

    if tree.contains("ContentTime") {
        let times = tree.get_list("ContentTime").map(|l| l.to_vec()).unwrap_or_default();
        let dates = tree.get_list("ContentDate").map(|l| l.to_vec());
        match props.get("sequenceStart").and_then(PropertyValue::as_timestamp) {
            Some(start) => {
                let distances: Option<Vec<PropertyValue>> = times
                    .iter()
                    .enumerate()
                    .map(|(i, t)| {
                        let time = parse_tm(t)?;
                        let date = dates
                            .as_ref()
                            .and_then(|d| d.get(i))
                            .and_then(parse_da)
                            .unwrap_or_else(|| start.date());
                        Some(PropertyValue::Float(millis_between(start, date.and_time(time))))
                    })
                    .collect();
                match distances {
                    Some(distances) if !distances.is_empty() => {
                        let _ = props.set("acquisitionTime", distances);
                        let _ = tree.remove("ContentTime");
                        let _ = tree.remove("ContentDate");
                    }
                    _ => warn!("Cannot parse the per-slice ContentTime list"),
                }
            }
            None => warn!("Don't have sequenceStart, can't compute acquisitionTime from ContentTime"),
        }
    }

    if let Some(first) = tree.get_list("ImagePositionPatient").and_then(|l| l.first()) {
        if let Some(position) = first.as_vector3() {
            if let Some(computed) = props.get_vector3("indexOrigin") {
                let off = computed
                    .iter()
                    .zip(&position)
                    .any(|(a, b)| (a - b).abs() > 1e-3 * a.abs().max(1.));
                if off {
                    warn!(
                        "The slice position given in ImagePositionPatient {:?} does not fit the one computed from the header {:?}",
                        position, computed
                    );
                }
            }
            let _ = props.set("indexOrigin", position);
            let _ = tree.remove("ImagePositionPatient");
        }
    }

    if let Some(numbers) = tree.get_list("InstanceNumber").map(|l| l.to_vec()) {
        if slices > 0 && numbers.len() % slices == 0 {
            if tree.get("AcquisitionNumber") == tree.get("InstanceNumber") {
                let _ = tree.remove("AcquisitionNumber");
            }
            let _ = props.set("acquisitionNumber", numbers);
            let _ = tree.remove("InstanceNumber");
        } else {
            warn!(
                "The length of InstanceNumber ({}) does not fit the number of slices ({})",
                numbers.len(),
                slices
            );
        }
    }

    for (name, value) in &tree {
        let target = format!("DICOM/{}", name);
        let path = if props.contains(&target) {
            format!("{}/{}", REJECTED_PREFIX, name)
        } else {
            target
        };
        let _ = props.set(path, value.clone());
    }
}

/// Translate a merged DcmMeta document into regular properties. Series
/// attributes end up under `DICOM/`, so does every per-slice list which
/// does not collide with one of them.
///
/// Returns whether the slice ordering (`acquisitionNumber`) was taken
/// from the metadata.
pub fn translate_dcmmeta(props: &mut PropertyMap, slices: usize) -> bool {
    if !props.contains_branch("DcmMeta") {
        return false;
    }
    translate_const(props);
    translate_slices(props, slices);

    // vendor protocol dumps are huge and useless here
    let protocols: Vec<String> = props
        .iter()
        .map(|(k, _)| k)
        .filter(|k| k.contains("MrPhoenixProtocol"))
        .cloned()
        .collect();
    for key in protocols {
        let _ = props.remove(&key);
    }

    let from_meta = props.contains("acquisitionNumber");
    info!(
        "translated DcmMeta extension, slice ordering {}",
        if from_meta { "taken from metadata" } else { "not available" }
    );
    from_meta
}

/// Move well known attributes under `DICOM/` to their property names.
/// Only `sequenceNumber` is overwritten, everything else is kept if set.
pub fn sanitise(props: &mut PropertyMap) {
    if !props.contains_branch("DICOM") {
        return;
    }
    let mut tree = props.branch("DICOM");
    let _ = props.remove_branch("DICOM");

    if !props.contains("indexOrigin") {
        if let Some(position) = tree.get_vector3("ImagePositionPatient") {
            let _ = props.set("indexOrigin", position);
            let _ = tree.remove("ImagePositionPatient");
        }
    }
    translate_names(&mut tree, props, false);
    props.merge_branch("DICOM", tree);
}
