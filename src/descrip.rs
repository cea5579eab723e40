//! SPM keeps acquisition parameters in the free-text `descrip` field, as in
//! `TR=2000ms TE=30ms FA=90deg 12-Mar-2011 10:20:30`.

use crate::property::PropertyMap;
use chrono::{NaiveDate, NaiveDateTime};
use log::{info, warn};
use regex::Regex;
use std::sync::OnceLock;

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

const TIMESTAMP_FORMAT: &str = "%d-%b-%Y %H:%M:%S";

fn spm_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^.*TR=(\d+)ms.*TE=(\d+)ms.*FA=(\d+)deg *(\d{1,2}).(\w{3}).(\d{4}) *(\d{1,2}):(\d{1,2}):(\d{1,2}).*$",
        )
        .expect("the SPM description pattern is valid")
    })
}

fn month_number(name: &str) -> Option<u32> {
    MONTHS
        .iter()
        .position(|m| m.eq_ignore_ascii_case(name))
        .map(|i| i as u32 + 1)
}

/// Parse an SPM-style description into `repetitionTime`, `echoTime`
/// (both in ms), `flipAngle` (degrees) and `sequenceStart`.
///
/// Returns `false` and leaves `props` untouched if the text does not
/// follow the pattern.
pub fn parse_spm_description(props: &mut PropertyMap, descrip: &str) -> bool {
    let caps = match spm_pattern().captures(descrip) {
        Some(caps) => caps,
        None => return false,
    };
    let number = |i: usize| caps[i].parse::<i64>().ok();
    let (tr, te, fa) = match (number(1), number(2), number(3)) {
        (Some(tr), Some(te), Some(fa)) => (tr, te, fa),
        _ => return false,
    };
    let _ = props.set("repetitionTime", tr);
    let _ = props.set("echoTime", te);
    let _ = props.set("flipAngle", fa);

    let field = |i: usize| caps[i].parse::<u32>().ok();
    let start = month_number(&caps[5])
        .zip(caps[6].parse::<i32>().ok())
        .and_then(|(month, year)| NaiveDate::from_ymd_opt(year, month, field(4)?))
        .and_then(|date| date.and_hms_opt(field(7)?, field(8)?, field(9)?));
    match start {
        Some(start) => {
            let _ = props.set("sequenceStart", start);
        }
        None => warn!(
            "Ignoring the invalid timestamp {}-{}-{} {}:{}:{} in the SPM description",
            &caps[4], &caps[5], &caps[6], &caps[7], &caps[8], &caps[9]
        ),
    }

    info!(
        "Using TR={}ms, TE={}ms, flipAngle={}deg and sequenceStart={:?} from SPM description",
        tr, te, fa, start
    );
    true
}

/// Encode `repetitionTime`, `echoTime`, `flipAngle` and `sequenceStart`
/// the way SPM does. Missing properties are left out.
pub fn store_spm_description(props: &PropertyMap) -> String {
    let mut parts = Vec::new();
    for (key, name, unit) in [
        ("TR", "repetitionTime", "ms"),
        ("TE", "echoTime", "ms"),
        ("FA", "flipAngle", "deg"),
    ] {
        if let Some(v) = props.get_f64(name) {
            parts.push(format!("{}={}{}", key, v.round() as i64, unit));
        }
    }
    if let Some(start) = props.get("sequenceStart").and_then(|v| v.as_timestamp()) {
        parts.push(format_timestamp(&start));
    }
    parts.join(" ")
}

fn format_timestamp(t: &NaiveDateTime) -> String {
    t.format(TIMESTAMP_FORMAT).to_string()
}
