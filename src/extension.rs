//! This module contains definitions for the extension and related types.
//! Extensions are optional data frames sitting before the voxel data.
//! When present, an extender frame of 4 bytes is also present at the
//! end of the NIFTI-1 header, with the first byte set to something
//! other than 0.
//!
//! The only extension interpreted here is DcmMeta (code 0), a JSON
//! document holding the DICOM attributes of the source series. Its
//! content is flattened into the property map under `DcmMeta/`.

use crate::error::Result;
use crate::property::{PropertyMap, PropertyValue};
use crate::util::trim_nul;
use byteordered::{ByteOrdered, Endianness};
use log::{debug, warn};

/// Extension code of DcmMeta documents.
pub const ECODE_DCMMETA: i32 = 0;
/// Extension code of embedded DICOM attributes.
pub const ECODE_DICOM: i32 = 2;
/// Extension code of AFNI attributes.
pub const ECODE_AFNI: i32 = 4;

/// Data type for the extender code.
#[derive(Debug, Default, PartialEq, Clone, Copy)]
pub struct Extender([u8; 4]);

impl Extender {
    /// Fetch the extender code which follows a header of `sizeof_hdr`
    /// bytes. A buffer ending before it yields an empty extender.
    pub fn from_buffer(buf: &[u8], sizeof_hdr: usize) -> Self {
        let mut extender = [0u8; 4];
        if let Some(bytes) = buf.get(sizeof_hdr..sizeof_hdr + 4) {
            extender.copy_from_slice(bytes);
        }
        Extender(extender)
    }

    /// Whether extensions should exist upon this extender code.
    pub fn has_extensions(&self) -> bool {
        self.0[0] != 0
    }

    /// Get the extender's bytes
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl From<[u8; 4]> for Extender {
    fn from(extender: [u8; 4]) -> Self {
        Extender(extender)
    }
}

/// Data type for the raw contents of an extension.
#[derive(Debug, PartialEq, Clone)]
pub struct Extension {
    ecode: i32,
    edata: Vec<u8>,
}

impl Extension {
    /// Create an extension out of its code and data.
    pub fn new(ecode: i32, edata: Vec<u8>) -> Self {
        Extension { ecode, edata }
    }

    /// The claimed extension raw size (`esize` field).
    pub fn size(&self) -> usize {
        8 + self.edata.len()
    }

    /// Obtain the extension's code (`ecode` field).
    pub fn code(&self) -> i32 {
        self.ecode
    }

    /// Obtain the extension's data (`edata` field).
    pub fn data(&self) -> &[u8] {
        &self.edata
    }
}

/// Data type for aggregating the extender code and
/// all extensions.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct ExtensionSequence {
    extender: Extender,
    extensions: Vec<Extension>,
}

impl<'a> IntoIterator for &'a ExtensionSequence {
    type Item = &'a Extension;
    type IntoIter = ::std::slice::Iter<'a, Extension>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl ExtensionSequence {
    /// Collect the extensions between the end of the header and
    /// `vox_offset`. Integer fields are read with the file's byte order.
    ///
    /// A block claiming less than 8 bytes or reaching past `vox_offset`
    /// ends the sequence with a warning; blocks read so far are kept.
    pub fn from_buffer(
        buf: &[u8],
        sizeof_hdr: usize,
        vox_offset: usize,
        endianness: Endianness,
    ) -> Self {
        let extender = Extender::from_buffer(buf, sizeof_hdr);
        let mut extensions = Vec::new();
        if extender.has_extensions() {
            let end = vox_offset.min(buf.len());
            let mut pos = sizeof_hdr + 4;
            while pos + 8 <= end {
                let mut source = ByteOrdered::runtime(&buf[pos..pos + 8], endianness);
                let (esize, ecode) = match (source.read_i32(), source.read_i32()) {
                    (Ok(esize), Ok(ecode)) => (esize, ecode),
                    _ => break,
                };
                if esize < 8 || pos + esize as usize > end {
                    warn!(
                        "Invalid extension size {} at offset {}, ignoring the remaining extensions",
                        esize, pos
                    );
                    break;
                }
                let edata = buf[pos + 8..pos + esize as usize].to_vec();
                extensions.push(Extension::new(ecode, edata));
                pos += esize as usize;
            }
        }

        ExtensionSequence {
            extender,
            extensions,
        }
    }

    /// Obtain an iterator to the extensions.
    pub fn iter(&self) -> ::std::slice::Iter<Extension> {
        self.extensions.iter()
    }

    /// Whether the sequence of extensions is empty.
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    /// Obtain the number of extensions available.
    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    /// Get the extender code from this extension sequence.
    pub fn extender(&self) -> Extender {
        self.extender
    }
}

fn flatten_json(path: &str, value: &serde_json::Value, out: &mut PropertyMap) {
    match value {
        serde_json::Value::Object(members) => {
            for (key, member) in members {
                let key = key.replace('.', "/");
                let child = if path.is_empty() {
                    key
                } else {
                    format!("{}/{}", path, key)
                };
                flatten_json(&child, member, out);
            }
        }
        leaf => {
            match PropertyValue::from_json(leaf) {
                Some(v) => {
                    let _ = out.set(path, v);
                }
                None if leaf.is_array() => debug!("dropping {}: the list has missing entries", path),
                None => {}
            }
        }
    }
}

/// Decode a DcmMeta document into a flat property map. Nested objects
/// become path components, as do dots in member names.
pub fn decode_dcmmeta(edata: &[u8]) -> Result<PropertyMap> {
    let json: serde_json::Value = serde_json::from_slice(trim_nul(edata))?;
    let mut props = PropertyMap::new();
    flatten_json("", &json, &mut props);
    Ok(props)
}

/// Read the extensions of a file into `props`. DcmMeta documents are
/// merged under `DcmMeta/`; other extensions are skipped.
///
/// Returns whether any DcmMeta content was merged.
pub fn read_extensions(
    buf: &[u8],
    sizeof_hdr: usize,
    vox_offset: usize,
    endianness: Endianness,
    props: &mut PropertyMap,
) -> bool {
    let mut merged = false;
    for extension in &ExtensionSequence::from_buffer(buf, sizeof_hdr, vox_offset, endianness) {
        match extension.code() {
            ECODE_DCMMETA => match decode_dcmmeta(extension.data()) {
                Ok(meta) => {
                    debug!("merging {} DcmMeta entries", meta.len());
                    props.merge_branch("DcmMeta", meta);
                    merged = true;
                }
                Err(e) => warn!("Skipping DcmMeta extension: {}", e),
            },
            ECODE_DICOM => warn!("Skipping DICOM extension, it is not supported"),
            ECODE_AFNI => warn!("Skipping AFNI extension, it is not supported"),
            code => warn!("Skipping unknown extension code {}", code),
        }
    }
    merged
}
