//! Hierarchical property store attached to every volume.
//!
//! Keys are `/`-separated paths such as `DICOM/RescaleSlope` or
//! `nifti/sform_code`. A branch is the set of entries sharing a path prefix.

use chrono::NaiveDateTime;
use std::collections::btree_map::{self, BTreeMap};

/// A single property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// Boolean flag
    Bool(bool),
    /// Integer number
    Int(i64),
    /// Floating point number
    Float(f64),
    /// Text
    Text(String),
    /// 3-vector, used for geometry
    Vector3([f64; 3]),
    /// 4-vector
    Vector4([f64; 4]),
    /// Date and time without time zone
    Timestamp(NaiveDateTime),
    /// Heterogeneous list
    List(Vec<PropertyValue>),
}

impl PropertyValue {
    /// Numeric view of this value. Booleans count as 0 or 1, and a
    /// one-element list is seen through.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Int(v) => Some(*v as f64),
            PropertyValue::Float(v) => Some(*v),
            PropertyValue::Bool(v) => Some(if *v { 1. } else { 0. }),
            PropertyValue::Text(s) => s.trim().parse().ok(),
            PropertyValue::List(l) if l.len() == 1 => l[0].as_f64(),
            _ => None,
        }
    }

    /// Integer view of this value. Floats are accepted only if integral.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(v) => Some(*v),
            PropertyValue::Float(v) if v.fract() == 0. => Some(*v as i64),
            PropertyValue::Bool(v) => Some(*v as i64),
            PropertyValue::Text(s) => s.trim().parse().ok(),
            PropertyValue::List(l) if l.len() == 1 => l[0].as_i64(),
            _ => None,
        }
    }

    /// Text view of this value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// 3-vector view of this value. Lists of three numbers are accepted.
    pub fn as_vector3(&self) -> Option<[f64; 3]> {
        match self {
            PropertyValue::Vector3(v) => Some(*v),
            PropertyValue::List(l) if l.len() == 3 => {
                let mut v = [0.; 3];
                for (d, s) in v.iter_mut().zip(l) {
                    *d = s.as_f64()?;
                }
                Some(v)
            }
            _ => None,
        }
    }

    /// List view of this value.
    pub fn as_list(&self) -> Option<&[PropertyValue]> {
        match self {
            PropertyValue::List(l) => Some(l),
            _ => None,
        }
    }

    /// Timestamp view of this value.
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            PropertyValue::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    /// Convert a JSON leaf or array. Objects and `null` have no value
    /// counterpart and yield `None`, so does any array holding one of them:
    /// skipping an element would shift the positions of the others.
    pub fn from_json(value: &serde_json::Value) -> Option<PropertyValue> {
        use serde_json::Value;
        match value {
            Value::Bool(b) => Some(PropertyValue::Bool(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(PropertyValue::Int)
                .or_else(|| n.as_f64().map(PropertyValue::Float)),
            Value::String(s) => Some(PropertyValue::Text(s.clone())),
            Value::Array(a) => a
                .iter()
                .map(PropertyValue::from_json)
                .collect::<Option<Vec<_>>>()
                .map(PropertyValue::List),
            Value::Null | Value::Object(_) => None,
        }
    }
}

macro_rules! impl_from {
    ($t: ty, $variant: ident) => {
        impl From<$t> for PropertyValue {
            fn from(v: $t) -> Self {
                PropertyValue::$variant(v.into())
            }
        }
    };
}

impl_from!(bool, Bool);
impl_from!(i64, Int);
impl_from!(i32, Int);
impl_from!(i16, Int);
impl_from!(f64, Float);
impl_from!(f32, Float);
impl_from!(String, Text);
impl_from!(&str, Text);
impl_from!([f64; 3], Vector3);
impl_from!([f64; 4], Vector4);
impl_from!(NaiveDateTime, Timestamp);
impl_from!(Vec<PropertyValue>, List);

impl From<Vec<f64>> for PropertyValue {
    fn from(v: Vec<f64>) -> Self {
        PropertyValue::List(v.into_iter().map(PropertyValue::Float).collect())
    }
}

impl From<Vec<i64>> for PropertyValue {
    fn from(v: Vec<i64>) -> Self {
        PropertyValue::List(v.into_iter().map(PropertyValue::Int).collect())
    }
}

/// Ordered map from property paths to values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyMap {
    entries: BTreeMap<String, PropertyValue>,
}

impl PropertyMap {
    /// Create an empty property map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over all entries in path order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, PropertyValue> {
        self.entries.iter()
    }

    /// Fetch a value by path.
    pub fn get(&self, path: &str) -> Option<&PropertyValue> {
        self.entries.get(path)
    }

    /// Whether a value exists at `path`.
    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Store a value, returning the previous one.
    pub fn set<K, V>(&mut self, path: K, value: V) -> Option<PropertyValue>
    where
        K: Into<String>,
        V: Into<PropertyValue>,
    {
        self.entries.insert(path.into(), value.into())
    }

    /// Remove a value, returning it.
    pub fn remove(&mut self, path: &str) -> Option<PropertyValue> {
        self.entries.remove(path)
    }

    /// Numeric value at `path`.
    pub fn get_f64(&self, path: &str) -> Option<f64> {
        self.get(path).and_then(PropertyValue::as_f64)
    }

    /// Integer value at `path`.
    pub fn get_i64(&self, path: &str) -> Option<i64> {
        self.get(path).and_then(PropertyValue::as_i64)
    }

    /// Text at `path`.
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(PropertyValue::as_str)
    }

    /// 3-vector at `path`.
    pub fn get_vector3(&self, path: &str) -> Option<[f64; 3]> {
        self.get(path).and_then(PropertyValue::as_vector3)
    }

    /// List at `path`.
    pub fn get_list(&self, path: &str) -> Option<&[PropertyValue]> {
        self.get(path).and_then(PropertyValue::as_list)
    }

    /// Numbers of a list property. Non-numeric elements make the whole
    /// list unavailable.
    pub fn get_f64_list(&self, path: &str) -> Option<Vec<f64>> {
        self.get_list(path)?
            .iter()
            .map(PropertyValue::as_f64)
            .collect()
    }

    /// Move a value to another path. Returns whether `from` existed.
    pub fn rename(&mut self, from: &str, to: &str) -> bool {
        match self.entries.remove(from) {
            Some(v) => {
                let _ = self.entries.insert(to.to_string(), v);
                true
            }
            None => false,
        }
    }

    /// Copy out every entry under `prefix/`, with the prefix stripped.
    pub fn branch(&self, prefix: &str) -> PropertyMap {
        let head = format!("{}/", prefix.trim_end_matches('/'));
        PropertyMap {
            entries: self
                .entries
                .range(head.clone()..)
                .take_while(|(k, _)| k.starts_with(&head))
                .map(|(k, v)| (k[head.len()..].to_string(), v.clone()))
                .collect(),
        }
    }

    /// Whether any entry lives under `prefix/`.
    pub fn contains_branch(&self, prefix: &str) -> bool {
        let head = format!("{}/", prefix.trim_end_matches('/'));
        self.entries
            .range(head.clone()..)
            .next()
            .map_or(false, |(k, _)| k.starts_with(&head))
    }

    /// Insert every entry of `other` under `prefix/`, overwriting
    /// existing values. An empty prefix merges at the root.
    pub fn merge_branch(&mut self, prefix: &str, other: PropertyMap) {
        let prefix = prefix.trim_end_matches('/');
        for (k, v) in other.entries {
            let path = if prefix.is_empty() {
                k
            } else {
                format!("{}/{}", prefix, k)
            };
            let _ = self.entries.insert(path, v);
        }
    }

    /// Remove every entry under `prefix/`, returning how many went away.
    pub fn remove_branch(&mut self, prefix: &str) -> usize {
        let head = format!("{}/", prefix.trim_end_matches('/'));
        let before = self.entries.len();
        self.entries.retain(|k, _| !k.starts_with(&head));
        before - self.entries.len()
    }
}

impl<'a> IntoIterator for &'a PropertyMap {
    type Item = (&'a String, &'a PropertyValue);
    type IntoIter = btree_map::Iter<'a, String, PropertyValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
