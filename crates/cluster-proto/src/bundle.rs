use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A single value stored in a [`Bundle`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum BundleValue {
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    String(String),
    Bytes(Bytes),
}

impl BundleValue {
    pub fn as_int(&self) -> Option<i32> {
        match self {
            BundleValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            BundleValue::Int(value) => Some(i64::from(*value)),
            BundleValue::Long(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            BundleValue::String(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            BundleValue::Bool(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for BundleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BundleValue::Null => f.write_str("null"),
            BundleValue::Bool(value) => write!(f, "{value}"),
            BundleValue::Int(value) => write!(f, "{value}"),
            BundleValue::Long(value) => write!(f, "{value}"),
            BundleValue::Double(value) => write!(f, "{value}"),
            BundleValue::String(value) => f.write_str(value),
            BundleValue::Bytes(value) => write!(f, "<{} bytes>", value.len()),
        }
    }
}

impl From<bool> for BundleValue {
    fn from(value: bool) -> Self {
        BundleValue::Bool(value)
    }
}

impl From<i32> for BundleValue {
    fn from(value: i32) -> Self {
        BundleValue::Int(value)
    }
}

impl From<i64> for BundleValue {
    fn from(value: i64) -> Self {
        BundleValue::Long(value)
    }
}

impl From<f64> for BundleValue {
    fn from(value: f64) -> Self {
        BundleValue::Double(value)
    }
}

impl From<&str> for BundleValue {
    fn from(value: &str) -> Self {
        BundleValue::String(value.to_string())
    }
}

impl From<String> for BundleValue {
    fn from(value: String) -> Self {
        BundleValue::String(value)
    }
}

impl From<Bytes> for BundleValue {
    fn from(value: Bytes) -> Self {
        BundleValue::Bytes(value)
    }
}

impl From<Vec<u8>> for BundleValue {
    fn from(value: Vec<u8>) -> Self {
        BundleValue::Bytes(Bytes::from(value))
    }
}

/// Flat string-keyed extension map carried by events and cluster configs.
///
/// Keys are kept sorted so the encoded form is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bundle {
    entries: BTreeMap<String, BundleValue>,
}

impl Bundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<BundleValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<BundleValue>,
    ) -> Option<BundleValue> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&BundleValue> {
        self.entries.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<BundleValue> {
        self.entries.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BundleValue)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// `key=value` pairs separated by spaces, for log lines.
    pub fn summary(&self) -> String {
        self.iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Bundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bundle[{}]", self.summary())
    }
}

impl<K, V> FromIterator<(K, V)> for Bundle
where
    K: Into<String>,
    V: Into<BundleValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut bundle = Bundle::new();
        for (key, value) in iter {
            bundle.insert(key, value);
        }
        bundle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_lists_entries_in_key_order() {
        let bundle = Bundle::new()
            .with("road", "A40")
            .with("distance", 350)
            .with("arrived", false);
        assert_eq!(bundle.summary(), "arrived=false distance=350 road=A40");
    }

    #[test]
    fn insert_replaces_existing_value() {
        let mut bundle = Bundle::new();
        assert!(bundle.insert("eta", 10).is_none());
        assert_eq!(bundle.insert("eta", 12i64), Some(BundleValue::Int(10)));
        assert_eq!(bundle.get("eta").and_then(BundleValue::as_long), Some(12));
        assert_eq!(bundle.len(), 1);
    }

    #[test]
    fn json_form_is_tagged() {
        let bundle = Bundle::new().with("lane", 2);
        let json = serde_json::to_string(&bundle).expect("serialize");
        assert_eq!(json, r#"{"lane":{"type":"int","value":2}}"#);
    }
}
