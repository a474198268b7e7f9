//! Attribute bags with frozen, order-independent signatures.

use crate::core::uid::Uid;
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Scalar attribute value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl AttributeValue {
    /// Numeric view of the value, `None` for strings and booleans.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Int(v) => Some(*v as f64),
            AttributeValue::Float(v) => Some(*v),
            AttributeValue::Str(_) | AttributeValue::Bool(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Str(v) => f.write_str(v),
            AttributeValue::Int(v) => write!(f, "{}", v),
            AttributeValue::Float(v) => write!(f, "{}", v),
            AttributeValue::Bool(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::Str(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::Str(v)
    }
}

impl From<&String> for AttributeValue {
    fn from(v: &String) -> Self {
        AttributeValue::Str(v.clone())
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<i32> for AttributeValue {
    fn from(v: i32) -> Self {
        AttributeValue::Int(i64::from(v))
    }
}

impl From<u64> for AttributeValue {
    fn from(v: u64) -> Self {
        AttributeValue::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Float(v)
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

/// Name to value map whose identity is fixed the first time it is asked for.
///
/// `append` is first-write-wins. `set` overwrites. Neither changes a signature
/// that has already been computed.
#[derive(Debug, Clone, Default)]
pub struct AttributeSet {
    map: BTreeMap<String, AttributeValue>,
    signature: OnceCell<Uid>,
}

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless `name` is already present. Returns true when inserted.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> bool {
        let name = name.into();
        if self.map.contains_key(&name) {
            return false;
        }
        self.map.insert(name, value.into());
        true
    }

    /// Append every attribute of `other`, first-write-wins per name.
    pub fn append_all(&mut self, other: &AttributeSet) {
        for (name, value) in &other.map {
            if !self.map.contains_key(name) {
                self.map.insert(name.clone(), value.clone());
            }
        }
    }

    /// Insert or overwrite.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        self.map.insert(name.into(), value.into());
    }

    /// Builder form of [`AttributeSet::append`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.append(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.map.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    /// Numeric value of `name`, zero when missing or non-numeric.
    pub fn float_value_of(&self, name: &str) -> f64 {
        self.map.get(name).and_then(AttributeValue::as_f64).unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Attributes in lexicographic name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttributeValue)> {
        self.map.iter()
    }

    /// Identity over the sorted `name=value` pairs.
    ///
    /// Computed once; later appends grow the map but not the signature.
    pub fn signature(&self) -> &Uid {
        self.signature.get_or_init(|| {
            let mut uid = Uid::new();
            for (name, value) in &self.map {
                uid.concat(format_args!("{}={}", name, value));
            }
            uid
        })
    }

    pub fn is_signed(&self) -> bool {
        self.signature.get().is_some()
    }

    /// Flattened copy for export.
    pub fn to_map(&self) -> BTreeMap<String, AttributeValue> {
        self.map.clone()
    }
}

impl PartialEq for AttributeSet {
    fn eq(&self, other: &Self) -> bool {
        self.map == other.map
    }
}

impl<K: Into<String>, V: Into<AttributeValue>> FromIterator<(K, V)> for AttributeSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = AttributeSet::new();
        for (name, value) in iter {
            set.append(name, value);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_write_wins() {
        let mut attrs = AttributeSet::new();
        assert!(attrs.append("x", 1_i64));
        assert!(!attrs.append("x", 2_i64));
        assert_eq!(attrs.get("x"), Some(&AttributeValue::Int(1)));
    }

    #[test]
    fn test_set_overwrites() {
        let mut attrs = AttributeSet::new().with("x", 1_i64);
        attrs.set("x", 2_i64);
        assert_eq!(attrs.get("x"), Some(&AttributeValue::Int(2)));
    }

    #[test]
    fn test_signature_frozen_after_first_use() {
        let mut attrs = AttributeSet::new().with("origin", "rep").with("job", "diego_cell");
        let before = attrs.signature().clone();
        attrs.append("brand_new", "value");
        attrs.append_all(&AttributeSet::new().with("another", 7_i64));
        assert_eq!(attrs.len(), 4);
        assert_eq!(attrs.signature(), &before);
    }

    #[test]
    fn test_signature_order_independent() {
        let a = AttributeSet::new().with("b", "2").with("a", "1");
        let b = AttributeSet::new().with("a", "1").with("b", "2");
        assert_eq!(a.signature(), b.signature());
        assert_eq!(a.signature().as_str(), "/a=1/b=2");
    }

    #[test]
    fn test_signature_distinguishes_values() {
        let a = AttributeSet::new().with("index", "0");
        let b = AttributeSet::new().with("index", "1");
        assert_ne!(a.signature(), b.signature());
    }

    #[test]
    fn test_append_all_keeps_existing() {
        let mut attrs = AttributeSet::new().with("app.name", "mine");
        let other = AttributeSet::new().with("app.name", "theirs").with("app.space", "dev");
        attrs.append_all(&other);
        assert_eq!(attrs.get("app.name").and_then(AttributeValue::as_str), Some("mine"));
        assert!(attrs.contains("app.space"));
    }

    #[test]
    fn test_float_value_of() {
        let attrs = AttributeSet::new()
            .with("quota", 1024_i64)
            .with("ratio", 0.5)
            .with("name", "x");
        assert_eq!(attrs.float_value_of("quota"), 1024.0);
        assert_eq!(attrs.float_value_of("ratio"), 0.5);
        assert_eq!(attrs.float_value_of("name"), 0.0);
        assert_eq!(attrs.float_value_of("missing"), 0.0);
    }
}
