use serde::ser::{Serialize, SerializeMap, Serializer};
use sha2::{Digest, Sha256};

/// A leaf value produced by an extraction.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Scalar {
    /// Nothing matched, or the matched node had no such value.
    #[default]
    Absent,
    Text(String),
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl Scalar {
    pub fn is_absent(&self) -> bool {
        matches!(self, Scalar::Absent)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Convert a JSON literal into a scalar; arrays and objects are not scalars.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => Some(Scalar::Absent),
            serde_json::Value::Bool(b) => Some(Scalar::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Scalar::Int)
                .or_else(|| n.as_f64().map(Scalar::Float)),
            serde_json::Value::String(s) => Some(Scalar::Text(s.clone())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Text(s)
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Scalar::Absent => serializer.serialize_none(),
            Scalar::Text(s) => serializer.serialize_str(s),
            Scalar::Bool(b) => serializer.serialize_bool(*b),
            Scalar::Int(i) => serializer.serialize_i64(*i),
            Scalar::Float(f) => serializer.serialize_f64(*f),
        }
    }
}

/// Ordered name → value mapping, in field declaration order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    entries: Vec<(String, ExtractedValue)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ExtractedValue) {
        self.entries.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<&ExtractedValue> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ExtractedValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>> FromIterator<(K, ExtractedValue)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, ExtractedValue)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Result tree of a scraper evaluation, shaped like the field tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractedValue {
    Scalar(Scalar),
    List(Vec<ExtractedValue>),
    Record(Record),
}

impl ExtractedValue {
    pub fn absent() -> Self {
        ExtractedValue::Scalar(Scalar::Absent)
    }

    pub fn text(s: impl Into<String>) -> Self {
        ExtractedValue::Scalar(Scalar::Text(s.into()))
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, ExtractedValue::Scalar(Scalar::Absent))
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            ExtractedValue::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        self.as_scalar().and_then(Scalar::as_text)
    }

    pub fn as_list(&self) -> Option<&[ExtractedValue]> {
        match self {
            ExtractedValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            ExtractedValue::Record(record) => Some(record),
            _ => None,
        }
    }

    /// Look up a field of a record value.
    pub fn get(&self, name: &str) -> Option<&ExtractedValue> {
        self.as_record().and_then(|r| r.get(name))
    }

    /// Render as a `serde_json::Value`, keeping record field order.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ExtractedValue::Scalar(scalar) => match scalar {
                Scalar::Absent => serde_json::Value::Null,
                Scalar::Text(s) => serde_json::Value::String(s.clone()),
                Scalar::Bool(b) => serde_json::Value::Bool(*b),
                Scalar::Int(i) => serde_json::Value::from(*i),
                Scalar::Float(f) => serde_json::Number::from_f64(*f)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null),
            },
            ExtractedValue::List(items) => {
                serde_json::Value::Array(items.iter().map(ExtractedValue::to_json).collect())
            }
            ExtractedValue::Record(record) => serde_json::Value::Object(
                record
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// SHA-256 of the canonical JSON rendering, as 64-char hex.
    ///
    /// Equal trees always have equal fingerprints; useful for change detection
    /// across runs over the same page.
    pub fn fingerprint(&self) -> String {
        compute_hash(&canonical_json(self))
    }
}

fn canonical_json(value: &ExtractedValue) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

impl Serialize for ExtractedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ExtractedValue::Scalar(scalar) => scalar.serialize(serializer),
            ExtractedValue::List(items) => items.serialize(serializer),
            ExtractedValue::Record(record) => record.serialize(serializer),
        }
    }
}

impl From<Scalar> for ExtractedValue {
    fn from(scalar: Scalar) -> Self {
        ExtractedValue::Scalar(scalar)
    }
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
