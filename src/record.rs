use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// One sampled snapshot: field name to value.
///
/// Field sets are free to change from one tick to the next, so this is a map
/// rather than a fixed struct. Serialized as a flat JSON object. Non-finite
/// values do not survive the wire, since JSON has no spelling for them; the
/// sampler refuses such records.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(BTreeMap<String, f64>);

impl Record {
    pub fn new() -> Self {
        Record(BTreeMap::new())
    }

    pub fn with(mut self, field: impl Into<String>, value: f64) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: f64) -> Option<f64> {
        self.0.insert(field.into(), value)
    }

    pub fn get(&self, field: &str) -> Option<f64> {
        self.0.get(field).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// First field holding NaN or an infinity, if any.
    pub fn first_non_finite(&self) -> Option<(&str, f64)> {
        self.iter().find(|(_, value)| !value.is_finite())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Record(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl<K: Into<String>, const N: usize> From<[(K, f64); N]> for Record {
    fn from(fields: [(K, f64); N]) -> Self {
        fields.into_iter().collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub index: u64,
}

impl Request {
    pub fn at(index: u64) -> Self {
        Request { index }
    }
}

/// Answer to a single request. `End` is the terminator and goes over the
/// wire as `null`.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    Record(Record),
    End,
}

impl Reply {
    pub fn is_end(&self) -> bool {
        matches!(self, Reply::End)
    }

    pub fn into_record(self) -> Option<Record> {
        match self {
            Reply::Record(record) => Some(record),
            Reply::End => None,
        }
    }
}

impl From<Option<Record>> for Reply {
    fn from(value: Option<Record>) -> Self {
        match value {
            Some(record) => Reply::Record(record),
            None => Reply::End,
        }
    }
}

impl From<Record> for Reply {
    fn from(record: Record) -> Self {
        Reply::Record(record)
    }
}

impl Serialize for Reply {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Reply::Record(record) => serializer.serialize_some(record),
            Reply::End => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for Reply {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Option::<Record>::deserialize(deserializer)?.into())
    }
}
