//! Query key namespace.
//!
//! A [`QueryKey`] is an ordered sequence of primitive segments. Keys are
//! hierarchical: the key for a specific resource always starts with the key of
//! the coarser family it belongs to, so invalidating a prefix reaches every
//! entry in that family.

use std::collections::BTreeMap;
use std::fmt;

use gymdesk_api_types::{GymListParams, RevenueParams};
use serde::Serialize;

/// One segment of a query key.
///
/// Parameter objects are stored as ordered maps so that structurally equal
/// parameters always produce equal segments regardless of construction order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum KeySegment {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<KeySegment>),
    Map(BTreeMap<String, KeySegment>),
}

impl KeySegment {
    pub fn map<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, KeySegment)>,
        K: Into<String>,
    {
        Self::Map(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl From<&str> for KeySegment {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for KeySegment {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<bool> for KeySegment {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for KeySegment {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for KeySegment {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<serde_json::Value> for KeySegment {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => n.as_i64().map_or_else(|| Self::Str(n.to_string()), Self::Int),
            Value::String(s) => Self::Str(s),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            Value::Object(fields) => Self::map(fields.into_iter().map(|(k, v)| (k, Self::from(v)))),
        }
    }
}

impl<T: Into<KeySegment>> From<Option<T>> for KeySegment {
    fn from(value: Option<T>) -> Self {
        value.map_or(KeySegment::Null, Into::into)
    }
}

/// Parameter objects that can be folded into a single key segment.
///
/// The segment is the serialized form of the parameters, so every field the
/// request sends is part of the key. Unset optional fields are omitted.
pub trait KeyParams: Serialize {
    fn key_segment(&self) -> KeySegment {
        match serde_json::to_value(self) {
            Ok(value) => KeySegment::from(value),
            // Only maps with non-string keys fail to serialize.
            Err(_) => KeySegment::Null,
        }
    }
}

impl KeyParams for RevenueParams {}

impl KeyParams for GymListParams {}

/// Canonical cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct QueryKey(Vec<KeySegment>);

impl QueryKey {
    pub fn root(namespace: &str) -> Self {
        Self(vec![KeySegment::from(namespace)])
    }

    /// Extend this key with one more segment, producing a narrower key.
    pub fn child(&self, segment: impl Into<KeySegment>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    pub fn segments(&self) -> &[KeySegment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Canonical byte representation used for logging and equality checks
    /// across process boundaries.
    pub fn canonical(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self.0))
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

/// Key factories for coach-scoped resources.
pub mod coaches {
    use super::*;

    pub fn all() -> QueryKey {
        QueryKey::root("coaches")
    }

    pub fn availability() -> QueryKey {
        all().child("availability")
    }

    pub fn my_availability(gym_id: Option<&str>) -> QueryKey {
        availability().child(gym_id)
    }

    pub fn revenue() -> QueryKey {
        all().child("revenue")
    }

    pub fn my_revenue(params: &RevenueParams) -> QueryKey {
        revenue().child(params.key_segment())
    }

    pub fn profile() -> QueryKey {
        all().child("profile")
    }

    pub fn my_profile() -> QueryKey {
        profile().child("me")
    }
}

/// Key factories for gyms.
pub mod gyms {
    use super::*;

    pub fn all() -> QueryKey {
        QueryKey::root("gyms")
    }

    pub fn lists() -> QueryKey {
        all().child("list")
    }

    pub fn list(params: &GymListParams) -> QueryKey {
        lists().child(params.key_segment())
    }

    pub fn details() -> QueryKey {
        all().child("detail")
    }

    pub fn detail(id: &str) -> QueryKey {
        details().child(id)
    }
}
