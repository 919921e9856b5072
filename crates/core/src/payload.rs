//! Opaque push payload and CID classes.
//!
//! The payload document (platform, audience, notification, ...) is built by
//! callers. The dispatch engine only reads and writes its `cid` field.

use core::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const CID_FIELD: &str = "cid";

/// Class of one-time identifier requested from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CidKind {
    /// Identifier for an immediate push.
    Immediate,
    /// Identifier for a scheduled push.
    Scheduled,
}

impl CidKind {
    /// Value of the `type` query parameter on the CID endpoint.
    pub fn as_query(&self) -> &'static str {
        match self {
            CidKind::Immediate => "push",
            CidKind::Scheduled => "schedule",
        }
    }
}

impl fmt::Display for CidKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_query())
    }
}

/// A push document, serialized as a JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Map<String, Value>);

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a JSON value. Returns `None` unless it is an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Set a top-level field, replacing any previous value.
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    /// The unique identifier of this push, if one is set and non-empty.
    pub fn cid(&self) -> Option<&str> {
        self.0
            .get(CID_FIELD)
            .and_then(Value::as_str)
            .filter(|cid| !cid.is_empty())
    }

    pub fn set_cid(&mut self, cid: impl Into<String>) {
        self.0.insert(CID_FIELD.to_string(), Value::String(cid.into()));
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.0)
    }
}

impl From<Map<String, Value>> for Payload {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(&self.0) {
            Ok(s) => f.write_str(&s),
            Err(_) => Err(fmt::Error),
        }
    }
}
