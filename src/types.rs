//! Core types for the event log client.

use crate::error::StreamError;
use crate::time::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Reserved field holding the server-assigned event identifier.
pub const ID_FIELD: &str = "@id";
/// Reserved field holding the event timestamp.
pub const TIME_FIELD: &str = "@time";
/// Reserved field holding the identity of the submitting client library.
pub const LIBRARY_FIELD: &str = "@library";
/// Envelope field carrying the outcome of a non-streaming request.
pub const SUCCESS_FIELD: &str = "@success";

/// Name reported in the [`LIBRARY_FIELD`] of submitted events.
pub const CLIENT_NAME: &str = env!("CARGO_PKG_NAME");
/// Version reported in the [`LIBRARY_FIELD`] of submitted events.
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Server-assigned event identifier.
///
/// Identifiers are:
/// - Opaque: Do not parse or interpret their structure
/// - Byte-order sortable: Comparing two identifiers gives their order in the stream
/// - Unique within a stream
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Self {
        EventId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for EventId {
    fn from(s: String) -> Self {
        EventId(s)
    }
}

impl From<&str> for EventId {
    fn from(s: &str) -> Self {
        EventId(s.to_string())
    }
}

/// Start position of a range.
///
/// The end of a range is always a [`Timestamp`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Cursor {
    /// Events at or after this time (inclusive)
    At(Timestamp),
    /// Events strictly after this identifier (exclusive)
    After(EventId),
}

impl Cursor {
    /// Convenience constructor for `Cursor::After`.
    ///
    /// # Example
    /// ```
    /// use eventlog::Cursor;
    /// let cursor = Cursor::after("0000abc");
    /// ```
    pub fn after(id: impl Into<EventId>) -> Self {
        Cursor::After(id.into())
    }

    /// Check if this cursor resumes from an identifier
    pub fn is_after(&self) -> bool {
        matches!(self, Cursor::After(_))
    }
}

impl From<Timestamp> for Cursor {
    fn from(ts: Timestamp) -> Self {
        Cursor::At(ts)
    }
}

impl From<EventId> for Cursor {
    fn from(id: EventId) -> Self {
        Cursor::After(id)
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cursor::At(ts) => write!(f, "at {}", ts),
            Cursor::After(id) => write!(f, "after {}", id),
        }
    }
}

/// Order in which a range read returns events.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    /// Smallest identifier first
    #[default]
    Ascending,
    /// Largest identifier first
    Descending,
}

impl Order {
    /// Wire value of this order.
    pub fn as_str(&self) -> &'static str {
        match self {
            Order::Ascending => "ascending",
            Order::Descending => "descending",
        }
    }
}

/// Identity of the library that submitted an event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Library {
    pub name: String,
    pub version: String,
}

impl Library {
    /// This client library.
    pub fn current() -> Self {
        Library {
            name: CLIENT_NAME.to_string(),
            version: CLIENT_VERSION.to_string(),
        }
    }
}

/// An event: a few typed reserved fields plus an open set of JSON fields.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "@id", default, skip_serializing_if = "Option::is_none")]
    id: Option<EventId>,
    #[serde(rename = "@time", default, skip_serializing_if = "Option::is_none")]
    time: Option<Timestamp>,
    #[serde(rename = "@library", default, skip_serializing_if = "Option::is_none")]
    library: Option<Library>,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl Event {
    /// Create an empty event.
    pub fn new() -> Self {
        Self::default()
    }

    /// Server-assigned identifier, present on events read back from the service.
    pub fn id(&self) -> Option<&EventId> {
        self.id.as_ref()
    }

    pub fn time(&self) -> Option<Timestamp> {
        self.time
    }

    /// Set the event time. Unset times are filled in on submission.
    pub fn set_time(&mut self, time: Timestamp) {
        self.time = Some(time);
    }

    /// Builder-style [`set_time`](Self::set_time).
    pub fn at(mut self, time: Timestamp) -> Self {
        self.time = Some(time);
        self
    }

    pub fn library(&self) -> Option<&Library> {
        self.library.as_ref()
    }

    /// Get a non-reserved field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Set a non-reserved field, returning the previous value.
    ///
    /// Reserved names are rejected; use the typed accessors for those.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<Option<Value>, StreamError> {
        let key = key.into();
        if is_reserved(&key) {
            return Err(StreamError::ReservedField(key));
        }
        Ok(self.fields.insert(key, value.into()))
    }

    /// Remove a non-reserved field.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    /// Non-reserved fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Prepare an event for submission: stamp the library, default the
    /// time, and drop any identifier (the service assigns those).
    pub(crate) fn stamp_for_submit(&mut self) {
        self.id = None;
        self.library = Some(Library::current());
        if self.time.is_none() {
            self.time = Some(Timestamp::now());
        }
    }

    #[cfg(test)]
    pub(crate) fn with_id(mut self, id: impl Into<EventId>) -> Self {
        self.id = Some(id.into());
        self
    }
}

impl TryFrom<Map<String, Value>> for Event {
    type Error = StreamError;

    /// Build an event from a JSON object; reserved fields must have their
    /// expected shapes.
    fn try_from(map: Map<String, Value>) -> Result<Self, Self::Error> {
        Ok(serde_json::from_value(Value::Object(map))?)
    }
}

fn is_reserved(key: &str) -> bool {
    matches!(key, ID_FIELD | TIME_FIELD | LIBRARY_FIELD)
}
