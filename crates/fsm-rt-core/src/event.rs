//! Events and the trail (spec §3 "Event", "Trail").

use crate::fsm::XitionId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An untyped mapping with a mandatory `"id"` field holding a `[from, to]`
/// pair; remaining fields are the payload constrained by the transition's
/// schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: XitionId,
    pub payload: Map<String, Value>,
}

impl Event {
    pub fn new(id: XitionId, payload: Map<String, Value>) -> Self {
        Self { id, payload }
    }

    /// Builds an event from a payload value that must be a JSON object.
    pub fn with_payload_value(id: XitionId, payload: Value) -> Result<Self, String> {
        match payload {
            Value::Object(map) => Ok(Self::new(id, map)),
            Value::Null => Ok(Self::new(id, Map::new())),
            other => Err(format!("event payload must be an object, got {other}")),
        }
    }

    /// The payload as a `Value`, for passing to [`crate::schema::validate`].
    pub fn payload_value(&self) -> Value {
        Value::Object(self.payload.clone())
    }
}

impl Serialize for Event {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.payload.len() + 1))?;
        map.serialize_entry("id", &self.id)?;
        for (k, v) in &self.payload {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let mut obj = Map::deserialize(deserializer)?;
        let id_value = obj.remove("id").ok_or_else(|| {
            serde::de::Error::custom("event is missing mandatory \"id\" field")
        })?;
        let id: XitionId = serde_json::from_value(id_value).map_err(serde::de::Error::custom)?;
        Ok(Event { id, payload: obj })
    }
}

/// One record in the trail (spec §3 "Trail", §4.5 step 5).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrailEntry {
    /// A normal accepted event.
    Accepted { transition_id: XitionId, event: Event },
    /// The transition's `omit` flag was set; the full event is dropped in
    /// favor of a compact placeholder naming only the transition crossed.
    Omitted { transition_id: XitionId },
    /// A synthetic record appended when a session is cancelled mid-run
    /// (spec §4.5 "Cancellation").
    Cancelled,
}

impl TrailEntry {
    pub fn transition_id(&self) -> Option<&XitionId> {
        match self {
            TrailEntry::Accepted { transition_id, .. } => Some(transition_id),
            TrailEntry::Omitted { transition_id } => Some(transition_id),
            TrailEntry::Cancelled => None,
        }
    }
}

/// An ordered, append-only sequence of trail entries.
///
/// `Trail` is cheap to clone (an `Arc`-backed `Vec`-like handle would be
/// overkill at the scale one FSM run reaches); callers that need to share it
/// across an action invocation and the engine loop simply clone the `Vec`
/// they were handed — entries are never rewritten, so clones never diverge
/// in already-published history (spec §3 "Never mutated in place").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trail(Vec<TrailEntry>);

impl Trail {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, entry: TrailEntry) {
        self.0.push(entry);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrailEntry> {
        self.0.iter()
    }

    pub fn entries(&self) -> &[TrailEntry] {
        &self.0
    }
}
