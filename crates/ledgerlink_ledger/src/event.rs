//! Signed events carried alongside blocks.

use crate::error::{LedgerError, LedgerResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashSet, VecDeque};

/// Default maximum number of retained events.
pub const DEFAULT_MAX_EVENTS: usize = 5_000;

/// A signed, content-addressed event.
///
/// Only `id` is interpreted. `kind` is surfaced for logging but may be any
/// JSON value. Every other field is kept verbatim so events round-trip
/// through storage and re-broadcast unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedEvent {
    /// Content-derived unique id.
    pub id: String,
    /// Event kind, numeric or symbolic depending on the producer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<Value>,
    /// Remaining payload fields.
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl SignedEvent {
    /// Decodes an event from untrusted JSON.
    ///
    /// Events without a non-empty string `id` are rejected.
    pub fn from_json(value: &Value) -> LedgerResult<Self> {
        let has_id = value
            .get("id")
            .and_then(Value::as_str)
            .is_some_and(|id| !id.is_empty());
        if !has_id {
            return Err(LedgerError::MissingEventId);
        }
        Ok(Self::deserialize(value)?)
    }

    /// Short id prefix for log lines.
    pub fn short_id(&self) -> &str {
        let end = self
            .id
            .char_indices()
            .nth(12)
            .map(|(i, _)| i)
            .unwrap_or(self.id.len());
        &self.id[..end]
    }
}

/// Capacity-bounded event set, deduplicated by id, oldest evicted first.
#[derive(Debug, Clone)]
pub struct EventLog {
    events: VecDeque<SignedEvent>,
    ids: HashSet<String>,
    max_events: usize,
}

impl EventLog {
    /// Creates an empty log with the default bound.
    pub fn new() -> Self {
        Self::with_max_events(DEFAULT_MAX_EVENTS)
    }

    /// Creates an empty log with a specific bound.
    pub fn with_max_events(max_events: usize) -> Self {
        Self {
            events: VecDeque::new(),
            ids: HashSet::new(),
            max_events: max_events.max(1),
        }
    }

    /// Rebuilds a log from persisted events in arrival order.
    pub fn from_events(events: impl IntoIterator<Item = SignedEvent>, max_events: usize) -> Self {
        let mut log = Self::with_max_events(max_events);
        for event in events {
            log.insert_if_new(event);
        }
        log
    }

    /// Appends `event` unless its id is already held.
    ///
    /// Returns true if the event was added.
    pub fn insert_if_new(&mut self, event: SignedEvent) -> bool {
        if self.ids.contains(&event.id) {
            return false;
        }
        self.ids.insert(event.id.clone());
        self.events.push_back(event);

        while self.events.len() > self.max_events {
            if let Some(oldest) = self.events.pop_front() {
                self.ids.remove(&oldest.id);
            }
        }
        true
    }

    /// Returns true if an event with this id is held.
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Held events, oldest first.
    pub fn events(&self) -> Vec<SignedEvent> {
        self.events.iter().cloned().collect()
    }

    /// Number of held events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if no events are held.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}
