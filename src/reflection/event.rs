//! Typed reflection events
//!
//! Source events carry the concrete object type of the watching reflector,
//! so no payload ever has to be downcast.

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventType {
    Added,
    Modified,
    Deleted,
    Error,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventType::Added => "ADDED",
            EventType::Modified => "MODIFIED",
            EventType::Deleted => "DELETED",
            EventType::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Event observed on the source cluster
#[derive(Clone, Debug, PartialEq)]
pub enum SourceEvent<K> {
    Added(K),
    Modified { new: K, old: K },
    Deleted(K),
    /// Watch failure; the feed re-establishes itself
    Error(String),
}

impl<K> SourceEvent<K> {
    pub fn event_type(&self) -> EventType {
        match self {
            SourceEvent::Added(_) => EventType::Added,
            SourceEvent::Modified { .. } => EventType::Modified,
            SourceEvent::Deleted(_) => EventType::Deleted,
            SourceEvent::Error(_) => EventType::Error,
        }
    }
}

/// Translated object bound for the target cluster
#[derive(Clone, Debug, PartialEq)]
pub struct TargetEvent<K> {
    pub event_type: EventType,
    pub object: K,
}

impl<K> TargetEvent<K> {
    pub fn added(object: K) -> Self {
        Self {
            event_type: EventType::Added,
            object,
        }
    }

    pub fn modified(object: K) -> Self {
        Self {
            event_type: EventType::Modified,
            object,
        }
    }

    pub fn deleted(object: K) -> Self {
        Self {
            event_type: EventType::Deleted,
            object,
        }
    }
}
