//! Namespace translation across the peering boundary
//!
//! The mapper decides which namespaces are reflected and how they are named
//! on the foreign cluster. The engine only consumes its start/stop signals
//! and its lookup functions.

use std::collections::BTreeMap;
use std::sync::RwLock;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use super::ReflectionDirection;
use crate::error::{Error, Result};

/// Synchronous local <-> foreign namespace lookup
pub trait NamespaceMapper: Send + Sync {
    /// Foreign name of a local namespace
    fn translate(&self, local: &str) -> Result<String>;
    /// Local name of a foreign namespace
    fn reverse(&self, foreign: &str) -> Result<String>;
}

/// A local namespace and its foreign counterpart
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NamespacePair {
    pub local: String,
    pub foreign: String,
}

impl NamespacePair {
    pub fn new(local: impl Into<String>, foreign: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            foreign: foreign.into(),
        }
    }

    /// Namespace events are read from
    pub fn source(&self, direction: ReflectionDirection) -> &str {
        match direction {
            ReflectionDirection::Outgoing => &self.local,
            ReflectionDirection::Incoming => &self.foreign,
        }
    }

    /// Namespace objects are pushed to
    pub fn target(&self, direction: ReflectionDirection) -> &str {
        match direction {
            ReflectionDirection::Outgoing => &self.foreign,
            ReflectionDirection::Incoming => &self.local,
        }
    }
}

/// Receiving ends of the four namespace signals, each carrying a local namespace name
#[derive(Debug)]
pub struct NamespaceSignals {
    pub start_incoming: UnboundedReceiver<String>,
    pub stop_incoming: UnboundedReceiver<String>,
    pub start_outgoing: UnboundedReceiver<String>,
    pub stop_outgoing: UnboundedReceiver<String>,
}

#[derive(Debug)]
struct SignalSenders {
    start_incoming: UnboundedSender<String>,
    stop_incoming: UnboundedSender<String>,
    start_outgoing: UnboundedSender<String>,
    stop_outgoing: UnboundedSender<String>,
}

fn signal(tx: &UnboundedSender<String>, name: &str, namespace: &str) {
    if tx.send(namespace.to_string()).is_err() {
        warn!("No receiver for {} signal of namespace {}", name, namespace);
    }
}

/// In-memory namespace mapper
///
/// Mapping a namespace starts reflection in both directions, unmapping it
/// stops both. A mapping stays resolvable after unmap until it is
/// [`forget`](NattingTable::forget)-ed, so teardown can still translate.
#[derive(Debug)]
pub struct NattingTable {
    pairs: RwLock<BTreeMap<String, String>>,
    signals: SignalSenders,
}

impl NattingTable {
    pub fn new() -> (Self, NamespaceSignals) {
        let (start_incoming_tx, start_incoming) = mpsc::unbounded_channel();
        let (stop_incoming_tx, stop_incoming) = mpsc::unbounded_channel();
        let (start_outgoing_tx, start_outgoing) = mpsc::unbounded_channel();
        let (stop_outgoing_tx, stop_outgoing) = mpsc::unbounded_channel();

        let table = Self {
            pairs: RwLock::new(BTreeMap::new()),
            signals: SignalSenders {
                start_incoming: start_incoming_tx,
                stop_incoming: stop_incoming_tx,
                start_outgoing: start_outgoing_tx,
                stop_outgoing: stop_outgoing_tx,
            },
        };
        let signals = NamespaceSignals {
            start_incoming,
            stop_incoming,
            start_outgoing,
            stop_outgoing,
        };
        (table, signals)
    }

    /// Record a translation and signal start for both directions
    pub fn map(&self, local: &str, foreign: &str) {
        {
            let mut pairs = self.pairs.write().unwrap_or_else(|e| e.into_inner());
            if pairs.get(local).map(String::as_str) == Some(foreign) {
                debug!("Namespace {} already mapped to {}", local, foreign);
                return;
            }
            pairs.insert(local.to_string(), foreign.to_string());
        }
        info!("Mapped namespace {} to {}", local, foreign);
        signal(&self.signals.start_outgoing, "start-outgoing", local);
        signal(&self.signals.start_incoming, "start-incoming", local);
    }

    /// Signal stop for both directions of a mapped namespace
    pub fn unmap(&self, local: &str) {
        if self.translate(local).is_err() {
            debug!("Namespace {} is not mapped", local);
            return;
        }
        info!("Unmapping namespace {}", local);
        signal(&self.signals.stop_outgoing, "stop-outgoing", local);
        signal(&self.signals.stop_incoming, "stop-incoming", local);
    }

    /// Drop the translation record of a namespace
    pub fn forget(&self, local: &str) -> Option<String> {
        self.pairs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(local)
    }
}

impl NamespaceMapper for NattingTable {
    fn translate(&self, local: &str) -> Result<String> {
        self.pairs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(local)
            .cloned()
            .ok_or_else(|| Error::NamespaceNotMapped(local.to_string()))
    }

    fn reverse(&self, foreign: &str) -> Result<String> {
        self.pairs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|(_, f)| f.as_str() == foreign)
            .map(|(l, _)| l.clone())
            .ok_or_else(|| Error::NamespaceNotMapped(foreign.to_string()))
    }
}
