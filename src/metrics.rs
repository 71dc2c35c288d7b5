//! Prometheus metrics for the peering reflector
//!
//! # Exported metrics
//! - `reflection_events_total` (counter): processed source events labeled by kind, direction and outcome.
//!   Outcomes are `applied`, `failed`, `skipped`, `dropped` (translation failure) and `gated` (phase too low).
//! - `reflection_cleanup_deletions_total` (counter): namespace cleanup deletions labeled by kind and outcome.

use std::sync::atomic::AtomicU64;

use once_cell::sync::Lazy;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct EventLabels {
    pub kind: String,
    pub direction: String,
    pub outcome: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct CleanupLabels {
    pub kind: String,
    pub outcome: String,
}

pub static REFLECTION_EVENTS_TOTAL: Lazy<Family<EventLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

pub static CLEANUP_DELETIONS_TOTAL: Lazy<Family<CleanupLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

/// Global metrics registry; counters get their `_total` suffix at encoding
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let mut registry = Registry::default();
    registry.register(
        "reflection_events",
        "Source events processed by the reflectors",
        REFLECTION_EVENTS_TOTAL.clone(),
    );
    registry.register(
        "reflection_cleanup_deletions",
        "Deletions issued while cleaning up a namespace",
        CLEANUP_DELETIONS_TOTAL.clone(),
    );
    registry
});

pub fn inc_reflection_event(kind: &str, direction: &str, outcome: &str) {
    REFLECTION_EVENTS_TOTAL
        .get_or_create(&EventLabels {
            kind: kind.to_string(),
            direction: direction.to_string(),
            outcome: outcome.to_string(),
        })
        .inc();
}

pub fn inc_cleanup_deletion(kind: &str, outcome: &str) {
    CLEANUP_DELETIONS_TOTAL
        .get_or_create(&CleanupLabels {
            kind: kind.to_string(),
            outcome: outcome.to_string(),
        })
        .inc();
}

/// Text exposition of [`REGISTRY`]
pub fn encode() -> Result<String, std::fmt::Error> {
    let mut buffer = String::new();
    prometheus_client::encoding::text::encode(&mut buffer, &REGISTRY)?;
    Ok(buffer)
}
