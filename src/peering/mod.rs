//! Peering phase authority and its feed
//!
//! Decides, for every resource kind and remote cluster, whether reflection
//! is currently permitted.

mod feed;
mod phase;

pub use feed::{apply_event, PhaseFeed};
pub use phase::{is_replication_allowed, PeeringPhase, PhaseAuthority};
