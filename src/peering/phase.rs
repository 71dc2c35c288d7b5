//! Peering phase lattice and the process-wide phase authority
//!
//! The authority stores, per remote cluster, the phase computed by the
//! peering negotiation. Reflectors read it once per event through
//! [`PhaseAuthority::is_allowed`], so a phase change takes effect on the
//! very next event without restarting any watch.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::RwLock;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Error;

/// Negotiated stage of a bilateral peering relationship
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum PeeringPhase {
    #[default]
    None,
    Authenticated,
    Incoming,
    Outgoing,
    Bidirectional,
    Induced,
    Established,
}

impl PeeringPhase {
    /// All phases, in declaration order
    pub const ALL: [PeeringPhase; 7] = [
        PeeringPhase::None,
        PeeringPhase::Authenticated,
        PeeringPhase::Incoming,
        PeeringPhase::Outgoing,
        PeeringPhase::Bidirectional,
        PeeringPhase::Induced,
        PeeringPhase::Established,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PeeringPhase::None => "None",
            PeeringPhase::Authenticated => "Authenticated",
            PeeringPhase::Incoming => "Incoming",
            PeeringPhase::Outgoing => "Outgoing",
            PeeringPhase::Bidirectional => "Bidirectional",
            PeeringPhase::Induced => "Induced",
            PeeringPhase::Established => "Established",
        }
    }
}

impl fmt::Display for PeeringPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeeringPhase {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PeeringPhase::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownPhase(s.to_string()))
    }
}

/// Decide whether a resource requiring `requirement` may reflect while the
/// peering is in `current`.
///
/// `Induced` is never a valid requirement and is rejected like any unknown value.
pub fn is_replication_allowed(current: PeeringPhase, requirement: PeeringPhase) -> bool {
    use PeeringPhase::*;

    match requirement {
        None => false,
        Authenticated => current != None,
        Bidirectional => current == Bidirectional,
        Incoming => matches!(current, Incoming | Bidirectional),
        Outgoing => matches!(current, Outgoing | Bidirectional),
        Established => matches!(current, Bidirectional | Incoming | Outgoing | Induced),
        Induced => {
            warn!("Unknown peering phase requirement {}", requirement);
            false
        }
    }
}

/// Process-wide map from remote cluster id to negotiated phase
#[derive(Debug, Default)]
pub struct PhaseAuthority {
    phases: RwLock<HashMap<String, PeeringPhase>>,
}

impl PhaseAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    /// Phase of `cluster_id`, `None` when never set
    pub fn get_phase(&self, cluster_id: &str) -> PeeringPhase {
        let phases = self.phases.read().unwrap_or_else(|e| e.into_inner());
        phases.get(cluster_id).copied().unwrap_or_default()
    }

    /// Store the phase computed by the peering negotiation. Last write wins.
    pub fn set_phase(&self, cluster_id: &str, phase: PeeringPhase) {
        let mut phases = self.phases.write().unwrap_or_else(|e| e.into_inner());
        let previous = phases.insert(cluster_id.to_string(), phase);
        if previous != Some(phase) {
            debug!(
                cluster_id,
                previous = %previous.unwrap_or_default(),
                phase = %phase,
                "Peering phase changed"
            );
        }
    }

    /// Gate check evaluated for every event
    pub fn is_allowed(&self, cluster_id: &str, requirement: PeeringPhase) -> bool {
        is_replication_allowed(self.get_phase(cluster_id), requirement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use PeeringPhase::*;

    /// Rows are requirements, columns follow `PeeringPhase::ALL`:
    /// None, Authenticated, Incoming, Outgoing, Bidirectional, Induced, Established
    const EXPECTED: [(PeeringPhase, [bool; 7]); 6] = [
        (None, [false, false, false, false, false, false, false]),
        (Authenticated, [false, true, true, true, true, true, true]),
        (Bidirectional, [false, false, false, false, true, false, false]),
        (Incoming, [false, false, true, false, true, false, false]),
        (Outgoing, [false, false, false, true, true, false, false]),
        (Established, [false, false, true, true, true, true, false]),
    ];

    #[test]
    fn test_requirement_phase_table() {
        for (requirement, row) in EXPECTED {
            for (current, expected) in PeeringPhase::ALL.into_iter().zip(row) {
                assert_eq!(
                    is_replication_allowed(current, requirement),
                    expected,
                    "requirement {requirement} with current phase {current}"
                );
            }
        }
    }

    #[test]
    fn test_incoming_requirement() {
        for phase in [Incoming, Bidirectional] {
            assert!(is_replication_allowed(phase, Incoming));
        }
        for phase in [None, Authenticated, Outgoing, Induced, Established] {
            assert!(!is_replication_allowed(phase, Incoming));
        }
    }

    #[test]
    fn test_unknown_requirement_is_rejected() {
        for phase in PeeringPhase::ALL {
            assert!(!is_replication_allowed(phase, Induced));
        }
    }

    #[test]
    fn test_phase_parse_and_display() {
        for phase in PeeringPhase::ALL {
            assert_eq!(phase.to_string().parse::<PeeringPhase>().unwrap(), phase);
        }
        assert!(matches!(
            "bogus".parse::<PeeringPhase>(),
            Err(Error::UnknownPhase(_))
        ));
    }

    #[test]
    fn test_authority_defaults_to_none() {
        let authority = PhaseAuthority::new();
        assert_eq!(authority.get_phase("unknown-cluster"), None);
        assert!(!authority.is_allowed("unknown-cluster", Authenticated));
    }

    #[test]
    fn test_authority_last_write_wins() {
        let authority = PhaseAuthority::new();
        authority.set_phase("cluster-a", Incoming);
        authority.set_phase("cluster-a", Incoming);
        assert_eq!(authority.get_phase("cluster-a"), Incoming);

        // no transition validation: straight back to None is accepted
        authority.set_phase("cluster-a", None);
        assert_eq!(authority.get_phase("cluster-a"), None);

        authority.set_phase("cluster-a", Bidirectional);
        assert!(authority.is_allowed("cluster-a", Outgoing));
        assert_eq!(authority.get_phase("cluster-b"), None);
    }

    #[test]
    fn test_authority_concurrent_access() {
        let authority = Arc::new(PhaseAuthority::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let authority = Arc::clone(&authority);
                std::thread::spawn(move || {
                    let id = format!("cluster-{}", i % 2);
                    for _ in 0..100 {
                        authority.set_phase(&id, Bidirectional);
                        assert_eq!(authority.get_phase(&id), Bidirectional);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(authority.get_phase("cluster-0"), Bidirectional);
    }
}
