//! Registered resource kinds, directions and their phase requirements

use std::fmt;

use crate::peering::PeeringPhase;

/// Direction of reflection across the peering boundary
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReflectionDirection {
    /// home -> foreign
    Outgoing,
    /// foreign -> home
    Incoming,
}

impl ReflectionDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReflectionDirection::Outgoing => "outgoing",
            ReflectionDirection::Incoming => "incoming",
        }
    }
}

impl fmt::Display for ReflectionDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    ConfigMaps,
    Secrets,
    Services,
    Pods,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::ConfigMaps => "configmaps",
            ResourceKind::Secrets => "secrets",
            ResourceKind::Services => "services",
            ResourceKind::Pods => "pods",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static declaration of the minimum phase a (kind, direction) needs to reflect
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourceRequirement {
    pub kind: ResourceKind,
    pub direction: ReflectionDirection,
    pub phase: PeeringPhase,
}

/// Every (kind, direction) pair the engine knows how to reflect
pub const REGISTRY: &[ResourceRequirement] = &[
    ResourceRequirement {
        kind: ResourceKind::ConfigMaps,
        direction: ReflectionDirection::Outgoing,
        phase: PeeringPhase::Outgoing,
    },
    ResourceRequirement {
        kind: ResourceKind::Secrets,
        direction: ReflectionDirection::Outgoing,
        phase: PeeringPhase::Outgoing,
    },
    ResourceRequirement {
        kind: ResourceKind::Services,
        direction: ReflectionDirection::Outgoing,
        phase: PeeringPhase::Outgoing,
    },
    ResourceRequirement {
        kind: ResourceKind::Pods,
        direction: ReflectionDirection::Incoming,
        phase: PeeringPhase::Incoming,
    },
];

/// Registered requirement for a (kind, direction), if any
pub fn requirement_for(
    kind: ResourceKind,
    direction: ReflectionDirection,
) -> Option<ResourceRequirement> {
    REGISTRY
        .iter()
        .find(|r| r.kind == kind && r.direction == direction)
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lookup() {
        let req = requirement_for(ResourceKind::ConfigMaps, ReflectionDirection::Outgoing).unwrap();
        assert_eq!(req.phase, PeeringPhase::Outgoing);
        assert!(requirement_for(ResourceKind::ConfigMaps, ReflectionDirection::Incoming).is_none());
        assert_eq!(
            requirement_for(ResourceKind::Pods, ReflectionDirection::Incoming)
                .unwrap()
                .phase,
            PeeringPhase::Incoming
        );
    }

    #[test]
    fn test_kinds_per_direction() {
        let kinds_for = |direction| {
            REGISTRY
                .iter()
                .filter(move |r| r.direction == direction)
                .map(|r| r.kind)
        };
        let outgoing: Vec<_> = kinds_for(ReflectionDirection::Outgoing).collect();
        assert_eq!(
            outgoing,
            vec![
                ResourceKind::ConfigMaps,
                ResourceKind::Secrets,
                ResourceKind::Services
            ]
        );
        let incoming: Vec<_> = kinds_for(ReflectionDirection::Incoming).collect();
        assert_eq!(incoming, vec![ResourceKind::Pods]);
    }

    #[test]
    fn test_registry_has_no_duplicates() {
        for (i, a) in REGISTRY.iter().enumerate() {
            for b in &REGISTRY[i + 1..] {
                assert!(!(a.kind == b.kind && a.direction == b.direction));
            }
        }
    }
}
