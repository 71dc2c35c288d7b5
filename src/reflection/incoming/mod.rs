//! Foreign -> home reflectors

mod pods;

pub use pods::PodsIncomingReflector;

use super::controller::ReflectorBuilder;
use super::ResourceKind;

/// Incoming builders by kind
pub const BUILDERS: &[(ResourceKind, ReflectorBuilder)] = &[(ResourceKind::Pods, pods::build)];
