//! Cross-cluster resource reflection engine
//!
//! A reflector mirrors one resource kind in one direction across the
//! peering boundary. Every event flows through the same pipeline:
//!
//! 1. the peering phase gate ([`crate::peering::PhaseAuthority`]),
//! 2. the kind-specific pre-routine that translates the object,
//! 3. the terminal push against the target cluster.
//!
//! [`ReflectorsController`] owns the reflectors of one direction and runs
//! one task per (kind, namespace) between start and stop signals emitted
//! by the namespace mapper.

mod cache;
mod controller;
mod event;
mod generic;
pub mod incoming;
mod kind;
mod namespace;
pub mod outgoing;
mod retry;
mod source;
mod target;
#[cfg(test)]
pub(crate) mod testing;

use std::fmt::Debug;

use k8s_openapi::NamespaceResourceScope;
use kube::Resource;
use serde::{de::DeserializeOwned, Serialize};

pub use cache::ObjectCache;
pub use controller::{ReflectionContext, ReflectorBuilder, ReflectorsController, FIELD_MANAGER};
pub use event::{EventType, SourceEvent, TargetEvent};
pub use generic::{
    process_event, reflect_namespace, ApiReflector, ReflectorCore, ReflectorHandles,
    SpecializedReflector, ORIGIN_LABEL,
};
pub use kind::{
    requirement_for, ReflectionDirection, ResourceKind, ResourceRequirement, REGISTRY,
};
pub use namespace::{NamespaceMapper, NamespacePair, NamespaceSignals, NattingTable};
pub use retry::{RetryOutcome, RetryPolicy};
pub use source::{EventSource, KubeEventSource, WatchClassifier};
pub use target::{KubeTarget, TargetClient};

/// Namespaced Kubernetes object that can be reflected
pub trait ReflectedResource:
    Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> ReflectedResource for K where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}
