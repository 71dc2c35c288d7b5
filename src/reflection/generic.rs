//! Resource-kind-agnostic reflector plumbing
//!
//! A specialized reflector holds a [`ReflectorCore`] (identity, phase gate,
//! namespace translation) and a [`ReflectorHandles`] (source feed, target
//! client, cache). The free functions here run the shared pipeline around
//! the specialized pre-routines.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::{
    EventSource, EventType, NamespaceMapper, NamespacePair, ObjectCache, ReflectedResource,
    ReflectionDirection, ResourceKind, ResourceRequirement, RetryPolicy, SourceEvent,
    TargetClient, TargetEvent,
};
use crate::error::Result;
use crate::peering::{PeeringPhase, PhaseAuthority};

/// Ownership marker stamped on every reflected object
pub const ORIGIN_LABEL: &str = "reflection.liqo.io/origin";

/// State shared by every specialized reflector
pub struct ReflectorCore {
    kind: ResourceKind,
    direction: ReflectionDirection,
    requirement: PeeringPhase,
    remote_cluster_id: String,
    origin: String,
    mapper: Arc<dyn NamespaceMapper>,
    authority: Arc<PhaseAuthority>,
    cleanup_policy: RetryPolicy,
}

impl ReflectorCore {
    pub fn new(
        requirement: ResourceRequirement,
        remote_cluster_id: impl Into<String>,
        origin: impl Into<String>,
        mapper: Arc<dyn NamespaceMapper>,
        authority: Arc<PhaseAuthority>,
    ) -> Self {
        Self {
            kind: requirement.kind,
            direction: requirement.direction,
            requirement: requirement.phase,
            remote_cluster_id: remote_cluster_id.into(),
            origin: origin.into(),
            mapper,
            authority,
            cleanup_policy: RetryPolicy::default(),
        }
    }

    pub fn with_cleanup_policy(mut self, policy: RetryPolicy) -> Self {
        self.cleanup_policy = policy;
        self
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn direction(&self) -> ReflectionDirection {
        self.direction
    }

    pub fn requirement(&self) -> PeeringPhase {
        self.requirement
    }

    pub fn remote_cluster_id(&self) -> &str {
        &self.remote_cluster_id
    }

    /// Value of the ownership marker
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn mapper(&self) -> &dyn NamespaceMapper {
        self.mapper.as_ref()
    }

    pub fn cleanup_policy(&self) -> &RetryPolicy {
        &self.cleanup_policy
    }

    /// Canonical key used for logging and deduplication
    pub fn keyer(namespace: &str, name: &str) -> String {
        format!("{namespace}/{name}")
    }

    /// Phase gate, evaluated on every event
    pub fn is_allowed(&self) -> bool {
        self.authority
            .is_allowed(&self.remote_cluster_id, self.requirement)
    }

    /// Translate a source namespace into the target one
    pub fn target_namespace(&self, source_namespace: &str) -> Result<String> {
        match self.direction {
            ReflectionDirection::Outgoing => self.mapper.translate(source_namespace),
            ReflectionDirection::Incoming => self.mapper.reverse(source_namespace),
        }
    }

    /// True when `meta` carries this reflector's ownership marker
    pub fn owns(&self, meta: &ObjectMeta) -> bool {
        meta.labels
            .as_ref()
            .and_then(|l| l.get(ORIGIN_LABEL))
            .is_some_and(|v| *v == self.origin)
    }

    /// Fresh target metadata: name kept, namespace translated, source labels plus marker
    pub fn forge_metadata(&self, source: &ObjectMeta, target_namespace: &str) -> ObjectMeta {
        let mut labels = source.labels.clone().unwrap_or_default();
        labels.insert(ORIGIN_LABEL.to_string(), self.origin.clone());

        ObjectMeta {
            name: source.name.clone(),
            namespace: Some(target_namespace.to_string()),
            labels: Some(labels),
            annotations: Some(BTreeMap::new()),
            ..Default::default()
        }
    }

    /// Target metadata for an update of an object already pushed as `cached`
    ///
    /// Resource version and UID come from the cached target object.
    /// Labels and annotations set on the target side survive; source labels win on conflict.
    pub fn merge_metadata(
        &self,
        source: &ObjectMeta,
        cached: &ObjectMeta,
        target_namespace: &str,
    ) -> ObjectMeta {
        let mut labels = cached.labels.clone().unwrap_or_default();
        labels.extend(source.labels.clone().unwrap_or_default());
        labels.insert(ORIGIN_LABEL.to_string(), self.origin.clone());

        ObjectMeta {
            name: source.name.clone(),
            namespace: Some(target_namespace.to_string()),
            labels: Some(labels),
            annotations: Some(cached.annotations.clone().unwrap_or_default()),
            resource_version: cached.resource_version.clone(),
            uid: cached.uid.clone(),
            ..Default::default()
        }
    }
}

/// Read-only handles to the clusters and cache a reflector works against
pub struct ReflectorHandles<K> {
    source: Arc<dyn EventSource<K>>,
    target: Arc<dyn TargetClient<K>>,
    cache: Arc<dyn ObjectCache<K>>,
}

impl<K> Clone for ReflectorHandles<K> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            target: Arc::clone(&self.target),
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<K> ReflectorHandles<K> {
    pub fn new(
        source: Arc<dyn EventSource<K>>,
        target: Arc<dyn TargetClient<K>>,
        cache: Arc<dyn ObjectCache<K>>,
    ) -> Self {
        Self {
            source,
            target,
            cache,
        }
    }

    /// Watch feed of the cluster events are read from
    pub fn source(&self) -> &dyn EventSource<K> {
        self.source.as_ref()
    }

    /// Client of the cluster objects are pushed to
    pub fn target(&self) -> &dyn TargetClient<K> {
        self.target.as_ref()
    }

    /// Cache of previously pushed target-side objects
    pub fn cache(&self) -> &dyn ObjectCache<K> {
        self.cache.as_ref()
    }
}

/// Kind-specific half of a reflector
///
/// Pre-routines translate a source object into its target representation
/// and may remap the event type. `Ok(None)` skips the event.
#[async_trait]
pub trait SpecializedReflector: Send + Sync + 'static {
    type Object: ReflectedResource;

    fn core(&self) -> &ReflectorCore;
    fn handles(&self) -> &ReflectorHandles<Self::Object>;

    fn pre_add(&self, obj: &Self::Object) -> Result<Option<TargetEvent<Self::Object>>>;
    fn pre_update(
        &self,
        new: &Self::Object,
        old: &Self::Object,
    ) -> Result<Option<TargetEvent<Self::Object>>>;
    fn pre_delete(&self, obj: &Self::Object) -> Result<Option<TargetEvent<Self::Object>>>;

    /// Terminal create/update/delete against the target cluster
    async fn handle_event(&self, event: TargetEvent<Self::Object>) -> Result<()>;

    /// Best-effort removal of everything reflected into `pair`
    async fn cleanup_namespace(&self, pair: &NamespacePair);
}

fn record(core: &ReflectorCore, outcome: &str) {
    #[cfg(feature = "metrics")]
    crate::metrics::inc_reflection_event(core.kind().as_str(), core.direction().as_str(), outcome);
    #[cfg(not(feature = "metrics"))]
    let _ = (core, outcome);
}

fn object_key<K: ReflectedResource>(obj: &K) -> String {
    ReflectorCore::keyer(&obj.namespace().unwrap_or_default(), &obj.name_any())
}

fn gate(core: &ReflectorCore, event_type: EventType, key: &str) -> bool {
    if core.is_allowed() {
        return true;
    }
    debug!(
        kind = %core.kind(),
        direction = %core.direction(),
        "Dropping {} for {}: peering with {} does not satisfy {}",
        event_type,
        key,
        core.remote_cluster_id(),
        core.requirement()
    );
    record(core, "gated");
    false
}

async fn dispatch<R>(
    reflector: &R,
    key: &str,
    translated: Result<Option<TargetEvent<R::Object>>>,
) -> Result<()>
where
    R: SpecializedReflector + ?Sized,
{
    let core = reflector.core();
    match translated {
        Ok(Some(event)) => {
            let result = reflector.handle_event(event).await;
            record(core, if result.is_ok() { "applied" } else { "failed" });
            result
        }
        Ok(None) => {
            debug!(kind = %core.kind(), direction = %core.direction(), "Skipping {}", key);
            record(core, "skipped");
            Ok(())
        }
        Err(e) => {
            error!(
                kind = %core.kind(),
                direction = %core.direction(),
                "Translation of {} failed, dropping event: {}",
                key,
                e
            );
            record(core, "dropped");
            Err(e)
        }
    }
}

pub async fn pre_process_add<R>(reflector: &R, obj: &R::Object) -> Result<()>
where
    R: SpecializedReflector + ?Sized,
{
    let key = object_key(obj);
    if !gate(reflector.core(), EventType::Added, &key) {
        return Ok(());
    }
    dispatch(reflector, &key, reflector.pre_add(obj)).await
}

pub async fn pre_process_update<R>(reflector: &R, new: &R::Object, old: &R::Object) -> Result<()>
where
    R: SpecializedReflector + ?Sized,
{
    let key = object_key(new);
    if !gate(reflector.core(), EventType::Modified, &key) {
        return Ok(());
    }
    dispatch(reflector, &key, reflector.pre_update(new, old)).await
}

pub async fn pre_process_delete<R>(reflector: &R, obj: &R::Object) -> Result<()>
where
    R: SpecializedReflector + ?Sized,
{
    let key = object_key(obj);
    if !gate(reflector.core(), EventType::Deleted, &key) {
        return Ok(());
    }
    dispatch(reflector, &key, reflector.pre_delete(obj)).await
}

/// Run one source event through gate, pre-routine and terminal push
pub async fn process_event<R>(reflector: &R, event: SourceEvent<R::Object>) -> Result<()>
where
    R: SpecializedReflector + ?Sized,
{
    match event {
        SourceEvent::Added(obj) => pre_process_add(reflector, &obj).await,
        SourceEvent::Modified { new, old } => pre_process_update(reflector, &new, &old).await,
        SourceEvent::Deleted(obj) => pre_process_delete(reflector, &obj).await,
        SourceEvent::Error(message) => {
            let core = reflector.core();
            warn!(kind = %core.kind(), direction = %core.direction(), "Watch error: {}", message);
            Ok(())
        }
    }
}

/// Watch/dispatch loop of one (kind, direction, namespace)
///
/// Events are handled strictly in arrival order. Cancellation is observed
/// between events, so an event already being pushed completes.
pub async fn reflect_namespace<R: SpecializedReflector>(
    reflector: Arc<R>,
    pair: NamespacePair,
    token: CancellationToken,
) {
    let core = reflector.core();
    let namespace = pair.source(core.direction()).to_string();
    let mut events = reflector.handles().source().watch(&namespace);

    info!(
        kind = %core.kind(),
        direction = %core.direction(),
        "Reflection of {} -> {} started",
        namespace,
        pair.target(core.direction())
    );

    loop {
        let event = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            event = events.next() => match event {
                Some(event) => event,
                None => {
                    warn!(kind = %core.kind(), direction = %core.direction(), "Watch on {} closed", namespace);
                    break;
                }
            },
        };
        // already logged; one bad event never ends the loop
        let _ = process_event(reflector.as_ref(), event).await;
    }

    info!(
        kind = %core.kind(),
        direction = %core.direction(),
        "Reflection of {} stopped",
        namespace
    );
}

/// Object-safe face of a reflector, as held by a direction controller
#[async_trait]
pub trait ApiReflector: Send + Sync {
    fn kind(&self) -> ResourceKind;
    fn direction(&self) -> ReflectionDirection;

    /// Spawn the watch/dispatch loop for `pair` on `tracker`
    fn setup_handlers(&self, pair: &NamespacePair, token: CancellationToken, tracker: &TaskTracker);

    async fn cleanup_namespace(&self, pair: &NamespacePair);
}

#[async_trait]
impl<R: SpecializedReflector> ApiReflector for Arc<R> {
    fn kind(&self) -> ResourceKind {
        self.core().kind()
    }

    fn direction(&self) -> ReflectionDirection {
        self.core().direction()
    }

    fn setup_handlers(&self, pair: &NamespacePair, token: CancellationToken, tracker: &TaskTracker) {
        tracker.spawn(reflect_namespace(Arc::clone(self), pair.clone(), token));
    }

    async fn cleanup_namespace(&self, pair: &NamespacePair) {
        SpecializedReflector::cleanup_namespace(self.as_ref(), pair).await
    }
}
