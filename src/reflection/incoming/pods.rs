use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::watcher;
use kube::ResourceExt;
use tracing::{debug, error, info};

use crate::error::{is_not_found, Result};
use crate::reflection::{
    ApiReflector, EventType, NamespacePair, ReflectionContext, ReflectorCore, ReflectorHandles,
    ResourceRequirement, SpecializedReflector, TargetEvent, ORIGIN_LABEL,
};

/// Copies the status of offloaded pods back onto their home pods
///
/// Home pods belong to their home workloads, so only `status` is written
/// and deletions on the foreign side are not propagated.
pub struct PodsIncomingReflector {
    core: ReflectorCore,
    handles: ReflectorHandles<Pod>,
}

impl PodsIncomingReflector {
    pub fn new(core: ReflectorCore, handles: ReflectorHandles<Pod>) -> Self {
        Self { core, handles }
    }

    /// Cached home pod carrying the foreign pod's status
    fn home_with_status(&self, foreign: &Pod) -> Result<Option<TargetEvent<Pod>>> {
        let namespace = self
            .core
            .target_namespace(&foreign.namespace().unwrap_or_default())?;
        let cached = self.handles.cache().get_object(&namespace, &foreign.name_any())?;

        let mut home = Pod::clone(&cached);
        home.status = foreign.status.clone();
        Ok(Some(TargetEvent::modified(home)))
    }
}

#[async_trait]
impl SpecializedReflector for PodsIncomingReflector {
    type Object = Pod;

    fn core(&self) -> &ReflectorCore {
        &self.core
    }

    fn handles(&self) -> &ReflectorHandles<Pod> {
        &self.handles
    }

    fn pre_add(&self, obj: &Pod) -> Result<Option<TargetEvent<Pod>>> {
        self.home_with_status(obj)
    }

    fn pre_update(&self, new: &Pod, _old: &Pod) -> Result<Option<TargetEvent<Pod>>> {
        self.home_with_status(new)
    }

    fn pre_delete(&self, obj: &Pod) -> Result<Option<TargetEvent<Pod>>> {
        debug!(kind = %self.core.kind(), "Not propagating deletion of foreign pod {}", obj.name_any());
        Ok(None)
    }

    async fn handle_event(&self, event: TargetEvent<Pod>) -> Result<()> {
        let pod = event.object;
        let namespace = pod.namespace().unwrap_or_default();
        let key = ReflectorCore::keyer(&namespace, &pod.name_any());

        match event.event_type {
            EventType::Added | EventType::Modified => {
                match self.handles.target().update_status(&namespace, &pod).await {
                    Ok(_) => {
                        debug!(kind = %self.core.kind(), key = %key, "Status updated");
                        Ok(())
                    }
                    Err(e) => {
                        if is_not_found(&e) {
                            error!(kind = %self.core.kind(), key = %key, "Home pod vanished: {}", e);
                        } else {
                            error!(kind = %self.core.kind(), key = %key, "Status update failed: {}", e);
                        }
                        Err(e.into())
                    }
                }
            }
            EventType::Deleted | EventType::Error => Ok(()),
        }
    }

    async fn cleanup_namespace(&self, pair: &NamespacePair) {
        info!(
            kind = %self.core.kind(),
            "Leaving home pods in {} to their workloads",
            pair.target(self.core.direction())
        );
    }
}

pub(super) fn build(
    ctx: &ReflectionContext,
    requirement: ResourceRequirement,
) -> BoxFuture<'_, Result<Box<dyn ApiReflector>>> {
    Box::pin(async move {
        let source = watcher::Config::default().labels(&format!("{ORIGIN_LABEL}={}", ctx.origin));
        let cache = watcher::Config::default().fields(&format!("spec.nodeName={}", ctx.origin));
        let handles = ctx
            .incoming_handles::<Pod>(requirement.kind, source, cache)
            .await?;
        let reflector = Arc::new(PodsIncomingReflector::new(ctx.core(requirement), handles));
        Ok(Box::new(reflector) as Box<dyn ApiReflector>)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use k8s_openapi::api::core::v1::PodStatus;
    use kube::api::ObjectMeta;

    use crate::peering::{PeeringPhase, PhaseAuthority};
    use crate::reflection::testing::{handles, ChannelSource, FakeTarget, StaticMapper};
    use crate::reflection::{process_event, requirement_for, ReflectionDirection, ResourceKind, SourceEvent};

    fn pod(namespace: &str, phase: Option<&str>) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some("worker".to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            status: phase.map(|p| PodStatus {
                phase: Some(p.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn reflector(target: &Arc<FakeTarget<Pod>>, phase: PeeringPhase) -> PodsIncomingReflector {
        let authority = Arc::new(PhaseAuthority::new());
        authority.set_phase("remote", phase);
        let core = ReflectorCore::new(
            requirement_for(ResourceKind::Pods, ReflectionDirection::Incoming).unwrap(),
            "remote",
            "vk-remote",
            Arc::new(StaticMapper::suffix("-remote")),
            authority,
        );
        PodsIncomingReflector::new(core, handles(&ChannelSource::new(), target))
    }

    #[tokio::test]
    async fn test_foreign_status_lands_on_home_pod() {
        let target = FakeTarget::new();
        let home = target.seed(pod("app", Some("Pending")));
        let reflector = reflector(&target, PeeringPhase::Incoming);

        process_event(&reflector, SourceEvent::Added(pod("app-remote", Some("Running"))))
            .await
            .unwrap();

        let updated = target.object("app", "worker").unwrap();
        assert_eq!(updated.status.unwrap().phase.as_deref(), Some("Running"));
        assert_eq!(updated.metadata.uid, home.metadata.uid);
        assert_eq!(target.count_calls("update_status"), 1);
        assert_eq!(target.count_calls("create"), 0);
    }

    #[tokio::test]
    async fn test_missing_home_pod_drops_event() {
        let target = FakeTarget::new();
        let reflector = reflector(&target, PeeringPhase::Bidirectional);

        let result = process_event(&reflector, SourceEvent::Added(pod("app-remote", Some("Running")))).await;
        assert!(result.unwrap_err().is_not_found());
        assert!(target.calls().is_empty());
    }

    #[tokio::test]
    async fn test_deletion_is_not_propagated() {
        let target = FakeTarget::new();
        target.seed(pod("app", Some("Running")));
        let reflector = reflector(&target, PeeringPhase::Incoming);

        process_event(&reflector, SourceEvent::Deleted(pod("app-remote", None)))
            .await
            .unwrap();
        assert_eq!(target.len(), 1);
        assert!(target.calls().is_empty());
    }

    #[tokio::test]
    async fn test_outgoing_only_peering_blocks_status() {
        let target = FakeTarget::new();
        target.seed(pod("app", Some("Pending")));
        let reflector = reflector(&target, PeeringPhase::Outgoing);

        process_event(&reflector, SourceEvent::Added(pod("app-remote", Some("Running"))))
            .await
            .unwrap();
        let home = target.object("app", "worker").unwrap();
        assert_eq!(home.status.unwrap().phase.as_deref(), Some("Pending"));
    }
}
