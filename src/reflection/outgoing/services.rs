use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use kube::api::ObjectMeta;
use kube::runtime::watcher;

use super::{cleanup, push, translate_add, translate_delete, translate_update};
use crate::error::Result;
use crate::reflection::{
    ApiReflector, NamespacePair, ReflectionContext, ReflectorCore, ReflectorHandles,
    ResourceRequirement, SpecializedReflector, TargetEvent,
};

/// Mirrors the spec of home Services
///
/// Cluster IPs and node ports are allocated by each cluster. They are left
/// unset on create and kept from the foreign object on update. Headless
/// Services keep `clusterIP: None`.
pub struct ServicesReflector {
    core: ReflectorCore,
    handles: ReflectorHandles<Service>,
}

fn same_port(a: &ServicePort, b: &ServicePort) -> bool {
    a.port == b.port && a.protocol.as_deref().unwrap_or("TCP") == b.protocol.as_deref().unwrap_or("TCP")
}

/// `clusterIP` of a headless Service, set by the user rather than allocated
const HEADLESS: &str = "None";

/// Source spec with cluster-assigned fields taken from `allocated`
fn portable_spec(source: &ServiceSpec, allocated: Option<&ServiceSpec>) -> ServiceSpec {
    let mut spec = source.clone();
    if source.cluster_ip.as_deref() != Some(HEADLESS) {
        spec.cluster_ip = allocated.and_then(|a| a.cluster_ip.clone());
        spec.cluster_ips = allocated.and_then(|a| a.cluster_ips.clone());
    }
    spec.health_check_node_port = allocated.and_then(|a| a.health_check_node_port);

    let allocated_ports = allocated.and_then(|a| a.ports.as_deref()).unwrap_or_default();
    if let Some(ports) = spec.ports.as_mut() {
        for port in ports.iter_mut() {
            let node_port = allocated_ports
                .iter()
                .find(|p| same_port(p, port))
                .and_then(|p| p.node_port);
            port.node_port = node_port;
        }
    }
    spec
}

impl ServicesReflector {
    pub fn new(core: ReflectorCore, handles: ReflectorHandles<Service>) -> Self {
        Self { core, handles }
    }

    fn forge(source: &Service, metadata: ObjectMeta, cached: Option<&Service>) -> Service {
        Service {
            metadata,
            spec: source
                .spec
                .as_ref()
                .map(|spec| portable_spec(spec, cached.and_then(|c| c.spec.as_ref()))),
            status: None,
        }
    }
}

#[async_trait]
impl SpecializedReflector for ServicesReflector {
    type Object = Service;

    fn core(&self) -> &ReflectorCore {
        &self.core
    }

    fn handles(&self) -> &ReflectorHandles<Service> {
        &self.handles
    }

    fn pre_add(&self, obj: &Service) -> Result<Option<TargetEvent<Service>>> {
        translate_add(&self.core, obj, |metadata, cached| Self::forge(obj, metadata, cached))
    }

    fn pre_update(&self, new: &Service, _old: &Service) -> Result<Option<TargetEvent<Service>>> {
        translate_update(&self.core, self.handles.cache(), new, |metadata, cached| {
            Self::forge(new, metadata, cached)
        })
    }

    fn pre_delete(&self, obj: &Service) -> Result<Option<TargetEvent<Service>>> {
        translate_delete(&self.core, obj)
    }

    async fn handle_event(&self, event: TargetEvent<Service>) -> Result<()> {
        push(&self.core, self.handles.target(), event).await
    }

    async fn cleanup_namespace(&self, pair: &NamespacePair) {
        cleanup(&self.core, &self.handles, pair).await
    }
}

pub(super) fn build(
    ctx: &ReflectionContext,
    requirement: ResourceRequirement,
) -> BoxFuture<'_, Result<Box<dyn ApiReflector>>> {
    Box::pin(async move {
        let handles = ctx
            .outgoing_handles::<Service>(requirement.kind, watcher::Config::default())
            .await?;
        let reflector = Arc::new(ServicesReflector::new(ctx.core(requirement), handles));
        Ok(Box::new(reflector) as Box<dyn ApiReflector>)
    })
}
