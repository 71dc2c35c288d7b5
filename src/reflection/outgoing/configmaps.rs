use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::ObjectMeta;
use kube::runtime::watcher;

use super::{cleanup, push, translate_add, translate_delete, translate_update};
use crate::error::Result;
use crate::reflection::{
    ApiReflector, NamespacePair, ReflectionContext, ReflectorCore, ReflectorHandles,
    ResourceRequirement, SpecializedReflector, TargetEvent,
};

/// Issued by every cluster in every namespace, never reflected
const ROOT_CA_CONFIGMAP: &str = "kube-root-ca.crt";

/// Mirrors `data` and `binaryData` of home ConfigMaps
pub struct ConfigMapsReflector {
    core: ReflectorCore,
    handles: ReflectorHandles<ConfigMap>,
}

impl ConfigMapsReflector {
    pub fn new(core: ReflectorCore, handles: ReflectorHandles<ConfigMap>) -> Self {
        Self { core, handles }
    }

    fn forge(source: &ConfigMap, metadata: ObjectMeta) -> ConfigMap {
        ConfigMap {
            metadata,
            data: source.data.clone(),
            binary_data: source.binary_data.clone(),
            immutable: source.immutable,
        }
    }
}

#[async_trait]
impl SpecializedReflector for ConfigMapsReflector {
    type Object = ConfigMap;

    fn core(&self) -> &ReflectorCore {
        &self.core
    }

    fn handles(&self) -> &ReflectorHandles<ConfigMap> {
        &self.handles
    }

    fn pre_add(&self, obj: &ConfigMap) -> Result<Option<TargetEvent<ConfigMap>>> {
        translate_add(&self.core, obj, |metadata, _| Self::forge(obj, metadata))
    }

    fn pre_update(
        &self,
        new: &ConfigMap,
        _old: &ConfigMap,
    ) -> Result<Option<TargetEvent<ConfigMap>>> {
        translate_update(&self.core, self.handles.cache(), new, |metadata, _| {
            Self::forge(new, metadata)
        })
    }

    fn pre_delete(&self, obj: &ConfigMap) -> Result<Option<TargetEvent<ConfigMap>>> {
        translate_delete(&self.core, obj)
    }

    async fn handle_event(&self, event: TargetEvent<ConfigMap>) -> Result<()> {
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
        let source = watcher::Config::default().fields(&format!("metadata.name!={ROOT_CA_CONFIGMAP}"));
        let handles = ctx.outgoing_handles::<ConfigMap>(requirement.kind, source).await?;
        let reflector = Arc::new(ConfigMapsReflector::new(ctx.core(requirement), handles));
        Ok(Box::new(reflector) as Box<dyn ApiReflector>)
    })
}
