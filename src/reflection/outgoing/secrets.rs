use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use k8s_openapi::api::core::v1::Secret;
use kube::api::ObjectMeta;
use kube::runtime::watcher;
use kube::ResourceExt;
use tracing::debug;

use super::{cleanup, push, translate_add, translate_delete, translate_update};
use crate::error::Result;
use crate::reflection::{
    ApiReflector, NamespacePair, ReflectionContext, ReflectorCore, ReflectorHandles,
    ResourceRequirement, SpecializedReflector, TargetEvent,
};

const SERVICE_ACCOUNT_TOKEN: &str = "kubernetes.io/service-account-token";

/// Mirrors `data` and `type` of home Secrets
///
/// Service account tokens are bound to the issuing cluster and are left out;
/// the foreign cluster mints its own.
pub struct SecretsReflector {
    core: ReflectorCore,
    handles: ReflectorHandles<Secret>,
}

impl SecretsReflector {
    pub fn new(core: ReflectorCore, handles: ReflectorHandles<Secret>) -> Self {
        Self { core, handles }
    }

    fn is_reflectable(&self, secret: &Secret) -> bool {
        if secret.type_.as_deref() == Some(SERVICE_ACCOUNT_TOKEN) {
            debug!(kind = %self.core.kind(), "Skipping service account token {}", secret.name_any());
            return false;
        }
        true
    }

    fn forge(source: &Secret, metadata: ObjectMeta) -> Secret {
        Secret {
            metadata,
            data: source.data.clone(),
            string_data: source.string_data.clone(),
            type_: source.type_.clone(),
            immutable: source.immutable,
        }
    }
}

#[async_trait]
impl SpecializedReflector for SecretsReflector {
    type Object = Secret;

    fn core(&self) -> &ReflectorCore {
        &self.core
    }

    fn handles(&self) -> &ReflectorHandles<Secret> {
        &self.handles
    }

    fn pre_add(&self, obj: &Secret) -> Result<Option<TargetEvent<Secret>>> {
        if !self.is_reflectable(obj) {
            return Ok(None);
        }
        translate_add(&self.core, obj, |metadata, _| Self::forge(obj, metadata))
    }

    fn pre_update(&self, new: &Secret, _old: &Secret) -> Result<Option<TargetEvent<Secret>>> {
        if !self.is_reflectable(new) {
            return Ok(None);
        }
        translate_update(&self.core, self.handles.cache(), new, |metadata, _| {
            Self::forge(new, metadata)
        })
    }

    fn pre_delete(&self, obj: &Secret) -> Result<Option<TargetEvent<Secret>>> {
        if !self.is_reflectable(obj) {
            return Ok(None);
        }
        translate_delete(&self.core, obj)
    }

    async fn handle_event(&self, event: TargetEvent<Secret>) -> Result<()> {
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
        let source = watcher::Config::default().fields(&format!("type!={SERVICE_ACCOUNT_TOKEN}"));
        let handles = ctx.outgoing_handles::<Secret>(requirement.kind, source).await?;
        let reflector = Arc::new(SecretsReflector::new(ctx.core(requirement), handles));
        Ok(Box::new(reflector) as Box<dyn ApiReflector>)
    })
}
