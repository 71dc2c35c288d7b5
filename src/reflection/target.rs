//! Terminal push operations against the target cluster

use std::marker::PhantomData;

use async_trait::async_trait;
use kube::{
    api::{Api, DeleteParams, Patch, PatchParams, PostParams},
    Client, ResourceExt,
};
use serde_json::json;

use super::ReflectedResource;

/// Namespaced write surface of the target cluster for kind `K`
#[async_trait]
pub trait TargetClient<K>: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<K, kube::Error>;
    async fn create(&self, namespace: &str, obj: &K) -> Result<K, kube::Error>;
    async fn update(&self, namespace: &str, obj: &K) -> Result<K, kube::Error>;
    async fn update_status(&self, namespace: &str, obj: &K) -> Result<K, kube::Error>;
    async fn delete(&self, namespace: &str, name: &str) -> Result<(), kube::Error>;
}

/// [`TargetClient`] backed by a kube client. Cheap to clone, safe to share.
pub struct KubeTarget<K> {
    client: Client,
    field_manager: String,
    _kind: PhantomData<fn() -> K>,
}

impl<K> Clone for KubeTarget<K> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            field_manager: self.field_manager.clone(),
            _kind: PhantomData,
        }
    }
}

impl<K: ReflectedResource> KubeTarget<K> {
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
            _kind: PhantomData,
        }
    }

    fn api(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl<K: ReflectedResource> TargetClient<K> for KubeTarget<K> {
    async fn get(&self, namespace: &str, name: &str) -> Result<K, kube::Error> {
        self.api(namespace).get(name).await
    }

    async fn create(&self, namespace: &str, obj: &K) -> Result<K, kube::Error> {
        self.api(namespace).create(&self.post_params(), obj).await
    }

    async fn update(&self, namespace: &str, obj: &K) -> Result<K, kube::Error> {
        self.api(namespace)
            .replace(&obj.name_any(), &self.post_params(), obj)
            .await
    }

    async fn update_status(&self, namespace: &str, obj: &K) -> Result<K, kube::Error> {
        let value = serde_json::to_value(obj).map_err(kube::Error::SerdeError)?;
        let patch = json!({ "status": value.get("status").cloned().unwrap_or_default() });
        self.api(namespace)
            .patch_status(
                &obj.name_any(),
                &PatchParams::apply(&self.field_manager),
                &Patch::Merge(&patch),
            )
            .await
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), kube::Error> {
        self.api(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
    }
}
