//! Read-only view over previously observed target-side objects
//!
//! The cache is written by a [`kube::runtime::reflector`] running outside
//! the reflection engine; reflectors only ever read it.

use std::sync::Arc;

use kube::runtime::reflector::{ObjectRef, Store};
use kube::ResourceExt;

use super::ReflectedResource;
use crate::error::{Error, Result};

/// Lookup of cached objects of kind `K`, keyed by namespace and name
pub trait ObjectCache<K>: Send + Sync {
    fn get_object(&self, namespace: &str, name: &str) -> Result<Arc<K>>;
    fn list_objects(&self, namespace: &str) -> Result<Vec<Arc<K>>>;
}

impl<K: ReflectedResource> ObjectCache<K> for Store<K> {
    fn get_object(&self, namespace: &str, name: &str) -> Result<Arc<K>> {
        self.get(&ObjectRef::new(name).within(namespace))
            .ok_or_else(|| Error::CacheMiss {
                kind: K::kind(&()).to_string(),
                key: format!("{namespace}/{name}"),
            })
    }

    fn list_objects(&self, namespace: &str) -> Result<Vec<Arc<K>>> {
        Ok(self
            .state()
            .into_iter()
            .filter(|obj| obj.namespace().as_deref() == Some(namespace))
            .collect())
    }
}
