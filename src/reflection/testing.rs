//! In-memory fakes for reflector tests

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use kube::core::ErrorResponse;
use kube::ResourceExt;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::{
    EventSource, NamespaceMapper, ObjectCache, ReflectedResource, ReflectorCore, ReflectorHandles,
    SourceEvent, TargetClient,
};
use crate::error::{Error, Result};

pub(crate) fn api_error(code: u16, reason: &str) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: format!("injected {reason}"),
        reason: reason.to_string(),
        code,
    })
}

/// Target cluster kept in memory
///
/// Assigns UIDs and resource versions the way an API server would and
/// rejects updates carrying a stale resource version. Also serves as the
/// reflector cache, so the cache always matches what was pushed.
pub(crate) struct FakeTarget<K> {
    objects: Mutex<BTreeMap<String, K>>,
    revision: AtomicU64,
    delete_failures: Mutex<VecDeque<u16>>,
    calls: Mutex<Vec<String>>,
}

impl<K: ReflectedResource> FakeTarget<K> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            objects: Mutex::new(BTreeMap::new()),
            revision: AtomicU64::new(0),
            delete_failures: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Insert an object directly, as if it had been pushed earlier
    pub(crate) fn seed(&self, mut obj: K) -> K {
        let rev = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        let meta = obj.meta_mut();
        meta.uid.get_or_insert_with(|| format!("uid-{rev}"));
        meta.resource_version = Some(rev.to_string());
        self.objects
            .lock()
            .unwrap()
            .insert(ReflectorCore::keyer(&obj.namespace().unwrap_or_default(), &obj.name_any()), obj.clone());
        obj
    }

    /// Make the next deletes fail with the given status codes, in order
    pub(crate) fn fail_deletes(&self, codes: &[u16]) {
        self.delete_failures.lock().unwrap().extend(codes);
    }

    pub(crate) fn object(&self, namespace: &str, name: &str) -> Option<K> {
        self.objects
            .lock()
            .unwrap()
            .get(&ReflectorCore::keyer(namespace, name))
            .cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn count_calls(&self, op: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(op))
            .count()
    }

    fn log(&self, op: &str, key: &str) {
        self.calls.lock().unwrap().push(format!("{op} {key}"));
    }

    fn next_revision(&self) -> String {
        (self.revision.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }
}

#[async_trait]
impl<K: ReflectedResource> TargetClient<K> for FakeTarget<K> {
    async fn get(&self, namespace: &str, name: &str) -> Result<K, kube::Error> {
        self.log("get", &ReflectorCore::keyer(namespace, name));
        self.object(namespace, name)
            .ok_or_else(|| api_error(404, "NotFound"))
    }

    async fn create(&self, namespace: &str, obj: &K) -> Result<K, kube::Error> {
        let key = ReflectorCore::keyer(namespace, &obj.name_any());
        self.log("create", &key);
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&key) {
            return Err(api_error(409, "AlreadyExists"));
        }
        let mut created = obj.clone();
        let rev = self.next_revision();
        let meta = created.meta_mut();
        meta.namespace = Some(namespace.to_string());
        meta.uid = Some(format!("uid-{rev}"));
        meta.resource_version = Some(rev);
        objects.insert(key, created.clone());
        Ok(created)
    }

    async fn update(&self, namespace: &str, obj: &K) -> Result<K, kube::Error> {
        let key = ReflectorCore::keyer(namespace, &obj.name_any());
        self.log("update", &key);
        let mut objects = self.objects.lock().unwrap();
        let Some(stored) = objects.get(&key) else {
            return Err(api_error(404, "NotFound"));
        };
        if obj.meta().resource_version.is_some()
            && obj.meta().resource_version != stored.meta().resource_version
        {
            return Err(api_error(409, "Conflict"));
        }
        let uid = stored.meta().uid.clone();
        let mut updated = obj.clone();
        let meta = updated.meta_mut();
        meta.uid = uid;
        meta.resource_version = Some(self.next_revision());
        objects.insert(key, updated.clone());
        Ok(updated)
    }

    async fn update_status(&self, namespace: &str, obj: &K) -> Result<K, kube::Error> {
        let key = ReflectorCore::keyer(namespace, &obj.name_any());
        self.log("update_status", &key);
        let mut objects = self.objects.lock().unwrap();
        let Some(stored) = objects.get(&key) else {
            return Err(api_error(404, "NotFound"));
        };
        let uid = stored.meta().uid.clone();
        let mut updated = obj.clone();
        let meta = updated.meta_mut();
        meta.uid = uid;
        meta.resource_version = Some(self.next_revision());
        objects.insert(key, updated.clone());
        Ok(updated)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), kube::Error> {
        let key = ReflectorCore::keyer(namespace, name);
        self.log("delete", &key);
        if let Some(code) = self.delete_failures.lock().unwrap().pop_front() {
            return Err(api_error(code, "Injected"));
        }
        match self.objects.lock().unwrap().remove(&key) {
            Some(_) => Ok(()),
            None => Err(api_error(404, "NotFound")),
        }
    }
}

impl<K: ReflectedResource> ObjectCache<K> for FakeTarget<K> {
    fn get_object(&self, namespace: &str, name: &str) -> Result<Arc<K>> {
        self.object(namespace, name)
            .map(Arc::new)
            .ok_or_else(|| Error::CacheMiss {
                kind: K::kind(&()).to_string(),
                key: ReflectorCore::keyer(namespace, name),
            })
    }

    fn list_objects(&self, namespace: &str) -> Result<Vec<Arc<K>>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .values()
            .filter(|o| o.namespace().as_deref() == Some(namespace))
            .cloned()
            .map(Arc::new)
            .collect())
    }
}

/// Cache fed only by [`LaggingCache::seed`], never by pushes to a target
///
/// Stands in for a watch-fed store that has not yet seen recent writes.
pub(crate) struct LaggingCache<K> {
    objects: Mutex<BTreeMap<String, K>>,
}

impl<K: ReflectedResource> LaggingCache<K> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            objects: Mutex::new(BTreeMap::new()),
        })
    }

    pub(crate) fn seed(&self, obj: K) {
        let key = ReflectorCore::keyer(&obj.namespace().unwrap_or_default(), &obj.name_any());
        self.objects.lock().unwrap().insert(key, obj);
    }
}

impl<K: ReflectedResource> ObjectCache<K> for LaggingCache<K> {
    fn get_object(&self, namespace: &str, name: &str) -> Result<Arc<K>> {
        let key = ReflectorCore::keyer(namespace, name);
        self.objects
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .map(Arc::new)
            .ok_or_else(|| Error::CacheMiss {
                kind: K::kind(&()).to_string(),
                key,
            })
    }

    fn list_objects(&self, namespace: &str) -> Result<Vec<Arc<K>>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .values()
            .filter(|o| o.namespace().as_deref() == Some(namespace))
            .cloned()
            .map(Arc::new)
            .collect())
    }
}

/// Event source fed by test code through per-namespace channels
pub(crate) struct ChannelSource<K> {
    senders: Mutex<HashMap<String, UnboundedSender<SourceEvent<K>>>>,
    receivers: Mutex<HashMap<String, UnboundedReceiver<SourceEvent<K>>>>,
}

impl<K: Send + 'static> ChannelSource<K> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            senders: Mutex::new(HashMap::new()),
            receivers: Mutex::new(HashMap::new()),
        })
    }

    /// Sender for events of `namespace`, usable before or after the watch opens
    pub(crate) fn sender(&self, namespace: &str) -> UnboundedSender<SourceEvent<K>> {
        let mut senders = self.senders.lock().unwrap();
        senders
            .entry(namespace.to_string())
            .or_insert_with(|| {
                let (tx, rx) = mpsc::unbounded_channel();
                self.receivers
                    .lock()
                    .unwrap()
                    .insert(namespace.to_string(), rx);
                tx
            })
            .clone()
    }
}

impl<K: Send + 'static> EventSource<K> for ChannelSource<K> {
    fn watch(&self, namespace: &str) -> BoxStream<'static, SourceEvent<K>> {
        // make sure a channel exists even if the test never sends
        drop(self.sender(namespace));
        match self.receivers.lock().unwrap().remove(namespace) {
            Some(rx) => stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|event| (event, rx))
            })
            .boxed(),
            None => stream::pending().boxed(),
        }
    }
}

/// Mapper that appends a fixed suffix to local namespace names
pub(crate) struct StaticMapper {
    suffix: String,
}

impl StaticMapper {
    pub(crate) fn suffix(suffix: &str) -> Self {
        Self {
            suffix: suffix.to_string(),
        }
    }
}

impl NamespaceMapper for StaticMapper {
    fn translate(&self, local: &str) -> Result<String> {
        Ok(format!("{local}{}", self.suffix))
    }

    fn reverse(&self, foreign: &str) -> Result<String> {
        foreign
            .strip_suffix(self.suffix.as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::NamespaceNotMapped(foreign.to_string()))
    }
}

pub(crate) fn handles<K: ReflectedResource>(
    source: &Arc<ChannelSource<K>>,
    target: &Arc<FakeTarget<K>>,
) -> ReflectorHandles<K> {
    ReflectorHandles::new(source.clone(), target.clone(), target.clone())
}
