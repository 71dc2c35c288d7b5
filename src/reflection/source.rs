//! Source-cluster watch feeds
//!
//! `kube::runtime::watcher` reports every change as an `Apply`. Reflectors
//! need to tell creations from updates and need the previous object on
//! update, so [`WatchClassifier`] keeps the last seen version of each
//! object and turns the watcher protocol into [`SourceEvent`]s.

use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;

use futures::stream::{self, BoxStream, StreamExt};
use kube::{
    api::Api,
    runtime::{watcher, WatchStreamExt},
    Client, ResourceExt,
};

use super::{ReflectedResource, SourceEvent};

/// Per-namespace event feed for objects of kind `K`
pub trait EventSource<K>: Send + Sync {
    /// Open a watch on `namespace`. The stream ends only when the feed is closed for good.
    fn watch(&self, namespace: &str) -> BoxStream<'static, SourceEvent<K>>;
}

/// Turns watcher events into added/modified/deleted events
#[derive(Debug)]
pub struct WatchClassifier<K> {
    seen: HashMap<String, K>,
    relisted: Option<HashSet<String>>,
}

impl<K> Default for WatchClassifier<K> {
    fn default() -> Self {
        Self {
            seen: HashMap::new(),
            relisted: None,
        }
    }
}

impl<K: ReflectedResource> WatchClassifier<K> {
    pub fn new() -> Self {
        Self::default()
    }

    fn upsert(&mut self, obj: K) -> SourceEvent<K> {
        match self.seen.insert(obj.name_any(), obj.clone()) {
            Some(old) => SourceEvent::Modified { new: obj, old },
            None => SourceEvent::Added(obj),
        }
    }

    pub fn classify(&mut self, event: watcher::Event<K>) -> Vec<SourceEvent<K>> {
        match event {
            watcher::Event::Apply(obj) => vec![self.upsert(obj)],
            watcher::Event::Delete(obj) => {
                self.seen.remove(&obj.name_any());
                vec![SourceEvent::Deleted(obj)]
            }
            watcher::Event::Init => {
                self.relisted = Some(HashSet::new());
                Vec::new()
            }
            watcher::Event::InitApply(obj) => {
                if let Some(relisted) = self.relisted.as_mut() {
                    relisted.insert(obj.name_any());
                }
                vec![self.upsert(obj)]
            }
            // objects missing from a relist were deleted while the watch was down
            watcher::Event::InitDone => {
                let Some(relisted) = self.relisted.take() else {
                    return Vec::new();
                };
                let gone: Vec<String> = self
                    .seen
                    .keys()
                    .filter(|name| !relisted.contains(*name))
                    .cloned()
                    .collect();
                gone.into_iter()
                    .filter_map(|name| self.seen.remove(&name))
                    .map(SourceEvent::Deleted)
                    .collect()
            }
        }
    }
}

/// [`EventSource`] backed by a namespaced kube watcher
pub struct KubeEventSource<K> {
    client: Client,
    config: watcher::Config,
    _kind: PhantomData<fn() -> K>,
}

impl<K: ReflectedResource> KubeEventSource<K> {
    pub fn new(client: Client, config: watcher::Config) -> Self {
        Self {
            client,
            config,
            _kind: PhantomData,
        }
    }
}

impl<K: ReflectedResource> EventSource<K> for KubeEventSource<K> {
    fn watch(&self, namespace: &str) -> BoxStream<'static, SourceEvent<K>> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);

        watcher(api, self.config.clone())
            .default_backoff()
            .scan(WatchClassifier::new(), |classifier, event| {
                let events = match event {
                    Ok(event) => classifier.classify(event),
                    Err(e) => vec![SourceEvent::Error(e.to_string())],
                };
                futures::future::ready(Some(stream::iter(events)))
            })
            .flatten()
            .boxed()
    }
}
