//! Direction controllers
//!
//! One controller per direction owns every reflector of that direction and
//! drives a `Stopped -> Running -> Stopped` lifecycle per namespace from the
//! mapper's start/stop signals.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::StreamExt;
use kube::api::Api;
use kube::runtime::reflector::{self, store::Writer, Store};
use kube::runtime::{watcher, WatchStreamExt};
use kube::Client;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

use super::{
    incoming, outgoing, ApiReflector, KubeEventSource, KubeTarget, NamespaceMapper, NamespacePair,
    ReflectedResource, ReflectionDirection, ReflectorCore, ReflectorHandles, ResourceKind,
    ResourceRequirement, RetryPolicy, ORIGIN_LABEL, REGISTRY,
};
use crate::error::{Error, Result};
use crate::peering::PhaseAuthority;

/// Field manager recorded on every object written to a target cluster
pub const FIELD_MANAGER: &str = "peering-reflector";

/// Builds one reflector for a registered (kind, direction)
pub type ReflectorBuilder =
    fn(&ReflectionContext, ResourceRequirement) -> BoxFuture<'_, Result<Box<dyn ApiReflector>>>;

/// Everything a reflector builder needs from the running operator
#[derive(Clone)]
pub struct ReflectionContext {
    pub home_client: Client,
    pub foreign_client: Client,
    pub mapper: Arc<dyn NamespaceMapper>,
    pub authority: Arc<PhaseAuthority>,
    pub remote_cluster_id: String,
    /// Ownership marker value, also the name of the virtual node on the home cluster
    pub origin: String,
    pub cache_sync_timeout: Duration,
    pub cleanup_policy: RetryPolicy,
}

impl ReflectionContext {
    pub fn core(&self, requirement: ResourceRequirement) -> ReflectorCore {
        ReflectorCore::new(
            requirement,
            self.remote_cluster_id.clone(),
            self.origin.clone(),
            Arc::clone(&self.mapper),
            Arc::clone(&self.authority),
        )
        .with_cleanup_policy(self.cleanup_policy.clone())
    }

    /// Start a store reflector over `client` and wait for its first list
    async fn start_cache<K: ReflectedResource>(
        &self,
        client: Client,
        kind: ResourceKind,
        config: watcher::Config,
    ) -> Result<Store<K>> {
        let writer = Writer::<K>::default();
        let store = writer.as_reader();
        let api: Api<K> = Api::all(client);

        let stream = reflector::reflector(writer, watcher(api, config)).default_backoff();
        tokio::spawn(stream.for_each(|_| futures::future::ready(())));

        let build_error = |reason: String| Error::ReflectorBuildError {
            kind: kind.to_string(),
            reason,
        };
        tokio::time::timeout(self.cache_sync_timeout, store.wait_until_ready())
            .await
            .map_err(|_| {
                build_error(format!(
                    "cache not synced within {:?}",
                    self.cache_sync_timeout
                ))
            })?
            .map_err(|e| build_error(e.to_string()))?;

        debug!(kind = %kind, "Cache synced with {} objects", store.state().len());
        Ok(store)
    }

    /// Handles for home -> foreign reflection; the cache holds objects carrying our marker
    pub async fn outgoing_handles<K: ReflectedResource>(
        &self,
        kind: ResourceKind,
        source: watcher::Config,
    ) -> Result<ReflectorHandles<K>> {
        let owned = watcher::Config::default().labels(&format!("{ORIGIN_LABEL}={}", self.origin));
        let cache = self
            .start_cache::<K>(self.foreign_client.clone(), kind, owned)
            .await?;

        Ok(ReflectorHandles::new(
            Arc::new(KubeEventSource::new(self.home_client.clone(), source)),
            Arc::new(KubeTarget::new(self.foreign_client.clone(), FIELD_MANAGER)),
            Arc::new(cache),
        ))
    }

    /// Handles for foreign -> home reflection
    pub async fn incoming_handles<K: ReflectedResource>(
        &self,
        kind: ResourceKind,
        source: watcher::Config,
        cache: watcher::Config,
    ) -> Result<ReflectorHandles<K>> {
        let cache = self
            .start_cache::<K>(self.home_client.clone(), kind, cache)
            .await?;

        Ok(ReflectorHandles::new(
            Arc::new(KubeEventSource::new(self.foreign_client.clone(), source)),
            Arc::new(KubeTarget::new(self.home_client.clone(), FIELD_MANAGER)),
            Arc::new(cache),
        ))
    }
}

struct NamespaceReflection {
    pair: NamespacePair,
    token: CancellationToken,
    tracker: TaskTracker,
}

pub struct ReflectorsController {
    direction: ReflectionDirection,
    mapper: Arc<dyn NamespaceMapper>,
    reflectors: Vec<Box<dyn ApiReflector>>,
    namespaces: Mutex<HashMap<String, NamespaceReflection>>,
}

impl ReflectorsController {
    /// Controller over already built reflectors, all of `direction`
    pub fn new(
        direction: ReflectionDirection,
        mapper: Arc<dyn NamespaceMapper>,
        reflectors: Vec<Box<dyn ApiReflector>>,
    ) -> Result<Self> {
        for (i, reflector) in reflectors.iter().enumerate() {
            if reflector.direction() != direction {
                return Err(Error::ReflectorBuildError {
                    kind: reflector.kind().to_string(),
                    reason: format!(
                        "{} reflector given to the {} controller",
                        reflector.direction(),
                        direction
                    ),
                });
            }
            if reflectors[..i].iter().any(|r| r.kind() == reflector.kind()) {
                return Err(Error::ReflectorBuildError {
                    kind: reflector.kind().to_string(),
                    reason: "registered twice".to_string(),
                });
            }
        }

        Ok(Self {
            direction,
            mapper,
            reflectors,
            namespaces: Mutex::new(HashMap::new()),
        })
    }

    pub async fn outgoing(ctx: &ReflectionContext) -> Result<Self> {
        Self::build(ReflectionDirection::Outgoing, ctx, outgoing::BUILDERS).await
    }

    pub async fn incoming(ctx: &ReflectionContext) -> Result<Self> {
        Self::build(ReflectionDirection::Incoming, ctx, incoming::BUILDERS).await
    }

    async fn build(
        direction: ReflectionDirection,
        ctx: &ReflectionContext,
        builders: &[(ResourceKind, ReflectorBuilder)],
    ) -> Result<Self> {
        let mut reflectors = Vec::new();
        for requirement in REGISTRY.iter().filter(|r| r.direction == direction) {
            let (_, build) = builders
                .iter()
                .find(|(kind, _)| *kind == requirement.kind)
                .ok_or_else(|| Error::ReflectorBuildError {
                    kind: requirement.kind.to_string(),
                    reason: format!("no {direction} builder"),
                })?;
            reflectors.push(build(ctx, *requirement).await?);
            info!(
                kind = %requirement.kind,
                direction = %direction,
                "Reflector ready, requires {} peering",
                requirement.phase
            );
        }
        Self::new(direction, Arc::clone(&ctx.mapper), reflectors)
    }

    pub fn direction(&self) -> ReflectionDirection {
        self.direction
    }

    fn namespaces(&self) -> MutexGuard<'_, HashMap<String, NamespaceReflection>> {
        self.namespaces.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_reflecting(&self, local: &str) -> bool {
        self.namespaces().contains_key(local)
    }

    /// Local namespaces currently running
    pub fn reflecting(&self) -> Vec<String> {
        let mut names: Vec<String> = self.namespaces().keys().cloned().collect();
        names.sort();
        names
    }

    /// Spawn one loop per reflector for `local`; no-op if already running
    pub fn start_namespace_reflection(&self, local: &str) -> Result<()> {
        let mut namespaces = self.namespaces();
        if namespaces.contains_key(local) {
            debug!(direction = %self.direction, "Namespace {} already reflecting", local);
            return Ok(());
        }

        let pair = NamespacePair::new(local, self.mapper.translate(local)?);
        let token = CancellationToken::new();
        let tracker = TaskTracker::new();
        for reflector in &self.reflectors {
            reflector.setup_handlers(&pair, token.clone(), &tracker);
        }
        tracker.close();

        info!(
            direction = %self.direction,
            "Started reflection of {} <-> {} for {} kinds",
            pair.local,
            pair.foreign,
            self.reflectors.len()
        );
        namespaces.insert(local.to_string(), NamespaceReflection { pair, token, tracker });
        Ok(())
    }

    fn take(&self, local: &str) -> Option<NamespaceReflection> {
        self.namespaces().remove(local)
    }

    async fn stop(&self, local: &str, cleanup: bool) {
        let Some(reflection) = self.take(local) else {
            debug!(direction = %self.direction, "Namespace {} is not reflecting", local);
            return;
        };

        reflection.token.cancel();
        reflection.tracker.wait().await;
        info!(direction = %self.direction, "Stopped reflection of {}", local);

        if cleanup {
            for reflector in &self.reflectors {
                reflector.cleanup_namespace(&reflection.pair).await;
            }
        }
    }

    /// Cancel the loops of `local`, wait for them, then clean up the target side
    pub async fn stop_namespace_reflection(&self, local: &str) {
        self.stop(local, true).await
    }

    /// Stop every namespace, leaving reflected objects in place
    pub async fn stop_all(&self) {
        let names: Vec<String> = self.namespaces().keys().cloned().collect();
        for name in names {
            self.stop(&name, false).await;
        }
    }

    /// Follow start/stop signals until both close or `shutdown` fires
    ///
    /// Pending starts are handled before pending stops. A start queued
    /// behind a stop of the same running namespace is a no-op, so that
    /// namespace ends up stopped until the mapper signals start again.
    pub async fn run(
        &self,
        mut start: UnboundedReceiver<String>,
        mut stop: UnboundedReceiver<String>,
        shutdown: CancellationToken,
    ) {
        let mut start_open = true;
        let mut stop_open = true;

        while start_open || stop_open {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                namespace = start.recv(), if start_open => match namespace {
                    Some(namespace) => {
                        if let Err(e) = self.start_namespace_reflection(&namespace) {
                            error!(direction = %self.direction, "Cannot start reflection of {}: {}", namespace, e);
                        }
                    }
                    None => start_open = false,
                },
                namespace = stop.recv(), if stop_open => match namespace {
                    Some(namespace) => self.stop_namespace_reflection(&namespace).await,
                    None => stop_open = false,
                },
            }
        }

        info!(direction = %self.direction, "Controller shutting down");
        self.stop_all().await;
    }
}
