//! Home -> foreign reflectors
//!
//! The translation and push helpers here are shared by every outgoing kind;
//! each kind only decides which parts of its payload are portable.

mod configmaps;
mod secrets;
mod services;

use kube::api::ObjectMeta;
use kube::ResourceExt;
use tracing::{debug, error, info, warn};

pub use configmaps::ConfigMapsReflector;
pub use secrets::SecretsReflector;
pub use services::ServicesReflector;

use super::controller::ReflectorBuilder;
use super::{
    EventType, NamespacePair, ObjectCache, ReflectedResource, ReflectorCore, ReflectorHandles,
    ResourceKind, RetryOutcome, TargetClient, TargetEvent,
};
use crate::error::{is_already_exists, is_not_found, Result};

/// Outgoing builders by kind
pub const BUILDERS: &[(ResourceKind, ReflectorBuilder)] = &[
    (ResourceKind::ConfigMaps, configmaps::build),
    (ResourceKind::Secrets, secrets::build),
    (ResourceKind::Services, services::build),
];

fn key_of<K: ReflectedResource>(obj: &K) -> String {
    ReflectorCore::keyer(&obj.namespace().unwrap_or_default(), &obj.name_any())
}

/// Fresh target object built by `forge` from newly minted metadata
pub(crate) fn translate_add<K, F>(core: &ReflectorCore, obj: &K, forge: F) -> Result<Option<TargetEvent<K>>>
where
    K: ReflectedResource,
    F: FnOnce(ObjectMeta, Option<&K>) -> K,
{
    let namespace = core.target_namespace(&obj.namespace().unwrap_or_default())?;
    let metadata = core.forge_metadata(obj.meta(), &namespace);
    Ok(Some(TargetEvent::added(forge(metadata, None))))
}

/// Target object updated on top of the previously pushed one
///
/// An object never pushed (cache miss) is recast to an add.
pub(crate) fn translate_update<K, F>(
    core: &ReflectorCore,
    cache: &dyn ObjectCache<K>,
    new: &K,
    forge: F,
) -> Result<Option<TargetEvent<K>>>
where
    K: ReflectedResource,
    F: FnOnce(ObjectMeta, Option<&K>) -> K,
{
    let namespace = core.target_namespace(&new.namespace().unwrap_or_default())?;
    match cache.get_object(&namespace, &new.name_any()) {
        Ok(cached) => {
            let metadata = core.merge_metadata(new.meta(), cached.meta(), &namespace);
            Ok(Some(TargetEvent::modified(forge(metadata, Some(cached.as_ref())))))
        }
        Err(e) if e.is_not_found() => {
            info!(
                kind = %core.kind(),
                direction = %core.direction(),
                "{} not reflected yet, creating it",
                key_of(new)
            );
            let metadata = core.forge_metadata(new.meta(), &namespace);
            Ok(Some(TargetEvent::added(forge(metadata, None))))
        }
        Err(e) => Err(e),
    }
}

/// Source object moved to its target namespace
pub(crate) fn translate_delete<K: ReflectedResource>(
    core: &ReflectorCore,
    obj: &K,
) -> Result<Option<TargetEvent<K>>> {
    let namespace = core.target_namespace(&obj.namespace().unwrap_or_default())?;
    let mut target = obj.clone();
    target.meta_mut().namespace = Some(namespace);
    Ok(Some(TargetEvent::deleted(target)))
}

/// Terminal push of a translated event
///
/// A create that hits an existing object updates it instead, and a delete
/// of a missing one is the desired end state. Other delete failures are
/// left to cleanup.
pub(crate) async fn push<K: ReflectedResource>(
    core: &ReflectorCore,
    target: &dyn TargetClient<K>,
    event: TargetEvent<K>,
) -> Result<()> {
    let obj = event.object;
    let namespace = obj.namespace().unwrap_or_default();
    let key = key_of(&obj);

    match event.event_type {
        EventType::Added => match target.create(&namespace, &obj).await {
            Ok(_) => debug!(kind = %core.kind(), key = %key, "Created"),
            Err(e) if is_already_exists(&e) => return refresh_existing(core, target, obj).await,
            Err(e) => {
                error!(kind = %core.kind(), key = %key, "Create failed: {}", e);
                return Err(e.into());
            }
        },
        EventType::Modified => match target.update(&namespace, &obj).await {
            Ok(_) => debug!(kind = %core.kind(), key = %key, "Updated"),
            Err(e) => {
                if is_not_found(&e) {
                    error!(kind = %core.kind(), key = %key, "Update target vanished: {}", e);
                } else {
                    error!(kind = %core.kind(), key = %key, "Update failed: {}", e);
                }
                return Err(e.into());
            }
        },
        EventType::Deleted => match target.delete(&namespace, &obj.name_any()).await {
            Ok(()) => debug!(kind = %core.kind(), key = %key, "Deleted"),
            Err(e) if is_not_found(&e) => {
                debug!(kind = %core.kind(), key = %key, "Already deleted")
            }
            Err(e) => warn!(kind = %core.kind(), key = %key, "Delete failed: {}", e),
        },
        EventType::Error => warn!(kind = %core.kind(), key = %key, "Ignoring error event"),
    }
    Ok(())
}

/// Update an object a create found already in place
///
/// The cache lags behind our own creates, so an add recast from an update
/// can land on a copy pushed moments ago. The live object supplies the
/// resource version and UID. Objects without our marker are left alone.
async fn refresh_existing<K: ReflectedResource>(
    core: &ReflectorCore,
    target: &dyn TargetClient<K>,
    mut obj: K,
) -> Result<()> {
    let namespace = obj.namespace().unwrap_or_default();
    let key = key_of(&obj);

    let live = match target.get(&namespace, &obj.name_any()).await {
        Ok(live) => live,
        Err(e) => {
            error!(kind = %core.kind(), key = %key, "Cannot read existing object: {}", e);
            return Err(e.into());
        }
    };
    if !core.owns(live.meta()) {
        warn!(kind = %core.kind(), key = %key, "Existing object not reflected by us, leaving it");
        return Ok(());
    }

    let metadata = core.merge_metadata(obj.meta(), live.meta(), &namespace);
    *obj.meta_mut() = metadata;
    match target.update(&namespace, &obj).await {
        Ok(_) => {
            debug!(kind = %core.kind(), key = %key, "Already existed, updated");
            Ok(())
        }
        Err(e) => {
            error!(kind = %core.kind(), key = %key, "Update of existing object failed: {}", e);
            Err(e.into())
        }
    }
}

fn record_cleanup(core: &ReflectorCore, outcome: &str) {
    #[cfg(feature = "metrics")]
    crate::metrics::inc_cleanup_deletion(core.kind().as_str(), outcome);
    #[cfg(not(feature = "metrics"))]
    let _ = (core, outcome);
}

/// Delete every object this reflector pushed into the target side of `pair`
pub(crate) async fn cleanup<K: ReflectedResource>(
    core: &ReflectorCore,
    handles: &ReflectorHandles<K>,
    pair: &NamespacePair,
) {
    let namespace = pair.target(core.direction());
    let objects = match handles.cache().list_objects(namespace) {
        Ok(objects) => objects,
        Err(e) => {
            error!(kind = %core.kind(), "Cannot list reflected objects in {}: {}", namespace, e);
            return;
        }
    };

    let owned: Vec<_> = objects.into_iter().filter(|o| core.owns(o.meta())).collect();
    info!(
        kind = %core.kind(),
        direction = %core.direction(),
        "Cleaning up {} reflected objects in {}",
        owned.len(),
        namespace
    );

    for obj in owned {
        let name = obj.name_any();
        let key = ReflectorCore::keyer(namespace, &name);
        let outcome = core
            .cleanup_policy()
            .run(|| handles.target().delete(namespace, &name))
            .await;
        match outcome {
            RetryOutcome::Completed(()) => {
                debug!(kind = %core.kind(), key = %key, "Cleaned up");
                record_cleanup(core, "deleted");
            }
            RetryOutcome::Stopped(e) if is_not_found(&e) => {
                debug!(kind = %core.kind(), key = %key, "Already gone");
                record_cleanup(core, "deleted");
            }
            RetryOutcome::Stopped(e) => {
                error!(kind = %core.kind(), key = %key, "Cleanup aborted: {}", e);
                record_cleanup(core, "failed");
            }
            RetryOutcome::Exhausted(e) => {
                error!(
                    kind = %core.kind(),
                    key = %key,
                    "Giving up cleanup after {} attempts: {}",
                    core.cleanup_policy().max_attempts,
                    e
                );
                record_cleanup(core, "failed");
            }
        }
    }
}
