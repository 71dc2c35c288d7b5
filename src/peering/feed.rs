//! Feeds the phase authority from ForeignCluster resources
//!
//! The peering negotiation itself happens elsewhere; its outcome is
//! recorded in each ForeignCluster status, which this watcher mirrors
//! into the [`PhaseAuthority`].

use std::sync::Arc;

use futures::{StreamExt, TryStreamExt};
use kube::{
    api::Api,
    runtime::{watcher, WatchStreamExt},
    Client, ResourceExt,
};
use tracing::{debug, info, warn};

use super::{PeeringPhase, PhaseAuthority};
use crate::crd::ForeignCluster;
use crate::error::Result;

pub struct PhaseFeed {
    client: Client,
    authority: Arc<PhaseAuthority>,
}

impl PhaseFeed {
    pub fn new(client: Client, authority: Arc<PhaseAuthority>) -> Self {
        Self { client, authority }
    }

    /// Watch ForeignClusters until the stream ends
    pub async fn run(self) -> Result<()> {
        let api: Api<ForeignCluster> = Api::all(self.client.clone());
        info!("Starting peering phase feed");

        let mut events = watcher(api, watcher::Config::default())
            .default_backoff()
            .boxed();

        loop {
            match events.try_next().await {
                Ok(Some(event)) => apply_event(&self.authority, &event),
                Ok(None) => break,
                Err(e) => warn!("ForeignCluster watch error: {}", e),
            }
        }

        warn!("Peering phase feed watch closed");
        Ok(())
    }
}

/// Record the phase carried by one watcher event
pub fn apply_event(authority: &PhaseAuthority, event: &watcher::Event<ForeignCluster>) {
    match event {
        watcher::Event::Apply(fc) | watcher::Event::InitApply(fc) => {
            let cluster_id = &fc.spec.cluster_identity.cluster_id;
            if cluster_id.is_empty() {
                debug!(
                    "ForeignCluster {} has no cluster identity yet, skipping",
                    fc.name_any()
                );
                return;
            }
            authority.set_phase(cluster_id, fc.peering_phase());
        }
        watcher::Event::Delete(fc) => {
            let cluster_id = &fc.spec.cluster_identity.cluster_id;
            if !cluster_id.is_empty() {
                authority.set_phase(cluster_id, PeeringPhase::None);
            }
        }
        watcher::Event::Init | watcher::Event::InitDone => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{
        ForeignClusterSpec, ForeignClusterStatus, PeeringCondition, PeeringConditionStatus,
        PeeringConditionType, RemoteClusterIdentity,
    };

    fn foreign_cluster(id: &str, incoming: bool, outgoing: bool) -> ForeignCluster {
        let mut fc = ForeignCluster::new(
            "peer",
            ForeignClusterSpec {
                cluster_identity: RemoteClusterIdentity {
                    cluster_id: id.to_string(),
                    cluster_name: "peer".to_string(),
                },
                ..Default::default()
            },
        );
        let mut conditions = vec![PeeringCondition {
            type_: PeeringConditionType::AuthenticationStatus,
            status: PeeringConditionStatus::Established,
            message: None,
        }];
        for (enabled, type_) in [
            (incoming, PeeringConditionType::IncomingPeering),
            (outgoing, PeeringConditionType::OutgoingPeering),
        ] {
            if enabled {
                conditions.push(PeeringCondition {
                    type_,
                    status: PeeringConditionStatus::Established,
                    message: None,
                });
            }
        }
        fc.status = Some(ForeignClusterStatus {
            peering_conditions: conditions,
        });
        fc
    }

    #[test]
    fn test_feed_tracks_updates_and_deletion() {
        let authority = PhaseAuthority::new();

        apply_event(&authority, &watcher::Event::InitApply(foreign_cluster("a", false, false)));
        assert_eq!(authority.get_phase("a"), PeeringPhase::Authenticated);

        apply_event(&authority, &watcher::Event::Apply(foreign_cluster("a", true, true)));
        assert_eq!(authority.get_phase("a"), PeeringPhase::Bidirectional);

        apply_event(&authority, &watcher::Event::Delete(foreign_cluster("a", true, true)));
        assert_eq!(authority.get_phase("a"), PeeringPhase::None);
    }

    #[test]
    fn test_feed_ignores_clusters_without_identity() {
        let authority = PhaseAuthority::new();

        apply_event(&authority, &watcher::Event::Apply(foreign_cluster("", true, false)));
        assert_eq!(authority.get_phase(""), PeeringPhase::None);
    }
}
