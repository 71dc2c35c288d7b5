//! ForeignCluster Custom Resource Definition
//!
//! A ForeignCluster describes a peer cluster discovered by the home cluster.
//! Its status carries the peering conditions negotiated so far, from which
//! the peering phase is derived.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::peering::PeeringPhase;

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "discovery.liqo.io",
    version = "v1alpha1",
    kind = "ForeignCluster",
    status = "ForeignClusterStatus",
    shortname = "fc",
    printcolumn = r#"{"name":"ClusterID","type":"string","jsonPath":".spec.clusterIdentity.clusterID"}"#,
    printcolumn = r#"{"name":"TrustMode","type":"string","jsonPath":".spec.trustMode"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ForeignClusterSpec {
    /// Identity of the peer. Defaulted at admission time when empty.
    #[serde(default)]
    pub cluster_identity: RemoteClusterIdentity,

    /// Address of the peer's authentication service
    #[serde(rename = "authURL", default)]
    pub auth_url: String,

    #[serde(default)]
    pub trust_mode: TrustMode,
}

/// Opaque stable identifier plus human-readable name of a peer cluster
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct RemoteClusterIdentity {
    #[serde(rename = "clusterID", default)]
    pub cluster_id: String,

    #[serde(rename = "clusterName", default)]
    pub cluster_name: String,
}

impl RemoteClusterIdentity {
    pub fn is_empty(&self) -> bool {
        self.cluster_id.is_empty()
    }
}

/// Whether the peer's certificate chain is trusted by the home cluster
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum TrustMode {
    #[default]
    Unknown,
    Trusted,
    Untrusted,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ForeignClusterStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub peering_conditions: Vec<PeeringCondition>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PeeringCondition {
    #[serde(rename = "type")]
    pub type_: PeeringConditionType,
    pub status: PeeringConditionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum PeeringConditionType {
    AuthenticationStatus,
    IncomingPeering,
    OutgoingPeering,
    InducedPeering,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum PeeringConditionStatus {
    #[default]
    None,
    Pending,
    Established,
    Disconnecting,
    Denied,
}

impl ForeignClusterStatus {
    fn condition(&self, type_: PeeringConditionType) -> PeeringConditionStatus {
        self.peering_conditions
            .iter()
            .find(|c| c.type_ == type_)
            .map(|c| c.status)
            .unwrap_or_default()
    }

    /// A peering direction stays enabled while it is being torn down
    fn is_enabled(&self, type_: PeeringConditionType) -> bool {
        matches!(
            self.condition(type_),
            PeeringConditionStatus::Established | PeeringConditionStatus::Disconnecting
        )
    }

    pub fn is_authenticated(&self) -> bool {
        self.condition(PeeringConditionType::AuthenticationStatus)
            == PeeringConditionStatus::Established
    }

    pub fn is_incoming_enabled(&self) -> bool {
        self.is_enabled(PeeringConditionType::IncomingPeering)
    }

    pub fn is_outgoing_enabled(&self) -> bool {
        self.is_enabled(PeeringConditionType::OutgoingPeering)
    }

    pub fn is_induced_enabled(&self) -> bool {
        self.is_enabled(PeeringConditionType::InducedPeering)
    }

    /// Phase derived from the peering conditions
    pub fn peering_phase(&self) -> PeeringPhase {
        let incoming = self.is_incoming_enabled();
        let outgoing = self.is_outgoing_enabled();

        if self.is_induced_enabled() {
            PeeringPhase::Induced
        } else if incoming && outgoing {
            PeeringPhase::Bidirectional
        } else if incoming {
            PeeringPhase::Incoming
        } else if outgoing {
            PeeringPhase::Outgoing
        } else if self.is_authenticated() {
            PeeringPhase::Authenticated
        } else {
            PeeringPhase::None
        }
    }
}

impl ForeignCluster {
    /// Phase of this peer, `None` when no status has been reported yet
    pub fn peering_phase(&self) -> PeeringPhase {
        self.status
            .as_ref()
            .map(ForeignClusterStatus::peering_phase)
            .unwrap_or_default()
    }
}
