//! Custom Resource Definitions consumed by the peering reflector

mod foreign_cluster;


pub use foreign_cluster::{
    ForeignCluster, ForeignClusterSpec, ForeignClusterStatus, PeeringCondition,
    PeeringConditionStatus, PeeringConditionType, RemoteClusterIdentity, TrustMode,
};
