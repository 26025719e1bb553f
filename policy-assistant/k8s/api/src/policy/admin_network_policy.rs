use super::{EgressRule, IngressRule, Subject};
use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// A cluster-scoped policy evaluated ahead of all NetworkPolicies.
///
/// Lower priority values are more important. Priorities must be unique among the active
/// policies.
#[derive(Clone, Debug, PartialEq, CustomResource, Deserialize, Serialize)]
#[kube(
    group = "policy.networking.k8s.io",
    version = "v1alpha1",
    kind = "AdminNetworkPolicy",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct AdminNetworkPolicySpec {
    pub priority: i32,
    pub subject: Subject,
    #[serde(default)]
    pub ingress: Vec<IngressRule>,
    #[serde(default)]
    pub egress: Vec<EgressRule>,
}

impl AdminNetworkPolicySpec {
    pub const MAX_PRIORITY: i32 = 1000;
}
