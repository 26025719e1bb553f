use super::{EgressRule, IngressRule, Subject};
use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// The cluster-wide fallback policy, evaluated after all NetworkPolicies.
///
/// A cluster has at most one, conventionally named `default`. `Pass` is not a valid action.
#[derive(Clone, Debug, PartialEq, CustomResource, Deserialize, Serialize)]
#[kube(
    group = "policy.networking.k8s.io",
    version = "v1alpha1",
    kind = "BaselineAdminNetworkPolicy",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct BaselineAdminNetworkPolicySpec {
    pub subject: Subject,
    #[serde(default)]
    pub ingress: Vec<IngressRule>,
    #[serde(default)]
    pub egress: Vec<EgressRule>,
}
