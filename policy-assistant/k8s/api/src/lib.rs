#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod labels;
pub mod network;
pub mod policy;

pub use self::{
    labels::{Labels, Selector},
    network::{Cidr, Network},
    policy::{AdminNetworkPolicy, BaselineAdminNetworkPolicy},
};
pub use k8s_openapi::{
    api::{
        self,
        core::v1::{Container, ContainerPort, Namespace, Pod, PodSpec, PodStatus},
        networking::v1::{
            IPBlock, NetworkPolicy, NetworkPolicyEgressRule, NetworkPolicyIngressRule,
            NetworkPolicyPeer, NetworkPolicyPort, NetworkPolicySpec,
        },
    },
    apimachinery::pkg::{
        apis::meta::v1::{LabelSelector, LabelSelectorRequirement, ObjectMeta, OwnerReference},
        util::intstr::IntOrString,
    },
};
pub use kube::{Resource, ResourceExt};
