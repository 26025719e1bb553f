//! Compiles Kubernetes policy documents into the matcher model.
//!
//! NetworkPolicies, AdminNetworkPolicies and the BaselineAdminNetworkPolicy are each turned into
//! ingress and egress [`Target`]s, which the [`Policy`] merges by subject. Rule and peer order is
//! preserved for the admin tiers.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod admin;
mod network_policy;


use policy_assistant_core::{Direction, Policy, PolicyRef, Protocol, Target};
use policy_assistant_k8s_api::{
    labels::SelectorError, network::CidrParseError, AdminNetworkPolicy,
    BaselineAdminNetworkPolicy, NetworkPolicy,
};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// A policy document that cannot be compiled.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid policy {policy}: {reason}")]
pub struct InvalidPolicy {
    pub policy: PolicyRef,
    pub reason: Reason,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Reason {
    #[error(transparent)]
    Selector(#[from] SelectorError),

    #[error(transparent)]
    Cidr(#[from] CidrParseError),

    #[error("unknown protocol {0:?}")]
    Protocol(String),

    #[error("unknown policy type {0:?}")]
    PolicyType(String),

    #[error("port {0} is outside of [1, 65535]")]
    PortOutOfRange(i64),

    #[error("endPort requires a numeric port")]
    EndPortWithoutNumber,

    #[error("endPort {end_port} must not be less than port {port}")]
    EndPortBeforePort { port: i32, end_port: i32 },

    #[error("ipBlock must not be combined with namespaceSelector or podSelector")]
    IpBlockWithSelectors,

    #[error("peer must set one of ipBlock, namespaceSelector or podSelector")]
    EmptyPeer,

    #[error("priority {0} is outside of [0, 1000]")]
    PriorityOutOfRange(i32),

    #[error("priority {priority} is already used by {other}")]
    DuplicatePriority { priority: i32, other: PolicyRef },

    #[error("exactly one of {0} must be set")]
    ExactlyOne(&'static str),

    #[error("rule {0} has no action")]
    MissingAction(String),

    #[error("rule {0} has no peers")]
    MissingPeers(String),

    #[error("port range [{start}, {end}] must have start < end")]
    PortRange { start: i32, end: i32 },

    #[error("Pass is not a valid baseline action (rule {0})")]
    BaselinePass(String),
}

/// Compiles all documents into a single policy.
///
/// Admin policies must have distinct priorities. When several baseline policies are supplied,
/// only the last is used.
pub fn build_policy(
    netpols: &[NetworkPolicy],
    anps: &[AdminNetworkPolicy],
    banps: &[BaselineAdminNetworkPolicy],
    simplify: bool,
) -> Result<Policy, InvalidPolicy> {
    let mut policy = Policy::default();

    for netpol in netpols {
        for (direction, target) in network_policy::targets(netpol)? {
            policy.add_target(direction, target);
        }
    }

    let mut priorities = BTreeMap::<i32, PolicyRef>::new();
    for anp in anps {
        let (source, targets) = admin::admin_targets(anp)?;
        if let Some(other) = priorities.insert(anp.spec.priority, source.clone()) {
            return Err(InvalidPolicy {
                policy: source,
                reason: Reason::DuplicatePriority {
                    priority: anp.spec.priority,
                    other,
                },
            });
        }
        add_all(&mut policy, targets);
    }

    if banps.len() > 1 {
        warn!(
            count = banps.len(),
            "Multiple BaselineAdminNetworkPolicies provided; only the last is used"
        );
    }
    if let Some(banp) = banps.last() {
        add_all(&mut policy, admin::baseline_targets(banp)?);
    }

    if simplify {
        policy.simplify();
    }
    debug!(
        ingress = policy.targets(Direction::Ingress).count(),
        egress = policy.targets(Direction::Egress).count(),
        "Built policy"
    );
    Ok(policy)
}

fn add_all(policy: &mut Policy, targets: Vec<(Direction, Target)>) {
    for (direction, target) in targets {
        policy.add_target(direction, target);
    }
}

/// Parses a protocol, defaulting to TCP.
fn protocol(protocol: Option<&str>) -> Result<Protocol, Reason> {
    match protocol {
        None => Ok(Protocol::Tcp),
        Some(p) => p.parse().map_err(|_| Reason::Protocol(p.to_string())),
    }
}

fn port_number(port: i32) -> Result<std::num::NonZeroU16, Reason> {
    u16::try_from(port)
        .ok()
        .and_then(std::num::NonZeroU16::new)
        .ok_or(Reason::PortOutOfRange(port.into()))
}
