use crate::{
    effect::{Effect, PolicyRef},
    namespace::NamespaceMatcher,
    pod::PodMatcher,
    port::{PortMatcher, Protocol},
    traffic::{InternalPeer, TrafficPeer},
};
use policy_assistant_k8s_api::Network;
use serde::Serialize;
use std::fmt;

/// Selects the other end of a flow, and the destination ports it may use.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum PeerMatcher {
    AllPeersPorts,
    PortsForAllPeers(PortMatcher),
    Ip {
        network: Network,
        ports: PortMatcher,
    },
    Pod {
        namespace: NamespaceMatcher,
        pod: PodMatcher,
        ports: PortMatcher,
    },
}

/// A peer matcher together with the effect it has when it matches and the policy it came from.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct PeerRule {
    pub matcher: PeerMatcher,
    pub effect: Effect,
    pub source: PolicyRef,
}

/// The flow as seen from one target: `subject` is the end the target selected, `peer` is the
/// other end.
#[derive(Copy, Clone, Debug)]
pub struct Flow<'t> {
    pub subject: &'t InternalPeer,
    pub peer: &'t TrafficPeer,
    pub port: u16,
    pub port_name: Option<&'t str>,
    pub protocol: Protocol,
}

// === impl PeerMatcher ===

impl PeerMatcher {
    pub fn matches(&self, flow: &Flow<'_>) -> bool {
        match self {
            Self::AllPeersPorts => true,
            Self::PortsForAllPeers(ports) => self.ports_match(ports, flow),
            Self::Ip { network, ports } => {
                flow.peer.ip.map(|ip| network.contains(ip)).unwrap_or(false)
                    && self.ports_match(ports, flow)
            }
            Self::Pod {
                namespace,
                pod,
                ports,
            } => {
                let Some(peer) = flow.peer.internal.as_ref() else {
                    return false;
                };
                namespace.matches(
                    &peer.namespace,
                    &peer.namespace_labels,
                    &flow.subject.namespace_labels,
                ) && pod.matches(&peer.pod_labels)
                    && self.ports_match(ports, flow)
            }
        }
    }

    fn ports_match(&self, ports: &PortMatcher, flow: &Flow<'_>) -> bool {
        ports.matches(flow.port, flow.port_name, flow.protocol)
    }

    pub fn ports(&self) -> Option<&PortMatcher> {
        match self {
            Self::AllPeersPorts => None,
            Self::PortsForAllPeers(ports) | Self::Ip { ports, .. } | Self::Pod { ports, .. } => {
                Some(ports)
            }
        }
    }

    /// Whether both matchers select the same peers, ignoring ports.
    pub fn same_peers(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::AllPeersPorts, Self::AllPeersPorts) => true,
            (Self::PortsForAllPeers(_), Self::PortsForAllPeers(_)) => true,
            (Self::Ip { network: a, .. }, Self::Ip { network: b, .. }) => a == b,
            (
                Self::Pod {
                    namespace: ns_a,
                    pod: pod_a,
                    ..
                },
                Self::Pod {
                    namespace: ns_b,
                    pod: pod_b,
                    ..
                },
            ) => ns_a == ns_b && pod_a == pod_b,
            _ => false,
        }
    }

    /// Widens this matcher's ports to include `other`'s. Both matchers must select the same
    /// peers.
    pub fn combine_ports(&self, other: &Self) -> Self {
        debug_assert!(self.same_peers(other));
        let ports = match (self.ports(), other.ports()) {
            (Some(a), Some(b)) => a.combine(b),
            _ => PortMatcher::All,
        };
        match self {
            Self::AllPeersPorts => Self::AllPeersPorts,
            Self::PortsForAllPeers(_) if ports.is_all() => Self::AllPeersPorts,
            Self::PortsForAllPeers(_) => Self::PortsForAllPeers(ports),
            Self::Ip { network, .. } => Self::Ip {
                network: network.clone(),
                ports,
            },
            Self::Pod { namespace, pod, .. } => Self::Pod {
                namespace: namespace.clone(),
                pod: pod.clone(),
                ports,
            },
        }
    }

    /// Describes the selected peers, without ports.
    pub fn describe_peers(&self) -> String {
        match self {
            Self::AllPeersPorts | Self::PortsForAllPeers(_) => "all pods, all ips".to_string(),
            Self::Ip { network, .. } => format!("ip-block: {network}"),
            Self::Pod { namespace, pod, .. } => format!("{namespace}\n{pod}"),
        }
    }

    pub fn describe_ports(&self) -> String {
        self.ports()
            .unwrap_or(&PortMatcher::All)
            .to_string()
    }
}

impl fmt::Display for PeerMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}; {}",
            self.describe_peers().replace('\n', ", "),
            self.describe_ports().replace('\n', ", ")
        )
    }
}

// === impl PeerRule ===

impl PeerRule {
    pub fn new(matcher: PeerMatcher, effect: Effect, source: PolicyRef) -> Self {
        Self {
            matcher,
            effect,
            source,
        }
    }

    pub fn matches(&self, flow: &Flow<'_>) -> bool {
        self.matcher.matches(flow)
    }
}
