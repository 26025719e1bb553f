use crate::{port_number, protocol, InvalidPolicy, Reason};
use policy_assistant_core::{
    Direction, Effect, NamespaceMatcher, PeerMatcher, PeerRule, PodMatcher, PolicyRef, Port,
    PortMatcher, PortProtocolMatcher, PortRangeMatcher, SpecificPortMatcher, SubjectMatcher,
    Target,
};
use policy_assistant_k8s_api::{
    IntOrString, LabelSelector, Network, NetworkPolicy, NetworkPolicyEgressRule,
    NetworkPolicyPeer, NetworkPolicyPort, ResourceExt, Selector,
};

const DEFAULT_NAMESPACE: &str = "default";

/// Builds a target for each of the policy's types.
///
/// A target is built even when the policy has no rules for a direction, since selecting a pod
/// isolates it.
pub(crate) fn targets(netpol: &NetworkPolicy) -> Result<Vec<(Direction, Target)>, InvalidPolicy> {
    let namespace = netpol
        .namespace()
        .filter(|ns| !ns.is_empty())
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
    let source = PolicyRef::network_policy(&namespace, netpol.name_any());
    build(netpol, &namespace, &source).map_err(|reason| InvalidPolicy {
        policy: source,
        reason,
    })
}

fn build(
    netpol: &NetworkPolicy,
    namespace: &str,
    source: &PolicyRef,
) -> Result<Vec<(Direction, Target)>, Reason> {
    let spec = netpol.spec.clone().unwrap_or_default();

    let pod_selector: Option<LabelSelector> = spec.pod_selector.clone().into();
    let subject = SubjectMatcher::V1 {
        namespace: namespace.to_string(),
        pods: pod_selector
            .as_ref()
            .map(Selector::try_from)
            .transpose()?
            .unwrap_or_default(),
    };

    let mut targets = Vec::with_capacity(2);
    for direction in policy_types(spec.policy_types.as_deref(), spec.egress.as_deref())? {
        let rules = match direction {
            Direction::Ingress => spec
                .ingress
                .iter()
                .flatten()
                .map(|r| (r.ports.as_deref(), r.from.as_deref()))
                .collect::<Vec<_>>(),
            Direction::Egress => spec
                .egress
                .iter()
                .flatten()
                .map(|r| (r.ports.as_deref(), r.to.as_deref()))
                .collect::<Vec<_>>(),
        };

        let mut peers = Vec::new();
        for (ports, rule_peers) in rules {
            for matcher in rule(namespace, ports, rule_peers)? {
                peers.push(PeerRule::new(matcher, Effect::NETWORK_POLICY, source.clone()));
            }
        }
        targets.push((direction, Target::new(subject.clone(), source.clone(), peers)));
    }
    Ok(targets)
}

/// Kubernetes defaults absent policy types to Ingress, plus Egress when egress rules are set.
fn policy_types(
    types: Option<&[String]>,
    egress: Option<&[NetworkPolicyEgressRule]>,
) -> Result<Vec<Direction>, Reason> {
    let Some(types) = types.filter(|t| !t.is_empty()) else {
        let mut directions = vec![Direction::Ingress];
        if egress.map_or(false, |e| !e.is_empty()) {
            directions.push(Direction::Egress);
        }
        return Ok(directions);
    };

    let mut directions = Vec::with_capacity(2);
    for t in types {
        let direction = match t.as_str() {
            "Ingress" => Direction::Ingress,
            "Egress" => Direction::Egress,
            _ => return Err(Reason::PolicyType(t.clone())),
        };
        if !directions.contains(&direction) {
            directions.push(direction);
        }
    }
    Ok(directions)
}

fn rule(
    namespace: &str,
    ports: Option<&[NetworkPolicyPort]>,
    peers: Option<&[NetworkPolicyPeer]>,
) -> Result<Vec<PeerMatcher>, Reason> {
    let ports = ports.filter(|p| !p.is_empty()).map(port_matcher).transpose()?;
    let peers = peers.unwrap_or_default();

    if peers.is_empty() {
        return Ok(vec![match ports {
            None => PeerMatcher::AllPeersPorts,
            Some(ports) => PeerMatcher::PortsForAllPeers(ports),
        }]);
    }

    let ports = ports.unwrap_or(PortMatcher::All);
    peers
        .iter()
        .map(|peer| peer_matcher(namespace, peer, ports.clone()))
        .collect()
}

fn peer_matcher(
    namespace: &str,
    peer: &NetworkPolicyPeer,
    ports: PortMatcher,
) -> Result<PeerMatcher, Reason> {
    if let Some(block) = peer.ip_block.as_ref() {
        if peer.namespace_selector.is_some() || peer.pod_selector.is_some() {
            return Err(Reason::IpBlockWithSelectors);
        }
        let network = Network::parse(&block.cidr, block.except.as_deref().unwrap_or_default())?;
        return Ok(PeerMatcher::Ip { network, ports });
    }

    let namespace = match peer.namespace_selector.as_ref() {
        None if peer.pod_selector.is_none() => return Err(Reason::EmptyPeer),
        None => NamespaceMatcher::Exact(namespace.to_string()),
        Some(selector) => {
            let selector = Selector::try_from(selector)?;
            if selector.is_empty() {
                NamespaceMatcher::All
            } else {
                NamespaceMatcher::Labels(selector)
            }
        }
    };
    let pod = PodMatcher::from_selector(
        peer.pod_selector
            .as_ref()
            .map(Selector::try_from)
            .transpose()?,
    );

    Ok(PeerMatcher::Pod {
        namespace,
        pod,
        ports,
    })
}

fn port_matcher(ports: &[NetworkPolicyPort]) -> Result<PortMatcher, Reason> {
    let mut specific = SpecificPortMatcher::default();
    for port in ports {
        let protocol = protocol(port.protocol.as_deref())?;
        match (port.port.as_ref(), port.end_port) {
            (None, None) => specific.ports.push(PortProtocolMatcher::new(None, protocol)),
            (Some(IntOrString::Int(n)), None) => specific.ports.push(PortProtocolMatcher::new(
                Some(Port::Number(port_number(*n)?)),
                protocol,
            )),
            (Some(IntOrString::String(name)), None) => specific.ports.push(
                PortProtocolMatcher::new(Some(Port::Name(name.clone())), protocol),
            ),
            (Some(IntOrString::Int(n)), Some(end)) => {
                let from = port_number(*n)?;
                let to = port_number(end)?;
                if to < from {
                    return Err(Reason::EndPortBeforePort {
                        port: *n,
                        end_port: end,
                    });
                }
                specific.ranges.push(PortRangeMatcher {
                    from: from.get(),
                    to: to.get(),
                    protocol,
                });
            }
            (_, Some(_)) => return Err(Reason::EndPortWithoutNumber),
        }
    }
    Ok(PortMatcher::Specific(specific))
}
