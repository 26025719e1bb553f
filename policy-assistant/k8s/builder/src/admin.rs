use crate::{port_number, protocol, InvalidPolicy, Reason};
use policy_assistant_core::{
    AdminSubject, Direction, Effect, NamespaceMatcher, PeerMatcher, PeerRule, PodMatcher,
    PolicyRef, PortMatcher, PortProtocolMatcher, PortRangeMatcher, SpecificPortMatcher,
    SubjectMatcher, Target, Verdict,
};
use policy_assistant_k8s_api::{
    policy::{
        AdminNetworkPolicySpec, EgressRule, IngressRule, NamespacedPeer, Peer, Port, RuleAction,
        Subject,
    },
    AdminNetworkPolicy, BaselineAdminNetworkPolicy, LabelSelector, ResourceExt, Selector,
};

/// A rule of either direction, reduced to what the builder needs.
struct Rule<'r> {
    name: String,
    action: Option<RuleAction>,
    peers: &'r [Peer],
    ports: Option<&'r [Port]>,
}

pub(crate) fn admin_targets(
    anp: &AdminNetworkPolicy,
) -> Result<(PolicyRef, Vec<(Direction, Target)>), InvalidPolicy> {
    let source = PolicyRef::admin(anp.name_any());
    let priority = anp.spec.priority;
    let targets = if (0..=AdminNetworkPolicySpec::MAX_PRIORITY).contains(&priority) {
        targets(
            &source,
            &anp.spec.subject,
            &anp.spec.ingress,
            &anp.spec.egress,
            |action| Some(Effect::admin(priority, verdict(action))),
        )
    } else {
        Err(Reason::PriorityOutOfRange(priority))
    };
    match targets {
        Ok(targets) => Ok((source, targets)),
        Err(reason) => Err(InvalidPolicy {
            policy: source,
            reason,
        }),
    }
}

pub(crate) fn baseline_targets(
    banp: &BaselineAdminNetworkPolicy,
) -> Result<Vec<(Direction, Target)>, InvalidPolicy> {
    let source = PolicyRef::baseline(banp.name_any());
    targets(
        &source,
        &banp.spec.subject,
        &banp.spec.ingress,
        &banp.spec.egress,
        |action| match action {
            RuleAction::Pass => None,
            action => Some(Effect::baseline(verdict(action))),
        },
    )
    .map_err(|reason| InvalidPolicy {
        policy: source,
        reason,
    })
}

fn verdict(action: RuleAction) -> Verdict {
    match action {
        RuleAction::Allow => Verdict::Allow,
        RuleAction::Deny => Verdict::Deny,
        RuleAction::Pass => Verdict::Pass,
    }
}

/// Builds one target per direction that has rules. Peers keep rule order, then peer order.
///
/// `effect` returns `None` for actions the policy kind does not permit.
fn targets(
    source: &PolicyRef,
    subject: &Subject,
    ingress: &[IngressRule],
    egress: &[EgressRule],
    effect: impl Fn(RuleAction) -> Option<Effect>,
) -> Result<Vec<(Direction, Target)>, Reason> {
    let subject = subject_matcher(subject)?;

    let ingress = ingress
        .iter()
        .enumerate()
        .map(|(i, r)| Rule {
            name: rule_name(r.name.as_deref(), Direction::Ingress, i),
            action: r.action,
            peers: &r.from,
            ports: r.ports.as_deref(),
        })
        .collect::<Vec<_>>();
    let egress = egress
        .iter()
        .enumerate()
        .map(|(i, r)| Rule {
            name: rule_name(r.name.as_deref(), Direction::Egress, i),
            action: r.action,
            peers: &r.to,
            ports: r.ports.as_deref(),
        })
        .collect::<Vec<_>>();

    let mut targets = Vec::with_capacity(2);
    for (direction, rules) in [(Direction::Ingress, ingress), (Direction::Egress, egress)] {
        if rules.is_empty() {
            continue;
        }

        let mut peers = Vec::new();
        for rule in rules {
            let action = rule
                .action
                .ok_or_else(|| Reason::MissingAction(rule.name.clone()))?;
            let effect = effect(action).ok_or_else(|| Reason::BaselinePass(rule.name.clone()))?;
            if rule.peers.is_empty() {
                return Err(Reason::MissingPeers(rule.name));
            }
            let ports = port_matcher(rule.ports)?;
            for peer in rule.peers {
                let matcher = peer_matcher(peer, ports.clone())?;
                peers.push(PeerRule::new(matcher, effect, source.clone()));
            }
        }
        targets.push((direction, Target::new(subject.clone(), source.clone(), peers)));
    }
    Ok(targets)
}

fn rule_name(name: Option<&str>, direction: Direction, index: usize) -> String {
    match name {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!("{direction}[{index}]"),
    }
}

fn subject_matcher(subject: &Subject) -> Result<SubjectMatcher, Reason> {
    let subject = match (&subject.namespaces, &subject.pods) {
        (Some(namespaces), None) => AdminSubject::Namespaces(selector(namespaces)?),
        (None, Some(pods)) => AdminSubject::Pods {
            namespaces: selector(&pods.namespace_selector)?,
            pods: selector(&pods.pod_selector)?,
        },
        _ => return Err(Reason::ExactlyOne("subject.namespaces, subject.pods")),
    };
    Ok(SubjectMatcher::Admin(subject))
}

fn peer_matcher(peer: &Peer, ports: PortMatcher) -> Result<PeerMatcher, Reason> {
    let (namespace, pod) = match (&peer.namespaces, &peer.pods) {
        (Some(namespaces), None) => (namespace_matcher(namespaces)?, PodMatcher::All),
        (None, Some(pods)) => (
            namespace_matcher(&pods.namespaces)?,
            PodMatcher::from_selector(Some(selector(&pods.pod_selector)?)),
        ),
        _ => return Err(Reason::ExactlyOne("peer.namespaces, peer.pods")),
    };
    Ok(PeerMatcher::Pod {
        namespace,
        pod,
        ports,
    })
}

fn namespace_matcher(peer: &NamespacedPeer) -> Result<NamespaceMatcher, Reason> {
    match (
        &peer.namespace_selector,
        &peer.same_labels,
        &peer.not_same_labels,
    ) {
        (Some(s), None, None) => {
            let s = selector(s)?;
            Ok(if s.is_empty() {
                NamespaceMatcher::All
            } else {
                NamespaceMatcher::Labels(s)
            })
        }
        (None, Some(keys), None) => Ok(NamespaceMatcher::same_labels(keys.iter().cloned())),
        (None, None, Some(keys)) => Ok(NamespaceMatcher::not_same_labels(keys.iter().cloned())),
        _ => Err(Reason::ExactlyOne(
            "namespaceSelector, sameLabels, notSameLabels",
        )),
    }
}

/// Absent and empty port lists both select every port.
fn port_matcher(ports: Option<&[Port]>) -> Result<PortMatcher, Reason> {
    let ports = match ports {
        Some(ports) if !ports.is_empty() => ports,
        _ => return Ok(PortMatcher::All),
    };

    let mut specific = SpecificPortMatcher::default();
    for port in ports {
        match (&port.port_number, &port.named_port, &port.port_range) {
            (Some(number), None, None) => specific.ports.push(PortProtocolMatcher::new(
                Some(policy_assistant_core::Port::Number(port_number(number.port)?)),
                protocol(number.protocol.as_deref())?,
            )),
            (None, Some(name), None) => specific.ports.push(PortProtocolMatcher::named(name)),
            (None, None, Some(range)) => {
                let from = port_number(range.start)?;
                let to = port_number(range.end)?;
                if from >= to {
                    return Err(Reason::PortRange {
                        start: range.start,
                        end: range.end,
                    });
                }
                specific.ranges.push(PortRangeMatcher {
                    from: from.get(),
                    to: to.get(),
                    protocol: protocol(range.protocol.as_deref())?,
                });
            }
            _ => return Err(Reason::ExactlyOne("portNumber, namedPort, portRange")),
        }
    }
    Ok(PortMatcher::Specific(specific))
}

fn selector(selector: &LabelSelector) -> Result<Selector, Reason> {
    Ok(Selector::try_from(selector)?)
}
