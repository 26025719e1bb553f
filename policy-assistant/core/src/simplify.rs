use crate::{
    effect::{PolicyKind, PolicyRef},
    peer::{PeerMatcher, PeerRule},
    policy::{Direction, Policy},
    target::Target,
};
use std::collections::BTreeSet;
use tracing::debug;

impl Policy {
    /// Rewrites every target into an equivalent but more compact form.
    ///
    /// Exact duplicate peers are dropped. NetworkPolicy peers from the same policy that select
    /// the same peers have their ports merged, and a policy that allows all peers on all ports
    /// collapses to that single peer. Admin peers are never reordered or merged since their
    /// order is significant.
    pub fn simplify(&mut self) {
        for direction in [Direction::Ingress, Direction::Egress] {
            for target in self.targets_mut(direction).values_mut() {
                let before = target.peers.len();
                simplify_target(target);
                if target.peers.len() != before {
                    debug!(
                        %direction,
                        subject = %target.primary_key(),
                        before,
                        after = target.peers.len(),
                        "Simplified target"
                    );
                }
            }
        }
    }
}

fn simplify_target(target: &mut Target) {
    let peers = std::mem::take(&mut target.peers);
    let peers = dedup(peers);
    let peers = merge_network_policy_ports(peers);
    target.peers = absorb_all_peers_ports(peers);
}

/// Drops peers whose canonical JSON form has already been seen.
fn dedup(peers: Vec<PeerRule>) -> Vec<PeerRule> {
    let mut seen = BTreeSet::new();
    let mut unique = Vec::with_capacity(peers.len());
    for rule in peers {
        // Fields serialize in declaration order and selectors hold sorted maps.
        match serde_json::to_string(&rule) {
            Ok(key) => {
                if seen.insert(key) {
                    unique.push(rule);
                }
            }
            Err(error) => {
                debug!(%error, "Could not serialize peer; keeping it");
                unique.push(rule);
            }
        }
    }
    unique
}

fn merge_network_policy_ports(peers: Vec<PeerRule>) -> Vec<PeerRule> {
    let mut merged = Vec::<PeerRule>::with_capacity(peers.len());
    for rule in peers {
        if rule.effect.kind == PolicyKind::NetworkPolicy {
            if let Some(existing) = merged.iter_mut().find(|m| {
                m.effect.kind == PolicyKind::NetworkPolicy
                    && m.source == rule.source
                    && m.matcher.same_peers(&rule.matcher)
            }) {
                existing.matcher = existing.matcher.combine_ports(&rule.matcher);
                continue;
            }
        }
        merged.push(rule);
    }
    merged
}

/// Replaces all of a NetworkPolicy's peers with a single allow-everything peer, if it has one.
fn absorb_all_peers_ports(peers: Vec<PeerRule>) -> Vec<PeerRule> {
    let unrestricted = peers
        .iter()
        .filter(|r| {
            r.effect.kind == PolicyKind::NetworkPolicy && r.matcher == PeerMatcher::AllPeersPorts
        })
        .map(|r| r.source.clone())
        .collect::<BTreeSet<PolicyRef>>();
    if unrestricted.is_empty() {
        return peers;
    }

    let mut emitted = BTreeSet::new();
    let mut absorbed = Vec::with_capacity(peers.len());
    for rule in peers {
        if rule.effect.kind != PolicyKind::NetworkPolicy || !unrestricted.contains(&rule.source) {
            absorbed.push(rule);
        } else if emitted.insert(rule.source.clone()) {
            absorbed.push(PeerRule {
                matcher: PeerMatcher::AllPeersPorts,
                ..rule
            });
        }
    }
    absorbed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        effect::{Effect, Verdict},
        namespace::NamespaceMatcher,
        pod::PodMatcher,
        port::{Port, PortMatcher, PortProtocolMatcher, Protocol, SpecificPortMatcher},
        subject::{AdminSubject, SubjectMatcher},
    };
    use policy_assistant_k8s_api::Selector;
    use std::num::NonZeroU16;

    fn ports(ports: &[u16]) -> PortMatcher {
        PortMatcher::Specific(SpecificPortMatcher {
            ports: ports
                .iter()
                .map(|p| {
                    PortProtocolMatcher::new(
                        Some(Port::Number(NonZeroU16::new(*p).unwrap())),
                        Protocol::Tcp,
                    )
                })
                .collect(),
            ranges: vec![],
        })
    }

    fn pods_in(ns: &str, ports: PortMatcher) -> PeerMatcher {
        PeerMatcher::Pod {
            namespace: NamespaceMatcher::Exact(ns.into()),
            pod: PodMatcher::All,
            ports,
        }
    }

    fn v1_policy(rules: Vec<(&str, PeerMatcher)>) -> Policy {
        let subject = SubjectMatcher::V1 {
            namespace: "x".into(),
            pods: Selector::default(),
        };
        let mut policy = Policy::default();
        for (name, matcher) in rules {
            let source = PolicyRef::network_policy("x", name);
            let rule = PeerRule::new(matcher, Effect::NETWORK_POLICY, source.clone());
            policy.add_target(
                Direction::Ingress,
                Target::new(subject.clone(), source, vec![rule]),
            );
        }
        policy
    }

    fn peers(policy: &Policy) -> Vec<PeerMatcher> {
        policy
            .targets(Direction::Ingress)
            .flat_map(|t| t.peers.iter().map(|p| p.matcher.clone()))
            .collect()
    }

    #[test]
    fn merges_ports_of_the_same_peers() {
        let mut policy = v1_policy(vec![
            ("a", pods_in("y", ports(&[81]))),
            ("a", pods_in("z", ports(&[80]))),
            ("a", pods_in("y", ports(&[80, 81]))),
        ]);
        policy.simplify();
        assert_eq!(
            peers(&policy),
            vec![pods_in("y", ports(&[80, 81])), pods_in("z", ports(&[80]))]
        );
    }

    #[test]
    fn does_not_merge_across_policies() {
        let mut policy = v1_policy(vec![
            ("a", pods_in("y", ports(&[80]))),
            ("b", pods_in("y", ports(&[81]))),
        ]);
        let before = policy.clone();
        policy.simplify();
        assert_eq!(policy, before);
    }

    #[test]
    fn all_peers_ports_absorbs_siblings() {
        let mut policy = v1_policy(vec![
            ("a", pods_in("y", ports(&[80]))),
            ("a", PeerMatcher::PortsForAllPeers(ports(&[80]))),
            ("b", pods_in("y", ports(&[80]))),
            ("a", PeerMatcher::PortsForAllPeers(PortMatcher::All)),
        ]);
        policy.simplify();
        assert_eq!(
            peers(&policy),
            vec![PeerMatcher::AllPeersPorts, pods_in("y", ports(&[80]))]
        );

        let once = policy.clone();
        policy.simplify();
        assert_eq!(policy, once);
    }

    #[test]
    fn admin_peers_are_only_deduplicated() {
        let source = PolicyRef::admin("anp");
        let rule = |matcher: PeerMatcher, verdict| {
            PeerRule::new(matcher, Effect::admin(10, verdict), source.clone())
        };
        let mut policy = Policy::default();
        policy.add_target(
            Direction::Ingress,
            Target::new(
                SubjectMatcher::Admin(AdminSubject::Namespaces(Selector::default())),
                source.clone(),
                vec![
                    rule(pods_in("y", ports(&[81])), Verdict::Deny),
                    rule(pods_in("y", ports(&[80])), Verdict::Allow),
                    rule(pods_in("y", ports(&[81])), Verdict::Deny),
                    rule(pods_in("y", ports(&[81])), Verdict::Allow),
                ],
            ),
        );
        policy.simplify();
        assert_eq!(
            peers(&policy),
            vec![
                pods_in("y", ports(&[81])),
                pods_in("y", ports(&[80])),
                pods_in("y", ports(&[81])),
            ]
        );
    }
}
