//! Tiered evaluation of a single flow.
//!
//! For each direction, every peer rule of every target selecting the subject end is tested
//! against the flow. Matching rules are then considered tier by tier:
//!
//! 1. Admin policies, in ascending priority. Only the first matching rule of each policy counts.
//!    `Allow` and `Deny` decide; `Pass` skips the remaining admin policies.
//! 2. NetworkPolicies. Any matching rule allows. If a NetworkPolicy selects the subject but none
//!    of its rules match, the subject is isolated and the flow is denied.
//! 3. The baseline admin policy, in declaration order.
//!
//! A direction with no targets at all, or in which no tier decides, is allowed. Matching rules
//! that were preempted by an earlier decision are reported as ineffective.

use crate::{
    effect::{Effect, PolicyKind, PolicyRef, Verdict},
    peer::{Flow, PeerRule},
    policy::Direction,
    target::Target,
};
use std::fmt;

/// The outcome of evaluating a flow in both directions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrafficResult {
    pub ingress: DirectionResult,
    pub egress: DirectionResult,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectionResult {
    pub direction: Direction,

    /// Either `Allow` or `Deny`.
    pub verdict: Verdict,
    pub decision: Decision,

    /// Every matching rule, in evaluation order.
    pub steps: Vec<Step>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    /// No target selects the subject end of the flow.
    NoPolicies,
    Rule(PolicyRef),
    /// A NetworkPolicy selects the subject end but none of its rules match.
    Isolated,
    /// Targets apply, but no tier produced a decision.
    NoMatch,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Step {
    pub source: PolicyRef,
    pub effect: Effect,
    pub outcome: Outcome,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Decisive,
    Pass,
    Ineffective,
}

#[derive(Default)]
struct Evaluation {
    decided: Option<(Verdict, Decision)>,
    passed: bool,
    steps: Vec<Step>,
}

pub(crate) fn direction(
    direction: Direction,
    targets: &[&Target],
    flow: &Flow<'_>,
) -> DirectionResult {
    if targets.is_empty() {
        return DirectionResult::no_targets(direction);
    }

    let isolated = targets.iter().any(|t| t.subject.is_v1());
    let matching = targets
        .iter()
        .flat_map(|t| t.peers.iter())
        .filter(|p| p.matches(flow))
        .collect::<Vec<_>>();
    let tier = |kind: PolicyKind| {
        matching
            .iter()
            .copied()
            .filter(move |p| p.effect.kind == kind)
    };

    let mut eval = Evaluation::default();

    let mut admins = Vec::<(&PolicyRef, Vec<&PeerRule>)>::new();
    for rule in tier(PolicyKind::Admin) {
        match admins.iter_mut().find(|(source, _)| **source == rule.source) {
            Some((_, rules)) => rules.push(rule),
            None => admins.push((&rule.source, vec![rule])),
        }
    }
    admins.sort_by_key(|(_, rules)| rules[0].effect.priority);
    for (_, rules) in admins {
        let mut rules = rules.into_iter();
        if let Some(first) = rules.next() {
            eval.admin(first);
        }
        for shadowed in rules {
            eval.record(shadowed, Outcome::Ineffective);
        }
    }

    let mut allowed = false;
    for rule in tier(PolicyKind::NetworkPolicy) {
        if eval.decided.is_some() {
            eval.record(rule, Outcome::Ineffective);
        } else {
            allowed = true;
            eval.record(rule, Outcome::Decisive);
        }
    }
    if eval.decided.is_none() {
        if allowed {
            let first = eval
                .steps
                .iter()
                .find(|s| s.effect.kind == PolicyKind::NetworkPolicy)
                .map(|s| s.source.clone());
            eval.decided = first.map(|source| (Verdict::Allow, Decision::Rule(source)));
        } else if isolated {
            eval.decided = Some((Verdict::Deny, Decision::Isolated));
        }
    }

    for rule in tier(PolicyKind::BaselineAdmin) {
        eval.decide_or_shadow(rule);
    }

    eval.finish(direction)
}

// === impl Evaluation ===

impl Evaluation {
    fn admin(&mut self, rule: &PeerRule) {
        if self.passed || self.decided.is_some() {
            return self.record(rule, Outcome::Ineffective);
        }
        match rule.effect.verdict {
            Verdict::Pass => {
                self.passed = true;
                self.record(rule, Outcome::Pass);
            }
            _ => self.decide_or_shadow(rule),
        }
    }

    fn decide_or_shadow(&mut self, rule: &PeerRule) {
        match rule.effect.verdict {
            Verdict::Allow | Verdict::Deny if self.decided.is_none() => {
                self.decided = Some((rule.effect.verdict, Decision::Rule(rule.source.clone())));
                self.record(rule, Outcome::Decisive);
            }
            _ => self.record(rule, Outcome::Ineffective),
        }
    }

    fn record(&mut self, rule: &PeerRule, outcome: Outcome) {
        self.steps.push(Step {
            source: rule.source.clone(),
            effect: rule.effect,
            outcome,
        });
    }

    fn finish(self, direction: Direction) -> DirectionResult {
        let (verdict, decision) = self.decided.unwrap_or((Verdict::Allow, Decision::NoMatch));
        DirectionResult {
            direction,
            verdict,
            decision,
            steps: self.steps,
        }
    }
}

// === impl TrafficResult ===

impl TrafficResult {
    pub fn is_allowed(&self) -> bool {
        self.ingress.is_allowed() && self.egress.is_allowed()
    }

    pub fn verdict(&self) -> Verdict {
        if self.is_allowed() {
            Verdict::Allow
        } else {
            Verdict::Deny
        }
    }
}

// === impl DirectionResult ===

impl DirectionResult {
    pub fn no_targets(direction: Direction) -> Self {
        Self {
            direction,
            verdict: Verdict::Allow,
            decision: Decision::NoPolicies,
            steps: vec![],
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.verdict == Verdict::Allow
    }

    /// Rules that matched but were preempted by an earlier decision.
    pub fn ineffective(&self) -> Vec<&PolicyRef> {
        let mut sources = Vec::new();
        for step in &self.steps {
            if step.outcome == Outcome::Ineffective && !sources.contains(&&step.source) {
                sources.push(&step.source);
            }
        }
        sources
    }

    /// A multi-line, human-readable trace of the decision.
    pub fn walkthrough(&self) -> String {
        let mut lines = vec![format!("{}: {}", self.verdict, self.explanation())];
        for step in &self.steps {
            lines.push(format!("  {}: {}, {}", step.source, step.effect, step.outcome));
        }
        let ineffective = self.ineffective();
        if !ineffective.is_empty() {
            let ineffective = ineffective
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>();
            lines.push(format!("ineffective rules: {}", ineffective.join(", ")));
        }
        lines.join("\n")
    }

    fn explanation(&self) -> String {
        match &self.decision {
            Decision::NoPolicies => format!("no policies targeting {}", self.direction),
            Decision::Rule(source) => format!("decided by {source}"),
            Decision::Isolated => {
                format!("{} isolated by NetworkPolicy, no rule allows it", self.direction)
            }
            Decision::NoMatch => "no rule matched".to_string(),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decisive => "decisive".fmt(f),
            Self::Pass => "passed to NetworkPolicy tier".fmt(f),
            Self::Ineffective => "ineffective".fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        peer::PeerMatcher,
        port::{Port, PortMatcher, PortProtocolMatcher, Protocol, SpecificPortMatcher},
        subject::{AdminSubject, SubjectMatcher},
        traffic::{InternalPeer, TrafficPeer},
    };
    use policy_assistant_k8s_api::{Labels, Selector};
    use std::num::NonZeroU16;

    fn pod(ns: &'static str, pod: &'static str) -> InternalPeer {
        InternalPeer::new(
            ns,
            Labels::from_iter(Some(("ns", ns))),
            Labels::from_iter(Some(("pod", pod))),
        )
    }

    fn tcp(port: u16) -> PeerMatcher {
        PeerMatcher::PortsForAllPeers(PortMatcher::Specific(SpecificPortMatcher {
            ports: vec![PortProtocolMatcher::new(
                Some(Port::Number(NonZeroU16::new(port).unwrap())),
                Protocol::Tcp,
            )],
            ranges: vec![],
        }))
    }

    fn anp(name: &str, priority: i32, rules: Vec<(PeerMatcher, Verdict)>) -> Target {
        let source = PolicyRef::admin(name);
        let peers = rules
            .into_iter()
            .map(|(m, v)| PeerRule::new(m, Effect::admin(priority, v), source.clone()))
            .collect();
        Target::new(
            SubjectMatcher::Admin(AdminSubject::Namespaces(Selector::default())),
            source,
            peers,
        )
    }

    fn banp(rules: Vec<(PeerMatcher, Verdict)>) -> Target {
        let source = PolicyRef::baseline("default");
        let peers = rules
            .into_iter()
            .map(|(m, v)| PeerRule::new(m, Effect::baseline(v), source.clone()))
            .collect();
        Target::new(
            SubjectMatcher::Admin(AdminSubject::Namespaces(Selector::default())),
            source,
            peers,
        )
    }

    fn netpol(name: &str, peers: Vec<PeerMatcher>) -> Target {
        let source = PolicyRef::network_policy("x", name);
        let peers = peers
            .into_iter()
            .map(|m| PeerRule::new(m, Effect::NETWORK_POLICY, source.clone()))
            .collect();
        Target::new(
            SubjectMatcher::V1 {
                namespace: "x".into(),
                pods: Selector::default(),
            },
            source,
            peers,
        )
    }

    fn eval(targets: &[Target], port: u16) -> DirectionResult {
        let subject = pod("x", "a");
        let peer = TrafficPeer::internal(pod("y", "b"), None);
        let flow = Flow {
            subject: &subject,
            peer: &peer,
            port,
            port_name: None,
            protocol: Protocol::Tcp,
        };
        let targets = targets.iter().collect::<Vec<_>>();
        direction(Direction::Ingress, &targets, &flow)
    }

    #[test]
    fn no_targets_allows() {
        let result = eval(&[], 80);
        assert_eq!(result.verdict, Verdict::Allow);
        assert_eq!(result.decision, Decision::NoPolicies);
        assert_eq!(
            result.walkthrough(),
            "Allow: no policies targeting ingress"
        );
    }

    #[test]
    fn admin_deny_preempts_network_policy() {
        let result = eval(
            &[
                anp("deny-80", 100, vec![(tcp(80), Verdict::Deny)]),
                netpol("allow-all", vec![PeerMatcher::AllPeersPorts]),
            ],
            80,
        );
        assert_eq!(result.verdict, Verdict::Deny);
        assert_eq!(result.decision, Decision::Rule(PolicyRef::admin("deny-80")));
        assert_eq!(
            result.ineffective(),
            vec![&PolicyRef::network_policy("x", "allow-all")]
        );
        assert_eq!(
            result.walkthrough(),
            "Deny: decided by [ANP] deny-80\n  \
             [ANP] deny-80: Deny (priority 100), decisive\n  \
             [NPv1] x/allow-all: Allow, ineffective\n\
             ineffective rules: [NPv1] x/allow-all"
        );
    }

    #[test]
    fn lowest_priority_number_wins() {
        let result = eval(
            &[
                anp("allow", 20, vec![(PeerMatcher::AllPeersPorts, Verdict::Allow)]),
                anp("deny", 10, vec![(PeerMatcher::AllPeersPorts, Verdict::Deny)]),
            ],
            80,
        );
        assert_eq!(result.verdict, Verdict::Deny);
        assert_eq!(result.steps[0].source, PolicyRef::admin("deny"));
        assert_eq!(result.steps[1].outcome, Outcome::Ineffective);
    }

    #[test]
    fn first_matching_rule_of_an_admin_policy_wins() {
        let result = eval(
            &[anp(
                "rules",
                5,
                vec![
                    (tcp(81), Verdict::Allow),
                    (tcp(80), Verdict::Deny),
                    (PeerMatcher::AllPeersPorts, Verdict::Allow),
                ],
            )],
            80,
        );
        assert_eq!(result.verdict, Verdict::Deny);
        assert_eq!(
            result.steps.iter().map(|s| s.outcome).collect::<Vec<_>>(),
            vec![Outcome::Decisive, Outcome::Ineffective]
        );
    }

    #[test]
    fn pass_falls_through_to_isolation() {
        let result = eval(
            &[
                anp("pass", 1, vec![(PeerMatcher::AllPeersPorts, Verdict::Pass)]),
                anp("allow", 2, vec![(PeerMatcher::AllPeersPorts, Verdict::Allow)]),
                netpol("only-81", vec![tcp(81)]),
            ],
            80,
        );
        assert_eq!(result.verdict, Verdict::Deny);
        assert_eq!(result.decision, Decision::Isolated);
        assert_eq!(result.steps[0].outcome, Outcome::Pass);
        assert_eq!(result.steps[1].outcome, Outcome::Ineffective);
    }

    #[test]
    fn network_policy_allow_preempts_baseline() {
        let result = eval(
            &[
                netpol("allow-80", vec![tcp(80)]),
                banp(vec![(PeerMatcher::AllPeersPorts, Verdict::Deny)]),
            ],
            80,
        );
        assert_eq!(result.verdict, Verdict::Allow);
        assert_eq!(
            result.decision,
            Decision::Rule(PolicyRef::network_policy("x", "allow-80"))
        );
        assert_eq!(result.ineffective(), vec![&PolicyRef::baseline("default")]);
    }

    #[test]
    fn baseline_decides_when_nothing_else_does() {
        let deny = [banp(vec![
            (tcp(81), Verdict::Allow),
            (PeerMatcher::AllPeersPorts, Verdict::Deny),
        ])];
        assert_eq!(eval(&deny, 80).verdict, Verdict::Deny);
        assert_eq!(eval(&deny, 81).verdict, Verdict::Allow);

        let unmatched = [banp(vec![(tcp(81), Verdict::Deny)])];
        let result = eval(&unmatched, 80);
        assert_eq!(result.verdict, Verdict::Allow);
        assert_eq!(result.decision, Decision::NoMatch);
    }
}
