use crate::{
    evaluate::{self, DirectionResult, TrafficResult},
    peer::Flow,
    target::Target,
    traffic::{InternalPeer, Traffic},
};
use std::{
    collections::{btree_map::Entry, BTreeMap},
    fmt,
};
use tracing::trace;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Direction {
    Ingress,
    Egress,
}

/// The compiled form of every policy in an analysis run.
///
/// Targets are keyed by their subject's primary key. The policy is built additively and is
/// read-only once evaluation begins.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Policy {
    ingress: BTreeMap<String, Target>,
    egress: BTreeMap<String, Target>,
}

// === impl Direction ===

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ingress => "ingress".fmt(f),
            Self::Egress => "egress".fmt(f),
        }
    }
}

// === impl Policy ===

impl Policy {
    pub fn add_target(&mut self, direction: Direction, target: Target) {
        match self.targets_mut(direction).entry(target.primary_key()) {
            Entry::Occupied(mut entry) => entry.get_mut().merge(target),
            Entry::Vacant(entry) => {
                entry.insert(target);
            }
        }
    }

    pub fn targets(&self, direction: Direction) -> impl Iterator<Item = &Target> + '_ {
        match direction {
            Direction::Ingress => self.ingress.values(),
            Direction::Egress => self.egress.values(),
        }
    }

    pub(crate) fn targets_mut(&mut self, direction: Direction) -> &mut BTreeMap<String, Target> {
        match direction {
            Direction::Ingress => &mut self.ingress,
            Direction::Egress => &mut self.egress,
        }
    }

    pub fn targets_applying_to_pod(
        &self,
        direction: Direction,
        pod: &InternalPeer,
    ) -> Vec<&Target> {
        self.targets(direction)
            .filter(|t| t.subject.matches(pod))
            .collect()
    }

    /// Evaluates a flow against both the destination's ingress and the source's egress.
    ///
    /// External ends have no targets, so their direction is always allowed.
    pub fn is_traffic_allowed(&self, traffic: &Traffic) -> TrafficResult {
        let ingress = match traffic.destination.internal.as_ref() {
            None => DirectionResult::no_targets(Direction::Ingress),
            Some(dst) => {
                let targets = self.targets_applying_to_pod(Direction::Ingress, dst);
                let flow = Flow {
                    subject: dst,
                    peer: &traffic.source,
                    port: traffic.resolved_port,
                    port_name: traffic.resolved_port_name.as_deref(),
                    protocol: traffic.protocol,
                };
                evaluate::direction(Direction::Ingress, &targets, &flow)
            }
        };

        let egress = match traffic.source.internal.as_ref() {
            None => DirectionResult::no_targets(Direction::Egress),
            Some(src) => {
                let targets = self.targets_applying_to_pod(Direction::Egress, src);
                let flow = Flow {
                    subject: src,
                    peer: &traffic.destination,
                    port: traffic.resolved_port,
                    port_name: traffic.resolved_port_name.as_deref(),
                    protocol: traffic.protocol,
                };
                evaluate::direction(Direction::Egress, &targets, &flow)
            }
        };

        trace!(%traffic, ingress = %ingress.verdict, egress = %egress.verdict, "Evaluated traffic");
        TrafficResult { ingress, egress }
    }
}
