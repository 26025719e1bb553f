use crate::{
    jobs::{Job, Jobs},
    table::{Cell, Connectivity, Table},
};
use policy_assistant_core::Policy;
use tracing::{debug, instrument};

/// Answers probes by evaluating them against a compiled policy instead of sending traffic.
#[derive(Debug)]
pub struct SimulatedRunner<'p> {
    policy: &'p Policy,
}

impl<'p> SimulatedRunner<'p> {
    pub fn new(policy: &'p Policy) -> Self {
        Self { policy }
    }

    /// Fills a table over `pods` with the outcome of every job. A pod probing itself is always
    /// `Undefined`, whatever category its job fell into.
    #[instrument(skip_all, fields(jobs = jobs.len()))]
    pub fn run(&self, pods: impl IntoIterator<Item = String>, jobs: &Jobs) -> Table {
        let mut table = Table::new(pods);
        for job in &jobs.valid {
            set(&mut table, job, || self.probe(job));
        }
        for job in &jobs.bad_named_port {
            set(&mut table, job, || Cell::uniform(Connectivity::InvalidNamedPort));
        }
        for job in &jobs.bad_port_protocol {
            set(&mut table, job, || Cell::uniform(Connectivity::InvalidPortProtocol));
        }
        for job in &jobs.ignored {
            set(&mut table, job, || Cell::uniform(Connectivity::Undefined));
        }
        table
    }

    fn probe(&self, job: &Job) -> Cell {
        let Some(traffic) = job.traffic.as_ref() else {
            return Cell::uniform(Connectivity::CheckFailed);
        };
        let result = self.policy.is_traffic_allowed(traffic);
        debug!(%traffic, verdict = %result.verdict(), "Simulated probe");
        Cell {
            ingress: Connectivity::from_allowed(result.ingress.is_allowed()),
            egress: Connectivity::from_allowed(result.egress.is_allowed()),
            combined: Connectivity::from_allowed(result.is_allowed()),
        }
    }
}

fn set(table: &mut Table, job: &Job, cell: impl FnOnce() -> Cell) {
    let cell = if job.from == job.to {
        Cell::uniform(Connectivity::Undefined)
    } else {
        cell()
    };
    table.set(&job.from, &job.to, &job.port, job.protocol, cell);
}
