use crate::resources::{Container, Pod, Resources};
use policy_assistant_core::{Port, Protocol, Traffic};
use tracing::debug;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeConfig {
    pub mode: ProbeMode,
    pub service_mode: ServiceMode,
}

/// Selects the destination ports that are probed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProbeMode {
    /// Every port served by the destination pod.
    AllAvailable,

    /// A single port, referenced by name or number, on one protocol.
    PortProtocol { port: Port, protocol: Protocol },
}

/// Controls which pod pairs can reach each other at all.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ServiceMode {
    #[default]
    Cluster,

    /// Only pods on the same node are probed; other pairs are ignored.
    Local,
}

/// A single probe from one pod to a port on another.
#[derive(Clone, Debug, PartialEq)]
pub struct Job {
    pub from: String,
    pub to: String,

    /// The port as it was requested: a number, or a name in named-port probes.
    pub port: String,
    pub protocol: Protocol,

    /// Set on valid jobs when the flow could be described.
    pub traffic: Option<Traffic>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Jobs {
    pub valid: Vec<Job>,
    pub bad_named_port: Vec<Job>,
    pub bad_port_protocol: Vec<Job>,
    pub ignored: Vec<Job>,
}

#[derive(Debug)]
pub struct JobBuilder<'r> {
    resources: &'r Resources,
}

// === impl ProbeConfig ===

impl ProbeConfig {
    pub fn all_available() -> Self {
        Self {
            mode: ProbeMode::AllAvailable,
            service_mode: ServiceMode::Cluster,
        }
    }

    pub fn port_protocol(port: Port, protocol: Protocol) -> Self {
        Self {
            mode: ProbeMode::PortProtocol { port, protocol },
            service_mode: ServiceMode::Cluster,
        }
    }

    pub fn with_service_mode(mut self, service_mode: ServiceMode) -> Self {
        self.service_mode = service_mode;
        self
    }
}

// === impl Jobs ===

impl Jobs {
    pub fn len(&self) -> usize {
        self.valid.len()
            + self.bad_named_port.len()
            + self.bad_port_protocol.len()
            + self.ignored.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// === impl JobBuilder ===

impl<'r> JobBuilder<'r> {
    pub fn new(resources: &'r Resources) -> Self {
        Self { resources }
    }

    /// Enumerates every source pod, destination pod and destination port.
    pub fn build(&self, config: &ProbeConfig) -> Jobs {
        let mut jobs = Jobs::default();
        for from in &self.resources.pods {
            for to in &self.resources.pods {
                match &config.mode {
                    ProbeMode::AllAvailable => {
                        for container in &to.containers {
                            let job = self.job(
                                from,
                                to,
                                container.port.to_string(),
                                container.protocol,
                                Some(container),
                            );
                            self.push(&mut jobs, config.service_mode, from, to, job);
                        }
                    }
                    ProbeMode::PortProtocol { port, protocol } => {
                        let (label, container) = match port {
                            Port::Name(name) => {
                                (name.clone(), to.container_for_name(name, *protocol))
                            }
                            Port::Number(n) => {
                                (n.to_string(), to.container_for_port(n.get(), *protocol))
                            }
                        };
                        let job = self.job(from, to, label, *protocol, container);
                        match (port, container) {
                            (Port::Name(_), None) => jobs.bad_named_port.push(job),
                            (Port::Number(_), None) => jobs.bad_port_protocol.push(job),
                            (_, Some(_)) => {
                                self.push(&mut jobs, config.service_mode, from, to, job)
                            }
                        }
                    }
                }
            }
        }
        debug!(
            valid = jobs.valid.len(),
            bad_named_port = jobs.bad_named_port.len(),
            bad_port_protocol = jobs.bad_port_protocol.len(),
            ignored = jobs.ignored.len(),
            "Built probe jobs"
        );
        jobs
    }

    fn push(&self, jobs: &mut Jobs, mode: ServiceMode, from: &Pod, to: &Pod, job: Job) {
        let same_node = from.node.is_some() && from.node == to.node;
        if mode == ServiceMode::Local && !same_node {
            jobs.ignored.push(job);
        } else {
            jobs.valid.push(job);
        }
    }

    fn job(
        &self,
        from: &Pod,
        to: &Pod,
        port: String,
        protocol: Protocol,
        container: Option<&Container>,
    ) -> Job {
        let traffic = container.and_then(|c| {
            let traffic = Traffic::new(
                self.resources.traffic_peer(from),
                self.resources.traffic_peer(to),
                c.port.into(),
                c.port_name.clone(),
                &protocol.to_string(),
            );
            match traffic {
                Ok(traffic) => Some(traffic),
                Err(error) => {
                    debug!(from = %from.id(), to = %to.id(), %error, "Cannot describe probe");
                    None
                }
            }
        });
        Job {
            from: from.id(),
            to: to.id(),
            port,
            protocol,
            traffic,
        }
    }
}
