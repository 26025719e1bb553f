//! Resolves workload identifiers to traffic peers.

use crate::{
    core::{InvalidTraffic, Protocol, Traffic, TrafficPeer},
    probe::{Pod, Resources},
};
use std::{fmt, net::IpAddr, str::FromStr};

/// Identifies one end of a flow on the command line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkloadId {
    /// `namespace/kind/name`, e.g. `x/deployment/web`.
    Workload {
        namespace: String,
        kind: String,
        name: String,
    },

    /// `namespace/name` names a pod.
    Pod { namespace: String, name: String },

    /// A bare address. It is external unless it is a known pod's IP.
    Ip(IpAddr),
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("no pod matches {0}")]
    NotFound(WorkloadId),

    #[error("port {port:?} is not served by {destination} over {protocol}")]
    UnknownPortName {
        port: String,
        destination: WorkloadId,
        protocol: Protocol,
    },

    #[error("named port {0:?} cannot be resolved for an external destination")]
    ExternalPortName(String),

    #[error(transparent)]
    Traffic(#[from] InvalidTraffic),
}

// === impl WorkloadId ===

impl FromStr for WorkloadId {
    type Err = InvalidTraffic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(ip) = s.parse() {
            return Ok(Self::Ip(ip));
        }
        let invalid = || InvalidTraffic::Workload(s.to_string());
        let parts = s.split('/').collect::<Vec<_>>();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(invalid());
        }
        match parts[..] {
            [namespace, kind, name] => Ok(Self::Workload {
                namespace: namespace.to_string(),
                kind: kind.to_ascii_lowercase(),
                name: name.to_string(),
            }),
            [namespace, name] => Ok(Self::Pod {
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for WorkloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Workload {
                namespace,
                kind,
                name,
            } => write!(f, "{namespace}/{kind}/{name}"),
            Self::Pod { namespace, name } => write!(f, "{namespace}/{name}"),
            Self::Ip(ip) => ip.fmt(f),
        }
    }
}

impl WorkloadId {
    /// Finds the pod this identifier refers to. Workloads resolve to their first pod.
    pub fn pod<'r>(&self, resources: &'r Resources) -> Option<&'r Pod> {
        resources.pods.iter().find(|pod| match self {
            Self::Workload {
                namespace,
                kind,
                name,
            } => pod.namespace == *namespace && pod.workload == format!("{kind}/{name}"),
            Self::Pod { namespace, name } => pod.namespace == *namespace && pod.name == *name,
            Self::Ip(ip) => pod.ip == Some(*ip),
        })
    }

    pub fn resolve(&self, resources: &Resources) -> Result<TrafficPeer, ResolveError> {
        match (self.pod(resources), self) {
            (Some(pod), _) => Ok(resources.traffic_peer(pod)),
            (None, Self::Ip(ip)) => Ok(TrafficPeer::external(*ip)),
            (None, id) => Err(ResolveError::NotFound(id.clone())),
        }
    }
}

/// Builds the flow between two workloads. A named port is resolved against the destination
/// pod's containers.
pub fn traffic(
    resources: &Resources,
    source: &WorkloadId,
    destination: &WorkloadId,
    port: &str,
    protocol: &str,
) -> Result<Traffic, ResolveError> {
    let src = source.resolve(resources)?;
    let dst = destination.resolve(resources)?;

    if let Ok(number) = port.parse::<i64>() {
        let name = destination.pod(resources).and_then(|pod| {
            let protocol = protocol.parse().ok()?;
            let container = pod.container_for_port(u16::try_from(number).ok()?, protocol)?;
            container.port_name.clone()
        });
        return Ok(Traffic::new(src, dst, number, name, protocol)?);
    }

    let proto = protocol.parse::<Protocol>().map_err(InvalidTraffic::from)?;
    let Some(pod) = destination.pod(resources) else {
        return Err(ResolveError::ExternalPortName(port.to_string()));
    };
    let container =
        pod.container_for_name(port, proto)
            .ok_or_else(|| ResolveError::UnknownPortName {
                port: port.to_string(),
                destination: destination.clone(),
                protocol: proto,
            })?;
    Ok(Traffic::new(
        src,
        dst,
        container.port.into(),
        Some(port.to_string()),
        protocol,
    )?)
}
