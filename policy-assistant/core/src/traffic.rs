use crate::port::{Protocol, ProtocolParseError};
use policy_assistant_k8s_api::Labels;
use serde::{Deserialize, Serialize};
use std::{fmt, net::IpAddr};

/// A flow to evaluate. The destination port must already be resolved against the destination
/// pod; named ports carry the name of the container port they resolved from.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Traffic {
    pub source: TrafficPeer,
    pub destination: TrafficPeer,
    pub resolved_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_port_name: Option<String>,
    pub protocol: Protocol,
}

/// One end of a flow: either an in-cluster pod, or an external address.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficPeer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal: Option<InternalPeer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<IpAddr>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalPeer {
    pub namespace: String,
    #[serde(default)]
    pub namespace_labels: Labels,
    #[serde(default)]
    pub pod_labels: Labels,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvalidTraffic {
    #[error(transparent)]
    Protocol(#[from] ProtocolParseError),

    #[error("port {0} is outside of [1, 65535]")]
    Port(i64),

    #[error("external peer must have an IP address")]
    MissingIp,

    #[error("peer namespace must not be empty")]
    MissingNamespace,

    #[error("invalid workload identifier {0:?}")]
    Workload(String),
}

// === impl Traffic ===

impl Traffic {
    pub fn new(
        source: TrafficPeer,
        destination: TrafficPeer,
        port: i64,
        port_name: Option<String>,
        protocol: &str,
    ) -> Result<Self, InvalidTraffic> {
        let resolved_port = u16::try_from(port)
            .ok()
            .filter(|p| *p != 0)
            .ok_or(InvalidTraffic::Port(port))?;
        let traffic = Self {
            source,
            destination,
            resolved_port,
            resolved_port_name: port_name,
            protocol: protocol.parse()?,
        };
        traffic.validate()?;
        Ok(traffic)
    }

    /// Checks the invariants that deserialization cannot express.
    pub fn validate(&self) -> Result<(), InvalidTraffic> {
        if self.resolved_port == 0 {
            return Err(InvalidTraffic::Port(0));
        }
        self.source.validate()?;
        self.destination.validate()
    }
}

impl fmt::Display for Traffic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} ", self.source, self.destination)?;
        match &self.resolved_port_name {
            Some(name) => write!(f, "{} ({})/{}", self.resolved_port, name, self.protocol),
            None => write!(f, "{}/{}", self.resolved_port, self.protocol),
        }
    }
}

// === impl TrafficPeer ===

impl TrafficPeer {
    pub fn internal(peer: InternalPeer, ip: Option<IpAddr>) -> Self {
        Self {
            internal: Some(peer),
            ip,
        }
    }

    pub fn external(ip: IpAddr) -> Self {
        Self {
            internal: None,
            ip: Some(ip),
        }
    }

    pub fn is_external(&self) -> bool {
        self.internal.is_none()
    }

    fn validate(&self) -> Result<(), InvalidTraffic> {
        match &self.internal {
            None if self.ip.is_none() => Err(InvalidTraffic::MissingIp),
            Some(internal) if internal.namespace.is_empty() => {
                Err(InvalidTraffic::MissingNamespace)
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for TrafficPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.internal, &self.ip) {
            (Some(internal), _) => internal.fmt(f),
            (None, Some(ip)) => ip.fmt(f),
            (None, None) => "<unknown>".fmt(f),
        }
    }
}

// === impl InternalPeer ===

impl InternalPeer {
    pub fn new(
        namespace: impl Into<String>,
        namespace_labels: impl Into<Labels>,
        pod_labels: impl Into<Labels>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            namespace_labels: namespace_labels.into(),
            pod_labels: pod_labels.into(),
            workload: None,
        }
    }

    pub fn with_workload(mut self, workload: impl Into<String>) -> Self {
        self.workload = Some(workload.into());
        self
    }
}

impl fmt::Display for InternalPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.workload {
            Some(workload) => write!(f, "{}/{}", self.namespace, workload),
            None => write!(f, "{}/{}", self.namespace, self.pod_labels),
        }
    }
}
