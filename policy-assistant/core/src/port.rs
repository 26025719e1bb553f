use serde::{Deserialize, Serialize};
use std::{fmt, num::NonZeroU16};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Tcp,
    Udp,
    Sctp,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown protocol: {0:?}")]
pub struct ProtocolParseError(pub String);

/// References a pod's port by name or number.
///
/// Names order before numbers.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum Port {
    Name(String),
    Number(NonZeroU16),
}

/// Matches a single port (or every port) on one protocol.
///
/// A matcher whose protocol is unknown never matches. Ordering sorts by port (absent, then
/// named, then numbered) with the protocol as a tiebreaker.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PortProtocolMatcher {
    pub port: Option<Port>,
    pub protocol: Option<Protocol>,
}

/// Matches an inclusive range of port numbers on one protocol.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PortRangeMatcher {
    pub from: u16,
    pub to: u16,
    pub protocol: Protocol,
}

/// A disjunction of port and port-range matchers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct SpecificPortMatcher {
    pub ports: Vec<PortProtocolMatcher>,
    pub ranges: Vec<PortRangeMatcher>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum PortMatcher {
    All,
    Specific(SpecificPortMatcher),
}

// === impl Protocol ===

impl Protocol {
    /// Infers a protocol from a port name's `-tcp`, `-udp` or `-sctp` suffix.
    pub fn from_port_name(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        if name.ends_with("-tcp") {
            Some(Self::Tcp)
        } else if name.ends_with("-udp") {
            Some(Self::Udp)
        } else if name.ends_with("-sctp") {
            Some(Self::Sctp)
        } else {
            None
        }
    }

    pub const ALL: [Protocol; 3] = [Self::Tcp, Self::Udp, Self::Sctp];
}

impl std::str::FromStr for Protocol {
    type Err = ProtocolParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TCP" => Ok(Self::Tcp),
            "UDP" => Ok(Self::Udp),
            "SCTP" => Ok(Self::Sctp),
            _ => Err(ProtocolParseError(s.to_string())),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => "TCP".fmt(f),
            Self::Udp => "UDP".fmt(f),
            Self::Sctp => "SCTP".fmt(f),
        }
    }
}

// === impl Port ===

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Port::Number(n) => fmt::Display::fmt(n, f),
            Port::Name(n) => fmt::Display::fmt(n, f),
        }
    }
}

// === impl PortProtocolMatcher ===

impl PortProtocolMatcher {
    pub fn new(port: Option<Port>, protocol: Protocol) -> Self {
        Self {
            port,
            protocol: Some(protocol),
        }
    }

    /// A named port whose protocol is inferred from the name.
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            protocol: Protocol::from_port_name(&name),
            port: Some(Port::Name(name)),
        }
    }

    pub fn matches(&self, port: u16, port_name: Option<&str>, protocol: Protocol) -> bool {
        if self.protocol != Some(protocol) {
            return false;
        }
        match &self.port {
            None => true,
            Some(Port::Number(n)) => n.get() == port,
            Some(Port::Name(n)) => port_name == Some(n.as_str()),
        }
    }

    fn covers(&self, other: &Self) -> bool {
        self.port.is_none() && self.protocol.is_some() && self.protocol == other.protocol
    }
}

impl fmt::Display for PortProtocolMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let protocol = self
            .protocol
            .map(|p| p.to_string())
            .unwrap_or_else(|| "unknown protocol".to_string());
        match &self.port {
            None => write!(f, "all ports on {protocol}"),
            Some(port) => write!(f, "port {port} on {protocol}"),
        }
    }
}

// === impl PortRangeMatcher ===

impl PortRangeMatcher {
    pub fn matches(&self, port: u16, protocol: Protocol) -> bool {
        self.protocol == protocol && self.from <= port && port <= self.to
    }
}

impl fmt::Display for PortRangeMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ports [{}, {}] on {}", self.from, self.to, self.protocol)
    }
}

// === impl SpecificPortMatcher ===

impl SpecificPortMatcher {
    pub fn matches(&self, port: u16, port_name: Option<&str>, protocol: Protocol) -> bool {
        self.ports
            .iter()
            .any(|m| m.matches(port, port_name, protocol))
            || self.ranges.iter().any(|m| m.matches(port, protocol))
    }

    /// Sorts and deduplicates the matchers and drops single-port matchers made redundant by an
    /// all-ports matcher on the same protocol. Ranges are deduplicated but otherwise kept.
    pub fn simplify(mut self) -> Self {
        self.ports.sort();
        self.ports.dedup();
        let wildcards = self
            .ports
            .iter()
            .filter(|m| m.port.is_none())
            .cloned()
            .collect::<Vec<_>>();
        self.ports
            .retain(|m| m.port.is_none() || !wildcards.iter().any(|w| w.covers(m)));

        self.ranges.sort();
        self.ranges.dedup();
        self
    }
}

impl fmt::Display for SpecificPortMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines = self
            .ports
            .iter()
            .map(ToString::to_string)
            .chain(self.ranges.iter().map(ToString::to_string))
            .collect::<Vec<_>>();
        if lines.is_empty() {
            return "no ports".fmt(f);
        }
        lines.join("\n").fmt(f)
    }
}

// === impl PortMatcher ===

impl PortMatcher {
    pub fn matches(&self, port: u16, port_name: Option<&str>, protocol: Protocol) -> bool {
        match self {
            Self::All => true,
            Self::Specific(specific) => specific.matches(port, port_name, protocol),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    /// The union of two port matchers.
    pub fn combine(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::All, _) | (_, Self::All) => Self::All,
            (Self::Specific(a), Self::Specific(b)) => Self::Specific(
                SpecificPortMatcher {
                    ports: a.ports.iter().chain(&b.ports).cloned().collect(),
                    ranges: a.ranges.iter().chain(&b.ranges).cloned().collect(),
                }
                .simplify(),
            ),
        }
    }
}

impl fmt::Display for PortMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => "all ports, all protocols".fmt(f),
            Self::Specific(specific) => specific.fmt(f),
        }
    }
}
