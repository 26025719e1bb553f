use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::{fmt, net::IpAddr};

/// An IP block with optional carve-outs, as expressed by a NetworkPolicy `ipBlock`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    pub cidr: Cidr,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub except: Vec<Cidr>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Cidr {
    Addr(IpAddr),
    Net(IpNet),
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CidrParseError {
    #[error("not a valid CIDR or IP address: {0}")]
    Invalid(String),

    #[error("except {except} is not in the same address family as {cidr}")]
    FamilyMismatch { cidr: Cidr, except: Cidr },

    #[error("except {except} is not strictly contained in {cidr}")]
    NotContained { cidr: Cidr, except: Cidr },
}

// === impl Network ===

impl Network {
    /// Parses an `ipBlock`, validating that every `except` entry lies strictly inside the block.
    pub fn parse<S: AsRef<str>>(cidr: &str, except: &[S]) -> Result<Self, CidrParseError> {
        let cidr = cidr.parse::<Cidr>()?;
        let except = except
            .iter()
            .map(|e| e.as_ref().parse::<Cidr>())
            .collect::<Result<Vec<_>, _>>()?;

        for e in &except {
            if e.is_ipv6() != cidr.is_ipv6() {
                return Err(CidrParseError::FamilyMismatch {
                    cidr,
                    except: *e,
                });
            }
            if !cidr.contains(e) || IpNet::from(*e).trunc() == IpNet::from(cidr).trunc() {
                return Err(CidrParseError::NotContained {
                    cidr,
                    except: *e,
                });
            }
        }

        Ok(Self { cidr, except })
    }

    /// An address is in the block iff it is in `cidr` and in none of the `except` entries.
    pub fn contains(&self, addr: IpAddr) -> bool {
        let addr = Cidr::Addr(addr);
        self.cidr.contains(&addr) && !self.except.iter().any(|e| e.contains(&addr))
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.cidr.fmt(f)?;
        if !self.except.is_empty() {
            let except = self
                .except
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>();
            write!(f, " except [{}]", except.join(", "))?;
        }
        Ok(())
    }
}

// === impl Cidr ===

impl Cidr {
    #[inline]
    pub fn contains(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Net(this), Self::Net(other)) => this.contains(other),
            (Self::Net(this), Self::Addr(other)) => this.contains(other),
            (Self::Addr(this), Self::Net(other)) => IpNet::from(*this).contains(other),
            (Self::Addr(this), Self::Addr(other)) => this == other,
        }
    }

    pub fn is_ipv6(&self) -> bool {
        match self {
            Self::Net(net) => matches!(net, IpNet::V6(_)),
            Self::Addr(addr) => addr.is_ipv6(),
        }
    }
}

impl std::str::FromStr for Cidr {
    type Err = CidrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(net) = s.parse() {
            return Ok(Self::Net(net));
        }

        if let Ok(addr) = s.parse() {
            return Ok(Self::Addr(addr));
        }

        Err(CidrParseError::Invalid(s.to_string()))
    }
}

impl From<Cidr> for IpNet {
    fn from(cidr: Cidr) -> IpNet {
        match cidr {
            Cidr::Net(net) => net,
            Cidr::Addr(addr) => IpNet::from(addr),
        }
    }
}

impl From<IpNet> for Cidr {
    fn from(net: IpNet) -> Self {
        Self::Net(net)
    }
}

impl From<IpAddr> for Cidr {
    fn from(addr: IpAddr) -> Self {
        Self::Addr(addr)
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Addr(addr) => addr.fmt(f),
            Self::Net(net) => net.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_honors_except() {
        let net = Network::parse("10.0.0.0/16", &["10.0.1.0/24", "10.0.2.7"]).unwrap();
        assert!(net.contains("10.0.0.1".parse().unwrap()));
        assert!(net.contains("10.0.2.8".parse().unwrap()));
        assert!(!net.contains("10.0.1.9".parse().unwrap()));
        assert!(!net.contains("10.0.2.7".parse().unwrap()));
        assert!(!net.contains("10.1.0.1".parse().unwrap()));
        assert!(!net.contains("::1".parse().unwrap()));
    }

    #[test]
    fn ipv6() {
        let net = Network::parse::<&str>("fd00::/8", &[]).unwrap();
        assert!(net.contains("fd00::1".parse().unwrap()));
        assert!(!net.contains("10.0.0.1".parse().unwrap()));
    }

    #[test]
    fn invalid_blocks() {
        assert_eq!(
            Network::parse::<&str>("10.0.0.0/33", &[]),
            Err(CidrParseError::Invalid("10.0.0.0/33".to_string()))
        );
        assert!(matches!(
            Network::parse("10.0.0.0/16", &["fd00::/8"]),
            Err(CidrParseError::FamilyMismatch { .. })
        ));
        assert!(matches!(
            Network::parse("10.0.0.0/16", &["10.1.0.0/24"]),
            Err(CidrParseError::NotContained { .. })
        ));
        assert!(matches!(
            Network::parse("10.0.0.0/16", &["10.0.0.0/16"]),
            Err(CidrParseError::NotContained { .. })
        ));
    }
}
