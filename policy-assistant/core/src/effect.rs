use serde::Serialize;
use std::fmt;

/// The tier a rule comes from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum PolicyKind {
    #[serde(rename = "NPv1")]
    NetworkPolicy,
    #[serde(rename = "ANP")]
    Admin,
    #[serde(rename = "BANP")]
    BaselineAdmin,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Verdict {
    None,
    Allow,
    Deny,
    Pass,
}

/// What a matching peer contributes to a decision.
///
/// Only admin policies carry a meaningful priority.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Effect {
    pub kind: PolicyKind,
    pub priority: i32,
    pub verdict: Verdict,
}

/// Identifies the policy a rule was built from, e.g. `[NPv1] ns/name` or `[ANP] name`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PolicyRef {
    pub kind: PolicyKind,
    pub namespace: Option<String>,
    pub name: String,
}

// === impl PolicyKind ===

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NetworkPolicy => "NPv1".fmt(f),
            Self::Admin => "ANP".fmt(f),
            Self::BaselineAdmin => "BANP".fmt(f),
        }
    }
}

// === impl Verdict ===

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => "None".fmt(f),
            Self::Allow => "Allow".fmt(f),
            Self::Deny => "Deny".fmt(f),
            Self::Pass => "Pass".fmt(f),
        }
    }
}

// === impl Effect ===

impl Effect {
    pub const NETWORK_POLICY: Self = Self {
        kind: PolicyKind::NetworkPolicy,
        priority: 0,
        verdict: Verdict::Allow,
    };

    pub fn admin(priority: i32, verdict: Verdict) -> Self {
        Self {
            kind: PolicyKind::Admin,
            priority,
            verdict,
        }
    }

    pub fn baseline(verdict: Verdict) -> Self {
        Self {
            kind: PolicyKind::BaselineAdmin,
            priority: 0,
            verdict,
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            PolicyKind::Admin => write!(f, "{} (priority {})", self.verdict, self.priority),
            _ => self.verdict.fmt(f),
        }
    }
}

// === impl PolicyRef ===

impl PolicyRef {
    pub fn network_policy(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: PolicyKind::NetworkPolicy,
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    pub fn admin(name: impl Into<String>) -> Self {
        Self {
            kind: PolicyKind::Admin,
            namespace: None,
            name: name.into(),
        }
    }

    pub fn baseline(name: impl Into<String>) -> Self {
        Self {
            kind: PolicyKind::BaselineAdmin,
            namespace: None,
            name: name.into(),
        }
    }
}

impl fmt::Display for PolicyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "[{}] {}/{}", self.kind, ns, self.name),
            None => write!(f, "[{}] {}", self.kind, self.name),
        }
    }
}
