use policy_assistant_k8s_api::{Labels, Selector};
use serde::Serialize;
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum PodMatcher {
    All,
    Labels(Selector),
}

impl PodMatcher {
    /// An absent or empty selector selects every pod.
    pub fn from_selector(selector: Option<Selector>) -> Self {
        match selector {
            Some(selector) if !selector.is_empty() => Self::Labels(selector),
            _ => Self::All,
        }
    }

    pub fn matches(&self, labels: &Labels) -> bool {
        match self {
            Self::All => true,
            Self::Labels(selector) => selector.matches(labels),
        }
    }
}

impl fmt::Display for PodMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => "all pods".fmt(f),
            Self::Labels(selector) => write!(f, "pods matching {selector}"),
        }
    }
}
