use policy_assistant_k8s_api::{Labels, Selector};
use serde::Serialize;
use std::fmt;

/// Selects the namespace of a peer.
///
/// `SameLabels` and `NotSameLabels` compare the peer's namespace against the namespace of the
/// subject end of the flow.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum NamespaceMatcher {
    Exact(String),
    All,
    Labels(Selector),
    SameLabels(Vec<String>),
    NotSameLabels(Vec<String>),
}

impl NamespaceMatcher {
    pub fn same_labels(keys: impl IntoIterator<Item = String>) -> Self {
        Self::SameLabels(sorted(keys))
    }

    pub fn not_same_labels(keys: impl IntoIterator<Item = String>) -> Self {
        Self::NotSameLabels(sorted(keys))
    }

    pub fn matches(&self, namespace: &str, labels: &Labels, subject_labels: &Labels) -> bool {
        match self {
            Self::Exact(ns) => ns == namespace,
            Self::All => true,
            Self::Labels(selector) => selector.matches(labels),
            Self::SameLabels(keys) => {
                !keys.is_empty()
                    && keys.iter().all(|k| match (labels.get(k), subject_labels.get(k)) {
                        (Some(a), Some(b)) => a == b,
                        _ => false,
                    })
            }
            Self::NotSameLabels(keys) => {
                let mut differs = false;
                for k in keys {
                    match (labels.get(k), subject_labels.get(k)) {
                        (Some(a), Some(b)) => differs |= a != b,
                        _ => return false,
                    }
                }
                differs
            }
        }
    }
}

fn sorted(keys: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut keys = keys.into_iter().collect::<Vec<_>>();
    keys.sort();
    keys.dedup();
    keys
}

impl fmt::Display for NamespaceMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(ns) => write!(f, "namespace {ns}"),
            Self::All => "all namespaces".fmt(f),
            Self::Labels(selector) => write!(f, "namespaces matching {selector}"),
            Self::SameLabels(keys) => write!(f, "namespaces with same labels [{}]", keys.join(",")),
            Self::NotSameLabels(keys) => {
                write!(f, "namespaces with different labels [{}]", keys.join(","))
            }
        }
    }
}
