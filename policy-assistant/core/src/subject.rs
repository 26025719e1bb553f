use crate::traffic::InternalPeer;
use policy_assistant_k8s_api::Selector;
use serde::Serialize;
use std::fmt;

/// Selects the pods a target governs.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum SubjectMatcher {
    /// Pods in a single namespace, as selected by a NetworkPolicy.
    V1 { namespace: String, pods: Selector },
    Admin(AdminSubject),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum AdminSubject {
    Namespaces(Selector),
    Pods { namespaces: Selector, pods: Selector },
}

impl SubjectMatcher {
    pub fn matches(&self, peer: &InternalPeer) -> bool {
        match self {
            Self::V1 { namespace, pods } => {
                *namespace == peer.namespace && pods.matches(&peer.pod_labels)
            }
            Self::Admin(AdminSubject::Namespaces(namespaces)) => {
                namespaces.matches(&peer.namespace_labels)
            }
            Self::Admin(AdminSubject::Pods { namespaces, pods }) => {
                namespaces.matches(&peer.namespace_labels) && pods.matches(&peer.pod_labels)
            }
        }
    }

    pub fn is_v1(&self) -> bool {
        matches!(self, Self::V1 { .. })
    }

    /// A stable key identifying the selection, independent of the policy it came from.
    pub fn primary_key(&self) -> String {
        match self {
            Self::V1 { namespace, pods } => format!("v1:namespace={namespace};pods={pods}"),
            Self::Admin(AdminSubject::Namespaces(namespaces)) => {
                format!("admin:namespaces={namespaces}")
            }
            Self::Admin(AdminSubject::Pods { namespaces, pods }) => {
                format!("admin:namespaces={namespaces};pods={pods}")
            }
        }
    }
}

impl fmt::Display for SubjectMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V1 { namespace, pods } => {
                write!(f, "namespace: {namespace}\npods: {}", describe(pods))
            }
            Self::Admin(AdminSubject::Namespaces(namespaces)) => {
                write!(f, "namespaces: {}", describe(namespaces))
            }
            Self::Admin(AdminSubject::Pods { namespaces, pods }) => write!(
                f,
                "namespaces: {}\npods: {}",
                describe(namespaces),
                describe(pods)
            ),
        }
    }
}

fn describe(selector: &Selector) -> String {
    if selector.is_empty() {
        "all".to_string()
    } else {
        selector.to_string()
    }
}
