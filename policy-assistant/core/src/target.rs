use crate::{effect::PolicyRef, peer::PeerRule, subject::SubjectMatcher};

/// A subject together with the ordered peer rules that apply to it in one direction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    pub subject: SubjectMatcher,
    pub sources: Vec<PolicyRef>,
    pub peers: Vec<PeerRule>,
}

impl Target {
    pub fn new(subject: SubjectMatcher, source: PolicyRef, peers: Vec<PeerRule>) -> Self {
        Self {
            subject,
            sources: vec![source],
            peers,
        }
    }

    pub fn primary_key(&self) -> String {
        self.subject.primary_key()
    }

    /// Appends `other`'s peers after this target's and adds any new sources.
    ///
    /// Both targets must have the same primary key.
    pub fn merge(&mut self, other: Target) {
        debug_assert_eq!(self.primary_key(), other.primary_key());
        for source in other.sources {
            if !self.sources.contains(&source) {
                self.sources.push(source);
            }
        }
        self.peers.extend(other.peers);
    }
}
