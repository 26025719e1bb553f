#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod effect;
mod evaluate;
mod explain;
pub mod namespace;
pub mod peer;
pub mod pod;
pub mod policy;
pub mod port;
mod simplify;
pub mod subject;
pub mod table;
pub mod target;
pub mod traffic;

pub use self::{
    effect::{Effect, PolicyKind, PolicyRef, Verdict},
    evaluate::{Decision, DirectionResult, Outcome, Step, TrafficResult},
    namespace::NamespaceMatcher,
    peer::{Flow, PeerMatcher, PeerRule},
    pod::PodMatcher,
    policy::{Direction, Policy},
    port::{
        Port, PortMatcher, PortProtocolMatcher, PortRangeMatcher, Protocol, SpecificPortMatcher,
    },
    subject::{AdminSubject, SubjectMatcher},
    table::TextTable,
    target::Target,
    traffic::{InternalPeer, InvalidTraffic, Traffic, TrafficPeer},
};
