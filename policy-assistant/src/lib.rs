#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use policy_assistant_core as core;
pub use policy_assistant_k8s_api as k8s;
pub use policy_assistant_k8s_builder as builder;
pub use policy_assistant_probe as probe;

mod args;
pub mod example_policies;
pub mod fetch;
pub mod load;
pub mod walkthrough;
pub mod workload;

pub use self::args::Args;
