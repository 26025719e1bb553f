//! Simulated connectivity probes between every pair of pods.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod jobs;
pub mod resources;
pub mod runner;
pub mod table;

pub use self::{
    jobs::{Job, JobBuilder, Jobs, ProbeConfig, ProbeMode, ServiceMode},
    resources::{Container, Pod, Resources},
    runner::SimulatedRunner,
    table::{Cell, Connectivity, Summary, Table, View},
};
