//! gantry operator - runs every gantry controller in one process

#![deny(missing_docs)]

pub mod config;
pub mod controller_runner;
pub mod crds;
