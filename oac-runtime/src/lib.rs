//! The tick-loop runner (C8): drives a parsed, set-up `oac_core::Procedure`
//! to completion from a single controlling thread, with breakpoints,
//! pause/halt, and back-off when the tree is `Running` (§4.8/§5).

pub mod breakpoint;
pub mod config;
pub mod runner;

pub use breakpoint::{next_to_tick, Breakpoint};
pub use config::{RunnerConfig, RunnerConfigBuilder, TickCallback};
pub use runner::{Runner, RunnerHandle, StepOutcome};
