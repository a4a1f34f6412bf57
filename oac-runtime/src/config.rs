//! Runner configuration (§4.8), mirroring `graphix-rt`'s
//! `GXConfig`/`GXConfigBuilder` builder pattern: a handful of knobs with
//! sane defaults, built once before a [`crate::Runner`] is constructed.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use derive_builder::Builder;
use oac_core::Procedure;

/// Invoked after every root tick with a read-only view of the procedure
/// (§4.8 `SetTickCallback`).
pub type TickCallback = Arc<dyn Fn(&Procedure) + Send + Sync>;

/// Tuning knobs for [`crate::Runner::execute_procedure`] (§4.8).
#[derive(Builder, Clone)]
#[builder(pattern = "owned")]
pub struct RunnerConfig {
    /// Applied between ticks when the root last reported `Running`, to
    /// avoid a busy loop while descendant work proceeds on another thread
    /// (§4.8: "apply a back-off (default: ≤ small fixed duration)").
    #[builder(default = "Duration::from_millis(20)")]
    pub back_off: Duration,
    /// Invoked after every root tick, `NotFinished` and `Running` included.
    #[builder(setter(strip_option), default)]
    pub tick_callback: Option<TickCallback>,
}

impl fmt::Debug for RunnerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerConfig")
            .field("back_off", &self.back_off)
            .field("tick_callback", &self.tick_callback.is_some())
            .finish()
    }
}

impl RunnerConfig {
    pub fn builder() -> RunnerConfigBuilder {
        RunnerConfigBuilder::default()
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfigBuilder::default().build().expect("every field has a default")
    }
}
