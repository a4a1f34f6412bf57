//! The runner (§4.8/§5): the single controlling thread that repeatedly
//! ticks a procedure's root to completion, honoring breakpoints, pause,
//! and halt requests, and applying back-off while the tree is `Running`.

use std::sync::Arc;
use std::thread;

use oac_core::instruction::{HaltHandle, TreeRef};
use oac_core::{ExecutionStatus, Procedure, UserInterface};

use crate::breakpoint::{next_to_tick, Breakpoint};
use crate::config::RunnerConfig;

/// The outcome of a single call to [`Runner::execute_single`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The root was ticked; this is its resulting status.
    Ticked(ExecutionStatus),
    /// An armed breakpoint matched the next instruction due to be ticked;
    /// the root was *not* ticked.
    BreakpointHit(oac_core::InstructionId),
}

/// A cloneable, `Send + Sync` reference to a running procedure's root,
/// sufficient to request a halt from any thread without needing access to
/// the owning [`Runner`] (§4.8 `Halt`: "safe from any thread").
#[derive(Clone, Default)]
pub struct RunnerHandle {
    halt_handle: Option<HaltHandle>,
}

impl RunnerHandle {
    pub fn halt(&self) {
        if let Some(h) = &self.halt_handle {
            h.request_halt();
        }
    }
}

/// Drives one [`Procedure`] at a time from a single controlling thread
/// (§5). Constructing and stepping a `Runner` from more than one thread at
/// once is a caller error the type system does not prevent, exactly as
/// the teacher's `GXHandle`/`GXRt` split leaves single-writer discipline to
/// its caller rather than encoding it in the type.
pub struct Runner {
    ui: Arc<dyn UserInterface>,
    procedure: Option<Procedure>,
    config: RunnerConfig,
    breakpoints: Vec<Breakpoint>,
    paused: bool,
    last_status: ExecutionStatus,
}

impl Runner {
    pub fn new(ui: Arc<dyn UserInterface>) -> Self {
        Self::with_config(ui, RunnerConfig::default())
    }

    pub fn with_config(ui: Arc<dyn UserInterface>, config: RunnerConfig) -> Self {
        Self {
            ui,
            procedure: None,
            config,
            breakpoints: Vec::new(),
            paused: false,
            last_status: ExecutionStatus::NotStarted,
        }
    }

    /// §4.8 `SetProcedure`: rejected while a previous procedure is still
    /// mid-run, so a caller cannot yank the tree out from under an
    /// in-progress `ExecuteProcedure` on another thread.
    pub fn set_procedure(&mut self, procedure: Procedure) -> anyhow::Result<()> {
        if self.is_running() {
            anyhow::bail!("cannot replace the procedure while it is running");
        }
        self.procedure = Some(procedure);
        self.breakpoints.clear();
        self.paused = false;
        self.last_status = ExecutionStatus::NotStarted;
        Ok(())
    }

    pub fn set_tick_callback(&mut self, cb: crate::config::TickCallback) {
        self.config.tick_callback = Some(cb);
    }

    /// A handle that can `Halt` this runner's current root from any
    /// thread. Returns `None` before `Setup` has produced a halt handle
    /// for the root (i.e. before the first tick).
    pub fn handle(&self) -> RunnerHandle {
        let halt_handle = self.procedure.as_ref().and_then(|p| p.root()).and_then(|root| root.lock().halt_handle());
        RunnerHandle { halt_handle }
    }

    pub fn set_breakpoint(&mut self, node: oac_core::InstructionId) {
        if let Some(bp) = self.breakpoints.iter_mut().find(|b| b.node == node) {
            bp.armed = true;
        } else {
            self.breakpoints.push(Breakpoint { node, armed: true });
        }
    }

    pub fn remove_breakpoint(&mut self, node: oac_core::InstructionId) {
        self.breakpoints.retain(|b| b.node != node);
    }

    pub fn get_breakpoints(&self) -> &[Breakpoint] {
        &self.breakpoints
    }

    /// §4.8 `IsRunning`: the last *observed* status was `Running`, not
    /// "a tick is currently in flight" — there is no such state, ticking
    /// is synchronous on this thread.
    pub fn is_running(&self) -> bool {
        self.last_status == ExecutionStatus::Running
    }

    pub fn is_finished(&self) -> bool {
        self.last_status.is_terminal()
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// §4.8 `Halt`: callable from any thread via [`Runner::handle`]; this
    /// inherent method is the same operation for callers that still hold
    /// `&Runner` on the owning thread.
    pub fn halt(&self) {
        if let Some(root) = self.procedure.as_ref().and_then(|p| p.root()) {
            root.lock().halt();
        }
    }

    fn root(&self) -> Option<TreeRef> {
        self.procedure.as_ref().and_then(|p| p.root())
    }

    /// §4.8 `ExecuteSingle`: exactly one root tick, unless an armed
    /// breakpoint matches the instruction about to be ticked.
    pub fn execute_single(&mut self) -> anyhow::Result<StepOutcome> {
        let root = self.root().ok_or_else(|| anyhow::anyhow!("no procedure set"))?;
        if let Some(hit) = self.check_breakpoints(&root) {
            return Ok(StepOutcome::BreakpointHit(hit));
        }
        let procedure = self.procedure.as_ref().expect("checked above");
        let status = root.lock().tick(&procedure.workspace, self.ui.as_ref());
        self.last_status = status;
        if let Some(cb) = &self.config.tick_callback {
            cb(procedure);
        }
        Ok(StepOutcome::Ticked(status))
    }

    fn check_breakpoints(&self, root: &TreeRef) -> Option<oac_core::InstructionId> {
        let guard = root.lock();
        let next = next_to_tick(&guard)?;
        self.breakpoints.iter().find(|b| b.armed && b.node == next).map(|b| b.node)
    }

    /// §4.8 `ExecuteProcedure`: ticks until terminal, paused, halted, or a
    /// breakpoint fires. Returns the last observed status, or `None` if
    /// suspended by pause/breakpoint before reaching one.
    pub fn execute_procedure(&mut self) -> anyhow::Result<Option<ExecutionStatus>> {
        self.paused = false;
        loop {
            match self.execute_single()? {
                StepOutcome::BreakpointHit(_) => return Ok(None),
                StepOutcome::Ticked(status) => {
                    if status.is_terminal() {
                        return Ok(Some(status));
                    }
                    if self.paused {
                        return Ok(None);
                    }
                    match status {
                        ExecutionStatus::Running => thread::sleep(self.config.back_off),
                        ExecutionStatus::NotFinished | ExecutionStatus::NotStarted => {}
                        ExecutionStatus::Success | ExecutionStatus::Failure => unreachable!(),
                    }
                }
            }
        }
    }
}
