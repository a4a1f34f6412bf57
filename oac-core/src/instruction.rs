//! The instruction life-cycle (§4.4): the non-virtual `Tick` boundary that
//! guarantees status accounting and observer notification regardless of
//! concrete instruction behavior.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use triomphe::Arc as StdArc;

use anyhow::Result;
use arcstr::ArcStr;
use fxhash::FxHashMap;
use parking_lot::Mutex;

use crate::attr::{AttrBag, AttrSchema};
use crate::ui::{Severity, UserInterface};
use crate::workspace::Workspace;

atomic_id!(InstructionId);

/// The closed status enumeration of §3. `Success`/`Failure` are terminal
/// and absorbing until `Reset`; `NotFinished`/`Running` are intermediate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionStatus {
    NotStarted,
    NotFinished,
    Running,
    Success,
    Failure,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotStarted => "NotStarted",
            Self::NotFinished => "NotFinished",
            Self::Running => "Running",
            Self::Success => "Success",
            Self::Failure => "Failure",
        };
        f.write_str(s)
    }
}

/// A procedure-scoped, shared reference to a top-level instruction tree,
/// used by `Include`/`IncludeProcedure` to avoid ownership cycles (§9):
/// every normal parent/child edge is exclusive ownership (`Vec<Node>`),
/// but a tree a reference may point at is reachable only through this
/// handle, resolved once at `Setup` after cycle detection.
pub type TreeRef = StdArc<Mutex<Node>>;

/// A cloneable, `Send + Sync` handle that can request cooperative halting
/// of a node and its whole subtree from any thread, independent of
/// whatever thread currently holds the owning `&mut Node` for ticking
/// (§5). Built once, after `Setup`, by walking the (by-then immutable)
/// tree structure.
#[derive(Clone, Debug, Default)]
pub struct HaltHandle(StdArc<Vec<StdArc<AtomicBool>>>);

impl HaltHandle {
    pub fn request_halt(&self) {
        for flag in self.0.iter() {
            flag.store(true, Ordering::Release);
        }
    }
}

/// Context handed to a concrete instruction's `init`/`tick` hooks.
pub struct TickCtx<'a> {
    pub ws: &'a Workspace,
    pub ui: &'a dyn UserInterface,
    pub attrs: &'a AttrBag,
    pub children: &'a mut [Node],
    /// `true` if this node's halt flag is set, observed at the start of
    /// this tick (§5: halting is checked, never blocked on).
    pub halted: bool,
}

/// Context handed to a concrete instruction's `setup`/`resolve` hook.
pub struct SetupCtx<'a> {
    pub trees_by_name: &'a FxHashMap<ArcStr, TreeRef>,
    pub loader: &'a dyn ProcedureLoader,
}

/// External procedure files are out of scope for this crate (§1); this is
/// the seam `IncludeProcedure`/`Include(file=...)` resolve through. A host
/// application supplies a real implementation backed by its XML parser.
pub trait ProcedureLoader: Send + Sync {
    fn load(&self, file: &str) -> Result<crate::procedure::Procedure>;
}

#[derive(Debug, Default)]
pub struct UnavailableLoader;

impl ProcedureLoader for UnavailableLoader {
    fn load(&self, file: &str) -> Result<crate::procedure::Procedure> {
        anyhow::bail!("no ProcedureLoader configured; cannot load {file:?}")
    }
}

/// The overridable hooks of the NVI pattern (§4.4). Implemented once per
/// concrete instruction type in `oac-stdlib`.
pub trait Behavior: fmt::Debug + Send + Sync {
    /// Attribute definitions and constraints this instruction registers
    /// at construction (§4.3). Default: none.
    fn attr_schema(&self) -> AttrSchema {
        AttrSchema::new()
    }

    /// Reject child counts this instruction cannot operate on (e.g.
    /// `AchieveCondition` requires exactly two). Default: any count.
    fn validate_children(&self, _count: usize) -> Result<()> {
        Ok(())
    }

    /// Resolve references such as `Include.path` (§4.4 `Setup`). Default:
    /// no-op.
    fn resolve(&mut self, _attrs: &AttrBag, _ctx: &SetupCtx) -> Result<()> {
        Ok(())
    }

    /// Optional one-time initialization, run exactly once when status
    /// transitions out of `NotStarted` (§4.4). Default: succeeds
    /// immediately.
    fn init(&mut self, _ctx: &mut TickCtx) -> Result<()> {
        Ok(())
    }

    /// The per-tick hook; the only one every instruction must implement.
    fn tick(&mut self, ctx: &mut TickCtx) -> ExecutionStatus;

    /// Return any owned state to its construction-time form. Default:
    /// no-op (stateless instructions need nothing).
    fn reset(&mut self) {}

    /// Cooperative halt hint (§5): must not block, and must be safe to
    /// call concurrently with `tick`/`init` on the owning thread, so any
    /// cancellation state an implementation needs must use interior
    /// mutability (an `AtomicBool`, a channel) rather than `&mut self`.
    fn on_halt(&self) {}
}

/// A polymorphic instruction node (§3). Owns its children exclusively;
/// `Include`/`IncludeProcedure` reach other trees only through a
/// [`TreeRef`] resolved at `Setup`.
pub struct Node {
    id: InstructionId,
    type_name: ArcStr,
    name: Option<ArcStr>,
    is_root: bool,
    attrs: AttrBag,
    status: ExecutionStatus,
    halt_flag: StdArc<AtomicBool>,
    halt_handle: Option<HaltHandle>,
    children: Vec<Node>,
    behavior: Box<dyn Behavior>,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("type_name", &self.type_name)
            .field("name", &self.name)
            .field("status", &self.status)
            .field("children", &self.children.len())
            .finish()
    }
}

impl Node {
    pub fn new(
        type_name: impl Into<ArcStr>,
        behavior: Box<dyn Behavior>,
        attrs: AttrBag,
        children: Vec<Node>,
    ) -> Self {
        Self {
            id: InstructionId::new(),
            type_name: type_name.into(),
            name: None,
            is_root: false,
            attrs,
            status: ExecutionStatus::NotStarted,
            halt_flag: StdArc::new(AtomicBool::new(false)),
            halt_handle: None,
            children,
            behavior,
        }
    }

    pub fn with_name(mut self, name: impl Into<ArcStr>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn mark_root(mut self) -> Self {
        self.is_root = true;
        self
    }

    pub fn id(&self) -> InstructionId {
        self.id
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }

    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut [Node] {
        &mut self.children
    }

    pub fn attrs(&self) -> &AttrBag {
        &self.attrs
    }

    /// The cross-thread-safe halt handle for this node's subtree.
    /// `None` before `Setup` has run.
    pub fn halt_handle(&self) -> Option<HaltHandle> {
        self.halt_handle.clone()
    }

    fn collect_halt_flags(&self, out: &mut Vec<StdArc<AtomicBool>>) {
        out.push(StdArc::clone(&self.halt_flag));
        for c in &self.children {
            c.collect_halt_flags(out);
        }
    }

    /// Validate attributes, resolve references, and recurse into children
    /// (§4.4 `Setup`). No side effects of a failed `Setup` persist beyond
    /// whatever variables/instructions were already, individually, set up
    /// successfully — callers (`Procedure::setup`) are responsible for
    /// reporting the overall failure.
    pub fn setup(&mut self, ctx: &SetupCtx) -> Result<()> {
        self.behavior
            .attr_schema()
            .validate(&self.type_name, &self.attrs)
            .with_context_type(&self.type_name)?;
        self.behavior.validate_children(self.children.len())?;
        self.behavior.resolve(&self.attrs, ctx)?;
        for child in &mut self.children {
            child.setup(ctx)?;
        }
        let mut flags = Vec::new();
        self.collect_halt_flags(&mut flags);
        self.halt_handle = Some(HaltHandle(StdArc::new(flags)));
        Ok(())
    }

    /// The NVI tick boundary (§4.4), implemented as its six numbered steps
    /// literally: a single call may carry a node through `NotStarted` →
    /// `NotFinished` → a `TickImpl` result, and each of those two
    /// transitions notifies separately (§8: one `update_instruction_status`
    /// call per status *change*, not per `Tick` invocation).
    pub fn tick(&mut self, ws: &Workspace, ui: &dyn UserInterface) -> ExecutionStatus {
        if self.status.is_terminal() {
            return self.status;
        }
        let halted = self.halt_flag.load(Ordering::Acquire);
        if self.status == ExecutionStatus::NotStarted {
            let mut ctx = TickCtx {
                ws,
                ui,
                attrs: &self.attrs,
                children: &mut self.children,
                halted,
            };
            if let Err(e) = self.behavior.init(&mut ctx) {
                let msg = compact_str::format_compact!("{} init failed: {e:?}", self.type_name);
                ui.log(Severity::Error, msg.as_str());
                self.set_status(ExecutionStatus::Failure, ui);
                return self.status;
            }
            self.set_status(ExecutionStatus::NotFinished, ui);
        }
        let mut ctx = TickCtx {
            ws,
            ui,
            attrs: &self.attrs,
            children: &mut self.children,
            halted,
        };
        let new_status = self.behavior.tick(&mut ctx);
        self.set_status(new_status, ui);
        self.status
    }

    fn set_status(&mut self, new: ExecutionStatus, ui: &dyn UserInterface) {
        if new != self.status {
            self.status = new;
            ui.update_instruction_status(self.id, self.name(), new);
        }
    }

    /// Return this subtree to `NotStarted` (§4.4): clears the halt flag,
    /// resets concrete instruction state, notifies, and recurses.
    pub fn reset(&mut self, ui: &dyn UserInterface) {
        self.behavior.reset();
        self.halt_flag.store(false, Ordering::Release);
        self.set_status(ExecutionStatus::NotStarted, ui);
        for c in &mut self.children {
            c.reset(ui);
        }
    }

    /// Cooperatively request termination of this subtree (§4.4/§5). Safe
    /// to call from any thread via the returned/cached [`HaltHandle`]; if
    /// `Setup` has not yet run (no handle built), this node and its
    /// children have not started and there is nothing to halt.
    pub fn halt(&self) {
        if let Some(h) = &self.halt_handle {
            h.request_halt();
        }
        self.behavior.on_halt();
        for c in &self.children {
            c.halt();
        }
    }
}

trait ResultExt<T> {
    fn with_context_type(self, type_name: &str) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context_type(self, type_name: &str) -> Result<T> {
        use anyhow::Context;
        self.with_context(|| format!("setting up {type_name}"))
    }
}

/// Property tests for the status-transition invariants of §8: notifications
/// never repeat a status, and a terminal status absorbs every later `Tick`
/// no matter what a misbehaving `Behavior` would otherwise return.
#[cfg(test)]
mod status_properties {
    use super::*;
    use crate::attr::AttrBag;
    use crate::ui::{input_pair, InputFuture, OverrideChoice};
    use crate::workspace::Workspace;
    use proptest::prelude::*;
    use std::collections::VecDeque;
    use std::sync::OnceLock;

    /// Replays a fixed script of statuses, one per `tick`, then repeats
    /// `Failure` forever — standing in for an arbitrary concrete
    /// instruction without pulling in any of `oac-stdlib`.
    #[derive(Debug)]
    struct Scripted {
        remaining: VecDeque<ExecutionStatus>,
    }

    impl Behavior for Scripted {
        fn tick(&mut self, _ctx: &mut TickCtx) -> ExecutionStatus {
            self.remaining.pop_front().unwrap_or(ExecutionStatus::Failure)
        }
    }

    #[derive(Default)]
    struct RecordingUi {
        statuses: std::sync::Mutex<Vec<ExecutionStatus>>,
    }

    impl UserInterface for RecordingUi {
        fn update_instruction_status(
            &self,
            _node: InstructionId,
            _name: Option<&str>,
            status: ExecutionStatus,
        ) {
            self.statuses.lock().unwrap().push(status);
        }

        fn variable_updated(&self, _name: &str, _value: &netidx_value::Value, _available: bool) {}
        fn message(&self, _text: &str) {}
        fn log(&self, _severity: Severity, _text: &str) {}

        fn request_input(&self, _description: Option<&str>) -> InputFuture<ArcStr> {
            let (fut, promise) = input_pair();
            drop(promise);
            fut
        }

        fn request_choice(&self, _description: &str, _count: usize) -> InputFuture<usize> {
            let (fut, promise) = input_pair();
            drop(promise);
            fut
        }

        fn request_confirmation(
            &self,
            _description: &str,
            _ok_text: Option<&str>,
            _cancel_text: Option<&str>,
        ) -> InputFuture<bool> {
            let (fut, promise) = input_pair();
            drop(promise);
            fut
        }

        fn request_override(&self, _description: &str) -> InputFuture<OverrideChoice> {
            let (fut, promise) = input_pair();
            drop(promise);
            fut
        }
    }

    /// `Workspace::new` spawns its dispatcher task, so every test needs an
    /// entered runtime even though these properties never await anything.
    fn test_runtime() -> &'static tokio::runtime::Runtime {
        static RT: OnceLock<tokio::runtime::Runtime> = OnceLock::new();
        RT.get_or_init(|| tokio::runtime::Runtime::new().expect("tokio runtime"))
    }

    fn status_sequence() -> impl Strategy<Value = Vec<ExecutionStatus>> {
        let terminal = prop_oneof![Just(ExecutionStatus::Success), Just(ExecutionStatus::Failure)];
        let middle = prop::collection::vec(
            prop_oneof![Just(ExecutionStatus::NotFinished), Just(ExecutionStatus::Running)],
            0..5,
        );
        (middle, terminal).prop_map(|(mut middle, terminal)| {
            middle.push(terminal);
            middle
        })
    }

    proptest! {
        #[test]
        fn notifications_never_repeat_and_terminal_absorbs(seq in status_sequence()) {
            let _guard = test_runtime().enter();
            let ws = Workspace::new();
            let ui = RecordingUi::default();
            let behavior = Scripted { remaining: seq.iter().copied().collect() };
            let mut node = Node::new("Scripted", Box::new(behavior), AttrBag::new(), vec![]);

            for _ in 0..(seq.len() + 2) {
                node.tick(&ws, &ui);
            }

            let notified = ui.statuses.lock().unwrap().clone();
            for pair in notified.windows(2) {
                prop_assert_ne!(pair[0], pair[1]);
            }
            if let Some(pos) = notified.iter().position(|s| s.is_terminal()) {
                prop_assert_eq!(pos, notified.len() - 1);
            }
            prop_assert_eq!(node.status(), *seq.last().expect("non-empty"));
        }
    }
}
