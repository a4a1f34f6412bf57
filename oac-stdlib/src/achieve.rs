//! AchieveCondition, AchieveConditionWithOverride, AchieveConditionWithTimeout,
//! ExecuteWhile, WaitForCondition (§4.5).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use oac_core::attr::{AttrDef, AttrSchema, ScalarType};
use oac_core::{
    Behavior, ExecutionStatus, InputFuture, InstructionType, Node, OverrideChoice, Severity,
    SubscriptionId, TickCtx, UserInterface, Workspace,
};

use crate::decorators::parse_var_names;

fn timeout_def() -> AttrDef {
    AttrDef::both("timeout").with_type(ScalarType::Float)
}

fn var_names_def() -> AttrDef {
    AttrDef::literal("varNames").mandatory()
}

fn deadline_from(attrs: &oac_core::AttrBag, ws: &Workspace, ui: &dyn UserInterface) -> Option<Instant> {
    let mut secs = 0.0f64;
    oac_core::attr::get_attribute_value_as(&timeout_def(), attrs, ws, ui, &mut secs);
    if secs > 0.0 {
        Some(Instant::now() + Duration::from_secs_f64(secs))
    } else {
        None
    }
}

fn subscribe_dirty(ws: &Workspace, raw: &str) -> (Arc<AtomicBool>, Vec<SubscriptionId>) {
    let dirty = Arc::new(AtomicBool::new(false));
    let mut subs = Vec::new();
    for name in parse_var_names(raw) {
        let flag = Arc::clone(&dirty);
        subs.push(ws.subscribe(name, Box::new(move |_n, _v, _avail| {
            flag.store(true, Ordering::Release);
        })));
    }
    (dirty, subs)
}

/// Ticks `action` and `condition` to completion, returning `Success` the
/// moment either the condition succeeds or (once the action has
/// terminated) a final condition check does (§4.5). Ticks the action
/// first each call, only re-checking the condition while it is still
/// running — matching "concurrently tick condition" without re-ticking
/// the condition twice in the same call.
fn tick_acting(condition: &mut Node, action: &mut Node, ws: &Workspace, ui: &dyn UserInterface) -> ExecutionStatus {
    let a = action.tick(ws, ui);
    if !a.is_terminal() {
        let c = condition.tick(ws, ui);
        if c == ExecutionStatus::Success {
            action.halt();
            return ExecutionStatus::Success;
        }
        return a;
    }
    condition.tick(ws, ui)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Phase {
    #[default]
    CheckingCondition,
    Acting,
}

fn two_children(count: usize, name: &str) -> Result<()> {
    if count != 2 {
        bail!("{name} requires exactly two children (condition, action), found {count}");
    }
    Ok(())
}

/// Tries the condition first; if it doesn't already hold, runs the action
/// while concurrently watching the condition, and adopts one final
/// condition check once the action terminates (§4.5).
#[derive(Debug, Default)]
pub struct AchieveCondition {
    phase: Phase,
}

impl Behavior for AchieveCondition {
    fn validate_children(&self, count: usize) -> Result<()> {
        two_children(count, "AchieveCondition")
    }

    fn reset(&mut self) {
        self.phase = Phase::CheckingCondition;
    }

    fn tick(&mut self, ctx: &mut TickCtx) -> ExecutionStatus {
        let Some((condition, rest)) = ctx.children.split_first_mut() else {
            return ExecutionStatus::Failure;
        };
        let Some((action, _)) = rest.split_first_mut() else {
            return ExecutionStatus::Failure;
        };
        match self.phase {
            Phase::CheckingCondition => {
                let c = condition.tick(ctx.ws, ctx.ui);
                match c {
                    ExecutionStatus::Success => ExecutionStatus::Success,
                    ExecutionStatus::Failure => {
                        self.phase = Phase::Acting;
                        tick_acting(condition, action, ctx.ws, ctx.ui)
                    }
                    other => other,
                }
            }
            Phase::Acting => tick_acting(condition, action, ctx.ws, ctx.ui),
        }
    }
}

impl InstructionType for AchieveCondition {
    const NAME: &'static str = "AchieveCondition";
}

fn override_description_def() -> AttrDef {
    AttrDef::literal("description")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum OverridePhase {
    #[default]
    CheckingCondition,
    Acting,
    AwaitingOverride,
}

/// As [`AchieveCondition`], but a failing final condition check issues a
/// 3-way retry/override/abort prompt instead of returning `Failure`
/// outright (§4.5). With only one child, there is no action: a condition
/// failure goes straight to the prompt.
#[derive(Debug, Default)]
pub struct AchieveConditionWithOverride {
    phase: OverridePhase,
    pending: Option<InputFuture<OverrideChoice>>,
}

impl Behavior for AchieveConditionWithOverride {
    fn attr_schema(&self) -> AttrSchema {
        AttrSchema::new().def(override_description_def())
    }

    fn validate_children(&self, count: usize) -> Result<()> {
        if count != 1 && count != 2 {
            bail!("AchieveConditionWithOverride requires one or two children, found {count}");
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.phase = OverridePhase::CheckingCondition;
        self.pending = None;
    }

    fn tick(&mut self, ctx: &mut TickCtx) -> ExecutionStatus {
        match self.phase {
            OverridePhase::CheckingCondition => {
                let Some((condition, rest)) = ctx.children.split_first_mut() else {
                    return ExecutionStatus::Failure;
                };
                let c = condition.tick(ctx.ws, ctx.ui);
                match c {
                    ExecutionStatus::Success => ExecutionStatus::Success,
                    ExecutionStatus::Failure => {
                        let result = match rest.split_first_mut() {
                            Some((action, _)) => {
                                self.phase = OverridePhase::Acting;
                                tick_acting(condition, action, ctx.ws, ctx.ui)
                            }
                            None => ExecutionStatus::Failure,
                        };
                        self.handle_action_result(ctx.attrs, ctx.ui, result)
                    }
                    other => other,
                }
            }
            OverridePhase::Acting => {
                let Some((condition, rest)) = ctx.children.split_first_mut() else {
                    return ExecutionStatus::Failure;
                };
                let Some((action, _)) = rest.split_first_mut() else {
                    return ExecutionStatus::Failure;
                };
                let result = tick_acting(condition, action, ctx.ws, ctx.ui);
                self.handle_action_result(ctx.attrs, ctx.ui, result)
            }
            OverridePhase::AwaitingOverride => self.poll_override(ctx),
        }
    }

    fn on_halt(&self) {
        if let Some(p) = &self.pending {
            p.cancel();
        }
    }
}

impl AchieveConditionWithOverride {
    fn handle_action_result(
        &mut self,
        attrs: &oac_core::AttrBag,
        ui: &dyn UserInterface,
        result: ExecutionStatus,
    ) -> ExecutionStatus {
        match result {
            ExecutionStatus::Success => ExecutionStatus::Success,
            ExecutionStatus::Failure => {
                let description = attrs.raw("description").unwrap_or("condition could not be achieved");
                self.pending = Some(ui.request_override(description));
                self.phase = OverridePhase::AwaitingOverride;
                ExecutionStatus::Running
            }
            other => other,
        }
    }

    fn poll_override(&mut self, ctx: &mut TickCtx) -> ExecutionStatus {
        let Some(fut) = self.pending.as_mut() else { return ExecutionStatus::Failure };
        if ctx.halted {
            fut.cancel();
            return ExecutionStatus::Failure;
        }
        if !fut.is_ready() {
            return ExecutionStatus::Running;
        }
        match fut.get() {
            OverrideChoice::Override => ExecutionStatus::Success,
            OverrideChoice::Abort => ExecutionStatus::Failure,
            OverrideChoice::Retry => {
                for child in ctx.children.iter_mut() {
                    child.reset(ctx.ui);
                }
                self.phase = OverridePhase::CheckingCondition;
                self.pending = None;
                ExecutionStatus::Running
            }
        }
    }
}

impl InstructionType for AchieveConditionWithOverride {
    const NAME: &'static str = "AchieveConditionWithOverride";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum TimeoutPhase {
    #[default]
    CheckingCondition,
    Acting,
    Listening,
}

/// As [`AchieveCondition`], but a failing final condition check starts a
/// bounded listen: re-checking the condition on any `varNames` change, up
/// to `timeout`, before giving up with `Failure` (§4.5).
#[derive(Debug, Default)]
pub struct AchieveConditionWithTimeout {
    phase: TimeoutPhase,
    dirty: Option<Arc<AtomicBool>>,
    subs: Vec<SubscriptionId>,
    deadline: Option<Instant>,
}

impl Behavior for AchieveConditionWithTimeout {
    fn attr_schema(&self) -> AttrSchema {
        AttrSchema::new().def(var_names_def()).def(timeout_def())
    }

    fn validate_children(&self, count: usize) -> Result<()> {
        two_children(count, "AchieveConditionWithTimeout")
    }

    fn reset(&mut self) {
        self.phase = TimeoutPhase::CheckingCondition;
        self.dirty = None;
        self.subs.clear();
        self.deadline = None;
    }

    fn on_halt(&self) {
        if let Some(d) = &self.dirty {
            d.store(true, Ordering::Release);
        }
    }

    fn tick(&mut self, ctx: &mut TickCtx) -> ExecutionStatus {
        let Some((condition, rest)) = ctx.children.split_first_mut() else {
            return ExecutionStatus::Failure;
        };
        let Some((action, _)) = rest.split_first_mut() else {
            return ExecutionStatus::Failure;
        };
        match self.phase {
            TimeoutPhase::CheckingCondition => {
                let c = condition.tick(ctx.ws, ctx.ui);
                match c {
                    ExecutionStatus::Success => ExecutionStatus::Success,
                    ExecutionStatus::Failure => {
                        self.phase = TimeoutPhase::Acting;
                        self.start_listen_if_failed(ctx, condition, action)
                    }
                    other => other,
                }
            }
            TimeoutPhase::Acting => self.start_listen_if_failed(ctx, condition, action),
            TimeoutPhase::Listening => {
                if ctx.halted {
                    return ExecutionStatus::Failure;
                }
                let was_dirty =
                    self.dirty.as_ref().map(|d| d.swap(false, Ordering::AcqRel)).unwrap_or(false);
                if was_dirty {
                    if condition.status().is_terminal() {
                        condition.reset(ctx.ui);
                    }
                    if condition.tick(ctx.ws, ctx.ui) == ExecutionStatus::Success {
                        return ExecutionStatus::Success;
                    }
                }
                match self.deadline {
                    Some(d) if Instant::now() >= d => ExecutionStatus::Failure,
                    _ => ExecutionStatus::Running,
                }
            }
        }
    }
}

impl AchieveConditionWithTimeout {
    fn start_listen_if_failed(&mut self, ctx: &mut TickCtx, condition: &mut Node, action: &mut Node) -> ExecutionStatus {
        let result = tick_acting(condition, action, ctx.ws, ctx.ui);
        match result {
            ExecutionStatus::Failure => {
                let raw = ctx.attrs.raw("varNames").expect("mandatory, validated at Setup");
                let (dirty, subs) = subscribe_dirty(ctx.ws, raw);
                self.dirty = Some(dirty);
                self.subs = subs;
                self.deadline = deadline_from(ctx.attrs, ctx.ws, ctx.ui);
                self.phase = TimeoutPhase::Listening;
                ExecutionStatus::Running
            }
            other => other,
        }
    }
}

impl InstructionType for AchieveConditionWithTimeout {
    const NAME: &'static str = "AchieveConditionWithTimeout";
}

/// Ticks `action` while watching `condition` for a `Failure` triggered by
/// any `varNames` change; returns `Success` iff the action completes
/// successfully while the condition still holds (§4.5). Children are
/// `[action, condition]`, the reverse of [`AchieveCondition`]'s order.
#[derive(Debug, Default)]
pub struct ExecuteWhile {
    dirty: Option<Arc<AtomicBool>>,
    subs: Vec<SubscriptionId>,
}

impl Behavior for ExecuteWhile {
    fn attr_schema(&self) -> AttrSchema {
        AttrSchema::new().def(var_names_def())
    }

    fn validate_children(&self, count: usize) -> Result<()> {
        if count != 2 {
            bail!("ExecuteWhile requires exactly two children (action, condition), found {count}");
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.dirty = None;
        self.subs.clear();
    }

    fn on_halt(&self) {
        if let Some(d) = &self.dirty {
            d.store(true, Ordering::Release);
        }
    }

    fn init(&mut self, ctx: &mut TickCtx) -> Result<()> {
        let raw = ctx.attrs.raw("varNames").expect("mandatory, validated at Setup");
        let (dirty, subs) = subscribe_dirty(ctx.ws, raw);
        self.dirty = Some(dirty);
        self.subs = subs;
        Ok(())
    }

    fn tick(&mut self, ctx: &mut TickCtx) -> ExecutionStatus {
        if ctx.halted {
            return ExecutionStatus::Failure;
        }
        let Some((action, rest)) = ctx.children.split_first_mut() else {
            return ExecutionStatus::Failure;
        };
        let Some((condition, _)) = rest.split_first_mut() else {
            return ExecutionStatus::Failure;
        };
        let a = action.tick(ctx.ws, ctx.ui);
        let was_dirty = self.dirty.as_ref().map(|d| d.swap(false, Ordering::AcqRel)).unwrap_or(false);
        if was_dirty {
            if condition.status().is_terminal() {
                condition.reset(ctx.ui);
            }
            if condition.tick(ctx.ws, ctx.ui) == ExecutionStatus::Failure {
                action.halt();
                return ExecutionStatus::Failure;
            }
        }
        match a {
            ExecutionStatus::Success => ExecutionStatus::Success,
            ExecutionStatus::Failure => ExecutionStatus::Failure,
            other => other,
        }
    }
}

impl InstructionType for ExecuteWhile {
    const NAME: &'static str = "ExecuteWhile";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum WaitPhase {
    #[default]
    CheckingCondition,
    Listening,
}

/// Tries the single condition child first; on `Failure`, subscribes to
/// `varNames` and re-checks on every change, until it succeeds or
/// `timeout` elapses (§4.5).
#[derive(Debug, Default)]
pub struct WaitForCondition {
    phase: WaitPhase,
    dirty: Option<Arc<AtomicBool>>,
    subs: Vec<SubscriptionId>,
    deadline: Option<Instant>,
}

impl Behavior for WaitForCondition {
    fn attr_schema(&self) -> AttrSchema {
        AttrSchema::new().def(var_names_def()).def(timeout_def())
    }

    fn validate_children(&self, count: usize) -> Result<()> {
        if count != 1 {
            bail!("WaitForCondition requires exactly one child, found {count}");
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.phase = WaitPhase::CheckingCondition;
        self.dirty = None;
        self.subs.clear();
        self.deadline = None;
    }

    fn on_halt(&self) {
        if let Some(d) = &self.dirty {
            d.store(true, Ordering::Release);
        }
    }

    fn tick(&mut self, ctx: &mut TickCtx) -> ExecutionStatus {
        let Some(condition) = ctx.children.first_mut() else { return ExecutionStatus::Failure };
        match self.phase {
            WaitPhase::CheckingCondition => {
                let c = condition.tick(ctx.ws, ctx.ui);
                match c {
                    ExecutionStatus::Success => ExecutionStatus::Success,
                    ExecutionStatus::Failure => {
                        let raw = ctx.attrs.raw("varNames").expect("mandatory, validated at Setup");
                        let (dirty, subs) = subscribe_dirty(ctx.ws, raw);
                        self.dirty = Some(dirty);
                        self.subs = subs;
                        self.deadline = deadline_from(ctx.attrs, ctx.ws, ctx.ui);
                        self.phase = WaitPhase::Listening;
                        ExecutionStatus::Running
                    }
                    other => other,
                }
            }
            WaitPhase::Listening => {
                if ctx.halted {
                    return ExecutionStatus::Failure;
                }
                let was_dirty =
                    self.dirty.as_ref().map(|d| d.swap(false, Ordering::AcqRel)).unwrap_or(false);
                if was_dirty {
                    if condition.status().is_terminal() {
                        condition.reset(ctx.ui);
                    }
                    if condition.tick(ctx.ws, ctx.ui) == ExecutionStatus::Success {
                        return ExecutionStatus::Success;
                    }
                }
                match self.deadline {
                    Some(d) if Instant::now() >= d => ExecutionStatus::Failure,
                    _ => ExecutionStatus::Running,
                }
            }
        }
    }
}

impl InstructionType for WaitForCondition {
    const NAME: &'static str = "WaitForCondition";
}
