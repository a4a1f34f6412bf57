//! Inverter, ForceSuccess, For, Repeat, Listen (§4.5).

use anyhow::{bail, Result};
use oac_core::attr::{split_var_path, AttrDef, AttrSchema, ScalarType};
use oac_core::{Behavior, ExecutionStatus, InstructionType, Severity, SubscriptionId, TickCtx};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn single_child<'a>(ctx: &'a mut TickCtx) -> Option<&'a mut oac_core::Node> {
    ctx.children.first_mut()
}

/// Swaps `Success`/`Failure` on the child's terminal status; passes
/// through anything non-terminal (§4.5).
#[derive(Debug, Default)]
pub struct Inverter;

impl Behavior for Inverter {
    fn validate_children(&self, count: usize) -> Result<()> {
        if count != 1 {
            bail!("Inverter requires exactly one child, found {count}");
        }
        Ok(())
    }

    fn tick(&mut self, ctx: &mut TickCtx) -> ExecutionStatus {
        let Some(child) = single_child(ctx) else { return ExecutionStatus::Failure };
        match child.tick(ctx.ws, ctx.ui) {
            ExecutionStatus::Success => ExecutionStatus::Failure,
            ExecutionStatus::Failure => ExecutionStatus::Success,
            other => other,
        }
    }
}

impl InstructionType for Inverter {
    const NAME: &'static str = "Inverter";
}

/// Waits for the child to reach any terminal status, then reports
/// `Success` regardless (§4.5).
#[derive(Debug, Default)]
pub struct ForceSuccess;

impl Behavior for ForceSuccess {
    fn validate_children(&self, count: usize) -> Result<()> {
        if count != 1 {
            bail!("ForceSuccess requires exactly one child, found {count}");
        }
        Ok(())
    }

    fn tick(&mut self, ctx: &mut TickCtx) -> ExecutionStatus {
        let Some(child) = single_child(ctx) else { return ExecutionStatus::Success };
        match child.tick(ctx.ws, ctx.ui) {
            ExecutionStatus::Success | ExecutionStatus::Failure => ExecutionStatus::Success,
            other => other,
        }
    }
}

impl InstructionType for ForceSuccess {
    const NAME: &'static str = "ForceSuccess";
}

fn max_count_def() -> AttrDef {
    AttrDef::both("maxCount").with_type(ScalarType::Int)
}

/// Ticks the child repeatedly to completion, resetting it after each
/// `Success`, until `maxCount` successes accrue (§4.5). `maxCount == -1`
/// means unbounded.
#[derive(Debug, Default)]
pub struct Repeat {
    count: i64,
}

impl Behavior for Repeat {
    fn attr_schema(&self) -> AttrSchema {
        AttrSchema::new().def(max_count_def())
    }

    fn validate_children(&self, count: usize) -> Result<()> {
        if count != 1 {
            bail!("Repeat requires exactly one child, found {count}");
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.count = 0;
    }

    fn tick(&mut self, ctx: &mut TickCtx) -> ExecutionStatus {
        let mut max_count = 1i64;
        if !oac_core::attr::get_attribute_value_as(
            &max_count_def(),
            ctx.attrs,
            ctx.ws,
            ctx.ui,
            &mut max_count,
        ) {
            return ExecutionStatus::Failure;
        }
        let Some(child) = ctx.children.first_mut() else { return ExecutionStatus::Success };
        match child.tick(ctx.ws, ctx.ui) {
            ExecutionStatus::Success => {
                child.reset(ctx.ui);
                self.count += 1;
                if max_count >= 0 && self.count >= max_count {
                    ExecutionStatus::Success
                } else {
                    ExecutionStatus::NotFinished
                }
            }
            ExecutionStatus::Failure => ExecutionStatus::Failure,
            other => other,
        }
    }
}

impl InstructionType for Repeat {
    const NAME: &'static str = "Repeat";
}

fn element_var_def() -> AttrDef {
    AttrDef::variable_name("elementVar").mandatory()
}

fn array_var_def() -> AttrDef {
    AttrDef::variable_name("arrayVar").mandatory()
}

/// Copies each element of the workspace array named by `arrayVar` into
/// `elementVar`, ticking the child to completion for each one (§4.5). The
/// source array is read once at `init` and never written back to.
#[derive(Debug, Default)]
pub struct For {
    elements: Vec<netidx_value::Value>,
    index: usize,
}

impl Behavior for For {
    fn attr_schema(&self) -> AttrSchema {
        AttrSchema::new().def(element_var_def()).def(array_var_def())
    }

    fn validate_children(&self, count: usize) -> Result<()> {
        if count != 1 {
            bail!("For requires exactly one child, found {count}");
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.elements.clear();
        self.index = 0;
    }

    fn init(&mut self, ctx: &mut TickCtx) -> Result<()> {
        let raw = ctx.attrs.raw("arrayVar").expect("mandatory, validated at Setup");
        let (name, path) = split_var_path(raw);
        let Some(array) = ctx.ws.get_value(name, path) else {
            bail!("For: arrayVar {raw:?} is not available");
        };
        self.elements = match array {
            netidx_value::Value::Array(a) => a.iter().cloned().collect(),
            other => vec![other],
        };
        Ok(())
    }

    fn tick(&mut self, ctx: &mut TickCtx) -> ExecutionStatus {
        let Some(child) = ctx.children.first_mut() else { return ExecutionStatus::Success };
        if self.index >= self.elements.len() {
            return ExecutionStatus::Success;
        }
        if child.status() == ExecutionStatus::NotStarted {
            let raw = ctx.attrs.raw("elementVar").expect("mandatory, validated at Setup");
            let (name, path) = split_var_path(raw);
            if !ctx.ws.set_value(name, path, self.elements[self.index].clone()) {
                ctx.ui.log(Severity::Error, "For: failed to write elementVar");
                return ExecutionStatus::Failure;
            }
        }
        match child.tick(ctx.ws, ctx.ui) {
            ExecutionStatus::Success => {
                child.reset(ctx.ui);
                self.index += 1;
                if self.index >= self.elements.len() {
                    ExecutionStatus::Success
                } else {
                    ExecutionStatus::NotFinished
                }
            }
            ExecutionStatus::Failure => ExecutionStatus::Failure,
            other => other,
        }
    }
}

impl InstructionType for For {
    const NAME: &'static str = "For";
}

fn var_names_def() -> AttrDef {
    AttrDef::literal("varNames").mandatory()
}

fn force_success_def() -> AttrDef {
    AttrDef::literal("forceSuccess").with_type(ScalarType::Bool)
}

pub(crate) fn parse_var_names(raw: &str) -> Vec<&str> {
    raw.split(',').filter(|s| !s.is_empty()).collect()
}

/// Subscribes to a comma-separated set of variables and re-evaluates the
/// child whenever any of them changes (§4.5). A shared `AtomicBool` dirty
/// flag, flipped from the workspace's background dispatcher thread, is the
/// non-blocking hand-off point between that thread and the tick thread.
#[derive(Debug, Default)]
pub struct Listen {
    dirty: Option<Arc<AtomicBool>>,
    subs: Vec<SubscriptionId>,
    force_success: bool,
}

impl Behavior for Listen {
    fn attr_schema(&self) -> AttrSchema {
        AttrSchema::new().def(var_names_def()).def(force_success_def())
    }

    fn validate_children(&self, count: usize) -> Result<()> {
        if count != 1 {
            bail!("Listen requires exactly one child, found {count}");
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.dirty = None;
    }

    fn on_halt(&self) {
        if let Some(d) = &self.dirty {
            d.store(true, Ordering::Release);
        }
    }

    fn init(&mut self, ctx: &mut TickCtx) -> Result<()> {
        let raw = ctx.attrs.raw("varNames").expect("mandatory, validated at Setup");
        let mut force_success = false;
        oac_core::attr::get_attribute_value_as(
            &force_success_def(),
            ctx.attrs,
            ctx.ws,
            ctx.ui,
            &mut force_success,
        );
        self.force_success = force_success;
        let dirty = Arc::new(AtomicBool::new(true));
        self.dirty = Some(Arc::clone(&dirty));
        for name in parse_var_names(raw) {
            let flag = Arc::clone(&dirty);
            let id = ctx.ws.subscribe(name, Box::new(move |_n, _v, _avail| {
                flag.store(true, Ordering::Release);
            }));
            self.subs.push(id);
        }
        Ok(())
    }

    fn tick(&mut self, ctx: &mut TickCtx) -> ExecutionStatus {
        if ctx.halted {
            return ExecutionStatus::Failure;
        }
        let Some(dirty) = &self.dirty else { return ExecutionStatus::Failure };
        let was_dirty = dirty.swap(false, Ordering::AcqRel);
        let Some(child) = ctx.children.first_mut() else { return ExecutionStatus::Success };
        if was_dirty && child.status().is_terminal() {
            child.reset(ctx.ui);
        }
        if child.status() == ExecutionStatus::NotStarted || was_dirty || !child.status().is_terminal() {
            let s = child.tick(ctx.ws, ctx.ui);
            match s {
                ExecutionStatus::Success if self.force_success => ExecutionStatus::NotFinished,
                ExecutionStatus::Success => ExecutionStatus::Success,
                ExecutionStatus::Failure => ExecutionStatus::Failure,
                other => other,
            }
        } else {
            ExecutionStatus::NotFinished
        }
    }
}

impl InstructionType for Listen {
    const NAME: &'static str = "Listen";
}

/// §8: `Repeat(maxCount=k)` over an always-succeeding child reports
/// `Success` after exactly `k` successful child cycles, never before.
#[cfg(test)]
mod repeat_properties {
    use super::*;
    use oac_core::attr::AttrBag;
    use oac_core::{Node, NullUserInterface, Workspace};
    use proptest::prelude::*;
    use std::sync::OnceLock;

    #[derive(Debug, Default)]
    struct AlwaysSucceed;

    impl Behavior for AlwaysSucceed {
        fn tick(&mut self, _ctx: &mut TickCtx) -> ExecutionStatus {
            ExecutionStatus::Success
        }
    }

    fn test_runtime() -> &'static tokio::runtime::Runtime {
        static RT: OnceLock<tokio::runtime::Runtime> = OnceLock::new();
        RT.get_or_init(|| tokio::runtime::Runtime::new().expect("tokio runtime"))
    }

    proptest! {
        #[test]
        fn repeat_reports_success_after_exactly_max_count_cycles(k in 1i64..8) {
            let _guard = test_runtime().enter();
            let ws = Workspace::new();
            let ui = NullUserInterface;
            let mut attrs = AttrBag::new();
            attrs.set("maxCount", k.to_string());
            let child = Node::new("AlwaysSucceed", Box::new(AlwaysSucceed), AttrBag::new(), vec![]);
            let mut repeat = Node::new("Repeat", Box::new(Repeat::default()), attrs, vec![child]);

            for cycle in 1..=k {
                let status = repeat.tick(&ws, &ui);
                if cycle < k {
                    prop_assert_eq!(status, ExecutionStatus::NotFinished);
                } else {
                    prop_assert_eq!(status, ExecutionStatus::Success);
                }
            }
        }
    }
}
