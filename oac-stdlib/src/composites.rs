//! Sequence, Fallback, ParallelSequence, Choice, UserChoice (§4.5).

use anyhow::{bail, Result};
use oac_core::attr::{AttrDef, AttrSchema, ScalarType};
use oac_core::{Behavior, ExecutionStatus, InstructionType, TickCtx};

fn tick_children_in_order(
    children: &mut [oac_core::Node],
    ctx: &mut TickCtx,
    short_circuit: ExecutionStatus,
) -> ExecutionStatus {
    debug_assert!(matches!(short_circuit, ExecutionStatus::Failure | ExecutionStatus::Success));
    let complete = if short_circuit == ExecutionStatus::Failure {
        ExecutionStatus::Success
    } else {
        ExecutionStatus::Failure
    };
    for child in children.iter_mut() {
        if child.status() == complete {
            continue;
        }
        let s = child.tick(ctx.ws, ctx.ui);
        if s == short_circuit {
            return short_circuit;
        }
        if s != complete {
            return s;
        }
    }
    complete
}

/// Ticks children left-to-right, short-circuiting on the first `Failure`.
#[derive(Debug, Default)]
pub struct Sequence;

impl Behavior for Sequence {
    fn tick(&mut self, ctx: &mut TickCtx) -> ExecutionStatus {
        tick_children_in_order(ctx.children, ctx, ExecutionStatus::Failure)
    }
}

impl InstructionType for Sequence {
    const NAME: &'static str = "Sequence";
}

/// The dual of [`Sequence`]: short-circuits on the first `Success`.
#[derive(Debug, Default)]
pub struct Fallback;

impl Behavior for Fallback {
    fn tick(&mut self, ctx: &mut TickCtx) -> ExecutionStatus {
        tick_children_in_order(ctx.children, ctx, ExecutionStatus::Success)
    }
}

impl InstructionType for Fallback {
    const NAME: &'static str = "Fallback";
}

fn success_threshold_def() -> AttrDef {
    AttrDef::both("successThreshold").with_type(ScalarType::Int)
}

fn failure_threshold_def() -> AttrDef {
    AttrDef::both("failureThreshold").with_type(ScalarType::Int)
}

/// Ticks every non-terminal child every tick, reporting `Success`/`Failure`
/// once enough children agree (§4.5). Thresholds are clamped against the
/// child count at `init`, once, since that is the first point the child
/// count and declared attributes are both known.
#[derive(Debug, Default)]
pub struct ParallelSequence {
    success_threshold: i64,
    failure_threshold: i64,
}

impl Behavior for ParallelSequence {
    fn attr_schema(&self) -> AttrSchema {
        AttrSchema::new().def(success_threshold_def()).def(failure_threshold_def())
    }

    fn init(&mut self, ctx: &mut TickCtx) -> Result<()> {
        let n = ctx.children.len() as i64;
        let mut s = n;
        let mut f = 1i64;
        let s_present = oac_core::attr::get_attribute_value_as(
            &success_threshold_def(),
            ctx.attrs,
            ctx.ws,
            ctx.ui,
            &mut s,
        );
        let f_present = oac_core::attr::get_attribute_value_as(
            &failure_threshold_def(),
            ctx.attrs,
            ctx.ws,
            ctx.ui,
            &mut f,
        );
        if !s_present || !f_present {
            bail!("ParallelSequence threshold attribute failed to convert");
        }
        // Clamp so s + f <= n + 1 (§4.5); when both were supplied and
        // exceed the bound, shrink failureThreshold preferentially (§9).
        if s + f > n + 1 {
            f = (n + 1 - s).max(0);
        }
        self.success_threshold = s.max(0);
        self.failure_threshold = f.max(0);
        Ok(())
    }

    fn tick(&mut self, ctx: &mut TickCtx) -> ExecutionStatus {
        let mut success = 0i64;
        let mut failure = 0i64;
        let mut any_running = false;
        for child in ctx.children.iter_mut() {
            let s = if child.status().is_terminal() { child.status() } else { child.tick(ctx.ws, ctx.ui) };
            match s {
                ExecutionStatus::Success => success += 1,
                ExecutionStatus::Failure => failure += 1,
                ExecutionStatus::Running => any_running = true,
                ExecutionStatus::NotFinished | ExecutionStatus::NotStarted => {}
            }
        }
        if success >= self.success_threshold {
            for child in ctx.children.iter() {
                child.halt();
            }
            return ExecutionStatus::Success;
        }
        if failure >= self.failure_threshold {
            for child in ctx.children.iter() {
                child.halt();
            }
            return ExecutionStatus::Failure;
        }
        if any_running {
            ExecutionStatus::Running
        } else {
            ExecutionStatus::NotFinished
        }
    }
}

impl InstructionType for ParallelSequence {
    const NAME: &'static str = "ParallelSequence";
}

fn var_name_def() -> AttrDef {
    AttrDef::variable_name("varName").mandatory()
}

/// Reads an index or array of indices from a workspace variable and ticks
/// the correspondingly indexed children, in listed order, with `Sequence`
/// semantics over the selected multiset (§4.5).
#[derive(Debug, Default)]
pub struct Choice {
    indices: Option<Vec<usize>>,
    cursor: usize,
}

impl Behavior for Choice {
    fn attr_schema(&self) -> AttrSchema {
        AttrSchema::new().def(var_name_def())
    }

    fn reset(&mut self) {
        self.indices = None;
        self.cursor = 0;
    }

    fn tick(&mut self, ctx: &mut TickCtx) -> ExecutionStatus {
        if self.indices.is_none() {
            let def = var_name_def();
            let Some(raw) = oac_core::attr::get_attribute_value(&def, ctx.attrs, ctx.ws) else {
                ctx.ui.log(oac_core::Severity::Error, "Choice: varName not available");
                return ExecutionStatus::Failure;
            };
            match decode_indices(&raw) {
                Ok(idx) => self.indices = Some(idx),
                Err(e) => {
                    let msg = compact_str::format_compact!("Choice: {e}");
                    ctx.ui.log(oac_core::Severity::Error, msg.as_str());
                    return ExecutionStatus::Failure;
                }
            }
        }
        let indices = self.indices.clone().unwrap_or_default();
        while self.cursor < indices.len() {
            let idx = indices[self.cursor];
            let Some(child) = ctx.children.get_mut(idx) else {
                return ExecutionStatus::Failure;
            };
            let s = child.tick(ctx.ws, ctx.ui);
            match s {
                ExecutionStatus::Success => self.cursor += 1,
                ExecutionStatus::Failure => return ExecutionStatus::Failure,
                other => return other,
            }
        }
        ExecutionStatus::Success
    }
}

impl InstructionType for Choice {
    const NAME: &'static str = "Choice";
}

fn decode_indices(v: &netidx_value::Value) -> Result<Vec<usize>> {
    use netidx_value::Value;
    match v {
        Value::Array(a) => a
            .iter()
            .map(|e| e.clone().cast_to::<i64>().map(|i| i as usize).map_err(|e| anyhow::anyhow!("{e}")))
            .collect(),
        other => {
            let i = other.clone().cast_to::<i64>().map_err(|e| anyhow::anyhow!("{e}"))?;
            Ok(vec![i as usize])
        }
    }
}

fn description_def() -> AttrDef {
    AttrDef::literal("description")
}

/// Asks the user interface for a child index; ticks exactly one child
/// once the answer is ready (§4.5/§4.8).
#[derive(Debug, Default)]
pub struct UserChoice {
    pending: Option<oac_core::InputFuture<usize>>,
    chosen: Option<usize>,
}

impl Behavior for UserChoice {
    fn attr_schema(&self) -> AttrSchema {
        AttrSchema::new().def(description_def())
    }

    fn reset(&mut self) {
        self.pending = None;
        self.chosen = None;
    }

    fn init(&mut self, ctx: &mut TickCtx) -> Result<()> {
        let description = ctx.attrs.raw("description").unwrap_or("choose a branch");
        self.pending = Some(ctx.ui.request_choice(description, ctx.children.len()));
        Ok(())
    }

    fn tick(&mut self, ctx: &mut TickCtx) -> ExecutionStatus {
        if self.chosen.is_none() {
            let Some(fut) = self.pending.as_mut() else {
                return ExecutionStatus::Failure;
            };
            if ctx.halted {
                fut.cancel();
                return ExecutionStatus::Failure;
            }
            if !fut.is_ready() {
                return ExecutionStatus::Running;
            }
            self.chosen = Some(fut.get());
        }
        let idx = self.chosen.expect("checked above");
        let Some(child) = ctx.children.get_mut(idx) else {
            return ExecutionStatus::Failure;
        };
        child.tick(ctx.ws, ctx.ui)
    }
}

impl InstructionType for UserChoice {
    const NAME: &'static str = "UserChoice";
}

/// §8: `Sequence`/`Fallback` short-circuit correctness, and `ParallelSequence`
/// reaches its reported status exactly when the corresponding threshold of
/// children has completed that way.
#[cfg(test)]
mod composite_properties {
    use super::*;
    use oac_core::attr::AttrBag;
    use oac_core::{Node, NullUserInterface, Workspace};
    use proptest::prelude::*;
    use std::sync::OnceLock;

    #[derive(Debug)]
    struct Fixed(ExecutionStatus);

    impl Behavior for Fixed {
        fn tick(&mut self, _ctx: &mut TickCtx) -> ExecutionStatus {
            self.0
        }
    }

    fn children_from(outcomes: &[bool]) -> Vec<oac_core::Node> {
        outcomes
            .iter()
            .map(|&ok| {
                let status = if ok { ExecutionStatus::Success } else { ExecutionStatus::Failure };
                Node::new("Fixed", Box::new(Fixed(status)), AttrBag::new(), vec![])
            })
            .collect()
    }

    fn test_runtime() -> &'static tokio::runtime::Runtime {
        static RT: OnceLock<tokio::runtime::Runtime> = OnceLock::new();
        RT.get_or_init(|| tokio::runtime::Runtime::new().expect("tokio runtime"))
    }

    proptest! {
        #[test]
        fn sequence_fails_at_first_failure_else_succeeds(outcomes in prop::collection::vec(any::<bool>(), 1..8)) {
            let _guard = test_runtime().enter();
            let ws = Workspace::new();
            let ui = NullUserInterface;
            let children = children_from(&outcomes);
            let mut node = Node::new("Sequence", Box::new(Sequence), AttrBag::new(), children);

            let status = node.tick(&ws, &ui);
            let first_failure = outcomes.iter().position(|&ok| !ok);
            match first_failure {
                Some(_) => prop_assert_eq!(status, ExecutionStatus::Failure),
                None => prop_assert_eq!(status, ExecutionStatus::Success),
            }
            let expected_ticked = first_failure.map(|i| i + 1).unwrap_or(outcomes.len());
            for (i, child) in node.children().iter().enumerate() {
                if i < expected_ticked {
                    prop_assert!(child.status().is_terminal());
                } else {
                    prop_assert_eq!(child.status(), ExecutionStatus::NotStarted);
                }
            }
        }

        #[test]
        fn fallback_succeeds_at_first_success_else_fails(outcomes in prop::collection::vec(any::<bool>(), 1..8)) {
            let _guard = test_runtime().enter();
            let ws = Workspace::new();
            let ui = NullUserInterface;
            let children = children_from(&outcomes);
            let mut node = Node::new("Fallback", Box::new(Fallback), AttrBag::new(), children);

            let status = node.tick(&ws, &ui);
            let first_success = outcomes.iter().position(|&ok| ok);
            match first_success {
                Some(_) => prop_assert_eq!(status, ExecutionStatus::Success),
                None => prop_assert_eq!(status, ExecutionStatus::Failure),
            }
        }

        #[test]
        fn parallel_sequence_reports_status_exactly_at_threshold(
            successes in 1usize..6, failures in 1usize..6,
        ) {
            let _guard = test_runtime().enter();
            let ws = Workspace::new();
            let ui = NullUserInterface;
            let mut outcomes = vec![true; successes];
            outcomes.extend(std::iter::repeat(false).take(failures));
            let children = children_from(&outcomes);
            let mut attrs = AttrBag::new();
            attrs.set("successThreshold", successes.to_string());
            attrs.set("failureThreshold", failures.to_string());
            let mut node =
                Node::new("ParallelSequence", Box::new(ParallelSequence::default()), attrs, children);

            // Both thresholds are exactly met by these outcomes, and
            // `ParallelSequence` checks `successThreshold` first (§9), so
            // the parent reports `Success` regardless of the failure count.
            prop_assert_eq!(node.tick(&ws, &ui), ExecutionStatus::Success);
        }

        #[test]
        fn parallel_sequence_fails_once_failure_threshold_is_met(failures in 1usize..7) {
            let _guard = test_runtime().enter();
            let ws = Workspace::new();
            let ui = NullUserInterface;
            let outcomes = vec![false; failures];
            let children = children_from(&outcomes);
            let mut attrs = AttrBag::new();
            attrs.set("successThreshold", "1");
            attrs.set("failureThreshold", failures.to_string());
            let mut node =
                Node::new("ParallelSequence", Box::new(ParallelSequence::default()), attrs, children);

            prop_assert_eq!(node.tick(&ws, &ui), ExecutionStatus::Failure);
        }
    }
}
