//! Wait, WaitForVariable, WaitForVariables (§4.5).

use std::time::{Duration, Instant};

use anyhow::Result;
use oac_core::attr::{get_attribute_value, AttrDef, AttrSchema, ScalarType};
use oac_core::{Behavior, ExecutionStatus, InstructionType, TickCtx};

fn timeout_def() -> AttrDef {
    AttrDef::both("timeout").with_type(ScalarType::Float)
}

fn deadline_from(ctx: &mut TickCtx, def: &AttrDef) -> Option<Instant> {
    let mut secs = 0.0f64;
    oac_core::attr::get_attribute_value_as(def, ctx.attrs, ctx.ws, ctx.ui, &mut secs);
    if secs > 0.0 {
        Some(Instant::now() + Duration::from_secs_f64(secs))
    } else {
        None
    }
}

/// Waits out a fixed duration, recorded once at `init` against the
/// monotonic clock (§4.5). A missing or non-positive `timeout` is
/// `Success` on the very next tick.
#[derive(Debug, Default)]
pub struct Wait {
    deadline: Option<Instant>,
    timed: bool,
}

impl Behavior for Wait {
    fn attr_schema(&self) -> AttrSchema {
        AttrSchema::new().def(timeout_def())
    }

    fn reset(&mut self) {
        self.deadline = None;
        self.timed = false;
    }

    fn init(&mut self, ctx: &mut TickCtx) -> Result<()> {
        self.deadline = deadline_from(ctx, &timeout_def());
        self.timed = self.deadline.is_some();
        Ok(())
    }

    fn tick(&mut self, ctx: &mut TickCtx) -> ExecutionStatus {
        if ctx.halted {
            return ExecutionStatus::Failure;
        }
        if !self.timed {
            return ExecutionStatus::Success;
        }
        match self.deadline {
            Some(d) if Instant::now() < d => ExecutionStatus::Running,
            _ => ExecutionStatus::Success,
        }
    }
}

impl InstructionType for Wait {
    const NAME: &'static str = "Wait";
}

fn var_name_def() -> AttrDef {
    AttrDef::variable_name("varName").mandatory()
}

fn equals_var_def() -> AttrDef {
    AttrDef::variable_name("equalsVar")
}

/// Waits until `varName` is readable and non-empty — and, if `equalsVar`
/// is given, equal to it — or fails at `timeout` (§4.5).
#[derive(Debug, Default)]
pub struct WaitForVariable {
    deadline: Option<Instant>,
}

impl Behavior for WaitForVariable {
    fn attr_schema(&self) -> AttrSchema {
        AttrSchema::new().def(timeout_def()).def(var_name_def()).def(equals_var_def())
    }

    fn reset(&mut self) {
        self.deadline = None;
    }

    fn init(&mut self, ctx: &mut TickCtx) -> Result<()> {
        self.deadline = deadline_from(ctx, &timeout_def());
        Ok(())
    }

    fn tick(&mut self, ctx: &mut TickCtx) -> ExecutionStatus {
        if ctx.halted {
            return ExecutionStatus::Failure;
        }
        let ready = match get_attribute_value(&var_name_def(), ctx.attrs, ctx.ws) {
            Some(v) if !oac_value::is_empty(&v) => match get_attribute_value(&equals_var_def(), ctx.attrs, ctx.ws) {
                Some(reference) => v == reference,
                None => true,
            },
            _ => false,
        };
        if ready {
            return ExecutionStatus::Success;
        }
        match self.deadline {
            Some(d) if Instant::now() >= d => ExecutionStatus::Failure,
            _ => ExecutionStatus::Running,
        }
    }
}

impl InstructionType for WaitForVariable {
    const NAME: &'static str = "WaitForVariable";
}

fn var_type_def() -> AttrDef {
    AttrDef::literal("varType").mandatory()
}

/// Waits until every workspace variable of type `varType` is available, or
/// fails at `timeout` (§4.5).
#[derive(Debug, Default)]
pub struct WaitForVariables {
    deadline: Option<Instant>,
}

impl Behavior for WaitForVariables {
    fn attr_schema(&self) -> AttrSchema {
        AttrSchema::new().def(timeout_def()).def(var_type_def())
    }

    fn reset(&mut self) {
        self.deadline = None;
    }

    fn init(&mut self, ctx: &mut TickCtx) -> Result<()> {
        self.deadline = deadline_from(ctx, &timeout_def());
        Ok(())
    }

    fn tick(&mut self, ctx: &mut TickCtx) -> ExecutionStatus {
        if ctx.halted {
            return ExecutionStatus::Failure;
        }
        let var_type = ctx.attrs.raw("varType").expect("mandatory, validated at Setup");
        let all_available = ctx
            .ws
            .variable_names()
            .filter(|n| ctx.ws.variable_type(n).as_deref() == Some(var_type))
            .all(|n| ctx.ws.is_available(n));
        if all_available {
            return ExecutionStatus::Success;
        }
        match self.deadline {
            Some(d) if Instant::now() >= d => ExecutionStatus::Failure,
            _ => ExecutionStatus::Running,
        }
    }
}

impl InstructionType for WaitForVariables {
    const NAME: &'static str = "WaitForVariables";
}
