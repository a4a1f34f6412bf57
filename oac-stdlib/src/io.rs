//! Input, Output, Message, Log, UserConfirmation (§4.5/§4.6).

use anyhow::Result;
use oac_core::attr::{get_attribute_value, split_var_path, AttrDef, AttrSchema};
use oac_core::{AttrBag, Behavior, ExecutionStatus, InputFuture, InstructionType, Severity, TickCtx};

fn output_var_def() -> AttrDef {
    AttrDef::variable_name("outputVar").mandatory()
}

fn description_def() -> AttrDef {
    AttrDef::literal("description")
}

/// Requests a value from the user interface; on ready, parses it and
/// writes it to `outputVar` (§4.5/§4.6). The request is cancelled if the
/// node is halted while pending.
#[derive(Debug, Default)]
pub struct Input {
    pending: Option<InputFuture<arcstr::ArcStr>>,
}

impl Behavior for Input {
    fn attr_schema(&self) -> AttrSchema {
        AttrSchema::new().def(output_var_def()).def(description_def())
    }

    fn reset(&mut self) {
        self.pending = None;
    }

    fn init(&mut self, ctx: &mut TickCtx) -> Result<()> {
        self.pending = Some(ctx.ui.request_input(ctx.attrs.raw("description")));
        Ok(())
    }

    fn tick(&mut self, ctx: &mut TickCtx) -> ExecutionStatus {
        let Some(fut) = self.pending.as_mut() else { return ExecutionStatus::Failure };
        if ctx.halted {
            fut.cancel();
            return ExecutionStatus::Failure;
        }
        if !fut.is_ready() {
            return ExecutionStatus::Running;
        }
        let raw = fut.get();
        let value = oac_value::parse_json(&raw, "Input")
            .unwrap_or_else(|_| netidx_value::Value::String(raw.clone()));
        let raw_attr = ctx.attrs.raw("outputVar").expect("mandatory, validated at Setup");
        let (var, path) = split_var_path(raw_attr);
        if ctx.ws.set_value(var, path, value) {
            ExecutionStatus::Success
        } else {
            ctx.ui.log(Severity::Error, "Input: outputVar rejected the value");
            ExecutionStatus::Failure
        }
    }
}

impl InstructionType for Input {
    const NAME: &'static str = "Input";
}

fn value_def() -> AttrDef {
    AttrDef::both("value")
}

/// Formats `value`'s current contents and sends it to the user interface
/// as a one-way message (§4.5/§4.6).
#[derive(Debug, Default)]
pub struct Output;

impl Behavior for Output {
    fn attr_schema(&self) -> AttrSchema {
        AttrSchema::new().def(value_def())
    }

    fn tick(&mut self, ctx: &mut TickCtx) -> ExecutionStatus {
        let Some(v) = get_attribute_value(&value_def(), ctx.attrs, ctx.ws) else {
            ctx.ui.log(Severity::Error, "Output: value not available");
            return ExecutionStatus::Failure;
        };
        ctx.ui.message(&oac_value::display(&v));
        ExecutionStatus::Success
    }
}

impl InstructionType for Output {
    const NAME: &'static str = "Output";
}

fn text_def() -> AttrDef {
    AttrDef::literal("text").mandatory()
}

/// Sends a fixed literal message to the user interface (§4.5/§4.6).
#[derive(Debug, Default)]
pub struct Message;

impl Behavior for Message {
    fn attr_schema(&self) -> AttrSchema {
        AttrSchema::new().def(text_def())
    }

    fn tick(&mut self, ctx: &mut TickCtx) -> ExecutionStatus {
        ctx.ui.message(ctx.attrs.raw("text").expect("mandatory, validated at Setup"));
        ExecutionStatus::Success
    }
}

impl InstructionType for Message {
    const NAME: &'static str = "Message";
}

fn severity_def() -> AttrDef {
    AttrDef::literal("severity")
}

fn resolved_severity(attrs: &AttrBag) -> Result<Severity> {
    let raw = attrs.raw("severity").unwrap_or("info");
    Severity::parse(raw).ok_or_else(|| anyhow::anyhow!("unknown severity {raw:?}"))
}

/// Sends a structured log line at a declared severity (§4.5/§4.6). An
/// unrecognized `severity` string fails at `Setup`, not at tick time.
#[derive(Debug, Default)]
pub struct Log;

impl Behavior for Log {
    fn attr_schema(&self) -> AttrSchema {
        AttrSchema::new().def(text_def()).def(severity_def())
    }

    fn resolve(&mut self, attrs: &AttrBag, _ctx: &oac_core::instruction::SetupCtx) -> Result<()> {
        resolved_severity(attrs)?;
        Ok(())
    }

    fn tick(&mut self, ctx: &mut TickCtx) -> ExecutionStatus {
        let severity = resolved_severity(ctx.attrs).expect("validated at Setup");
        ctx.ui.log(severity, ctx.attrs.raw("text").expect("mandatory, validated at Setup"));
        ExecutionStatus::Success
    }
}

impl InstructionType for Log {
    const NAME: &'static str = "Log";
}

/// Async yes/no/cancel prompt; `Success` on confirm, `Failure` on reject or
/// halt (§4.5/§4.6).
#[derive(Debug, Default)]
pub struct UserConfirmation {
    pending: Option<InputFuture<bool>>,
}

impl Behavior for UserConfirmation {
    fn attr_schema(&self) -> AttrSchema {
        AttrSchema::new()
            .def(description_def().mandatory())
            .def(AttrDef::literal("okText"))
            .def(AttrDef::literal("cancelText"))
    }

    fn reset(&mut self) {
        self.pending = None;
    }

    fn init(&mut self, ctx: &mut TickCtx) -> Result<()> {
        let description = ctx.attrs.raw("description").expect("mandatory, validated at Setup");
        self.pending = Some(ctx.ui.request_confirmation(
            description,
            ctx.attrs.raw("okText"),
            ctx.attrs.raw("cancelText"),
        ));
        Ok(())
    }

    fn tick(&mut self, ctx: &mut TickCtx) -> ExecutionStatus {
        let Some(fut) = self.pending.as_mut() else { return ExecutionStatus::Failure };
        if ctx.halted {
            fut.cancel();
            return ExecutionStatus::Failure;
        }
        if !fut.is_ready() {
            return ExecutionStatus::Running;
        }
        if fut.get() {
            ExecutionStatus::Success
        } else {
            ExecutionStatus::Failure
        }
    }
}

impl InstructionType for UserConfirmation {
    const NAME: &'static str = "UserConfirmation";
}
