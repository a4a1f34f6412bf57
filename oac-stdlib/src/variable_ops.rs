//! Condition, AddElement, AddMember, Copy, ResetVariable, Increment,
//! Decrement, VarExists (§4.5).

use netidx_value::Value;
use oac_core::attr::{get_attribute_value, split_var_path, AttrDef, AttrSchema, ScalarType};
use oac_core::{AttrBag, Behavior, ExecutionStatus, InstructionType, Severity, TickCtx};

fn var_name_def() -> AttrDef {
    AttrDef::variable_name("varName").mandatory()
}

/// Reads `varName`, coerces it to boolean per §4.5, and reports `Success`
/// iff true. Structures cannot be coerced and always report `Failure`.
#[derive(Debug, Default)]
pub struct Condition;

impl Behavior for Condition {
    fn attr_schema(&self) -> AttrSchema {
        AttrSchema::new().def(var_name_def())
    }

    fn tick(&mut self, ctx: &mut TickCtx) -> ExecutionStatus {
        let def = var_name_def();
        let Some(v) = get_attribute_value(&def, ctx.attrs, ctx.ws) else {
            ctx.ui.log(Severity::Error, "Condition: varName not available");
            return ExecutionStatus::Failure;
        };
        match oac_value::to_bool(&v) {
            Ok(true) => ExecutionStatus::Success,
            Ok(false) => ExecutionStatus::Failure,
            Err(e) => {
                let msg = compact_str::format_compact!("Condition: {e}");
                ctx.ui.log(Severity::Error, msg.as_str());
                ExecutionStatus::Failure
            }
        }
    }
}

impl InstructionType for Condition {
    const NAME: &'static str = "Condition";
}

fn input_var_def() -> AttrDef {
    AttrDef::both("inputVar")
}

fn output_var_def() -> AttrDef {
    AttrDef::variable_name("outputVar").mandatory()
}

/// Writes `attrs.raw(name)` resolved through the write-target convention
/// (a variable name with an optional dotted field path), reading the
/// current value, handing it to `f`, and writing the result back.
fn with_write_target(
    attrs: &AttrBag,
    ctx: &TickCtx,
    name: &str,
    f: impl FnOnce(Option<Value>) -> Option<Value>,
) -> bool {
    let Some(raw) = attrs.raw(name) else { return false };
    let (var, path) = split_var_path(raw);
    let current = ctx.ws.get_value(var, path);
    let Some(new) = f(current) else { return false };
    ctx.ws.set_value(var, path, new)
}

/// Appends `inputVar`'s current value to the array named by `outputVar`
/// (§4.5). `outputVar` must already hold (or be empty and become) an
/// array; mismatched element types fail.
#[derive(Debug, Default)]
pub struct AddElement;

impl Behavior for AddElement {
    fn attr_schema(&self) -> AttrSchema {
        AttrSchema::new().def(input_var_def()).def(output_var_def())
    }

    fn tick(&mut self, ctx: &mut TickCtx) -> ExecutionStatus {
        let Some(input) = get_attribute_value(&input_var_def(), ctx.attrs, ctx.ws) else {
            ctx.ui.log(Severity::Error, "AddElement: inputVar not available");
            return ExecutionStatus::Failure;
        };
        let ok = with_write_target(ctx.attrs, ctx, "outputVar", |current| {
            let mut elems: Vec<Value> = match current {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(a)) => a.iter().cloned().collect(),
                Some(_) => return None,
            };
            if let Some(first) = elems.first() {
                if oac_value::value_type(first) != oac_value::value_type(&input) {
                    return None;
                }
            }
            elems.push(input.clone());
            Some(Value::Array(netidx_value::ValArray::from(elems)))
        });
        if ok {
            ExecutionStatus::Success
        } else {
            ctx.ui.log(Severity::Error, "AddElement: outputVar is not an array or element type mismatch");
            ExecutionStatus::Failure
        }
    }
}

impl InstructionType for AddElement {
    const NAME: &'static str = "AddElement";
}

fn member_name_def() -> AttrDef {
    AttrDef::literal("varName").mandatory()
}

/// Adds a new named field to the structure at `outputVar`, with value from
/// `inputVar` (§4.5). `varName` here is the new field's name, a literal,
/// not a workspace reference.
#[derive(Debug, Default)]
pub struct AddMember;

impl Behavior for AddMember {
    fn attr_schema(&self) -> AttrSchema {
        AttrSchema::new().def(input_var_def()).def(member_name_def()).def(output_var_def())
    }

    fn tick(&mut self, ctx: &mut TickCtx) -> ExecutionStatus {
        let Some(input) = get_attribute_value(&input_var_def(), ctx.attrs, ctx.ws) else {
            ctx.ui.log(Severity::Error, "AddMember: inputVar not available");
            return ExecutionStatus::Failure;
        };
        let field = ctx.attrs.raw("varName").expect("mandatory, validated at Setup").to_owned();
        let ok = with_write_target(ctx.attrs, ctx, "outputVar", |current| {
            let mut fields: Vec<Value> = match current {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(a)) => a.iter().cloned().collect(),
                Some(_) => return None,
            };
            if fields.iter().any(|kv| matches!(kv, Value::Array(p) if p.len() == 2 && matches!(&p[0], Value::String(f) if f.as_str() == field)))
            {
                return None;
            }
            fields.push(Value::Array(netidx_value::ValArray::from([
                Value::String(arcstr::ArcStr::from(field.as_str())),
                input.clone(),
            ])));
            Some(Value::Array(netidx_value::ValArray::from(fields)))
        });
        if ok {
            ExecutionStatus::Success
        } else {
            ctx.ui.log(Severity::Error, "AddMember: outputVar is sealed or already has that member");
            ExecutionStatus::Failure
        }
    }
}

impl InstructionType for AddMember {
    const NAME: &'static str = "AddMember";
}

/// Copies `inputVar`'s current value into `outputVar` (§4.5), subject to
/// the same destination compatibility rule as any workspace write.
#[derive(Debug, Default)]
pub struct Copy;

impl Behavior for Copy {
    fn attr_schema(&self) -> AttrSchema {
        AttrSchema::new().def(input_var_def()).def(output_var_def())
    }

    fn tick(&mut self, ctx: &mut TickCtx) -> ExecutionStatus {
        let Some(input) = get_attribute_value(&input_var_def(), ctx.attrs, ctx.ws) else {
            ctx.ui.log(Severity::Error, "Copy: inputVar not available");
            return ExecutionStatus::Failure;
        };
        let raw = ctx.attrs.raw("outputVar").expect("mandatory, validated at Setup");
        let (var, path) = split_var_path(raw);
        if ctx.ws.set_value(var, path, input) {
            ExecutionStatus::Success
        } else {
            ctx.ui.log(Severity::Error, "Copy: outputVar rejected the value");
            ExecutionStatus::Failure
        }
    }
}

impl InstructionType for Copy {
    const NAME: &'static str = "Copy";
}

/// Clears `varName` back to its empty sentinel (§4.5).
#[derive(Debug, Default)]
pub struct ResetVariable;

impl Behavior for ResetVariable {
    fn attr_schema(&self) -> AttrSchema {
        AttrSchema::new().def(output_var_def())
    }

    fn tick(&mut self, ctx: &mut TickCtx) -> ExecutionStatus {
        let raw = ctx.attrs.raw("outputVar").expect("mandatory, validated at Setup");
        let (var, path) = split_var_path(raw);
        if ctx.ws.set_value(var, path, Value::Null) {
            ExecutionStatus::Success
        } else {
            ctx.ui.log(Severity::Error, "ResetVariable: outputVar not available");
            ExecutionStatus::Failure
        }
    }
}

impl InstructionType for ResetVariable {
    const NAME: &'static str = "ResetVariable";
}

fn amount_def() -> AttrDef {
    AttrDef::both("amount").with_type(ScalarType::Int)
}

fn step(ctx: &mut TickCtx, name: &'static str, delta_sign: i64) -> ExecutionStatus {
    let mut amount = 1i64;
    if !oac_core::attr::get_attribute_value_as(&amount_def(), ctx.attrs, ctx.ws, ctx.ui, &mut amount) {
        return ExecutionStatus::Failure;
    }
    let raw = ctx.attrs.raw("outputVar").expect("mandatory, validated at Setup");
    let (var, path) = split_var_path(raw);
    let Some(current) = ctx.ws.get_value(var, path) else {
        let msg = compact_str::format_compact!("{name}: outputVar not available");
        ctx.ui.log(Severity::Error, msg.as_str());
        return ExecutionStatus::Failure;
    };
    let updated = match current {
        Value::I64(i) => i.checked_add(delta_sign * amount).map(Value::I64),
        Value::U64(u) => {
            let signed = delta_sign * amount;
            (u as i64).checked_add(signed).filter(|v| *v >= 0).map(|v| Value::U64(v as u64))
        }
        Value::F64(f) => Some(Value::F64(f + (delta_sign * amount) as f64)),
        _ => None,
    };
    let Some(updated) = updated else {
        let msg = compact_str::format_compact!("{name}: overflow or non-numeric outputVar");
        ctx.ui.log(Severity::Error, msg.as_str());
        return ExecutionStatus::Failure;
    };
    if ctx.ws.set_value(var, path, updated) {
        ExecutionStatus::Success
    } else {
        ExecutionStatus::Failure
    }
}

/// Adds `amount` (default 1) to `outputVar` in place (§4.5). Overflow
/// fails rather than wrapping or panicking.
#[derive(Debug, Default)]
pub struct Increment;

impl Behavior for Increment {
    fn attr_schema(&self) -> AttrSchema {
        AttrSchema::new().def(output_var_def()).def(amount_def())
    }

    fn tick(&mut self, ctx: &mut TickCtx) -> ExecutionStatus {
        step(ctx, "Increment", 1)
    }
}

impl InstructionType for Increment {
    const NAME: &'static str = "Increment";
}

/// As [`Increment`], subtracting instead of adding.
#[derive(Debug, Default)]
pub struct Decrement;

impl Behavior for Decrement {
    fn attr_schema(&self) -> AttrSchema {
        AttrSchema::new().def(output_var_def()).def(amount_def())
    }

    fn tick(&mut self, ctx: &mut TickCtx) -> ExecutionStatus {
        step(ctx, "Decrement", -1)
    }
}

impl InstructionType for Decrement {
    const NAME: &'static str = "Decrement";
}

fn exists_var_name_def() -> AttrDef {
    AttrDef::literal("varName").mandatory()
}

/// `Success` iff the named variable exists in the workspace (§4.5). The
/// name itself is a literal: this instruction tests for presence, so it
/// must never dereference it as a workspace reference.
#[derive(Debug, Default)]
pub struct VarExists;

impl Behavior for VarExists {
    fn attr_schema(&self) -> AttrSchema {
        AttrSchema::new().def(exists_var_name_def())
    }

    fn tick(&mut self, ctx: &mut TickCtx) -> ExecutionStatus {
        let name = ctx.attrs.raw("varName").expect("mandatory, validated at Setup");
        let (name, _) = split_var_path(name);
        if ctx.ws.contains(name) {
            ExecutionStatus::Success
        } else {
            ExecutionStatus::Failure
        }
    }
}

impl InstructionType for VarExists {
    const NAME: &'static str = "VarExists";
}
