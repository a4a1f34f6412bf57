//! Equals, GreaterThan, GreaterThanOrEqual, LessThan, LessThanOrEqual (§4.5).

use std::cmp::Ordering;

use anyhow::Result;
use netidx_value::Value;
use oac_core::attr::{get_attribute_value, AttrDef, AttrSchema};
use oac_core::{Behavior, ExecutionStatus, InstructionType, Severity, TickCtx};

fn lhs_def() -> AttrDef {
    AttrDef::both("lhs")
}

fn rhs_def() -> AttrDef {
    AttrDef::both("rhs")
}

/// Numeric or lexicographic comparison after type coercion (§4.5).
/// Comparing values of incompatible types is always `Failure`, never a
/// panic or a default ordering.
fn compare(lhs: &Value, rhs: &Value) -> Result<Ordering> {
    match (lhs, rhs) {
        (Value::String(a), Value::String(b)) => Ok(a.as_str().cmp(b.as_str())),
        (Value::Bool(a), Value::Bool(b)) => Ok(a.cmp(b)),
        _ => {
            let a = lhs.clone().cast_to::<f64>().map_err(|e| anyhow::anyhow!("{e}"))?;
            let b = rhs.clone().cast_to::<f64>().map_err(|e| anyhow::anyhow!("{e}"))?;
            a.partial_cmp(&b).ok_or_else(|| anyhow::anyhow!("cannot order NaN"))
        }
    }
}

macro_rules! comparison_instruction {
    ($name:ident, $accepts:expr) => {
        #[derive(Debug, Default)]
        pub struct $name;

        impl Behavior for $name {
            fn attr_schema(&self) -> AttrSchema {
                AttrSchema::new().def(lhs_def()).def(rhs_def())
            }

            fn tick(&mut self, ctx: &mut TickCtx) -> ExecutionStatus {
                let Some(lhs) = get_attribute_value(&lhs_def(), ctx.attrs, ctx.ws) else {
                    ctx.ui.log(Severity::Error, concat!(stringify!($name), ": lhs not available"));
                    return ExecutionStatus::Failure;
                };
                let Some(rhs) = get_attribute_value(&rhs_def(), ctx.attrs, ctx.ws) else {
                    ctx.ui.log(Severity::Error, concat!(stringify!($name), ": rhs not available"));
                    return ExecutionStatus::Failure;
                };
                match compare(&lhs, &rhs) {
                    Ok(ord) if ($accepts)(ord) => ExecutionStatus::Success,
                    Ok(_) => ExecutionStatus::Failure,
                    Err(e) => {
                        let msg = compact_str::format_compact!(concat!(stringify!($name), ": {}"), e);
                        ctx.ui.log(Severity::Error, msg.as_str());
                        ExecutionStatus::Failure
                    }
                }
            }
        }

        impl InstructionType for $name {
            const NAME: &'static str = stringify!($name);
        }
    };
}

comparison_instruction!(Equals, (|o: Ordering| o == Ordering::Equal));
comparison_instruction!(GreaterThan, (|o: Ordering| o == Ordering::Greater));
comparison_instruction!(GreaterThanOrEqual, (|o: Ordering| o != Ordering::Less));
comparison_instruction!(LessThan, (|o: Ordering| o == Ordering::Less));
comparison_instruction!(LessThanOrEqual, (|o: Ordering| o != Ordering::Greater));
