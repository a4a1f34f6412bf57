//! Adapter around the externally supplied dynamic value type.
//!
//! The engine never inspects a [`Value`]'s representation directly outside
//! this crate; everything else goes through the handful of operations
//! exposed here. `Value` itself is re-exported from `netidx_value`, the
//! dynamically typed, reference-counted value type used across the netidx
//! ecosystem this crate's stack is drawn from.

use anyhow::{anyhow, bail, Result};
use arcstr::ArcStr;
use netidx_value::{Typ, Value};

pub use netidx_value::{Value as RawValue, ValArray};

/// `true` if `v` carries no meaningful payload (the `Null` sentinel).
pub fn is_empty(v: &Value) -> bool {
    matches!(v, Value::Null)
}

/// The stable type name of `v`, as used in attribute-type-mismatch
/// diagnostics and by `WaitForVariables`'s `varType` matching.
pub fn value_type(v: &Value) -> &'static str {
    Typ::get(v).name()
}

/// A struct-shaped [`Value`] is represented, as it is in the value crate's
/// own convention, as an array of two-element `[key, value]` arrays. This
/// mirrors the representation a struct literal compiles down to upstream.
fn struct_field<'a>(v: &'a Value, field: &str) -> Option<&'a Value> {
    match v {
        Value::Array(a) => a.iter().find_map(|kv| match kv {
            Value::Array(pair) if pair.len() == 2 => match &pair[0] {
                Value::String(f) if f.as_str() == field => Some(&pair[1]),
                _ => None,
            },
            _ => None,
        }),
        _ => None,
    }
}

/// Read the value at `path` (dot-separated field names; an empty path
/// returns `v` itself). Returns `None` if any segment is absent or `v`
/// is not struct-shaped at that point.
pub fn get_field(v: &Value, path: &str) -> Option<Value> {
    if path.is_empty() {
        return Some(v.clone());
    }
    let mut cur = v.clone();
    for seg in path.split('.') {
        cur = struct_field(&cur, seg)?.clone();
    }
    Some(cur)
}

/// Assign `src` into `*dst`, following the rule in §4.1: succeeds iff the
/// destination is empty, type-compatible with `src`, or the destination
/// accepts dynamic re-typing (i.e. was itself empty/untyped).
pub fn assign_from(dst: &mut Value, src: &Value) -> bool {
    if is_empty(dst) || value_type(dst) == value_type(src) || matches!(dst, Value::Null)
    {
        *dst = src.clone();
        true
    } else {
        false
    }
}

/// Parse `text` (a JSON-like literal) into a `Value` of the type named by
/// `type_descriptor`. The descriptor is opaque to this crate: it is
/// whatever the external `AnyType` registry hands back as a display name,
/// used here only for error messages.
pub fn parse_json(text: &str, type_descriptor: &str) -> Result<Value> {
    netidx_value::parser::parse_value(text)
        .map_err(|e| anyhow!("cannot parse {type_descriptor} literal {text:?}: {e}"))
}

/// Coerce `v` to a boolean per the `Condition` instruction's rule (§4.5):
/// integers are nonzero, floats are nonzero-and-not-NaN, strings are
/// non-empty, structures are rejected.
pub fn to_bool(v: &Value) -> Result<bool> {
    match v {
        Value::Bool(b) => Ok(*b),
        Value::String(s) => Ok(!s.is_empty()),
        Value::Null => Ok(false),
        Value::Array(_) => bail!("cannot coerce a structured value to bool"),
        v => match v.clone().cast_to::<f64>() {
            Ok(f) => Ok(!f.is_nan() && f != 0.0),
            Err(_) => bail!("cannot coerce {} to bool", value_type(v)),
        },
    }
}

/// Render `v` for logging/user-interface messages.
pub fn display(v: &Value) -> ArcStr {
    ArcStr::from(format!("{v}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(k: &str, v: Value) -> Value {
        Value::Array(ValArray::from([Value::String(ArcStr::from(k)), v]))
    }

    #[test]
    fn struct_field_path_roundtrip() {
        let inner = Value::Array(ValArray::from([pair("y", Value::Bool(true))]));
        let outer = Value::Array(ValArray::from([pair("x", inner)]));
        assert_eq!(get_field(&outer, "x.y"), Some(Value::Bool(true)));
        assert_eq!(get_field(&outer, "x.z"), None);
        assert_eq!(get_field(&outer, ""), Some(outer.clone()));
    }

    #[test]
    fn assign_requires_type_match_unless_empty() {
        let mut dst = Value::Null;
        assert!(assign_from(&mut dst, &Value::Bool(true)));
        assert_eq!(dst, Value::Bool(true));
        let mut dst = Value::Bool(false);
        assert!(!assign_from(&mut dst, &Value::String(ArcStr::from("x"))));
    }

    #[test]
    fn bool_coercion() {
        assert_eq!(to_bool(&Value::String(ArcStr::from(""))).unwrap(), false);
        assert_eq!(to_bool(&Value::String(ArcStr::from("x"))).unwrap(), true);
        assert_eq!(to_bool(&Value::F64(0.0)).unwrap(), false);
        assert_eq!(to_bool(&Value::F64(f64::NAN)).unwrap(), false);
    }
}
