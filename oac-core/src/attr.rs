//! The attribute system (§4.3): declarative attribute definitions with
//! categories, typed coercion, cross-attribute constraints, and fail-fast
//! setup validation.

use anyhow::Result;
use arcstr::ArcStr;
use indexmap::IndexMap;
use netidx_value::Value;

use crate::error::CoreError;
use crate::ui::UserInterface;
use crate::workspace::Workspace;

/// The declared scalar type of a `Literal`-category attribute (§4.3).
/// Defaults to `String` when a concrete instruction doesn't specify one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    String,
    Bool,
    Int,
    Float,
}

impl Default for ScalarType {
    fn default() -> Self {
        Self::String
    }
}

impl ScalarType {
    fn parses(&self, raw: &str) -> bool {
        match self {
            Self::String => true,
            Self::Bool => raw.parse::<bool>().is_ok(),
            Self::Int => raw.parse::<i64>().is_ok(),
            Self::Float => raw.parse::<f64>().is_ok(),
        }
    }
}

/// Whether an attribute's raw string is a literal, a workspace variable
/// (field) name, or may be either depending on an `@` prefix (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrCategory {
    Literal,
    VariableName,
    Both,
}

#[derive(Debug, Clone)]
pub struct AttrDef {
    pub name: ArcStr,
    pub scalar_type: ScalarType,
    pub category: AttrCategory,
    pub mandatory: bool,
}

impl AttrDef {
    pub fn literal(name: impl Into<ArcStr>) -> Self {
        Self {
            name: name.into(),
            scalar_type: ScalarType::String,
            category: AttrCategory::Literal,
            mandatory: false,
        }
    }

    pub fn with_type(mut self, t: ScalarType) -> Self {
        self.scalar_type = t;
        self
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn variable_name(name: impl Into<ArcStr>) -> Self {
        Self {
            name: name.into(),
            scalar_type: ScalarType::String,
            category: AttrCategory::VariableName,
            mandatory: false,
        }
    }

    pub fn both(name: impl Into<ArcStr>) -> Self {
        Self {
            name: name.into(),
            scalar_type: ScalarType::String,
            category: AttrCategory::Both,
            mandatory: false,
        }
    }
}

/// A boolean predicate over the attribute bag, built from the primitives
/// of §4.3.
#[derive(Debug, Clone)]
pub enum Constraint {
    Exists(ArcStr),
    And(Box<Constraint>, Box<Constraint>),
    Or(Box<Constraint>, Box<Constraint>),
    Xor(Box<Constraint>, Box<Constraint>),
    Not(Box<Constraint>),
}

impl Constraint {
    fn eval(&self, bag: &AttrBag) -> bool {
        match self {
            Self::Exists(n) => bag.contains(n),
            Self::And(a, b) => a.eval(bag) && b.eval(bag),
            Self::Or(a, b) => a.eval(bag) || b.eval(bag),
            Self::Xor(a, b) => a.eval(bag) ^ b.eval(bag),
            Self::Not(a) => !a.eval(bag),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Exists(n) => format!("Exists({n})"),
            Self::And(a, b) => format!("And({}, {})", a.describe(), b.describe()),
            Self::Or(a, b) => format!("Or({}, {})", a.describe(), b.describe()),
            Self::Xor(a, b) => format!("Xor({}, {})", a.describe(), b.describe()),
            Self::Not(a) => format!("Not({})", a.describe()),
        }
    }
}

/// The ordered raw-string attribute bag attached to a concrete instruction
/// or variable (§3).
#[derive(Debug, Clone, Default)]
pub struct AttrBag(IndexMap<ArcStr, ArcStr>);

impl AttrBag {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    pub fn set(&mut self, name: impl Into<ArcStr>, value: impl Into<ArcStr>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn raw(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(|s| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// The set of attribute definitions and constraints a concrete instruction
/// or variable registers at construction (§4.3).
#[derive(Debug, Clone, Default)]
pub struct AttrSchema {
    pub defs: Vec<AttrDef>,
    pub constraints: Vec<Constraint>,
}

impl AttrSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn def(mut self, d: AttrDef) -> Self {
        self.defs.push(d);
        self
    }

    pub fn constraint(mut self, c: Constraint) -> Self {
        self.constraints.push(c);
        self
    }

    /// Validate `bag` against this schema (§4.3). No side effects of a
    /// failed validation persist: this function only reads `bag`.
    pub fn validate(&self, instruction_type: &str, bag: &AttrBag) -> Result<()> {
        for def in &self.defs {
            let raw = bag.raw(&def.name);
            if def.mandatory && raw.is_none() {
                return Err(CoreError::AttributeError {
                    instruction_type: ArcStr::from(instruction_type),
                    detail: ArcStr::from(format!("missing mandatory attribute {}", def.name)),
                }
                .into());
            }
            let Some(raw) = raw else { continue };
            match def.category {
                AttrCategory::Literal => {
                    if !def.scalar_type.parses(raw) {
                        return Err(CoreError::AttributeError {
                            instruction_type: ArcStr::from(instruction_type),
                            detail: ArcStr::from(format!(
                                "attribute {} does not parse as {:?}",
                                def.name, def.scalar_type
                            )),
                        }
                        .into());
                    }
                }
                AttrCategory::VariableName => {
                    if raw.is_empty() {
                        return Err(CoreError::AttributeError {
                            instruction_type: ArcStr::from(instruction_type),
                            detail: ArcStr::from(format!(
                                "attribute {} must name a variable",
                                def.name
                            )),
                        }
                        .into());
                    }
                }
                AttrCategory::Both => {
                    let literal_part = raw.strip_prefix('@').unwrap_or(raw);
                    if raw.starts_with('@') {
                        if literal_part.is_empty() {
                            return Err(CoreError::AttributeError {
                                instruction_type: ArcStr::from(instruction_type),
                                detail: ArcStr::from(format!(
                                    "attribute {} must name a variable after @",
                                    def.name
                                )),
                            }
                            .into());
                        }
                    } else if !def.scalar_type.parses(raw) {
                        return Err(CoreError::AttributeError {
                            instruction_type: ArcStr::from(instruction_type),
                            detail: ArcStr::from(format!(
                                "attribute {} does not parse as {:?}",
                                def.name, def.scalar_type
                            )),
                        }
                        .into());
                    }
                }
            }
        }
        for c in &self.constraints {
            if !c.eval(bag) {
                return Err(CoreError::AttributeError {
                    instruction_type: ArcStr::from(instruction_type),
                    detail: ArcStr::from(format!("constraint {} failed", c.describe())),
                }
                .into());
            }
        }
        Ok(())
    }
}

/// Read the raw value of `name` at tick time (§4.3): for `VariableName`,
/// reads the named workspace field; for `Both`, strips a leading `@` and
/// reads the workspace field, or returns the literal as-is.
pub fn get_attribute_value(
    def: &AttrDef,
    bag: &AttrBag,
    ws: &Workspace,
) -> Option<Value> {
    let raw = bag.raw(&def.name)?;
    match def.category {
        AttrCategory::Literal => Some(Value::String(ArcStr::from(raw))),
        AttrCategory::VariableName => {
            let (var, path) = split_var_path(raw);
            ws.get_value(var, path)
        }
        AttrCategory::Both => {
            if let Some(rest) = raw.strip_prefix('@') {
                let (var, path) = split_var_path(rest);
                ws.get_value(var, path)
            } else {
                Some(Value::String(ArcStr::from(raw)))
            }
        }
    }
}

/// Split a `VariableName`/`Both`-category raw attribute value into a
/// workspace variable name and a (possibly empty) dotted field path.
/// Exposed for instructions that need to *write* to a named location
/// (e.g. `Copy`'s destination, `For`'s `elementVar`) rather than read its
/// current value through [`get_attribute_value`].
pub fn split_var_path(raw: &str) -> (&str, &str) {
    match raw.split_once('.') {
        Some((var, path)) => (var, path),
        None => (raw, ""),
    }
}

/// As `get_attribute_value`, plus conversion to `T`. Absence returns `true`
/// with `out` left unchanged, so callers can preset a default; conversion
/// failure logs to the user interface at `error` severity and returns
/// `false` (§4.3).
pub fn get_attribute_value_as<T: netidx_value::FromValue>(
    def: &AttrDef,
    bag: &AttrBag,
    ws: &Workspace,
    ui: &dyn UserInterface,
    out: &mut T,
) -> bool {
    let Some(v) = get_attribute_value(def, bag, ws) else { return true };
    match v.cast_to::<T>() {
        Ok(t) => {
            *out = t;
            true
        }
        Err(e) => {
            ui.log(
                crate::ui::Severity::Error,
                &format!("attribute {} failed to convert: {e}", def.name),
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mandatory_missing_fails() {
        let schema = AttrSchema::new().def(AttrDef::literal("x").mandatory());
        let bag = AttrBag::new();
        assert!(schema.validate("Test", &bag).is_err());
    }

    #[test]
    fn literal_type_mismatch_fails() {
        let schema =
            AttrSchema::new().def(AttrDef::literal("n").with_type(ScalarType::Int));
        let mut bag = AttrBag::new();
        bag.set("n", "not-a-number");
        assert!(schema.validate("Test", &bag).is_err());
    }

    #[test]
    fn both_category_accepts_at_prefixed_reference() {
        let schema = AttrSchema::new()
            .def(AttrDef::both("v").with_type(ScalarType::Int));
        let mut bag = AttrBag::new();
        bag.set("v", "@myvar");
        assert!(schema.validate("Test", &bag).is_ok());
    }

    #[test]
    fn xor_constraint() {
        let schema = AttrSchema::new()
            .def(AttrDef::literal("a"))
            .def(AttrDef::literal("b"))
            .constraint(Constraint::Xor(
                Box::new(Constraint::Exists(ArcStr::from("a"))),
                Box::new(Constraint::Exists(ArcStr::from("b"))),
            ));
        let mut bag = AttrBag::new();
        bag.set("a", "1");
        bag.set("b", "2");
        assert!(schema.validate("Test", &bag).is_err());
    }
}
