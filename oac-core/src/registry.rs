//! The type registry (§4.7): a process-wide map from stable type names to
//! constructors for instruction behaviors and workspace variable backends,
//! queried by a parser turning markup into a live instruction tree.
//!
//! Grounded on `graphix-compiler`'s `ExecCtx::register_builtin` /
//! `BuiltIn` pattern: a type supplies its own stable name and a default
//! constructor, and registration is a single generic call.

use fxhash::FxHashMap;

use crate::instruction::Behavior;
use crate::workspace::Variable;

pub type InstructionFactory = fn() -> Box<dyn Behavior>;
pub type VariableFactory = fn() -> Box<dyn Variable>;

/// Implemented by every concrete instruction behavior so it can register
/// itself into a [`Registry`] by type parameter alone, e.g.
/// `registry.register_instruction::<Sequence>()`.
pub trait InstructionType: Behavior + Default + 'static {
    const NAME: &'static str;
}

/// As [`InstructionType`], for workspace variable backends.
pub trait VariableType: Variable + Default + 'static {
    const NAME: &'static str;
}

/// A process-wide registry of instruction and variable type constructors
/// (§4.7). Read-only queries (`instruction`, `variable`) are safe to call
/// concurrently with each other; registration is expected to happen once,
/// at startup, before any procedure is parsed.
#[derive(Default)]
pub struct Registry {
    instructions: FxHashMap<&'static str, InstructionFactory>,
    variables: FxHashMap<&'static str, VariableFactory>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_instruction<T: InstructionType>(&mut self) {
        self.instructions.insert(T::NAME, || Box::new(T::default()));
    }

    pub fn register_variable<T: VariableType>(&mut self) {
        self.variables.insert(T::NAME, || Box::new(T::default()));
    }

    pub fn instruction(&self, type_name: &str) -> Option<Box<dyn Behavior>> {
        self.instructions.get(type_name).map(|f| f())
    }

    pub fn variable(&self, type_name: &str) -> Option<Box<dyn Variable>> {
        self.variables.get(type_name).map(|f| f())
    }

    pub fn instruction_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.instructions.keys().copied()
    }

    pub fn variable_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.variables.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::AttrSchema;
    use crate::instruction::TickCtx;
    use crate::workspace::{LocalVariable, SetupTeardownActions};
    use anyhow::Result;

    #[derive(Debug, Default)]
    struct Noop;

    impl Behavior for Noop {
        fn attr_schema(&self) -> AttrSchema {
            AttrSchema::new()
        }
        fn tick(&mut self, _ctx: &mut TickCtx) -> crate::instruction::ExecutionStatus {
            crate::instruction::ExecutionStatus::Success
        }
    }

    impl InstructionType for Noop {
        const NAME: &'static str = "Noop";
    }

    #[derive(Debug, Default)]
    struct AlwaysAvailable(LocalVariable);

    impl Variable for AlwaysAvailable {
        fn type_name(&self) -> &str {
            "AlwaysAvailable"
        }
        fn setup(&mut self) -> Result<SetupTeardownActions> {
            self.0.setup()
        }
        fn teardown(&mut self) {
            self.0.teardown()
        }
        fn is_available(&self) -> bool {
            true
        }
        fn get_value(&self, field_path: &str) -> Option<netidx_value::Value> {
            self.0.get_value(field_path)
        }
        fn set_value(&mut self, field_path: &str, value: netidx_value::Value) -> bool {
            self.0.set_value(field_path, value)
        }
    }

    impl VariableType for AlwaysAvailable {
        const NAME: &'static str = "AlwaysAvailable";
    }

    #[test]
    fn register_and_lookup() {
        let mut r = Registry::new();
        r.register_instruction::<Noop>();
        r.register_variable::<AlwaysAvailable>();
        assert!(r.instruction("Noop").is_some());
        assert!(r.instruction("Nope").is_none());
        assert!(r.variable("AlwaysAvailable").is_some());
    }
}
