//! The concrete instruction library (§4.5): every compound, decorator, and
//! action instruction the engine ships with, registered into an
//! `oac_core::Registry` by name so a parser (out of scope for this crate)
//! can build a live tree from markup.

pub mod achieve;
pub mod comparisons;
pub mod composites;
pub mod decorators;
pub mod include;
pub mod io;
pub mod timing;
pub mod variable_ops;

use oac_core::Registry;

/// Register every instruction type named in §4.5 into `registry`. Mirrors
/// `graphix_stdlib::register`'s role of populating an `ExecCtx` with every
/// builtin a fresh runtime needs before it can compile anything; here a
/// fresh `Registry` needs this call before a parser can resolve a single
/// instruction element.
pub fn register(registry: &mut Registry) {
    registry.register_instruction::<composites::Sequence>();
    registry.register_instruction::<composites::Fallback>();
    registry.register_instruction::<composites::ParallelSequence>();
    registry.register_instruction::<composites::Choice>();
    registry.register_instruction::<composites::UserChoice>();

    registry.register_instruction::<decorators::Inverter>();
    registry.register_instruction::<decorators::ForceSuccess>();
    registry.register_instruction::<decorators::For>();
    registry.register_instruction::<decorators::Repeat>();
    registry.register_instruction::<decorators::Listen>();

    registry.register_instruction::<include::Include>();
    registry.register_instruction::<include::IncludeProcedure>();

    registry.register_instruction::<variable_ops::Condition>();
    registry.register_instruction::<variable_ops::AddElement>();
    registry.register_instruction::<variable_ops::AddMember>();
    registry.register_instruction::<variable_ops::Copy>();
    registry.register_instruction::<variable_ops::ResetVariable>();
    registry.register_instruction::<variable_ops::Increment>();
    registry.register_instruction::<variable_ops::Decrement>();
    registry.register_instruction::<variable_ops::VarExists>();

    registry.register_instruction::<comparisons::Equals>();
    registry.register_instruction::<comparisons::GreaterThan>();
    registry.register_instruction::<comparisons::GreaterThanOrEqual>();
    registry.register_instruction::<comparisons::LessThan>();
    registry.register_instruction::<comparisons::LessThanOrEqual>();

    registry.register_instruction::<io::Input>();
    registry.register_instruction::<io::Output>();
    registry.register_instruction::<io::Message>();
    registry.register_instruction::<io::Log>();
    registry.register_instruction::<io::UserConfirmation>();

    registry.register_instruction::<timing::Wait>();
    registry.register_instruction::<timing::WaitForVariable>();
    registry.register_instruction::<timing::WaitForVariables>();

    registry.register_instruction::<achieve::AchieveCondition>();
    registry.register_instruction::<achieve::AchieveConditionWithOverride>();
    registry.register_instruction::<achieve::AchieveConditionWithTimeout>();
    registry.register_instruction::<achieve::ExecuteWhile>();
    registry.register_instruction::<achieve::WaitForCondition>();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_populates_every_instruction() {
        let mut r = Registry::new();
        register(&mut r);
        for name in [
            "Sequence",
            "Fallback",
            "ParallelSequence",
            "Choice",
            "UserChoice",
            "Inverter",
            "ForceSuccess",
            "For",
            "Repeat",
            "Listen",
            "Include",
            "IncludeProcedure",
            "Condition",
            "AddElement",
            "AddMember",
            "Copy",
            "ResetVariable",
            "Increment",
            "Decrement",
            "VarExists",
            "Equals",
            "GreaterThan",
            "GreaterThanOrEqual",
            "LessThan",
            "LessThanOrEqual",
            "Input",
            "Output",
            "Message",
            "Log",
            "UserConfirmation",
            "Wait",
            "WaitForVariable",
            "WaitForVariables",
            "AchieveCondition",
            "AchieveConditionWithOverride",
            "AchieveConditionWithTimeout",
            "ExecuteWhile",
            "WaitForCondition",
        ] {
            assert!(r.instruction(name).is_some(), "missing {name}");
        }
    }
}
