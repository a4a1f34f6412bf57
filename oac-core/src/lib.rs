//! The core execution engine: instruction life-cycle, workspace, attribute
//! system, type registry, and procedure container. Concrete instructions
//! and variable backends live in `oac-stdlib`; the tick loop that drives a
//! `Procedure` to completion lives in `oac-runtime`.

#[macro_use]
extern crate netidx_core;

pub mod attr;
pub mod error;
pub mod instruction;
pub mod procedure;
pub mod registry;
pub mod ui;
pub mod workspace;

pub use error::CoreError;
pub use instruction::{
    Behavior, ExecutionStatus, HaltHandle, InstructionId, Node, ProcedureLoader, SetupCtx,
    TickCtx, TreeRef, UnavailableLoader,
};
pub use procedure::Procedure;
pub use registry::{InstructionType, Registry, VariableType};
pub use ui::{InputFuture, InputPromise, NullUserInterface, OverrideChoice, Severity, UserInterface};
pub use workspace::{LocalVariable, SetupTeardownActions, SubscriptionId, Variable, Workspace};
