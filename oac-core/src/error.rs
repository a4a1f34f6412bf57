//! The error taxonomy of spec §7.
//!
//! Setup-time errors (`AttributeError`, `DuplicateName`, `CyclicInclude`)
//! abort `Setup` and are surfaced to the caller via `anyhow::Result`.
//! Tick-time errors (`TypeMismatch`, `VariableUnavailable`, `OutOfRange`,
//! `CancellationError`, `UserRejection`) never escape `Tick`: they are
//! logged to the `UserInterface` at `error` severity and folded into
//! `ExecutionStatus::Failure` by the instruction that encountered them.

use std::fmt;

use arcstr::ArcStr;

#[derive(Debug, Clone)]
pub enum CoreError {
    /// A mandatory attribute was missing, a literal failed to parse, or a
    /// constraint evaluated false. Carries the offending attribute or
    /// constraint identity.
    AttributeError { instruction_type: ArcStr, detail: ArcStr },
    /// A workspace variable name collided with one already present.
    DuplicateName { name: ArcStr },
    /// Include resolution formed a cycle.
    CyclicInclude { path: ArcStr },
    /// A value assignment or comparison crossed incompatible types.
    TypeMismatch { expected: ArcStr, found: ArcStr },
    /// `GetValue`/`SetValue` was called before `Setup` or after `Teardown`,
    /// or the backend is not currently available.
    VariableUnavailable { name: ArcStr },
    /// A `Choice`/`UserChoice` index fell outside the child count.
    OutOfRange { index: i64, len: usize },
    /// An asynchronous operation was halted before completing.
    CancellationError,
    /// The user answered a confirmation prompt in the negative.
    UserRejection,
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AttributeError { instruction_type, detail } => {
                write!(f, "attribute error in {instruction_type}: {detail}")
            }
            Self::DuplicateName { name } => {
                write!(f, "duplicate variable name {name:?}")
            }
            Self::CyclicInclude { path } => {
                write!(f, "cyclic include through {path:?}")
            }
            Self::TypeMismatch { expected, found } => {
                write!(f, "type mismatch: expected {expected}, found {found}")
            }
            Self::VariableUnavailable { name } => {
                write!(f, "variable {name:?} is not available")
            }
            Self::OutOfRange { index, len } => {
                write!(f, "index {index} out of range for {len} children")
            }
            Self::CancellationError => write!(f, "operation was cancelled"),
            Self::UserRejection => write!(f, "user rejected the request"),
        }
    }
}

impl std::error::Error for CoreError {}
