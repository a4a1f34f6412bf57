//! The user-interface contract (§4.6).
//!
//! `UserInterface` is the abstract observer/prompter the engine talks to.
//! Its status/variable/message/log methods are thread-safe — they may be
//! called from the tick thread *and* from the workspace's background
//! notification dispatcher. Its prompt methods are tick-thread only and
//! return an [`InputFuture`] instead of blocking, so that no `TickImpl`
//! ever blocks inside a single tick (§5).

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arcstr::ArcStr;
use tokio::sync::oneshot;

use crate::instruction::{ExecutionStatus, InstructionId};

/// Severity levels accepted by the `Log` instruction and by the engine's
/// own diagnostic messages, exactly the eight values named in §4.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Emergency,
    Alert,
    Critical,
    Error,
    Warning,
    Notice,
    Info,
    Debug,
    Trace,
}

impl Severity {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "emergency" => Self::Emergency,
            "alert" => Self::Alert,
            "critical" => Self::Critical,
            "error" => Self::Error,
            "warning" => Self::Warning,
            "notice" => Self::Notice,
            "info" => Self::Info,
            "debug" => Self::Debug,
            "trace" => Self::Trace,
            _ => return None,
        })
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Emergency => "emergency",
            Self::Alert => "alert",
            Self::Critical => "critical",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Notice => "notice",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        };
        f.write_str(s)
    }
}

/// An asynchronous handle to a pending user-interface response. Polled at
/// each tick; never awaited inside a `TickImpl`.
pub struct InputFuture<T> {
    rx: oneshot::Receiver<T>,
    cancelled: Arc<AtomicBool>,
    slot: Option<T>,
}

/// The producer side of an [`InputFuture`], handed to whatever code (a
/// `UserInterface` implementation) will eventually answer the prompt.
pub struct InputPromise<T> {
    tx: Option<oneshot::Sender<T>>,
    cancelled: Arc<AtomicBool>,
}

impl<T: Send + 'static> InputPromise<T> {
    pub fn fulfill(mut self, value: T) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(value);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Create a linked (future, promise) pair for one pending prompt.
pub fn input_pair<T: Send + 'static>() -> (InputFuture<T>, InputPromise<T>) {
    let (tx, rx) = oneshot::channel();
    let cancelled = Arc::new(AtomicBool::new(false));
    (
        InputFuture { rx, cancelled: Arc::clone(&cancelled), slot: None },
        InputPromise { tx: Some(tx), cancelled },
    )
}

impl<T: Send + 'static> InputFuture<T> {
    /// Non-blocking readiness check, safe to call every tick.
    pub fn is_ready(&mut self) -> bool {
        if self.slot.is_some() {
            return true;
        }
        match self.rx.try_recv() {
            Ok(v) => {
                self.slot = Some(v);
                true
            }
            Err(_) => false,
        }
    }

    /// Take the ready value. Panics if `is_ready` was not `true`.
    pub fn get(&mut self) -> T {
        self.slot.take().expect("InputFuture::get called before is_ready")
    }

    /// Request prompt cancellation; any pending `get` will never become
    /// ready. Cooperative: implementers of the promise side must check
    /// `InputPromise::is_cancelled` before fulfilling.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Thread-safe and tick-thread-only methods a host application implements
/// to observe and drive a procedure. A default no-op base is provided via
/// [`NullUserInterface`] so implementers only override what they need.
pub trait UserInterface: Send + Sync {
    /// Thread-safe: called from the tick thread whenever an instruction's
    /// status changes (§4.4 step 5/2).
    fn update_instruction_status(
        &self,
        node: InstructionId,
        name: Option<&str>,
        status: ExecutionStatus,
    );

    /// Thread-safe: called from the workspace dispatcher whenever a
    /// variable the UI might care about changes.
    fn variable_updated(&self, name: &str, value: &netidx_value::Value, available: bool);

    /// Thread-safe one-way message to the user.
    fn message(&self, text: &str);

    /// Thread-safe structured log line.
    fn log(&self, severity: Severity, text: &str);

    /// Tick-thread only: request a free-text or numeric value from the
    /// user. Returns an `ArcStr` (e.g. a JSON-like literal) for the
    /// caller to parse with the declared output type.
    fn request_input(&self, description: Option<&str>) -> InputFuture<ArcStr>;

    /// Tick-thread only: request a choice of child index from the user.
    fn request_choice(&self, description: &str, count: usize) -> InputFuture<usize>;

    /// Tick-thread only: request yes/no/cancel confirmation.
    fn request_confirmation(
        &self,
        description: &str,
        ok_text: Option<&str>,
        cancel_text: Option<&str>,
    ) -> InputFuture<bool>;

    /// Tick-thread only: request retry/override/abort disposition for
    /// `AchieveConditionWithOverride`.
    fn request_override(&self, description: &str) -> InputFuture<OverrideChoice>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideChoice {
    Retry,
    Override,
    Abort,
}

/// A `UserInterface` that drops every notification and never has input
/// ready. Useful as a base to override selectively, and for tests.
#[derive(Debug, Default)]
pub struct NullUserInterface;

impl UserInterface for NullUserInterface {
    fn update_instruction_status(
        &self,
        _node: InstructionId,
        _name: Option<&str>,
        _status: ExecutionStatus,
    ) {
    }

    fn variable_updated(&self, _name: &str, _value: &netidx_value::Value, _available: bool) {}

    fn message(&self, _text: &str) {}

    fn log(&self, severity: Severity, text: &str) {
        match severity {
            Severity::Emergency | Severity::Alert | Severity::Critical | Severity::Error => {
                log::error!("{text}")
            }
            Severity::Warning => log::warn!("{text}"),
            Severity::Notice | Severity::Info => log::info!("{text}"),
            Severity::Debug => log::debug!("{text}"),
            Severity::Trace => log::trace!("{text}"),
        }
    }

    fn request_input(&self, _description: Option<&str>) -> InputFuture<ArcStr> {
        let (fut, promise) = input_pair();
        drop(promise);
        fut
    }

    fn request_choice(&self, _description: &str, _count: usize) -> InputFuture<usize> {
        let (fut, promise) = input_pair();
        drop(promise);
        fut
    }

    fn request_confirmation(
        &self,
        _description: &str,
        _ok_text: Option<&str>,
        _cancel_text: Option<&str>,
    ) -> InputFuture<bool> {
        let (fut, promise) = input_pair();
        drop(promise);
        fut
    }

    fn request_override(&self, _description: &str) -> InputFuture<OverrideChoice> {
        let (fut, promise) = input_pair();
        drop(promise);
        fut
    }
}
