//! The workspace (§4.2): a named-variable store with update notifications.

use std::sync::Arc as StdArc;

use anyhow::{Context, Result};
use arcstr::ArcStr;
use fxhash::FxHashMap;
use indexmap::IndexMap;
use netidx_value::Value;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::CoreError;

atomic_id!(SubscriptionId);

/// A polymorphic workspace variable (§3). Concrete backends (network, file,
/// CA/PVA, ...) are out of scope for this crate; this trait is the seam a
/// host application implements against.
pub trait Variable: std::fmt::Debug + Send + Sync {
    /// Stable type name, e.g. "Local", "File".
    fn type_name(&self) -> &str;

    /// Validate attributes and acquire whatever backend resources are
    /// needed. Before this returns `Ok`, `get_value`/`set_value` must fail.
    fn setup(&mut self) -> Result<SetupTeardownActions>;

    /// Release backend resources. After this, state returns to its
    /// post-attribute-construction form (§3).
    fn teardown(&mut self);

    /// `true` once the backend is ready to serve `get_value`.
    fn is_available(&self) -> bool;

    fn get_value(&self, field_path: &str) -> Option<Value>;

    /// Returns `true` on success. Implementations decide type-compatibility
    /// via `oac_value::assign_from` or their own backend rules.
    fn set_value(&mut self, field_path: &str, value: Value) -> bool;
}

type Action = Box<dyn FnOnce() + Send>;

/// Run-once setup/teardown actions, keyed by identifier, returned from
/// `Variable::setup` (§3).
pub struct SetupTeardownActions {
    pub id: ArcStr,
    pub post_setup: Option<Action>,
    pub pre_teardown: Option<Action>,
}

impl SetupTeardownActions {
    pub fn none(id: impl Into<ArcStr>) -> Self {
        Self { id: id.into(), post_setup: None, pre_teardown: None }
    }
}

impl std::fmt::Debug for SetupTeardownActions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetupTeardownActions").field("id", &self.id).finish()
    }
}

type Listener = Box<dyn Fn(&str, &Value, bool) + Send + Sync>;
type SubscriberMap = FxHashMap<ArcStr, Vec<(SubscriptionId, Listener)>>;

struct Change {
    name: ArcStr,
    value: Value,
    available: bool,
}

struct Slot {
    var: Mutex<Box<dyn Variable>>,
}

/// The procedure's named-variable store (§4.2). Insertion order is
/// preserved for enumeration; all operations are thread-safe.
pub struct Workspace {
    vars: IndexMap<ArcStr, Slot>,
    setup_order: Vec<ArcStr>,
    pre_teardown: Vec<Action>,
    subscribers: StdArc<Mutex<SubscriberMap>>,
    sub_index: Mutex<FxHashMap<SubscriptionId, ArcStr>>,
    dispatch_tx: mpsc::UnboundedSender<Change>,
    dispatcher: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("variables", &self.vars.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Workspace {
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Change>();
        let subscribers: StdArc<Mutex<SubscriberMap>> =
            StdArc::new(Mutex::new(FxHashMap::default()));
        let dispatcher_subs = StdArc::clone(&subscribers);
        // The background dispatcher task (§5): it never holds a per-variable
        // lock, so a slow subscriber callback here cannot block a `Tick`.
        // Coalescing falls naturally out of an unbounded mpsc channel that
        // always drains to the newest pending message per listener would
        // require de-duplication; this implementation delivers every
        // change in write order, which is a stronger guarantee than the
        // "eventually observes the latest value" the spec requires.
        let dispatcher = tokio::spawn(async move {
            while let Some(change) = rx.recv().await {
                let listeners = dispatcher_subs.lock();
                if let Some(ls) = listeners.get(&change.name) {
                    for (_, listener) in ls {
                        listener(&change.name, &change.value, change.available);
                    }
                }
            }
        });
        Self {
            vars: IndexMap::new(),
            setup_order: Vec::new(),
            pre_teardown: Vec::new(),
            subscribers,
            sub_index: Mutex::new(FxHashMap::default()),
            dispatch_tx: tx,
            dispatcher: Some(dispatcher),
        }
    }

    pub fn add_variable(
        &mut self,
        name: impl Into<ArcStr>,
        var: Box<dyn Variable>,
    ) -> Result<()> {
        let name = name.into();
        if self.vars.contains_key(&name) {
            return Err(CoreError::DuplicateName { name: name.clone() }.into());
        }
        self.vars.insert(name, Slot { var: Mutex::new(var) });
        Ok(())
    }

    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.vars.keys().map(|s| s.as_str())
    }

    pub fn variable_type(&self, name: &str) -> Option<String> {
        self.vars.get(name).map(|s| s.var.lock().type_name().to_string())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Setup every variable in insertion order; on the first failure, tear
    /// down everything already set up and fail (§4.2).
    pub fn setup_all(&mut self) -> Result<()> {
        let mut seen_ids: std::collections::HashSet<ArcStr> = std::collections::HashSet::new();
        let mut post_setup: Vec<Action> = Vec::new();
        for (name, slot) in self.vars.iter() {
            let res = slot
                .var
                .lock()
                .setup()
                .with_context(|| format!("setting up variable {name:?}"));
            match res {
                Ok(actions) => {
                    self.setup_order.push(name.clone());
                    if seen_ids.insert(actions.id.clone()) {
                        if let Some(f) = actions.post_setup {
                            post_setup.push(f);
                        }
                        if let Some(f) = actions.pre_teardown {
                            self.pre_teardown.push(f);
                        }
                    }
                }
                Err(e) => {
                    self.teardown_already_setup();
                    return Err(e);
                }
            }
        }
        for f in post_setup {
            f();
        }
        Ok(())
    }

    fn teardown_already_setup(&mut self) {
        for name in self.setup_order.drain(..).rev() {
            if let Some(slot) = self.vars.get(&name) {
                slot.var.lock().teardown();
            }
        }
    }

    /// Adopt `other`'s already-set-up variables whose names do not already
    /// exist here (§4.5 `IncludeProcedure`/§9: external-ignored-on-
    /// collision). `other` must already have had `setup_all` run on it;
    /// adopted variables are not re-`setup`, only eventually torn down
    /// alongside this workspace's own.
    pub fn merge_external(&mut self, mut other: Workspace) {
        for name in std::mem::take(&mut other.setup_order) {
            let Some((_, slot)) = other.vars.shift_remove_entry(&name) else { continue };
            if self.vars.contains_key(&name) {
                continue;
            }
            self.vars.insert(name.clone(), slot);
            self.setup_order.push(name);
        }
        self.pre_teardown.extend(std::mem::take(&mut other.pre_teardown));
    }

    /// Runs pre-teardown actions in registration order, then tears down
    /// variables in reverse creation order (§4.2).
    pub fn teardown_all(&mut self) {
        for f in self.pre_teardown.drain(..) {
            f();
        }
        self.teardown_already_setup();
    }

    pub fn get_value(&self, name: &str, field_path: &str) -> Option<Value> {
        let slot = self.vars.get(name)?;
        slot.var.lock().get_value(field_path)
    }

    pub fn is_available(&self, name: &str) -> bool {
        self.vars.get(name).map(|s| s.var.lock().is_available()).unwrap_or(false)
    }

    pub fn set_value(&self, name: &str, field_path: &str, value: Value) -> bool {
        let Some(slot) = self.vars.get(name) else { return false };
        let (ok, available) = {
            let mut var = slot.var.lock();
            let ok = var.set_value(field_path, value.clone());
            (ok, var.is_available())
        };
        if ok {
            self.notify(name, value, available);
        }
        ok
    }

    /// Register `listener` to be called whenever `name` changes.
    /// Notifications are coalesced: a slow listener may miss intermediate
    /// values but will eventually observe the latest one (§4.2).
    pub fn subscribe(
        &self,
        name: impl Into<ArcStr>,
        listener: Listener,
    ) -> SubscriptionId {
        let name = name.into();
        let id = SubscriptionId::new();
        self.subscribers.lock().entry(name.clone()).or_default().push((id, listener));
        self.sub_index.lock().insert(id, name);
        id
    }

    pub fn unsubscribe(&self, handle: SubscriptionId) {
        if let Some(name) = self.sub_index.lock().remove(&handle) {
            if let Some(v) = self.subscribers.lock().get_mut(&name) {
                v.retain(|(id, _)| *id != handle);
            }
        }
    }

    /// Publish a change notification for `name` to the background
    /// dispatcher. Never called while `slot.var`'s lock is held.
    fn notify(&self, name: &str, value: Value, available: bool) {
        let _ = self.dispatch_tx.send(Change { name: ArcStr::from(name), value, available });
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Some(h) = self.dispatcher.take() {
            h.abort();
        }
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

/// A minimal in-process variable backend, used by tests and suitable as the
/// `Local` variable type a parser would instantiate from `<Local>` elements.
#[derive(Debug, Default)]
pub struct LocalVariable {
    value: Value,
    available: bool,
}

impl LocalVariable {
    pub fn new(initial: Value) -> Self {
        Self { value: initial, available: false }
    }
}

impl Variable for LocalVariable {
    fn type_name(&self) -> &str {
        "Local"
    }

    fn setup(&mut self) -> Result<SetupTeardownActions> {
        self.available = true;
        Ok(SetupTeardownActions::none(ArcStr::from("Local")))
    }

    fn teardown(&mut self) {
        self.available = false;
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn get_value(&self, field_path: &str) -> Option<Value> {
        if !self.available {
            return None;
        }
        oac_value::get_field(&self.value, field_path)
    }

    fn set_value(&mut self, field_path: &str, value: Value) -> bool {
        if !self.available {
            return false;
        }
        if field_path.is_empty() {
            self.value = value;
            true
        } else {
            // Local variables in this crate are scalar or array; field-path
            // writes to non-root paths are not needed by the instruction
            // library and are rejected rather than guessed at.
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// §8: `GetValue` returns whatever the most recent successful
        /// `SetValue` wrote, for any scalar, and a variable that has been
        /// torn down answers neither.
        #[test]
        fn local_variable_round_trips_any_scalar(
            b in any::<bool>(),
            i in any::<i64>(),
            s in "[a-zA-Z0-9]{0,12}",
        ) {
            let mut var = LocalVariable::new(Value::Null);
            var.setup().unwrap();
            for v in [Value::Bool(b), Value::I64(i), Value::String(ArcStr::from(s.as_str()))] {
                prop_assert!(var.set_value("", v.clone()));
                prop_assert_eq!(var.get_value(""), Some(v));
            }
            var.teardown();
            prop_assert!(!var.is_available());
            prop_assert_eq!(var.get_value(""), None);
        }
    }

    #[tokio::test]
    async fn round_trip_set_get() {
        let mut ws = Workspace::new();
        ws.add_variable("x", Box::new(LocalVariable::new(Value::Null))).unwrap();
        ws.setup_all().unwrap();
        assert!(ws.set_value("x", "", Value::Bool(true)));
        assert_eq!(ws.get_value("x", ""), Some(Value::Bool(true)));
    }

    #[tokio::test]
    async fn duplicate_name_rejected() {
        let mut ws = Workspace::new();
        ws.add_variable("x", Box::new(LocalVariable::new(Value::Null))).unwrap();
        let err = ws.add_variable("x", Box::new(LocalVariable::new(Value::Null)));
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn subscriber_observes_latest_value() {
        let mut ws = Workspace::new();
        ws.add_variable("x", Box::new(LocalVariable::new(Value::Null))).unwrap();
        ws.setup_all().unwrap();
        let seen: StdArc<Mutex<Option<Value>>> = StdArc::new(Mutex::new(None));
        let seen2 = StdArc::clone(&seen);
        ws.subscribe(
            "x",
            Box::new(move |_name, v, _avail| {
                *seen2.lock() = Some(v.clone());
            }),
        );
        ws.set_value("x", "", Value::String(ArcStr::from("a")));
        ws.set_value("x", "", Value::String(ArcStr::from("b")));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(*seen.lock(), Some(Value::String(ArcStr::from("b"))));
    }
}
