//! End-to-end scenarios (§8): build a tree directly (no parser in scope),
//! set up a procedure, and drive it with a [`Runner`] to completion.

use std::sync::Arc;

use netidx_value::Value;
use oac_core::instruction::TreeRef;
use oac_core::{AttrBag, ExecutionStatus, LocalVariable, NullUserInterface, Procedure, Workspace};
use oac_runtime::Runner;

fn wait(timeout_secs: f64) -> oac_core::Node {
    let mut attrs = AttrBag::new();
    attrs.set("timeout", timeout_secs.to_string());
    oac_core::Node::new("Wait", Box::<oac_stdlib::timing::Wait>::default(), attrs, vec![])
}

fn inverter(child: oac_core::Node) -> oac_core::Node {
    oac_core::Node::new("Inverter", Box::<oac_stdlib::decorators::Inverter>::default(), AttrBag::new(), vec![child])
}

fn sequence(children: Vec<oac_core::Node>) -> oac_core::Node {
    oac_core::Node::new("Sequence", Box::<oac_stdlib::composites::Sequence>::default(), AttrBag::new(), children)
}

fn fallback(children: Vec<oac_core::Node>) -> oac_core::Node {
    oac_core::Node::new("Fallback", Box::<oac_stdlib::composites::Fallback>::default(), AttrBag::new(), children)
}

fn parallel_sequence(success_threshold: i64, failure_threshold: i64, children: Vec<oac_core::Node>) -> oac_core::Node {
    let mut attrs = AttrBag::new();
    attrs.set("successThreshold", success_threshold.to_string());
    attrs.set("failureThreshold", failure_threshold.to_string());
    oac_core::Node::new(
        "ParallelSequence",
        Box::<oac_stdlib::composites::ParallelSequence>::default(),
        attrs,
        children,
    )
}

fn parallel_sequence_default(children: Vec<oac_core::Node>) -> oac_core::Node {
    oac_core::Node::new(
        "ParallelSequence",
        Box::<oac_stdlib::composites::ParallelSequence>::default(),
        AttrBag::new(),
        children,
    )
}

fn choice(var_name: &str, children: Vec<oac_core::Node>) -> oac_core::Node {
    let mut attrs = AttrBag::new();
    attrs.set("varName", var_name);
    oac_core::Node::new("Choice", Box::<oac_stdlib::composites::Choice>::default(), attrs, children)
}

fn listen(var_names: &str, child: oac_core::Node) -> oac_core::Node {
    let mut attrs = AttrBag::new();
    attrs.set("varNames", var_names);
    oac_core::Node::new("Listen", Box::<oac_stdlib::decorators::Listen>::default(), attrs, vec![child])
}

/// As `listen`, with `forceSuccess=true`: the watched child's `Success`
/// (here: "not yet equal") keeps the listener going instead of ending it,
/// so only the child's `Failure` (the inverted-equals flip once the
/// values match) terminates the listener (§4.5).
fn listen_force_success(var_names: &str, child: oac_core::Node) -> oac_core::Node {
    let mut attrs = AttrBag::new();
    attrs.set("varNames", var_names);
    attrs.set("forceSuccess", "true");
    oac_core::Node::new("Listen", Box::<oac_stdlib::decorators::Listen>::default(), attrs, vec![child])
}

fn copy(input_var: &str, output_var: &str) -> oac_core::Node {
    let mut attrs = AttrBag::new();
    attrs.set("inputVar", input_var);
    attrs.set("outputVar", output_var);
    oac_core::Node::new("Copy", Box::<oac_stdlib::variable_ops::Copy>::default(), attrs, vec![])
}

fn equals(lhs: &str, rhs: &str) -> oac_core::Node {
    let mut attrs = AttrBag::new();
    attrs.set("lhs", lhs);
    attrs.set("rhs", rhs);
    oac_core::Node::new("Equals", Box::<oac_stdlib::comparisons::Equals>::default(), attrs, vec![])
}

fn execute_while(var_names: &str, action: oac_core::Node, condition: oac_core::Node) -> oac_core::Node {
    let mut attrs = AttrBag::new();
    attrs.set("varNames", var_names);
    oac_core::Node::new(
        "ExecuteWhile",
        Box::<oac_stdlib::achieve::ExecuteWhile>::default(),
        attrs,
        vec![action, condition],
    )
}

fn wait_for_condition(var_names: &str, timeout_secs: f64, condition: oac_core::Node) -> oac_core::Node {
    let mut attrs = AttrBag::new();
    attrs.set("varNames", var_names);
    attrs.set("timeout", timeout_secs.to_string());
    oac_core::Node::new(
        "WaitForCondition",
        Box::<oac_stdlib::achieve::WaitForCondition>::default(),
        attrs,
        vec![condition],
    )
}

fn procedure_with(root: oac_core::Node, vars: Vec<(&str, Value)>) -> Procedure {
    let mut ws = Workspace::new();
    for (name, value) in vars {
        ws.add_variable(name, Box::new(LocalVariable::new(value))).unwrap();
    }
    let mut procedure = Procedure::new(ws);
    procedure.add_tree("root", root.mark_root()).unwrap();
    procedure
}

/// Sets up `procedure`, drives it to a terminal status, and hands back
/// that status plus a handle to the (now-ticked) root for post-mortem
/// assertions about which children ran.
fn run(mut procedure: Procedure) -> (ExecutionStatus, TreeRef) {
    procedure.setup(&oac_core::procedure::unavailable_loader()).unwrap();
    let root = procedure.root().expect("tree was added and marked root");
    let mut runner = Runner::new(Arc::new(NullUserInterface));
    runner.set_procedure(procedure).unwrap();
    let status = runner.execute_procedure().unwrap().expect("terminates");
    (status, root)
}

#[tokio::test]
async fn sequence_with_inverted_third_child_fails() {
    let procedure = procedure_with(sequence(vec![wait(0.0), wait(0.0), inverter(wait(0.0))]), vec![]);
    let (status, root) = run(procedure);
    assert_eq!(status, ExecutionStatus::Failure);
    let root = root.lock();
    assert_eq!(root.children()[0].status(), ExecutionStatus::Success);
    assert_eq!(root.children()[1].status(), ExecutionStatus::Success);
    assert_eq!(root.children()[2].status(), ExecutionStatus::Failure);
}

#[tokio::test]
async fn fallback_short_circuits_on_first_success() {
    let procedure = procedure_with(fallback(vec![inverter(wait(0.0)), wait(0.0), wait(3.0)]), vec![]);
    let (status, root) = run(procedure);
    assert_eq!(status, ExecutionStatus::Success);
    assert_eq!(root.lock().children()[2].status(), ExecutionStatus::NotStarted);
}

#[tokio::test]
async fn parallel_sequence_terminates_on_threshold() {
    let procedure = procedure_with(parallel_sequence(2, 1, vec![wait(0.01), wait(0.02), wait(3.0)]), vec![]);
    let (status, root) = run(procedure);
    assert_eq!(status, ExecutionStatus::Success);
    assert_ne!(root.lock().children()[2].status(), ExecutionStatus::Success);
}

#[tokio::test]
async fn choice_ticks_only_selected_indices_in_order() {
    let idx = Value::Array(netidx_value::ValArray::from([Value::I64(1), Value::I64(0), Value::I64(2)]));
    let procedure = procedure_with(
        choice("choice", vec![wait(0.0), wait(0.0), wait(0.0), inverter(wait(0.0))]),
        vec![("choice", idx)],
    );
    let (status, root) = run(procedure);
    assert_eq!(status, ExecutionStatus::Success);
    let root = root.lock();
    for i in [0usize, 1, 2] {
        assert_eq!(root.children()[i].status(), ExecutionStatus::Success);
    }
    assert_eq!(root.children()[3].status(), ExecutionStatus::NotStarted);
}

#[tokio::test]
async fn listen_reacts_to_a_copy_driven_change() {
    let outer_check = equals("@monitor", "@update");
    let listen_branch = listen_force_success("monitor", inverter(equals("@monitor", "@update")));
    let copy_branch = sequence(vec![copy("@update", "monitor")]);
    let delay_branch = inverter(wait(2.0));
    let tree = fallback(vec![
        parallel_sequence_default(vec![listen_branch, copy_branch, delay_branch]),
        outer_check,
    ]);
    let procedure = procedure_with(tree, vec![("monitor", Value::I64(0)), ("update", Value::I64(1729))]);
    let (status, _root) = run(procedure);
    assert_eq!(status, ExecutionStatus::Success);
}

#[tokio::test]
async fn execute_while_condition_holds_for_the_duration() {
    let tree = execute_while("live", wait(0.05), equals("@live", "@zero"));
    let procedure = procedure_with(tree, vec![("live", Value::I64(0)), ("zero", Value::I64(0))]);
    let (status, _root) = run(procedure);
    assert_eq!(status, ExecutionStatus::Success);
}

#[tokio::test]
async fn wait_for_condition_times_out() {
    let tree = wait_for_condition("live", 0.05, equals("@live", "@one"));
    let procedure = procedure_with(tree, vec![("live", Value::I64(0)), ("one", Value::I64(1))]);
    let (status, _root) = run(procedure);
    assert_eq!(status, ExecutionStatus::Failure);
}
