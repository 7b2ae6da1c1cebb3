use std::cell::Cell;
use std::rc::Rc;

use serde_json::json;

use components::{Assembly, FixedPointIterator, FnComponent, Linear, Repeat, SimpleDriver, Values};
use dataflow::{
    AttributeName, Component, ComponentName, Container, DataflowError, Driver, DriverState, Scope,
    StepOutcome, StopFlag, VarPath,
};

fn name(s: &str) -> ComponentName {
    ComponentName::new(s).unwrap()
}

fn attr(s: &str) -> AttributeName {
    AttributeName::new(s).unwrap()
}

fn var(s: &str) -> VarPath {
    s.parse().unwrap()
}

fn linear(component: &str, output: &str, constant: f64, terms: &[(&str, f64)]) -> Box<Linear> {
    Box::new(
        terms.iter().fold(
            Linear::new(name(component), attr(output)).with_constant(constant),
            |l, (input, c)| l.with_coefficient(attr(input), *c),
        ),
    )
}

/// Counts its runs and optionally raises a stop flag when run.
fn counter(component: &str, runs: Rc<Cell<u32>>, raises: Option<StopFlag>) -> Box<FnComponent> {
    Box::new(FnComponent::new(
        name(component),
        Vec::new(),
        [attr("runs")],
        move |_| {
            runs.set(runs.get() + 1);
            if let Some(flag) = &raises {
                flag.raise();
            }
            Ok(Values::from([(attr("runs"), json!(runs.get()))]))
        },
    ))
}

fn run(assembly: &mut Assembly) -> dataflow::Result<()> {
    Component::run(assembly, &mut Scope::detached())
}

/// dis1: y1 = 1 + 0.5·y2, dis2: y2 = 2 + 0.25·y1, coupled through `solver`.
fn coupled(tolerance: f64) -> Assembly {
    let mut top = Assembly::new(name("top"));
    top.add(linear("dis1", "y1", 1.0, &[("y2", 0.5)])).unwrap();
    top.add(linear("dis2", "y2", 2.0, &[("y1", 0.25)])).unwrap();
    top.add(linear("report", "total", 0.0, &[("y2", 1.0)])).unwrap();
    top.add(Box::new(
        FixedPointIterator::new(name("solver"), vec![var("dis2.y2")], vec![var("dis1.y2")])
            .with_tolerance(tolerance),
    ))
    .unwrap();
    top.add(Box::new(SimpleDriver::new(name("driver")))).unwrap();
    top.connect("dis1.y1", "dis2.y1").unwrap();
    top.connect("dis2.y2", "report.y2").unwrap();
    top.set_top_driver("driver").unwrap();
    top
}

#[test]
fn top_driver_runs_the_workflow_with_sub_driver_in_place() {
    let mut top = coupled(1.0e-10);
    assert_eq!(top.workflow_order().unwrap(), vec![name("solver"), name("report")]);

    run(&mut top).unwrap();

    let y1 = top.get("dis1.y1").unwrap().as_f64().unwrap();
    let y2 = top.get("dis2.y2").unwrap().as_f64().unwrap();
    assert!((y1 - 2.0 / 0.875).abs() < 1.0e-8, "y1 = {y1}");
    assert!((y2 - (2.0 + 0.25 * 2.0 / 0.875)).abs() < 1.0e-8, "y2 = {y2}");
    assert_eq!(top.get("report.total").unwrap().as_f64().unwrap(), y2);

    let solver = top.lookup_child("solver").unwrap();
    assert_eq!(solver.as_driver().unwrap().core().state(), DriverState::Idle);
    assert!(solver.get("residual").unwrap().as_f64().unwrap() <= 1.0e-10);
}

#[test]
fn sub_driver_order_follows_the_connections() {
    let top = coupled(1.0e-6);
    let orders = top.driver_orders().unwrap();
    assert_eq!(orders[&name("solver")], vec![name("dis1"), name("dis2")]);
    assert!(orders[&name("driver")].is_empty());
}

#[test]
fn divergent_loop_reports_not_converged() {
    let mut top = Assembly::new(name("top"));
    top.add(linear("a", "y", 1.0, &[("x", 2.0)])).unwrap();
    top.add(linear("b", "y", 1.0, &[("x", 2.0)])).unwrap();
    top.add(Box::new(
        FixedPointIterator::new(name("solver"), vec![var("b.y")], vec![var("a.x")])
            .with_max_iteration(5),
    ))
    .unwrap();
    top.connect("a.y", "b.x").unwrap();
    top.set_top_driver("solver").unwrap();

    match run(&mut top).unwrap_err() {
        DataflowError::NotConverged {
            path, iterations, ..
        } => {
            assert_eq!(path, "top.solver");
            assert_eq!(iterations, 5);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn mismatched_feedback_is_a_configuration_error() {
    let mut top = Assembly::new(name("top"));
    top.add(linear("a", "y", 0.0, &[("x", 1.0)])).unwrap();
    top.add(Box::new(FixedPointIterator::new(
        name("solver"),
        vec![var("a.y")],
        Vec::new(),
    )))
    .unwrap();
    top.set_top_driver("solver").unwrap();
    let err = run(&mut top).unwrap_err();
    assert!(matches!(err, DataflowError::Configuration { .. }));
}

#[test]
fn repeat_runs_its_components_count_times() {
    let runs = Rc::new(Cell::new(0));
    let mut top = Assembly::new(name("top"));
    top.add(counter("tick", runs.clone(), None)).unwrap();
    top.add(Box::new(Repeat::new(name("rep"), vec![var("tick.runs")], 3)))
        .unwrap();

    run(&mut top).unwrap();
    assert_eq!(runs.get(), 3);
    assert_eq!(top.get("tick.runs").unwrap(), json!(3));

    top.set("rep.count", json!(0)).unwrap();
    run(&mut top).unwrap();
    assert_eq!(runs.get(), 3);

    top.set("rep.count", json!("many")).unwrap();
    let err = run(&mut top).unwrap_err();
    assert!(matches!(err, DataflowError::InvalidValue { .. }));
}

#[test]
fn stopping_the_workflow_skips_remaining_members() {
    let runs = Rc::new(Cell::new(0));
    let mut top = Assembly::new(name("top"));
    let handle = top.workflow_stop_handle();
    top.add(counter("first", runs.clone(), Some(handle))).unwrap();
    top.add(counter("second", runs.clone(), None)).unwrap();

    let err = run(&mut top).unwrap_err();
    assert!(matches!(err, DataflowError::RunStopped { .. }));
    assert_eq!(runs.get(), 1);
    assert_eq!(top.get("second.runs").unwrap(), serde_json::Value::Null);
}

#[test]
fn stopping_a_driver_ends_its_loop_after_the_current_pass() {
    let runs = Rc::new(Cell::new(0));
    let mut top = Assembly::new(name("top"));
    let repeat = Repeat::new(name("rep"), Vec::new(), 10);
    let handle = repeat.core().stop_handle();
    top.add(Box::new(repeat)).unwrap();
    top.add(counter("tick", runs.clone(), Some(handle))).unwrap();
    top.set_top_driver("rep").unwrap();

    let err = run(&mut top).unwrap_err();
    assert!(matches!(err, DataflowError::RunStopped { .. }));
    assert_eq!(runs.get(), 1);
    let rep = top.lookup_child("rep").unwrap().as_driver().unwrap();
    assert_eq!(rep.core().iterations(), 1);
    assert_eq!(rep.core().state(), DriverState::Idle);
}

#[test]
fn top_driver_stop_handle_halts_the_running_workflow() {
    let runs = Rc::new(Cell::new(0));
    let mut top = Assembly::new(name("top"));
    let driver = SimpleDriver::new(name("d"));
    let handle = driver.core().stop_handle();
    top.add(Box::new(driver)).unwrap();
    top.add(counter("first", runs.clone(), Some(handle))).unwrap();
    top.add(counter("second", runs.clone(), None)).unwrap();
    top.set_top_driver("d").unwrap();

    let err = run(&mut top).unwrap_err();
    assert!(matches!(err, DataflowError::RunStopped { .. }));
    assert_eq!(runs.get(), 1);
    assert_eq!(top.get("second.runs").unwrap(), serde_json::Value::Null);
}

#[test]
fn driver_step_and_stop_reach_the_parent_workflow() {
    let runs = Rc::new(Cell::new(0));
    let mut top = Assembly::new(name("top"));
    top.add(counter("a", runs.clone(), None)).unwrap();
    top.add(counter("b", runs.clone(), None)).unwrap();

    let mut driver = SimpleDriver::new(name("outside"));
    assert_eq!(
        driver.step(&mut Scope::within(&mut top)).unwrap(),
        StepOutcome::Ran(name("a"))
    );
    assert_eq!(runs.get(), 1);

    driver.stop(&mut Scope::within(&mut top));
    assert!(top.workflow_stop_handle().is_raised());
    assert!(!driver.continue_iteration());

    let err = driver.step(&mut Scope::detached()).unwrap_err();
    assert!(matches!(err, DataflowError::MissingParent { .. }));
}

#[test]
fn nested_driver_errors_carry_the_full_path() {
    let mut inner = Assembly::new(name("inner"));
    inner
        .add(Box::new(
            SimpleDriver::new(name("d")).with_sources(vec![var("ghost.y")]),
        ))
        .unwrap();
    let mut outer = Assembly::new(name("outer"));
    outer.add(Box::new(inner)).unwrap();

    match run(&mut outer).unwrap_err() {
        DataflowError::UnresolvedReference { path, component } => {
            assert_eq!(path, "outer.inner.d");
            assert_eq!(component, name("ghost"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn retargeting_a_driver_reference_replans() {
    let mut top = Assembly::new(name("top"));
    top.add(linear("a", "y", 1.0, &[("x", 1.0)])).unwrap();
    top.add(linear("b", "y", 1.0, &[("x", 1.0)])).unwrap();
    top.add(Box::new(
        SimpleDriver::new(name("d")).with_sources(vec![var("a.y")]),
    ))
    .unwrap();
    assert_eq!(top.workflow_order().unwrap(), vec![name("b"), name("d")]);

    top.set("d.sources", json!(["a.y", "b.y"])).unwrap();
    assert_eq!(top.workflow_order().unwrap(), vec![name("d")]);
}
