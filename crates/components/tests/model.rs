use serde_json::json;

use components::ModelSpec;
use dataflow::{Component, ComponentName, DataflowError, Scope};

fn name(s: &str) -> ComponentName {
    ComponentName::new(s).unwrap()
}

fn sellar() -> serde_json::Value {
    json!({
        "name": "sellar",
        "components": [
            {"kind": "linear", "name": "dis1", "output": "y1", "constant": 1.0,
             "coefficients": {"y2": 0.5}},
            {"kind": "linear", "name": "dis2", "output": "y2", "constant": 2.0,
             "coefficients": {"y1": 0.25}}
        ],
        "drivers": [
            {"kind": "fixed_point", "name": "solver",
             "x_out": ["dis2.y2"], "x_in": ["dis1.y2"], "tolerance": 1e-12}
        ],
        "connections": [{"from": "dis1.y1", "to": "dis2.y1"}],
        "top_driver": "solver"
    })
}

#[test]
fn json_model_converges() {
    let spec = ModelSpec::from_json(&sellar().to_string()).unwrap();
    let mut model = spec.build().unwrap();
    model.run(&mut Scope::detached()).unwrap();

    let y1 = model.get("dis1.y1").unwrap().as_f64().unwrap();
    assert!((y1 - 2.0 / 0.875).abs() < 1.0e-9);
}

#[test]
fn nested_model_runs_inside_its_parent() {
    let text = json!({
        "name": "outer",
        "components": [
            {"kind": "linear", "name": "seed", "output": "y", "constant": 4.0},
            {"kind": "assembly", "name": "inner",
             "components": [
                 {"kind": "linear", "name": "twice", "output": "y",
                  "coefficients": {"x": 2.0}}
             ]},
            {"kind": "linear", "name": "sink", "output": "y", "coefficients": {"x": 1.0}}
        ],
        "connections": [
            {"from": "seed.y", "to": "inner.twice.x"},
            {"from": "inner.twice.y", "to": "sink.x"}
        ]
    })
    .to_string();
    let mut model = ModelSpec::from_json(&text).unwrap().build().unwrap();
    assert_eq!(
        model.workflow_order().unwrap(),
        vec![name("seed"), name("inner"), name("sink")]
    );
    model.run(&mut Scope::detached()).unwrap();
    assert_eq!(model.get("sink.y").unwrap(), json!(8.0));
}

#[test]
fn unknown_top_driver_fails_to_build() {
    let mut model = sellar();
    model["top_driver"] = json!("nobody");
    let err = ModelSpec::from_json(&model.to_string())
        .unwrap()
        .build()
        .unwrap_err();
    assert!(matches!(err, DataflowError::UnknownComponent { .. }));
}

#[test]
fn model_round_trips_through_json() {
    let spec = ModelSpec::from_json(&sellar().to_string()).unwrap();
    let again = ModelSpec::from_json(&serde_json::to_string(&spec).unwrap()).unwrap();
    assert_eq!(spec, again);
}
