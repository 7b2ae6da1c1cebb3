//! iterflow CLI entry point.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Parse arguments** with `clap`.
//! 2. **Wire observability**: install a `tracing-subscriber` formatter on
//!    stderr, human-readable or JSON, filtered by `RUST_LOG` (default `info`).
//! 3. **Load the model**: read the JSON file and build the assembly.
//! 4. **Select the mode**:
//!    - default: run the assembly once;
//!    - `--order`: report the workflow order and every driver's execution
//!      order without running anything;
//!    - `--steps N`: advance the top-level workflow `N` units.
//! 5. **Report**: print a JSON report, including any `--print` variables, on
//!    stdout.

use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use components::{Assembly, ModelSpec};
use dataflow::{Component, ComponentName, Container, Scope, StepOutcome, Value};

/// Run or inspect a dataflow model described in JSON.
#[derive(Parser, Debug)]
#[command(name = "iterflow", version)]
struct Args {
    /// Path to the JSON model file.
    #[arg(value_name = "MODEL")]
    model: PathBuf,

    /// Print execution orders instead of running.
    #[arg(long, conflicts_with = "steps")]
    order: bool,

    /// Advance the top-level workflow by this many units instead of running.
    #[arg(long, value_name = "N")]
    steps: Option<usize>,

    /// Variables (`child.attribute`) to include in the report.
    #[arg(long = "print", value_name = "VAR")]
    print: Vec<String>,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

/// What the run printed on stdout.
#[derive(Debug, Serialize)]
struct Report {
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    workflow: Option<Vec<ComponentName>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    drivers: Option<IndexMap<ComponentName, Vec<ComponentName>>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    steps: Vec<StepOutcome>,
    values: IndexMap<String, Value>,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn execute(model: &mut Assembly, args: &Args) -> anyhow::Result<Report> {
    let mut report = Report {
        model: model.pathname().to_string(),
        workflow: None,
        drivers: None,
        steps: Vec::new(),
        values: IndexMap::new(),
    };

    if args.order {
        report.workflow = Some(model.workflow_order()?);
        report.drivers = Some(model.driver_orders()?);
    } else if let Some(steps) = args.steps {
        for _ in 0..steps {
            let outcome = model.step_workflow().context("stepping workflow")?;
            info!(?outcome, "stepped");
            report.steps.push(outcome);
        }
    } else {
        model
            .run(&mut Scope::detached())
            .with_context(|| format!("running model '{}'", model.pathname()))?;
    }

    for var in &args.print {
        let value = model
            .get(var)
            .with_context(|| format!("reading '{var}'"))?;
        report.values.insert(var.clone(), value);
    }
    Ok(report)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);
    info!(model = %args.model.display(), "iterflow starting");

    let text = fs::read_to_string(&args.model)
        .with_context(|| format!("reading {}", args.model.display()))?;
    let spec = ModelSpec::from_json(&text).context("parsing model")?;
    let mut model = spec
        .build()
        .with_context(|| format!("building model '{}'", spec.name))?;

    let report = execute(&mut model, &args)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn model() -> Assembly {
        let text = json!({
            "name": "chain",
            "components": [
                {"kind": "linear", "name": "a", "constant": 1.0, "coefficients": {"x": 1.0}},
                {"kind": "linear", "name": "b", "constant": 1.0, "coefficients": {"x": 1.0}}
            ],
            "connections": [{"from": "a.y", "to": "b.x"}],
            "values": {"a.x": 1.0}
        })
        .to_string();
        ModelSpec::from_json(&text).unwrap().build().unwrap()
    }

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["iterflow", "model.json"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn default_mode_runs_and_reports_values() {
        let mut model = model();
        let report = execute(&mut model, &args(&["--print", "b.y"])).unwrap();
        assert_eq!(report.values["b.y"], json!(3.0));
        assert!(report.workflow.is_none());
    }

    #[test]
    fn order_mode_does_not_run() {
        let mut model = model();
        let report = execute(&mut model, &args(&["--order", "--print", "b.y"])).unwrap();
        assert_eq!(
            report.workflow.unwrap(),
            vec![
                ComponentName::new("a").unwrap(),
                ComponentName::new("b").unwrap()
            ]
        );
        assert_eq!(report.values["b.y"], json!(0.0));
    }

    #[test]
    fn steps_mode_records_outcomes() {
        let mut model = model();
        let report = execute(&mut model, &args(&["--steps", "3"])).unwrap();
        assert_eq!(
            report.steps,
            vec![
                StepOutcome::Ran(ComponentName::new("a").unwrap()),
                StepOutcome::Ran(ComponentName::new("b").unwrap()),
                StepOutcome::Finished,
            ]
        );
    }

    #[test]
    fn order_and_steps_conflict() {
        assert!(Args::try_parse_from(["iterflow", "m.json", "--order", "--steps", "1"]).is_err());
    }

    #[test]
    fn unknown_print_variable_fails() {
        let mut model = model();
        assert!(execute(&mut model, &args(&["--print", "zz.y"])).is_err());
    }
}
