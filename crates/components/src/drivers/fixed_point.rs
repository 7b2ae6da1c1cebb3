use tracing::{debug, info};

use dataflow::{
    impl_driver_component, Attribute, AttributeName, ComponentName, DataflowError, Direction,
    Driver, DriverCore, IoKind, Result, Scope, Value, VarPath,
};

use super::with_targets;

const X_OUT: &str = "x_out";
const X_IN: &str = "x_in";
const TOLERANCE: &str = "tolerance";
const MAX_ITERATION: &str = "max_iteration";
const RESIDUAL: &str = "residual";

/// Default convergence tolerance.
pub const DEFAULT_TOLERANCE: f64 = 1.0e-6;

/// Default iteration budget.
pub const DEFAULT_MAX_ITERATION: u64 = 25;

/// Solves a coupled loop by successive substitution.
///
/// After each pass over its components, the values at the `x_out` targets are
/// copied into the matching `x_in` targets. Iteration stops once the largest
/// change is within `tolerance`, and fails with
/// [`DataflowError::NotConverged`] once `max_iteration` passes have run
/// without getting there. The last residual is published as `residual`.
#[derive(Debug)]
pub struct FixedPointIterator {
    core: DriverCore,
}

impl FixedPointIterator {
    /// Creates the driver. `x_out[i]` feeds back into `x_in[i]`.
    pub fn new(name: ComponentName, x_out: Vec<VarPath>, x_in: Vec<VarPath>) -> Self {
        let core = with_targets(DriverCore::new(name), X_OUT, Direction::Source, x_out);
        let mut core = with_targets(core, X_IN, Direction::Sink, x_in);
        core.declare(
            AttributeName::from_static(TOLERANCE),
            IoKind::Input,
            Attribute::Plain(Value::from(DEFAULT_TOLERANCE)),
        );
        core.declare(
            AttributeName::from_static(MAX_ITERATION),
            IoKind::Input,
            Attribute::Plain(Value::from(DEFAULT_MAX_ITERATION)),
        );
        core.declare(
            AttributeName::from_static(RESIDUAL),
            IoKind::Output,
            Attribute::Plain(Value::Null),
        );
        Self { core }
    }

    /// Overrides the convergence tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.core.declare(
            AttributeName::from_static(TOLERANCE),
            IoKind::Input,
            Attribute::Plain(Value::from(tolerance)),
        );
        self
    }

    /// Overrides the iteration budget.
    pub fn with_max_iteration(mut self, max_iteration: u64) -> Self {
        self.core.declare(
            AttributeName::from_static(MAX_ITERATION),
            IoKind::Input,
            Attribute::Plain(Value::from(max_iteration)),
        );
        self
    }

    /// Residual of the most recent pass, if any pass has run.
    pub fn residual(&self) -> Option<f64> {
        self.core.plain(RESIDUAL).and_then(Value::as_f64)
    }

    fn feedback_pairs(&self, path: &str) -> Result<Vec<(VarPath, VarPath)>> {
        let targets = |name: &str| {
            self.core
                .reference(name)
                .map(|reference| reference.targets().to_vec())
                .unwrap_or_default()
        };
        let (outs, ins) = (targets(X_OUT), targets(X_IN));
        if outs.is_empty() || outs.len() != ins.len() {
            return Err(DataflowError::configuration(
                path,
                format!(
                    "'{X_OUT}' and '{X_IN}' must name the same non-zero number of variables (got {} and {})",
                    outs.len(),
                    ins.len()
                ),
            ));
        }
        Ok(outs.into_iter().zip(ins).collect())
    }

    fn number(&self, name: &str, path: &str) -> Result<f64> {
        self.core
            .plain(name)
            .and_then(Value::as_f64)
            .ok_or_else(|| DataflowError::InvalidValue {
                path: path.to_string(),
                attribute: name.to_string(),
                message: "expected a number".to_string(),
            })
    }

    fn budget(&self, path: &str) -> Result<u64> {
        self.core
            .plain(MAX_ITERATION)
            .and_then(Value::as_u64)
            .ok_or_else(|| DataflowError::InvalidValue {
                path: path.to_string(),
                attribute: MAX_ITERATION.to_string(),
                message: "expected a non-negative integer".to_string(),
            })
    }
}

fn numeric(value: Value, var: &VarPath, path: &str) -> Result<f64> {
    value.as_f64().ok_or_else(|| DataflowError::InvalidValue {
        path: path.to_string(),
        attribute: var.to_string(),
        message: format!("expected a number, got {value}"),
    })
}

impl Driver for FixedPointIterator {
    fn core(&self) -> &DriverCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DriverCore {
        &mut self.core
    }

    fn start_iteration(&mut self, scope: &mut Scope<'_>) -> Result<()> {
        let path = scope.path_of(self.core.name());
        self.feedback_pairs(&path)?;
        self.number(TOLERANCE, &path)?;
        self.budget(&path)?;
        self.core.set(RESIDUAL, Value::Null)?;
        self.core.set_continue(true);
        Ok(())
    }

    fn post_iteration(&mut self, scope: &mut Scope<'_>) -> Result<()> {
        let path = scope.path_of(self.core.name());
        let tolerance = self.number(TOLERANCE, &path)?;
        let max_iteration = self.budget(&path)?;

        let mut residual = 0.0_f64;
        for (out, feed) in self.feedback_pairs(&path)? {
            let produced = numeric(scope.get_var(&out, &path)?, &out, &path)?;
            let current = numeric(scope.get_var(&feed, &path)?, &feed, &path)?;
            residual = residual.max((produced - current).abs());
            scope.set_var(&feed, Value::from(produced), &path)?;
        }
        self.core.set(RESIDUAL, Value::from(residual))?;

        let iterations = self.core.iterations();
        debug!(driver = %path, iteration = iterations, residual, "fixed-point pass");
        if residual <= tolerance {
            info!(driver = %path, iterations, residual, "converged");
            self.core.set_continue(false);
            return Ok(());
        }
        if iterations >= max_iteration {
            return Err(DataflowError::NotConverged {
                path,
                iterations,
                residual,
            });
        }
        self.core.set_continue(true);
        Ok(())
    }
}

impl_driver_component!(FixedPointIterator);

#[cfg(test)]
mod tests {
    use serde_json::json;

    use dataflow::Component;

    use super::*;
    use crate::{Assembly, Linear};

    fn name(s: &str) -> ComponentName {
        ComponentName::new(s).unwrap()
    }

    fn attr(s: &str) -> AttributeName {
        AttributeName::new(s).unwrap()
    }

    fn var(s: &str) -> VarPath {
        s.parse().unwrap()
    }

    /// `a.y = 1 + 0.5 * a.x`, fed back into `a.x`.
    fn contraction() -> Assembly {
        let mut top = Assembly::new(name("top"));
        top.add(Box::new(
            Linear::new(name("a"), attr("y"))
                .with_constant(1.0)
                .with_coefficient(attr("x"), 0.5),
        ))
        .unwrap();
        top.add(Box::new(FixedPointIterator::new(
            name("solver"),
            vec![var("a.y")],
            vec![var("a.x")],
        )))
        .unwrap();
        top.set_top_driver("solver").unwrap();
        top
    }

    #[test]
    fn fractional_budget_is_rejected() {
        let mut top = contraction();
        top.set("solver.max_iteration", json!(2.5)).unwrap();
        match top.run(&mut Scope::detached()).unwrap_err() {
            DataflowError::InvalidValue { attribute, .. } => {
                assert_eq!(attribute, MAX_ITERATION);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn integer_budget_bounds_the_loop() {
        let mut top = contraction();
        top.set("solver.max_iteration", json!(2)).unwrap();
        match top.run(&mut Scope::detached()).unwrap_err() {
            DataflowError::NotConverged { iterations, .. } => assert_eq!(iterations, 2),
            other => panic!("unexpected error: {other}"),
        }
    }
}
