//! An affine component: `output = constant + Σ coefficient · input`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use dataflow::{AttributeName, Component, ComponentName, DataflowError, Result, Scope, Value};

/// Serializable description of a [`Linear`] component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearSpec {
    /// Component name.
    pub name: ComponentName,
    /// Name of the single output attribute.
    #[serde(default = "default_output")]
    pub output: AttributeName,
    /// Constant term.
    #[serde(default)]
    pub constant: f64,
    /// One input per coefficient, in declaration order.
    #[serde(default)]
    pub coefficients: IndexMap<AttributeName, f64>,
}

fn default_output() -> AttributeName {
    AttributeName::from_static("y")
}

/// A component computing an affine combination of its numeric inputs.
#[derive(Debug, Clone)]
pub struct Linear {
    name: ComponentName,
    path: String,
    output: AttributeName,
    constant: f64,
    coefficients: IndexMap<AttributeName, f64>,
    inputs: IndexMap<AttributeName, f64>,
    result: f64,
}

impl Linear {
    /// Creates a component with no inputs whose output is `0`.
    pub fn new(name: ComponentName, output: AttributeName) -> Self {
        Self {
            path: name.to_string(),
            name,
            output,
            constant: 0.0,
            coefficients: IndexMap::new(),
            inputs: IndexMap::new(),
            result: 0.0,
        }
    }

    /// Sets the constant term.
    pub fn with_constant(mut self, constant: f64) -> Self {
        self.constant = constant;
        self
    }

    /// Declares an input with its coefficient. The input starts at `0`.
    pub fn with_coefficient(mut self, input: AttributeName, coefficient: f64) -> Self {
        self.inputs.insert(input.clone(), 0.0);
        self.coefficients.insert(input, coefficient);
        self
    }

    /// Builds the component a [`LinearSpec`] describes.
    pub fn from_spec(spec: LinearSpec) -> Self {
        spec.coefficients.into_iter().fold(
            Self::new(spec.name, spec.output).with_constant(spec.constant),
            |linear, (input, coefficient)| linear.with_coefficient(input, coefficient),
        )
    }

    fn invalid(&self, attribute: &str, message: impl Into<String>) -> DataflowError {
        DataflowError::InvalidValue {
            path: self.path.clone(),
            attribute: attribute.to_string(),
            message: message.into(),
        }
    }
}

impl Component for Linear {
    fn name(&self) -> &ComponentName {
        &self.name
    }

    fn inputs(&self) -> Vec<AttributeName> {
        self.inputs.keys().cloned().collect()
    }

    fn outputs(&self) -> Vec<AttributeName> {
        vec![self.output.clone()]
    }

    fn get(&self, attribute: &str) -> Result<Value> {
        if attribute == self.output.as_str() {
            return Ok(Value::from(self.result));
        }
        self.inputs
            .get(attribute)
            .map(|&x| Value::from(x))
            .ok_or_else(|| DataflowError::UnknownAttribute {
                path: self.path.clone(),
                attribute: attribute.to_string(),
            })
    }

    fn set(&mut self, attribute: &str, value: Value) -> Result<()> {
        if attribute == self.output.as_str() {
            return Err(self.invalid(attribute, "outputs are read-only"));
        }
        let number = value
            .as_f64()
            .ok_or_else(|| self.invalid(attribute, format!("expected a number, got {value}")))?;
        match self.inputs.get_mut(attribute) {
            Some(slot) => {
                *slot = number;
                Ok(())
            }
            None => Err(DataflowError::UnknownAttribute {
                path: self.path.clone(),
                attribute: attribute.to_string(),
            }),
        }
    }

    fn run(&mut self, _scope: &mut Scope<'_>) -> Result<()> {
        self.result = self.constant
            + self
                .coefficients
                .iter()
                .map(|(input, coefficient)| coefficient * self.inputs.get(input).copied().unwrap_or(0.0))
                .sum::<f64>();
        debug!(component = %self.path, output = self.result, "evaluated");
        Ok(())
    }

    fn set_parent_path(&mut self, parent: &str) {
        self.path = if parent.is_empty() {
            self.name.to_string()
        } else {
            format!("{parent}.{}", self.name)
        };
    }
}
