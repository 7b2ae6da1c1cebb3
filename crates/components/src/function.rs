//! A component backed by a closure.

use indexmap::IndexMap;
use tracing::debug;

use dataflow::{AttributeName, Component, ComponentName, DataflowError, Result, Scope, Value};

/// Attribute values keyed by name.
pub type Values = IndexMap<AttributeName, Value>;

type Body = Box<dyn FnMut(&Values) -> std::result::Result<Values, String>>;

/// A component whose `run` calls a closure with the current inputs and stores
/// the outputs it returns.
///
/// Inputs start as `null`. The closure may return any subset of the declared
/// outputs; returning an undeclared one fails the run.
pub struct FnComponent {
    name: ComponentName,
    path: String,
    inputs: Values,
    outputs: Values,
    body: Body,
}

impl std::fmt::Debug for FnComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnComponent")
            .field("path", &self.path)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish_non_exhaustive()
    }
}

impl FnComponent {
    /// Creates the component with its declared attributes.
    pub fn new<F>(
        name: ComponentName,
        inputs: impl IntoIterator<Item = AttributeName>,
        outputs: impl IntoIterator<Item = AttributeName>,
        body: F,
    ) -> Self
    where
        F: FnMut(&Values) -> std::result::Result<Values, String> + 'static,
    {
        Self {
            path: name.to_string(),
            name,
            inputs: inputs.into_iter().map(|a| (a, Value::Null)).collect(),
            outputs: outputs.into_iter().map(|a| (a, Value::Null)).collect(),
            body: Box::new(body),
        }
    }

    fn unknown(&self, attribute: &str) -> DataflowError {
        DataflowError::UnknownAttribute {
            path: self.path.clone(),
            attribute: attribute.to_string(),
        }
    }
}

impl Component for FnComponent {
    fn name(&self) -> &ComponentName {
        &self.name
    }

    fn inputs(&self) -> Vec<AttributeName> {
        self.inputs.keys().cloned().collect()
    }

    fn outputs(&self) -> Vec<AttributeName> {
        self.outputs.keys().cloned().collect()
    }

    fn get(&self, attribute: &str) -> Result<Value> {
        self.inputs
            .get(attribute)
            .or_else(|| self.outputs.get(attribute))
            .cloned()
            .ok_or_else(|| self.unknown(attribute))
    }

    fn set(&mut self, attribute: &str, value: Value) -> Result<()> {
        if self.outputs.contains_key(attribute) {
            return Err(DataflowError::InvalidValue {
                path: self.path.clone(),
                attribute: attribute.to_string(),
                message: "outputs are read-only".to_string(),
            });
        }
        match self.inputs.get_mut(attribute) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(self.unknown(attribute)),
        }
    }

    fn run(&mut self, _scope: &mut Scope<'_>) -> Result<()> {
        let produced = (self.body)(&self.inputs).map_err(|message| DataflowError::ComponentFailed {
            path: self.path.clone(),
            message,
        })?;
        for (attribute, value) in produced {
            match self.outputs.get_mut(&attribute) {
                Some(slot) => *slot = value,
                None => {
                    return Err(DataflowError::ComponentFailed {
                        path: self.path.clone(),
                        message: format!("produced undeclared output '{attribute}'"),
                    })
                }
            }
        }
        debug!(component = %self.path, "ran");
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

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn attr(s: &str) -> AttributeName {
        AttributeName::new(s).unwrap()
    }

    fn doubler() -> FnComponent {
        FnComponent::new(
            ComponentName::new("double").unwrap(),
            [attr("x")],
            [attr("y")],
            |inputs| {
                let x = inputs
                    .get("x")
                    .and_then(Value::as_f64)
                    .ok_or_else(|| "x is not a number".to_string())?;
                Ok(Values::from([(attr("y"), json!(2.0 * x))]))
            },
        )
    }

    #[test]
    fn stores_closure_outputs() {
        let mut component = doubler();
        component.set("x", json!(4.0)).unwrap();
        component.run(&mut Scope::detached()).unwrap();
        assert_eq!(component.get("y").unwrap(), json!(8.0));
    }

    #[test]
    fn closure_failure_is_a_component_failure() {
        let mut component = doubler();
        let err = component.run(&mut Scope::detached()).unwrap_err();
        assert!(matches!(err, DataflowError::ComponentFailed { .. }));
        assert!(err.to_string().contains("x is not a number"));
    }

    #[test]
    fn undeclared_output_fails_the_run() {
        let mut component = FnComponent::new(
            ComponentName::new("rogue").unwrap(),
            Vec::new(),
            [attr("y")],
            |_| Ok(Values::from([(attr("z"), json!(1))])),
        );
        let err = component.run(&mut Scope::detached()).unwrap_err();
        assert!(err.to_string().contains("undeclared output 'z'"));
    }

    #[test]
    fn outputs_are_read_only() {
        let mut component = doubler();
        assert!(component.set("y", json!(1)).is_err());
        assert!(component.set("missing", json!(1)).is_err());
        assert_eq!(component.get("x").unwrap(), Value::Null);
    }
}
