//! JSON model descriptions.
//!
//! A [`ModelSpec`] describes an assembly: its leaf components, nested
//! assemblies, drivers, connections, top driver and initial values.
//!
//! ```json
//! {
//!   "name": "sellar",
//!   "components": [
//!     { "kind": "linear", "name": "dis1", "output": "y1", "constant": 1.0,
//!       "coefficients": { "y2": 0.5 } },
//!     { "kind": "linear", "name": "dis2", "output": "y2", "constant": 2.0,
//!       "coefficients": { "y1": 0.25 } }
//!   ],
//!   "drivers": [
//!     { "kind": "fixed_point", "name": "solver",
//!       "x_out": ["dis2.y2"], "x_in": ["dis1.y2"], "tolerance": 1e-9 }
//!   ],
//!   "connections": [ { "from": "dis1.y1", "to": "dis2.y1" } ],
//!   "top_driver": "solver"
//! }
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use dataflow::{Component, ComponentName, DataflowError, Result, Value, VarPath};

use crate::assembly::Assembly;
use crate::drivers::{FixedPointIterator, Repeat, SimpleDriver};
use crate::linear::{Linear, LinearSpec};

/// Path reported for errors in a model that could not be parsed at all.
const UNPARSED: &str = "<model>";

/// Description of one assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelSpec {
    /// Assembly name.
    pub name: ComponentName,
    /// Leaf components and nested assemblies, in insertion order.
    #[serde(default)]
    pub components: Vec<ComponentSpec>,
    /// Drivers, added after the components.
    #[serde(default)]
    pub drivers: Vec<DriverSpec>,
    /// Connections between children.
    #[serde(default)]
    pub connections: Vec<ConnectionSpec>,
    /// The driver that runs the assembly as a whole.
    #[serde(default)]
    pub top_driver: Option<ComponentName>,
    /// Initial values, keyed by `child.attribute`.
    #[serde(default)]
    pub values: IndexMap<String, Value>,
}

/// A child component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ComponentSpec {
    /// A [`Linear`] component.
    Linear(LinearSpec),
    /// A nested assembly.
    Assembly(ModelSpec),
}

/// A driver child.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DriverSpec {
    /// A [`SimpleDriver`].
    Simple {
        /// Driver name.
        name: ComponentName,
        /// Variables whose components feed the driver.
        #[serde(default)]
        sources: Vec<VarPath>,
        /// Variables whose components the driver feeds.
        #[serde(default)]
        sinks: Vec<VarPath>,
    },
    /// A [`Repeat`] driver.
    Repeat {
        /// Driver name.
        name: ComponentName,
        /// Variables naming the components to repeat.
        components: Vec<VarPath>,
        /// Passes per execution.
        count: u64,
    },
    /// A [`FixedPointIterator`].
    FixedPoint {
        /// Driver name.
        name: ComponentName,
        /// Produced values.
        x_out: Vec<VarPath>,
        /// Inputs the produced values are fed back into.
        x_in: Vec<VarPath>,
        /// Convergence tolerance.
        #[serde(default)]
        tolerance: Option<f64>,
        /// Iteration budget.
        #[serde(default)]
        max_iteration: Option<u64>,
    },
}

/// A connection between two children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionSpec {
    /// `child.output` the value is read from.
    pub from: String,
    /// `child.input` the value is written to.
    pub to: String,
}

impl ModelSpec {
    /// Parses a model from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|err| DataflowError::configuration(UNPARSED, format!("invalid model: {err}")))
    }

    /// Builds and validates the described assembly.
    pub fn build(&self) -> Result<Assembly> {
        let mut assembly = Assembly::new(self.name.clone());
        for component in &self.components {
            assembly.add(component.build()?)?;
        }
        for driver in &self.drivers {
            assembly.add(driver.build())?;
        }
        for connection in &self.connections {
            assembly.connect(&connection.from, &connection.to)?;
        }
        if let Some(top) = &self.top_driver {
            assembly.set_top_driver(top.as_str())?;
        }
        for (var, value) in &self.values {
            assembly.set(var, value.clone())?;
        }
        // Surface cycles at load time rather than on the first run.
        assembly.workflow_order()?;
        assembly.driver_orders()?;
        debug!(model = %self.name, "model built");
        Ok(assembly)
    }
}

impl ComponentSpec {
    fn build(&self) -> Result<Box<dyn Component>> {
        let built: Box<dyn Component> = match self {
            Self::Linear(spec) => Box::new(Linear::from_spec(spec.clone())),
            Self::Assembly(model) => Box::new(model.build()?),
        };
        Ok(built)
    }
}

impl DriverSpec {
    fn build(&self) -> Box<dyn Component> {
        match self {
            Self::Simple {
                name,
                sources,
                sinks,
            } => Box::new(
                SimpleDriver::new(name.clone())
                    .with_sources(sources.clone())
                    .with_sinks(sinks.clone()),
            ),
            Self::Repeat {
                name,
                components,
                count,
            } => Box::new(Repeat::new(name.clone(), components.clone(), *count)),
            Self::FixedPoint {
                name,
                x_out,
                x_in,
                tolerance,
                max_iteration,
            } => {
                let mut driver = FixedPointIterator::new(name.clone(), x_out.clone(), x_in.clone());
                if let Some(tolerance) = tolerance {
                    driver = driver.with_tolerance(*tolerance);
                }
                if let Some(max_iteration) = max_iteration {
                    driver = driver.with_max_iteration(*max_iteration);
                }
                Box::new(driver)
            }
        }
    }
}
