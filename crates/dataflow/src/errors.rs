//! Error types for component execution, graph construction and driver iteration.
//!
//! [`DataflowError`] is the single error type crossing the component,
//! container and driver seams. Graph-construction and ordering failures are
//! fatal to the current `execute` call; failures raised by a component's own
//! `run` travel through the core untouched.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ComponentName;

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, DataflowError>;

/// Errors raised while assembling, ordering or running components.
///
/// Every variant carries the fully qualified path (`top.sub.driver`) of the
/// component or driver it concerns.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum DataflowError {
    /// The parent is missing or incompatible, the container exposes no
    /// dataflow graph, or a model/reference description is malformed.
    #[error("Configuration error in '{path}': {message}")]
    Configuration {
        /// Path of the component or driver being configured.
        path: String,
        /// Description of the configuration problem.
        message: String,
    },

    /// A reference names a component that the container does not hold.
    #[error("Driver '{path}' references unknown component '{component}'")]
    UnresolvedReference {
        /// Path of the referencing driver.
        path: String,
        /// The component name that failed to resolve.
        component: ComponentName,
    },

    /// The subgraph a driver orders contains at least one cycle.
    ///
    /// Each inner list is one strongly-connected component, members in
    /// insertion order.
    #[error("Subgraph for driver {path} has a cycle ({})", format_cycles(.cycles))]
    CyclicDependency {
        /// Path of the driver whose subgraph could not be ordered.
        path: String,
        /// Strongly-connected components that prevent a linear order.
        cycles: Vec<Vec<ComponentName>>,
    },

    /// The operation needs a container parent and there is none.
    #[error("'{path}' cannot {operation} without a parent container")]
    MissingParent {
        /// Path of the orphaned component or driver.
        path: String,
        /// What was being attempted (e.g. `"run referenced components"`).
        operation: String,
    },

    /// The container has no child of that name, or it is currently running.
    #[error("'{path}' has no available child component '{component}'")]
    UnknownComponent {
        /// Path of the container.
        path: String,
        /// The requested child name.
        component: String,
    },

    /// The component has no attribute of that name.
    #[error("'{path}' has no attribute '{attribute}'")]
    UnknownAttribute {
        /// Path of the component.
        path: String,
        /// The requested attribute.
        attribute: String,
    },

    /// A value had the wrong shape for the attribute it was assigned to or
    /// read from.
    #[error("Invalid value for '{path}.{attribute}': {message}")]
    InvalidValue {
        /// Path of the component.
        path: String,
        /// The attribute involved.
        attribute: String,
        /// What was wrong with the value.
        message: String,
    },

    /// A component's own computation failed.
    #[error("Component '{path}' failed: {message}")]
    ComponentFailed {
        /// Path of the failing component.
        path: String,
        /// Failure description supplied by the component.
        message: String,
    },

    /// A stop request halted a driver loop or a workflow run.
    #[error("Run of '{path}' was stopped")]
    RunStopped {
        /// Path of the driver or container that observed the stop.
        path: String,
    },

    /// An iterating driver used up its iteration budget without meeting its
    /// convergence criterion.
    #[error("Driver '{path}' did not converge after {iterations} iterations (residual {residual})")]
    NotConverged {
        /// Path of the driver.
        path: String,
        /// Iterations performed.
        iterations: u64,
        /// Residual at the final iteration.
        residual: f64,
    },
}

impl DataflowError {
    /// Shorthand for a [`DataflowError::Configuration`].
    pub fn configuration(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a [`DataflowError::MissingParent`].
    pub fn missing_parent(path: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::MissingParent {
            path: path.into(),
            operation: operation.into(),
        }
    }

    /// Returns the component names of every reported cycle, if this is a
    /// [`DataflowError::CyclicDependency`].
    pub fn cycles(&self) -> Option<&[Vec<ComponentName>]> {
        match self {
            Self::CyclicDependency { cycles, .. } => Some(cycles),
            _ => None,
        }
    }
}

fn format_cycles(cycles: &[Vec<ComponentName>]) -> String {
    cycles
        .iter()
        .map(|scc| {
            let names: Vec<&str> = scc.iter().map(ComponentName::as_str).collect();
            format!("[{}]", names.join(", "))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> ComponentName {
        ComponentName::new(s).unwrap()
    }

    #[test]
    fn cycle_message_names_driver_and_members() {
        let err = DataflowError::CyclicDependency {
            path: "top.driver".to_string(),
            cycles: vec![vec![name("b"), name("c")]],
        };
        assert_eq!(
            err.to_string(),
            "Subgraph for driver top.driver has a cycle ([b, c])"
        );
        assert_eq!(err.cycles().unwrap().len(), 1);
    }

    #[test]
    fn missing_parent_message() {
        let err = DataflowError::missing_parent("driver", "run referenced components");
        assert_eq!(
            err.to_string(),
            "'driver' cannot run referenced components without a parent container"
        );
        assert!(err.cycles().is_none());
    }
}
