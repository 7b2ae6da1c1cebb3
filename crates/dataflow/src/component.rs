//! Port traits between the core and its collaborators.
//!
//! The core never owns components. A [`Container`] owns them and hands a
//! [`Scope`] to whichever child it runs; that scope is the only way a child
//! (typically a driver) reaches back into the container's services.

use serde_json::Value;

use crate::driver::Driver;
use crate::errors::{DataflowError, Result};
use crate::graph::DependencyGraph;
use crate::types::{StepOutcome, StopFlag};
use crate::{AttributeName, ComponentName, VarPath};

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// An independently runnable unit of work with named inputs and outputs.
pub trait Component {
    /// Name of the component, unique within its container.
    fn name(&self) -> &ComponentName;

    /// Names of the input attributes, in declaration order.
    fn inputs(&self) -> Vec<AttributeName>;

    /// Names of the output attributes, in declaration order.
    fn outputs(&self) -> Vec<AttributeName>;

    /// Current value of an input or output attribute.
    fn get(&self, attribute: &str) -> Result<Value>;

    /// Assign an attribute.
    fn set(&mut self, attribute: &str, value: Value) -> Result<()>;

    /// Read inputs, do the work, write outputs. Blocks until complete.
    ///
    /// `scope` gives access to the parent container, if there is one.
    fn run(&mut self, scope: &mut Scope<'_>) -> Result<()>;

    /// Told by the container that adopts this component where it lives, so
    /// error messages can carry the fully qualified path.
    fn set_parent_path(&mut self, _parent: &str) {}

    /// The driver view of this component, for components that are drivers.
    fn as_driver(&self) -> Option<&dyn Driver> {
        None
    }
}

// ---------------------------------------------------------------------------
// Container
// ---------------------------------------------------------------------------

/// Services a container of components offers to the components it runs.
pub trait Container {
    /// Fully qualified path of the container. Empty for an anonymous root.
    fn pathname(&self) -> &str;

    /// The container's structural dataflow graph over its children, or `None`
    /// if this container does not track dataflow.
    fn component_graph(&self) -> Option<DependencyGraph>;

    /// Whether a child of that name exists, running or not.
    fn contains_child(&self, name: &str) -> bool;

    /// Look up a child that is not currently running.
    fn lookup_child(&self, name: &str) -> Option<&dyn Component>;

    /// Mutable lookup of a child that is not currently running.
    fn lookup_child_mut(&mut self, name: &str) -> Option<&mut dyn Component>;

    /// Run one child, handing it a scope within this container.
    fn run_child(&mut self, name: &ComponentName) -> Result<()>;

    /// Name of the child that drives this container as a whole, if any.
    fn top_driver(&self) -> Option<&ComponentName>;

    /// Run the container's whole workflow once.
    ///
    /// `driver_stop` is the stop flag of the driver running the workflow, if
    /// any; raising it halts the run before the next member, as does
    /// [`Container::stop_workflow`].
    fn run_workflow(&mut self, driver_stop: Option<&StopFlag>) -> Result<()>;

    /// Advance the container's workflow by one member.
    fn step_workflow(&mut self) -> Result<StepOutcome>;

    /// Ask an in-flight workflow run to halt before its next member.
    fn stop_workflow(&mut self);
}

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// Explicit parent context passed into [`Component::run`].
///
/// A detached scope has no parent; operations that need container services
/// fail with [`DataflowError::MissingParent`] or
/// [`DataflowError::Configuration`] instead of reaching for ambient state.
pub struct Scope<'a> {
    parent: Option<&'a mut dyn Container>,
}

impl<'a> Scope<'a> {
    /// A scope with no parent container.
    pub fn detached() -> Self {
        Self { parent: None }
    }

    /// A scope inside `parent`.
    pub fn within(parent: &'a mut dyn Container) -> Self {
        Self {
            parent: Some(parent),
        }
    }

    /// The parent container, if any.
    pub fn parent(&self) -> Option<&dyn Container> {
        self.parent.as_deref()
    }

    /// Mutable access to the parent container, if any.
    pub fn parent_mut(&mut self) -> Option<&mut (dyn Container + 'a)> {
        self.parent.as_deref_mut()
    }

    /// The parent container, or a [`DataflowError::MissingParent`] naming
    /// `path` and the attempted `operation`.
    pub fn require_parent(
        &mut self,
        path: &str,
        operation: &str,
    ) -> Result<&mut (dyn Container + 'a)> {
        self.parent
            .as_deref_mut()
            .ok_or_else(|| DataflowError::missing_parent(path, operation))
    }

    /// Fully qualified path of a child called `name` in this scope.
    pub fn path_of(&self, name: &ComponentName) -> String {
        match self.parent() {
            Some(parent) if !parent.pathname().is_empty() => {
                format!("{}.{}", parent.pathname(), name)
            }
            _ => name.to_string(),
        }
    }

    /// Read the variable `var` from a sibling in the parent container.
    pub fn get_var(&self, var: &VarPath, requester: &str) -> Result<Value> {
        let parent = self
            .parent()
            .ok_or_else(|| DataflowError::missing_parent(requester, format!("read '{var}'")))?;
        parent
            .lookup_child(var.component().as_str())
            .ok_or_else(|| DataflowError::UnknownComponent {
                path: parent.pathname().to_string(),
                component: var.component().to_string(),
            })?
            .get(var.attribute().as_str())
    }

    /// Assign the variable `var` on a sibling in the parent container.
    pub fn set_var(&mut self, var: &VarPath, value: Value, requester: &str) -> Result<()> {
        let parent = self.require_parent(requester, &format!("write '{var}'"))?;
        let pathname = parent.pathname().to_string();
        parent
            .lookup_child_mut(var.component().as_str())
            .ok_or(DataflowError::UnknownComponent {
                path: pathname,
                component: var.component().to_string(),
            })?
            .set(var.attribute().as_str(), value)
    }
}
