//! The assembly container.
//!
//! An [`Assembly`] owns named children, records connections between their
//! attributes and exposes the resulting component graph to drivers. It is
//! itself a [`Component`], so assemblies nest.
//!
//! A child is taken out of its slot for as long as it runs. While out, it is
//! still known to the container (`contains_child`) but cannot be looked up or
//! run again; a re-entrant run is a configuration error.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use dataflow::{
    AttributeName, Component, ComponentName, Container, DataflowError, DependencyGraph, Result,
    Scope, StepOutcome, StopFlag, Value, VarPath,
};

use crate::workflow::Dataflow;

/// A directed link from one child's output to another child's input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// Where the value is read.
    pub from: VarPath,
    /// Where the value is written before the target runs.
    pub to: VarPath,
}

/// A named container of components.
pub struct Assembly {
    name: ComponentName,
    pathname: String,
    children: IndexMap<ComponentName, Option<Box<dyn Component>>>,
    connections: Vec<Connection>,
    top_driver: Option<ComponentName>,
    workflow: Dataflow,
}

impl std::fmt::Debug for Assembly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assembly")
            .field("pathname", &self.pathname)
            .field("children", &self.children.keys().collect::<Vec<_>>())
            .field("connections", &self.connections)
            .field("top_driver", &self.top_driver)
            .finish()
    }
}

impl Assembly {
    /// Creates an empty root assembly.
    pub fn new(name: ComponentName) -> Self {
        Self {
            pathname: name.to_string(),
            name,
            children: IndexMap::new(),
            connections: Vec::new(),
            top_driver: None,
            workflow: Dataflow::new(),
        }
    }

    /// Adds a child. Names must be unique within the assembly.
    pub fn add(&mut self, mut child: Box<dyn Component>) -> Result<()> {
        let name = child.name().clone();
        if self.children.contains_key(&name) {
            return Err(DataflowError::configuration(
                &self.pathname,
                format!("a child named '{name}' already exists"),
            ));
        }
        child.set_parent_path(&self.pathname);
        debug!(assembly = %self.pathname, child = %name, "added child");
        self.children.insert(name, Some(child));
        self.workflow.invalidate();
        Ok(())
    }

    /// Removes a child together with every connection touching it.
    pub fn remove(&mut self, name: &str) -> Result<Box<dyn Component>> {
        self.child(name)?;
        let child = self
            .children
            .shift_remove(name)
            .flatten()
            .ok_or_else(|| unknown(&self.pathname, name))?;
        self.connections
            .retain(|c| c.from.component().as_str() != name && c.to.component().as_str() != name);
        if self.top_driver.as_ref().is_some_and(|top| top.as_str() == name) {
            self.top_driver = None;
        }
        self.workflow.invalidate();
        Ok(child)
    }

    /// Child names in insertion order.
    pub fn children(&self) -> impl Iterator<Item = &ComponentName> {
        self.children.keys()
    }

    /// Recorded connections in the order they were made.
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Connects `from` (`"child.output"`) to `to` (`"child.input"`).
    ///
    /// Both children must exist, `from` must name an output and `to` an
    /// input, and an input accepts a single connection.
    pub fn connect(&mut self, from: &str, to: &str) -> Result<()> {
        let from = self.parse_var(from)?;
        let to = self.parse_var(to)?;
        if from.component() == to.component() {
            return Err(DataflowError::configuration(
                &self.pathname,
                format!("cannot connect '{from}' to '{to}' on the same component"),
            ));
        }
        self.require_attribute(&from, true)?;
        self.require_attribute(&to, false)?;
        if let Some(existing) = self.connections.iter().find(|c| c.to == to) {
            return Err(DataflowError::configuration(
                &self.pathname,
                format!("'{to}' is already connected to '{}'", existing.from),
            ));
        }
        debug!(assembly = %self.pathname, from = %from, to = %to, "connected");
        self.connections.push(Connection { from, to });
        self.workflow.invalidate();
        Ok(())
    }

    /// Removes the connection into `to`. Returns whether one existed.
    pub fn disconnect(&mut self, to: &str) -> bool {
        let before = self.connections.len();
        self.connections.retain(|c| c.to.to_string() != to);
        let removed = self.connections.len() != before;
        if removed {
            self.workflow.invalidate();
        }
        removed
    }

    /// Names the child that drives the assembly as a whole. It must be a
    /// driver.
    pub fn set_top_driver(&mut self, name: &str) -> Result<()> {
        let child = self.child(name)?;
        if child.as_driver().is_none() {
            return Err(DataflowError::configuration(
                &self.pathname,
                format!("'{name}' is not a driver"),
            ));
        }
        self.top_driver = Some(child.name().clone());
        self.workflow.invalidate();
        Ok(())
    }

    /// Members of the assembly's workflow, in run order.
    pub fn workflow_order(&mut self) -> Result<Vec<ComponentName>> {
        if let Some(order) = self.workflow.cached() {
            return Ok(order.to_vec());
        }
        let mut ownership = IndexMap::new();
        for (name, slot) in &self.children {
            if self.top_driver.as_ref() == Some(name) {
                continue;
            }
            if let Some(driver) = slot.as_deref().and_then(|c| c.as_driver()) {
                ownership.insert(name.clone(), driver.core().referenced_components().all());
            }
        }
        let children: Vec<ComponentName> = self.children.keys().cloned().collect();
        let order = Dataflow::plan(
            &self.pathname,
            &children,
            &self.structure(),
            self.top_driver.as_ref(),
            &ownership,
        )?;
        self.workflow.store(order.clone());
        Ok(order)
    }

    /// Execution order of every driver child, keyed by driver name.
    pub fn driver_orders(&self) -> Result<IndexMap<ComponentName, Vec<ComponentName>>> {
        let mut orders = IndexMap::new();
        for (name, slot) in &self.children {
            let Some(driver) = slot.as_deref().and_then(|c| c.as_driver()) else {
                continue;
            };
            let path = self.child_path(name);
            orders.insert(name.clone(), driver.core().dataflow_order(self, &path)?);
        }
        Ok(orders)
    }

    /// A handle on the workflow stop flag.
    pub fn workflow_stop_handle(&self) -> StopFlag {
        self.workflow.stop_handle()
    }

    fn structure(&self) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for name in self.children.keys() {
            graph.add_node(name.clone());
        }
        for connection in &self.connections {
            graph.add_edge(
                connection.from.component().clone(),
                connection.to.component().clone(),
            );
        }
        graph
    }

    fn child(&self, name: &str) -> Result<&dyn Component> {
        match self.children.get(name) {
            Some(Some(child)) => Ok(&**child),
            Some(None) => Err(running(&self.pathname, name)),
            None => Err(unknown(&self.pathname, name)),
        }
    }

    fn child_mut(&mut self, name: &str) -> Result<&mut Box<dyn Component>> {
        match self.children.get_mut(name) {
            Some(Some(child)) => Ok(child),
            Some(None) => Err(running(&self.pathname, name)),
            None => Err(unknown(&self.pathname, name)),
        }
    }

    fn child_path(&self, name: &ComponentName) -> String {
        format!("{}.{name}", self.pathname)
    }

    fn parse_var(&self, var: &str) -> Result<VarPath> {
        var.parse()
            .map_err(|message: String| DataflowError::configuration(&self.pathname, message))
    }

    fn require_attribute(&self, var: &VarPath, output: bool) -> Result<()> {
        let child = self.child(var.component().as_str())?;
        let declared = if output {
            child.outputs()
        } else {
            child.inputs()
        };
        if declared.contains(var.attribute()) {
            return Ok(());
        }
        Err(DataflowError::configuration(
            &self.pathname,
            format!(
                "'{var}' is not an {} of '{}'",
                if output { "output" } else { "input" },
                var.component()
            ),
        ))
    }

    /// Copy every connected value into the inputs of `name`.
    fn pull_inputs(&mut self, name: &ComponentName) -> Result<()> {
        let mut incoming = Vec::new();
        for connection in self.connections.iter().filter(|c| c.to.component() == name) {
            let source = self.child(connection.from.component().as_str())?;
            let value = source.get(connection.from.attribute().as_str())?;
            incoming.push((connection.to.attribute().clone(), value));
        }
        let target = self.child_mut(name.as_str())?;
        for (attribute, value) in incoming {
            target.set(attribute.as_str(), value)?;
        }
        Ok(())
    }

    fn dotted_names(&self, output: bool) -> Vec<AttributeName> {
        self.children
            .iter()
            .filter_map(|(name, slot)| slot.as_deref().map(|child| (name, child)))
            .flat_map(|(name, child)| {
                let declared = if output {
                    child.outputs()
                } else {
                    child.inputs()
                };
                declared
                    .into_iter()
                    .filter_map(move |attr| AttributeName::new(format!("{name}.{attr}")))
            })
            .collect()
    }
}

fn running(path: &str, name: &str) -> DataflowError {
    DataflowError::configuration(
        path,
        format!("'{name}' is running and cannot be used re-entrantly"),
    )
}

fn unknown(path: &str, name: &str) -> DataflowError {
    DataflowError::UnknownComponent {
        path: path.to_string(),
        component: name.to_string(),
    }
}

impl Component for Assembly {
    fn name(&self) -> &ComponentName {
        &self.name
    }

    /// Inputs of every child, addressed as `child.attribute`.
    fn inputs(&self) -> Vec<AttributeName> {
        self.dotted_names(false)
    }

    /// Outputs of every child, addressed as `child.attribute`.
    fn outputs(&self) -> Vec<AttributeName> {
        self.dotted_names(true)
    }

    fn get(&self, attribute: &str) -> Result<Value> {
        let var = self.parse_var(attribute)?;
        self.child(var.component().as_str())?
            .get(var.attribute().as_str())
    }

    fn set(&mut self, attribute: &str, value: Value) -> Result<()> {
        let var = self.parse_var(attribute)?;
        let child = self.child_mut(var.component().as_str())?;
        child.set(var.attribute().as_str(), value)?;
        // Driver references may have moved.
        if child.as_driver().is_some() {
            self.workflow.invalidate();
        }
        Ok(())
    }

    /// Runs the top driver if one is set, otherwise the workflow.
    fn run(&mut self, _scope: &mut Scope<'_>) -> Result<()> {
        info!(assembly = %self.pathname, "running assembly");
        match self.top_driver.clone() {
            Some(top) => self.run_child(&top),
            None => self.run_workflow(None),
        }
    }

    fn set_parent_path(&mut self, parent: &str) {
        self.pathname = if parent.is_empty() {
            self.name.to_string()
        } else {
            format!("{parent}.{}", self.name)
        };
        let pathname = self.pathname.clone();
        for child in self.children.values_mut().flatten() {
            child.set_parent_path(&pathname);
        }
    }
}

impl Container for Assembly {
    fn pathname(&self) -> &str {
        &self.pathname
    }

    fn component_graph(&self) -> Option<DependencyGraph> {
        Some(self.structure())
    }

    fn contains_child(&self, name: &str) -> bool {
        self.children.contains_key(name)
    }

    fn lookup_child(&self, name: &str) -> Option<&dyn Component> {
        self.child(name).ok()
    }

    fn lookup_child_mut(&mut self, name: &str) -> Option<&mut dyn Component> {
        match self.children.get_mut(name) {
            Some(Some(child)) => Some(&mut **child),
            _ => None,
        }
    }

    fn run_child(&mut self, name: &ComponentName) -> Result<()> {
        self.pull_inputs(name)?;
        let mut child = match self.children.get_mut(name.as_str()) {
            Some(slot) => slot.take().ok_or_else(|| running(&self.pathname, name.as_str()))?,
            None => return Err(unknown(&self.pathname, name.as_str())),
        };
        debug!(assembly = %self.pathname, child = %name, "running child");
        let outcome = child.run(&mut Scope::within(self));
        if let Some(slot) = self.children.get_mut(name.as_str()) {
            *slot = Some(child);
        }
        outcome
    }

    fn top_driver(&self) -> Option<&ComponentName> {
        self.top_driver.as_ref()
    }

    fn run_workflow(&mut self, driver_stop: Option<&StopFlag>) -> Result<()> {
        let order = self.workflow_order()?;
        self.workflow.begin_run();
        for name in &order {
            if self.workflow.is_stop_requested() || driver_stop.is_some_and(StopFlag::is_raised) {
                return Err(DataflowError::RunStopped {
                    path: self.pathname.clone(),
                });
            }
            self.run_child(name)?;
        }
        Ok(())
    }

    fn step_workflow(&mut self) -> Result<StepOutcome> {
        self.workflow_order()?;
        match self.workflow.advance() {
            Some(name) => {
                self.run_child(&name)?;
                Ok(StepOutcome::Ran(name))
            }
            None => Ok(StepOutcome::Finished),
        }
    }

    fn stop_workflow(&mut self) {
        self.workflow.request_stop();
    }
}
