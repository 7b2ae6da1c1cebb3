//! The iterating driver.
//!
//! A driver runs the components it references, in dependency order, over and
//! over until its continuation predicate says stop. [`DriverCore`] holds the
//! state every driver needs (attributes, continue flag, stop flag, cached
//! execution order); the [`Driver`] trait supplies the iteration protocol and
//! its overridable hooks:
//!
//! ```text
//! execute
//!   ├─ pre-execution guard (drop cached order if a reference went stale)
//!   ├─ start_iteration
//!   └─ while continue_iteration:
//!        pre_iteration → run_iteration → post_iteration
//! ```
//!
//! The default hooks iterate exactly once. Specialised drivers override
//! `start_iteration`, `pre_iteration` and `post_iteration` to implement
//! convergence loops or fixed iteration counts.

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, info, info_span, warn};

use crate::component::{Container, Scope};
use crate::errors::{DataflowError, Result};
use crate::graph::DependencyGraph;
use crate::reference::{Attribute, Direction, Reference, ReferencedComponents};
use crate::types::{DriverState, ExecutionRecord, StepOutcome, StopFlag, Timestamp};
use crate::{AttributeName, ComponentName, ExecutionId};

// ---------------------------------------------------------------------------
// Attribute slots
// ---------------------------------------------------------------------------

/// Whether a driver attribute is an input or an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoKind {
    /// Assigned from outside before the driver runs.
    Input,
    /// Produced by the driver.
    Output,
}

#[derive(Debug, Clone)]
struct Slot {
    io: IoKind,
    attribute: Attribute,
    /// `false` once the attribute has been assigned since the last
    /// pre-execution pass.
    valid: bool,
}

// ---------------------------------------------------------------------------
// Driver state
// ---------------------------------------------------------------------------

/// State shared by every driver implementation.
#[derive(Debug)]
pub struct DriverCore {
    name: ComponentName,
    attributes: IndexMap<AttributeName, Slot>,
    state: DriverState,
    continue_iterating: bool,
    iterations: u64,
    sorted: Option<Vec<ComponentName>>,
    stop: StopFlag,
    last_execution: Option<ExecutionRecord>,
}

impl DriverCore {
    /// Creates an idle driver core with no attributes.
    pub fn new(name: ComponentName) -> Self {
        Self {
            name,
            attributes: IndexMap::new(),
            state: DriverState::Idle,
            continue_iterating: false,
            iterations: 0,
            sorted: None,
            stop: StopFlag::new(),
            last_execution: None,
        }
    }

    /// Declares an input attribute.
    pub fn with_input(mut self, name: AttributeName, attribute: Attribute) -> Self {
        self.declare(name, IoKind::Input, attribute);
        self
    }

    /// Declares an output attribute.
    pub fn with_output(mut self, name: AttributeName, attribute: Attribute) -> Self {
        self.declare(name, IoKind::Output, attribute);
        self
    }

    /// Declares a reference attribute. Sources are driver outputs and sinks
    /// are driver inputs.
    pub fn with_reference(mut self, name: AttributeName, reference: Reference) -> Self {
        let io = match reference.direction() {
            Direction::Source => IoKind::Output,
            Direction::Sink => IoKind::Input,
        };
        self.declare(name, io, Attribute::Reference(reference));
        self
    }

    /// Declares (or redeclares) an attribute. A newly declared reference
    /// counts as stale.
    pub fn declare(&mut self, name: AttributeName, io: IoKind, attribute: Attribute) {
        let valid = !attribute.is_reference();
        self.attributes.insert(
            name,
            Slot {
                io,
                attribute,
                valid,
            },
        );
    }

    /// The driver's name.
    pub fn name(&self) -> &ComponentName {
        &self.name
    }

    /// Input attribute names in declaration order.
    pub fn inputs(&self) -> Vec<AttributeName> {
        self.names_with(IoKind::Input)
    }

    /// Output attribute names in declaration order.
    pub fn outputs(&self) -> Vec<AttributeName> {
        self.names_with(IoKind::Output)
    }

    fn names_with(&self, io: IoKind) -> Vec<AttributeName> {
        self.attributes
            .iter()
            .filter(|(_, slot)| slot.io == io)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// The declared attribute, if any.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name).map(|slot| &slot.attribute)
    }

    /// The attribute as a reference, if it is one.
    pub fn reference(&self, name: &str) -> Option<&Reference> {
        self.attribute(name).and_then(Attribute::as_reference)
    }

    /// The attribute as a plain value, if it is one.
    pub fn plain(&self, name: &str) -> Option<&Value> {
        match self.attribute(name)? {
            Attribute::Plain(value) => Some(value),
            Attribute::Reference(_) => None,
        }
    }

    /// Current value of an attribute. References read back as their target
    /// paths.
    pub fn get(&self, name: &str) -> Result<Value> {
        match self.attribute(name) {
            Some(Attribute::Plain(value)) => Ok(value.clone()),
            Some(Attribute::Reference(reference)) => Ok(reference.targets_value()),
            None => Err(self.unknown_attribute(name)),
        }
    }

    /// Assign an attribute and mark it stale. Reference attributes accept a
    /// `"component.attribute"` string or an array of them.
    pub fn set(&mut self, name: &str, value: Value) -> Result<()> {
        let path = self.name.to_string();
        let slot = self
            .attributes
            .get_mut(name)
            .ok_or_else(|| DataflowError::UnknownAttribute {
                path: path.clone(),
                attribute: name.to_string(),
            })?;
        match &mut slot.attribute {
            Attribute::Plain(current) => *current = value,
            Attribute::Reference(reference) => {
                let targets = Reference::parse_targets(&value).map_err(|message| {
                    DataflowError::InvalidValue {
                        path,
                        attribute: name.to_string(),
                        message,
                    }
                })?;
                reference.retarget(targets);
            }
        }
        slot.valid = false;
        Ok(())
    }

    /// Mark an attribute stale without changing it. Returns `false` for an
    /// unknown name.
    pub fn invalidate(&mut self, name: &str) -> bool {
        match self.attributes.get_mut(name) {
            Some(slot) => {
                slot.valid = false;
                true
            }
            None => false,
        }
    }

    /// Whether any reference-bearing attribute is stale.
    pub fn has_stale_references(&self) -> bool {
        self.attributes
            .values()
            .any(|slot| !slot.valid && slot.attribute.is_reference())
    }

    fn unknown_attribute(&self, name: &str) -> DataflowError {
        DataflowError::UnknownAttribute {
            path: self.name.to_string(),
            attribute: name.to_string(),
        }
    }

    // -----------------------------------------------------------------------
    // Iteration state
    // -----------------------------------------------------------------------

    /// Current run state.
    pub fn state(&self) -> DriverState {
        self.state
    }

    /// The continue flag consulted by the default `continue_iteration`.
    pub fn continues(&self) -> bool {
        self.continue_iterating
    }

    /// Set the continue flag.
    pub fn set_continue(&mut self, keep_going: bool) {
        self.continue_iterating = keep_going;
    }

    /// Iterations completed in the current (or last) `execute`.
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Record of the most recent `execute`.
    pub fn last_execution(&self) -> Option<&ExecutionRecord> {
        self.last_execution.as_ref()
    }

    /// A handle on the stop flag that can be raised from elsewhere.
    pub fn stop_handle(&self) -> StopFlag {
        self.stop.clone()
    }

    /// Whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop.is_raised()
    }

    fn begin(&mut self, id: ExecutionId) {
        self.state = DriverState::Waiting;
        self.stop.clear();
        self.iterations = 0;
        self.last_execution = Some(ExecutionRecord {
            id,
            started_at: Timestamp::now(),
            finished_at: None,
            iterations: 0,
        });
    }

    fn finish(&mut self) {
        self.state = DriverState::Idle;
        let iterations = self.iterations;
        if let Some(record) = self.last_execution.as_mut() {
            record.finished_at = Some(Timestamp::now());
            record.iterations = iterations;
        }
    }

    // -----------------------------------------------------------------------
    // Ordering
    // -----------------------------------------------------------------------

    /// Components referenced by this driver's attributes, excluding itself.
    pub fn referenced_components(&self) -> ReferencedComponents {
        ReferencedComponents::resolve(self.attributes.values().map(|slot| &slot.attribute))
            .without(&self.name)
    }

    /// The raw reference graph: `driver → source` edges and, unless
    /// `skip_inputs`, `sink → driver` edges.
    pub fn reference_graph(&self, skip_inputs: bool) -> DependencyGraph {
        self.referenced_components()
            .reference_graph(&self.name, skip_inputs)
    }

    /// The graph the execution order is sorted from: the container's graph
    /// induced on the referenced components, plus this driver's source edges.
    pub fn execution_graph(&self, parent: &dyn Container, path: &str) -> Result<DependencyGraph> {
        let referenced = self.referenced_components();
        let names = referenced.all();
        if let Some(missing) = names.iter().find(|name| !parent.contains_child(name.as_str())) {
            return Err(DataflowError::UnresolvedReference {
                path: path.to_string(),
                component: missing.clone(),
            });
        }
        let structure = parent.component_graph().ok_or_else(|| {
            DataflowError::configuration(
                path,
                format!(
                    "parent '{}' does not expose a component dependency graph",
                    parent.pathname()
                ),
            )
        })?;

        let mut graph = structure.induced_subgraph(&names);
        for name in &names {
            graph.add_node(name.clone());
        }
        graph.extend(&referenced.reference_graph(&self.name, true));
        Ok(graph)
    }

    /// Pre-execution guard: a stale reference discards the cached order, then
    /// every attribute is marked valid.
    pub fn pre_execute(&mut self) {
        if self.has_stale_references() {
            debug!(driver = %self.name, "reference changed; discarding cached execution order");
            self.sorted = None;
        }
        for slot in self.attributes.values_mut() {
            slot.valid = true;
        }
    }

    /// Drop the cached execution order.
    pub fn invalidate_order(&mut self) {
        self.sorted = None;
    }

    /// The cached execution order, if one has been computed.
    pub fn cached_order(&self) -> Option<&[ComponentName]> {
        self.sorted.as_deref()
    }

    /// Referenced component names in dataflow order, driver excluded,
    /// computed afresh against `parent`.
    pub fn dataflow_order(&self, parent: &dyn Container, path: &str) -> Result<Vec<ComponentName>> {
        let mut graph = self.execution_graph(parent, path)?;
        // The driver participates in both directions by construction.
        graph.remove_node(self.name.as_str());
        graph
            .topological_sort()
            .map_err(|err| DataflowError::CyclicDependency {
                path: path.to_string(),
                cycles: err.cycles,
            })
    }

    /// Referenced component names in dataflow order, driver excluded.
    ///
    /// Served from cache unless a reference has gone stale since it was
    /// computed.
    pub fn sorted_components(&mut self, scope: &Scope<'_>) -> Result<Vec<ComponentName>> {
        let path = scope.path_of(&self.name);
        if self.has_stale_references() {
            self.sorted = None;
        }
        if let Some(order) = &self.sorted {
            debug!(driver = %path, "execution order served from cache");
            return Ok(order.clone());
        }

        let parent = scope.parent().ok_or_else(|| {
            DataflowError::configuration(
                &path,
                "driver requires a container parent to determine dataflow",
            )
        })?;
        let order = self.dataflow_order(parent, &path)?;

        debug!(driver = %path, order = ?order, "computed execution order");
        for slot in self.attributes.values_mut() {
            if slot.attribute.is_reference() {
                slot.valid = true;
            }
        }
        self.sorted = Some(order.clone());
        Ok(order)
    }

    // -----------------------------------------------------------------------
    // Running
    // -----------------------------------------------------------------------

    /// Run every referenced component once, in dataflow order.
    ///
    /// The stop flag is checked before each component; a raised flag ends
    /// the pass with [`DataflowError::RunStopped`].
    pub fn run_referenced_components(&mut self, scope: &mut Scope<'_>) -> Result<()> {
        let path = scope.path_of(&self.name);
        if scope.parent().is_none() {
            return Err(DataflowError::missing_parent(
                path,
                "run referenced components",
            ));
        }
        let order = self.sorted_components(scope)?;
        for name in &order {
            if self.stop.is_raised() {
                return Err(DataflowError::RunStopped { path });
            }
            debug!(driver = %path, component = %name, "running referenced component");
            scope
                .require_parent(&path, "run referenced components")?
                .run_child(name)?;
        }
        Ok(())
    }

    /// Default `run_iteration`: the top driver of a container runs the
    /// container's workflow, any other driver runs its referenced components.
    pub fn run_iteration(&mut self, scope: &mut Scope<'_>) -> Result<()> {
        let path = scope.path_of(&self.name);
        let parent = scope.require_parent(&path, "run an iteration")?;
        if parent.top_driver() == Some(&self.name) {
            debug!(driver = %path, "top driver; running container workflow");
            return parent.run_workflow(Some(&self.stop));
        }
        self.run_referenced_components(scope)
    }

    /// Run a single unit of the parent's workflow.
    pub fn step(&self, scope: &mut Scope<'_>) -> Result<StepOutcome> {
        let path = scope.path_of(&self.name);
        scope.require_parent(&path, "step")?.step_workflow()
    }

    /// Raise the stop flag and pass the request on to the parent workflow.
    pub fn stop(&self, scope: &mut Scope<'_>) {
        warn!(driver = %scope.path_of(&self.name), "stop requested");
        self.stop.raise();
        if let Some(parent) = scope.parent_mut() {
            parent.stop_workflow();
        }
    }
}

// ---------------------------------------------------------------------------
// Driver protocol
// ---------------------------------------------------------------------------

/// The iteration protocol. Implementors provide access to their
/// [`DriverCore`] and override whichever hooks they need.
pub trait Driver {
    /// Shared driver state.
    fn core(&self) -> &DriverCore;

    /// Mutable shared driver state.
    fn core_mut(&mut self) -> &mut DriverCore;

    /// Called once before the loop. Default: set the continue flag.
    fn start_iteration(&mut self, _scope: &mut Scope<'_>) -> Result<()> {
        self.core_mut().set_continue(true);
        Ok(())
    }

    /// Return `false` to stop iterating. Default: the continue flag, unless a
    /// stop has been requested.
    fn continue_iteration(&self) -> bool {
        self.core().continues() && !self.core().is_stop_requested()
    }

    /// Called before each iteration. Default: nothing.
    fn pre_iteration(&mut self, _scope: &mut Scope<'_>) -> Result<()> {
        Ok(())
    }

    /// Run one iteration. Default: see [`DriverCore::run_iteration`].
    fn run_iteration(&mut self, scope: &mut Scope<'_>) -> Result<()> {
        self.core_mut().run_iteration(scope)
    }

    /// Called after each iteration. Default: clear the continue flag, so a
    /// plain driver iterates exactly once.
    fn post_iteration(&mut self, _scope: &mut Scope<'_>) -> Result<()> {
        self.core_mut().set_continue(false);
        Ok(())
    }

    /// Run the iteration loop to completion.
    ///
    /// The state is `Waiting` for the duration and `Idle` afterwards, whether
    /// the loop finished, failed, or was stopped.
    fn execute(&mut self, scope: &mut Scope<'_>) -> Result<()> {
        let path = scope.path_of(self.core().name());
        let id = ExecutionId::new_random();
        let span = info_span!("driver_execute", driver = %path, execution_id = %id);
        let _entered = span.enter();

        self.core_mut().pre_execute();
        self.core_mut().begin(id);
        let outcome = iterate(self, scope, &path);
        self.core_mut().finish();

        match &outcome {
            Ok(()) => info!(iterations = self.core().iterations(), "driver finished"),
            Err(err) => warn!(iterations = self.core().iterations(), error = %err, "driver aborted"),
        }
        outcome
    }

    /// Delegate a single execution unit to the parent's workflow.
    fn step(&mut self, scope: &mut Scope<'_>) -> Result<StepOutcome> {
        self.core().step(scope)
    }

    /// Stop the loop and any workflow run in progress in the parent.
    fn stop(&mut self, scope: &mut Scope<'_>) {
        self.core().stop(scope);
    }

    /// Referenced component names in dataflow order.
    fn sorted_components(&mut self, scope: &Scope<'_>) -> Result<Vec<ComponentName>> {
        self.core_mut().sorted_components(scope)
    }

    /// Run the referenced components once, in dataflow order.
    fn run_referenced_components(&mut self, scope: &mut Scope<'_>) -> Result<()> {
        self.core_mut().run_referenced_components(scope)
    }
}

fn iterate<D: Driver + ?Sized>(driver: &mut D, scope: &mut Scope<'_>, path: &str) -> Result<()> {
    let stopped = || DataflowError::RunStopped {
        path: path.to_string(),
    };

    driver.start_iteration(scope)?;
    loop {
        if driver.core().is_stop_requested() {
            return Err(stopped());
        }
        if !driver.continue_iteration() {
            return Ok(());
        }
        driver.pre_iteration(scope)?;
        if driver.core().is_stop_requested() {
            return Err(stopped());
        }
        driver.run_iteration(scope)?;
        driver.core_mut().iterations += 1;
        debug!(iteration = driver.core().iterations(), "iteration complete");
        if driver.core().is_stop_requested() {
            return Err(stopped());
        }
        driver.post_iteration(scope)?;
    }
}

/// Implements [`Component`](crate::Component) for a type implementing
/// [`Driver`], routing attribute access through its [`DriverCore`] and `run`
/// through [`Driver::execute`].
#[macro_export]
macro_rules! impl_driver_component {
    ($driver:ty) => {
        impl $crate::Component for $driver {
            fn name(&self) -> &$crate::ComponentName {
                $crate::Driver::core(self).name()
            }

            fn inputs(&self) -> Vec<$crate::AttributeName> {
                $crate::Driver::core(self).inputs()
            }

            fn outputs(&self) -> Vec<$crate::AttributeName> {
                $crate::Driver::core(self).outputs()
            }

            fn get(&self, attribute: &str) -> $crate::Result<$crate::Value> {
                $crate::Driver::core(self).get(attribute)
            }

            fn set(&mut self, attribute: &str, value: $crate::Value) -> $crate::Result<()> {
                $crate::Driver::core_mut(self).set(attribute, value)
            }

            fn run(&mut self, scope: &mut $crate::Scope<'_>) -> $crate::Result<()> {
                $crate::Driver::execute(self, scope)
            }

            fn as_driver(&self) -> Option<&dyn $crate::Driver> {
                Some(self)
            }
        }
    };
}
