//! The container-level sequencer.
//!
//! An assembly's workflow runs the children that nobody else drives. Children
//! referenced by a sub-driver belong to that driver and run inside its
//! iterations; the sub-driver takes their place in the workflow, ordered after
//! their upstreams and before their downstreams.

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use dataflow::{ComponentName, DataflowError, DependencyGraph, Result, StopFlag};

/// Cached workflow order, step cursor and stop flag of one assembly.
#[derive(Debug, Default)]
pub struct Dataflow {
    order: Option<Vec<ComponentName>>,
    cursor: usize,
    stop: StopFlag,
}

impl Dataflow {
    /// An empty workflow with no cached order.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the cached order and rewind the step cursor.
    pub fn invalidate(&mut self) {
        self.order = None;
        self.cursor = 0;
    }

    /// The cached member order, if computed.
    pub fn cached(&self) -> Option<&[ComponentName]> {
        self.order.as_deref()
    }

    /// Cache a freshly planned order.
    pub fn store(&mut self, order: Vec<ComponentName>) {
        self.order = Some(order);
        self.cursor = 0;
    }

    /// Prepare for a full run: clear any earlier stop request and rewind.
    pub fn begin_run(&mut self) {
        self.stop.clear();
        self.cursor = 0;
    }

    /// Next member to step, or `None` once the pass is complete (which also
    /// rewinds the cursor for the next pass).
    pub fn advance(&mut self) -> Option<ComponentName> {
        let next = self
            .order
            .as_ref()
            .and_then(|order| order.get(self.cursor))
            .cloned();
        match next {
            Some(_) => self.cursor += 1,
            None => self.cursor = 0,
        }
        next
    }

    /// Ask a run in progress to halt before its next member.
    pub fn request_stop(&self) {
        self.stop.raise();
    }

    /// Whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop.is_raised()
    }

    /// A handle on the stop flag.
    pub fn stop_handle(&self) -> StopFlag {
        self.stop.clone()
    }

    /// Compute the member order.
    ///
    /// `children` lists every child in insertion order; `graph` is the
    /// container's structural graph; `ownership` maps each sub-driver to the
    /// components it references. The top driver is never a member.
    pub fn plan(
        path: &str,
        children: &[ComponentName],
        graph: &DependencyGraph,
        top: Option<&ComponentName>,
        ownership: &IndexMap<ComponentName, IndexSet<ComponentName>>,
    ) -> Result<Vec<ComponentName>> {
        let owners = Owners { top, ownership };

        let mut members = DependencyGraph::new();
        for child in children {
            if owners.representative(child).as_ref() == Some(child) {
                members.add_node(child.clone());
            }
        }
        for (from, to) in graph.edges() {
            let (Some(from), Some(to)) = (owners.representative(from), owners.representative(to))
            else {
                continue;
            };
            if from != to {
                members.add_edge(from, to);
            }
        }

        let order = members
            .topological_sort()
            .map_err(|err| DataflowError::CyclicDependency {
                path: path.to_string(),
                cycles: err.cycles,
            })?;
        debug!(assembly = %path, order = ?order, "planned workflow");
        Ok(order)
    }
}

struct Owners<'a> {
    top: Option<&'a ComponentName>,
    ownership: &'a IndexMap<ComponentName, IndexSet<ComponentName>>,
}

impl Owners<'_> {
    /// The first sub-driver (other than `name` itself) that references `name`.
    fn owner_of(&self, name: &ComponentName) -> Option<&ComponentName> {
        self.ownership
            .iter()
            .find(|(driver, owned)| *driver != name && owned.contains(name))
            .map(|(driver, _)| driver)
    }

    /// The workflow member standing in for `name`: `name` itself when nobody
    /// drives it, otherwise its outermost owning sub-driver. `None` for the top
    /// driver.
    fn representative(&self, name: &ComponentName) -> Option<ComponentName> {
        let mut current = name;
        let mut seen = IndexSet::new();
        loop {
            if Some(current) == self.top {
                return None;
            }
            if !seen.insert(current) {
                return Some(current.clone());
            }
            match self.owner_of(current) {
                Some(owner) => current = owner,
                None => return Some(current.clone()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> ComponentName {
        ComponentName::new(s).unwrap()
    }

    fn names(list: &[&str]) -> Vec<ComponentName> {
        list.iter().map(|s| name(s)).collect()
    }

    fn graph(nodes: &[&str], edges: &[(&str, &str)]) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for node in nodes {
            graph.add_node(name(node));
        }
        for (from, to) in edges {
            graph.add_edge(name(from), name(to));
        }
        graph
    }

    #[test]
    fn top_driver_is_not_a_member() {
        let children = names(&["driver", "a", "b"]);
        let order = Dataflow::plan(
            "top",
            &children,
            &graph(&["driver", "a", "b"], &[("b", "a")]),
            Some(&name("driver")),
            &IndexMap::new(),
        )
        .unwrap();
        assert_eq!(order, names(&["b", "a"]));
    }

    #[test]
    fn sub_driver_replaces_the_components_it_owns() {
        let children = names(&["bcastr", "solver", "dis1", "dis2", "report"]);
        let structure = graph(
            &["bcastr", "solver", "dis1", "dis2", "report"],
            &[
                ("bcastr", "dis1"),
                ("dis1", "dis2"),
                ("dis2", "report"),
            ],
        );
        let mut ownership = IndexMap::new();
        ownership.insert(
            name("solver"),
            names(&["dis1", "dis2"]).into_iter().collect::<IndexSet<_>>(),
        );
        let order = Dataflow::plan("top", &children, &structure, None, &ownership).unwrap();
        assert_eq!(order, names(&["bcastr", "solver", "report"]));
    }

    #[test]
    fn nested_sub_drivers_collapse_to_the_outermost() {
        let children = names(&["outer", "inner", "a", "b"]);
        let structure = graph(&["outer", "inner", "a", "b"], &[("a", "b")]);
        let mut ownership = IndexMap::new();
        ownership.insert(name("outer"), [name("inner")].into_iter().collect());
        ownership.insert(name("inner"), [name("a")].into_iter().collect());
        let order = Dataflow::plan("top", &children, &structure, None, &ownership).unwrap();
        assert_eq!(order, names(&["outer", "b"]));
    }

    #[test]
    fn cycle_among_members_is_reported() {
        let children = names(&["a", "b"]);
        let structure = graph(&["a", "b"], &[("a", "b"), ("b", "a")]);
        let err = Dataflow::plan("top", &children, &structure, None, &IndexMap::new())
            .unwrap_err();
        assert_eq!(err.cycles().unwrap(), &[names(&["a", "b"])]);
    }

    #[test]
    fn advance_walks_the_order_then_rewinds() {
        let mut workflow = Dataflow::new();
        assert_eq!(workflow.advance(), None);
        workflow.store(names(&["a", "b"]));
        assert_eq!(workflow.advance(), Some(name("a")));
        assert_eq!(workflow.advance(), Some(name("b")));
        assert_eq!(workflow.advance(), None);
        assert_eq!(workflow.advance(), Some(name("a")));
    }

    #[test]
    fn begin_run_clears_stop() {
        let mut workflow = Dataflow::new();
        workflow.stop_handle().raise();
        assert!(workflow.is_stop_requested());
        workflow.begin_run();
        assert!(!workflow.is_stop_requested());
    }
}
