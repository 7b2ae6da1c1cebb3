//! Reference attributes and the resolver that turns them into component sets
//! and reference graphs.
//!
//! A driver declares each of its attributes up front as either a plain value
//! or a reference to one or more `component.attribute` paths. Only references
//! matter for ordering: they say which components the driver drives and in
//! which direction data flows between them.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::graph::DependencyGraph;
use crate::{ComponentName, VarPath};

// ---------------------------------------------------------------------------
// Attributes
// ---------------------------------------------------------------------------

/// Which way data moves across a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// The referenced component's value feeds the driver.
    ///
    /// Produces the edge `driver → component`.
    Source,
    /// The driver's result feeds the referenced component.
    ///
    /// Produces the edge `component → driver`.
    Sink,
}

/// A typed reference from a driver attribute to one or more variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    direction: Direction,
    targets: Vec<VarPath>,
}

impl Reference {
    /// A reference to a single variable.
    pub fn new(direction: Direction, target: VarPath) -> Self {
        Self {
            direction,
            targets: vec![target],
        }
    }

    /// A reference to several variables at once.
    pub fn array(direction: Direction, targets: Vec<VarPath>) -> Self {
        Self { direction, targets }
    }

    /// A reference with no targets yet.
    pub fn unbound(direction: Direction) -> Self {
        Self {
            direction,
            targets: Vec::new(),
        }
    }

    /// Direction of the data flow.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Referenced variables.
    pub fn targets(&self) -> &[VarPath] {
        &self.targets
    }

    /// Replace the referenced variables, keeping the direction.
    pub fn retarget(&mut self, targets: Vec<VarPath>) {
        self.targets = targets;
    }

    /// Component names of the targets, in target order.
    pub fn component_names(&self) -> impl Iterator<Item = &ComponentName> {
        self.targets.iter().map(VarPath::component)
    }

    /// Parse a JSON value into targets: a single `"comp.attr"` string or an
    /// array of them. `null` unbinds the reference.
    pub fn parse_targets(value: &Value) -> Result<Vec<VarPath>, String> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::String(s) => Ok(vec![s.parse()?]),
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.parse(),
                    other => Err(format!("expected a 'component.attribute' string, got {other}")),
                })
                .collect(),
            other => Err(format!(
                "expected a 'component.attribute' string or an array of them, got {other}"
            )),
        }
    }

    /// The targets rendered back to JSON, the inverse of [`Self::parse_targets`].
    pub fn targets_value(&self) -> Value {
        match self.targets.as_slice() {
            [] => Value::Null,
            [single] => Value::String(single.to_string()),
            many => Value::Array(many.iter().map(|t| Value::String(t.to_string())).collect()),
        }
    }
}

/// A driver attribute: a plain value, or a reference to other components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    /// An ordinary value; ignored by the resolver.
    Plain(Value),
    /// A reference expression naming other components.
    Reference(Reference),
}

impl Attribute {
    /// The reference, if this attribute is one.
    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            Self::Reference(reference) => Some(reference),
            Self::Plain(_) => None,
        }
    }

    /// Whether this attribute is a reference.
    pub fn is_reference(&self) -> bool {
        matches!(self, Self::Reference(_))
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Component names a driver references, split by direction.
///
/// The two sets are disjoint: a component referenced both ways is kept as a
/// source only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferencedComponents {
    /// Components referenced as data sources.
    pub sources: IndexSet<ComponentName>,
    /// Components referenced as data sinks.
    pub sinks: IndexSet<ComponentName>,
}

impl ReferencedComponents {
    /// Collect referenced names from a set of attributes. Plain attributes are
    /// skipped.
    pub fn resolve<'a>(attributes: impl IntoIterator<Item = &'a Attribute>) -> Self {
        let mut resolved = Self::default();
        let mut sinks = IndexSet::new();
        for reference in attributes.into_iter().filter_map(Attribute::as_reference) {
            let bucket = match reference.direction() {
                Direction::Source => &mut resolved.sources,
                Direction::Sink => &mut sinks,
            };
            bucket.extend(reference.component_names().cloned());
        }
        resolved.sinks = sinks
            .into_iter()
            .filter(|name| !resolved.sources.contains(name))
            .collect();
        resolved
    }

    /// Names referenced in the given direction, or in either direction when
    /// `direction` is `None`. Never fails; no match yields an empty set.
    pub fn filtered(&self, direction: Option<Direction>) -> IndexSet<ComponentName> {
        match direction {
            Some(Direction::Source) => self.sources.clone(),
            Some(Direction::Sink) => self.sinks.clone(),
            None => self.all(),
        }
    }

    /// Every referenced name, sources first.
    pub fn all(&self) -> IndexSet<ComponentName> {
        self.sources.iter().chain(&self.sinks).cloned().collect()
    }

    /// Drop `name` from both sets.
    pub fn without(mut self, name: &ComponentName) -> Self {
        self.sources.shift_remove(name);
        self.sinks.shift_remove(name);
        self
    }

    /// Whether nothing is referenced.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty() && self.sinks.is_empty()
    }

    /// Build the raw reference graph rooted at `driver`.
    ///
    /// Adds `driver → source` for every source and, unless `skip_inputs`,
    /// `sink → driver` for every sink. The driver node is always present.
    pub fn reference_graph(&self, driver: &ComponentName, skip_inputs: bool) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        graph.add_node(driver.clone());
        for source in &self.sources {
            graph.add_edge(driver.clone(), source.clone());
        }
        if !skip_inputs {
            for sink in &self.sinks {
                graph.add_edge(sink.clone(), driver.clone());
            }
        }
        graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(s: &str) -> VarPath {
        s.parse().unwrap()
    }

    fn name(s: &str) -> ComponentName {
        ComponentName::new(s).unwrap()
    }

    #[test]
    fn plain_attributes_are_ignored() {
        let attrs = [
            Attribute::Plain(json!(3.0)),
            Attribute::Reference(Reference::new(Direction::Source, path("a.y"))),
        ];
        let refs = ReferencedComponents::resolve(&attrs);
        assert_eq!(refs.all().into_iter().collect::<Vec<_>>(), vec![name("a")]);
    }

    #[test]
    fn partitions_by_direction_and_keeps_sets_disjoint() {
        let attrs = [
            Attribute::Reference(Reference::array(
                Direction::Source,
                vec![path("a.y"), path("b.y"), path("a.z")],
            )),
            Attribute::Reference(Reference::array(
                Direction::Sink,
                vec![path("c.x"), path("b.x")],
            )),
        ];
        let refs = ReferencedComponents::resolve(&attrs);
        assert_eq!(refs.sources.iter().collect::<Vec<_>>(), vec![&name("a"), &name("b")]);
        assert_eq!(refs.sinks.iter().collect::<Vec<_>>(), vec![&name("c")]);
    }

    #[test]
    fn filtering_without_matches_is_empty() {
        let attrs = [Attribute::Reference(Reference::new(
            Direction::Source,
            path("a.y"),
        ))];
        let refs = ReferencedComponents::resolve(&attrs);
        assert!(refs.filtered(Some(Direction::Sink)).is_empty());
        assert!(ReferencedComponents::resolve(std::iter::empty()).is_empty());
    }

    #[test]
    fn reference_graph_edges() {
        let attrs = [
            Attribute::Reference(Reference::new(Direction::Source, path("a.y"))),
            Attribute::Reference(Reference::new(Direction::Sink, path("b.x"))),
        ];
        let refs = ReferencedComponents::resolve(&attrs);
        let driver = name("driver");

        let full = refs.reference_graph(&driver, false);
        assert!(full.has_edge("driver", "a"));
        assert!(full.has_edge("b", "driver"));

        let skipped = refs.reference_graph(&driver, true);
        assert!(skipped.has_edge("driver", "a"));
        assert!(!skipped.has_edge("b", "driver"));
        assert!(skipped.contains_node("driver"));
    }

    #[test]
    fn parse_targets_accepts_string_array_and_null() {
        assert_eq!(Reference::parse_targets(&json!("a.y")).unwrap(), vec![path("a.y")]);
        assert_eq!(
            Reference::parse_targets(&json!(["a.y", "b.x"])).unwrap(),
            vec![path("a.y"), path("b.x")]
        );
        assert!(Reference::parse_targets(&json!(null)).unwrap().is_empty());
        assert!(Reference::parse_targets(&json!(4)).is_err());
        assert!(Reference::parse_targets(&json!(["a.y", 2])).is_err());
    }

    #[test]
    fn targets_value_round_trips_through_parse() {
        let reference = Reference::array(Direction::Sink, vec![path("a.y"), path("b.x")]);
        let value = reference.targets_value();
        assert_eq!(Reference::parse_targets(&value).unwrap(), reference.targets());
    }
}
