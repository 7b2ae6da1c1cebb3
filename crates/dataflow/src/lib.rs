//! Dependency-ordered execution of components by iterating drivers.
//!
//! A driver declares reference attributes naming the components it drives.
//! From those references and the container's own dataflow graph it derives a
//! deterministic execution order, then runs that order once per iteration for
//! as long as its continuation predicate allows.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate owns no components. It
//! defines the [`Component`] and [`Container`] ports; the `components` crate
//! supplies concrete assemblies, workflows and drivers.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`ComponentName`, `VarPath`, etc.) |
//! | [`types`] | Shared value types (`DriverState`, `StopFlag`, `ExecutionRecord`, etc.) |
//! | [`errors`] | The crate error type |
//! | [`graph`] | Dependency graph, topological sort, cycle detection |
//! | [`reference`] | Reference attributes and their resolution |
//! | [`component`] | `Component` and `Container` ports, the `Scope` handed to `run` |
//! | [`driver`] | `DriverCore` state and the `Driver` iteration protocol |

pub mod component;
pub mod driver;
pub mod errors;
pub mod graph;
pub mod identifiers;
pub mod reference;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use component::{Component, Container, Scope};
pub use driver::{Driver, DriverCore, IoKind};
pub use errors::{DataflowError, Result};
pub use graph::{CycleError, DependencyGraph};
pub use identifiers::{AttributeName, ComponentName, ExecutionId, VarPath};
pub use reference::{Attribute, Direction, Reference, ReferencedComponents};
pub use serde_json::Value;
pub use types::{DriverState, ExecutionRecord, StepOutcome, StopFlag, Timestamp};
