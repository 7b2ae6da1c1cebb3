//! Containers, stock components and stock drivers for the dataflow core.
//!
//! ## Architectural Layer
//!
//! **Implementation layer.** [`Assembly`] implements the [`dataflow::Container`]
//! port and owns children; the drivers here implement [`dataflow::Driver`]
//! and rely on the core for ordering. No domain rules are added.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`assembly`] | `Assembly` container and its connections |
//! | [`workflow`] | `Dataflow`, the assembly's member sequencer |
//! | [`function`] | `FnComponent`, a closure-backed component |
//! | [`linear`] | `Linear`, an affine component |
//! | [`drivers`] | `SimpleDriver`, `Repeat`, `FixedPointIterator` |
//! | [`model`] | JSON model descriptions |

pub mod assembly;
pub mod drivers;
pub mod function;
pub mod linear;
pub mod model;
pub mod workflow;

pub use assembly::{Assembly, Connection};
pub use drivers::{FixedPointIterator, Repeat, SimpleDriver};
pub use function::{FnComponent, Values};
pub use linear::{Linear, LinearSpec};
pub use model::{ComponentSpec, ConnectionSpec, DriverSpec, ModelSpec};
pub use workflow::Dataflow;
