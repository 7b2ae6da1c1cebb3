//! Stock drivers.
//!
//! | Driver | Iterates |
//! |--------|----------|
//! | [`SimpleDriver`] | once, with the default hooks |
//! | [`Repeat`] | a fixed number of times |
//! | [`FixedPointIterator`] | until fed-back values stop changing |

mod fixed_point;
mod repeat;
mod simple;

pub use fixed_point::FixedPointIterator;
pub use repeat::Repeat;
pub use simple::SimpleDriver;

use dataflow::{AttributeName, Direction, DriverCore, Reference, VarPath};

/// Attribute through which a driver names the components it runs.
pub(crate) const COMPONENTS: &str = "components";

/// Declares `name` as a reference attribute in `direction` over `targets`.
pub(crate) fn with_targets(
    core: DriverCore,
    name: &'static str,
    direction: Direction,
    targets: Vec<VarPath>,
) -> DriverCore {
    core.with_reference(
        AttributeName::from_static(name),
        Reference::array(direction, targets),
    )
}
