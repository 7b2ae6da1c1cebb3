use dataflow::{impl_driver_component, ComponentName, Direction, Driver, DriverCore, VarPath};

use super::with_targets;

/// A driver using the default hooks: one pass over its referenced components,
/// or over the whole workflow when it is the top driver.
#[derive(Debug)]
pub struct SimpleDriver {
    core: DriverCore,
}

impl SimpleDriver {
    /// Creates a driver with no references.
    pub fn new(name: ComponentName) -> Self {
        Self {
            core: DriverCore::new(name),
        }
    }

    /// Adds the `sources` reference: components whose values feed the driver.
    pub fn with_sources(mut self, targets: Vec<VarPath>) -> Self {
        self.core = with_targets(self.core, "sources", Direction::Source, targets);
        self
    }

    /// Adds the `sinks` reference: components the driver feeds.
    pub fn with_sinks(mut self, targets: Vec<VarPath>) -> Self {
        self.core = with_targets(self.core, "sinks", Direction::Sink, targets);
        self
    }
}

impl Driver for SimpleDriver {
    fn core(&self) -> &DriverCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DriverCore {
        &mut self.core
    }
}

impl_driver_component!(SimpleDriver);
