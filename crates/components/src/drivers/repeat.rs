use tracing::debug;

use dataflow::{
    impl_driver_component, Attribute, AttributeName, ComponentName, DataflowError, Direction,
    Driver, DriverCore, IoKind, Result, Scope, Value, VarPath,
};

use super::{with_targets, COMPONENTS};

const COUNT: &str = "count";

/// Runs its referenced components a fixed number of times per `execute`.
///
/// The count is the plain input `count`; zero skips the loop entirely.
#[derive(Debug)]
pub struct Repeat {
    core: DriverCore,
}

impl Repeat {
    /// Creates a driver repeating the `components` targets `count` times.
    pub fn new(name: ComponentName, components: Vec<VarPath>, count: u64) -> Self {
        let mut core = with_targets(DriverCore::new(name), COMPONENTS, Direction::Source, components);
        core.declare(
            AttributeName::from_static(COUNT),
            IoKind::Input,
            Attribute::Plain(Value::from(count)),
        );
        Self { core }
    }

    fn count(&self, path: &str) -> Result<u64> {
        self.core
            .plain(COUNT)
            .and_then(Value::as_u64)
            .ok_or_else(|| DataflowError::InvalidValue {
                path: path.to_string(),
                attribute: COUNT.to_string(),
                message: "expected a non-negative integer".to_string(),
            })
    }
}

impl Driver for Repeat {
    fn core(&self) -> &DriverCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DriverCore {
        &mut self.core
    }

    fn start_iteration(&mut self, scope: &mut Scope<'_>) -> Result<()> {
        let count = self.count(&scope.path_of(self.core.name()))?;
        self.core.set_continue(count > 0);
        Ok(())
    }

    fn post_iteration(&mut self, scope: &mut Scope<'_>) -> Result<()> {
        let count = self.count(&scope.path_of(self.core.name()))?;
        debug!(iteration = self.core.iterations(), count, "repeat pass complete");
        self.core.set_continue(self.core.iterations() < count);
        Ok(())
    }
}

impl_driver_component!(Repeat);
