//! Per-entity facade
//!
//! `PredictionModel` owns the collaborators, the link and the driver for
//! the entity's current role. The simulation context calls `tick` and
//! `generate_output`; the control context works through `endpoint()`.

use crate::driver::{Driver, Role};
use crate::link::{Endpoint, Link};
use crate::{Error, Result};
use recoil_core::{InputPayload, InputSource, NoInput, PredictionConfig, SimState, Simulator};
use std::sync::Arc;
use tracing::info;

/// One predicted entity
pub struct PredictionModel<I, S, Sim, Src = NoInput> {
    config: PredictionConfig,
    link: Arc<Link<I, S>>,
    simulator: Sim,
    source: Src,
    initial: S,
    driver: Option<Driver<I, S>>,
}

impl<I, S, Sim, Src> PredictionModel<I, S, Sim, Src>
where
    I: InputPayload,
    S: SimState,
    Sim: Simulator<I, S>,
    Src: InputSource<I, S>,
{
    /// Create a model with no role assigned
    ///
    /// Fails if the configuration does not validate.
    pub fn new(config: PredictionConfig, simulator: Sim, source: Src) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            link: Arc::new(Link::new()),
            simulator,
            source,
            initial: S::default(),
            driver: None,
        })
    }

    /// Start every driver from `state` instead of the default body
    pub fn with_initial_state(mut self, state: S) -> Self {
        self.initial = state;
        self
    }

    /// Tear down the current driver and start a fresh one for `role`
    ///
    /// Everything in flight is discarded: history, buffered input, pending
    /// forced ticks, received snapshots and unsent messages.
    pub fn set_role(&mut self, role: Role) {
        let previous = self.driver.take().map(|d| d.role());
        self.link.reset();
        self.simulator.rewind(&self.initial);
        self.driver = Some(Driver::new(role, &self.config, self.initial.clone()));
        info!(?previous, %role, "Role assigned");
    }

    /// Current role, if any
    pub fn role(&self) -> Option<Role> {
        self.driver.as_ref().map(Driver::role)
    }

    /// Run one fixed-timestep tick of `dt` seconds
    pub fn tick(&mut self, dt: f64) -> Result<()> {
        let driver = self.driver.as_mut().ok_or(Error::NoDriver)?;
        driver.tick(dt, &self.link, &mut self.simulator, &mut self.source)
    }

    /// Body to render, `alpha` of the way between the last two ticks
    pub fn generate_output(&self, alpha: f64) -> Result<S> {
        let driver = self.driver.as_ref().ok_or(Error::NoDriver)?;
        Ok(driver.generate_output(alpha))
    }

    /// Control-context handle for this entity
    pub fn endpoint(&self) -> Endpoint<I, S> {
        Endpoint::new(Arc::clone(&self.link))
    }

    /// Current driver, if a role is assigned
    pub fn driver(&self) -> Option<&Driver<I, S>> {
        self.driver.as_ref()
    }

    /// Configuration this model was built with
    pub fn config(&self) -> &PredictionConfig {
        &self.config
    }

    /// The simulation collaborator
    pub fn simulator(&self) -> &Sim {
        &self.simulator
    }

    /// Mutable access to the simulation collaborator
    pub fn simulator_mut(&mut self) -> &mut Sim {
        &mut self.simulator
    }

    /// Mutable access to the input source
    pub fn source_mut(&mut self) -> &mut Src {
        &mut self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MessageSink;
    use recoil_core::EventMask;
    use std::convert::Infallible;

    struct Step;

    impl Simulator<i32, f64> for Step {
        fn simulate(&mut self, _dt: f64, prev: &f64, input: &i32, _events: &mut EventMask) -> f64 {
            prev + f64::from(*input)
        }

        fn rewind(&mut self, _state: &f64) {}
    }

    struct One;

    impl InputSource<i32, f64> for One {
        fn produce_input(&mut self, _state: &f64) -> i32 {
            1
        }
    }

    #[derive(Default)]
    struct Count(usize);

    impl MessageSink for Count {
        type Error = Infallible;

        fn emit_input_packets(&mut self, _payload: &[u8]) -> std::result::Result<(), Infallible> {
            self.0 += 1;
            Ok(())
        }

        fn emit_authority_state(&mut self, _payload: &[u8]) -> std::result::Result<(), Infallible> {
            self.0 += 1;
            Ok(())
        }

        fn emit_control_packet(&mut self, _payload: &[u8]) -> std::result::Result<(), Infallible> {
            self.0 += 1;
            Ok(())
        }
    }

    #[test]
    fn test_tick_without_role_fails() {
        let mut model = PredictionModel::new(PredictionConfig::default(), Step, One).unwrap();
        assert!(matches!(model.tick(1.0), Err(Error::NoDriver)));
        assert!(matches!(model.generate_output(0.0), Err(Error::NoDriver)));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = PredictionConfig::default().with_sync_frames(0);
        assert!(PredictionModel::new(config, Step, One).is_err());
    }

    #[test]
    fn test_set_role_discards_in_flight_state() {
        let mut model = PredictionModel::new(PredictionConfig::default(), Step, One)
            .unwrap()
            .with_initial_state(10.0);
        model.set_role(Role::AutoProxy);
        for _ in 0..3 {
            model.tick(1.0).unwrap();
        }
        assert_eq!(model.generate_output(1.0).unwrap(), 13.0);
        assert_eq!(model.endpoint().pending_outbound(), 3);

        model.set_role(Role::SimulatedProxy);
        assert_eq!(model.role(), Some(Role::SimulatedProxy));
        assert_eq!(model.endpoint().pending_outbound(), 0);
        assert!(model.endpoint().latest_state().is_none());
        assert_eq!(model.generate_output(1.0).unwrap(), 10.0);
    }

    #[test]
    fn test_endpoint_flushes_driver_output() {
        let mut model = PredictionModel::new(PredictionConfig::default(), Step, One).unwrap();
        model.set_role(Role::AutoProxy);
        model.tick(1.0).unwrap();
        model.tick(1.0).unwrap();

        let mut sink = Count::default();
        assert_eq!(model.endpoint().flush(&mut sink).unwrap(), 2);
        assert_eq!(sink.0, 2);
        assert_eq!(
            model.endpoint().latest_state().map(|s| s.body),
            Some(2.0)
        );
    }
}
