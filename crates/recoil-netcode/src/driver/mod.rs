//! Per-role drivers
//!
//! Each entity runs exactly one driver at a time, picked by its role:
//!
//! | Role             | Simulates | Produces input | Reconciles |
//! |------------------|-----------|----------------|------------|
//! | `Authority`      | yes       | no             | no         |
//! | `AutoProxy`      | yes       | yes            | yes        |
//! | `SimulatedProxy` | no        | no             | no         |

mod authority;
mod auto_proxy;
mod simulated_proxy;

pub use authority::AuthorityDriver;
pub use auto_proxy::AutoProxyDriver;
pub use simulated_proxy::SimulatedProxyDriver;

use crate::link::Link;
use crate::Result;
use recoil_core::{InputPayload, InputSource, PredictionConfig, SimState, Simulator};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Network role of an entity on this peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Holds the ground truth
    Authority,
    /// Controls the entity and predicts ahead of the authority
    AutoProxy,
    /// Observes the entity without predicting
    SimulatedProxy,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Authority => write!(f, "authority"),
            Role::AutoProxy => write!(f, "auto_proxy"),
            Role::SimulatedProxy => write!(f, "simulated_proxy"),
        }
    }
}

/// The driver for whichever role an entity currently has
#[derive(Debug)]
pub enum Driver<I, S> {
    Authority(AuthorityDriver<I, S>),
    AutoProxy(AutoProxyDriver<I, S>),
    SimulatedProxy(SimulatedProxyDriver<S>),
}

impl<I: InputPayload, S: SimState> Driver<I, S> {
    /// Build a fresh driver for `role` starting from `initial`
    pub fn new(role: Role, config: &PredictionConfig, initial: S) -> Self {
        match role {
            Role::Authority => Driver::Authority(AuthorityDriver::new(config, initial)),
            Role::AutoProxy => Driver::AutoProxy(AutoProxyDriver::new(config, initial)),
            Role::SimulatedProxy => Driver::SimulatedProxy(SimulatedProxyDriver::new(initial)),
        }
    }

    /// Role this driver implements
    pub fn role(&self) -> Role {
        match self {
            Driver::Authority(_) => Role::Authority,
            Driver::AutoProxy(_) => Role::AutoProxy,
            Driver::SimulatedProxy(_) => Role::SimulatedProxy,
        }
    }

    /// Run one real-time tick
    pub fn tick<Sim, Src>(
        &mut self,
        dt: f64,
        link: &Link<I, S>,
        simulator: &mut Sim,
        source: &mut Src,
    ) -> Result<()>
    where
        Sim: Simulator<I, S>,
        Src: InputSource<I, S>,
    {
        match self {
            Driver::Authority(driver) => driver.tick(dt, link, simulator),
            Driver::AutoProxy(driver) => driver.tick(dt, link, simulator, source),
            Driver::SimulatedProxy(driver) => driver.tick(link, simulator),
        }
    }

    /// Body to render, `alpha` of the way from the previous tick to the current one
    pub fn generate_output(&self, alpha: f64) -> S {
        match self {
            Driver::Authority(driver) => driver.generate_output(alpha),
            Driver::AutoProxy(driver) => driver.generate_output(alpha),
            Driver::SimulatedProxy(driver) => driver.generate_output(alpha),
        }
    }

    /// Authority driver, if that is the current role
    pub fn as_authority(&self) -> Option<&AuthorityDriver<I, S>> {
        match self {
            Driver::Authority(driver) => Some(driver),
            _ => None,
        }
    }

    /// Predicting driver, if that is the current role
    pub fn as_auto_proxy(&self) -> Option<&AutoProxyDriver<I, S>> {
        match self {
            Driver::AutoProxy(driver) => Some(driver),
            _ => None,
        }
    }

    /// Observer driver, if that is the current role
    pub fn as_simulated_proxy(&self) -> Option<&SimulatedProxyDriver<S>> {
        match self {
            Driver::SimulatedProxy(driver) => Some(driver),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_matches_role() {
        let config = PredictionConfig::default();
        for role in [Role::Authority, Role::AutoProxy, Role::SimulatedProxy] {
            let driver: Driver<u8, f64> = Driver::new(role, &config, 1.0);
            assert_eq!(driver.role(), role);
            assert_eq!(driver.generate_output(0.5), 1.0);
        }
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::AutoProxy.to_string(), "auto_proxy");
    }
}
