//! Observer driver: snaps to the latest authoritative state
//!
//! There is no local simulation and no input. Each newer snapshot is
//! applied to the body directly and its events are dispatched once.
//! Rendering shows the latest snapshot as-is; buffering a few snapshots
//! to interpolate between them would trade latency for smoothness.

use crate::link::Link;
use crate::Result;
use recoil_core::{PacketNumber, SimState, Simulator, StateSnapshot, TickNumber};
use tracing::trace;

/// Renders authoritative state for an entity this peer does not control
#[derive(Debug)]
pub struct SimulatedProxyDriver<S> {
    latest: StateSnapshot<S>,
    applied: u64,
}

impl<S: SimState> SimulatedProxyDriver<S> {
    /// Create a driver showing `initial` until the first snapshot arrives
    pub fn new(initial: S) -> Self {
        Self {
            latest: StateSnapshot::new(TickNumber::INVALID, PacketNumber::INVALID, initial),
            applied: 0,
        }
    }

    /// Apply the latest authoritative snapshot if it is newer than the last one
    pub fn tick<I, Sim>(&mut self, link: &Link<I, S>, simulator: &mut Sim) -> Result<()>
    where
        I: Clone,
        Sim: Simulator<I, S>,
    {
        let Some(snapshot) = link.latest_authority_state() else {
            return Ok(());
        };
        let is_newer = snapshot.tick_number.is_valid()
            && (!self.latest.tick_number.is_valid()
                || snapshot.tick_number > self.latest.tick_number);
        if !is_newer {
            return Ok(());
        }

        trace!(tick = %snapshot.tick_number, "Snapping to authority state");
        simulator.rewind(&snapshot.body);
        if !snapshot.events.is_empty() {
            simulator.dispatch_events(snapshot.events);
        }
        link.publish_local_state(snapshot.clone());
        self.latest = snapshot;
        self.applied += 1;
        Ok(())
    }

    /// Latest authoritative body; `alpha` is ignored
    pub fn generate_output(&self, _alpha: f64) -> S {
        self.latest.body.clone()
    }

    /// Most recently applied snapshot
    pub fn latest(&self) -> &StateSnapshot<S> {
        &self.latest
    }

    /// Number of snapshots applied
    pub fn applied(&self) -> u64 {
        self.applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recoil_core::EventMask;

    #[derive(Default)]
    struct Body {
        rewound: Vec<f64>,
        dispatched: Vec<EventMask>,
    }

    impl Simulator<u8, f64> for Body {
        fn simulate(&mut self, _dt: f64, prev: &f64, _input: &u8, _events: &mut EventMask) -> f64 {
            *prev
        }

        fn rewind(&mut self, state: &f64) {
            self.rewound.push(*state);
        }

        fn dispatch_events(&mut self, events: EventMask) {
            self.dispatched.push(events);
        }
    }

    #[test]
    fn test_snaps_once_per_snapshot() {
        let mut driver = SimulatedProxyDriver::new(0.0);
        let link: Link<u8, f64> = Link::new();
        let mut body = Body::default();

        driver.tick(&link, &mut body).unwrap();
        assert_eq!(driver.generate_output(0.5), 0.0);

        let mut snapshot = StateSnapshot::new(TickNumber(5), PacketNumber(3), 7.5);
        snapshot.events.raise(1);
        link.deliver_authority_state(snapshot);

        driver.tick(&link, &mut body).unwrap();
        driver.tick(&link, &mut body).unwrap();

        assert_eq!(body.rewound, vec![7.5]);
        assert_eq!(body.dispatched.len(), 1);
        assert!(body.dispatched[0].contains(1));
        assert_eq!(driver.generate_output(0.1), 7.5);
        assert_eq!(driver.applied(), 1);
    }

    #[test]
    fn test_older_snapshot_is_ignored() {
        let mut driver = SimulatedProxyDriver::new(0.0);
        let link: Link<u8, f64> = Link::new();
        let mut body = Body::default();

        link.deliver_authority_state(StateSnapshot::new(TickNumber(10), PacketNumber(9), 2.0));
        driver.tick(&link, &mut body).unwrap();
        link.deliver_authority_state(StateSnapshot::new(TickNumber(5), PacketNumber(4), 1.0));
        driver.tick(&link, &mut body).unwrap();

        assert_eq!(driver.latest().tick_number, TickNumber(10));
        assert_eq!(driver.generate_output(1.0), 2.0);
    }
}
