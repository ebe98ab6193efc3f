//! Authority driver
//!
//! Consumes remote input at a steady pace, runs the ground-truth
//! simulation, and feeds back both periodic state and per-tick time
//! dilation advice.

use crate::input_buffer::{AuthorityBufferStats, AuthorityInputBuffer};
use crate::link::Link;
use crate::time_dilation::TimeDilationController;
use crate::transport::Outbound;
use crate::Result;
use recoil_core::{
    EventMask, InputPacket, InputPayload, PacketNumber, PredictionConfig, SeqCounter, SimState,
    Simulator, StateSnapshot, TickNumber,
};
use tracing::{debug, error, trace};

/// Ground-truth simulation for one entity
#[derive(Debug)]
pub struct AuthorityDriver<I, S> {
    sync_frames: u32,
    desired_input_buffer_size: usize,
    input: AuthorityInputBuffer<I>,
    dilation: TimeDilationController,
    ticks: SeqCounter<TickNumber>,
    /// Input consumed by the most recent simulated tick
    last_input: Option<InputPacket<I>>,
    previous_body: S,
    current: StateSnapshot<S>,
    /// Events raised since the last state emission
    pending_events: EventMask,
    held_ticks: u64,
}

impl<I: InputPayload, S: SimState> AuthorityDriver<I, S> {
    /// Create a driver starting from `initial`
    pub fn new(config: &PredictionConfig, initial: S) -> Self {
        Self {
            sync_frames: config.sync_frames.max(1),
            desired_input_buffer_size: config.desired_input_buffer_size,
            input: AuthorityInputBuffer::new(
                config.desired_input_buffer_size,
                config.dropped_packet_memory_ticks,
            ),
            dilation: TimeDilationController::new(config.time_dilation_alpha),
            ticks: SeqCounter::new(),
            last_input: None,
            previous_body: initial.clone(),
            current: StateSnapshot::new(TickNumber::INVALID, PacketNumber::INVALID, initial),
            pending_events: EventMask::empty(),
            held_ticks: 0,
        }
    }

    /// Run one real-time tick
    pub fn tick<Sim>(&mut self, dt: f64, link: &Link<I, S>, simulator: &mut Sim) -> Result<()>
    where
        Sim: Simulator<I, S>,
    {
        let accepted = self.input.queue_remote(link.take_inbound_inputs());
        if accepted > 0 {
            trace!(accepted, buffered = self.input.buffer_size(), "Queued remote input");
        }
        match self.input.consume() {
            Some(packet) => {
                self.last_input = Some(packet);
                self.simulate(dt, link, simulator);
            }
            None if self.last_input.is_some() => {
                debug!(
                    packet = %self.input.last_consumed(),
                    "Input buffer starved, reusing last input"
                );
                self.simulate(dt, link, simulator);
            }
            None => {
                self.held_ticks += 1;
                trace!(
                    buffered = self.input.buffer_size(),
                    target = self.input.target_size(),
                    "Holding until input buffer fills"
                );
            }
        }

        // Occupancy left after this tick's consumption
        let desired = self.desired_input_buffer_size + self.input.num_recently_dropped() as usize;
        let control = self.dilation.update(self.input.buffer_size(), desired);
        link.send(Outbound::Control(control));

        self.input.advance_tick();
        Ok(())
    }

    fn simulate<Sim>(&mut self, dt: f64, link: &Link<I, S>, simulator: &mut Sim)
    where
        Sim: Simulator<I, S>,
    {
        let Some(packet) = self.last_input.as_ref() else {
            return;
        };
        if self.ticks.is_exhausted() {
            error!("Tick numbers exhausted, authority can no longer advance");
            return;
        }

        let tick = self.ticks.advance();
        let mut events = EventMask::empty();
        let body = simulator.simulate(dt, &self.current.body, &packet.payload, &mut events);

        let next = StateSnapshot {
            tick_number: tick,
            input_packet_number: packet.packet_number,
            body,
            events,
        };
        self.previous_body = std::mem::replace(&mut self.current, next).body;

        if !events.is_empty() {
            self.pending_events.merge(events);
            simulator.dispatch_events(events);
        }
        link.publish_local_state(self.current.clone());

        if tick.0 % self.sync_frames == 0 {
            let mut snapshot = self.current.clone();
            snapshot.events = self.pending_events.take();
            trace!(tick = %tick, packet = %snapshot.input_packet_number, "Emitting authority state");
            link.send(Outbound::AuthorityState(snapshot));
        }
    }

    /// Interpolated body between the last two simulated ticks
    pub fn generate_output(&self, alpha: f64) -> S {
        self.previous_body
            .interpolate(&self.current.body, alpha.clamp(0.0, 1.0))
    }

    /// Most recent ground-truth snapshot
    pub fn current(&self) -> &StateSnapshot<S> {
        &self.current
    }

    /// Last suggested time dilation
    pub fn suggested_time_dilation(&self) -> f32 {
        self.dilation.suggested()
    }

    /// Packets waiting in the input buffer
    pub fn buffer_size(&self) -> usize {
        self.input.buffer_size()
    }

    /// Ticks skipped while waiting for the buffer to fill
    pub fn held_ticks(&self) -> u64 {
        self.held_ticks
    }

    /// Input buffer counters
    pub fn buffer_stats(&self) -> AuthorityBufferStats {
        self.input.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Integrates the input as a velocity; raises event 0 whenever the body lands on an odd value
    struct Integrator {
        dispatched: Vec<EventMask>,
    }

    impl Simulator<i32, f64> for Integrator {
        fn simulate(&mut self, _dt: f64, prev: &f64, input: &i32, events: &mut EventMask) -> f64 {
            let next = prev + f64::from(*input);
            if next as i64 % 2 == 1 {
                events.raise(0);
            }
            next
        }

        fn rewind(&mut self, _state: &f64) {}

        fn dispatch_events(&mut self, events: EventMask) {
            self.dispatched.push(events);
        }
    }

    fn packets(range: std::ops::Range<u32>) -> Vec<InputPacket<i32>> {
        range.map(|n| InputPacket::new(PacketNumber(n), 1)).collect()
    }

    fn states(link: &Link<i32, f64>) -> Vec<StateSnapshot<f64>> {
        link.drain_outbox()
            .into_iter()
            .filter_map(|m| match m {
                Outbound::AuthorityState(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_holds_until_buffer_fills() {
        let config = PredictionConfig::default();
        let mut driver: AuthorityDriver<i32, f64> = AuthorityDriver::new(&config, 0.0);
        let link = Link::new();
        let mut sim = Integrator { dispatched: vec![] };

        link.deliver_inputs(packets(0..2));
        driver.tick(1.0, &link, &mut sim).unwrap();
        assert_eq!(driver.held_ticks(), 1);
        assert!(!driver.current().is_valid());

        link.deliver_inputs(packets(2..3));
        driver.tick(1.0, &link, &mut sim).unwrap();
        assert_eq!(driver.current().tick_number, TickNumber(0));
        assert_eq!(driver.current().input_packet_number, PacketNumber(0));
        assert_eq!(driver.buffer_size(), 2);
    }

    #[test]
    fn test_emits_state_on_sync_cadence_and_control_every_tick() {
        let config = PredictionConfig::default().with_desired_input_buffer_size(1);
        let mut driver: AuthorityDriver<i32, f64> = AuthorityDriver::new(&config, 0.0);
        let link = Link::new();
        let mut sim = Integrator { dispatched: vec![] };

        link.deliver_inputs(packets(0..11));
        for _ in 0..11 {
            driver.tick(1.0, &link, &mut sim).unwrap();
        }
        let outbound = link.drain_outbox();
        let controls = outbound
            .iter()
            .filter(|m| matches!(m, Outbound::Control(_)))
            .count();
        let ticks: Vec<u32> = outbound
            .iter()
            .filter_map(|m| match m {
                Outbound::AuthorityState(s) => Some(s.tick_number.0),
                _ => None,
            })
            .collect();

        assert_eq!(controls, 11);
        assert_eq!(ticks, vec![0, 5, 10]);
    }

    #[test]
    fn test_starvation_reuses_last_input() {
        let config = PredictionConfig::default().with_desired_input_buffer_size(1);
        let mut driver: AuthorityDriver<i32, f64> = AuthorityDriver::new(&config, 0.0);
        let link = Link::new();
        let mut sim = Integrator { dispatched: vec![] };

        link.deliver_inputs(packets(0..1));
        driver.tick(1.0, &link, &mut sim).unwrap();
        driver.tick(1.0, &link, &mut sim).unwrap();

        assert_eq!(driver.current().tick_number, TickNumber(1));
        assert_eq!(driver.current().input_packet_number, PacketNumber(0));
        assert_eq!(driver.current().body, 2.0);
        assert_eq!(driver.buffer_stats().starved, 1);
    }

    #[test]
    fn test_events_accumulate_between_emissions() {
        let config = PredictionConfig::default().with_desired_input_buffer_size(1);
        let mut driver: AuthorityDriver<i32, f64> = AuthorityDriver::new(&config, 0.0);
        let link = Link::new();
        let mut sim = Integrator { dispatched: vec![] };

        link.deliver_inputs(packets(0..6));
        for _ in 0..6 {
            driver.tick(1.0, &link, &mut sim).unwrap();
        }

        // Bodies 1..=6; odd bodies raise event 0 on ticks 0, 2 and 4
        let emitted = states(&link);
        assert_eq!(emitted.len(), 2);
        assert!(emitted[0].events.contains(0));
        assert!(emitted[1].events.contains(0));
        assert_eq!(sim.dispatched.len(), 3);
    }

    #[test]
    fn test_overfull_buffer_suggests_slow_down() {
        let config = PredictionConfig::default().with_time_dilation_alpha(0.5);
        let mut driver: AuthorityDriver<i32, f64> = AuthorityDriver::new(&config, 0.0);
        let link = Link::new();
        let mut sim = Integrator { dispatched: vec![] };

        // Keep six packets queued ahead of consumption every tick
        link.deliver_inputs(packets(0..6));
        for n in 6..46 {
            driver.tick(1.0, &link, &mut sim).unwrap();
            link.deliver_inputs(packets(n..n + 1));
        }
        assert!(driver.suggested_time_dilation() < -0.99);
    }

    #[test]
    fn test_dilation_measures_buffer_after_consumption() {
        let config = PredictionConfig::default().with_time_dilation_alpha(0.5);
        let mut driver: AuthorityDriver<i32, f64> = AuthorityDriver::new(&config, 0.0);
        let link = Link::new();
        let mut sim = Integrator { dispatched: vec![] };

        // One packet in per tick: three queued before consuming, two after
        link.deliver_inputs(packets(0..2));
        for n in 2..300 {
            link.deliver_inputs(packets(n..n + 1));
            driver.tick(1.0, &link, &mut sim).unwrap();
        }
        assert_eq!(driver.buffer_size(), 2);
        assert!(driver.suggested_time_dilation() > 0.99);
    }

    #[test]
    fn test_publishes_latest_state() {
        let config = PredictionConfig::default().with_desired_input_buffer_size(1);
        let mut driver: AuthorityDriver<i32, f64> = AuthorityDriver::new(&config, 0.0);
        let link = Link::new();
        let mut sim = Integrator { dispatched: vec![] };

        link.deliver_inputs(packets(0..2));
        driver.tick(1.0, &link, &mut sim).unwrap();
        driver.tick(1.0, &link, &mut sim).unwrap();

        let latest = link.latest_local_state().unwrap();
        assert_eq!(latest.tick_number, TickNumber(1));
        assert_eq!(driver.generate_output(0.5), 1.5);
    }
}
