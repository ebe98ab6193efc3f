//! Predicting client driver
//!
//! Produces input, simulates ahead of the authority, records every
//! predicted state, and reconciles against authoritative snapshots as
//! they arrive. Rewinds schedule forced ticks on the link; those run at
//! the start of the next real tick, replay buffered input, and never
//! reconcile.

use crate::input_buffer::{ProducerInputBuffer, SlidingInputWindow};
use crate::link::Link;
use crate::reconciliation::{ReconcileOutcome, ReconcileStats, Reconciler};
use crate::transport::Outbound;
use crate::Result;
use recoil_core::{
    EventMask, InputPacket, InputPayload, InputSource, PacketNumber, PredictionConfig,
    SeqCounter, SimState, Simulator, StateHistory, StateSnapshot, TickNumber,
};
use tracing::{debug, error, trace, warn};

/// Client-side prediction for the locally controlled entity
#[derive(Debug)]
pub struct AutoProxyDriver<I, S> {
    input: ProducerInputBuffer<I>,
    window: SlidingInputWindow<I>,
    history: StateHistory<S>,
    reconciler: Reconciler,
    ticks: SeqCounter<TickNumber>,
    packets: SeqCounter<PacketNumber>,
    /// Body before the most recent tick, for interpolation
    last_body: S,
    current: StateSnapshot<S>,
}

impl<I: InputPayload, S: SimState> AutoProxyDriver<I, S> {
    /// Create a driver starting from `initial`
    pub fn new(config: &PredictionConfig, initial: S) -> Self {
        Self {
            input: ProducerInputBuffer::with_capacity(config.history_capacity.max(1)),
            window: SlidingInputWindow::new(config.input_window_size.max(1)),
            history: StateHistory::new(config.history_capacity.max(1)),
            reconciler: Reconciler::new(
                config.forward_prediction_frames,
                config.divergence_error_threshold,
            ),
            ticks: SeqCounter::new(),
            packets: SeqCounter::new(),
            last_body: initial.clone(),
            current: StateSnapshot::new(TickNumber::INVALID, PacketNumber::INVALID, initial),
        }
    }

    /// Run pending forced ticks, then one real-time tick
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
        let forced = link.take_forced_ticks();
        if forced > 0 {
            debug!(
                forced,
                buffered = self.input.buffer_size(),
                from = %self.current.tick_number,
                "Resimulating"
            );
        }
        for _ in 0..forced {
            self.step(dt, true, link, simulator, source)?;
        }
        self.step(dt, false, link, simulator, source)
    }

    fn step<Sim, Src>(
        &mut self,
        dt: f64,
        forced: bool,
        link: &Link<I, S>,
        simulator: &mut Sim,
        source: &mut Src,
    ) -> Result<()>
    where
        Sim: Simulator<I, S>,
        Src: InputSource<I, S>,
    {
        if self.ticks.is_exhausted() {
            error!("Tick numbers exhausted, prediction can no longer advance");
            return Ok(());
        }
        self.last_body = self.current.body.clone();

        // Forced ticks replay buffered input and only sample more once it runs out
        if !forced || self.input.buffer_size() == 0 {
            self.produce_input(link, source);
        }

        let packet = self.input.consume_local()?;
        let tick = self.ticks.advance();
        let mut events = EventMask::empty();
        let body = simulator.simulate(dt, &self.current.body, &packet.payload, &mut events);
        self.current = StateSnapshot {
            tick_number: tick,
            input_packet_number: packet.packet_number,
            body,
            events,
        };

        if let Some(evicted) = self.history.push(self.current.clone()) {
            warn!(
                tick = %evicted.tick_number,
                "Prediction history full, dropping oldest unacknowledged state"
            );
        }
        link.publish_local_state(self.current.clone());

        if forced {
            return Ok(());
        }
        if !events.is_empty() {
            simulator.dispatch_events(events);
        }

        let Some(authority) = link.latest_authority_state() else {
            return Ok(());
        };
        let outcome = self.reconciler.reconcile(
            &authority,
            &self.current,
            &mut self.history,
            &mut self.input,
        );
        if let ReconcileOutcome::Rewind { resimulate, .. } = outcome {
            self.rewind_to(authority, simulator);
            link.request_forced_ticks(resimulate);
        }
        Ok(())
    }

    fn produce_input<Src>(&mut self, link: &Link<I, S>, source: &mut Src)
    where
        Src: InputSource<I, S>,
    {
        let packet = InputPacket::new(
            self.packets.advance(),
            source.produce_input(&self.current.body),
        );
        trace!(packet = %packet.packet_number, "Produced input");

        self.window.push(packet.clone());
        link.send(Outbound::InputWindow(self.window.to_vec()));
        if let Some(evicted) = self.input.queue_local(packet) {
            warn!(
                packet = %evicted.packet_number,
                "Input buffer full, dropping oldest unacknowledged input"
            );
        }
    }

    /// Adopt an authoritative snapshot as the current state
    fn rewind_to<Sim>(&mut self, authority: StateSnapshot<S>, simulator: &mut Sim)
    where
        Sim: Simulator<I, S>,
    {
        simulator.rewind(&authority.body);
        self.ticks.reset_to(authority.tick_number.next());
        self.current = authority;
    }

    /// Interpolated body between the last two predicted ticks
    pub fn generate_output(&self, alpha: f64) -> S {
        self.last_body
            .interpolate(&self.current.body, alpha.clamp(0.0, 1.0))
    }

    /// Most recent predicted snapshot
    pub fn current(&self) -> &StateSnapshot<S> {
        &self.current
    }

    /// Last tick the authority confirmed
    pub fn last_acked(&self) -> TickNumber {
        self.reconciler.last_acked()
    }

    /// Reconciliation state and counters
    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Reconciliation counters
    pub fn stats(&self) -> ReconcileStats {
        self.reconciler.stats()
    }

    /// Produced input not yet consumed locally
    pub fn buffer_size(&self) -> usize {
        self.input.buffer_size()
    }

    /// Produced input not yet confirmed by the authority
    pub fn unacked_inputs(&self) -> usize {
        self.input.len()
    }

    /// Predicted snapshots awaiting confirmation
    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciliation::ReconcileState;
    use recoil_core::INVALID_SEQ;

    struct Counter;

    impl Simulator<i32, f64> for Counter {
        fn simulate(&mut self, _dt: f64, prev: &f64, input: &i32, _events: &mut EventMask) -> f64 {
            prev + f64::from(*input)
        }

        fn rewind(&mut self, _state: &f64) {}
    }

    struct Constant(i32);

    impl InputSource<i32, f64> for Constant {
        fn produce_input(&mut self, _state: &f64) -> i32 {
            self.0
        }
    }

    fn windows(link: &Link<i32, f64>) -> Vec<Vec<u32>> {
        link.drain_outbox()
            .into_iter()
            .filter_map(|m| match m {
                Outbound::InputWindow(w) => Some(w.iter().map(|p| p.packet_number.0).collect()),
                _ => None,
            })
            .collect()
    }

    fn run(driver: &mut AutoProxyDriver<i32, f64>, link: &Link<i32, f64>, ticks: usize) {
        for _ in 0..ticks {
            driver.tick(1.0, link, &mut Counter, &mut Constant(1)).unwrap();
        }
    }

    #[test]
    fn test_emits_sliding_window() {
        let config = PredictionConfig::default();
        let mut driver = AutoProxyDriver::new(&config, 0.0);
        let link = Link::new();

        run(&mut driver, &link, 4);
        assert_eq!(
            windows(&link),
            vec![vec![0], vec![0, 1], vec![0, 1, 2], vec![1, 2, 3]]
        );
        assert_eq!(driver.current().tick_number, TickNumber(3));
        assert_eq!(driver.current().body, 4.0);
        assert_eq!(driver.history_len(), 4);
    }

    #[test]
    fn test_matching_authority_acks() {
        let config = PredictionConfig::default();
        let mut driver = AutoProxyDriver::new(&config, 0.0);
        let link = Link::new();

        run(&mut driver, &link, 5);
        link.deliver_authority_state(StateSnapshot::new(TickNumber(2), PacketNumber(2), 3.0));
        run(&mut driver, &link, 1);

        assert_eq!(driver.last_acked(), TickNumber(2));
        assert_eq!(driver.reconciler().state(), ReconcileState::Synced);
        assert_eq!(driver.unacked_inputs(), 3);
        assert_eq!(link.pending_forced_ticks(), 0);
    }

    #[test]
    fn test_divergence_schedules_forced_ticks() {
        let config = PredictionConfig::default().with_forward_prediction_frames(5);
        let mut driver = AutoProxyDriver::new(&config, 0.0);
        let link = Link::new();

        run(&mut driver, &link, 10);
        windows(&link);

        // Authority saw tick 5 end at 100 instead of 6
        link.deliver_authority_state(StateSnapshot::new(TickNumber(5), PacketNumber(5), 100.0));
        run(&mut driver, &link, 1);
        assert_eq!(driver.current().tick_number, TickNumber(5));
        assert_eq!(driver.current().body, 100.0);
        assert_eq!(link.pending_forced_ticks(), 5);
        assert_eq!(driver.buffer_size(), 5);

        // Forced ticks replay packets 6..=10 without emitting, then tick 11 is real
        windows(&link);
        run(&mut driver, &link, 1);
        assert_eq!(windows(&link), vec![vec![9, 10, 11]]);
        assert_eq!(driver.current().tick_number, TickNumber(11));
        assert_eq!(driver.current().body, 106.0);
        assert_eq!(driver.stats().divergences, 1);
    }

    #[test]
    fn test_forced_ticks_produce_input_when_buffer_runs_dry() {
        let config = PredictionConfig::default();
        let mut driver = AutoProxyDriver::new(&config, 0.0);
        let link = Link::new();

        run(&mut driver, &link, 3);
        link.deliver_authority_state(StateSnapshot::new(TickNumber(8), PacketNumber(1), 50.0));
        run(&mut driver, &link, 1);
        assert_eq!(driver.reconciler().state(), ReconcileState::Ahead);
        assert_eq!(link.pending_forced_ticks(), 10);

        windows(&link);
        run(&mut driver, &link, 1);
        // Packets 2 and 3 replay; 8 more are produced during forced ticks, one for the real tick
        assert_eq!(windows(&link).len(), 9);
        assert_eq!(driver.current().tick_number, TickNumber(19));
        assert_eq!(driver.current().body, 61.0);
    }

    #[test]
    fn test_stops_when_tick_numbers_run_out() {
        let config = PredictionConfig::default();
        let mut driver = AutoProxyDriver::new(&config, 0.0);
        let link = Link::new();

        run(&mut driver, &link, 3);
        let last = TickNumber(INVALID_SEQ - 1);
        link.deliver_authority_state(StateSnapshot::new(
            TickNumber(INVALID_SEQ - 2),
            PacketNumber(1),
            50.0,
        ));
        run(&mut driver, &link, 1);

        // Only one forced tick fits before the sentinel
        run(&mut driver, &link, 2);
        assert_eq!(driver.current().tick_number, last);
        assert_eq!(driver.current().body, 51.0);
        assert_eq!(link.latest_local_state().unwrap().tick_number, last);
    }

    #[test]
    fn test_unacked_input_is_bounded_by_history_capacity() {
        let config = PredictionConfig {
            history_capacity: 8,
            ..Default::default()
        };
        let mut driver = AutoProxyDriver::new(&config, 0.0);
        let link = Link::new();

        run(&mut driver, &link, 20);
        assert_eq!(driver.unacked_inputs(), 8);
        assert_eq!(driver.history_len(), 8);
        assert_eq!(driver.current().tick_number, TickNumber(19));
    }

    #[test]
    fn test_stale_authority_is_ignored() {
        let config = PredictionConfig::default();
        let mut driver = AutoProxyDriver::new(&config, 0.0);
        let link = Link::new();

        run(&mut driver, &link, 5);
        link.deliver_authority_state(StateSnapshot::new(TickNumber(2), PacketNumber(2), 3.0));
        run(&mut driver, &link, 3);
        assert_eq!(driver.stats().acks, 1);
        assert_eq!(link.pending_forced_ticks(), 0);
    }

    #[test]
    fn test_output_interpolates_last_two_ticks() {
        let config = PredictionConfig::default();
        let mut driver = AutoProxyDriver::new(&config, 0.0);
        let link = Link::new();

        run(&mut driver, &link, 2);
        assert_eq!(driver.generate_output(0.0), 1.0);
        assert_eq!(driver.generate_output(0.25), 1.25);
        assert_eq!(driver.generate_output(1.0), 2.0);
    }
}
