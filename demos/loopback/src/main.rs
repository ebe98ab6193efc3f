//! Loopback Demo
//!
//! Runs an authority and a predicting client on their own simulation
//! threads. The main thread plays the network: it flushes both endpoints
//! into a wire that delays, jitters and drops messages, then delivers
//! whatever is due.
//!
//! ```text
//! cargo run -p loopback -- [config.ron]
//! RUST_LOG=recoil_netcode=debug cargo run -p loopback
//! ```

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use recoil_core::{EventMask, InputSource, Interpolate, NoInput, PredictionConfig, Simulator};
use recoil_netcode::{Driver, Endpoint, MessageSink, PredictionModel, Role, TickStepper};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const TICK_DT: f64 = 1.0 / 60.0;
const RUN_FOR: Duration = Duration::from_secs(5);
const LATENCY: Duration = Duration::from_millis(40);
const JITTER_MS: u64 = 15;
const LOSS: f64 = 0.1;

const EVENT_BOUNCE: u8 = 0;

/// A craft sliding along a rail between two walls
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
struct Craft {
    x: f64,
    vx: f64,
}

impl Interpolate for Craft {
    fn interpolate(&self, next: &Self, alpha: f64) -> Self {
        Craft {
            x: self.x.interpolate(&next.x, alpha),
            vx: self.vx.interpolate(&next.vx, alpha),
        }
    }
}

#[derive(Default)]
struct Rail {
    bounces: u64,
}

impl Simulator<f32, Craft> for Rail {
    fn simulate(&mut self, dt: f64, prev: &Craft, thrust: &f32, events: &mut EventMask) -> Craft {
        let mut vx = (prev.vx + f64::from(*thrust) * 8.0 * dt) * 0.99;
        let mut x = prev.x + vx * dt;
        if x.abs() > 10.0 {
            x = x.clamp(-10.0, 10.0);
            vx = -vx;
            events.raise(EVENT_BOUNCE);
        }
        Craft { x, vx }
    }

    fn rewind(&mut self, _state: &Craft) {}

    fn dispatch_events(&mut self, events: EventMask) {
        if events.contains(EVENT_BOUNCE) {
            self.bounces += 1;
        }
    }
}

/// Steers toward a target that flips side every two seconds
#[derive(Default)]
struct Autopilot {
    produced: u32,
}

impl InputSource<f32, Craft> for Autopilot {
    fn produce_input(&mut self, state: &Craft) -> f32 {
        let target = if (self.produced / 120) % 2 == 0 { 8.0 } else { -8.0 };
        self.produced += 1;
        if state.x < target {
            1.0
        } else {
            -1.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Inputs,
    State,
    Control,
}

struct InFlight {
    due: Instant,
    kind: Kind,
    bytes: Vec<u8>,
}

/// One direction of the simulated network
///
/// Input windows and control packets may be lost; authority state is
/// always delivered. Delivery order is preserved within each kind.
struct LossyWire {
    rng: StdRng,
    in_flight: Vec<InFlight>,
    last_due: [Option<Instant>; 3],
    sent: u64,
    dropped: u64,
}

impl LossyWire {
    fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            in_flight: Vec::new(),
            last_due: [None; 3],
            sent: 0,
            dropped: 0,
        }
    }

    fn send(&mut self, kind: Kind, payload: &[u8]) {
        self.sent += 1;
        if kind != Kind::State && self.rng.gen_bool(LOSS) {
            self.dropped += 1;
            return;
        }

        let jitter = Duration::from_millis(self.rng.gen_range(0..=JITTER_MS));
        let mut due = Instant::now() + LATENCY + jitter;
        let slot = &mut self.last_due[kind as usize];
        if let Some(previous) = *slot {
            due = due.max(previous);
        }
        *slot = Some(due);

        self.in_flight.push(InFlight {
            due,
            kind,
            bytes: payload.to_vec(),
        });
    }

    fn take_due(&mut self, now: Instant) -> Vec<InFlight> {
        let (due, pending): (Vec<_>, Vec<_>) =
            self.in_flight.drain(..).partition(|m| m.due <= now);
        self.in_flight = pending;
        due
    }
}

impl MessageSink for LossyWire {
    type Error = Infallible;

    fn emit_input_packets(&mut self, payload: &[u8]) -> Result<(), Infallible> {
        self.send(Kind::Inputs, payload);
        Ok(())
    }

    fn emit_authority_state(&mut self, payload: &[u8]) -> Result<(), Infallible> {
        self.send(Kind::State, payload);
        Ok(())
    }

    fn emit_control_packet(&mut self, payload: &[u8]) -> Result<(), Infallible> {
        self.send(Kind::Control, payload);
        Ok(())
    }
}

fn deliver(
    messages: Vec<InFlight>,
    to: &Endpoint<f32, Craft>,
) -> recoil_netcode::Result<()> {
    for message in messages {
        match message.kind {
            Kind::Inputs => {
                to.receive_input_packets(&message.bytes)?;
            }
            Kind::State => to.receive_authority_state(&message.bytes)?,
            Kind::Control => to.receive_control_packet(&message.bytes)?,
        }
    }
    Ok(())
}

type Server = PredictionModel<f32, Craft, Rail, NoInput>;
type Client = PredictionModel<f32, Craft, Rail, Autopilot>;

fn run_server(mut server: Server, running: Arc<AtomicBool>) -> recoil_netcode::Result<Server> {
    let tick = Duration::from_secs_f64(TICK_DT);
    let mut next = Instant::now();
    while running.load(Ordering::Acquire) {
        server.tick(TICK_DT)?;
        next += tick;
        thread::sleep(next.saturating_duration_since(Instant::now()));
    }
    Ok(server)
}

fn run_client(mut client: Client, running: Arc<AtomicBool>) -> recoil_netcode::Result<Client> {
    let endpoint = client.endpoint();
    let mut clock = TickStepper::new(TICK_DT, client.config());
    let mut last_frame = Instant::now();
    let mut last_report = Instant::now();

    while running.load(Ordering::Acquire) {
        thread::sleep(Duration::from_millis(7));
        let now = Instant::now();
        let elapsed = now.duration_since(last_frame).as_secs_f64();
        last_frame = now;

        for _ in 0..clock.advance(elapsed, endpoint.time_dilation()) {
            client.tick(clock.tick_dt())?;
        }
        let shown = client.generate_output(clock.alpha())?;

        if now.duration_since(last_report) >= Duration::from_secs(1) {
            last_report = now;
            info!(
                x = %format!("{:.2}", shown.x),
                dilation = %format!("{:+.3}", endpoint.time_dilation()),
                "Client frame"
            );
        }
    }
    Ok(client)
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => PredictionConfig::load(path)?,
        None => PredictionConfig::default(),
    };
    info!("Starting loopback with {config:?}");

    let mut server: Server = PredictionModel::new(config.clone(), Rail::default(), NoInput)?;
    let mut client: Client = PredictionModel::new(config, Rail::default(), Autopilot::default())?;
    server.set_role(Role::Authority);
    client.set_role(Role::AutoProxy);

    let server_endpoint = server.endpoint();
    let client_endpoint = client.endpoint();
    let running = Arc::new(AtomicBool::new(true));

    let server_thread = thread::spawn({
        let running = Arc::clone(&running);
        move || run_server(server, running)
    });
    let client_thread = thread::spawn({
        let running = Arc::clone(&running);
        move || run_client(client, running)
    });

    let mut to_server = LossyWire::new(1);
    let mut to_client = LossyWire::new(2);
    let started = Instant::now();
    while started.elapsed() < RUN_FOR {
        client_endpoint.flush(&mut to_server)?;
        server_endpoint.flush(&mut to_client)?;

        let now = Instant::now();
        deliver(to_server.take_due(now), &server_endpoint)?;
        deliver(to_client.take_due(now), &client_endpoint)?;
        thread::sleep(Duration::from_millis(2));
    }
    running.store(false, Ordering::Release);

    let server = server_thread
        .join()
        .map_err(|_| "server thread panicked")??;
    let client = client_thread
        .join()
        .map_err(|_| "client thread panicked")??;

    debug!(
        to_server_dropped = to_server.dropped,
        to_client_dropped = to_client.dropped,
        "Wire totals"
    );
    println!("=== Loopback Summary ===");
    println!(
        "Wire: {} sent / {} dropped to authority, {} sent / {} dropped to client",
        to_server.sent, to_server.dropped, to_client.sent, to_client.dropped
    );
    if let Some(authority) = server.driver().and_then(Driver::as_authority) {
        let stats = authority.buffer_stats();
        println!(
            "Authority: tick {}, held {} ticks, received {}, stale {}, lost {}, late {}, starved {}, bounces {}",
            authority.current().tick_number,
            authority.held_ticks(),
            stats.received,
            stats.stale_or_duplicate,
            stats.lost,
            stats.late,
            stats.starved,
            server.simulator().bounces
        );
    }
    if let Some(predicted) = client.driver().and_then(Driver::as_auto_proxy) {
        let stats = predicted.stats();
        println!(
            "Client: tick {}, acked {}, acks {}, divergences {}, snaps {}, forced ticks {}, bounces {}",
            predicted.current().tick_number,
            predicted.last_acked(),
            stats.acks,
            stats.divergences,
            stats.snaps,
            stats.forced_ticks,
            client.simulator().bounces
        );
    }
    Ok(())
}
