//! Queue Tester CLI Tool
//!
//! Drives an in-process matchmaking core with simulated clients and prints
//! what each scenario produced.
//!
//! Usage:
//!   cargo run --bin queue-tester -- --help
//!   cargo run --bin queue-tester simulate --mode 0 --players 1000 --leave-every 7
//!   cargo run --bin queue-tester run-scenario --scenario abandon
//!   cargo run --bin queue-tester run-all-scenarios

use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use duel_hall::config::{default_modes, AppConfig, ModeConfig};
use duel_hall::metrics::MetricsCollector;
use duel_hall::service::AppState;
use duel_hall::session::{ChannelSender, SessionHandle};
use duel_hall::{ConnectionManager, GameMode, Membership, ServerEvent};
use tokio::sync::mpsc::UnboundedReceiver;

#[derive(Parser)]
#[command(name = "queue-tester")]
#[command(about = "In-process load and scenario tool for the duel-hall matchmaking core")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Extra `key:size[:ready]` mode entries added to the default table
    #[arg(long, value_delimiter = ',')]
    modes: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Queue many simulated players into one mode
    Simulate {
        /// Mode key to join
        #[arg(short, long, default_value = "0")]
        mode: i64,
        /// Number of simulated players
        #[arg(short, long, default_value = "100")]
        players: usize,
        /// Every Nth player disconnects right after joining (0 disables)
        #[arg(short, long, default_value = "0")]
        leave_every: usize,
    },
    /// Run a predefined scenario (duel, abandon, ready, leave-queue)
    RunScenario {
        #[arg(short, long)]
        scenario: String,
    },
    /// Run all predefined scenarios
    RunAllScenarios,
}

/// A simulated client holding its session and inbox
struct SimClient {
    handle: SessionHandle,
    inbox: UnboundedReceiver<ServerEvent>,
}

impl SimClient {
    fn connect(connections: &ConnectionManager, name: &str) -> Result<Self> {
        let (sender, inbox) = ChannelSender::channel();
        let handle = connections.connect(Some(name.to_string()), Arc::new(sender))?;
        Ok(Self { handle, inbox })
    }

    fn drain(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.inbox.try_recv() {
            events.push(event);
        }
        events
    }
}

fn build_core(extra_modes: &[String]) -> Result<Arc<AppState>> {
    let mut config = AppConfig::default();
    let mut modes = default_modes();
    for entry in extra_modes {
        modes.push(
            ModeConfig::parse_entry(entry).ok_or_else(|| anyhow!("Invalid mode entry: {}", entry))?,
        );
    }
    if !modes.iter().any(|mode| mode.require_ready) {
        modes.push(ModeConfig {
            require_ready: true,
            name: "ready-duel".to_string(),
            ..ModeConfig::duel(9)
        });
    }
    config.matchmaking.modes = modes;
    Ok(Arc::new(AppState::new(config)?))
}

fn print_summary(app_state: &AppState) -> Result<()> {
    let connections = app_state.connections();
    let matchmaker = connections.matchmaker().stats()?;
    let rooms = connections.rooms().stats()?;
    println!("📊 {}", MetricsCollector::summary(&matchmaker, &rooms));
    Ok(())
}

fn simulate(app_state: &AppState, mode: GameMode, players: usize, leave_every: usize) -> Result<()> {
    let connections = app_state.connections();
    let started = Instant::now();
    let mut clients = Vec::with_capacity(players);
    let mut rooms = 0;

    for i in 0..players {
        let client = SimClient::connect(connections, &format!("sim-{}", i))?;
        let outcome = connections.join_queue(client.handle.session_id(), mode)?;
        rooms += outcome.rooms_created.len();

        if leave_every > 0 && (i + 1) % leave_every == 0 {
            client.handle.dispose()?;
        } else {
            clients.push(client);
        }
    }

    let elapsed = started.elapsed();
    println!(
        "🎮 {} players joined mode {} in {:.2}ms - {} rooms, {} still waiting",
        players,
        mode,
        elapsed.as_secs_f64() * 1000.0,
        rooms,
        connections.matchmaker().queue_len(mode)?
    );
    print_summary(app_state)
}

fn scenario_duel(app_state: &AppState) -> Result<()> {
    let connections = app_state.connections();
    let mut alice = SimClient::connect(connections, "alice")?;
    let mut bob = SimClient::connect(connections, "bob")?;
    let mode = GameMode::new(0);

    connections.join_queue(alice.handle.session_id(), mode)?;
    let outcome = connections.join_queue(bob.handle.session_id(), mode)?;
    let room_id = *outcome
        .rooms_created
        .first()
        .ok_or_else(|| anyhow!("Second join did not create a room"))?;

    connections.send_room_message(
        alice.handle.session_id(),
        room_id,
        serde_json::json!({"move": "e4"}),
    )?;
    connections.rooms().complete(room_id)?;

    let bob_events = bob.drain();
    if !bob_events
        .iter()
        .any(|e| matches!(e, ServerEvent::RoomMessage { .. }))
    {
        bail!("Bob never received Alice's move");
    }
    if !alice
        .drain()
        .iter()
        .any(|e| matches!(e, ServerEvent::Completed { .. }))
    {
        bail!("Alice never saw the room complete");
    }
    println!("✅ duel: room {} matched, relayed and completed", room_id);
    Ok(())
}

fn scenario_abandon(app_state: &AppState) -> Result<()> {
    let connections = app_state.connections();
    let alice = SimClient::connect(connections, "alice")?;
    let mut bob = SimClient::connect(connections, "bob")?;
    let mode = GameMode::new(1);

    connections.join_queue(alice.handle.session_id(), mode)?;
    connections.join_queue(bob.handle.session_id(), mode)?;
    let released = alice.handle.dispose()?;

    if !bob
        .drain()
        .iter()
        .any(|e| matches!(e, ServerEvent::Abandoned { .. }))
    {
        bail!("Bob was not told the room was abandoned");
    }
    if connections.membership(bob.handle.session_id())? != Membership::None {
        bail!("Bob is still attached to the abandoned room");
    }
    println!("✅ abandon: disconnect released {:?}", released);
    Ok(())
}

fn scenario_ready(app_state: &AppState) -> Result<()> {
    let connections = app_state.connections();
    let mode = connections
        .matchmaker()
        .mode_provider()
        .available_modes()
        .into_iter()
        .find_map(|mode| {
            connections
                .matchmaker()
                .mode_provider()
                .mode_config(mode)
                .ok()
                .filter(|config| config.require_ready)
        })
        .ok_or_else(|| anyhow!("No ready-up mode configured"))?;

    let mut clients = Vec::new();
    let mut room_id = None;
    for i in 0..mode.group_size {
        let client = SimClient::connect(connections, &format!("ready-{}", i))?;
        let outcome = connections.join_queue(client.handle.session_id(), mode.mode)?;
        room_id = room_id.or(outcome.rooms_created.first().copied());
        clients.push(client);
    }
    let room_id = room_id.ok_or_else(|| anyhow!("Full group did not create a room"))?;

    for client in &clients {
        let state = connections.acknowledge_ready(client.handle.session_id(), room_id)?;
        println!("   ready from {} -> {}", client.handle.session_id(), state);
    }
    let started = clients
        .iter_mut()
        .all(|c| c.drain().iter().any(|e| matches!(e, ServerEvent::RoomStarted { .. })));
    if !started {
        bail!("Not every occupant saw the room start");
    }
    println!("✅ ready: room {} activated after ready-up", room_id);
    Ok(())
}

fn scenario_leave_queue(app_state: &AppState) -> Result<()> {
    let connections = app_state.connections();
    let mode = GameMode::new(2);
    let first = SimClient::connect(connections, "first")?;
    let second = SimClient::connect(connections, "second")?;
    let third = SimClient::connect(connections, "third")?;

    connections.join_queue(first.handle.session_id(), mode)?;
    connections.join_queue(second.handle.session_id(), mode)?;
    connections.join_queue(third.handle.session_id(), mode)?;
    connections.leave_queue(third.handle.session_id(), mode)?;

    if connections.matchmaker().queue_len(mode)? != 0 {
        bail!("Queue for mode {} is not empty", mode);
    }
    println!("✅ leave-queue: third player left before a partner arrived");
    Ok(())
}

fn run_scenario(app_state: &AppState, name: &str) -> Result<()> {
    match name {
        "duel" => scenario_duel(app_state),
        "abandon" => scenario_abandon(app_state),
        "ready" => scenario_ready(app_state),
        "leave-queue" => scenario_leave_queue(app_state),
        other => bail!(
            "Unknown scenario '{}'. Use duel, abandon, ready or leave-queue",
            other
        ),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let app_state = build_core(&cli.modes)?;

    match cli.command {
        Commands::Simulate {
            mode,
            players,
            leave_every,
        } => simulate(&app_state, GameMode::new(mode), players, leave_every)?,
        Commands::RunScenario { scenario } => {
            run_scenario(&app_state, &scenario)?;
            print_summary(&app_state)?;
        }
        Commands::RunAllScenarios => {
            let mut failed = 0;
            for name in ["duel", "abandon", "ready", "leave-queue"] {
                let app_state = build_core(&cli.modes)?;
                if let Err(e) = run_scenario(&app_state, name) {
                    eprintln!("❌ {}: {}", name, e);
                    failed += 1;
                }
            }
            if failed > 0 {
                bail!("{} scenario(s) failed", failed);
            }
        }
    }

    Ok(())
}
