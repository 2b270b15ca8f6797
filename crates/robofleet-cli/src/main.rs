//! `robofleet` – run the control loop against the simulated field.
//!
//! 1. Loads `~/.robofleet/config.toml` (written with defaults on first run)
//!    and applies `ROBOFLEET_*` overrides.
//! 2. Starts a clock thread that advances the simulation at its frame rate.
//! 3. Runs the orchestrator synchronously with the [`Formation`] strategy,
//!    optionally mirroring robot commands onto a UDP or serial link.
//! 4. On Ctrl-C the orchestrator stops, every robot gets a Stop command, and
//!    the loop statistics are printed.

mod config;
mod formation;
mod links;

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use colored::Colorize;
use robofleet_hal::{SimConfig, SimField, TrackedWorld};
use robofleet_runtime::{CycleStats, Orchestrator, telemetry};
use robofleet_types::{
    FieldGeometry, FleetError, Pose, RefereeCommand, RefereeState, SlotId, TeamColor,
};
use tracing::{info, warn};

use crate::config::Config;
use crate::formation::Formation;
use crate::links::BenchTransports;

fn main() -> ExitCode {
    let _telemetry = telemetry::init_tracing("robofleet");

    print_banner();

    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => first_run(),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            Config::default()
        }
    };

    println!(
        "  Team {}  ·  link {}  ·  controller {}  ·  {} slots",
        cfg.team.to_string().bold(),
        cfg.transport.to_string().bold(),
        cfg.controller.to_string().bold(),
        cfg.robot_slots
    );
    println!("  Press {} to stop.\n", "Ctrl-C".bold().cyan());

    match run(&cfg) {
        Ok(stats) => {
            print_summary(&stats);
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("{} {}", "✗".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(cfg: &Config) -> Result<CycleStats, FleetError> {
    let sim_config = SimConfig {
        slots_per_team: cfg.robot_slots,
        ..SimConfig::default()
    };
    let frame_period = Duration::from_secs_f64(sim_config.frame_period);
    let field = SimField::new(sim_config);
    kick_off(&field, cfg.robot_slots);

    let orchestrator = Orchestrator::new(
        cfg.orchestrator(),
        BenchTransports::new(field.transports(), cfg),
    )?;

    let running = Arc::new(AtomicBool::new(true));
    let clock = {
        let field = field.clone();
        let running = running.clone();
        thread::Builder::new()
            .name("robofleet-clock".to_string())
            .spawn(move || {
                while running.load(Ordering::SeqCst) {
                    field.step();
                    thread::sleep(frame_period);
                }
            })
            .map_err(|e| FleetError::Initialization(format!("cannot spawn clock: {e}")))?
    };

    let slots = cfg.robot_slots;
    let result = orchestrator.start(
        Formation::default(),
        |team| {
            info!(%team, slots, "tracking both teams");
            Ok(TrackedWorld::new(FieldGeometry::default(), slots))
        },
        false,
        cfg.transport.transport_kind(),
    );

    running.store(false, Ordering::SeqCst);
    if clock.join().is_err() {
        warn!("simulation clock panicked");
    }
    result.map(|()| orchestrator.stats())
}

/// Scatter both teams and give the go signal.
fn kick_off(field: &SimField, slots: usize) {
    for i in 0..slots {
        let y = (i as f64 - slots as f64 / 2.0) * 400.0;
        field.place(TeamColor::Blue, SlotId(i), Pose::new(-3000.0, y, 0.0));
        field.place(TeamColor::Yellow, SlotId(i), Pose::new(3000.0, y, std::f64::consts::PI));
    }
    field.set_referee(RefereeState {
        command: RefereeCommand::ForceStart,
        command_counter: 1,
    });
}

fn first_run() -> Config {
    let cfg = Config::default();
    match config::save(&cfg) {
        Ok(()) => println!(
            "  Wrote default config to {}",
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("  {} {}", "Could not save config:".yellow(), e),
    }
    cfg
}

fn print_banner() {
    println!();
    println!("{}", r#"   ___       __        ______          __ "#.bold().cyan());
    println!("{}", r#"  / _ \___  / /  ___  / __/ /__ ___  / /_"#.bold().cyan());
    println!("{}", r#" / , _/ _ \/ _ \/ _ \/ _// / -_) -_)/ __/"#.bold().cyan());
    println!("{}", r#"/_/|_|\___/_.__/\___/_/ /_/\__/\__/ \__/ "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "RoboFleet".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Multi-robot control loop");
    println!();
}

fn print_summary(stats: &CycleStats) {
    println!();
    println!("{}", "  ✓ Robots halted.".green());
    println!(
        "  {} frames integrated, {} skipped, {} strategy runs",
        stats.novel_frames, stats.skipped_frames, stats.strategy_runs
    );
    println!(
        "  {} commands dispatched, {} cycle failures, {} transport errors",
        stats.dispatched, stats.cycle_failures, stats.transport_errors
    );
}
