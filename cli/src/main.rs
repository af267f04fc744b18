//! Battle simulator command line
//!
//! - `run`: step a scenario and print every outbound envelope as one JSON
//!   line on stdout
//! - `validate`: load a scenario and report the first problem found
//!
//! Logs go to stderr, filtered by `--log-level`, else `RUST_LOG`, else `info`.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use battle_sim_core_rs::transport::{spawn_engine, ControlCommand, Envelope, MessageKind};
use battle_sim_core_rs::{Engine, EngineConfig, Priority, SimEvent};

#[derive(Parser, Debug)]
#[command(name = "battle-sim")]
#[command(about = "Run and validate battle simulation scenarios")]
#[command(version)]
struct Cli {
    /// Log filter, e.g. "info" or "battle_sim_core_rs=debug"; overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Step a scenario and print envelopes as JSON lines
    Run {
        #[arg(short, long)]
        scenario: PathBuf,

        #[arg(short, long, default_value_t = 60)]
        frames: u64,

        /// Cast to schedule, as `frame:member:skill[:target]` (repeatable)
        #[arg(long = "cast")]
        casts: Vec<String>,

        /// Drive the engine on a worker thread through the control channel
        #[arg(long)]
        worker: bool,
    },

    /// Load a scenario and report whether it is valid
    Validate {
        #[arg(short, long)]
        scenario: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match &cli.log_level {
        Some(directives) => EnvFilter::try_new(directives).ok(),
        None => EnvFilter::try_from_default_env().ok(),
    }
    .unwrap_or_else(|| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match &cli.command {
        Commands::Run {
            scenario,
            frames,
            casts,
            worker,
        } => run(scenario, *frames, casts, *worker),
        Commands::Validate { scenario } => validate(scenario),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn load(path: &Path) -> Result<EngineConfig, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    EngineConfig::from_json(&text).map_err(|e| e.to_string())
}

/// Parse `frame:member:skill[:target]`
fn parse_cast(spec: &str) -> Result<(u64, SimEvent), String> {
    let parts: Vec<&str> = spec.split(':').collect();
    let (frame, member, skill, target) = match parts.as_slice() {
        [frame, member, skill] => (frame, member, skill, None),
        [frame, member, skill, target] => (frame, member, skill, Some(target.to_string())),
        _ => return Err(format!("cast `{spec}` is not frame:member:skill[:target]")),
    };
    let frame = frame
        .parse()
        .map_err(|_| format!("cast `{spec}`: `{frame}` is not a frame number"))?;
    Ok((
        frame,
        SimEvent::CastSkill {
            member: member.to_string(),
            skill: skill.to_string(),
            target,
        },
    ))
}

fn print_envelope(envelope: &Envelope) -> Result<(), String> {
    let line = serde_json::to_string(envelope).map_err(|e| e.to_string())?;
    println!("{line}");
    Ok(())
}

fn run(scenario: &Path, frames: u64, casts: &[String], worker: bool) -> Result<(), String> {
    let mut engine = Engine::from_config(load(scenario)?).map_err(|e| e.to_string())?;
    for spec in casts {
        let (frame, event) = parse_cast(spec)?;
        engine
            .schedule(frame, Priority::Normal, event)
            .map_err(|e| e.to_string())?;
    }
    tracing::info!(frames, worker, "running scenario");

    if !worker {
        for result in engine.run(frames) {
            for envelope in &result.messages {
                print_envelope(envelope)?;
            }
        }
        return Ok(());
    }

    let handle = spawn_engine(engine).map_err(|e| e.to_string())?;
    handle
        .send(ControlCommand::Step(frames))
        .map_err(|e| e.to_string())?;
    let mut telemetry_seen = 0;
    while telemetry_seen < frames {
        let envelope = handle
            .recv_timeout(Duration::from_secs(10))
            .map_err(|e| e.to_string())?;
        if envelope.kind == MessageKind::EngineTelemetry {
            telemetry_seen += 1;
        }
        print_envelope(&envelope)?;
    }
    let engine = handle.shutdown().map_err(|e| e.to_string())?;
    tracing::info!(frame = engine.current_frame(), "worker finished");
    Ok(())
}

fn validate(scenario: &Path) -> Result<(), String> {
    let mut engine = Engine::from_config(load(scenario)?).map_err(|e| e.to_string())?;
    let failed_trees = engine
        .step()
        .events
        .iter()
        .filter(|e| e.event_type() == "tree_load_failed")
        .count();
    println!(
        "ok: {} members, config hash {}",
        engine.members().len(),
        engine.config_hash()
    );
    if failed_trees > 0 {
        return Err(format!("{failed_trees} behavior tree(s) failed to load"));
    }
    Ok(())
}
