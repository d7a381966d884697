#![forbid(unsafe_code)]
#![deny(warnings)]
#![warn(clippy::pedantic)]

use clap::{Parser, Subcommand};
use memspeed_agent::ceiling::{near_full_ceiling, SystemMemory};
use memspeed_agent::config::{EngineArgs, DEFAULT_BIND};
use memspeed_agent::region::SystemAllocator;
use memspeed_agent::{
    serve, EngineConfig, InterruptAction, Session, SessionConfig, SessionEvent,
};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "memspeed-agent", version, about = "Memory write/read bandwidth under near-full allocation")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP control plane.
    Serve {
        #[arg(long, env = "MEMSPEED_BIND", default_value = DEFAULT_BIND)]
        bind: String,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Run one session in the foreground and print its summary as JSON.
    Run {
        #[arg(long, default_value_t = 1.0)]
        minutes: f64,
        #[command(flatten)]
        engine: EngineArgs,
    },
}

fn init_tracing() {
    let fmt = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env());
    fmt.json().init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Serve { bind, engine } => {
            let config = EngineConfig::from(engine);
            info!(bind = %bind, "starting agent");
            serve(&bind, config).await?;
        }
        Command::Run { minutes, engine } => run_once(minutes, EngineConfig::from(engine)).await?,
    }
    Ok(())
}

async fn run_once(minutes: f64, config: EngineConfig) -> Result<(), Box<dyn std::error::Error>> {
    let session_config = SessionConfig::from_minutes(minutes)?;
    let memory = SystemMemory::probe();
    let ceiling = config
        .ceiling_bytes
        .unwrap_or_else(|| near_full_ceiling(&memory, config.reserve_bytes));
    info!(
        ceiling,
        total = memory.total_bytes,
        available = memory.available_bytes,
        "sizing working set"
    );

    let session = Session::new(session_config, ceiling, &config, SystemAllocator)?;
    let control = session.control();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<SessionEvent>();
    let worker = session.spawn(tx)?;

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(SessionEvent::Sample(sample)) => info!(
                    loops = sample.loops,
                    write_gbps = sample.write_gbps,
                    read_gbps = sample.read_gbps,
                    total_gbps = sample.total_gbps,
                    remaining = sample.remaining_seconds,
                    "sample"
                ),
                Some(event) if event.is_terminal() => {
                    println!("{}", serde_json::to_string_pretty(&event)?);
                }
                Some(_) => {}
                None => break,
            },
            _ = tokio::signal::ctrl_c() => match control.on_interrupt() {
                InterruptAction::StopAfterPass => {
                    warn!(latency = ?control.expected_stop_latency(), "stop requested, finishing current pass");
                }
                InterruptAction::Exit => {
                    warn!(state = %control.state(), "interrupted before passes started, exiting");
                    std::process::exit(130);
                }
                InterruptAction::Ignore => {
                    warn!(state = %control.state(), "interrupt ignored, run is already ending");
                }
            },
        }
    }

    match worker.join() {
        Ok(result) => {
            result?;
            Ok(())
        }
        Err(_) => Err("worker thread panicked".into()),
    }
}
