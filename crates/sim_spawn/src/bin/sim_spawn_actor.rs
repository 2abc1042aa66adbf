use std::path::PathBuf;
use std::process;

use clap::Parser;
use sim_spawn::logging::init_tracing;
use sim_spawn::{run_controller, CancelToken, ControllerConfig, ControllerError, Phase, StopReason};
use tracing::{info, warn};

const EXIT_FATAL: i32 = 1;
const EXIT_USAGE: i32 = 2;

/// Spawns one actor on a simulation server, follows its ticks until
/// interrupted and removes the actor again on the way out.
#[derive(Debug, Parser)]
#[command(name = "sim_spawn_actor", version)]
struct Cli {
    /// TOML file with controller settings; flags override it.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, env = "SIM_HOST")]
    host: Option<String>,
    #[arg(long, env = "SIM_PORT")]
    port: Option<u16>,
    /// Timeout for connect and every request, in seconds.
    #[arg(long, env = "SIM_TIMEOUT_SECS")]
    timeout_secs: Option<f64>,
    /// Blueprint glob; the first catalog match is spawned.
    #[arg(long, env = "SIM_BLUEPRINT")]
    blueprint: Option<String>,
    #[arg(long, allow_hyphen_values = true)]
    x: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    y: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    z: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    roll: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    pitch: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    yaw: Option<f64>,
    /// Stop after this many ticks instead of waiting for a signal.
    #[arg(long)]
    max_ticks: Option<u64>,
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn into_config(self) -> Result<ControllerConfig, sim_spawn::ConfigError> {
        let mut config = match &self.config {
            Some(path) => ControllerConfig::load(path)?,
            None => ControllerConfig::default(),
        };
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(timeout_secs) = self.timeout_secs {
            config.timeout_secs = timeout_secs;
        }
        if let Some(blueprint) = self.blueprint {
            config.blueprint = blueprint;
        }
        if self.max_ticks.is_some() {
            config.max_ticks = self.max_ticks;
        }

        let location = &mut config.spawn_point.location;
        location.x = self.x.unwrap_or(location.x);
        location.y = self.y.unwrap_or(location.y);
        location.z = self.z.unwrap_or(location.z);
        let rotation = &mut config.spawn_point.rotation;
        rotation.roll = self.roll.unwrap_or(rotation.roll);
        rotation.pitch = self.pitch.unwrap_or(rotation.pitch);
        rotation.yaw = self.yaw.unwrap_or(rotation.yaw);

        config.validate()?;
        Ok(config)
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match cli.into_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            process::exit(EXIT_USAGE);
        }
    };

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        if handler_token.cancel() {
            info!("termination requested, shutting down");
        }
    }) {
        eprintln!("failed to install signal handler: {err}");
        process::exit(EXIT_USAGE);
    }

    match run_controller(&config, &cancel) {
        Ok(report) => {
            let stop = match report.stop {
                StopReason::Cancelled => "cancelled",
                StopReason::TickLimit => "tick limit",
                StopReason::ConnectionLost(_) => "connection lost",
            };
            match &report.cleanup {
                None => info!(
                    blueprint = %report.blueprint_id,
                    stop,
                    "controller finished before spawning"
                ),
                Some(Ok(outcome)) => info!(
                    actor_id = ?report.actor_id,
                    blueprint = %report.blueprint_id,
                    ticks = report.ticks,
                    stop,
                    ?outcome,
                    "controller finished"
                ),
                Some(Err(err)) => warn!(
                    actor_id = ?report.actor_id,
                    ticks = report.ticks,
                    stop,
                    error = %err,
                    "controller finished without confirmed cleanup"
                ),
            }
        }
        Err(err) => {
            eprintln!("{} failed: {err}", err.phase());
            if let ControllerError::ConnectionLost {
                actor_id, cleanup, ..
            } = &err
            {
                match cleanup {
                    Ok(outcome) => eprintln!("actor {actor_id} cleanup: {outcome:?}"),
                    Err(cleanup_err) => eprintln!("{cleanup_err}"),
                }
            }
            let code = match err.phase() {
                Phase::Config => EXIT_USAGE,
                _ => EXIT_FATAL,
            };
            process::exit(code);
        }
    }
}
