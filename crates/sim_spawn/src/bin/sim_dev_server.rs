use std::process;
use std::time::Duration;

use clap::Parser;
use sim_spawn::logging::init_tracing;
use sim_spawn::{SimServer, SimServerConfig};

/// Local simulation server for exercising the spawn controller.
#[derive(Debug, Parser)]
#[command(name = "sim_dev_server", version)]
struct Cli {
    #[arg(long, default_value = "127.0.0.1:2000")]
    bind: String,
    /// Frame interval in milliseconds.
    #[arg(long, default_value_t = 50)]
    tick_ms: u64,
    #[arg(long, default_value = "dev-world")]
    world_id: String,
    /// Close each connection after this many ticks.
    #[arg(long)]
    drop_after_ticks: Option<u64>,
    /// Answer every spawn with a refusal.
    #[arg(long)]
    refuse_spawns: bool,
    /// Serve an empty blueprint catalog.
    #[arg(long)]
    empty_catalog: bool,
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = SimServerConfig::default()
        .with_bind_addr(cli.bind)
        .with_world_id(cli.world_id)
        .with_tick_interval(Duration::from_millis(cli.tick_ms))
        .with_refuse_spawns(cli.refuse_spawns)
        .with_drop_after_ticks(cli.drop_after_ticks);
    if cli.empty_catalog {
        config = config.with_catalog(Vec::new());
    }

    let server = match SimServer::bind(config) {
        Ok(server) => server,
        Err(err) => {
            eprintln!("failed to start simulation server: {err}");
            process::exit(1);
        }
    };

    if let Err(err) = server.run() {
        eprintln!("simulation server failed: {err}");
        process::exit(1);
    }
}
