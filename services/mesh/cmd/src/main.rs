//! Radio mesh simulator binary.
//!
//! Builds a set of mesh nodes on an in-process radio medium, sends some demo
//! traffic, and drives every node's maintenance loop from a timer until the
//! mesh settles or the requested number of ticks has run.

mod config;
mod logging;
mod simulation;

use clap::Parser;
use config::SimConfig;
use logging::MeshLogFormatter;
use mesh_node::{MonotonicClock, FIRMWARE_VERSION};
use simulation::Simulation;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Store-and-forward radio mesh simulator
#[derive(Parser, Debug)]
#[command(name = "radio-mesh", version, about = "Simulate a store-and-forward radio mesh")]
struct Args {
    /// Configuration file path
    #[arg(long, default_value = "mesh.yaml")]
    config: PathBuf,

    /// Number of nodes, overrides the config file
    #[arg(long)]
    nodes: Option<usize>,

    /// Ticks to run (0 runs until the mesh settles)
    #[arg(long)]
    ticks: Option<u64>,

    /// Delay between ticks, e.g. 10ms
    #[arg(long)]
    tick_interval: Option<humantime::Duration>,

    /// Network name shared by every node
    #[arg(long)]
    net_name: Option<String>,

    /// Payload obfuscation key shared by every node
    #[arg(long)]
    crypt_key: Option<String>,

    /// Seed for message IDs, for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn apply(&self, config: &mut SimConfig) {
        if let Some(nodes) = self.nodes {
            config.nodes = nodes;
        }
        if let Some(ticks) = self.ticks {
            config.ticks = ticks;
        }
        if let Some(interval) = &self.tick_interval {
            config.tick_interval_ms = interval.as_millis() as u64;
        }
        if let Some(net_name) = &self.net_name {
            config.node.net_name = net_name.clone();
        }
        if let Some(key) = &self.crypt_key {
            config.node.crypt_key = key.clone();
        }
        if self.seed.is_some() {
            config.node.rng_seed = self.seed;
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut env_filter = EnvFilter::new("info");
    for target in ["radio_mesh", "mesh_wire", "mesh_storage", "mesh_routing", "mesh_node"] {
        env_filter = env_filter.add_directive(format!("{}={}", target, args.log_level).parse()?);
    }

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .event_format(MeshLogFormatter::new("radio-mesh"))
        .init();

    info!("Starting radio mesh simulator v{}", FIRMWARE_VERSION);

    let mut config = SimConfig::load_from_file(&args.config)?;
    args.apply(&mut config);
    config.validate()?;

    let mut sim = Simulation::build(&config, MonotonicClock::new())?;
    sim.send_demo(&config)?;

    let interval = Duration::from_millis(config.tick_interval_ms);
    tokio::select! {
        ran = sim.run(config.ticks, interval) => {
            info!("Simulation finished after {} ticks", ran);
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, stopping simulation");
        }
    }

    if !sim.is_settled() {
        warn!("Mesh still has traffic pending");
    }
    sim.log_summary();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config() {
        let args = Args::parse_from([
            "radio-mesh",
            "--nodes",
            "7",
            "--tick-interval",
            "25ms",
            "--net-name",
            "field",
            "--seed",
            "3",
        ]);
        let mut config = SimConfig::default();
        args.apply(&mut config);

        assert_eq!(config.nodes, 7);
        assert_eq!(config.tick_interval_ms, 25);
        assert_eq!(config.node.net_name, "field");
        assert_eq!(config.node.rng_seed, Some(3));
        assert_eq!(config.ticks, 0);
        assert_eq!(args.config, PathBuf::from("mesh.yaml"));
    }
}
