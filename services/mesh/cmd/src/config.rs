//! Configuration handling for the mesh simulator.
//!
//! Settings come from a YAML file, then environment variables, then the
//! command line. A missing or unreadable file is not fatal: the simulator
//! falls back to defaults so it can be started without any setup.

use anyhow::{bail, Result};
use mesh_node::NodeConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// How simulated nodes are wired together
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    /// Each node hears only its predecessor and successor
    Chain,
    /// A chain whose ends are also linked
    Ring,
    /// Every node hears every other node
    Full,
}

/// Demo traffic sent once the nodes are up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Payload flooded by the first node, if any
    pub broadcast: Option<String>,
    /// Payload sent from the first node to the last one, if any
    pub unicast: Option<String>,
    /// Whether the unicast asks for delivery confirmation
    pub confirm: bool,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            broadcast: Some("hello mesh".to_string()),
            unicast: Some("ping".to_string()),
            confirm: true,
        }
    }
}

/// Simulator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Number of simulated nodes
    pub nodes: usize,
    /// Link layout
    pub topology: Topology,
    /// Maintenance ticks to run; 0 runs until the mesh settles
    pub ticks: u64,
    /// Delay between ticks in milliseconds
    pub tick_interval_ms: u64,
    /// Settings shared by every node
    pub node: NodeConfig,
    /// Demo traffic
    pub demo: DemoConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            nodes: 4,
            topology: Topology::Chain,
            ticks: 0,
            tick_interval_ms: 10,
            node: NodeConfig::default(),
            demo: DemoConfig::default(),
        }
    }
}

impl SimConfig {
    /// Load configuration from file and environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let path = config_path.as_ref();
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => match serde_yaml::from_str::<SimConfig>(&content) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!("Failed to parse config file {:?} ({}), using defaults", path, e);
                    Self::default()
                }
            },
            Err(_) => {
                warn!("Config file {:?} not found, using defaults", path);
                Self::default()
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;

        info!(
            "Final simulator configuration: nodes={}, topology={:?}, net_name={:?}, max_attempts={}",
            config.nodes, config.topology, config.node.net_name, config.node.max_attempts
        );
        Ok(config)
    }

    /// Apply `MESH_*` overrides looked up through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(net_name) = lookup("MESH_NET_NAME") {
            info!("Network name overridden by environment: {}", net_name);
            self.node.net_name = net_name;
        }

        if let Some(key) = lookup("MESH_CRYPT_KEY") {
            info!("Obfuscation key overridden by environment");
            self.node.crypt_key = key;
        }

        if let Some(value) = lookup("MESH_MAX_ATTEMPTS") {
            match value.parse::<u8>() {
                Ok(attempts) => {
                    self.node.max_attempts = attempts;
                    info!("Max attempts overridden by environment: {}", attempts);
                }
                Err(_) => bail!("MESH_MAX_ATTEMPTS must be a number, got {:?}", value),
            }
        }

        if let Some(value) = lookup("MESH_NODES") {
            match value.parse::<usize>() {
                Ok(nodes) => {
                    self.nodes = nodes;
                    info!("Node count overridden by environment: {}", nodes);
                }
                Err(_) => bail!("MESH_NODES must be a number, got {:?}", value),
            }
        }

        Ok(())
    }

    /// Check the simulator settings and the shared node settings
    pub fn validate(&self) -> Result<()> {
        if self.nodes < 2 {
            bail!("at least 2 nodes are needed, got {}", self.nodes);
        }
        if self.nodes > u16::MAX as usize {
            bail!("at most {} nodes are supported, got {}", u16::MAX, self.nodes);
        }
        if self.tick_interval_ms == 0 {
            bail!("tick_interval_ms must be positive");
        }
        self.node.validate()?;
        Ok(())
    }
}
