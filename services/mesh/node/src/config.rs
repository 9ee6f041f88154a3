//! Node configuration

use crate::error::{check_range, MeshError};
use mesh_storage::DEFAULT_CAPACITY;
use mesh_wire::{NetName, Obfuscator};
use serde::{Deserialize, Serialize};

/// Accepted range of [`NodeConfig::max_attempts`]
pub const MAX_ATTEMPTS_RANGE: (u8, u8) = (1, 10);
/// Accepted range of [`NodeConfig::max_wait_between_transmissions_ms`]
pub const TRANSMISSION_WAIT_RANGE_MS: (u64, u64) = (50, 250);
/// Accepted range of [`NodeConfig::route_discovery_timeout_ms`]
pub const ROUTE_DISCOVERY_RANGE_MS: (u64, u64) = (500, 5000);
/// Largest accepted [`NodeConfig::pool_capacity`]
pub const MAX_POOL_CAPACITY: usize = 10_000;

/// Configuration of one mesh node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Network label, empty accepts every network
    pub net_name: String,
    /// Payload obfuscation key, empty disables obfuscation
    pub crypt_key: String,
    /// Transmissions of one frame before giving up on its next hop
    pub max_attempts: u8,
    /// How long a send may wait for its completion before counting as failed
    pub max_wait_between_transmissions_ms: u64,
    /// How long route discovery and delivery confirmations may take
    pub route_discovery_timeout_ms: u64,
    /// Number of buffer pool slots
    pub pool_capacity: usize,
    /// Slots kept for control traffic; `None` disables priority mode
    pub pool_reserve: Option<usize>,
    /// Packets that may wait for route discovery at once
    pub waiting_capacity: usize,
    /// Seed for message IDs; `None` seeds from the OS
    pub rng_seed: Option<u64>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            net_name: String::new(),
            crypt_key: String::new(),
            max_attempts: 3,
            max_wait_between_transmissions_ms: 50,
            route_discovery_timeout_ms: 500,
            pool_capacity: DEFAULT_CAPACITY,
            pool_reserve: None,
            waiting_capacity: 1,
            rng_seed: None,
        }
    }
}

impl NodeConfig {
    /// Check every field, returning the first violation
    pub fn validate(&self) -> Result<(), MeshError> {
        self.network()?;
        self.obfuscator()?;
        check_range(
            "max_attempts",
            self.max_attempts as u64,
            MAX_ATTEMPTS_RANGE.0 as u64,
            MAX_ATTEMPTS_RANGE.1 as u64,
        )?;
        check_range(
            "max_wait_between_transmissions_ms",
            self.max_wait_between_transmissions_ms,
            TRANSMISSION_WAIT_RANGE_MS.0,
            TRANSMISSION_WAIT_RANGE_MS.1,
        )?;
        check_range(
            "route_discovery_timeout_ms",
            self.route_discovery_timeout_ms,
            ROUTE_DISCOVERY_RANGE_MS.0,
            ROUTE_DISCOVERY_RANGE_MS.1,
        )?;

        if self.pool_capacity == 0 || self.pool_capacity > MAX_POOL_CAPACITY {
            return Err(MeshError::Config(format!(
                "pool_capacity {} must be in 1..={}",
                self.pool_capacity, MAX_POOL_CAPACITY
            )));
        }
        // every parked record holds a pool slot
        if self.waiting_capacity == 0 || self.waiting_capacity > self.pool_capacity {
            return Err(MeshError::Config(format!(
                "waiting_capacity {} must be in 1..={}",
                self.waiting_capacity, self.pool_capacity
            )));
        }
        if let Some(reserve) = self.pool_reserve {
            if reserve >= self.pool_capacity {
                return Err(MeshError::Config(format!(
                    "pool_reserve {} must be below pool_capacity {}",
                    reserve, self.pool_capacity
                )));
            }
        }
        Ok(())
    }

    /// Parsed network label
    pub fn network(&self) -> Result<NetName, MeshError> {
        Ok(NetName::new(&self.net_name)?)
    }

    /// Obfuscator built from the key
    pub fn obfuscator(&self) -> Result<Obfuscator, MeshError> {
        Ok(Obfuscator::new(self.crypt_key.as_bytes())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_storage::DEFAULT_THRESHOLD;
    use mesh_wire::WireError;

    #[test]
    fn test_default_config_is_valid() {
        let config = NodeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.route_discovery_timeout_ms, 500);
        assert_eq!(config.pool_capacity, 500);
    }

    #[test]
    fn test_ranges_rejected() {
        let config = NodeConfig {
            max_attempts: 0,
            ..NodeConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(MeshError::OutOfRange { name: "max_attempts", .. })
        ));

        let config = NodeConfig {
            max_wait_between_transmissions_ms: 251,
            ..NodeConfig::default()
        };
        assert!(config.validate().is_err());

        let config = NodeConfig {
            route_discovery_timeout_ms: 5001,
            ..NodeConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_label_and_key_lengths() {
        let config = NodeConfig {
            net_name: "a-network-name-too-long".into(),
            ..NodeConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(MeshError::Wire(WireError::NetNameTooLong(23)))
        );

        let config = NodeConfig {
            crypt_key: "k".repeat(21),
            ..NodeConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(MeshError::Wire(WireError::KeyTooLong(21)))
        );
    }

    #[test]
    fn test_pool_settings() {
        let config = NodeConfig {
            pool_capacity: 10,
            pool_reserve: Some(DEFAULT_THRESHOLD),
            ..NodeConfig::default()
        };
        assert!(config.validate().is_ok());

        let config = NodeConfig {
            pool_capacity: 5,
            pool_reserve: Some(5),
            ..NodeConfig::default()
        };
        assert!(matches!(config.validate(), Err(MeshError::Config(_))));

        let config = NodeConfig {
            waiting_capacity: 0,
            ..NodeConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_capacities_bounded() {
        let config = NodeConfig {
            waiting_capacity: usize::MAX,
            ..NodeConfig::default()
        };
        assert!(matches!(config.validate(), Err(MeshError::Config(_))));

        let config = NodeConfig {
            pool_capacity: 8,
            waiting_capacity: 9,
            ..NodeConfig::default()
        };
        assert!(matches!(config.validate(), Err(MeshError::Config(_))));

        let config = NodeConfig {
            pool_capacity: MAX_POOL_CAPACITY + 1,
            ..NodeConfig::default()
        };
        assert!(matches!(config.validate(), Err(MeshError::Config(_))));

        let config = NodeConfig {
            pool_capacity: 8,
            waiting_capacity: 8,
            ..NodeConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_deserialization() {
        let config: NodeConfig =
            serde_json::from_str(r#"{"net_name":"lab","max_attempts":5}"#).unwrap();
        assert_eq!(config.net_name, "lab");
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.waiting_capacity, 1);
        assert_eq!(config.rng_seed, None);
    }
}
