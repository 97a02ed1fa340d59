// Solotto - Network presets
use solana_program::pubkey::Pubkey;

use crate::{error::LotteryError, state::RoundConfig};

/// Clusters served by the local mock coordinator
pub const DEVELOPMENT_CLUSTERS: [&str; 2] = ["localnet", "localhost"];

/// Key hash of the 30 gwei gas lane
pub const GAS_LANE: [u8; 32] = [
    0xd8, 0x9b, 0x2b, 0xf1, 0x50, 0xe3, 0xb9, 0xe1, 0x34, 0x46, 0x98, 0x6e, 0x57, 0x1f, 0xb9, 0xca,
    0xb2, 0x4b, 0x13, 0xce, 0xa0, 0xa4, 0x3e, 0xa2, 0x0a, 0x60, 0x49, 0xa8, 0x5c, 0xc8, 0x07, 0xcc,
];

const ENTRANCE_FEE: u64 = 10_000_000; // 0.01 SOL
const CALLBACK_GAS_LIMIT: u32 = 500_000;
const KEEPERS_UPDATE_INTERVAL: i64 = 30;
const DEVNET_SUBSCRIPTION_ID: u64 = 588;

/// Deployment parameters for one cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    pub name: &'static str,
    pub entrance_fee: u64,
    pub key_hash: [u8; 32],
    pub callback_gas_limit: u32,
    pub keepers_update_interval: i64,
    /// Preexisting subscription; development clusters create one at startup
    pub subscription_id: Option<u64>,
}

impl NetworkConfig {
    /// Build the round configuration for this cluster
    pub fn round_config(
        &self,
        subscription_id: u64,
        coordinator: Pubkey,
    ) -> Result<RoundConfig, LotteryError> {
        RoundConfig::new(
            self.entrance_fee,
            self.keepers_update_interval,
            self.key_hash,
            self.subscription_id.unwrap_or(subscription_id),
            self.callback_gas_limit,
            coordinator,
        )
    }
}

pub fn network_config(cluster: &str) -> Option<NetworkConfig> {
    let (name, subscription_id) = match cluster {
        "localnet" => ("localnet", None),
        "localhost" => ("localhost", None),
        "devnet" => ("devnet", Some(DEVNET_SUBSCRIPTION_ID)),
        _ => return None,
    };
    Some(NetworkConfig {
        name,
        entrance_fee: ENTRANCE_FEE,
        key_hash: GAS_LANE,
        callback_gas_limit: CALLBACK_GAS_LIMIT,
        keepers_update_interval: KEEPERS_UPDATE_INTERVAL,
        subscription_id,
    })
}

pub fn is_development_cluster(cluster: &str) -> bool {
    DEVELOPMENT_CLUSTERS.contains(&cluster)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_clusters() {
        let localnet = network_config("localnet").unwrap();
        assert_eq!(localnet.subscription_id, None);
        assert_eq!(localnet.keepers_update_interval, 30);
        assert!(is_development_cluster("localnet"));

        let devnet = network_config("devnet").unwrap();
        assert_eq!(devnet.subscription_id, Some(588));
        assert!(!is_development_cluster("devnet"));

        assert_eq!(network_config("mainnet-beta"), None);
    }

    #[test]
    fn devnet_keeps_its_subscription() {
        let coordinator = Pubkey::new_unique();
        let config = network_config("devnet")
            .unwrap()
            .round_config(1, coordinator)
            .unwrap();
        assert_eq!(config.subscription_id, 588);
        assert_eq!(config.entrance_fee, 10_000_000);
        assert_eq!(config.key_hash, GAS_LANE);
        assert_eq!(config.coordinator, coordinator);

        let local = network_config("localhost")
            .unwrap()
            .round_config(1, coordinator)
            .unwrap();
        assert_eq!(local.subscription_id, 1);
    }
}
