use crate::safe::SafeVersion;

/// A chain the SDK has defaults for
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Network {
    /// Human readable name
    pub name: &'static str,
    /// Chain id of the network
    pub chain_id: u64,
    /// Safe schema deployed for user wallets on this chain
    pub safe_version: SafeVersion,
}

impl Network {
    /// Const constructor :)
    pub const fn new(name: &'static str, chain_id: u64, safe_version: SafeVersion) -> Self {
        Self {
            name,
            chain_id,
            safe_version,
        }
    }

    /// Runtime Lookup
    pub fn by_chain_id(chain_id: u64) -> Option<Self> {
        NETWORKS
            .iter()
            .find(|network| network.chain_id == chain_id)
            .copied()
    }

    /// Lookup by name, case insensitive
    pub fn by_name(name: &str) -> Option<Self> {
        NETWORKS
            .iter()
            .find(|network| network.name.eq_ignore_ascii_case(name))
            .copied()
    }
}

/// ETHEREUM
pub const ETHEREUM: Network = Network::new("ethereum", 1, SafeVersion::V1_3);
/// GOERLI
pub const GOERLI: Network = Network::new("goerli", 5, SafeVersion::V1_3);
/// XDAI
pub const XDAI: Network = Network::new("xdai", 100, SafeVersion::V1_3);
/// POLYGON
pub const POLYGON: Network = Network::new("polygon", 137, SafeVersion::V1_3);
/// OPTIMISM
pub const OPTIMISM: Network = Network::new("optimism", 10, SafeVersion::V1_3);
/// ARBITRUM
pub const ARBITRUM: Network = Network::new("arbitrum", 42161, SafeVersion::V1_3);
/// Local development chain (ganache, anvil) with the 1.1.1 contracts
pub const DEVELOPMENT: Network = Network::new("development", 1337, SafeVersion::V1_1);

/// GNOSIS_CHAIN (alias for XDAI)
pub const GNOSIS_CHAIN: Network = XDAI;

/// Iterable, deduplicated list of known networks
pub const NETWORKS: &[Network] = &[ETHEREUM, GOERLI, XDAI, POLYGON, OPTIMISM, ARBITRUM, DEVELOPMENT];
