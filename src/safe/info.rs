use ethers::types::{Address, U256};

/// On-chain state of a Safe, as read in one round of view calls
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SafeInfo {
    /// The Safe
    pub address: Address,
    /// Next usable nonce
    pub nonce: U256,
    /// Required approvals
    pub threshold: U256,
    /// Owners, head of the linked list first
    pub owners: Vec<Address>,
}

impl SafeInfo {
    /// True if `address` is in the owner list
    pub fn is_owner(&self, address: Address) -> bool {
        self.owners.contains(&address)
    }

    /// Number of owners
    pub fn owner_count(&self) -> usize {
        self.owners.len()
    }
}
