/// Typehashes, operations, Safe versions
pub mod common;

/// On-chain Safe state
pub mod info;

/// Owner linked-list helpers and owner-set validation
pub mod owners;

/// Owner signature aggregation
pub mod signatures;

/// Safe transactions and their EIP-712 encoding
pub mod tx;

pub use common::{Operations, SafeVersion, SENTINEL_OWNERS};
pub use info::SafeInfo;
pub use owners::find_previous_owner;
pub use signatures::SafeSignatures;
pub use tx::{MetaTransactionData, SafeGasConfig, SafeTransactionData};
