#![warn(missing_docs, unreachable_pub)]
#![deny(unused_must_use, rust_2018_idioms)]

//! Gnosis Safe and TokenHolder session key SDK

mod macros;

/// Transaction sender & errors
pub mod client;

/// Caller-supplied configuration
pub mod config;

/// Receipt log decoding
pub mod events;

/// Per-contract facades
pub mod facades;

/// Network configuration
pub mod networks;

/// Contract ABI & bytecode registry
pub mod registry;

/// Safe transaction codec
pub mod safe;

pub use client::{ClientError, ClientResult, TxOptions, TxSender};
pub use config::SdkConfig;
pub use facades::{GnosisSafe, TokenHolder, User, UserWallet, UserWalletContracts};
pub use registry::{ContractName, ContractRegistry, RegistryError};

// supported actions:
// createUserWallet (factory, direct)
// addOwnerWithThreshold / removeOwner / swapOwner / changeThreshold (via execTransaction)
// authorizeSession / revokeSession (via execTransaction)
