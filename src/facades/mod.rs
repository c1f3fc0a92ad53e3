use ethers::types::Address;

use crate::client::{ClientError, ClientResult};

/// Safe owner management and transaction execution
pub mod gnosis_safe;

/// Session key delegation
pub mod token_holder;

/// User wallet creation
pub mod user;

pub use gnosis_safe::GnosisSafe;
pub use token_holder::{AuthorizationStatus, SessionKeyData, SessionKeyGrant, SessionState, TokenHolder};
pub use user::{User, UserWallet, UserWalletContracts};

pub(crate) fn require_address(call: &'static str, what: &str, address: Address) -> ClientResult<()> {
    if address.is_zero() {
        return Err(ClientError::Validation {
            call,
            reason: format!("{} address is zero", what),
        });
    }
    Ok(())
}
