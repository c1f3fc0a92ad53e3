use ethers::types::Address;

use crate::{
    client::{ClientError, ClientResult},
    safe::common::SENTINEL_OWNERS,
};

/// Find the predecessor of `owner` in the Safe's owner linked list.
///
/// `owners` must be in the order returned by `getOwners()`, which walks the
/// list from the sentinel. The head's predecessor is the sentinel itself.
pub fn find_previous_owner(owners: &[Address], owner: Address) -> ClientResult<Address> {
    match owners.iter().position(|o| *o == owner) {
        Some(0) => Ok(SENTINEL_OWNERS),
        Some(i) => Ok(owners[i - 1]),
        None => Err(ClientError::Validation {
            call: "findPreviousOwner",
            reason: format!("{:?} is not an owner", owner),
        }),
    }
}

/// Validate an owner set for `setup`: non-empty, unique, no zero or sentinel
/// address, `1 <= threshold <= owners.len()`
pub fn validate_owners(call: &'static str, owners: &[Address], threshold: u64) -> ClientResult<()> {
    if owners.is_empty() {
        return Err(ClientError::Validation {
            call,
            reason: "at least one owner is required".to_owned(),
        });
    }
    for (i, owner) in owners.iter().enumerate() {
        validate_owner_address(call, *owner)?;
        if owners[..i].contains(owner) {
            return Err(ClientError::Validation {
                call,
                reason: format!("duplicate owner {:?}", owner),
            });
        }
    }
    validate_threshold(call, threshold, owners.len())
}

/// Reject the zero address and the sentinel as owners
pub fn validate_owner_address(call: &'static str, owner: Address) -> ClientResult<()> {
    if owner.is_zero() || owner == SENTINEL_OWNERS {
        return Err(ClientError::Validation {
            call,
            reason: format!("invalid owner address {:?}", owner),
        });
    }
    Ok(())
}

/// Require `1 <= threshold <= owner_count`
pub fn validate_threshold(call: &'static str, threshold: u64, owner_count: usize) -> ClientResult<()> {
    if threshold == 0 || threshold > owner_count as u64 {
        return Err(ClientError::Validation {
            call,
            reason: format!(
                "threshold {} out of range for {} owners",
                threshold, owner_count
            ),
        });
    }
    Ok(())
}
