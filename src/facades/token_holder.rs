use std::collections::HashSet;

use ethers::{
    abi::Tokenizable,
    providers::Middleware,
    types::{Address, Bytes, TransactionReceipt, U256},
};

use super::require_address;
use crate::{
    client::{ClientError, ClientResult, TxSender},
    events::{self, DecodedEvent},
    next_token,
    registry::{ContractName, ContractRegistry},
    safe::SafeTransactionData,
    view_call,
};

/// Delegation of spending rights to an ephemeral key, bounded by a spending
/// limit and a block height
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionKeyGrant {
    /// The session key
    pub key: Address,
    /// Maximum amount spendable in one transfer
    pub spending_limit: U256,
    /// Block height from which the key is no longer valid
    pub expiration_height: U256,
}

impl SessionKeyGrant {
    /// A grant for `key`
    pub fn new(key: Address, spending_limit: impl Into<U256>, expiration_height: impl Into<U256>) -> Self {
        Self {
            key,
            spending_limit: spending_limit.into(),
            expiration_height: expiration_height.into(),
        }
    }
}

fn require_session_key(call: &'static str, key: Address) -> ClientResult<()> {
    if key.is_zero() {
        return Err(ClientError::Validation {
            call,
            reason: "session key is the zero address".to_owned(),
        });
    }
    Ok(())
}

/// Zip parallel session key arrays into grants.
///
/// The three slices must have equal length, keys must be unique and none may
/// be the zero address.
pub fn session_grants(
    call: &'static str,
    keys: &[Address],
    spending_limits: &[U256],
    expiration_heights: &[U256],
) -> ClientResult<Vec<SessionKeyGrant>> {
    if keys.len() != spending_limits.len() || keys.len() != expiration_heights.len() {
        return Err(ClientError::Validation {
            call,
            reason: format!(
                "session key arrays differ in length: {} keys, {} spending limits, {} expiration heights",
                keys.len(),
                spending_limits.len(),
                expiration_heights.len()
            ),
        });
    }
    let mut seen = HashSet::new();
    for key in keys {
        require_session_key(call, *key)?;
        if !seen.insert(*key) {
            return Err(ClientError::Validation {
                call,
                reason: format!("duplicate session key {:?}", key),
            });
        }
    }
    Ok(keys
        .iter()
        .zip(spending_limits)
        .zip(expiration_heights)
        .map(|((key, limit), height)| SessionKeyGrant::new(*key, *limit, *height))
        .collect())
}

/// Split grants back into the parallel arrays the contracts take
pub(crate) fn grant_tokens(grants: &[SessionKeyGrant]) -> [ethers::abi::Token; 3] {
    let keys: Vec<Address> = grants.iter().map(|g| g.key).collect();
    let limits: Vec<U256> = grants.iter().map(|g| g.spending_limit).collect();
    let heights: Vec<U256> = grants.iter().map(|g| g.expiration_height).collect();
    [keys.into_token(), limits.into_token(), heights.into_token()]
}

/// `setup` call data for a fresh TokenHolder proxy
pub fn setup_data(
    registry: &ContractRegistry,
    token: Address,
    token_rules: Address,
    owner: Address,
    grants: &[SessionKeyGrant],
) -> ClientResult<Bytes> {
    require_address("setup", "token", token)?;
    require_address("setup", "token rules", token_rules)?;
    require_address("setup", "owner", owner)?;
    let [keys, limits, heights] = grant_tokens(grants);
    Ok(registry.encode_call(
        ContractName::TokenHolder,
        "setup",
        &[
            token.into_token(),
            token_rules.into_token(),
            owner.into_token(),
            keys,
            limits,
            heights,
        ],
    )?)
}

/// On-chain authorization status of a session key
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AuthorizationStatus {
    /// Never authorized
    NotAuthorized = 0,
    /// Authorized, possibly expired
    Authorized = 1,
    /// Revoked by the owner
    Revoked = 2,
}

impl TryFrom<U256> for AuthorizationStatus {
    type Error = ClientError;

    fn try_from(value: U256) -> Result<Self, Self::Error> {
        if value > U256::from(2) {
            return Err(ClientError::Provider(format!(
                "Unknown session key status {}",
                value
            )));
        }
        Ok(match value.as_u64() {
            0 => AuthorizationStatus::NotAuthorized,
            1 => AuthorizationStatus::Authorized,
            _ => AuthorizationStatus::Revoked,
        })
    }
}

/// The `sessionKeys(address)` record
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionKeyData {
    /// Maximum amount spendable in one transfer
    pub spending_limit: U256,
    /// Block height from which the key is no longer valid
    pub expiration_height: U256,
    /// Replay protection nonce of the key's executable transactions
    pub nonce: U256,
    /// Authorization status
    pub status: AuthorizationStatus,
}

/// Usability of a session key at a given block
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum SessionState {
    /// Never authorized
    NotAuthorized,
    /// Authorized and below its expiration height
    Active,
    /// Authorized but the chain has reached the expiration height
    Expired,
    /// Revoked
    Revoked,
}

impl SessionKeyData {
    /// State of the key at block `height`
    pub fn state_at(&self, height: U256) -> SessionState {
        match self.status {
            AuthorizationStatus::NotAuthorized => SessionState::NotAuthorized,
            AuthorizationStatus::Revoked => SessionState::Revoked,
            AuthorizationStatus::Authorized if height < self.expiration_height => SessionState::Active,
            AuthorizationStatus::Authorized => SessionState::Expired,
        }
    }
}

/// A TokenHolder proxy owned by a Safe. Session key changes are Safe
/// transactions targeting this contract.
#[derive(Debug)]
pub struct TokenHolder<M> {
    address: Address,
    sender: TxSender<M>,
}

impl<M> Clone for TokenHolder<M> {
    fn clone(&self) -> Self {
        Self {
            address: self.address,
            sender: self.sender.clone(),
        }
    }
}

impl<M> TokenHolder<M> {
    /// Bind to a deployed TokenHolder
    pub fn new(sender: TxSender<M>, address: Address) -> Self {
        Self { address, sender }
    }

    /// The TokenHolder proxy address
    pub fn address(&self) -> Address {
        self.address
    }

    /// `authorizeSession` call data
    pub fn authorize_session_data(&self, grant: &SessionKeyGrant) -> ClientResult<Bytes> {
        session_grants(
            "authorizeSession",
            &[grant.key],
            &[grant.spending_limit],
            &[grant.expiration_height],
        )?;
        Ok(self.sender.registry().encode_call(
            ContractName::TokenHolder,
            "authorizeSession",
            &[
                grant.key.into_token(),
                grant.spending_limit.into_token(),
                grant.expiration_height.into_token(),
            ],
        )?)
    }

    /// `revokeSession` call data
    pub fn revoke_session_data(&self, key: Address) -> ClientResult<Bytes> {
        require_session_key("revokeSession", key)?;
        Ok(self.sender.registry().encode_call(
            ContractName::TokenHolder,
            "revokeSession",
            &[key.into_token()],
        )?)
    }

    /// Safe transaction authorizing a session key, to be signed by the
    /// owners and executed at `nonce`
    pub fn authorize_session(&self, grant: &SessionKeyGrant, nonce: U256) -> ClientResult<SafeTransactionData> {
        let data = self.authorize_session_data(grant)?;
        Ok(SafeTransactionData::call(self.address, data, nonce))
    }

    /// Safe transaction revoking a session key
    pub fn revoke_session(&self, key: Address, nonce: U256) -> ClientResult<SafeTransactionData> {
        let data = self.revoke_session_data(key)?;
        Ok(SafeTransactionData::call(self.address, data, nonce))
    }

    /// Decode `SessionAuthorized`/`SessionRevoked` events from a receipt
    pub fn events(&self, receipt: &TransactionReceipt) -> ClientResult<Vec<DecodedEvent>> {
        let abi = self.sender.registry().abi(ContractName::TokenHolder)?;
        Ok(events::decode_events(abi, receipt))
    }
}

impl<M> TokenHolder<M>
where
    M: Middleware,
{
    /// The owning Safe
    pub async fn owner(&self) -> ClientResult<Address> {
        let mut tokens = view_call!(self.sender, ContractName::TokenHolder, self.address, "owner")?
            .into_iter();
        Ok(next_token!(tokens, Address))
    }

    /// The on-chain record for `key`
    pub async fn session_key(&self, key: Address) -> ClientResult<SessionKeyData> {
        let mut tokens = view_call!(
            self.sender,
            ContractName::TokenHolder,
            self.address,
            "sessionKeys",
            &[key.into_token()]
        )?
        .into_iter();
        let spending_limit = next_token!(tokens, U256);
        let expiration_height = next_token!(tokens, U256);
        let nonce = next_token!(tokens, U256);
        let status = next_token!(tokens, U256).try_into()?;
        Ok(SessionKeyData {
            spending_limit,
            expiration_height,
            nonce,
            status,
        })
    }

    /// The state of `key` at the current block
    pub async fn session_state(&self, key: Address) -> ClientResult<SessionState> {
        let (data, height) = tokio::join!(self.session_key(key), self.sender.block_number());
        Ok(data?.state_at(height?.as_u64().into()))
    }
}
