use ethers::{
    abi::Tokenizable,
    providers::Middleware,
    types::{Address, Bytes, TransactionReceipt, U256},
};

use super::{
    gnosis_safe::{self, GnosisSafe},
    require_address,
    token_holder::{grant_tokens, session_grants, SessionKeyGrant, TokenHolder},
};
use crate::{
    client::{ClientError, ClientResult, TxOptions, TxSender},
    events,
    registry::ContractName,
    safe::SafeVersion,
};

/// Addresses of the deployed contracts a user wallet is cloned from and
/// bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserWalletContracts {
    /// `UserWalletFactory`
    pub factory: Address,
    /// Safe master copy the proxy delegates to
    pub gnosis_safe_master_copy: Address,
    /// TokenHolder master copy the proxy delegates to
    pub token_holder_master_copy: Address,
    /// EIP20 token of the economy
    pub token: Address,
    /// Transfer rules of the economy
    pub token_rules: Address,
}

impl UserWalletContracts {
    fn validate(&self, call: &'static str) -> ClientResult<()> {
        require_address(call, "factory", self.factory)?;
        require_address(call, "gnosis safe master copy", self.gnosis_safe_master_copy)?;
        require_address(call, "token holder master copy", self.token_holder_master_copy)?;
        require_address(call, "token", self.token)?;
        require_address(call, "token rules", self.token_rules)
    }
}

/// The two proxies created for a user
#[derive(Debug, Clone)]
pub struct UserWallet {
    /// The multisig owning the token holder
    pub gnosis_safe: Address,
    /// The session-key token holder
    pub token_holder: Address,
    /// Receipt of the factory call
    pub receipt: TransactionReceipt,
}

/// Creates user wallets through the factory and binds facades to them
#[derive(Debug)]
pub struct User<M> {
    sender: TxSender<M>,
    contracts: UserWalletContracts,
}

impl<M> Clone for User<M> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            contracts: self.contracts,
        }
    }
}

impl<M> User<M> {
    /// A wallet creator for the given deployment
    pub fn new(sender: TxSender<M>, contracts: UserWalletContracts) -> Self {
        Self { sender, contracts }
    }

    /// Configured contract addresses
    pub fn contracts(&self) -> &UserWalletContracts {
        &self.contracts
    }

    /// `createUserWallet` call data.
    ///
    /// Validates the owner set, the threshold and the session key arrays
    /// before encoding anything.
    pub fn create_user_wallet_data(
        &self,
        owners: &[Address],
        threshold: u64,
        session_keys: &[Address],
        spending_limits: &[U256],
        expiration_heights: &[U256],
    ) -> ClientResult<Bytes> {
        let grants = session_grants(
            "createUserWallet",
            session_keys,
            spending_limits,
            expiration_heights,
        )?;
        self.encode_create(owners, threshold, &grants)
    }

    fn encode_create(
        &self,
        owners: &[Address],
        threshold: u64,
        grants: &[SessionKeyGrant],
    ) -> ClientResult<Bytes> {
        self.contracts.validate("createUserWallet")?;
        let registry = self.sender.registry();
        let safe_setup = gnosis_safe::setup_data(registry, owners, threshold)?;
        let [keys, limits, heights] = grant_tokens(grants);
        Ok(registry.encode_call(
            ContractName::UserWalletFactory,
            "createUserWallet",
            &[
                self.contracts.gnosis_safe_master_copy.into_token(),
                safe_setup.into_token(),
                self.contracts.token_holder_master_copy.into_token(),
                self.contracts.token.into_token(),
                self.contracts.token_rules.into_token(),
                keys,
                limits,
                heights,
            ],
        )?)
    }

    /// Bind a Safe facade to an existing wallet
    pub fn gnosis_safe(&self, address: Address, version: SafeVersion, chain_id: u64) -> GnosisSafe<M> {
        GnosisSafe::new(self.sender.clone(), address, version, chain_id)
    }

    /// Bind a TokenHolder facade to an existing wallet
    pub fn token_holder(&self, address: Address) -> TokenHolder<M> {
        TokenHolder::new(self.sender.clone(), address)
    }
}

impl<M> User<M>
where
    M: Middleware,
{
    /// Create a Safe proxy and a TokenHolder proxy owned by it, with the
    /// given session keys authorized from the start.
    ///
    /// # Errors
    ///
    /// `Validation` before any RPC when arguments are inconsistent,
    /// `MissingEvent` if the factory did not emit `UserWalletCreated`.
    pub async fn create_user_wallet(
        &self,
        owners: &[Address],
        threshold: u64,
        session_keys: &[Address],
        spending_limits: &[U256],
        expiration_heights: &[U256],
        options: &TxOptions,
    ) -> ClientResult<UserWallet> {
        let data = self.create_user_wallet_data(
            owners,
            threshold,
            session_keys,
            spending_limits,
            expiration_heights,
        )?;
        let receipt = self
            .sender
            .send("createUserWallet", Some(self.contracts.factory), data, options)
            .await?;

        let abi = self.sender.registry().abi(ContractName::UserWalletFactory)?;
        let created = events::find_event(abi, &receipt, "UserWalletCreated")?;
        let missing = |param: &str| ClientError::Provider(format!("UserWalletCreated without {}", param));
        let gnosis_safe = created
            .address_param("_gnosisSafeProxy")
            .ok_or_else(|| missing("_gnosisSafeProxy"))?;
        let token_holder = created
            .address_param("_tokenHolderProxy")
            .ok_or_else(|| missing("_tokenHolderProxy"))?;
        tracing::info!(
            gnosis_safe = ?gnosis_safe,
            token_holder = ?token_holder,
            "User wallet created"
        );
        Ok(UserWallet {
            gnosis_safe,
            token_holder,
            receipt,
        })
    }
}
