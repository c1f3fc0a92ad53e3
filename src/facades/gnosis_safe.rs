use std::{future::Future, sync::Arc};

use ethers::{
    abi::{Token, Tokenizable},
    providers::Middleware,
    signers::Signer,
    types::{transaction::eip712::TypedData, Address, Bytes, TransactionReceipt, H256, U256},
};
use tokio::sync::Mutex;

use crate::{
    client::{ClientError, ClientResult, TxOptions, TxSender},
    events::{self, DecodedEvent},
    next_token,
    registry::{ContractName, ContractRegistry},
    safe::{
        owners::{validate_owner_address, validate_owners, validate_threshold},
        find_previous_owner, SafeInfo, SafeSignatures, SafeTransactionData, SafeVersion,
    },
    view_call,
};

/// `setup` call data for a fresh Safe proxy: no setup delegate call, no
/// fallback handler, no deployment payment.
///
/// Encodes the 1.1+ signature with `fallbackHandler`, so the master copy must
/// be 1.1.1 or later.
pub fn setup_data(
    registry: &ContractRegistry,
    owners: &[Address],
    threshold: u64,
) -> ClientResult<Bytes> {
    validate_owners("setup", owners, threshold)?;
    Ok(registry.encode_call(
        ContractName::GnosisSafe,
        "setup",
        &[
            owners.to_vec().into_token(),
            U256::from(threshold).into_token(),
            Address::zero().into_token(),
            Bytes::default().into_token(),
            Address::zero().into_token(),
            Address::zero().into_token(),
            U256::zero().into_token(),
            Address::zero().into_token(),
        ],
    )?)
}

fn require_threshold(call: &'static str, threshold: u64) -> ClientResult<()> {
    if threshold == 0 {
        return Err(ClientError::Validation {
            call,
            reason: "threshold must be at least 1".to_owned(),
        });
    }
    Ok(())
}

/// A deployed Safe: owner management, nonce reads and `execTransaction`
#[derive(Debug)]
pub struct GnosisSafe<M> {
    address: Address,
    sender: TxSender<M>,
    version: SafeVersion,
    chain_id: u64,
    sequencer: Arc<Mutex<()>>,
}

impl<M> Clone for GnosisSafe<M> {
    fn clone(&self) -> Self {
        Self {
            address: self.address,
            sender: self.sender.clone(),
            version: self.version,
            chain_id: self.chain_id,
            sequencer: self.sequencer.clone(),
        }
    }
}

impl<M> GnosisSafe<M> {
    /// Bind to a Safe with a known schema version and chain id
    pub fn new(sender: TxSender<M>, address: Address, version: SafeVersion, chain_id: u64) -> Self {
        Self {
            address,
            sender,
            version,
            chain_id,
            sequencer: Default::default(),
        }
    }

    /// The Safe proxy address
    pub fn address(&self) -> Address {
        self.address
    }

    /// EIP-712 schema version
    pub fn version(&self) -> SafeVersion {
        self.version
    }

    /// Chain id used in the domain separator
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// The sender used for calls and transactions
    pub fn sender(&self) -> &TxSender<M> {
        &self.sender
    }

    fn encode(&self, function: &str, args: &[Token]) -> ClientResult<Bytes> {
        Ok(self
            .sender
            .registry()
            .encode_call(ContractName::GnosisSafe, function, args)?)
    }

    /// `addOwnerWithThreshold` call data
    pub fn add_owner_with_threshold_data(&self, owner: Address, threshold: u64) -> ClientResult<Bytes> {
        validate_owner_address("addOwnerWithThreshold", owner)?;
        require_threshold("addOwnerWithThreshold", threshold)?;
        self.encode(
            "addOwnerWithThreshold",
            &[owner.into_token(), U256::from(threshold).into_token()],
        )
    }

    /// `removeOwner` call data. `prev_owner` is the predecessor in the owner
    /// linked list, see [`find_previous_owner`].
    pub fn remove_owner_data(
        &self,
        prev_owner: Address,
        owner: Address,
        threshold: u64,
    ) -> ClientResult<Bytes> {
        validate_owner_address("removeOwner", owner)?;
        require_threshold("removeOwner", threshold)?;
        self.encode(
            "removeOwner",
            &[
                prev_owner.into_token(),
                owner.into_token(),
                U256::from(threshold).into_token(),
            ],
        )
    }

    /// `swapOwner` call data
    pub fn swap_owner_data(
        &self,
        prev_owner: Address,
        old_owner: Address,
        new_owner: Address,
    ) -> ClientResult<Bytes> {
        validate_owner_address("swapOwner", old_owner)?;
        validate_owner_address("swapOwner", new_owner)?;
        self.encode(
            "swapOwner",
            &[
                prev_owner.into_token(),
                old_owner.into_token(),
                new_owner.into_token(),
            ],
        )
    }

    /// `changeThreshold` call data
    pub fn change_threshold_data(&self, threshold: u64) -> ClientResult<Bytes> {
        require_threshold("changeThreshold", threshold)?;
        self.encode("changeThreshold", &[U256::from(threshold).into_token()])
    }

    /// Wrap `data` as a value-less `CALL` from this Safe at `nonce`
    pub fn safe_tx(&self, to: Address, data: Bytes, nonce: U256) -> SafeTransactionData {
        SafeTransactionData::call(to, data, nonce)
    }

    /// Safe transaction adding `owner` and setting the new threshold
    pub fn add_owner(&self, owner: Address, threshold: u64, nonce: U256) -> ClientResult<SafeTransactionData> {
        let data = self.add_owner_with_threshold_data(owner, threshold)?;
        Ok(self.safe_tx(self.address, data, nonce))
    }

    /// Safe transaction changing the threshold
    pub fn change_threshold(&self, threshold: u64, nonce: U256) -> ClientResult<SafeTransactionData> {
        let data = self.change_threshold_data(threshold)?;
        Ok(self.safe_tx(self.address, data, nonce))
    }

    /// The EIP-712 structure owners sign for `tx`
    pub fn typed_data(&self, tx: &SafeTransactionData) -> ClientResult<TypedData> {
        tx.typed_data(self.address, self.version, self.chain_id)
    }

    /// The digest owners sign for `tx`
    pub fn tx_hash(&self, tx: &SafeTransactionData) -> H256 {
        tx.safe_tx_hash(self.address, self.version, self.chain_id)
    }

    /// Sign `tx` as one owner
    pub async fn sign<S: Signer>(&self, tx: &SafeTransactionData, signer: &S) -> ClientResult<SafeSignatures> {
        let signature = tx.sign(signer, self.address, self.version, self.chain_id).await?;
        let mut sigs = SafeSignatures::new();
        sigs.add(signer.address(), signature);
        Ok(sigs)
    }

    /// Decode Safe events (`AddedOwner`, `RemovedOwner`, `ChangedThreshold`,
    /// `ExecutionSuccess`, ...) from a receipt
    pub fn events(&self, receipt: &TransactionReceipt) -> ClientResult<Vec<DecodedEvent>> {
        let abi = self.sender.registry().abi(ContractName::GnosisSafe)?;
        Ok(events::decode_events(abi, receipt))
    }
}

impl<M> GnosisSafe<M>
where
    M: Middleware,
{
    /// Bind to a Safe, reading the chain id from the node
    pub async fn connect(sender: TxSender<M>, address: Address, version: SafeVersion) -> ClientResult<Self> {
        let chain_id = sender.chain_id().await?;
        Ok(Self::new(sender, address, version, chain_id))
    }

    /// The next usable nonce. Never cached: fetch it right before building a
    /// new Safe transaction.
    pub async fn nonce(&self) -> ClientResult<U256> {
        let mut tokens = view_call!(self.sender, ContractName::GnosisSafe, self.address, "nonce")?
            .into_iter();
        Ok(next_token!(tokens, U256))
    }

    /// Owners in linked-list order, head first
    pub async fn owners(&self) -> ClientResult<Vec<Address>> {
        let mut tokens = view_call!(self.sender, ContractName::GnosisSafe, self.address, "getOwners")?
            .into_iter();
        Ok(next_token!(tokens, Vec<Address>))
    }

    /// Number of owner approvals required
    pub async fn threshold(&self) -> ClientResult<U256> {
        let mut tokens = view_call!(self.sender, ContractName::GnosisSafe, self.address, "getThreshold")?
            .into_iter();
        Ok(next_token!(tokens, U256))
    }

    /// True if `owner` is an owner of the Safe
    pub async fn is_owner(&self, owner: Address) -> ClientResult<bool> {
        let mut tokens = view_call!(
            self.sender,
            ContractName::GnosisSafe,
            self.address,
            "isOwner",
            &[owner.into_token()]
        )?
        .into_iter();
        Ok(next_token!(tokens, bool))
    }

    /// Nonce, threshold and owners, read concurrently
    pub async fn info(&self) -> ClientResult<SafeInfo> {
        let (nonce, threshold, owners) = tokio::join!(self.nonce(), self.threshold(), self.owners());
        Ok(SafeInfo {
            address: self.address,
            nonce: nonce?,
            threshold: threshold?,
            owners: owners?,
        })
    }

    /// Safe transaction removing `owner`. The predecessor is resolved from
    /// the current owner list, and `threshold` must fit the remaining owners.
    pub async fn remove_owner(
        &self,
        owner: Address,
        threshold: u64,
        nonce: U256,
    ) -> ClientResult<SafeTransactionData> {
        let owners = self.owners().await?;
        let prev = find_previous_owner(&owners, owner)?;
        validate_threshold("removeOwner", threshold, owners.len() - 1)?;
        let data = self.remove_owner_data(prev, owner, threshold)?;
        Ok(self.safe_tx(self.address, data, nonce))
    }

    /// Safe transaction replacing `old_owner` by `new_owner` in place
    pub async fn swap_owner(
        &self,
        old_owner: Address,
        new_owner: Address,
        nonce: U256,
    ) -> ClientResult<SafeTransactionData> {
        let owners = self.owners().await?;
        let prev = find_previous_owner(&owners, old_owner)?;
        if owners.contains(&new_owner) {
            return Err(ClientError::Validation {
                call: "swapOwner",
                reason: format!("{:?} is already an owner", new_owner),
            });
        }
        let data = self.swap_owner_data(prev, old_owner, new_owner)?;
        Ok(self.safe_tx(self.address, data, nonce))
    }

    /// `execTransaction` call data for `tx` with aggregated `signatures`
    pub fn exec_transaction_data(
        &self,
        tx: &SafeTransactionData,
        signatures: &SafeSignatures,
    ) -> ClientResult<Bytes> {
        if signatures.is_empty() {
            return Err(ClientError::Validation {
                call: "execTransaction",
                reason: "no owner signatures".to_owned(),
            });
        }
        self.encode(
            "execTransaction",
            &[
                tx.core.to.into_token(),
                tx.core.value.into_token(),
                tx.core.data.clone().into_token(),
                tx.core.operation.into_token(),
                tx.gas.safe_tx_gas.into_token(),
                tx.gas.base_gas.into_token(),
                tx.gas.gas_price.into_token(),
                tx.gas.gas_token.into_token(),
                tx.gas.refund_receiver.into_token(),
                signatures.to_bytes().into_token(),
            ],
        )
    }

    /// Execute `tx` with externally aggregated owner signatures.
    ///
    /// # Errors
    ///
    /// `Revert` when the transaction is mined with status 0, or when this Safe
    /// reports `ExecutionFailure` for the inner call. Failures logged by other
    /// contracts, such as a nested Safe, are left to the caller.
    pub async fn exec_transaction(
        &self,
        tx: &SafeTransactionData,
        signatures: &SafeSignatures,
        options: &TxOptions,
    ) -> ClientResult<TransactionReceipt> {
        let data = self.exec_transaction_data(tx, signatures)?;
        tracing::debug!(
            safe = ?self.address,
            nonce = %tx.nonce,
            signers = signatures.len(),
            "Executing Safe transaction"
        );
        let receipt = self
            .sender
            .send("execTransaction", Some(self.address), data, options)
            .await?;
        let failed = self
            .events(&receipt)?
            .iter()
            .any(|e| e.name == "ExecutionFailure" && *e.address == self.address);
        if failed {
            return Err(ClientError::Revert {
                call: "execTransaction",
                tx_hash: receipt.transaction_hash,
                receipt: Box::new(receipt),
            });
        }
        Ok(receipt)
    }

    /// Sign `tx` with each of `signers`, combine and execute
    pub async fn execute_signed<S: Signer>(
        &self,
        tx: &SafeTransactionData,
        signers: &[S],
        options: &TxOptions,
    ) -> ClientResult<TransactionReceipt> {
        let mut signatures = SafeSignatures::new();
        for signer in signers {
            let signature = tx
                .sign(signer, self.address, self.version, self.chain_id)
                .await?;
            signatures.add(signer.address(), signature);
        }
        self.exec_transaction(tx, &signatures, options).await
    }

    /// Run a fetch-nonce, build, sign, execute sequence while holding this
    /// Safe's sequencing lock. Clones of this facade share the lock, so
    /// sequences issued through them never build from the same nonce.
    pub async fn with_fresh_nonce<F, Fut, T>(&self, f: F) -> ClientResult<T>
    where
        F: FnOnce(U256) -> Fut,
        Fut: Future<Output = ClientResult<T>>,
    {
        let _guard = self.sequencer.lock().await;
        let nonce = self.nonce().await?;
        tracing::debug!(safe = ?self.address, nonce = %nonce, "Sequenced Safe transaction");
        f(nonce).await
    }
}
