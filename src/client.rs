use std::{sync::Arc, time::Duration};

use ethers::{
    providers::Middleware,
    types::{
        transaction::eip2718::TypedTransaction, Address, Bytes, TransactionReceipt,
        TransactionRequest, H256, U256, U64,
    },
};
use tracing_futures::Instrument;

use crate::registry::{ContractName, ContractRegistry, RegistryError};

/// SDK Errors
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Malformed or mismatched arguments, caught before any RPC
    #[error("Invalid arguments for {call}: {reason}")]
    Validation {
        /// The contract call being assembled
        call: &'static str,
        /// What was wrong
        reason: String,
    },
    /// Contract registry lookup failed
    #[error("{0}")]
    Registry(#[from] RegistryError),
    /// The node refused the transaction before it was mined
    #[error("Submission of {call} rejected: {reason}")]
    Submission {
        /// The contract call being submitted
        call: &'static str,
        /// The node's error
        reason: String,
    },
    /// The transaction was mined but failed
    #[error("{call} reverted in transaction {tx_hash:?}")]
    Revert {
        /// The contract call that reverted
        call: &'static str,
        /// Hash of the mined transaction
        tx_hash: H256,
        /// Receipt of the mined transaction
        receipt: Box<TransactionReceipt>,
    },
    /// The receipt does not contain an event the call must emit
    #[error("Expected event {event} missing from transaction {tx_hash:?}")]
    MissingEvent {
        /// Event name
        event: &'static str,
        /// Hash of the mined transaction
        tx_hash: H256,
    },
    /// No receipt within the configured polling budget
    #[error("No receipt for {tx_hash:?} after {polls} polls")]
    ReceiptTimeout {
        /// Hash of the submitted transaction
        tx_hash: H256,
        /// Number of `eth_getTransactionReceipt` polls
        polls: usize,
    },
    /// RPC transport or node error outside of submission
    #[error("Provider error: {0}")]
    Provider(String),
    /// ABI encoding/decoding Error
    #[error("{0}")]
    Abi(#[from] ethers::abi::Error),
    /// Signer Error
    #[error("Signer error: {0}")]
    Signer(String),
    /// Serde Json deser Error
    #[error("{0}")]
    SerdeError(#[from] serde_json::Error),
    /// Configuration Error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// The receipt of a reverted transaction, if this is a revert
    pub fn receipt(&self) -> Option<&TransactionReceipt> {
        match self {
            ClientError::Revert { receipt, .. } => Some(receipt.as_ref()),
            _ => None,
        }
    }
}

/// SDK Results
pub type ClientResult<T> = Result<T, ClientError>;

/// Per-transaction overrides. Unset fields fall back to the sender's defaults,
/// then to the node (estimated gas, node gas price).
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxOptions {
    /// Sending account
    #[serde(default)]
    pub from: Option<Address>,
    /// Gas limit
    #[serde(default)]
    pub gas: Option<U256>,
    /// Legacy gas price
    #[serde(default)]
    pub gas_price: Option<U256>,
    /// Wei attached to the call
    #[serde(default)]
    pub value: Option<U256>,
}

impl TxOptions {
    /// Set the sending account
    pub fn from(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }

    /// Set the gas limit
    pub fn gas(mut self, gas: impl Into<U256>) -> Self {
        self.gas = Some(gas.into());
        self
    }

    /// Set the gas price
    pub fn gas_price(mut self, gas_price: impl Into<U256>) -> Self {
        self.gas_price = Some(gas_price.into());
        self
    }

    /// Attach wei
    pub fn value(mut self, value: impl Into<U256>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Fill every unset field from `defaults`
    pub fn or(&self, defaults: &TxOptions) -> TxOptions {
        TxOptions {
            from: self.from.or(defaults.from),
            gas: self.gas.or(defaults.gas),
            gas_price: self.gas_price.or(defaults.gas_price),
            value: self.value.or(defaults.value),
        }
    }
}

/// Default interval between receipt polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Default number of receipt polls before giving up
pub const DEFAULT_MAX_POLLS: usize = 120;

/// Submits transactions through an ethers middleware and waits for their
/// receipts. One submission yields one outcome, there are no retries.
#[derive(Debug)]
pub struct TxSender<M> {
    pub(crate) client: Arc<M>,
    pub(crate) registry: Arc<ContractRegistry>,
    defaults: TxOptions,
    poll_interval: Duration,
    max_polls: usize,
}

impl<M> Clone for TxSender<M> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            registry: self.registry.clone(),
            defaults: self.defaults.clone(),
            poll_interval: self.poll_interval,
            max_polls: self.max_polls,
        }
    }
}

impl<M> TxSender<M> {
    /// Instantiate a sender over a middleware, using the bundled registry
    pub fn new(client: M) -> Self {
        Self::from_arc(Arc::new(client))
    }

    /// Instantiate a sender over a shared middleware
    pub fn from_arc(client: Arc<M>) -> Self {
        Self {
            client,
            registry: ContractRegistry::bundled(),
            defaults: Default::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
        }
    }

    /// Use a different contract registry
    pub fn with_registry(mut self, registry: Arc<ContractRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Set the default transaction options
    pub fn with_defaults(mut self, defaults: TxOptions) -> Self {
        self.defaults = defaults;
        self
    }

    /// Set the receipt polling cadence
    pub fn with_polling(mut self, interval: Duration, max_polls: usize) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls.max(1);
        self
    }

    /// The underlying middleware
    pub fn client(&self) -> &Arc<M> {
        &self.client
    }

    /// The contract registry
    pub fn registry(&self) -> &ContractRegistry {
        &self.registry
    }

    /// Default transaction options
    pub fn defaults(&self) -> &TxOptions {
        &self.defaults
    }
}

impl<M> TxSender<M>
where
    M: Middleware,
{
    /// Perform a read-only `eth_call`
    pub async fn call(&self, to: Address, data: Bytes) -> ClientResult<Bytes> {
        let tx: TypedTransaction = TransactionRequest::new().to(to).data(data).into();
        self.client
            .call(&tx, None)
            .await
            .map_err(|e| ClientError::Provider(e.to_string()))
    }

    /// The chain id reported by the node
    pub async fn chain_id(&self) -> ClientResult<u64> {
        let id = self
            .client
            .get_chainid()
            .await
            .map_err(|e| ClientError::Provider(e.to_string()))?;
        Ok(id.low_u64())
    }

    /// The current block height
    pub async fn block_number(&self) -> ClientResult<U64> {
        self.client
            .get_block_number()
            .await
            .map_err(|e| ClientError::Provider(e.to_string()))
    }

    /// Submit `data` to `to` (or a contract creation when `to` is `None`) and
    /// wait until it is mined.
    ///
    /// # Errors
    ///
    /// - `Submission` if gas estimation or `eth_send*Transaction` fails
    /// - `ReceiptTimeout` if the polling budget is exhausted
    /// - `Revert` if the receipt status is 0
    pub async fn send(
        &self,
        call: &'static str,
        to: Option<Address>,
        data: Bytes,
        options: &TxOptions,
    ) -> ClientResult<TransactionReceipt> {
        let options = options.or(&self.defaults);
        let span = tracing::info_span!("send_transaction", call, to = ?to);
        self.send_inner(call, to, data, options).instrument(span).await
    }

    async fn send_inner(
        &self,
        call: &'static str,
        to: Option<Address>,
        data: Bytes,
        options: TxOptions,
    ) -> ClientResult<TransactionReceipt> {
        let mut request = TransactionRequest::new().data(data);
        if let Some(to) = to {
            request = request.to(to);
        }
        if let Some(from) = options.from {
            request = request.from(from);
        }
        if let Some(gas_price) = options.gas_price {
            request = request.gas_price(gas_price);
        }
        if let Some(value) = options.value {
            request = request.value(value);
        }
        let mut tx: TypedTransaction = request.into();

        let gas = match options.gas {
            Some(gas) => gas,
            None => self
                .client
                .estimate_gas(&tx, None)
                .await
                .map_err(|e| ClientError::Submission {
                    call,
                    reason: e.to_string(),
                })?,
        };
        tx.set_gas(gas);

        tracing::debug!(gas = %gas, "Dispatching transaction");
        let tx_hash = {
            let pending = self
                .client
                .send_transaction(tx, None)
                .await
                .map_err(|e| ClientError::Submission {
                    call,
                    reason: e.to_string(),
                })?;
            *pending
        };

        let receipt = self.await_receipt(tx_hash).await?;
        if receipt.status == Some(U64::zero()) {
            tracing::warn!(tx_hash = ?tx_hash, "Transaction reverted");
            return Err(ClientError::Revert {
                call,
                tx_hash,
                receipt: Box::new(receipt),
            });
        }
        tracing::info!(
            tx_hash = ?tx_hash,
            block = ?receipt.block_number,
            gas_used = ?receipt.gas_used,
            "Transaction mined"
        );
        Ok(receipt)
    }

    /// Poll `eth_getTransactionReceipt` until the transaction is mined
    pub async fn await_receipt(&self, tx_hash: H256) -> ClientResult<TransactionReceipt> {
        for poll in 1..=self.max_polls {
            let receipt = self
                .client
                .get_transaction_receipt(tx_hash)
                .await
                .map_err(|e| ClientError::Provider(e.to_string()))?;
            if let Some(receipt) = receipt {
                return Ok(receipt);
            }
            if poll < self.max_polls {
                tokio::time::sleep(self.poll_interval).await;
            }
        }
        Err(ClientError::ReceiptTimeout {
            tx_hash,
            polls: self.max_polls,
        })
    }

    /// Deploy a registered contract with ABI-encoded constructor arguments
    pub async fn deploy(
        &self,
        name: ContractName,
        constructor_args: &[ethers::abi::Token],
        options: &TxOptions,
    ) -> ClientResult<TransactionReceipt> {
        let data = self.registry.deployment_data(name, constructor_args)?;
        let receipt = self.send("deploy", None, data, options).await?;
        if receipt.contract_address.is_none() {
            return Err(ClientError::Provider(format!(
                "Deployment of {} returned no contract address",
                name
            )));
        }
        Ok(receipt)
    }
}
