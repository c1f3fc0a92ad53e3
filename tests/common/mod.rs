#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;
use ethers::{
    abi::{self, Function, Token, Tokenizable},
    providers::{JsonRpcClient, Provider, ProviderError},
    signers::LocalWallet,
    types::{Address, Bytes, Log, Signature, TransactionReceipt, H256, U256},
    utils::keccak256,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use tokenholder_sdk::{
    registry::{ContractName, ContractRegistry},
    safe::{
        signatures::split_signatures, MetaTransactionData, Operations, SafeGasConfig,
        SafeTransactionData, SafeVersion, SENTINEL_OWNERS,
    },
    TxOptions, TxSender, UserWalletContracts,
};

pub const CHAIN_ID: u64 = 1337;
pub const START_BLOCK: u64 = 100;

pub fn wallet(n: u64) -> LocalWallet {
    format!("{:064x}", n + 1).parse().unwrap()
}

pub fn contracts() -> UserWalletContracts {
    UserWalletContracts {
        factory: Address::from_low_u64_be(0xfac7),
        gnosis_safe_master_copy: Address::from_low_u64_be(0x5afe),
        token_holder_master_copy: Address::from_low_u64_be(0x70c0),
        token: Address::from_low_u64_be(0xe20),
        token_rules: Address::from_low_u64_be(0x1e5),
    }
}

/// Account the tests send transactions from
pub fn relayer() -> Address {
    Address::from_low_u64_be(0x5e4d)
}

#[derive(Debug, thiserror::Error)]
pub enum MockChainError {
    #[error("{0}")]
    Rpc(String),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

impl From<MockChainError> for ProviderError {
    fn from(e: MockChainError) -> Self {
        ProviderError::CustomError(e.to_string())
    }
}

fn rpc(reason: impl Into<String>) -> MockChainError {
    MockChainError::Rpc(reason.into())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockSafe {
    /// Linked-list order, head first
    pub owners: Vec<Address>,
    pub threshold: u64,
    pub nonce: U256,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockSession {
    pub spending_limit: U256,
    pub expiration_height: U256,
    pub nonce: U256,
    pub status: u8,
}

#[derive(Debug, Clone)]
pub struct MockHolder {
    pub owner: Address,
    pub token: Address,
    pub token_rules: Address,
    pub sessions: HashMap<Address, MockSession>,
}

#[derive(Debug, Default)]
struct ChainState {
    block: u64,
    tx_count: u64,
    proxies: u64,
    safes: HashMap<Address, MockSafe>,
    holders: HashMap<Address, MockHolder>,
    receipts: HashMap<H256, TransactionReceipt>,
    methods: Vec<String>,
    reverts: Vec<String>,
    rejected_senders: HashSet<Address>,
    withhold_receipts: bool,
}

/// In-memory JSON-RPC backend modelling the wallet factory, Safe proxies and
/// TokenHolder proxies. Every transaction is mined on submission.
#[derive(Debug, Clone)]
pub struct MockChain {
    factory: Address,
    version: SafeVersion,
    state: Arc<Mutex<ChainState>>,
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            factory: contracts().factory,
            version: SafeVersion::default(),
            state: Arc::new(Mutex::new(ChainState {
                block: START_BLOCK,
                ..Default::default()
            })),
        }
    }

    pub fn with_safe_version(mut self, version: SafeVersion) -> Self {
        self.version = version;
        self
    }

    fn state(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap()
    }

    /// A sender over this chain, sending from [`relayer`]
    pub fn sender(&self) -> TxSender<Provider<MockChain>> {
        TxSender::new(Provider::new(self.clone()))
            .with_defaults(TxOptions::default().from(relayer()))
            .with_polling(Duration::from_millis(1), 3)
    }

    /// Every RPC method called so far, in order
    pub fn methods(&self) -> Vec<String> {
        self.state().methods.clone()
    }

    pub fn clear_methods(&self) {
        self.state().methods.clear();
    }

    /// Reasons of reverted transactions and failed inner Safe calls
    pub fn reverts(&self) -> Vec<String> {
        self.state().reverts.clone()
    }

    pub fn safe(&self, address: Address) -> Option<MockSafe> {
        self.state().safes.get(&address).cloned()
    }

    pub fn holder(&self, address: Address) -> Option<MockHolder> {
        self.state().holders.get(&address).cloned()
    }

    /// Reject transactions from `sender` as if it could not pay for gas
    pub fn reject_sender(&self, sender: Address) {
        self.state().rejected_senders.insert(sender);
    }

    /// Never return receipts, as for a transaction stuck in the mempool
    pub fn withhold_receipts(&self) {
        self.state().withhold_receipts = true;
    }

    pub fn mine_blocks(&self, blocks: u64) {
        self.state().block += blocks;
    }

    pub fn block(&self) -> u64 {
        self.state().block
    }

    fn handle(&self, method: &str, params: &Value) -> Result<Value, MockChainError> {
        let mut state = self.state();
        state.methods.push(method.to_owned());
        match method {
            "eth_chainId" => Ok(json!(format!("0x{:x}", CHAIN_ID))),
            "eth_blockNumber" => Ok(json!(format!("0x{:x}", state.block))),
            "eth_gasPrice" => Ok(json!("0x3b9aca00")),
            "eth_estimateGas" => {
                let call = CallParams::parse(&params[0])?;
                state.check_sender(&call)?;
                Ok(json!("0x30d40"))
            }
            "eth_call" => {
                let call = CallParams::parse(&params[0])?;
                let out = view(&state, &call)?;
                Ok(serde_json::to_value(Bytes::from(out))?)
            }
            "eth_sendTransaction" => {
                let call = CallParams::parse(&params[0])?;
                state.check_sender(&call)?;
                let hash = self.mine(&mut state, &call);
                Ok(serde_json::to_value(hash)?)
            }
            "eth_getTransactionReceipt" => {
                let hash: H256 = serde_json::from_value(params[0].clone())?;
                if state.withhold_receipts {
                    return Ok(Value::Null);
                }
                match state.receipts.get(&hash) {
                    Some(receipt) => Ok(serde_json::to_value(receipt)?),
                    None => Ok(Value::Null),
                }
            }
            other => Err(rpc(format!("method {} not supported", other))),
        }
    }

    fn mine(&self, state: &mut ChainState, call: &CallParams) -> H256 {
        let from = call.from.unwrap_or_default();
        state.block += 1;
        state.tx_count += 1;
        let hash = H256::from(keccak256(state.tx_count.to_be_bytes()));

        let (status, logs) = match self.execute(state, from, call) {
            Ok(logs) => (1u64, logs),
            Err(reason) => {
                state.reverts.push(reason);
                (0, vec![])
            }
        };
        let block = state.block;
        let receipt = TransactionReceipt {
            transaction_hash: hash,
            block_number: Some(block.into()),
            cumulative_gas_used: 100_000u64.into(),
            gas_used: Some(100_000u64.into()),
            status: Some(status.into()),
            logs: logs
                .into_iter()
                .map(|log| Log {
                    transaction_hash: Some(hash),
                    block_number: Some(block.into()),
                    ..log
                })
                .collect(),
            ..Default::default()
        };
        state.receipts.insert(hash, receipt);
        hash
    }

    fn execute(&self, state: &mut ChainState, from: Address, call: &CallParams) -> Result<Vec<Log>, String> {
        let to = call.to.ok_or("contract creation is not modelled")?;
        if to == self.factory {
            return create_user_wallet(state, self.factory, &call.data);
        }
        if state.safes.contains_key(&to) {
            return self.exec_transaction(state, from, to, &call.data);
        }
        if state.holders.contains_key(&to) {
            return Err("Only owner is allowed to call".to_owned());
        }
        Err(format!("no contract at {:?}", to))
    }

    fn exec_transaction(
        &self,
        state: &mut ChainState,
        from: Address,
        safe_address: Address,
        data: &[u8],
    ) -> Result<Vec<Log>, String> {
        let (function, args) = decode_call(ContractName::GnosisSafe, data)?;
        if function.name != "execTransaction" {
            return Err(format!("Method can only be called from this contract: {}", function.name));
        }
        let mut args = args.into_iter();
        let core = MetaTransactionData {
            to: address(&mut args)?.into(),
            value: uint(&mut args)?,
            data: bytes(&mut args)?.into(),
            operation: Operations::from_token(next(&mut args)?).map_err(|e| e.to_string())?,
        };
        let gas = SafeGasConfig {
            safe_tx_gas: uint(&mut args)?,
            base_gas: uint(&mut args)?,
            gas_price: uint(&mut args)?,
            gas_token: address(&mut args)?.into(),
            refund_receiver: address(&mut args)?.into(),
        };
        let signatures = bytes(&mut args)?;

        let safe = state.safes.get(&safe_address).cloned().ok_or("unknown safe")?;
        let tx = SafeTransactionData::new(core, gas, safe.nonce);
        let tx_hash = tx.safe_tx_hash(safe_address, self.version, CHAIN_ID);
        check_signatures(&safe, from, tx_hash, &signatures)?;
        if let Some(safe) = state.safes.get_mut(&safe_address) {
            safe.nonce += U256::one();
        }

        let target = *tx.core.to;
        let inner = if tx.core.operation == Operations::DelegateCall {
            Err("delegate calls are not modelled".to_owned())
        } else if target == safe_address {
            safe_self_call(state, safe_address, &tx.core.data)
        } else if state.safes.contains_key(&target) {
            self.exec_transaction(state, safe_address, target, &tx.core.data)
        } else if state.holders.contains_key(&target) {
            holder_call(state, safe_address, target, &tx.core.data)
        } else {
            Err(format!("no contract at {:?}", target))
        };

        let result = vec![tx_hash.into_token(), U256::zero().into_token()];
        match inner {
            Ok(mut logs) => {
                logs.push(event_log(safe_address, ContractName::GnosisSafe, "ExecutionSuccess", result));
                Ok(logs)
            }
            Err(reason) => {
                state.reverts.push(reason);
                Ok(vec![event_log(
                    safe_address,
                    ContractName::GnosisSafe,
                    "ExecutionFailure",
                    result,
                )])
            }
        }
    }
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JsonRpcClient for MockChain {
    type Error = MockChainError;

    async fn request<T, R>(&self, method: &str, params: T) -> Result<R, Self::Error>
    where
        T: std::fmt::Debug + Serialize + Send + Sync,
        R: DeserializeOwned,
    {
        let params = serde_json::to_value(params)?;
        let result = self.handle(method, &params)?;
        Ok(serde_json::from_value(result)?)
    }
}

impl ChainState {
    fn check_sender(&self, call: &CallParams) -> Result<(), MockChainError> {
        match call.from {
            Some(from) if self.rejected_senders.contains(&from) => {
                Err(rpc("insufficient funds for gas * price + value"))
            }
            _ => Ok(()),
        }
    }
}

struct CallParams {
    from: Option<Address>,
    to: Option<Address>,
    data: Vec<u8>,
}

impl CallParams {
    fn parse(tx: &Value) -> Result<Self, MockChainError> {
        let field = |key: &str| tx.get(key).filter(|v| !v.is_null()).cloned();
        let data: Option<Bytes> = field("data")
            .or_else(|| field("input"))
            .map(serde_json::from_value)
            .transpose()?;
        Ok(Self {
            from: field("from").map(serde_json::from_value).transpose()?,
            to: field("to").map(serde_json::from_value).transpose()?,
            data: data.map(|d| d.to_vec()).unwrap_or_default(),
        })
    }
}

fn decode_call(contract: ContractName, data: &[u8]) -> Result<(Function, Vec<Token>), String> {
    let registry = ContractRegistry::bundled();
    let abi = registry.abi(contract).map_err(|e| e.to_string())?;
    if data.len() < 4 {
        return Err("call data without selector".to_owned());
    }
    let function = abi
        .functions()
        .find(|f| f.short_signature()[..] == data[..4])
        .ok_or_else(|| format!("{} has no function 0x{}", contract, hex::encode(&data[..4])))?
        .clone();
    let args = function.decode_input(&data[4..]).map_err(|e| e.to_string())?;
    Ok((function, args))
}

fn event_log(emitter: Address, contract: ContractName, event: &str, tokens: Vec<Token>) -> Log {
    let registry = ContractRegistry::bundled();
    let event = registry.abi(contract).unwrap().event(event).unwrap();
    Log {
        address: emitter,
        topics: vec![event.signature()],
        data: abi::encode(&tokens).into(),
        ..Default::default()
    }
}

fn next(args: &mut impl Iterator<Item = Token>) -> Result<Token, String> {
    args.next().ok_or_else(|| "missing argument".to_owned())
}

fn address(args: &mut impl Iterator<Item = Token>) -> Result<Address, String> {
    next(args)?.into_address().ok_or_else(|| "expected address".to_owned())
}

fn uint(args: &mut impl Iterator<Item = Token>) -> Result<U256, String> {
    next(args)?.into_uint().ok_or_else(|| "expected uint".to_owned())
}

fn bytes(args: &mut impl Iterator<Item = Token>) -> Result<Vec<u8>, String> {
    next(args)?.into_bytes().ok_or_else(|| "expected bytes".to_owned())
}

fn array(args: &mut impl Iterator<Item = Token>) -> Result<Vec<Token>, String> {
    next(args)?.into_array().ok_or_else(|| "expected array".to_owned())
}

fn view(state: &ChainState, call: &CallParams) -> Result<Vec<u8>, MockChainError> {
    let Some(to) = call.to else {
        return Err(rpc("eth_call without target"));
    };
    if let Some(safe) = state.safes.get(&to) {
        let (function, args) = decode_call(ContractName::GnosisSafe, &call.data).map_err(rpc)?;
        let out = match function.name.as_str() {
            "nonce" => vec![safe.nonce.into_token()],
            "getThreshold" => vec![U256::from(safe.threshold).into_token()],
            "getOwners" => vec![safe.owners.clone().into_token()],
            "isOwner" => {
                let owner = args[0].clone().into_address().unwrap_or_default();
                vec![safe.owners.contains(&owner).into_token()]
            }
            other => return Err(rpc(format!("GnosisSafe.{} is not a view", other))),
        };
        return Ok(abi::encode(&out));
    }
    if let Some(holder) = state.holders.get(&to) {
        let (function, args) = decode_call(ContractName::TokenHolder, &call.data).map_err(rpc)?;
        let out = match function.name.as_str() {
            "sessionKeys" => {
                let key = args[0].clone().into_address().unwrap_or_default();
                let session = holder.sessions.get(&key).copied().unwrap_or_default();
                vec![
                    session.spending_limit.into_token(),
                    session.expiration_height.into_token(),
                    session.nonce.into_token(),
                    U256::from(session.status).into_token(),
                ]
            }
            "owner" => vec![holder.owner.into_token()],
            "token" => vec![holder.token.into_token()],
            "tokenRules" => vec![holder.token_rules.into_token()],
            other => return Err(rpc(format!("TokenHolder.{} is not a view", other))),
        };
        return Ok(abi::encode(&out));
    }
    // no code at the target
    Ok(vec![])
}

fn check_signatures(safe: &MockSafe, from: Address, tx_hash: H256, signatures: &[u8]) -> Result<(), String> {
    let parts = split_signatures(signatures);
    let threshold = safe.threshold as usize;
    if parts.len() < threshold {
        return Err("Signatures data too short".to_owned());
    }
    let mut last = Address::zero();
    for (r, s, v) in parts.into_iter().take(threshold) {
        let owner = if v == 1 {
            let mut word = [0u8; 32];
            r.to_big_endian(&mut word);
            let owner = Address::from_slice(&word[12..]);
            if owner != from {
                return Err("Hash has not been approved".to_owned());
            }
            owner
        } else {
            Signature { r, s, v: v.into() }
                .recover(tx_hash)
                .map_err(|e| e.to_string())?
        };
        if owner <= last || !safe.owners.contains(&owner) {
            return Err("Invalid owner provided".to_owned());
        }
        last = owner;
    }
    Ok(())
}

fn valid_new_owner(owners: &[Address], owner: Address) -> Result<(), String> {
    if owner.is_zero() || owner == SENTINEL_OWNERS || owners.contains(&owner) {
        return Err("Address is null or already an owner".to_owned());
    }
    Ok(())
}

fn linked_position(owners: &[Address], prev: Address, owner: Address) -> Result<usize, String> {
    let i = owners
        .iter()
        .position(|o| *o == owner)
        .ok_or("Invalid prevOwner, owner pair provided")?;
    let expected = if i == 0 { SENTINEL_OWNERS } else { owners[i - 1] };
    if prev != expected {
        return Err("Invalid prevOwner, owner pair provided".to_owned());
    }
    Ok(i)
}

fn safe_self_call(state: &mut ChainState, safe_address: Address, data: &[u8]) -> Result<Vec<Log>, String> {
    let (function, args) = decode_call(ContractName::GnosisSafe, data)?;
    let safe = state.safes.get_mut(&safe_address).ok_or("unknown safe")?;
    let mut args = args.into_iter();
    let log = |event: &str, tokens: Vec<Token>| event_log(safe_address, ContractName::GnosisSafe, event, tokens);
    let mut logs = vec![];
    let new_threshold;
    match function.name.as_str() {
        "addOwnerWithThreshold" => {
            let owner = address(&mut args)?;
            new_threshold = uint(&mut args)?.as_u64();
            valid_new_owner(&safe.owners, owner)?;
            if new_threshold == 0 || new_threshold as usize > safe.owners.len() + 1 {
                return Err("Threshold cannot exceed owner count".to_owned());
            }
            safe.owners.insert(0, owner);
            logs.push(log("AddedOwner", vec![owner.into_token()]));
        }
        "removeOwner" => {
            let prev = address(&mut args)?;
            let owner = address(&mut args)?;
            new_threshold = uint(&mut args)?.as_u64();
            let i = linked_position(&safe.owners, prev, owner)?;
            if new_threshold == 0 || new_threshold as usize > safe.owners.len() - 1 {
                return Err("New owner count needs to be larger than new threshold".to_owned());
            }
            safe.owners.remove(i);
            logs.push(log("RemovedOwner", vec![owner.into_token()]));
        }
        "swapOwner" => {
            let prev = address(&mut args)?;
            let old = address(&mut args)?;
            let new = address(&mut args)?;
            valid_new_owner(&safe.owners, new)?;
            let i = linked_position(&safe.owners, prev, old)?;
            safe.owners[i] = new;
            logs.push(log("RemovedOwner", vec![old.into_token()]));
            logs.push(log("AddedOwner", vec![new.into_token()]));
            return Ok(logs);
        }
        "changeThreshold" => {
            new_threshold = uint(&mut args)?.as_u64();
            if new_threshold == 0 || new_threshold as usize > safe.owners.len() {
                return Err("Threshold cannot exceed owner count".to_owned());
            }
        }
        other => return Err(format!("GnosisSafe.{} is not modelled", other)),
    }
    if new_threshold != safe.threshold || function.name == "changeThreshold" {
        safe.threshold = new_threshold;
        logs.push(log("ChangedThreshold", vec![U256::from(new_threshold).into_token()]));
    }
    Ok(logs)
}

fn holder_call(
    state: &mut ChainState,
    safe_address: Address,
    holder_address: Address,
    data: &[u8],
) -> Result<Vec<Log>, String> {
    let (function, args) = decode_call(ContractName::TokenHolder, data)?;
    let block = state.block;
    let holder = state.holders.get_mut(&holder_address).ok_or("unknown token holder")?;
    if holder.owner != safe_address {
        return Err("Only owner is allowed to call".to_owned());
    }
    let mut args = args.into_iter();
    let log = |event: &str, tokens: Vec<Token>| event_log(holder_address, ContractName::TokenHolder, event, tokens);
    match function.name.as_str() {
        "authorizeSession" => {
            let key = address(&mut args)?;
            let spending_limit = uint(&mut args)?;
            let expiration_height = uint(&mut args)?;
            if key.is_zero() {
                return Err("Ephemeral key to authorize is 0".to_owned());
            }
            if holder.sessions.get(&key).map(|s| s.status).unwrap_or_default() != 0 {
                return Err("Key exists".to_owned());
            }
            if expiration_height <= U256::from(block) {
                return Err("Expiration height is lte to the current block height".to_owned());
            }
            holder.sessions.insert(
                key,
                MockSession {
                    spending_limit,
                    expiration_height,
                    nonce: U256::zero(),
                    status: 1,
                },
            );
            Ok(vec![log(
                "SessionAuthorized",
                vec![
                    key.into_token(),
                    spending_limit.into_token(),
                    expiration_height.into_token(),
                ],
            )])
        }
        "revokeSession" => {
            let key = address(&mut args)?;
            match holder.sessions.get_mut(&key) {
                Some(session) if session.status == 1 => session.status = 2,
                _ => return Err("Key is not authorized".to_owned()),
            }
            Ok(vec![log("SessionRevoked", vec![key.into_token()])])
        }
        other => Err(format!("TokenHolder.{} is not modelled", other)),
    }
}

fn create_user_wallet(state: &mut ChainState, factory: Address, data: &[u8]) -> Result<Vec<Log>, String> {
    let (function, args) = decode_call(ContractName::UserWalletFactory, data)?;
    if function.name != "createUserWallet" {
        return Err(format!("UserWalletFactory.{} is not modelled", function.name));
    }
    let mut args = args.into_iter();
    let _safe_master_copy = address(&mut args)?;
    let safe_setup = bytes(&mut args)?;
    let _holder_master_copy = address(&mut args)?;
    let token = address(&mut args)?;
    let token_rules = address(&mut args)?;
    let keys = array(&mut args)?;
    let limits = array(&mut args)?;
    let heights = array(&mut args)?;
    if keys.len() != limits.len() || keys.len() != heights.len() {
        return Err("Session key arrays differ in length".to_owned());
    }

    let (setup, setup_args) = decode_call(ContractName::GnosisSafe, &safe_setup)?;
    if setup.name != "setup" {
        return Err("Safe data is not a setup call".to_owned());
    }
    let mut setup_args = setup_args.into_iter();
    let owners = array(&mut setup_args)?
        .into_iter()
        .map(|t| t.into_address().ok_or_else(|| "expected address".to_owned()))
        .collect::<Result<Vec<_>, _>>()?;
    let threshold = uint(&mut setup_args)?.as_u64();
    for (i, owner) in owners.iter().enumerate() {
        if owner.is_zero() || *owner == SENTINEL_OWNERS || owners[..i].contains(owner) {
            return Err("Invalid owner address provided".to_owned());
        }
    }
    if threshold == 0 || threshold as usize > owners.len() {
        return Err("Threshold cannot exceed owner count".to_owned());
    }

    let mut sessions = HashMap::new();
    for ((key, limit), height) in keys.into_iter().zip(limits).zip(heights) {
        let key = key.into_address().ok_or("expected address")?;
        let expiration_height = height.into_uint().ok_or("expected uint")?;
        if key.is_zero() || sessions.contains_key(&key) {
            return Err("Invalid session key".to_owned());
        }
        if expiration_height <= U256::from(state.block) {
            return Err("Expiration height is lte to the current block height".to_owned());
        }
        sessions.insert(
            key,
            MockSession {
                spending_limit: limit.into_uint().ok_or("expected uint")?,
                expiration_height,
                nonce: U256::zero(),
                status: 1,
            },
        );
    }

    state.proxies += 1;
    let safe_address = Address::from_low_u64_be(0x5afe_0000 + state.proxies);
    let holder_address = Address::from_low_u64_be(0x70c0_0000 + state.proxies);
    state.safes.insert(
        safe_address,
        MockSafe {
            owners,
            threshold,
            nonce: U256::zero(),
        },
    );
    state.holders.insert(
        holder_address,
        MockHolder {
            owner: safe_address,
            token,
            token_rules,
            sessions,
        },
    );
    Ok(vec![event_log(
        factory,
        ContractName::UserWalletFactory,
        "UserWalletCreated",
        vec![safe_address.into_token(), holder_address.into_token()],
    )])
}
