use std::convert::Infallible;

use ethers::{
    abi::{self, Token, Tokenizable},
    signers::Signer,
    types::{
        transaction::eip712::{EIP712Domain, Eip712, TypedData},
        Address, Bytes, Signature, H256, U256,
    },
    utils::keccak256,
};
use serde_json::json;

use crate::{
    client::{ClientError, ClientResult},
    safe::common::{ChecksumAddress, Operations, SafeVersion, SAFE_TX_TYPEHASH},
};

/// The call wrapped by a Safe transaction
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MetaTransactionData {
    /// Target of the call
    pub to: ChecksumAddress,
    /// Wei sent along
    pub value: U256,
    /// Call data
    #[serde(default)]
    pub data: Bytes,
    /// CALL or DELEGATECALL
    #[serde(default)]
    pub operation: Operations,
}

impl MetaTransactionData {
    /// A plain `CALL` of `data` on `to`, without value
    pub fn call(to: Address, data: Bytes) -> Self {
        Self {
            to: to.into(),
            value: U256::zero(),
            data,
            operation: Operations::Call,
        }
    }
}

/// Refund parameters of a Safe transaction. All zero means no refund
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SafeGasConfig {
    /// Gas to be forwarded to the callee. 0 for all available
    pub safe_tx_gas: U256,
    /// Gas cost that is independent of the internal transaction execution,
    /// (e.g. base transaction fee, signature check, payment of the refund)
    pub base_gas: U256,
    /// Maximum gas price that should be used for this transaction. 0 for no
    /// maximum. For base layer tokens, (e.g. ETH), this is adjusted to be no
    /// higher than that actual gas price used. For custom refund tokens, it
    /// may be any amount.
    pub gas_price: U256,
    /// Token address (or 0 if ETH) that is used for the reimbursement payment
    /// to the executor.
    pub gas_token: ChecksumAddress,
    /// The address which receives the refund. Defaults to `tx.origin` if empty
    pub refund_receiver: ChecksumAddress,
}

/// One pending multisig action. The nonce ties it to exactly one execution
/// slot of the Safe.
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SafeTransactionData {
    /// The wrapped call
    #[serde(flatten)]
    pub core: MetaTransactionData,
    /// Refund parameters
    #[serde(flatten)]
    pub gas: SafeGasConfig,
    /// The Safe nonce to use
    pub nonce: U256,
}

/// [`Eip712`] view of a Safe transaction bound to a Safe and schema
#[derive(Clone, Debug)]
pub struct SafeEip712<'a> {
    address: Address,
    chain_id: u64,
    version: SafeVersion,
    tx: &'a SafeTransactionData,
}

impl<'a> Eip712 for SafeEip712<'a> {
    type Error = Infallible;

    fn domain(&self) -> Result<EIP712Domain, Self::Error> {
        Ok(EIP712Domain {
            name: None,
            version: None,
            chain_id: self
                .version
                .binds_chain_id()
                .then(|| self.chain_id.into()),
            verifying_contract: Some(self.address),
            salt: None,
        })
    }

    /// The `baseGas` typehash. This has no receiver, so it cannot follow
    /// the version; `struct_hash` uses [`SafeVersion::safe_tx_typehash`].
    fn type_hash() -> Result<[u8; 32], Self::Error> {
        Ok(From::from(*SAFE_TX_TYPEHASH))
    }

    fn struct_hash(&self) -> Result<[u8; 32], Self::Error> {
        Ok(self.tx.struct_hash(self.version).into())
    }

    fn encode_eip712(&self) -> Result<[u8; 32], Self::Error> {
        // encode the digest to be compatible with solidity abi.encodePacked()
        // See: https://github.com/gakonst/ethers-rs/blob/master/examples/permit_hash.rs#L72

        let domain_separator = self.domain_separator()?;
        let struct_hash = self.struct_hash()?;

        let digest_input = [&[0x19, 0x01], &domain_separator[..], &struct_hash[..]].concat();

        Ok(keccak256(digest_input))
    }

    fn domain_separator(&self) -> Result<[u8; 32], Self::Error> {
        let mut tokens = vec![Token::FixedBytes(
            self.version.domain_typehash().as_bytes().to_vec(),
        )];
        if self.version.binds_chain_id() {
            tokens.push(Token::Uint(self.chain_id.into()));
        }
        tokens.push(Token::Address(self.address));
        Ok(keccak256(abi::encode(&tokens)))
    }
}

impl SafeTransactionData {
    /// Assemble a Safe transaction from its parts
    pub fn new(core: MetaTransactionData, gas: SafeGasConfig, nonce: U256) -> Self {
        Self { core, gas, nonce }
    }

    /// Shortcut for a value-less `CALL` without refund configuration
    pub fn call(to: Address, data: Bytes, nonce: U256) -> Self {
        Self::new(MetaTransactionData::call(to, data), Default::default(), nonce)
    }

    /// The ABI-encoded `SafeTx` struct members, in schema order
    fn struct_tokens(&self, version: SafeVersion) -> Vec<Token> {
        let data = H256::from(keccak256(&self.core.data));
        vec![
            Token::FixedBytes(version.safe_tx_typehash().as_bytes().to_vec()),
            self.core.to.into_token(),
            self.core.value.into_token(),
            data.into_token(),
            self.core.operation.into_token(),
            self.gas.safe_tx_gas.into_token(),
            self.gas.base_gas.into_token(),
            self.gas.gas_price.into_token(),
            self.gas.gas_token.into_token(),
            self.gas.refund_receiver.into_token(),
            self.nonce.into_token(),
        ]
    }

    /// `hashStruct(SafeTx)` for the given schema version
    pub fn struct_hash(&self, version: SafeVersion) -> H256 {
        keccak256(abi::encode(&self.struct_tokens(version))).into()
    }

    /// Bind to a Safe for EIP-712 signing
    pub fn eip712(&self, safe_address: Address, version: SafeVersion, chain_id: u64) -> SafeEip712<'_> {
        SafeEip712 {
            address: safe_address,
            chain_id,
            version,
            tx: self,
        }
    }

    /// The digest owners sign, identical to the Safe's `getTransactionHash`
    pub fn safe_tx_hash(&self, safe_address: Address, version: SafeVersion, chain_id: u64) -> H256 {
        match self.eip712(safe_address, version, chain_id).encode_eip712() {
            Ok(hash) => hash.into(),
            Err(never) => match never {},
        }
    }

    /// The structured-data object handed to `eth_signTypedData` style wallets
    pub fn typed_data(
        &self,
        safe_address: Address,
        version: SafeVersion,
        chain_id: u64,
    ) -> ClientResult<TypedData> {
        let mut domain_fields = vec![];
        let mut domain = serde_json::Map::new();
        if version.binds_chain_id() {
            domain_fields.push(json!({ "name": "chainId", "type": "uint256" }));
            domain.insert("chainId".to_owned(), json!(chain_id));
        }
        domain_fields.push(json!({ "name": "verifyingContract", "type": "address" }));
        domain.insert(
            "verifyingContract".to_owned(),
            json!(ChecksumAddress::from(safe_address)),
        );

        let value = json!({
            "types": {
                "EIP712Domain": domain_fields,
                "SafeTx": [
                    { "name": "to", "type": "address" },
                    { "name": "value", "type": "uint256" },
                    { "name": "data", "type": "bytes" },
                    { "name": "operation", "type": "uint8" },
                    { "name": "safeTxGas", "type": "uint256" },
                    { "name": version.base_gas_field(), "type": "uint256" },
                    { "name": "gasPrice", "type": "uint256" },
                    { "name": "gasToken", "type": "address" },
                    { "name": "refundReceiver", "type": "address" },
                    { "name": "nonce", "type": "uint256" },
                ],
            },
            "primaryType": "SafeTx",
            "domain": domain,
            "message": {
                "to": self.core.to,
                "value": self.core.value.to_string(),
                "data": self.core.data,
                "operation": self.core.operation,
                "safeTxGas": self.gas.safe_tx_gas.to_string(),
                (version.base_gas_field()): self.gas.base_gas.to_string(),
                "gasPrice": self.gas.gas_price.to_string(),
                "gasToken": self.gas.gas_token,
                "refundReceiver": self.gas.refund_receiver,
                "nonce": self.nonce.to_string(),
            },
        });
        Ok(serde_json::from_value(value)?)
    }

    /// Sign the safe transaction hash
    pub async fn sign<S: Signer>(
        &self,
        signer: &S,
        safe_address: Address,
        version: SafeVersion,
        chain_id: u64,
    ) -> ClientResult<Signature> {
        let eip712 = self.eip712(safe_address, version, chain_id);
        signer
            .sign_typed_data(&eip712)
            .await
            .map_err(|e| ClientError::Signer(e.to_string()))
    }
}
