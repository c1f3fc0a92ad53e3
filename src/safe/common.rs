use std::{fmt::Display, str::FromStr};

use ethers::{
    abi::{InvalidOutputType, Token, Tokenizable},
    types::{Address, H160, H256, U256},
    utils::keccak256,
};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Head and tail marker of the Safe's owner linked list
/// (`address(0x1)` in the Safe contracts)
pub const SENTINEL_OWNERS: Address = H160([
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1,
]);

/// EIP-712 Tx Details typehash. Copied from gnosis safe contracts
///
/// keccak256(
///     "SafeTx(address to,uint256 value,bytes data,uint8 operation,uint256 safeTxGas,uint256 baseGas,uint256 gasPrice,address gasToken,address refundReceiver,uint256 nonce)"
/// );
pub static SAFE_TX_TYPEHASH: Lazy<H256> = Lazy::new(|| {
    "0xbb8310d486368db6bd6f849402fdd73ad53d316b5a4b2644ad6efe0f941286d8"
        .parse()
        .expect("valid hex literal")
});

/// EIP-712 Tx Details typehash used before `dataGas` was renamed to
/// `baseGas` (Safe 1.0.0)
pub static SAFE_TX_DATA_GAS_TYPEHASH: Lazy<H256> =
    Lazy::new(|| keccak256(SafeVersion::V1_0.safe_tx_type()).into());

/// EIP-712 typehash domain binding. Copied from gnosis safe contracts
///
/// EIP712 supports several forms of domain binding, but only veriifer and
/// chain id are used here. See [`ethers::types::transaction::eip712::EIP712Domain`]
///
/// keccak256(
///     "EIP712Domain(uint256 chainId,address verifyingContract)"
/// );
pub static DOMAIN_SEPARATOR_TYPEHASH: Lazy<H256> = Lazy::new(|| {
    "0x47e79534a245952e8b16893a336b85a3d9ea9fa8c573f3d803afb92a79469218"
        .parse()
        .expect("valid hex literal")
});

/// Domain binding used by Safes older than 1.3.0, which do not include the
/// chain id.
///
/// keccak256(
///     "EIP712Domain(address verifyingContract)"
/// );
pub static LEGACY_DOMAIN_SEPARATOR_TYPEHASH: Lazy<H256> =
    Lazy::new(|| keccak256("EIP712Domain(address verifyingContract)").into());

/// Safe operations
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Operations {
    /// CALL opcode
    #[default]
    Call = 0,
    /// DELEGATECALL opcode.
    /// Note: please exercise caution, as this can brick a SAFE
    DelegateCall = 1,
}

impl Tokenizable for Operations {
    fn from_token(token: Token) -> Result<Self, InvalidOutputType>
    where
        Self: Sized,
    {
        match token {
            Token::Uint(x) if x.is_zero() => Ok(Operations::Call),
            Token::Uint(x) if x == U256::one() => Ok(Operations::DelegateCall),
            other => Err(InvalidOutputType(format!("Expected 0 or 1, got {}", other))),
        }
    }

    fn into_token(self) -> Token {
        Token::Uint((self as u8).into())
    }
}

impl Serialize for Operations {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        (*self as u8).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Operations {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        match u8::deserialize(deserializer)? {
            0 => Ok(Operations::Call),
            1 => Ok(Operations::DelegateCall),
            other => Err(serde::de::Error::custom(format!(
                "Expected operation 0 or 1, got {}",
                other
            ))),
        }
    }
}

/// Safe contract versions with distinct EIP-712 schemas
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum SafeVersion {
    /// 1.0.0: `dataGas`, domain bound to the verifying contract only.
    /// Hashing and signing only: the bundled `setup` ABI is the 1.1+ one
    V1_0,
    /// 1.1.x / 1.2.0: `baseGas`, domain bound to the verifying contract only
    #[default]
    V1_1,
    /// 1.3.0 and later: `baseGas`, domain bound to chain id and verifying
    /// contract
    V1_3,
}

impl SafeVersion {
    /// Name of the 6th `SafeTx` member
    pub fn base_gas_field(&self) -> &'static str {
        match self {
            SafeVersion::V1_0 => "dataGas",
            _ => "baseGas",
        }
    }

    /// Whether the domain separator commits to the chain id
    pub fn binds_chain_id(&self) -> bool {
        matches!(self, SafeVersion::V1_3)
    }

    /// The canonical `SafeTx` type string
    pub fn safe_tx_type(&self) -> String {
        format!(
            "SafeTx(address to,uint256 value,bytes data,uint8 operation,uint256 safeTxGas,uint256 {},uint256 gasPrice,address gasToken,address refundReceiver,uint256 nonce)",
            self.base_gas_field()
        )
    }

    /// Typehash of the `SafeTx` struct
    pub fn safe_tx_typehash(&self) -> H256 {
        match self {
            SafeVersion::V1_0 => *SAFE_TX_DATA_GAS_TYPEHASH,
            _ => *SAFE_TX_TYPEHASH,
        }
    }

    /// Typehash of the `EIP712Domain` struct
    pub fn domain_typehash(&self) -> H256 {
        if self.binds_chain_id() {
            *DOMAIN_SEPARATOR_TYPEHASH
        } else {
            *LEGACY_DOMAIN_SEPARATOR_TYPEHASH
        }
    }
}

impl Display for SafeVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let v = match self {
            SafeVersion::V1_0 => "1.0.0",
            SafeVersion::V1_1 => "1.1.1",
            SafeVersion::V1_3 => "1.3.0",
        };
        f.write_str(v)
    }
}

impl FromStr for SafeVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // tolerate suffixes like "1.3.0+L2"
        let core = s.split('+').next().unwrap_or(s).trim_start_matches('v');
        match core {
            "1.0.0" => Ok(SafeVersion::V1_0),
            "1.1.0" | "1.1.1" | "1.2.0" => Ok(SafeVersion::V1_1),
            c if c.starts_with("1.3") || c.starts_with("1.4") => Ok(SafeVersion::V1_3),
            other => Err(format!("Unsupported Safe version: {}", other)),
        }
    }
}

impl serde::Serialize for SafeVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for SafeVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        String::deserialize(deserializer)?
            .parse()
            .map_err(serde::de::Error::custom)
    }
}

/// An address wrapper that ensures checksum encoding
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct ChecksumAddress(pub Address);

impl std::ops::Deref for ChecksumAddress {
    type Target = Address;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Address> for ChecksumAddress {
    fn from(addr: Address) -> Self {
        Self(addr)
    }
}

impl From<ChecksumAddress> for Address {
    fn from(val: ChecksumAddress) -> Self {
        val.0
    }
}

impl serde::Serialize for ChecksumAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        ethers::utils::to_checksum(self, None).serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for ChecksumAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(Address::deserialize(deserializer)?.into())
    }
}

impl std::fmt::Debug for ChecksumAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", ethers::utils::to_checksum(self, None))
    }
}

impl std::fmt::Display for ChecksumAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", ethers::utils::to_checksum(self, None))
    }
}

impl FromStr for ChecksumAddress {
    type Err = <Address as FromStr>::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<Address>().map(Into::into)
    }
}

impl Tokenizable for ChecksumAddress {
    fn from_token(token: Token) -> Result<Self, InvalidOutputType>
    where
        Self: Sized,
    {
        Address::from_token(token).map(Into::into)
    }

    fn into_token(self) -> Token {
        self.0.into_token()
    }
}
