use std::{collections::HashMap, fmt::Display, path::Path, str::FromStr, sync::Arc};

use ethers::{
    abi::{parse_abi, Abi, Token},
    types::Bytes,
};
use once_cell::sync::Lazy;

/// Registry Errors
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Unknown contract, or no bytecode registered for it
    #[error("Not found: {0}")]
    NotFound(String),
    /// ABI could not be parsed or used
    #[error("ABI error: {0}")]
    Abi(String),
    /// Artifact could not be read
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Bytecode is not valid hex
    #[error("{0}")]
    Hex(#[from] hex::FromHexError),
    /// ABI JSON deser Error
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

/// Contracts known to the SDK
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContractName {
    /// Multisig wallet
    GnosisSafe,
    /// Creates a Safe proxy and a TokenHolder proxy in one call
    UserWalletFactory,
    /// Session-key delegation for an EIP20 token
    TokenHolder,
    /// Transfer rules of the token economy
    TokenRules,
    /// The economy's EIP20 token
    EIP20Token,
}

impl ContractName {
    /// Every known contract
    pub const ALL: &'static [ContractName] = &[
        ContractName::GnosisSafe,
        ContractName::UserWalletFactory,
        ContractName::TokenHolder,
        ContractName::TokenRules,
        ContractName::EIP20Token,
    ];

    /// Artifact file stem, e.g. `GnosisSafe` for `GnosisSafe.abi`
    pub fn artifact_name(&self) -> &'static str {
        match self {
            ContractName::GnosisSafe => "GnosisSafe",
            ContractName::UserWalletFactory => "UserWalletFactory",
            ContractName::TokenHolder => "TokenHolder",
            ContractName::TokenRules => "TokenRules",
            ContractName::EIP20Token => "EIP20Token",
        }
    }

    fn human_readable_abi(&self) -> &'static [&'static str] {
        match self {
            ContractName::GnosisSafe => GNOSIS_SAFE_ABI,
            ContractName::UserWalletFactory => USER_WALLET_FACTORY_ABI,
            ContractName::TokenHolder => TOKEN_HOLDER_ABI,
            ContractName::TokenRules => TOKEN_RULES_ABI,
            ContractName::EIP20Token => EIP20_TOKEN_ABI,
        }
    }
}

impl Display for ContractName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.artifact_name())
    }
}

impl FromStr for ContractName {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContractName::ALL
            .iter()
            .find(|name| name.artifact_name() == s)
            .copied()
            .ok_or_else(|| RegistryError::NotFound(format!("contract {}", s)))
    }
}

const GNOSIS_SAFE_ABI: &[&str] = &[
    "function setup(address[] _owners, uint256 _threshold, address to, bytes data, address fallbackHandler, address paymentToken, uint256 payment, address paymentReceiver)",
    "function execTransaction(address to, uint256 value, bytes data, uint8 operation, uint256 safeTxGas, uint256 baseGas, uint256 gasPrice, address gasToken, address refundReceiver, bytes signatures) returns (bool success)",
    "function addOwnerWithThreshold(address owner, uint256 _threshold)",
    "function removeOwner(address prevOwner, address owner, uint256 _threshold)",
    "function swapOwner(address prevOwner, address oldOwner, address newOwner)",
    "function changeThreshold(uint256 _threshold)",
    "function approveHash(bytes32 hashToApprove)",
    "function nonce() view returns (uint256)",
    "function getThreshold() view returns (uint256)",
    "function getOwners() view returns (address[])",
    "function isOwner(address owner) view returns (bool)",
    "function domainSeparator() view returns (bytes32)",
    "function getTransactionHash(address to, uint256 value, bytes data, uint8 operation, uint256 safeTxGas, uint256 baseGas, uint256 gasPrice, address gasToken, address refundReceiver, uint256 _nonce) view returns (bytes32)",
    "event AddedOwner(address owner)",
    "event RemovedOwner(address owner)",
    "event ChangedThreshold(uint256 threshold)",
    "event ApproveHash(bytes32 indexed approvedHash, address indexed owner)",
    "event ExecutionSuccess(bytes32 txHash, uint256 payment)",
    "event ExecutionFailure(bytes32 txHash, uint256 payment)",
];

const USER_WALLET_FACTORY_ABI: &[&str] = &[
    "function createUserWallet(address _gnosisSafeMasterCopy, bytes _gnosisSafeData, address _tokenHolderMasterCopy, address _token, address _tokenRules, address[] _sessionKeys, uint256[] _sessionKeysSpendingLimits, uint256[] _sessionKeysExpirationHeights) returns (address, address)",
    "event UserWalletCreated(address _gnosisSafeProxy, address _tokenHolderProxy)",
];

const TOKEN_HOLDER_ABI: &[&str] = &[
    "function setup(address _token, address _tokenRules, address _owner, address[] _sessionKeys, uint256[] _sessionKeysSpendingLimits, uint256[] _sessionKeysExpirationHeights)",
    "function authorizeSession(address _sessionKey, uint256 _spendingLimit, uint256 _expirationHeight)",
    "function revokeSession(address _sessionKey)",
    "function sessionKeys(address) view returns (uint256 spendingLimit, uint256 expirationHeight, uint256 nonce, uint8 status)",
    "function owner() view returns (address)",
    "function token() view returns (address)",
    "function tokenRules() view returns (address)",
    "event SessionAuthorized(address _sessionKey, uint256 _spendingLimit, uint256 _expirationHeight)",
    "event SessionRevoked(address _sessionKey)",
];

const TOKEN_RULES_ABI: &[&str] = &[
    "function executeTransfers(address _from, address[] _transfersTo, uint256[] _transfersAmount)",
    "function token() view returns (address)",
];

const EIP20_TOKEN_ABI: &[&str] = &[
    "function name() view returns (string)",
    "function symbol() view returns (string)",
    "function decimals() view returns (uint8)",
    "function totalSupply() view returns (uint256)",
    "function balanceOf(address _owner) view returns (uint256)",
    "function allowance(address _owner, address _spender) view returns (uint256)",
    "function transfer(address _to, uint256 _value) returns (bool)",
    "function transferFrom(address _from, address _to, uint256 _value) returns (bool)",
    "function approve(address _spender, uint256 _value) returns (bool)",
    "event Transfer(address indexed _from, address indexed _to, uint256 _value)",
    "event Approval(address indexed _owner, address indexed _spender, uint256 _value)",
];

/// Interface and (optionally) deployable bytecode of one contract
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Contract interface
    pub abi: Abi,
    /// Creation bytecode
    pub bytecode: Option<Bytes>,
}

static BUNDLED: Lazy<Arc<ContractRegistry>> = Lazy::new(|| {
    Arc::new(ContractRegistry::from_human_readable().expect("bundled ABIs parse"))
});

/// Contract interfaces and bytecode keyed by [`ContractName`]. Read-only once
/// built and shared behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct ContractRegistry {
    artifacts: HashMap<ContractName, Artifact>,
}

impl ContractRegistry {
    /// The registry with the ABIs bundled in this crate. Parsed once per
    /// process.
    pub fn bundled() -> Arc<ContractRegistry> {
        BUNDLED.clone()
    }

    fn from_human_readable() -> Result<Self, RegistryError> {
        let mut artifacts = HashMap::new();
        for name in ContractName::ALL {
            let abi = parse_abi(name.human_readable_abi())
                .map_err(|e| RegistryError::Abi(format!("{}: {}", name, e)))?;
            artifacts.insert(*name, Artifact { abi, bytecode: None });
        }
        Ok(Self { artifacts })
    }

    /// Load `<Name>.abi` and `<Name>.bin` build artifacts from `dir`.
    ///
    /// ABIs that are not present fall back to the bundled ones. Bytecode is
    /// only available for contracts with a `.bin` file.
    pub fn from_artifacts_dir(dir: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let dir = dir.as_ref();
        let mut registry = BUNDLED.as_ref().clone();
        for name in ContractName::ALL {
            let abi_path = dir.join(format!("{}.abi", name));
            if abi_path.exists() {
                let abi: Abi = serde_json::from_str(&std::fs::read_to_string(&abi_path)?)?;
                tracing::debug!(contract = %name, path = %abi_path.display(), "Loaded ABI");
                registry.entry(*name).abi = abi;
            }
            let bin_path = dir.join(format!("{}.bin", name));
            if bin_path.exists() {
                let raw = std::fs::read_to_string(&bin_path)?;
                let code = hex::decode(raw.trim().trim_start_matches("0x"))?;
                tracing::debug!(contract = %name, len = code.len(), "Loaded bytecode");
                registry.entry(*name).bytecode = Some(code.into());
            }
        }
        Ok(registry)
    }

    fn entry(&mut self, name: ContractName) -> &mut Artifact {
        self.artifacts.entry(name).or_insert_with(|| Artifact {
            abi: Default::default(),
            bytecode: None,
        })
    }

    /// Register creation bytecode for a contract
    pub fn with_bytecode(mut self, name: ContractName, bytecode: impl Into<Bytes>) -> Self {
        self.entry(name).bytecode = Some(bytecode.into());
        self
    }

    /// Register or replace the ABI of a contract
    pub fn with_abi(mut self, name: ContractName, abi: Abi) -> Self {
        self.entry(name).abi = abi;
        self
    }

    /// Interface of a contract
    pub fn abi(&self, name: ContractName) -> Result<&Abi, RegistryError> {
        self.artifacts
            .get(&name)
            .map(|artifact| &artifact.abi)
            .ok_or_else(|| RegistryError::NotFound(format!("ABI for {}", name)))
    }

    /// Interface of a contract, by artifact name
    pub fn abi_by_name(&self, name: &str) -> Result<&Abi, RegistryError> {
        self.abi(name.parse()?)
    }

    /// Creation bytecode of a contract
    pub fn bin(&self, name: ContractName) -> Result<&Bytes, RegistryError> {
        self.artifacts
            .get(&name)
            .and_then(|artifact| artifact.bytecode.as_ref())
            .ok_or_else(|| RegistryError::NotFound(format!("bytecode for {}", name)))
    }

    /// Creation bytecode of a contract, by artifact name
    pub fn bin_by_name(&self, name: &str) -> Result<&Bytes, RegistryError> {
        self.bin(name.parse()?)
    }

    /// ABI-encode a call of `function` on contract `name`
    pub fn encode_call(
        &self,
        name: ContractName,
        function: &str,
        args: &[Token],
    ) -> Result<Bytes, RegistryError> {
        let function = self
            .abi(name)?
            .function(function)
            .map_err(|e| RegistryError::NotFound(format!("{}.{}: {}", name, function, e)))?;
        function
            .encode_input(args)
            .map(Into::into)
            .map_err(|e| RegistryError::Abi(format!("{}.{}: {}", name, function.name, e)))
    }

    /// Creation bytecode followed by the encoded constructor arguments
    pub fn deployment_data(&self, name: ContractName, args: &[Token]) -> Result<Bytes, RegistryError> {
        let code = self.bin(name)?.to_vec();
        match self.abi(name)?.constructor() {
            Some(constructor) => constructor
                .encode_input(code, args)
                .map(Into::into)
                .map_err(|e| RegistryError::Abi(format!("{} constructor: {}", name, e))),
            None if args.is_empty() => Ok(code.into()),
            None => Err(RegistryError::Abi(format!(
                "{} has no constructor but {} arguments were supplied",
                name,
                args.len()
            ))),
        }
    }
}
