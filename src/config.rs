use std::{path::PathBuf, str::FromStr, sync::Arc, time::Duration};

use ethers::{
    providers::{Http, Provider},
    types::Address,
};
use url::Url;

use crate::{
    client::{ClientError, ClientResult, TxOptions, TxSender, DEFAULT_MAX_POLLS, DEFAULT_POLL_INTERVAL},
    networks::Network,
    registry::ContractRegistry,
    safe::SafeVersion,
};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";

fn default_rpc_url() -> Url {
    Url::parse(DEFAULT_RPC_URL).expect("valid default url")
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL.as_millis() as u64
}

fn default_max_receipt_polls() -> usize {
    DEFAULT_MAX_POLLS
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Connection and transaction defaults, supplied by the caller
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SdkConfig {
    /// JSON-RPC endpoint
    #[serde(default = "default_rpc_url")]
    pub rpc_url: Url,
    /// Chain id of the target network, used to pick the Safe schema when
    /// `safeVersion` is unset. Facades take the chain id from
    /// [`GnosisSafe::connect`](crate::GnosisSafe::connect) or their caller
    #[serde(default)]
    pub chain_id: Option<u64>,
    /// Default legacy gas price, in wei
    #[serde(default)]
    pub gas_price: Option<u64>,
    /// Default gas limit. Estimated per transaction when unset
    #[serde(default)]
    pub gas_limit: Option<u64>,
    /// Default sending account
    #[serde(default)]
    pub default_from: Option<Address>,
    /// Safe schema of the deployed contracts. Derived from the chain when
    /// unset
    #[serde(default)]
    pub safe_version: Option<SafeVersion>,
    /// Directory with `<Name>.abi` / `<Name>.bin` build artifacts
    #[serde(default)]
    pub artifacts_dir: Option<PathBuf>,
    /// Receipt poll interval
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Receipt polls before giving up
    #[serde(default = "default_max_receipt_polls")]
    pub max_receipt_polls: usize,
    /// HTTP request timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            chain_id: None,
            gas_price: None,
            gas_limit: None,
            default_from: None,
            safe_version: None,
            artifacts_dir: None,
            poll_interval_ms: default_poll_interval_ms(),
            max_receipt_polls: default_max_receipt_polls(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn parse_var<T>(name: &str, raw: Option<String>) -> ClientResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.map(|value| {
        value
            .trim()
            .parse()
            .map_err(|e| ClientError::Config(format!("{} is invalid: {}", name, e)))
    })
    .transpose()
}

impl SdkConfig {
    /// Parse a JSON config document
    pub fn from_json_str(json: &str) -> ClientResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a JSON config file
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> ClientResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ClientError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    /// Load configuration from `TOKENHOLDER_*` environment variables. Unset
    /// variables keep their defaults.
    pub fn from_env() -> ClientResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ClientResult<Self> {
        let mut config = Self::default();
        if let Some(url) = parse_var("TOKENHOLDER_RPC_URL", lookup("TOKENHOLDER_RPC_URL"))? {
            config.rpc_url = url;
        }
        config.chain_id = parse_var("TOKENHOLDER_CHAIN_ID", lookup("TOKENHOLDER_CHAIN_ID"))?;
        config.gas_price = parse_var("TOKENHOLDER_GAS_PRICE", lookup("TOKENHOLDER_GAS_PRICE"))?;
        config.gas_limit = parse_var("TOKENHOLDER_GAS_LIMIT", lookup("TOKENHOLDER_GAS_LIMIT"))?;
        config.default_from = parse_var("TOKENHOLDER_FROM", lookup("TOKENHOLDER_FROM"))?;
        config.safe_version = parse_var("TOKENHOLDER_SAFE_VERSION", lookup("TOKENHOLDER_SAFE_VERSION"))?;
        config.artifacts_dir = lookup("TOKENHOLDER_ARTIFACTS_DIR").map(PathBuf::from);
        Ok(config)
    }

    /// Safe schema to use: explicit setting, else the known network's,
    /// else 1.1.1
    pub fn safe_version(&self) -> SafeVersion {
        self.safe_version
            .or_else(|| {
                self.chain_id
                    .and_then(Network::by_chain_id)
                    .map(|network| network.safe_version)
            })
            .unwrap_or_default()
    }

    /// Transaction defaults derived from this config
    pub fn tx_options(&self) -> TxOptions {
        TxOptions {
            from: self.default_from,
            gas: self.gas_limit.map(Into::into),
            gas_price: self.gas_price.map(Into::into),
            value: None,
        }
    }

    /// Contract registry: build artifacts if configured, else the bundled
    /// ABIs
    pub fn registry(&self) -> ClientResult<Arc<ContractRegistry>> {
        match &self.artifacts_dir {
            Some(dir) => Ok(Arc::new(ContractRegistry::from_artifacts_dir(dir)?)),
            None => Ok(ContractRegistry::bundled()),
        }
    }

    /// HTTP provider with the configured request timeout
    pub fn provider(&self) -> ClientResult<Provider<Http>> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.request_timeout_secs))
            .build()
            .map_err(|e| ClientError::Config(e.to_string()))?;
        let http = Http::new_with_client(self.rpc_url.clone(), client);
        Ok(Provider::new(http).interval(Duration::from_millis(self.poll_interval_ms)))
    }

    /// A sender over `client` with this config's defaults, polling and
    /// registry
    pub fn sender<M>(&self, client: M) -> ClientResult<TxSender<M>> {
        Ok(TxSender::new(client)
            .with_registry(self.registry()?)
            .with_defaults(self.tx_options())
            .with_polling(
                Duration::from_millis(self.poll_interval_ms),
                self.max_receipt_polls,
            ))
    }

    /// Convenience: [`SdkConfig::provider`] wrapped in a sender
    pub fn connect(&self) -> ClientResult<TxSender<Provider<Http>>> {
        self.sender(self.provider()?)
    }
}
