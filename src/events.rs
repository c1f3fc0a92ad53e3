use ethers::{
    abi::{Abi, RawLog, Token},
    types::{Address, TransactionReceipt},
};
use serde_json::{Map, Value};

use crate::{
    client::{ClientError, ClientResult},
    safe::common::ChecksumAddress,
};

/// An event decoded from a receipt log
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct DecodedEvent {
    /// Event name, e.g. `SessionAuthorized`
    pub name: String,
    /// Emitting contract
    pub address: ChecksumAddress,
    /// Event parameters by name
    pub params: Map<String, Value>,
}

impl DecodedEvent {
    /// Address-typed parameter
    pub fn address_param(&self, key: &str) -> Option<Address> {
        self.params.get(key)?.as_str()?.parse().ok()
    }

    /// Raw parameter value
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }
}

/// JSON rendering of an ABI token: checksummed addresses, decimal integers,
/// `0x` hex bytes
pub fn token_to_json(token: &Token) -> Value {
    match token {
        Token::Address(a) => Value::String(ChecksumAddress::from(*a).to_string()),
        Token::FixedBytes(b) | Token::Bytes(b) => Value::String(format!("0x{}", hex::encode(b))),
        Token::Int(i) | Token::Uint(i) => Value::String(i.to_string()),
        Token::Bool(b) => Value::Bool(*b),
        Token::String(s) => Value::String(s.clone()),
        Token::FixedArray(items) | Token::Array(items) | Token::Tuple(items) => {
            Value::Array(items.iter().map(token_to_json).collect())
        }
    }
}

/// Decode every log of `receipt` that matches an event of `abi`. Logs of
/// other contracts or unknown events are skipped.
pub fn decode_events(abi: &Abi, receipt: &TransactionReceipt) -> Vec<DecodedEvent> {
    let mut decoded = vec![];
    for log in &receipt.logs {
        let Some(topic) = log.topics.first() else {
            continue;
        };
        let Some(event) = abi.events().find(|e| e.signature() == *topic) else {
            continue;
        };
        let raw = RawLog {
            topics: log.topics.clone(),
            data: log.data.to_vec(),
        };
        match event.parse_log(raw) {
            Ok(parsed) => decoded.push(DecodedEvent {
                name: event.name.clone(),
                address: log.address.into(),
                params: parsed
                    .params
                    .iter()
                    .map(|p| (p.name.clone(), token_to_json(&p.value)))
                    .collect(),
            }),
            Err(e) => {
                tracing::warn!(
                    event = event.name.as_str(),
                    address = ?log.address,
                    error = %e,
                    "Log matches event signature but failed to decode"
                );
            }
        }
    }
    decoded
}

/// All decoded events named `name`
pub fn events_named(abi: &Abi, receipt: &TransactionReceipt, name: &str) -> Vec<DecodedEvent> {
    decode_events(abi, receipt)
        .into_iter()
        .filter(|e| e.name == name)
        .collect()
}

/// The first event named `name`
///
/// # Errors
///
/// `MissingEvent` if the receipt holds no such event
pub fn find_event(
    abi: &Abi,
    receipt: &TransactionReceipt,
    name: &'static str,
) -> ClientResult<DecodedEvent> {
    events_named(abi, receipt, name)
        .into_iter()
        .next()
        .ok_or(ClientError::MissingEvent {
            event: name,
            tx_hash: receipt.transaction_hash,
        })
}
