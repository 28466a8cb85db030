//! Contract events returned by `getsmartcodeevent`, and their decoding into
//! relay work items.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use spvrelay_types::{Decode, Proof, SignRequest};

use crate::{AllianceConfig, AllianceError};

/// Events emitted by one alliance transaction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SmartContractEvent {
    pub tx_hash: String,
    #[serde(default)]
    pub state: u8,
    #[serde(default)]
    pub notify: Vec<NotifyEvent>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NotifyEvent {
    pub contract_address: String,
    /// Positional values; the first is the event name.
    #[serde(default)]
    pub states: Vec<Value>,
}

/// A notify entry the relay acts on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayEvent {
    Proof(Proof),
    SignRequest(SignRequest),
}

/// Matches notify entries against the configured event names.
#[derive(Clone, Debug)]
pub struct EventFilter {
    pub watching_key: String,
    pub watching_make_tx_key: String,
    pub contract: Option<String>,
}

impl EventFilter {
    pub fn from_config(config: &AllianceConfig) -> Self {
        Self {
            watching_key: config.watching_key.clone(),
            watching_make_tx_key: config.watching_make_tx_key.clone(),
            contract: config.watching_contract.clone(),
        }
    }

    /// Decode one notify entry.
    ///
    /// `Ok(None)` for entries that are not relay events; `Err` for relay
    /// events whose payload does not decode.
    pub fn classify(
        &self,
        event: &SmartContractEvent,
        notify: &NotifyEvent,
    ) -> Result<Option<RelayEvent>, AllianceError> {
        if let Some(contract) = &self.contract {
            if !contract.eq_ignore_ascii_case(&notify.contract_address) {
                return Ok(None);
            }
        }
        let Some(name) = notify.states.first().and_then(Value::as_str) else {
            return Ok(None);
        };

        if name == self.watching_key {
            let bytes = payload_bytes(notify)?;
            Ok(Some(RelayEvent::Proof(Proof::from_bytes(&bytes)?)))
        } else if name == self.watching_make_tx_key {
            let bytes = payload_bytes(notify)?;
            let mut request = SignRequest::from_bytes(&bytes)?;
            if request.source.is_zero() {
                request.source = event.tx_hash.parse()?;
            }
            Ok(Some(RelayEvent::SignRequest(request)))
        } else {
            Ok(None)
        }
    }

    /// Decode every relay event in `events`, logging and skipping entries
    /// whose payload is malformed.
    pub fn collect(&self, height: u32, events: &[SmartContractEvent]) -> Vec<RelayEvent> {
        let mut out = Vec::new();
        for event in events {
            for notify in &event.notify {
                match self.classify(event, notify) {
                    Ok(Some(relay_event)) => out.push(relay_event),
                    Ok(None) => {}
                    Err(e) => tracing::warn!(
                        height,
                        tx = %event.tx_hash,
                        error = %e,
                        "skipping undecodable notify entry"
                    ),
                }
            }
        }
        out
    }
}

fn payload_bytes(notify: &NotifyEvent) -> Result<Vec<u8>, AllianceError> {
    let hex_str = notify
        .states
        .get(1)
        .and_then(Value::as_str)
        .ok_or_else(|| AllianceError::Decode("notify entry has no hex payload".into()))?;
    hex::decode(hex_str.trim_start_matches("0x"))
        .map_err(|e| AllianceError::Decode(format!("notify payload: {e}")))
}
