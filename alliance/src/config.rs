//! Relay configuration for the alliance side, loaded from TOML.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::tx::GasParams;
use crate::AllianceError;

/// Everything the relay needs to talk to the alliance chain and to run its
/// vote/retry/sign tasks.
///
/// Every field except the wallet, redeem script and signing key has a default,
/// so a minimal file only names those.
#[derive(Clone, Serialize, Deserialize)]
pub struct AllianceConfig {
    /// JSON-RPC endpoint of an alliance node.
    #[serde(default = "default_rpc_url")]
    pub alliance_rpc_url: String,

    /// Keystore file holding the relay's alliance signing key.
    #[serde(default)]
    pub wallet_file: PathBuf,

    #[serde(default)]
    pub wallet_password: String,

    /// Alliance blocks to wait before scanning a height for events.
    #[serde(default = "default_confirmations")]
    pub observer_confirmations: u32,

    #[serde(default = "default_poll_interval")]
    pub observer_poll_interval_secs: u64,

    /// First notify state that marks a proof event.
    #[serde(default = "default_watching_key")]
    pub watching_key: String,

    /// First notify state that marks a sign-request event.
    #[serde(default = "default_make_tx_key")]
    pub watching_make_tx_key: String,

    /// Only notify entries from this contract are considered, when set.
    #[serde(default)]
    pub watching_contract: Option<String>,

    /// Hex multisig redeem script the Signer co-signs for.
    #[serde(default)]
    pub redeem: String,

    /// WIF-encoded secp256k1 key used by the Signer.
    #[serde(default)]
    pub signing_key: String,

    #[serde(default = "default_gas_price")]
    pub gas_price: u64,

    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,

    /// Waiting store directory; relative paths resolve under the data dir.
    #[serde(default = "default_waiting_db_path")]
    pub waiting_db_path: PathBuf,

    /// UTXO-chain depth a failed proof waits before it is retried.
    #[serde(default = "default_blocks_to_wait")]
    pub blocks_to_wait: u32,

    #[serde(default = "default_retry_interval")]
    pub retry_interval_secs: u64,

    /// Key-size budget of one reclaim scan, in bytes.
    #[serde(default = "default_max_reclaim_read_size")]
    pub max_reclaim_read_size: u64,

    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_secs: u64,
}

fn default_rpc_url() -> String {
    "http://127.0.0.1:20336".to_string()
}

fn default_confirmations() -> u32 {
    1
}

fn default_poll_interval() -> u64 {
    2
}

fn default_watching_key() -> String {
    "makeProof".to_string()
}

fn default_make_tx_key() -> String {
    "makeBtcTx".to_string()
}

fn default_gas_price() -> u64 {
    0
}

fn default_gas_limit() -> u64 {
    30_000
}

fn default_waiting_db_path() -> PathBuf {
    PathBuf::from("waiting")
}

fn default_blocks_to_wait() -> u32 {
    6
}

fn default_retry_interval() -> u64 {
    600
}

fn default_max_reclaim_read_size() -> u64 {
    50 * 1024 * 1024
}

fn default_rpc_timeout() -> u64 {
    30
}

impl AllianceConfig {
    pub fn from_toml_file(path: &Path) -> Result<Self, AllianceError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AllianceError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, AllianceError> {
        toml::from_str(s).map_err(|e| AllianceError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String, AllianceError> {
        toml::to_string_pretty(self).map_err(|e| AllianceError::Config(e.to_string()))
    }

    /// Reject configurations the relay cannot run with.
    pub fn validate(&self) -> Result<(), AllianceError> {
        if self.alliance_rpc_url.is_empty() {
            return Err(AllianceError::Config("alliance_rpc_url is empty".into()));
        }
        if self.observer_poll_interval_secs == 0 || self.retry_interval_secs == 0 {
            return Err(AllianceError::Config(
                "poll and retry intervals must be positive".into(),
            ));
        }
        if self.watching_key.is_empty() || self.watching_make_tx_key.is_empty() {
            return Err(AllianceError::Config("watching keys must be set".into()));
        }
        if self.watching_key == self.watching_make_tx_key {
            return Err(AllianceError::Config(
                "watching_key and watching_make_tx_key must differ".into(),
            ));
        }
        if self.max_reclaim_read_size == 0 {
            return Err(AllianceError::Config(
                "max_reclaim_read_size must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn gas(&self) -> GasParams {
        GasParams {
            price: self.gas_price,
            limit: self.gas_limit,
        }
    }

    /// The waiting store directory, resolved against `data_dir`.
    pub fn waiting_db_dir(&self, data_dir: &Path) -> PathBuf {
        if self.waiting_db_path.is_absolute() {
            self.waiting_db_path.clone()
        } else {
            data_dir.join(&self.waiting_db_path)
        }
    }
}

impl Default for AllianceConfig {
    fn default() -> Self {
        Self {
            alliance_rpc_url: default_rpc_url(),
            wallet_file: PathBuf::new(),
            wallet_password: String::new(),
            observer_confirmations: default_confirmations(),
            observer_poll_interval_secs: default_poll_interval(),
            watching_key: default_watching_key(),
            watching_make_tx_key: default_make_tx_key(),
            watching_contract: None,
            redeem: String::new(),
            signing_key: String::new(),
            gas_price: default_gas_price(),
            gas_limit: default_gas_limit(),
            waiting_db_path: default_waiting_db_path(),
            blocks_to_wait: default_blocks_to_wait(),
            retry_interval_secs: default_retry_interval(),
            max_reclaim_read_size: default_max_reclaim_read_size(),
            rpc_timeout_secs: default_rpc_timeout(),
        }
    }
}

impl std::fmt::Debug for AllianceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllianceConfig")
            .field("alliance_rpc_url", &self.alliance_rpc_url)
            .field("wallet_file", &self.wallet_file)
            .field("observer_confirmations", &self.observer_confirmations)
            .field("watching_key", &self.watching_key)
            .field("watching_make_tx_key", &self.watching_make_tx_key)
            .field("gas_price", &self.gas_price)
            .field("gas_limit", &self.gas_limit)
            .field("waiting_db_path", &self.waiting_db_path)
            .field("blocks_to_wait", &self.blocks_to_wait)
            .field("retry_interval_secs", &self.retry_interval_secs)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = AllianceConfig::from_toml_str("").expect("empty toml should use defaults");
        assert_eq!(config.blocks_to_wait, 6);
        assert_eq!(config.retry_interval_secs, 600);
        assert_eq!(config.gas_limit, 30_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_overrides() {
        let toml = r#"
            alliance_rpc_url = "http://alliance:20336"
            wallet_file = "/keys/relay.json"
            redeem = "5121"
            blocks_to_wait = 3
        "#;
        let config = AllianceConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.alliance_rpc_url, "http://alliance:20336");
        assert_eq!(config.wallet_file, PathBuf::from("/keys/relay.json"));
        assert_eq!(config.blocks_to_wait, 3);
        assert_eq!(config.observer_poll_interval_secs, 2);
    }

    #[test]
    fn round_trips_through_toml() {
        let mut config = AllianceConfig::default();
        config.gas_price = 500;
        config.watching_contract = Some("0aff".into());
        let parsed = AllianceConfig::from_toml_str(&config.to_toml_string().unwrap()).unwrap();
        assert_eq!(parsed.gas(), GasParams { price: 500, limit: 30_000 });
        assert_eq!(parsed.watching_contract.as_deref(), Some("0aff"));
    }

    #[test]
    fn identical_watching_keys_rejected() {
        let config = AllianceConfig {
            watching_make_tx_key: default_watching_key(),
            ..AllianceConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_interval_rejected() {
        let config = AllianceConfig {
            retry_interval_secs: 0,
            ..AllianceConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn relative_waiting_path_resolves_under_data_dir() {
        let config = AllianceConfig::default();
        assert_eq!(
            config.waiting_db_dir(Path::new("/data")),
            PathBuf::from("/data/waiting")
        );
    }

    #[test]
    fn debug_hides_secrets() {
        let config = AllianceConfig {
            wallet_password: "hunter2".into(),
            signing_key: "cVt4o7BGAig1UXywgGSmARhxMdzP5qvQsxKkSsc1XEkw3tDTQFpy".into(),
            ..AllianceConfig::default()
        };
        let shown = format!("{:?}", config);
        assert!(!shown.contains("hunter2"));
        assert!(!shown.contains("cVt4o7"));
    }

    #[test]
    fn missing_file_returns_config_error() {
        let result = AllianceConfig::from_toml_file(Path::new("/nonexistent/relay.toml"));
        assert!(matches!(result, Err(AllianceError::Config(_))));
    }
}
