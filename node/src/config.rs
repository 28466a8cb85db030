//! Relay runtime configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use spvrelay_alliance::AllianceConfig;
use spvrelay_types::NetworkId;

use crate::RelayError;

/// Proof and sign-request queue depth between the observer and its consumers.
pub const PIPELINE_QUEUE_CAPACITY: usize = 10;
/// How long `stop` waits for tasks to exit.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything the relay node needs at runtime.
///
/// Built by the daemon from command-line flags plus the alliance TOML file.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub network: NetworkId,
    /// Root data directory as given by the operator.
    pub data_dir: PathBuf,
    pub trusted_peer: Option<String>,
    /// Run the observer/voter/signer pipeline.
    pub vote: bool,
    /// Run the stall supervisor.
    pub restart: bool,
    pub restart_interval: Duration,
    pub alliance: AllianceConfig,
    pub metrics_refresh_interval: Duration,
}

impl RelayConfig {
    pub fn new(network: NetworkId, data_dir: PathBuf) -> Self {
        Self {
            network,
            data_dir,
            trusted_peer: None,
            vote: false,
            restart: false,
            restart_interval: Duration::from_secs(30 * 60),
            alliance: AllianceConfig::default(),
            metrics_refresh_interval: Duration::from_secs(10),
        }
    }

    /// Data directory actually used: regtest keeps its state in a
    /// `regtest` subdirectory.
    pub fn effective_data_dir(&self) -> PathBuf {
        resolve_data_dir(&self.data_dir, self.network)
    }

    pub fn waiting_db_dir(&self) -> PathBuf {
        self.alliance.waiting_db_dir(&self.effective_data_dir())
    }

    pub fn validate(&self) -> Result<(), RelayError> {
        if self.restart && self.restart_interval.is_zero() {
            return Err(RelayError::Config(
                "restart interval must be positive".into(),
            ));
        }
        if self.vote {
            self.alliance.validate()?;
            if self.alliance.redeem.is_empty() || self.alliance.signing_key.is_empty() {
                return Err(RelayError::Config(
                    "vote mode needs redeem and signing_key in the alliance config".into(),
                ));
            }
        }
        Ok(())
    }
}

pub fn resolve_data_dir(data_dir: &Path, network: NetworkId) -> PathBuf {
    match network {
        NetworkId::Regtest => data_dir.join("regtest"),
        _ => data_dir.to_path_buf(),
    }
}
