//! UTXO network selector.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifies which UTXO network the light client follows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkId {
    /// The production network.
    Main,
    /// The public test network.
    Test,
    /// The simulation network.
    Sim,
    /// Local regression-test network.
    Regtest,
}

impl NetworkId {
    /// Default P2P port for this network.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Main => 8333,
            Self::Test => 18333,
            Self::Sim => 18555,
            Self::Regtest => 18444,
        }
    }

    /// Human-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Test => "test",
            Self::Sim => "sim",
            Self::Regtest => "regtest",
        }
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkId {
    type Err = std::convert::Infallible;

    /// Unknown names fall back to mainnet, matching the CLI's historical behaviour.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "test" | "testnet" => Self::Test,
            "sim" | "simnet" => Self::Sim,
            "regtest" => Self::Regtest,
            _ => Self::Main,
        })
    }
}
