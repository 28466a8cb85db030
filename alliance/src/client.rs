//! The relay's view of the alliance chain.

use async_trait::async_trait;

use spvrelay_types::{Proof, TxId};

use crate::events::SmartContractEvent;
use crate::tx::{GasParams, MultiSignArgs};
use crate::AllianceError;

/// Read and submit operations the relay needs from an alliance node.
///
/// Submissions return the alliance transaction hash once the node accepts
/// the transaction into its pool; they do not wait for inclusion.
#[async_trait]
pub trait AllianceClient: Send + Sync {
    async fn current_height(&self) -> Result<u32, AllianceError>;

    /// Contract events of every transaction in the block at `height`.
    async fn events_at(&self, height: u32) -> Result<Vec<SmartContractEvent>, AllianceError>;

    async fn vote(&self, proof: &Proof, gas: GasParams) -> Result<TxId, AllianceError>;

    /// Submit this party's signatures for a withdrawal so other co-signers
    /// can aggregate them.
    async fn submit_signatures(
        &self,
        args: &MultiSignArgs,
        gas: GasParams,
    ) -> Result<TxId, AllianceError>;
}
