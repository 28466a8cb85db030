//! Co-signing withdrawals out of the multisig vault.
//!
//! A sign request carries an unsigned UTXO transaction whose inputs spend
//! P2SH multisig outputs, plus the signatures other co-signers already
//! published. The signer adds its own signature to every input. Once each
//! input reaches the redeem script's threshold the transaction is finalised
//! and broadcast; otherwise this party's signatures go to the alliance chain
//! for the others to collect.

use std::sync::Arc;

use bitcoin::consensus::encode::deserialize;
use bitcoin::hashes::Hash;
use bitcoin::opcodes::all::OP_CHECKMULTISIG;
use bitcoin::opcodes::OP_0;
use bitcoin::script::{Builder, Instruction, PushBytesBuf};
use bitcoin::secp256k1::{All, Message, Secp256k1};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::{ecdsa, PrivateKey, PublicKey, ScriptBuf, Transaction, Txid};
use tokio::sync::{broadcast, mpsc};

use spvrelay_alliance::{AllianceClient, GasParams, MultiSignArgs};
use spvrelay_spv::LightClient;
use spvrelay_types::{SignRequest, TxId};

use crate::metrics::RelayMetrics;
use crate::RelayError;

const OP_PUSHNUM_1: u8 = 0x51;
const OP_PUSHNUM_16: u8 = 0x60;

/// A parsed `m-of-n` CHECKMULTISIG redeem script.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Redeem {
    pub threshold: usize,
    pub keys: Vec<PublicKey>,
    pub script: ScriptBuf,
}

impl Redeem {
    pub fn from_hex(redeem_hex: &str) -> Result<Self, RelayError> {
        let bytes = hex::decode(redeem_hex.trim())
            .map_err(|e| RelayError::Config(format!("redeem is not hex: {e}")))?;
        Self::parse(ScriptBuf::from_bytes(bytes))
    }

    /// Expects `OP_m <key_1> .. <key_n> OP_n OP_CHECKMULTISIG`.
    pub fn parse(script: ScriptBuf) -> Result<Self, RelayError> {
        let invalid = |why: &str| RelayError::Config(format!("invalid redeem script: {why}"));

        let instructions = script
            .instructions()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| invalid(&e.to_string()))?;
        let [first, middle @ .., n_op, last] = instructions.as_slice() else {
            return Err(invalid("too short"));
        };

        let small_int = |ins: &Instruction| match ins {
            Instruction::Op(op) if (OP_PUSHNUM_1..=OP_PUSHNUM_16).contains(&op.to_u8()) => {
                Some(usize::from(op.to_u8() - OP_PUSHNUM_1 + 1))
            }
            _ => None,
        };
        let threshold = small_int(first).ok_or_else(|| invalid("missing threshold"))?;
        let total = small_int(n_op).ok_or_else(|| invalid("missing key count"))?;
        if !matches!(last, Instruction::Op(op) if *op == OP_CHECKMULTISIG) {
            return Err(invalid("not a CHECKMULTISIG script"));
        }

        let keys = middle
            .iter()
            .map(|ins| match ins {
                Instruction::PushBytes(bytes) => PublicKey::from_slice(bytes.as_bytes())
                    .map_err(|e| invalid(&format!("bad public key: {e}"))),
                _ => Err(invalid("unexpected opcode among keys")),
            })
            .collect::<Result<Vec<_>, _>>()?;
        if keys.len() != total || threshold > total {
            return Err(invalid("key count does not match"));
        }

        Ok(Self {
            threshold,
            keys,
            script,
        })
    }
}

/// What handling one request ended in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignOutcome {
    Broadcast(Txid),
    /// Threshold not reached; our signatures went to the alliance chain.
    Submitted(TxId),
}

pub struct Signer {
    secp: Secp256k1<All>,
    key: PrivateKey,
    public: PublicKey,
    redeem: Redeem,
    light: Arc<dyn LightClient>,
    alliance: Arc<dyn AllianceClient>,
    gas: GasParams,
    metrics: Arc<RelayMetrics>,
}

impl Signer {
    pub fn new(
        wif: &str,
        redeem_hex: &str,
        light: Arc<dyn LightClient>,
        alliance: Arc<dyn AllianceClient>,
        gas: GasParams,
        metrics: Arc<RelayMetrics>,
    ) -> Result<Self, RelayError> {
        let secp = Secp256k1::new();
        let key = PrivateKey::from_wif(wif.trim())
            .map_err(|e| RelayError::Config(format!("signing key: {e}")))?;
        let public = key.public_key(&secp);
        let redeem = Redeem::from_hex(redeem_hex)?;
        if !redeem.keys.contains(&public) {
            return Err(RelayError::Config(
                "signing key is not one of the redeem script keys".into(),
            ));
        }
        tracing::info!(
            threshold = redeem.threshold,
            keys = redeem.keys.len(),
            pubkey = %public,
            "signer ready"
        );
        Ok(Self {
            secp,
            key,
            public,
            redeem,
            light,
            alliance,
            gas,
            metrics,
        })
    }

    pub async fn process(&self, request: &SignRequest) -> Result<SignOutcome, RelayError> {
        let mut tx: Transaction = deserialize(&request.tx)
            .map_err(|e| RelayError::Signer(format!("undecodable transaction: {e}")))?;
        if tx.input.is_empty() {
            return Err(RelayError::Signer("transaction has no inputs".into()));
        }

        let messages = self.sighashes(&tx)?;
        let mut own = Vec::with_capacity(messages.len());
        let mut merged = Vec::with_capacity(messages.len());
        for (index, message) in messages.iter().enumerate() {
            let signature = ecdsa::Signature {
                signature: self.secp.sign_ecdsa(message, &self.key.inner),
                sighash_type: EcdsaSighashType::All,
            };
            let collected = request.signatures.get(index).map(Vec::as_slice).unwrap_or(&[]);
            merged.push(self.order_signatures(message, collected, &signature));
            own.push(signature.to_vec());
        }
        self.metrics.txs_signed.inc();

        let complete = merged.iter().all(|sigs| sigs.len() >= self.redeem.threshold);
        if complete {
            for (input, sigs) in tx.input.iter_mut().zip(&merged) {
                input.script_sig = self.script_sig(&sigs[..self.redeem.threshold])?;
            }
            self.light.broadcast(&tx)?;
            let txid = tx.compute_txid();
            self.metrics.txs_broadcast.inc();
            tracing::info!(source = %request.source, %txid, "withdrawal broadcast");
            return Ok(SignOutcome::Broadcast(txid));
        }

        let args = MultiSignArgs {
            source: request.source,
            signatures: own.into_iter().map(|sig| vec![sig]).collect(),
        };
        let hash = self.alliance.submit_signatures(&args, self.gas).await?;
        self.metrics.signatures_submitted.inc();
        tracing::info!(
            source = %request.source,
            alliance_tx = %hash,
            have = merged.iter().map(Vec::len).min().unwrap_or(0),
            need = self.redeem.threshold,
            "signatures submitted"
        );
        Ok(SignOutcome::Submitted(hash))
    }

    pub async fn run(
        self,
        mut requests: mpsc::Receiver<SignRequest>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        tracing::info!(pubkey = %self.public, "signer started");
        loop {
            let request = tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                request = requests.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };
            if let Err(e) = self.process(&request).await {
                tracing::error!(source = %request.source, error = %e, "dropping sign request");
            }
        }
        tracing::info!("signer stopped");
    }

    fn sighashes(&self, tx: &Transaction) -> Result<Vec<Message>, RelayError> {
        let cache = SighashCache::new(tx);
        (0..tx.input.len())
            .map(|index| {
                let sighash = cache
                    .legacy_signature_hash(index, &self.redeem.script, EcdsaSighashType::All.to_u32())
                    .map_err(|e| RelayError::Signer(format!("sighash for input {index}: {e}")))?;
                Ok(Message::from_digest(sighash.to_byte_array()))
            })
            .collect()
    }

    /// Valid signatures for one input, one per key at most, in redeem key
    /// order. Entries that verify against no key are dropped.
    fn order_signatures(
        &self,
        message: &Message,
        collected: &[Vec<u8>],
        own: &ecdsa::Signature,
    ) -> Vec<ecdsa::Signature> {
        let candidates: Vec<ecdsa::Signature> = collected
            .iter()
            .filter_map(|raw| match ecdsa::Signature::from_slice(raw) {
                Ok(sig) => Some(sig),
                Err(e) => {
                    tracing::debug!(error = %e, "ignoring malformed collected signature");
                    None
                }
            })
            .chain(std::iter::once(*own))
            .collect();

        self.redeem
            .keys
            .iter()
            .filter_map(|key| {
                candidates.iter().copied().find(|sig| {
                    self.secp
                        .verify_ecdsa(message, &sig.signature, &key.inner)
                        .is_ok()
                })
            })
            .collect()
    }

    fn script_sig(&self, signatures: &[ecdsa::Signature]) -> Result<ScriptBuf, RelayError> {
        let mut builder = Builder::new().push_opcode(OP_0);
        for sig in signatures {
            let push = PushBytesBuf::try_from(sig.to_vec())
                .map_err(|e| RelayError::Signer(format!("signature push: {e}")))?;
            builder = builder.push_slice(push);
        }
        let redeem = PushBytesBuf::try_from(self.redeem.script.to_bytes())
            .map_err(|e| RelayError::Signer(format!("redeem push: {e}")))?;
        Ok(builder.push_slice(redeem).into_script())
    }
}
