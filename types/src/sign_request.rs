//! Request to co-sign a multisig redemption on the UTXO chain.

use serde::{Deserialize, Serialize};

use crate::codec::{Decode, Encode, Sink, Source};
use crate::{CodecError, TxId};

/// Current sign-request codec version.
pub const SIGN_REQUEST_CODEC_VERSION: u8 = 1;

/// A withdrawal the alliance chain asks this party to co-sign.
///
/// `tx` is the unsigned UTXO transaction in consensus encoding. `signatures`
/// holds, per input, the signatures other co-signers already contributed
/// (DER plus sighash byte). It may be shorter than the input count.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignRequest {
    /// Alliance-chain transaction that emitted the request.
    pub source: TxId,
    pub tx: Vec<u8>,
    pub signatures: Vec<Vec<Vec<u8>>>,
}

impl SignRequest {
    pub fn new(source: TxId, tx: Vec<u8>) -> Self {
        Self {
            source,
            tx,
            signatures: Vec::new(),
        }
    }
}

impl Encode for SignRequest {
    fn encode(&self, sink: &mut Sink) {
        sink.write_u8(SIGN_REQUEST_CODEC_VERSION);
        sink.write_bytes(self.source.as_bytes());
        sink.write_var_bytes(&self.tx);
        sink.write_var_uint(self.signatures.len() as u64);
        for input in &self.signatures {
            sink.write_var_uint(input.len() as u64);
            for sig in input {
                sink.write_var_bytes(sig);
            }
        }
    }
}

impl Decode for SignRequest {
    fn decode(source: &mut Source<'_>) -> Result<Self, CodecError> {
        let version = source.read_u8()?;
        if version != SIGN_REQUEST_CODEC_VERSION {
            return Err(CodecError::UnsupportedVersion(version));
        }
        let origin = TxId::new(source.read_hash32()?);
        let tx = source.read_var_bytes()?.to_vec();
        let inputs = source.read_var_uint()?;
        let mut signatures = Vec::new();
        for _ in 0..inputs {
            let count = source.read_var_uint()?;
            let mut sigs = Vec::new();
            for _ in 0..count {
                sigs.push(source.read_var_bytes()?.to_vec());
            }
            signatures.push(sigs);
        }
        Ok(Self {
            source: origin,
            tx,
            signatures,
        })
    }
}
