//! Inclusion proof for a UTXO-chain transaction.

use serde::{Deserialize, Serialize};

use crate::codec::{Decode, Encode, Sink, Source};
use crate::{CodecError, TxId};

/// Current proof codec version.
pub const PROOF_CODEC_VERSION: u8 = 1;

/// A UTXO-chain transaction plus its inclusion evidence at `height`.
///
/// Immutable once created; `txid` is its identity. `payload` is opaque to the
/// relay and is passed through to the alliance chain unchanged.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    pub txid: TxId,
    pub height: u32,
    pub payload: Vec<u8>,
}

impl Proof {
    pub fn new(txid: TxId, height: u32, payload: Vec<u8>) -> Self {
        Self {
            txid,
            height,
            payload,
        }
    }
}

impl Encode for Proof {
    fn encode(&self, sink: &mut Sink) {
        sink.write_u8(PROOF_CODEC_VERSION);
        sink.write_var_bytes(self.txid.as_bytes());
        sink.write_u32(self.height);
        sink.write_var_bytes(&self.payload);
    }
}

impl Decode for Proof {
    fn decode(source: &mut Source<'_>) -> Result<Self, CodecError> {
        let version = source.read_u8()?;
        if version != PROOF_CODEC_VERSION {
            return Err(CodecError::UnsupportedVersion(version));
        }
        let txid = TxId::from_slice(source.read_var_bytes()?)?;
        let height = source.read_u32()?;
        let payload = source.read_var_bytes()?.to_vec();
        Ok(Self {
            txid,
            height,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_stable() {
        let proof = Proof::new(TxId::new([7u8; 32]), 0x0102_0304, vec![0xAA, 0xBB]);
        let bytes = proof.to_bytes();
        assert_eq!(bytes[0], PROOF_CODEC_VERSION);
        assert_eq!(bytes[1], 32);
        assert_eq!(&bytes[2..34], &[7u8; 32]);
        assert_eq!(&bytes[34..38], &[4, 3, 2, 1]);
        assert_eq!(&bytes[38..], &[2, 0xAA, 0xBB]);
    }

    #[test]
    fn unknown_version_rejected() {
        let mut bytes = Proof::new(TxId::ZERO, 1, vec![]).to_bytes();
        bytes[0] = 9;
        assert_eq!(
            Proof::from_bytes(&bytes),
            Err(CodecError::UnsupportedVersion(9))
        );
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut bytes = Proof::new(TxId::ZERO, 1, vec![1]).to_bytes();
        bytes.push(0);
        assert_eq!(Proof::from_bytes(&bytes), Err(CodecError::TrailingBytes(1)));
    }
}
