//! Signed alliance-chain transactions.
//!
//! Layout (little-endian integers, var-uint length prefixes):
//! `version u8 ‖ nonce u32 ‖ method ‖ args ‖ gas_price u64 ‖ gas_limit u64 ‖ payer [32] ‖ signature [64]`.
//! The signature covers every byte before it. A fresh random nonce keeps two
//! submissions of the same call from sharing a hash.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use spvrelay_crypto::{verify_signature, AllianceKey, PUBLIC_KEY_LEN, SIGNATURE_LEN};
use spvrelay_types::{CodecError, Decode, Encode, Proof, Sink, Source, TxId};

pub const ALLIANCE_TX_VERSION: u8 = 1;
pub const METHOD_VOTE: &str = "vote";
pub const METHOD_MULTI_SIGN: &str = "multiSign";

/// Fee parameters attached to every submitted transaction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasParams {
    pub price: u64,
    pub limit: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllianceTx {
    pub nonce: u32,
    pub method: String,
    pub args: Vec<u8>,
    pub gas: GasParams,
    pub payer: [u8; PUBLIC_KEY_LEN],
    pub signature: [u8; SIGNATURE_LEN],
}

impl AllianceTx {
    /// Build and sign a transaction paid for by `key`.
    pub fn signed(method: &str, args: Vec<u8>, gas: GasParams, key: &AllianceKey) -> Self {
        Self::signed_with_nonce(rand::random(), method, args, gas, key)
    }

    pub fn signed_with_nonce(
        nonce: u32,
        method: &str,
        args: Vec<u8>,
        gas: GasParams,
        key: &AllianceKey,
    ) -> Self {
        let mut tx = Self {
            nonce,
            method: method.to_string(),
            args,
            gas,
            payer: key.public_key(),
            signature: [0u8; SIGNATURE_LEN],
        };
        tx.signature = key.sign(&tx.unsigned_bytes());
        tx
    }

    /// A vote endorsing `proof`.
    pub fn vote(proof: &Proof, gas: GasParams, key: &AllianceKey) -> Self {
        Self::signed(METHOD_VOTE, proof.to_bytes(), gas, key)
    }

    pub fn multi_sign(args: &MultiSignArgs, gas: GasParams, key: &AllianceKey) -> Self {
        Self::signed(METHOD_MULTI_SIGN, args.to_bytes(), gas, key)
    }

    pub fn unsigned_bytes(&self) -> Vec<u8> {
        let mut sink = Sink::new();
        self.encode_unsigned(&mut sink);
        sink.into_bytes()
    }

    /// Double SHA-256 of the unsigned encoding.
    pub fn hash(&self) -> TxId {
        let first = Sha256::digest(self.unsigned_bytes());
        TxId::new(Sha256::digest(first).into())
    }

    pub fn verify(&self) -> bool {
        verify_signature(&self.unsigned_bytes(), &self.signature, &self.payer)
    }

    fn encode_unsigned(&self, sink: &mut Sink) {
        sink.write_u8(ALLIANCE_TX_VERSION);
        sink.write_u32(self.nonce);
        sink.write_var_bytes(self.method.as_bytes());
        sink.write_var_bytes(&self.args);
        sink.write_u64(self.gas.price);
        sink.write_u64(self.gas.limit);
        sink.write_bytes(&self.payer);
    }
}

impl Encode for AllianceTx {
    fn encode(&self, sink: &mut Sink) {
        self.encode_unsigned(sink);
        sink.write_bytes(&self.signature);
    }
}

impl Decode for AllianceTx {
    fn decode(source: &mut Source<'_>) -> Result<Self, CodecError> {
        let version = source.read_u8()?;
        if version != ALLIANCE_TX_VERSION {
            return Err(CodecError::UnsupportedVersion(version));
        }
        let nonce = source.read_u32()?;
        let method = String::from_utf8(source.read_var_bytes()?.to_vec())
            .map_err(|_| CodecError::InvalidUtf8 { field: "method" })?;
        let args = source.read_var_bytes()?.to_vec();
        let price = source.read_u64()?;
        let limit = source.read_u64()?;
        let payer = source.read_hash32()?;
        let sig = source.read_bytes(SIGNATURE_LEN)?;
        let mut signature = [0u8; SIGNATURE_LEN];
        signature.copy_from_slice(sig);
        Ok(Self {
            nonce,
            method,
            args,
            gas: GasParams { price, limit },
            payer,
            signature,
        })
    }
}

/// Arguments of a `multiSign` call: this party's signature for each input of
/// the withdrawal emitted by alliance transaction `source`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultiSignArgs {
    pub source: TxId,
    pub signatures: Vec<Vec<Vec<u8>>>,
}

impl Encode for MultiSignArgs {
    fn encode(&self, sink: &mut Sink) {
        sink.write_bytes(self.source.as_bytes());
        sink.write_var_uint(self.signatures.len() as u64);
        for input in &self.signatures {
            sink.write_var_uint(input.len() as u64);
            for sig in input {
                sink.write_var_bytes(sig);
            }
        }
    }
}

impl Decode for MultiSignArgs {
    fn decode(source: &mut Source<'_>) -> Result<Self, CodecError> {
        let origin = TxId::new(source.read_hash32()?);
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
            signatures,
        })
    }
}
