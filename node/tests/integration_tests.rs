//! Integration tests exercising the relay pipeline end-to-end:
//! alliance events → observer → voter → LMDB waiting store → retry.
//!
//! These wire real components together (LMDB store, relay tasks) with
//! nullable alliance and light clients standing in for the remote chains.

use std::sync::Arc;
use std::time::Duration;

use bitcoin::opcodes::all::OP_CHECKMULTISIG;
use bitcoin::script::Builder;
use bitcoin::secp256k1::{Secp256k1, SecretKey};
use bitcoin::{Network, PrivateKey};

use spvrelay_alliance::{GasParams, NotifyEvent, SmartContractEvent};
use spvrelay_node::{RelayConfig, RelayMetrics, RelayNode, VoteOutcome, Voter, WaitingRetry};
use spvrelay_nullables::{NullAllianceClient, NullLightClient};
use spvrelay_store::WaitingStore;
use spvrelay_store_lmdb::LmdbWaitingStore;
use spvrelay_types::{Encode, NetworkId, Proof, TxId};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn temp_store() -> (tempfile::TempDir, Arc<LmdbWaitingStore>) {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = LmdbWaitingStore::open(&dir.path().join("waiting"), 1024 * 1024).expect("open store");
    (dir, Arc::new(store))
}

fn proof(byte: u8, height: u32) -> Proof {
    Proof::new(TxId::new([byte; 32]), height, vec![byte; 8])
}

fn proof_event(proof: &Proof) -> SmartContractEvent {
    SmartContractEvent {
        tx_hash: hex::encode([0xEE; 32]),
        state: 1,
        notify: vec![NotifyEvent {
            contract_address: "09".into(),
            states: vec!["makeProof".into(), hex::encode(proof.to_bytes()).into()],
        }],
    }
}

/// A 1-of-1 signing setup: (WIF, redeem hex).
fn signing_material() -> (String, String) {
    let secp = Secp256k1::new();
    let key = PrivateKey::new(SecretKey::from_slice(&[7; 32]).expect("secret"), Network::Regtest);
    let redeem = Builder::new()
        .push_int(1)
        .push_key(&key.public_key(&secp))
        .push_int(1)
        .push_opcode(OP_CHECKMULTISIG)
        .into_script();
    (key.to_wif(), hex::encode(redeem.as_bytes()))
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

// ---------------------------------------------------------------------------
// Vote dedup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_vote_is_retried_once_then_deduplicated() {
    let (_dir, store) = temp_store();
    let alliance = Arc::new(NullAllianceClient::new());
    let light = Arc::new(NullLightClient::at_height(200));
    let metrics = Arc::new(RelayMetrics::new());
    let voter = Arc::new(Voter::new(
        alliance.clone(),
        store.clone(),
        GasParams { price: 0, limit: 30_000 },
        metrics.clone(),
    ));
    let retry = WaitingRetry::new(
        voter.clone(),
        store.clone(),
        light,
        6,
        Duration::from_secs(600),
        metrics.clone(),
    );
    let p = proof(1, 100);

    // First delivery: the alliance node rejects the vote.
    alliance.fail_next_votes(1);
    assert_eq!(voter.process(p.clone()).await, VoteOutcome::Deferred);
    assert!(store.check_waiting(&p.txid).unwrap());
    assert!(!store.check_voted(&p.txid).unwrap());

    // Retry pass re-submits it.
    assert_eq!(retry.retry_once().await, 1);
    assert_eq!(alliance.votes(), vec![p.clone()]);
    assert!(store.check_voted(&p.txid).unwrap());
    assert!(!store.check_waiting(&p.txid).unwrap());

    // A late duplicate delivery is discarded.
    assert_eq!(voter.process(p.clone()).await, VoteOutcome::Skipped);
    assert_eq!(alliance.votes().len(), 1);
    assert_eq!(metrics.votes_submitted.get(), 1);
    assert_eq!(metrics.votes_failed.get(), 1);
    assert_eq!(metrics.votes_skipped.get(), 1);
}

#[tokio::test]
async fn deferred_proofs_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("waiting");
    let p = proof(2, 50);
    {
        let store = Arc::new(LmdbWaitingStore::open(&path, 1024).unwrap());
        let alliance = Arc::new(NullAllianceClient::new());
        alliance.fail_next_votes(1);
        let voter = Voter::new(
            alliance,
            store.clone(),
            GasParams::default(),
            Arc::new(RelayMetrics::new()),
        );
        assert_eq!(voter.process(p.clone()).await, VoteOutcome::Deferred);
        store.close();
    }

    let store = LmdbWaitingStore::open(&path, 1024).unwrap();
    assert_eq!(store.get(&p.txid).unwrap(), p);
    assert!(!store.check_voted(&p.txid).unwrap());
}

// ---------------------------------------------------------------------------
// Full node
// ---------------------------------------------------------------------------

#[tokio::test]
async fn relay_node_votes_on_observed_proofs() {
    let (dir, store) = temp_store();
    let alliance = Arc::new(NullAllianceClient::new());
    let light = Arc::new(NullLightClient::at_height(10));
    let (wif, redeem) = signing_material();

    let first = proof(3, 5);
    let second = proof(4, 6);
    store.set_height(19).unwrap();
    alliance.set_height(22);
    alliance.add_event(20, proof_event(&first));
    alliance.add_event(21, proof_event(&second));
    alliance.add_event(22, proof_event(&proof(5, 7)));

    let mut config = RelayConfig::new(NetworkId::Regtest, dir.path().to_path_buf());
    config.vote = true;
    config.alliance.signing_key = wif;
    config.alliance.redeem = redeem;
    config.alliance.observer_poll_interval_secs = 1;

    let mut node = RelayNode::new(
        config,
        store.clone(),
        light.clone(),
        Some(alliance.clone()),
        Arc::new(RelayMetrics::new()),
    )
    .unwrap();
    node.start().unwrap();

    let voted = wait_until(|| alliance.votes().len() == 2).await;
    node.stop().await;

    assert!(voted, "expected two votes, got {:?}", alliance.votes());
    assert_eq!(alliance.votes(), vec![first, second]);
    assert!(light.is_closed());

    // Height 22 is not yet confirmed with the default single confirmation.
    let reopened = LmdbWaitingStore::open(&dir.path().join("waiting"), 1024).unwrap();
    assert_eq!(reopened.get_height().unwrap(), 21);
    assert_eq!(reopened.voted_count().unwrap(), 2);
}
