//! RPC request handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::Json;
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;

use spvrelay_types::TxId;

use crate::server::RpcState;
use crate::RpcError;

// ── Tip ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct TipResponse {
    pub height: u32,
    pub hash: String,
    pub timestamp: u64,
}

pub async fn tip(State(state): State<Arc<RpcState>>) -> Result<Json<TipResponse>, RpcError> {
    let tip = state.light.best_block()?;
    Ok(Json(TipResponse {
        height: tip.height,
        hash: tip.hash.to_string(),
        timestamp: tip.timestamp.as_secs(),
    }))
}

// ── Waiting ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct WaitingProof {
    pub height: u32,
    pub payload: String,
}

#[derive(Debug, Serialize)]
pub struct WaitingResponse {
    pub txid: String,
    pub waiting: bool,
    pub voted: bool,
    pub proof: Option<WaitingProof>,
}

pub async fn waiting(
    State(state): State<Arc<RpcState>>,
    Path(txid): Path<String>,
) -> Result<Json<WaitingResponse>, RpcError> {
    let txid: TxId = txid
        .parse()
        .map_err(|e| RpcError::InvalidRequest(format!("txid: {e}")))?;

    let voted = state.store.check_voted(&txid)?;
    let proof = match state.store.get(&txid) {
        Ok(proof) => Some(WaitingProof {
            height: proof.height,
            payload: hex::encode(&proof.payload),
        }),
        Err(e) if e.is_not_found() => None,
        Err(e) => return Err(e.into()),
    };

    Ok(Json(WaitingResponse {
        txid: txid.to_string(),
        waiting: proof.is_some(),
        voted,
        proof,
    }))
}

// ── Stats ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub waiting_entries: u64,
    pub voted_entries: u64,
    pub observer_height: u32,
    pub proofs_observed: u64,
    pub votes_submitted: u64,
    pub votes_failed: u64,
    pub txs_broadcast: u64,
}

pub async fn stats(State(state): State<Arc<RpcState>>) -> Result<Json<StatsResponse>, RpcError> {
    let metrics = &state.metrics;
    Ok(Json(StatsResponse {
        waiting_entries: state.store.waiting_count()?,
        voted_entries: state.store.voted_count()?,
        observer_height: state.store.get_height()?,
        proofs_observed: metrics.proofs_observed.get(),
        votes_submitted: metrics.votes_submitted.get(),
        votes_failed: metrics.votes_failed.get(),
        txs_broadcast: metrics.txs_broadcast.get(),
    }))
}

// ── Metrics ──────────────────────────────────────────────────────────────

pub async fn metrics(State(state): State<Arc<RpcState>>) -> Result<impl IntoResponse, RpcError> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&state.metrics.registry.gather(), &mut buffer)
        .map_err(|e| RpcError::Server(format!("metrics encoding: {e}")))?;
    Ok(([(CONTENT_TYPE, encoder.format_type().to_string())], buffer))
}
