//! JSON-RPC 2.0 client for an alliance node.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use spvrelay_crypto::AllianceKey;
use spvrelay_types::{Encode, Proof, TxId};

use crate::client::AllianceClient;
use crate::events::SmartContractEvent;
use crate::tx::{AllianceTx, GasParams, MultiSignArgs};
use crate::AllianceError;

const MAX_ATTEMPTS: usize = 3;

/// Which transport failures a call may be resent after.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Resend {
    /// Reads: connect failures and timeouts.
    Transient,
    /// Submissions: only failures before the request left this process.
    BeforeSend,
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Vec<Value>,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorObject {
    code: i64,
    message: String,
}

/// Talks to one alliance node and signs submissions with the relay's key.
pub struct JsonRpcAllianceClient {
    http: reqwest::Client,
    url: String,
    request_id: AtomicU64,
    key: AllianceKey,
}

impl JsonRpcAllianceClient {
    pub fn new(
        url: impl Into<String>,
        key: AllianceKey,
        timeout: Duration,
    ) -> Result<Self, AllianceError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(2).min(timeout))
            .timeout(timeout)
            .tcp_keepalive(Some(Duration::from_secs(30)))
            .build()?;
        Ok(Self {
            http,
            url: url.into(),
            request_id: AtomicU64::new(1),
            key,
        })
    }

    pub fn payer(&self) -> [u8; 32] {
        self.key.public_key()
    }

    async fn call(
        &self,
        method: &str,
        params: Vec<Value>,
        resend: Resend,
    ) -> Result<Value, AllianceError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: self.request_id.fetch_add(1, Ordering::Relaxed),
        };

        let mut attempt = 0;
        let response = loop {
            attempt += 1;
            match self.http.post(&self.url).json(&request).send().await {
                Ok(resp) => break resp,
                Err(e) if attempt < MAX_ATTEMPTS && may_resend(&e, resend) => {
                    tracing::warn!(method, attempt, error = %e, "alliance RPC transport error, retrying");
                    tokio::time::sleep(Duration::from_millis(50 * attempt as u64)).await;
                }
                Err(e) => return Err(e.into()),
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AllianceError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| AllianceError::Response(e.to_string()))?;
        if let Some(err) = parsed.error {
            return Err(AllianceError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        Ok(parsed.result.unwrap_or(Value::Null))
    }

    async fn send_transaction(&self, tx: &AllianceTx) -> Result<TxId, AllianceError> {
        let local = tx.hash();
        let sent = self
            .call(
                "sendrawtransaction",
                vec![json!(hex::encode(tx.to_bytes()))],
                Resend::BeforeSend,
            )
            .await;
        let result = match sent {
            Ok(result) => result,
            Err(e) if e.is_duplicate_tx() => {
                tracing::debug!(%local, "alliance node already holds this transaction");
                return Ok(local);
            }
            Err(e) => return Err(e),
        };
        let hash = result
            .as_str()
            .ok_or_else(|| AllianceError::Response(format!("expected tx hash, got {result}")))?;
        let remote: TxId = hash.parse()?;
        if remote != local {
            tracing::debug!(%local, %remote, "alliance node reports a different tx hash");
        }
        Ok(remote)
    }
}

fn may_resend(err: &reqwest::Error, resend: Resend) -> bool {
    match resend {
        Resend::Transient => err.is_connect() || err.is_timeout(),
        Resend::BeforeSend => err.is_connect(),
    }
}

#[async_trait]
impl AllianceClient for JsonRpcAllianceClient {
    async fn current_height(&self) -> Result<u32, AllianceError> {
        let result = self
            .call("getblockcount", Vec::new(), Resend::Transient)
            .await?;
        result
            .as_u64()
            .and_then(|h| u32::try_from(h).ok())
            .ok_or_else(|| AllianceError::Response(format!("expected block count, got {result}")))
    }

    async fn events_at(&self, height: u32) -> Result<Vec<SmartContractEvent>, AllianceError> {
        let result = self
            .call("getsmartcodeevent", vec![json!(height)], Resend::Transient)
            .await?;
        if result.is_null() {
            return Ok(Vec::new());
        }
        serde_json::from_value(result).map_err(|e| AllianceError::Response(e.to_string()))
    }

    async fn vote(&self, proof: &Proof, gas: GasParams) -> Result<TxId, AllianceError> {
        let tx = AllianceTx::vote(proof, gas, &self.key);
        self.send_transaction(&tx).await
    }

    async fn submit_signatures(
        &self,
        args: &MultiSignArgs,
        gas: GasParams,
    ) -> Result<TxId, AllianceError> {
        let tx = AllianceTx::multi_sign(args, gas, &self.key);
        self.send_transaction(&tx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::{Json, Router};
    use spvrelay_types::Decode;
    use std::sync::{Arc, Mutex};

    /// Minimal alliance node: answers the three methods the relay uses and
    /// records raw transactions it receives.
    async fn spawn_node(received: Arc<Mutex<Vec<AllianceTx>>>) -> String {
        let app = Router::new().route(
            "/",
            post(move |Json(req): Json<Value>| {
                let received = received.clone();
                async move {
                    let id = req["id"].clone();
                    let result = match req["method"].as_str() {
                        Some("getblockcount") => json!(1234),
                        Some("getsmartcodeevent") if req["params"][0] == json!(7) => json!([{
                            "TxHash": hex::encode([1u8; 32]),
                            "State": 1,
                            "Notify": [{"ContractAddress": "09", "States": ["x"]}]
                        }]),
                        Some("getsmartcodeevent") => Value::Null,
                        Some("sendrawtransaction") => {
                            let raw = hex::decode(req["params"][0].as_str().unwrap()).unwrap();
                            let tx = AllianceTx::from_bytes(&raw).unwrap();
                            let hash = tx.hash();
                            received.lock().unwrap().push(tx);
                            json!(hash.to_string())
                        }
                        _ => {
                            return Json(json!({
                                "jsonrpc": "2.0", "id": id,
                                "error": {"code": -32601, "message": "method not found"}
                            }))
                        }
                    };
                    Json(json!({"jsonrpc": "2.0", "id": id, "result": result}))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/")
    }

    fn client(url: String) -> JsonRpcAllianceClient {
        JsonRpcAllianceClient::new(url, AllianceKey::from_secret(&[1; 32]), Duration::from_secs(5))
            .unwrap()
    }

    #[tokio::test]
    async fn reads_height_and_events() {
        let url = spawn_node(Arc::default()).await;
        let client = client(url);
        assert_eq!(client.current_height().await.unwrap(), 1234);
        let events = client.events_at(7).await.unwrap();
        assert_eq!(events.len(), 1);
        assert!(client.events_at(8).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn vote_sends_signed_transaction() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let url = spawn_node(received.clone()).await;
        let client = client(url);

        let proof = Proof::new(TxId::new([4; 32]), 99, vec![1]);
        let gas = GasParams { price: 1, limit: 2 };
        let hash = client.vote(&proof, gas).await.unwrap();

        let txs = received.lock().unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].hash(), hash);
        assert_eq!(txs[0].method, "vote");
        assert_eq!(txs[0].payer, client.payer());
        assert!(txs[0].verify());
    }

    /// Node that answers every request after `delay` with `reply` and counts
    /// `sendrawtransaction` calls.
    async fn spawn_scripted_node(delay: Duration, reply: Value, hits: Arc<AtomicU64>) -> String {
        let app = Router::new().route(
            "/",
            post(move |Json(req): Json<Value>| {
                let hits = hits.clone();
                let reply = reply.clone();
                async move {
                    if req["method"] == json!("sendrawtransaction") {
                        hits.fetch_add(1, Ordering::SeqCst);
                    }
                    tokio::time::sleep(delay).await;
                    let mut body = reply;
                    body["id"] = req["id"].clone();
                    Json(body)
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/")
    }

    #[tokio::test]
    async fn timed_out_vote_is_sent_once() {
        let hits = Arc::new(AtomicU64::new(0));
        let reply = json!({"jsonrpc": "2.0", "result": hex::encode([0u8; 32])});
        let url = spawn_scripted_node(Duration::from_millis(400), reply, hits.clone()).await;
        let client = JsonRpcAllianceClient::new(
            url,
            AllianceKey::from_secret(&[1; 32]),
            Duration::from_millis(150),
        )
        .unwrap();

        let proof = Proof::new(TxId::new([6; 32]), 10, vec![2]);
        let result = client.vote(&proof, GasParams::default()).await;
        assert!(matches!(result, Err(AllianceError::Transport(_))));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timed_out_read_is_retried() {
        let calls = Arc::new(AtomicU64::new(0));
        let counter = calls.clone();
        let app = Router::new().route(
            "/",
            post(move |Json(req): Json<Value>| {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        tokio::time::sleep(Duration::from_millis(400)).await;
                    }
                    Json(json!({"jsonrpc": "2.0", "id": req["id"], "result": 55}))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let client = JsonRpcAllianceClient::new(
            format!("http://{addr}/"),
            AllianceKey::from_secret(&[1; 32]),
            Duration::from_millis(150),
        )
        .unwrap();

        assert_eq!(client.current_height().await.unwrap(), 55);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn duplicate_rejection_counts_as_accepted() {
        let hits = Arc::new(AtomicU64::new(0));
        let reply = json!({
            "jsonrpc": "2.0",
            "error": {"code": 43001, "message": "Duplicated transaction detected"}
        });
        let url = spawn_scripted_node(Duration::ZERO, reply, hits.clone()).await;
        let client = client(url);

        let proof = Proof::new(TxId::new([6; 32]), 10, vec![2]);
        assert!(client.vote(&proof, GasParams::default()).await.is_ok());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn other_rpc_rejection_is_an_error() {
        let hits = Arc::new(AtomicU64::new(0));
        let reply = json!({
            "jsonrpc": "2.0",
            "error": {"code": -32000, "message": "insufficient gas"}
        });
        let url = spawn_scripted_node(Duration::ZERO, reply, hits).await;
        let client = client(url);

        let proof = Proof::new(TxId::new([6; 32]), 10, vec![2]);
        assert!(matches!(
            client.vote(&proof, GasParams::default()).await,
            Err(AllianceError::Rpc { .. })
        ));
    }

    #[tokio::test]
    async fn connection_refused_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = client(format!("http://{addr}/"));
        assert!(matches!(
            client.current_height().await,
            Err(AllianceError::Transport(_))
        ));
    }
}
