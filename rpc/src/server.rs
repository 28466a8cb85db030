//! Axum-based RPC server.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use spvrelay_node::RelayMetrics;
use spvrelay_spv::LightClient;
use spvrelay_store::WaitingStore;

use crate::handlers;
use crate::RpcError;

/// Shared handles the handlers read from.
pub struct RpcState {
    pub store: Arc<dyn WaitingStore>,
    pub light: Arc<dyn LightClient>,
    pub metrics: Arc<RelayMetrics>,
}

pub struct RpcServer {
    pub addr: SocketAddr,
    state: Arc<RpcState>,
}

impl RpcServer {
    pub fn new(addr: SocketAddr, state: RpcState) -> Self {
        Self {
            addr,
            state: Arc::new(state),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/v1/tip", get(handlers::tip))
            .route("/api/v1/waiting/:txid", get(handlers::waiting))
            .route("/api/v1/stats", get(handlers::stats))
            .route("/metrics", get(handlers::metrics))
            .with_state(self.state.clone())
    }

    /// Bind and serve until `shutdown` fires. Returns the bound address
    /// (useful with port 0) and the server task.
    pub async fn start(
        &self,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(SocketAddr, JoinHandle<()>), RpcError> {
        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| RpcError::Server(format!("bind {}: {e}", self.addr)))?;
        let local = listener
            .local_addr()
            .map_err(|e| RpcError::Server(e.to_string()))?;
        tracing::info!(addr = %local, "rpc server listening");

        let app = self.router();
        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            });
            if let Err(e) = serve.await {
                tracing::error!(error = %e, "rpc server error");
            }
            tracing::info!("rpc server stopped");
        });
        Ok((local, handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use spvrelay_nullables::{NullLightClient, NullWaitingStore};
    use spvrelay_types::{Proof, TxId};

    struct Running {
        base: String,
        store: Arc<NullWaitingStore>,
        shutdown: broadcast::Sender<()>,
        handle: JoinHandle<()>,
    }

    async fn running() -> Running {
        let store = Arc::new(NullWaitingStore::new());
        let light = Arc::new(NullLightClient::new());
        light.set_tip(321, 1_700_000_000);
        let metrics = Arc::new(RelayMetrics::new());
        metrics.votes_submitted.inc();
        let server = RpcServer::new(
            "127.0.0.1:0".parse().unwrap(),
            RpcState {
                store: store.clone(),
                light,
                metrics,
            },
        );
        let (shutdown, rx) = broadcast::channel(1);
        let (addr, handle) = server.start(rx).await.unwrap();
        Running {
            base: format!("http://{addr}"),
            store,
            shutdown,
            handle,
        }
    }

    async fn get_json(url: &str) -> (u16, Value) {
        let response = reqwest::get(url).await.unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }

    #[tokio::test]
    async fn tip_and_stats() {
        let server = running().await;
        server.store.set_height(17).unwrap();

        let (status, tip) = get_json(&format!("{}/api/v1/tip", server.base)).await;
        assert_eq!(status, 200);
        assert_eq!(tip["height"], 321);
        assert_eq!(tip["timestamp"], 1_700_000_000u64);

        let (_, stats) = get_json(&format!("{}/api/v1/stats", server.base)).await;
        assert_eq!(stats["observer_height"], 17);
        assert_eq!(stats["votes_submitted"], 1);

        server.shutdown.send(()).unwrap();
        server.handle.await.unwrap();
    }

    #[tokio::test]
    async fn waiting_lookup() {
        let server = running().await;
        let txid = TxId::new([0xAB; 32]);
        server
            .store
            .put(&txid, &Proof::new(txid, 99, vec![1, 2]))
            .unwrap();

        let (status, body) =
            get_json(&format!("{}/api/v1/waiting/{}", server.base, txid)).await;
        assert_eq!(status, 200);
        assert_eq!(body["waiting"], true);
        assert_eq!(body["voted"], false);
        assert_eq!(body["proof"]["height"], 99);
        assert_eq!(body["proof"]["payload"], "0102");

        let other = TxId::new([0x01; 32]);
        let (_, body) = get_json(&format!("{}/api/v1/waiting/{}", server.base, other)).await;
        assert_eq!(body["waiting"], false);
        assert!(body["proof"].is_null());

        let (status, _) = get_json(&format!("{}/api/v1/waiting/nothex", server.base)).await;
        assert_eq!(status, 400);
    }

    #[tokio::test]
    async fn metrics_exposition() {
        let server = running().await;
        let body = reqwest::get(format!("{}/metrics", server.base))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(body.contains("spvrelay_votes_submitted_total 1"));
    }
}
