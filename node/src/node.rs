//! The relay node: wires the pipeline tasks together and owns their lifetime.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use spvrelay_alliance::{AllianceClient, EventFilter};
use spvrelay_spv::LightClient;
use spvrelay_store::WaitingStore;

use crate::config::{RelayConfig, PIPELINE_QUEUE_CAPACITY, SHUTDOWN_TIMEOUT};
use crate::metrics::RelayMetrics;
use crate::observer::{Observer, ObserverConfig};
use crate::shutdown::ShutdownController;
use crate::signer::Signer;
use crate::supervisor::Supervisor;
use crate::voter::{Voter, WaitingRetry};
use crate::RelayError;

pub struct RelayNode {
    config: RelayConfig,
    store: Arc<dyn WaitingStore>,
    light: Arc<dyn LightClient>,
    alliance: Option<Arc<dyn AllianceClient>>,
    metrics: Arc<RelayMetrics>,
    shutdown: ShutdownController,
    task_handles: Vec<JoinHandle<()>>,
    started: bool,
}

impl RelayNode {
    /// `alliance` may be `None` only when vote mode is off.
    pub fn new(
        config: RelayConfig,
        store: Arc<dyn WaitingStore>,
        light: Arc<dyn LightClient>,
        alliance: Option<Arc<dyn AllianceClient>>,
        metrics: Arc<RelayMetrics>,
    ) -> Result<Self, RelayError> {
        config.validate()?;
        if config.vote && alliance.is_none() {
            return Err(RelayError::Config(
                "vote mode needs an alliance client".into(),
            ));
        }
        Ok(Self {
            config,
            store,
            light,
            alliance,
            metrics,
            shutdown: ShutdownController::new(),
            task_handles: Vec::new(),
            started: false,
        })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn WaitingStore> {
        self.store.clone()
    }

    pub fn light(&self) -> Arc<dyn LightClient> {
        self.light.clone()
    }

    pub fn metrics(&self) -> Arc<RelayMetrics> {
        self.metrics.clone()
    }

    pub fn shutdown_controller(&self) -> ShutdownController {
        self.shutdown.clone()
    }

    /// Hand a task spawned outside the node to `stop` for joining.
    pub fn track(&mut self, handle: JoinHandle<()>) {
        self.task_handles.push(handle);
    }

    /// Spawn the relay tasks. Only the first call has an effect.
    ///
    /// Fails without spawning anything if the signer cannot be built from
    /// the configured key and redeem script.
    pub fn start(&mut self) -> Result<(), RelayError> {
        if self.started {
            return Ok(());
        }
        tracing::info!(
            network = %self.config.network,
            data_dir = %self.config.effective_data_dir().display(),
            vote = self.config.vote,
            restart = self.config.restart,
            "relay node starting"
        );

        if self.config.vote {
            if let Some(alliance) = self.alliance.clone() {
                self.start_pipeline(alliance)?;
            }
        }
        if self.config.restart {
            let supervisor = Supervisor::new(
                self.light.clone(),
                self.config.restart_interval,
                self.metrics.clone(),
            );
            self.task_handles
                .push(tokio::spawn(supervisor.run(self.shutdown.subscribe())));
        }
        self.spawn_metrics_refresh();

        self.started = true;
        tracing::info!(tasks = self.task_handles.len(), "relay node started");
        Ok(())
    }

    fn start_pipeline(&mut self, alliance: Arc<dyn AllianceClient>) -> Result<(), RelayError> {
        let settings = &self.config.alliance;
        let gas = settings.gas();

        let signer = Signer::new(
            &settings.signing_key,
            &settings.redeem,
            self.light.clone(),
            alliance.clone(),
            gas,
            self.metrics.clone(),
        )?;

        let (proof_tx, proof_rx) = mpsc::channel(PIPELINE_QUEUE_CAPACITY);
        let (sign_tx, sign_rx) = mpsc::channel(PIPELINE_QUEUE_CAPACITY);

        let observer = Observer::new(
            alliance.clone(),
            self.store.clone(),
            ObserverConfig {
                confirmations: settings.observer_confirmations,
                poll_interval: std::time::Duration::from_secs(
                    settings.observer_poll_interval_secs,
                ),
                filter: EventFilter::from_config(settings),
            },
            proof_tx,
            sign_tx,
            self.metrics.clone(),
        );
        let voter = Arc::new(Voter::new(
            alliance,
            self.store.clone(),
            gas,
            self.metrics.clone(),
        ));
        let retry = WaitingRetry::new(
            voter.clone(),
            self.store.clone(),
            self.light.clone(),
            settings.blocks_to_wait,
            std::time::Duration::from_secs(settings.retry_interval_secs),
            self.metrics.clone(),
        );

        self.task_handles
            .push(tokio::spawn(observer.run(self.shutdown.subscribe())));
        self.task_handles
            .push(tokio::spawn(voter.run(proof_rx, self.shutdown.subscribe())));
        self.task_handles
            .push(tokio::spawn(retry.run(self.shutdown.subscribe())));
        self.task_handles
            .push(tokio::spawn(signer.run(sign_rx, self.shutdown.subscribe())));
        Ok(())
    }

    fn spawn_metrics_refresh(&mut self) {
        let store = self.store.clone();
        let light = self.light.clone();
        let metrics = self.metrics.clone();
        let period = self.config.metrics_refresh_interval;
        let mut shutdown_rx = self.shutdown.subscribe();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => break,
                    _ = interval.tick() => {
                        refresh_metrics(store.as_ref(), light.as_ref(), &metrics);
                    }
                }
            }
        });
        self.task_handles.push(handle);
    }

    /// Signal every task, wait for them, then close the store and the
    /// light client.
    pub async fn stop(&mut self) {
        tracing::info!("relay node stopping");
        self.shutdown.shutdown();

        let handles: Vec<JoinHandle<()>> = self.task_handles.drain(..).collect();
        let wait_all = async {
            for handle in handles {
                if let Err(e) = handle.await {
                    tracing::error!(error = %e, "relay task panicked");
                }
            }
        };
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, wait_all)
            .await
            .is_err()
        {
            tracing::warn!(
                timeout = ?SHUTDOWN_TIMEOUT,
                "shutdown timeout, some tasks may still be running"
            );
        }

        refresh_metrics(self.store.as_ref(), self.light.as_ref(), &self.metrics);
        self.store.close();
        self.light.close();
        tracing::info!("relay node stopped");
    }
}

fn refresh_metrics(store: &dyn WaitingStore, light: &dyn LightClient, metrics: &RelayMetrics) {
    match light.best_block() {
        Ok(tip) => metrics.tip_height.set(i64::from(tip.height)),
        Err(e) => tracing::debug!(error = %e, "metrics: no light client tip"),
    }
    match store.waiting_count() {
        Ok(count) => metrics
            .waiting_entries
            .set(i64::try_from(count).unwrap_or(i64::MAX)),
        Err(e) => tracing::debug!(error = %e, "metrics: cannot count waiting entries"),
    }
}
