//! SPV relay daemon: entry point for running a relay node.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;

use spvrelay_alliance::{AllianceClient, AllianceConfig, JsonRpcAllianceClient};
use spvrelay_crypto::open_keystore;
use spvrelay_node::{init_logging, LogFormat, RelayConfig, RelayMetrics, RelayNode};
use spvrelay_rpc::{RpcServer, RpcState};
use spvrelay_spv::{LightClient, SpvClient, SpvConfig};
use spvrelay_store_lmdb::LmdbWaitingStore;
use spvrelay_types::NetworkId;

#[derive(Parser, Debug)]
#[command(name = "spvrelay", about = "Start the SPV cross-chain relay")]
struct Cli {
    /// Log level: a name ("info", "debug,spvrelay_node=trace") or 0-5
    /// (0 trace ... 4 error).
    #[arg(long, default_value = "2", env = "SPVRELAY_LOG_LEVEL")]
    log_level: String,

    /// Log output: "human" or "json".
    #[arg(long, default_value = "human", env = "SPVRELAY_LOG_FORMAT")]
    log_format: String,

    /// UTXO network: "main", "test", "sim" or "regtest".
    #[arg(long, default_value = "test", env = "SPVRELAY_NETWORK")]
    network: String,

    /// Data directory for the header chain and waiting store.
    #[arg(long, default_value = "./spvrelay_data", env = "SPVRELAY_DATA_DIR")]
    data_dir: PathBuf,

    /// A peer trusted for header sync (host:port).
    #[arg(long, env = "SPVRELAY_TRUSTED_PEER")]
    trusted_peer: Option<String>,

    /// Alliance/relay TOML configuration file.
    #[arg(long, default_value = "./alliance.toml", env = "SPVRELAY_ALLIANCE_CONFIG")]
    alliance_config: PathBuf,

    /// Worker threads for the runtime (defaults to the CPU count).
    #[arg(long, env = "SPVRELAY_THREADS")]
    threads: Option<usize>,

    /// Serve the read-only HTTP API.
    #[arg(long, env = "SPVRELAY_REST")]
    rest: bool,

    /// Port of the read-only HTTP API.
    #[arg(long, default_value_t = 20380, env = "SPVRELAY_REST_PORT")]
    rest_port: u16,

    /// Run the observer, voter and signer against the alliance chain.
    #[arg(long, env = "SPVRELAY_VOTE")]
    vote: bool,

    /// Minutes between stall checks of the light client.
    #[arg(long, default_value_t = 30, env = "SPVRELAY_RESTART_INTERVAL")]
    restart_interval: u64,

    /// Resync or roll back the light client when its height stalls.
    #[arg(long, env = "SPVRELAY_RESTART")]
    restart: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let format: LogFormat = cli.log_format.parse()?;
    init_logging(format, &cli.log_level);

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(threads) = cli.threads.filter(|&n| n > 0) {
        builder.worker_threads(threads);
    }
    let runtime = builder.build().context("failed to build tokio runtime")?;

    let result = runtime.block_on(run(cli));
    if let Err(ref e) = result {
        tracing::error!(error = %format!("{e:#}"), "relay exited with error");
    }
    result
}

fn load_alliance_config(cli: &Cli) -> anyhow::Result<AllianceConfig> {
    if cli.alliance_config.exists() {
        let config = AllianceConfig::from_toml_file(&cli.alliance_config).with_context(|| {
            format!("failed to load {}", cli.alliance_config.display())
        })?;
        tracing::info!(path = %cli.alliance_config.display(), "loaded alliance config");
        Ok(config)
    } else if cli.vote {
        bail!(
            "vote mode needs an alliance config, {} does not exist",
            cli.alliance_config.display()
        )
    } else {
        Ok(AllianceConfig::default())
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let network: NetworkId = cli
        .network
        .parse()
        .unwrap_or_else(|never: Infallible| match never {});

    let mut config = RelayConfig::new(network, cli.data_dir.clone());
    config.trusted_peer = cli.trusted_peer.clone();
    config.vote = cli.vote;
    config.restart = cli.restart;
    config.restart_interval = Duration::from_secs(cli.restart_interval.saturating_mul(60));
    config.alliance = load_alliance_config(&cli)?;

    let data_dir = config.effective_data_dir();
    tracing::info!(
        network = %network,
        data_dir = %data_dir.display(),
        vote = config.vote,
        restart = config.restart,
        rest = cli.rest,
        "starting spv relay"
    );

    let waiting_dir = config.waiting_db_dir();
    let store = Arc::new(
        LmdbWaitingStore::open(&waiting_dir, config.alliance.max_reclaim_read_size)
            .with_context(|| format!("failed to open waiting store at {}", waiting_dir.display()))?,
    );

    let mut spv_config = SpvConfig::new(network, data_dir);
    spv_config.trusted_peer = config.trusted_peer.clone();
    let spv = Arc::new(SpvClient::open(&spv_config).context("failed to open light client")?);
    let light: Arc<dyn LightClient> = spv.clone();

    let alliance: Option<Arc<dyn AllianceClient>> = if config.vote {
        let settings = &config.alliance;
        let key = open_keystore(&settings.wallet_file, &settings.wallet_password)
            .with_context(|| format!("failed to open wallet {}", settings.wallet_file.display()))?;
        let client = JsonRpcAllianceClient::new(
            settings.alliance_rpc_url.clone(),
            key,
            Duration::from_secs(settings.rpc_timeout_secs),
        )
        .context("failed to build alliance client")?;
        tracing::info!(url = %settings.alliance_rpc_url, "alliance client ready");
        let client: Arc<dyn AllianceClient> = Arc::new(client);
        Some(client)
    } else {
        None
    };

    let metrics = Arc::new(RelayMetrics::new());
    let mut node = RelayNode::new(config, store.clone(), light.clone(), alliance, metrics.clone())
        .context("invalid relay configuration")?;
    let shutdown = node.shutdown_controller();

    if let Some(handle) = spv.start(shutdown.subscribe()) {
        node.track(handle);
    }
    if let Err(e) = node.start() {
        node.stop().await;
        return Err(e).context("failed to start relay node");
    }

    if cli.rest {
        let addr = SocketAddr::from(([0, 0, 0, 0], cli.rest_port));
        let server = RpcServer::new(
            addr,
            RpcState {
                store,
                light,
                metrics,
            },
        );
        match server.start(shutdown.subscribe()).await {
            Ok((_, handle)) => node.track(handle),
            Err(e) => {
                node.stop().await;
                return Err(e).context("failed to start read API");
            }
        }
    }

    shutdown.wait_for_signal().await;
    node.stop().await;
    Ok(())
}
