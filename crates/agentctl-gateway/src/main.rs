use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;

mod app;
mod http;
mod ws;

use agentctl_broadcast::BroadcastFabric;
use agentctl_context::ContextManager;
use agentctl_core::config::Config;
use agentctl_fsm::{Executor, Inbound};
use agentctl_store::Store;

/// How many inbound control events the Gateway will buffer before a
/// `/message` or `/control/*` request starts blocking its caller.
const INBOUND_CHANNEL_CAPACITY: usize = 64;

#[derive(Parser, Debug)]
#[command(name = "agentctl-gateway")]
struct Cli {
    /// Explicit config file path. Falls back to `~/.agentctl/agentctl.toml`.
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agentctl_gateway=info,tower_http=debug".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("config load failed ({}), using defaults", e);
        Config::default()
    });

    let store = Store::open(&config.store_path()).await?;
    let broadcast = BroadcastFabric::new();
    let context_manager = ContextManager::new(config.context_size);
    let dispatcher = Arc::new(agentctl_tools::build_default_dispatcher(
        store.clone(),
        broadcast.clone(),
    ));
    let http_client = reqwest::Client::new();
    let model = agentctl_fsm::model::ModelClient::new(
        http_client,
        config.model_endpoint.clone(),
        config.model_name.clone(),
    );

    let mode_json = store
        .get_state(
            agentctl_core::types::STATE_KEY_MODE.to_string(),
            serde_json::to_value(agentctl_core::types::Mode::Conversational)?,
        )
        .await?;
    let mode: agentctl_core::types::Mode =
        serde_json::from_value(mode_json).unwrap_or(agentctl_core::types::Mode::Conversational);
    let delay = agentctl_core::types::Delay::from_json(
        &store
            .get_state(
                agentctl_core::types::STATE_KEY_DELAY.to_string(),
                agentctl_core::types::Delay::Seconds(5).to_json(),
            )
            .await?,
    )
    .unwrap_or(agentctl_core::types::Delay::Seconds(5));

    let system_prompt = agentctl_fsm::prompt::load_system_prompt(&config)?;
    let autonomous_prompt = agentctl_fsm::prompt::load_autonomous_prompt(&config)?;

    let executor = Executor::new(
        store.clone(),
        broadcast.clone(),
        context_manager,
        dispatcher,
        model,
        PathBuf::from(config.workspace_path.clone()),
        config.search_api_key.clone(),
    );

    let (inbound_tx, inbound_rx) = mpsc::channel::<Inbound>(INBOUND_CHANNEL_CAPACITY);

    // Replay the persisted mode/delay before the coordinator starts taking
    // new input, so a restart resumes where the operator left it.
    let bootstrap_tx = inbound_tx.clone();
    tokio::spawn(async move {
        let _ = bootstrap_tx.send(Inbound::ModeChanged(mode)).await;
        let _ = bootstrap_tx.send(Inbound::DelayChanged(delay)).await;
    });

    tokio::spawn(async move {
        executor.run(system_prompt, autonomous_prompt, inbound_rx).await;
    });

    let state = Arc::new(app::AppState {
        store,
        broadcast,
        inbound: inbound_tx,
    });
    let router = app::build_router(state);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.listen_port).parse()?;
    info!("agentctl gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
