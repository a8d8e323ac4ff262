//! Serve command implementation

use crate::api::{create_router, AppState};
use crate::cache::{spawn_sweeper, GenerationCache, Sweepable};
use crate::cli::ServeArgs;
use crate::config::FlowsmithConfig;
use crate::logging::init_tracing;
use crate::orchestrator::{
    CliProbe, CliRenderer, GenerationOrchestrator, OpenAiDiagramModel, OrchestratorSettings,
    SharedGenerationCache,
};
use crate::probe::CapabilityProbeCache;
use crate::storage::ArtifactStore;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Load configuration with CLI overrides
pub fn load_config_with_overrides(
    args: &ServeArgs,
) -> Result<FlowsmithConfig, Box<dyn std::error::Error>> {
    let mut config = if args.config.exists() {
        FlowsmithConfig::load(Some(&args.config))?
    } else {
        tracing::debug!("Config file not found, using defaults");
        FlowsmithConfig::default()
    };

    config = config.with_env_overrides();

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(ref host) = args.host {
        config.server.host = host.clone();
    }
    if let Some(ref log_level) = args.log_level {
        config.logging.level = log_level.clone();
    }

    Ok(config)
}

/// Everything `serve` starts, wired from config.
pub struct Service {
    pub state: Arc<AppState>,
    pub sweeper: Option<JoinHandle<()>>,
}

/// Build the orchestrator and its collaborators, and start the sweeper.
pub fn build_service(
    config: FlowsmithConfig,
    cancel_token: CancellationToken,
) -> Result<Service, Box<dyn std::error::Error>> {
    let http_client = reqwest::Client::builder()
        .pool_max_idle_per_host(10)
        .build()?;

    let api_key = config.model.api_key();
    if api_key.is_none() {
        tracing::warn!(
            variable = %config.model.api_key_env,
            "Model API key not set; generation requests will fail with 401"
        );
    }
    let model = Arc::new(OpenAiDiagramModel::new(
        http_client,
        config.model.endpoint.clone(),
        config.model.model.clone(),
        api_key,
    ));
    let renderer = Arc::new(CliRenderer::new(
        config.converter.command.clone(),
        config.converter.args.clone(),
    ));
    let probe_cache = Arc::new(CapabilityProbeCache::new(
        Arc::new(CliProbe::new(config.converter.command.clone())),
        config.converter.probe_freshness(),
        config.converter.probe_timeout(),
    ));
    let cache: SharedGenerationCache = Arc::new(Mutex::new(GenerationCache::new(
        config.cache.max_entries,
        config.cache.ttl(),
    )));
    let store = Arc::new(ArtifactStore::open(
        config.storage.dir.clone(),
        config.storage.file_ttl(),
    )?);

    let sweeper = config.cache.sweep_interval().map(|interval| {
        tracing::info!(interval_secs = interval.as_secs(), "Starting expiry sweeper");
        let targets: Vec<Arc<dyn Sweepable>> = vec![cache.clone(), store.clone()];
        spawn_sweeper(targets, interval, cancel_token.clone())
    });

    let settings = OrchestratorSettings {
        model_deadline: config.model.timeout(),
        render_deadline: config.converter.timeout(),
        max_prompt_chars: config.model.max_prompt_chars,
    };
    let orchestrator = Arc::new(GenerationOrchestrator::new(
        model,
        renderer,
        probe_cache,
        cache,
        store,
        settings,
    ));

    let state = Arc::new(AppState::new(orchestrator, Arc::new(config)));
    Ok(Service { state, sweeper })
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal(cancel_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for CTRL+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, shutting down...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down...");
        }
        _ = cancel_token.cancelled() => {}
    }

    cancel_token.cancel();
}

/// Main serve command handler
pub async fn run_serve(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config_with_overrides(&args)?;
    config.validate()?;

    init_tracing(&config.logging)?;

    tracing::info!("Starting Flowsmith server");
    tracing::debug!(?config, "Loaded configuration");

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let cancel_token = CancellationToken::new();
    let service = build_service(config, cancel_token.clone())?;
    let app = create_router(Arc::clone(&service.state));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Flowsmith API server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(cancel_token.clone()))
    .await?;

    cancel_token.cancel();
    if let Some(handle) = service.sweeper {
        tracing::info!("Waiting for expiry sweeper to stop");
        handle.await?;
    }

    tracing::info!("Flowsmith server stopped");
    Ok(())
}
