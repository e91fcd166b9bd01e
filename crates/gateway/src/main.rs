//! Recall API Gateway
//!
//! The single process binding everything together:
//! - HTTP surface for chat, sync, and embedding administration
//! - SSE streaming for chat answers
//! - WebSocket push channel fed by the progress bus
//! - Background ingestion and embedding tasks with graceful shutdown

mod handlers;
mod middleware;
mod response;

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use recall_common::{
    config::AppConfig,
    credentials::DbCredentialStore,
    db::{DbPool, Repository},
    embeddings::create_embedder,
    llm::{create_llm_client, LlmClient},
    metrics as app_metrics,
    progress::ProgressBus,
};
use recall_embedding_worker::{run_periodic, EmbeddingPipeline, PipelineConfig};
use recall_ingestion::{email::EmailConnector, ConnectorRegistry, SyncCoordinator};
use recall_retrieval::{
    context::{ContextFormatter, FormatterConfig},
    query::QueryProcessor,
    ranker::RankerConfig,
    RagPipeline, SearchService,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub repository: Repository,
    pub llm: Arc<dyn LlmClient>,
    pub rag: Arc<RagPipeline>,
    pub coordinator: Arc<SyncCoordinator>,
    pub pipeline: Arc<EmbeddingPipeline>,
    pub bus: ProgressBus,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;
    let config = Arc::new(config);

    // Initialize tracing
    init_tracing(&config);

    info!("Starting Recall gateway v{}", recall_common::VERSION);

    // Initialize metrics
    app_metrics::register_metrics();
    if config.observability.metrics_port != 0 {
        let metrics_addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        if let Err(e) = PrometheusBuilder::new()
            .with_http_listener(metrics_addr)
            .install()
        {
            warn!(error = %e, "Failed to start metrics exporter, continuing without it");
        }
    }

    // Initialize database connection; boot fails non-zero without it
    let db = DbPool::new(&config.database).await?;
    let repository = Repository::new(db);

    // Providers
    let embedder = create_embedder(&config.embedding)?;
    let llm = create_llm_client(&config.llm)?;
    info!(
        embedding_model = embedder.model_name(),
        dimensions = embedder.dimension(),
        chat_model = llm.model_name(),
        "Providers initialized"
    );

    // Long-lived services, constructed once and passed by reference
    let bus = ProgressBus::new();
    let shutdown = CancellationToken::new();
    let tracker = TaskTracker::new();

    let pipeline = Arc::new(EmbeddingPipeline::new(
        repository.clone(),
        embedder.clone(),
        bus.clone(),
        PipelineConfig {
            batch_size: config.embedding.batch_size,
            cost_per_million_tokens: config.embedding.cost_per_million_tokens,
            ..PipelineConfig::default()
        },
    ));

    let credentials = Arc::new(DbCredentialStore::new(repository.clone()));
    let mut connectors = ConnectorRegistry::new();
    connectors.register(Arc::new(EmailConnector::new(credentials, None)?));

    let coordinator = Arc::new(SyncCoordinator::new(
        repository.clone(),
        connectors,
        pipeline.clone(),
        bus.clone(),
        shutdown.clone(),
    ));

    let rag = Arc::new(RagPipeline::new(
        QueryProcessor::default(),
        SearchService::new(repository.clone(), embedder.clone()),
        RankerConfig {
            weights: config.ranker.clone(),
            decay_days: config.retrieval.recency_decay_days,
            diversity_threshold: config.retrieval.diversity_threshold,
            diversify: true,
        },
        ContextFormatter::new(FormatterConfig {
            max_context_tokens: config.retrieval.max_context_tokens,
        }),
        bus.clone(),
        config.retrieval.clone(),
    ));

    // Optional periodic embedding trigger
    if let Some(interval_secs) = config.embedding.cron_interval_secs {
        let pipeline = pipeline.clone();
        let cancel = shutdown.clone();
        tracker.spawn(async move {
            run_periodic(pipeline, interval_secs, cancel).await;
        });
    }

    // Create app state
    let state = AppState {
        config: config.clone(),
        repository,
        llm,
        rag,
        coordinator,
        pipeline,
        bus,
    };

    // Build the router
    let app = create_router(state, &config);

    // Start the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let shutdown_for_server = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown_for_server.cancel();
        })
        .await?;

    // Drain background tasks
    shutdown.cancel();
    tracker.close();
    let drain = tokio::time::timeout(
        Duration::from_secs(config.server.shutdown_timeout_secs),
        tracker.wait(),
    )
    .await;
    if drain.is_err() {
        warn!("Background tasks did not drain before the shutdown timeout");
    }

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    if config.observability.json_logging {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

/// Create the main application router
fn create_router(state: AppState, config: &AppConfig) -> Router {
    // CORS configuration from FRONTEND_URL / CORS_ORIGIN
    let origins = config.cors.allowed_origins();
    let cors = if origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(parsed))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let mut app = Router::new()
        // Health endpoints
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        // Chat endpoints
        .route("/chat/message", post(handlers::chat::message))
        .route("/chat/message/stream", post(handlers::chat::message_stream))
        .route("/chat/conversation", post(handlers::chat::create_conversation))
        .route("/chat/history/{conversation_id}", get(handlers::chat::history))
        // Sync endpoints
        .route("/sync/{source}", post(handlers::sync::start_sync))
        .route("/sync/status/{sync_id}", get(handlers::sync::sync_status))
        .route("/sync/history", get(handlers::sync::sync_history))
        // Embedding endpoints
        .route("/embedding/generate", post(handlers::embeddings::generate))
        .route("/embedding/status", get(handlers::embeddings::status))
        .route("/embedding/stats", get(handlers::embeddings::stats))
        .route("/embedding/reprocess", post(handlers::embeddings::reprocess))
        .route("/embedding/mark-pending", post(handlers::embeddings::mark_pending))
        .route("/embedding/diagnose", get(handlers::embeddings::diagnose))
        // Push channel
        .route("/ws", get(handlers::ws::upgrade));

    if config.rate_limit.enabled {
        let limiter = middleware::rate_limit::create_rate_limiter(
            config.rate_limit.requests_per_second,
            config.rate_limit.burst,
        );
        app = app.layer(axum::middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit::rate_limit_middleware,
        ));
    }

    app.layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
