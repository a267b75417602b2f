mod config;

use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use tandem_api::auth::{AppState, AppStateInner};
use tandem_api::messages;
use tandem_api::middleware::require_auth;
use tandem_gateway::connection;
use tandem_gateway::dispatcher::Dispatcher;
use tandem_gateway::fanout::{FanoutConfig, FanoutEngine};
use tandem_gateway::history::HistoryService;
use tandem_gateway::location::LocationBroadcaster;
use tandem_gateway::presence::{InMemoryPresence, PresenceRegistry};
use tandem_gateway::relay::Relay;
use tandem_lang::{HuggingFaceConfig, HuggingFaceProvider, LanguageService};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tandem=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = tandem_db::Database::open(&config.db_path)?;

    // Language services
    if config.hf_token.is_empty() {
        info!("TANDEM_HF_TOKEN not set, calling Hugging Face anonymously");
    }
    let provider = HuggingFaceProvider::new(HuggingFaceConfig {
        base_url: config.hf_base_url.clone(),
        token: config.hf_token.clone(),
        ..HuggingFaceConfig::default()
    })?;
    let language = Arc::new(LanguageService::new(Arc::new(provider), config.provider_timeout));

    // Shared state
    let dispatcher = Dispatcher::new();
    let presence: Arc<dyn PresenceRegistry> = Arc::new(InMemoryPresence::new());
    let fanout = Arc::new(FanoutEngine::new(
        language.clone(),
        Arc::new(db.clone()),
        Arc::new(db.clone()),
        presence.clone(),
        dispatcher.clone(),
        FanoutConfig {
            width: config.fanout_width,
            store_timeout: config.store_timeout,
        },
    ));
    let location = Arc::new(LocationBroadcaster::new(
        Arc::new(db.clone()),
        presence.clone(),
        dispatcher.clone(),
        config.store_timeout,
    ));
    let relay = Relay::new(dispatcher, presence, fanout, location);

    let app_state: AppState = Arc::new(AppStateInner {
        history: HistoryService::new(
            language,
            Arc::new(db.clone()),
            Arc::new(db.clone()),
            config.fanout_width,
            config.store_timeout,
        ),
        members: Arc::new(db),
        jwt_secret: config.jwt_secret.clone(),
        store_timeout: config.store_timeout,
    });

    // Routes
    let protected_routes = Router::new()
        .route("/channels/{channel_id}/messages", get(messages::get_messages))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_auth))
        .with_state(app_state);

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(relay);

    let app = Router::new()
        .route("/health", get(messages::health))
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    info!("Tandem relay listening on {}", config.addr);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn ws_upgrade(State(relay): State<Relay>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_connection(socket, relay))
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
