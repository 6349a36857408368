//! Router assembly and server startup.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use {
    axum::{
        Router,
        extract::{State, WebSocketUpgrade},
        response::IntoResponse,
        routing::{get, post},
    },
    sqlx::{
        SqlitePool,
        sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    },
    tower_http::{
        cors::{Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::info,
};

use {
    atendo_chats::{ChatStore, SqliteChatStore},
    atendo_config::AtendoConfig,
    atendo_fanout::FanoutHub,
    atendo_identity::{ContactDirectory, PhoneLinker, SqliteContactDirectory},
    atendo_whatsapp::WhatsAppClient,
};

use crate::{routes, service::InboxService, ws};

// ── Shared app state ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<InboxService>,
}

// ── Router assembly ──────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/webhook/whatsapp", post(routes::webhook_handler))
        .route("/api/chats", get(routes::list_chats_handler))
        .route(
            "/api/chats/{id}/messages",
            get(routes::list_messages_handler),
        )
        .route("/api/chats/{id}/read", post(routes::mark_read_handler))
        .route("/api/messages", post(routes::send_message_handler))
        .route("/api/connection", get(routes::connection_handler))
        .route("/healthz", get(routes::health_handler))
        .route("/ws", get(ws_upgrade_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws::handle_connection(socket, state))
}

// ── Startup ──────────────────────────────────────────────────────────────────

/// Open (or create) the SQLite database and wire up the full service stack.
pub async fn build_service(config: &AtendoConfig) -> anyhow::Result<Arc<InboxService>> {
    let pool = open_pool(&config.database.path).await?;
    SqliteChatStore::init(&pool).await?;
    SqliteContactDirectory::init(&pool).await?;

    let directory: Arc<dyn ContactDirectory> =
        Arc::new(SqliteContactDirectory::new(pool.clone()));
    let linker = Arc::new(PhoneLinker::new(directory));
    let store: Arc<dyn ChatStore> = Arc::new(SqliteChatStore::with_linker(pool, linker));

    let hub = Arc::new(FanoutHub::new(config.fanout.buffer));
    let provider = WhatsAppClient::new(
        &config.provider.base_url,
        &config.provider.api_key,
        &config.provider.instance,
        Duration::from_secs(config.provider.timeout_secs),
    )?;

    Ok(Arc::new(InboxService::new(
        store,
        hub,
        provider,
        config.provider.check_connection,
    )))
}

/// Start the gateway and serve until shutdown.
pub async fn start_gateway(config: AtendoConfig) -> anyhow::Result<()> {
    let service = build_service(&config).await?;
    let app = build_app(AppState { service });

    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    info!(%addr, "atendo gateway listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn open_pool(path: &str) -> anyhow::Result<SqlitePool> {
    if path == ":memory:" {
        // Every pooled connection gets its own private in-memory database,
        // so the pool must stay at one connection.
        return Ok(SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?);
    }
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    Ok(SqlitePool::connect_with(options).await?)
}
