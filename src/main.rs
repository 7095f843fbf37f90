//! # Spreadwatch — Market Metrics & Live Tick Reconciliation
//!
//! ```text
//!  ┌─────────────┐  POST /api/view/seed     ┌──────────────────────────────┐
//!  │  Rows API   │ ◀──── GET ?page=N ────── │ AppState                     │
//!  └─────────────┘                           │ ├─ session (RwLock)          │
//!                                            │ │   ├─ reconciler + history  │
//!  ┌─────────────┐  POST /api/feed/*         │ │   ├─ subscriptions         │
//!  │  Feed       │ ────────────────────────▶ │ │   └─ error records         │
//!  │  adapter    │                           │ └─ broadcast_tx ───────────┐ │
//!  └─────────────┘                           └────────────────────────────┘ │
//!  ┌─────────────┐  ws://host/ws/monitor  ◀───────────────────────────────── ┘
//!  │  Dashboard  │  GET /api/view, /api/view/chain, /api/view/spreads
//!  └─────────────┘
//! ```
//!
//! Configuration: see [`spreadwatch::config`].

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use spreadwatch::{
    config::Config,
    routes::{
        feed::{handle_feed_status, handle_subscribe, handle_tick, handle_unsubscribe, health_check},
        monitor::ws_monitor,
        view::{get_chain, get_errors, get_history, get_spreads, get_view, reset_view, seed_view, select_group},
    },
    state::build_state,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Load .env ──────────────────────────────────────────────────────────
    dotenvy::dotenv().ok();

    // ── 2. Structured logging ─────────────────────────────────────────────────
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("spreadwatch=debug".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    info!(r#"

  ╔═══════════════════════════════════════════════════════╗
  ║        SPREADWATCH — Market Metrics Service           ║
  ║   Validate · Reconcile · History · Chain · Spreads    ║
  ╚═══════════════════════════════════════════════════════╝"#);

    // ── 3. Config + shared state ──────────────────────────────────────────────
    let config = Config::from_env()?;
    let addr = config.bind_addr;
    info!(
        history_capacity  = config.history_capacity,
        atm_threshold_pct = config.atm_threshold_pct,
        rows_url          = config.rows_url.as_deref().unwrap_or("-"),
        "⚙️  Configuration loaded"
    );
    let state = build_state(config);

    // ── 4. CORS ───────────────────────────────────────────────────────────────
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // ── 5. Router ─────────────────────────────────────────────────────────────
    let app = Router::new()
        // ── Live Feed ─────────────────────────────────────────────────────────
        .route("/api/feed/tick",             post(handle_tick))
        .route("/api/feed/subscribe",        post(handle_subscribe))
        .route("/api/feed/unsubscribe",      post(handle_unsubscribe))
        .route("/api/feed/status",           post(handle_feed_status))
        .route("/api/feed/health",           get(health_check))
        // ── View ──────────────────────────────────────────────────────────────
        .route("/api/view",                  get(get_view))
        .route("/api/view/chain",            get(get_chain))
        .route("/api/view/spreads",          get(get_spreads))
        .route("/api/view/history/:symbol",  get(get_history))
        .route("/api/view/errors",           get(get_errors))
        .route("/api/view/seed",             post(seed_view))
        .route("/api/view/group",            post(select_group))
        .route("/api/view/reset",            post(reset_view))
        // ── Monitor ───────────────────────────────────────────────────────────
        .route("/ws/monitor",                get(ws_monitor))
        // ── Middleware ────────────────────────────────────────────────────────
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state);

    // ── 6. Bind & Serve ───────────────────────────────────────────────────────
    info!(?addr, "🚀 Spreadwatch server starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
