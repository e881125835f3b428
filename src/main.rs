use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voting_portal::{
    AppState,
    config::{AppConfig, Env},
    create_router,
    memory::MemoryRepository,
    models::Role,
    repository::{PostgresRepository, RepositoryState},
    session::{self, InMemorySessionStore, SessionState},
    view::{JsonRenderer, RendererState},
};

/// main
///
/// Loads configuration, initializes logging, connects persistence and serves HTTP.
#[tokio::main]
async fn main() {
    // 1. Configuration (fail-fast)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging: RUST_LOG wins, otherwise crate-level debug
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "voting_portal=debug,tower_http=info".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 3. Persistence: Postgres when configured, the in-memory store otherwise (local only)
    let repo: RepositoryState = match &config.db_url {
        Some(db_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(db_url)
                .await
                .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .expect("FATAL: Database migrations failed.");

            Arc::new(PostgresRepository::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using the in-memory store, data is lost on exit");
            let memory = MemoryRepository::new();

            if let Some((login, password)) = &config.local_admin {
                match memory
                    .provision_identity("Administrator", Role::Admin, login, password)
                    .await
                {
                    Ok(identity) => {
                        tracing::info!(identity_id = identity.id, login, "local admin provisioned")
                    }
                    Err(e) => tracing::error!(error = %e, "local admin provisioning failed"),
                }
            }

            Arc::new(memory)
        }
    };

    // 4. Sessions and presentation
    let ttl = config
        .session_ttl
        .and_then(|ttl| chrono::Duration::from_std(ttl).ok());
    let store = Arc::new(InMemorySessionStore::new(ttl));
    if let Some(every) = config.session_ttl {
        let every = every.max(std::time::Duration::from_secs(1));
        session::spawn_purge_task(store.clone(), every);
        tracing::info!(every = ?every, "session purge task started");
    }
    let sessions = store as SessionState;
    let renderer = Arc::new(JsonRenderer) as RendererState;

    let bind_addr = config.bind_addr.clone();
    let app_state = AppState {
        repo,
        sessions,
        renderer,
        config,
    };

    // 5. Router and server
    let app = create_router(app_state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("FATAL: cannot bind {bind_addr}: {e}"));

    tracing::info!("Listening on {bind_addr}");
    tracing::info!("API Documentation (Swagger UI) available at: http://{bind_addr}/swagger-ui");

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "server terminated");
    }
}
