use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Public Router Module
///
/// The only routes reachable without a session.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness check for load balancers.
        .route("/health", get(|| async { "ok" }))
        // GET /authentication  -> login view
        // POST /authentication -> verify credentials, mint session, set cookie
        .route(
            "/authentication",
            get(handlers::login_page).post(handlers::login),
        )
}
