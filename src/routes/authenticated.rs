use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Authenticated Router Module
///
/// Routes open to any identity holding a live session. Handlers receive the resolved
/// `Identity` from the access guard.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /
        // Index of all votings; admins also see the management controls.
        .route("/", get(handlers::index))
        // GET /me
        .route("/me", get(handlers::get_me))
        // GET|POST /logout
        // Destroys the session and clears the cookie.
        .route("/logout", get(handlers::logout).post(handlers::logout))
        // GET  -> the voting with its questions and answers
        // POST -> submit a ballot (question id -> answer id), recorded atomically
        .route(
            "/votings/{voting_id}/questions/answers",
            get(handlers::voting_page).post(handlers::submit_ballot),
        )
}
