use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get},
};

/// Admin Router Module
///
/// Content management, nested under `/admin`. The access guard rejects non-admin
/// identities with 403 before any of these handlers run.
///
/// Mutations answer with the affected entity (or the removal summary) and a `Location`
/// header naming the hierarchy view to show next.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // --- Votings ---
        .route(
            "/votings",
            get(handlers::create_voting_form).post(handlers::create_voting),
        )
        // DELETE cascades through questions, answers and vote records.
        .route(
            "/votings/{voting_id}",
            get(handlers::edit_voting_form)
                .put(handlers::update_voting)
                .delete(handlers::delete_voting),
        )
        .route(
            "/votings/{voting_id}/questions/answers",
            get(handlers::admin_voting_page),
        )
        // --- Questions ---
        .route(
            "/votings/{voting_id}/questions",
            get(handlers::create_question_form).post(handlers::create_question),
        )
        .route(
            "/votings/{voting_id}/questions/{question_id}",
            get(handlers::edit_question_form).put(handlers::update_question),
        )
        .route("/questions/{question_id}", delete(handlers::delete_question))
        // --- Answers ---
        // GET shows the question with its answers and the form to add one.
        .route(
            "/votings/{voting_id}/questions/{question_id}/answers",
            get(handlers::question_page).post(handlers::create_answer),
        )
        .route(
            "/questions/{question_id}/answers/{answer_id}",
            get(handlers::edit_answer_form).put(handlers::update_answer),
        )
        .route("/answers/{answer_id}", delete(handlers::delete_answer))
}
