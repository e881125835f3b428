use axum::{
    Router,
    extract::{FromRef, OriginalUri, Request, State},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Domain services.
pub mod auth;
pub mod ballot;
pub mod content;
pub mod session;

// Persistence, configuration and shared types.
pub mod config;
pub mod error;
pub mod memory;
pub mod models;
pub mod repository;

// HTTP surface.
pub mod handlers;
pub mod routes;
pub mod view;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::AppError;
pub use memory::MemoryRepository;
pub use repository::{PostgresRepository, RepositoryState};
pub use session::{InMemorySessionStore, SessionState};
pub use view::{JsonRenderer, RendererState};

/// ApiDoc
///
/// OpenAPI description of every route, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::login_page, handlers::login, handlers::logout, handlers::index,
        handlers::get_me, handlers::voting_page, handlers::submit_ballot,
        handlers::create_voting_form, handlers::create_voting, handlers::edit_voting_form,
        handlers::update_voting, handlers::delete_voting, handlers::admin_voting_page,
        handlers::create_question_form, handlers::create_question, handlers::edit_question_form,
        handlers::update_question, handlers::question_page, handlers::delete_question,
        handlers::create_answer, handlers::edit_answer_form, handlers::update_answer,
        handlers::delete_answer
    ),
    components(
        schemas(
            models::Role, models::Identity, models::Session, models::Voting, models::Question,
            models::Answer, models::VoteRecord, models::LoginRequest, models::LoginResponse,
            models::VotingFields, models::NameRequest, models::BallotRequest,
            models::BallotReceipt, models::VotingIndex, models::VotingDetail,
            models::QuestionDetail, models::CascadeSummary, models::DeletedQuestion,
            models::DeletedAnswer,
        )
    ),
    tags(
        (name = "voting-portal", description = "Voting portal API")
    )
)]
struct ApiDoc;

/// AppState
///
/// Everything a request may need, shared by all requests. Cloning is cheap: every service
/// sits behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Persistence of identities, credentials, the content hierarchy and vote records.
    pub repo: RepositoryState,
    /// Live sessions, keyed by opaque token.
    pub sessions: SessionState,
    /// Turns a named view plus payload into a response.
    pub renderer: RendererState,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for SessionState {
    fn from_ref(app_state: &AppState) -> SessionState {
        app_state.sessions.clone()
    }
}

impl FromRef<AppState> for RendererState {
    fn from_ref(app_state: &AppState) -> RendererState {
        app_state.renderer.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// access_guard
///
/// Runs in front of every non-public route. Resolves the session token (cookie, then
/// bearer header) to an identity, applies the admin-prefix rule and stores the identity in
/// the request extensions, where the `Identity` extractor picks it up.
///
/// The path is taken from `OriginalUri` so that routes nested under `/admin` are judged by
/// their full path.
async fn access_guard(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let path = request
        .extensions()
        .get::<OriginalUri>()
        .map(|uri| uri.path().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let token = auth::extract_token(request.headers(), &state.config.session_cookie);
    let identity = auth::authorize(
        state.sessions.as_ref(),
        state.repo.as_ref(),
        token.as_deref(),
        &path,
    )
    .await?;

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

/// request_deadline
///
/// Bounds every request by `config.request_timeout`. A request that runs out of time is
/// dropped mid-flight, which also drops (and so rolls back) any open unit of work.
async fn request_deadline(
    State(config): State<AppConfig>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let path = request.uri().path().to_string();
    tokio::time::timeout(config.request_timeout, next.run(request))
        .await
        .map_err(|_| {
            tracing::warn!(path, timeout = ?config.request_timeout, "request deadline exceeded");
            AppError::Timeout
        })
}

/// create_router
///
/// Assembles public and guarded routes, the deadline, and the observability layers.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    // Everything except the login flow and the health check passes the access guard.
    let protected = authenticated::authenticated_routes()
        .nest("/admin", admin::admin_routes())
        .route_layer(middleware::from_fn_with_state(state.clone(), access_guard));

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(protected)
        .layer(middleware::from_fn_with_state(state.clone(), request_deadline))
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for one request, tagged with its `x-request-id` so every log line of the request
/// can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, routing::get};
    use std::{sync::Arc, time::Duration};
    use tower::ServiceExt;

    fn state(request_timeout: Duration) -> AppState {
        AppState {
            repo: Arc::new(MemoryRepository::new()),
            sessions: Arc::new(InMemorySessionStore::default()),
            renderer: Arc::new(JsonRenderer),
            config: AppConfig {
                request_timeout,
                ..AppConfig::default()
            },
        }
    }

    #[tokio::test]
    async fn slow_request_hits_deadline() {
        let state = state(Duration::from_millis(50));
        let app = Router::new()
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "late"
                }),
            )
            .layer(middleware::from_fn_with_state(state.clone(), request_deadline))
            .with_state(state);

        let response = app
            .oneshot(axum::http::Request::builder().uri("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn guarded_routes_reject_anonymous_requests() {
        let app = create_router(state(Duration::from_secs(10)));

        for uri in ["/", "/admin/votings", "/votings/1/questions/answers"] {
            let response = app
                .clone()
                .oneshot(axum::http::Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "uri {uri}");
        }

        let response = app
            .oneshot(axum::http::Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
