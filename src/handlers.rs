use crate::{
    AppState, auth,
    ballot::{self, BallotPolicy},
    content,
    error::AppError,
    models::{
        Answer, BallotReceipt, BallotRequest, CascadeSummary, DeletedAnswer, DeletedQuestion,
        Identity, LoginRequest, LoginResponse, NameRequest, Question, QuestionDetail, Voting,
        VotingDetail, VotingFields, VotingIndex,
    },
    view::render,
};
use axum::{
    Json,
    extract::{FromRequest, Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;

// --- Request Extractors ---

/// JSON request body whose rejections (bad syntax, wrong content type, missing fields)
/// surface as a 400 with the usual `{"error": ...}` body.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(AppError))]
pub struct JsonBody<T>(pub T);

// --- Response Helpers ---

/// A JSON body plus the `Location` of the hierarchy view the client should show next.
fn located<T: Serialize>(status: StatusCode, location: String, body: T) -> Response {
    (status, [(header::LOCATION, location)], Json(body)).into_response()
}

fn voting_admin_path(voting_id: i64) -> String {
    format!("/admin/votings/{voting_id}/questions/answers")
}

fn question_admin_path(voting_id: i64, question_id: i64) -> String {
    format!("/admin/votings/{voting_id}/questions/{question_id}/answers")
}

// --- Public Handlers ---

/// login_page
///
/// [Public Route] The login view.
#[utoipa::path(
    get,
    path = "/authentication",
    responses((status = 200, description = "Login view"))
)]
pub async fn login_page(State(state): State<AppState>) -> Result<Response, AppError> {
    render(
        state.renderer.as_ref(),
        "authentication",
        &json!({ "cookie": state.config.session_cookie }),
    )
}

/// login
///
/// [Public Route] Verifies the credentials, mints a session and issues the session cookie.
///
/// *Security*: an unknown login and a wrong password produce the same 401 response.
#[utoipa::path(
    post,
    path = "/authentication",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = LoginResponse),
        (status = 401, description = "Invalid login or password")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> Result<Response, AppError> {
    let session = auth::authenticate(
        state.repo.as_ref(),
        state.sessions.as_ref(),
        &payload.login,
        &payload.password,
    )
    .await
    .map_err(|e| match e {
        AppError::NotFound(_) => {
            tracing::info!(login = %payload.login, "unknown login");
            AppError::InvalidCredentials
        }
        other => other,
    })?;

    let identity = match state.repo.get_identity(session.identity_id).await? {
        Some(identity) => identity,
        None => {
            tracing::warn!(identity_id = session.identity_id, "credential without identity");
            state.sessions.destroy(&session.token).await;
            return Err(AppError::InvalidCredentials);
        }
    };

    let mut response = Json(LoginResponse {
        token: session.token.clone(),
        identity,
    })
    .into_response();

    match auth::session_cookie(&state.config, &session.token) {
        Some(cookie) => {
            response.headers_mut().insert(header::SET_COOKIE, cookie);
        }
        None => tracing::warn!(
            cookie = %state.config.session_cookie,
            "session cookie name is not a valid header value; token returned in body only"
        ),
    }
    Ok(response)
}

// --- Authenticated Handlers ---

/// logout
///
/// [Authenticated Route] Destroys the session and clears the cookie.
#[utoipa::path(
    get,
    path = "/logout",
    responses((status = 204, description = "Logged out"))
)]
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = auth::extract_token(&headers, &state.config.session_cookie) {
        state.sessions.destroy(&token).await;
    }

    let mut response = (
        StatusCode::NO_CONTENT,
        [(header::LOCATION, "/authentication")],
    )
        .into_response();
    if let Some(cookie) = auth::cleared_session_cookie(&state.config) {
        response.headers_mut().insert(header::SET_COOKIE, cookie);
    }
    response
}

/// index
///
/// [Authenticated Route] Lists every voting. Admins get `can_manage = true`.
#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "Voting index", body = VotingIndex))
)]
pub async fn index(
    identity: Identity,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    let index = content::voting_index(state.repo.as_ref(), &identity).await?;
    render(state.renderer.as_ref(), "index", &index)
}

/// get_me
///
/// [Authenticated Route] The identity behind the current session.
#[utoipa::path(
    get,
    path = "/me",
    responses((status = 200, description = "Current identity", body = Identity))
)]
pub async fn get_me(identity: Identity) -> Json<Identity> {
    Json(identity)
}

/// voting_page
///
/// [Authenticated Route] One voting with its questions and answers, ready for a ballot.
#[utoipa::path(
    get,
    path = "/votings/{voting_id}/questions/answers",
    params(("voting_id" = i64, Path, description = "Voting ID")),
    responses(
        (status = 200, description = "Voting hierarchy", body = VotingDetail),
        (status = 404, description = "Not Found")
    )
)]
pub async fn voting_page(
    identity: Identity,
    State(state): State<AppState>,
    Path(voting_id): Path<i64>,
) -> Result<Response, AppError> {
    let detail = content::voting_tree(state.repo.as_ref(), voting_id, &identity).await?;
    render(state.renderer.as_ref(), "voting_qa", &detail)
}

/// submit_ballot
///
/// [Authenticated Route] Records the caller's selections for a voting, atomically.
#[utoipa::path(
    post,
    path = "/votings/{voting_id}/questions/answers",
    params(("voting_id" = i64, Path, description = "Voting ID")),
    request_body = BallotRequest,
    responses(
        (status = 201, description = "Ballot recorded", body = BallotReceipt),
        (status = 400, description = "Empty ballot or mismatched question/answer"),
        (status = 404, description = "Voting Not Found"),
        (status = 409, description = "Already voted, or voting closed")
    )
)]
pub async fn submit_ballot(
    identity: Identity,
    State(state): State<AppState>,
    Path(voting_id): Path<i64>,
    JsonBody(payload): JsonBody<BallotRequest>,
) -> Result<Response, AppError> {
    let policy = BallotPolicy::new(state.config.enforce_voting_window);
    let records = ballot::submit_ballot(
        state.repo.as_ref(),
        &identity,
        voting_id,
        &payload.selections,
        policy,
    )
    .await?;

    Ok(located(
        StatusCode::CREATED,
        "/".to_string(),
        BallotReceipt { voting_id, records },
    ))
}

// --- Admin Handlers: Votings ---

/// create_voting_form
///
/// [Admin Route] The empty voting form.
#[utoipa::path(
    get,
    path = "/admin/votings",
    responses(
        (status = 200, description = "Create voting view"),
        (status = 403, description = "Not Admin")
    )
)]
pub async fn create_voting_form(State(state): State<AppState>) -> Result<Response, AppError> {
    render(state.renderer.as_ref(), "admin_create_voting", &json!({}))
}

/// create_voting
///
/// [Admin Route] Creates a voting and points the client at its (empty) hierarchy.
#[utoipa::path(
    post,
    path = "/admin/votings",
    request_body = VotingFields,
    responses(
        (status = 201, description = "Created", body = Voting),
        (status = 400, description = "Invalid fields"),
        (status = 403, description = "Not Admin")
    )
)]
pub async fn create_voting(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<VotingFields>,
) -> Result<Response, AppError> {
    let voting = content::create_voting(state.repo.as_ref(), &payload).await?;
    Ok(located(StatusCode::CREATED, voting_admin_path(voting.id), voting))
}

/// edit_voting_form
///
/// [Admin Route] The voting form, pre-filled.
#[utoipa::path(
    get,
    path = "/admin/votings/{voting_id}",
    params(("voting_id" = i64, Path, description = "Voting ID")),
    responses(
        (status = 200, description = "Edit voting view", body = Voting),
        (status = 404, description = "Not Found")
    )
)]
pub async fn edit_voting_form(
    State(state): State<AppState>,
    Path(voting_id): Path<i64>,
) -> Result<Response, AppError> {
    let voting = content::find_voting(state.repo.as_ref(), voting_id).await?;
    render(state.renderer.as_ref(), "admin_edit_voting", &voting)
}

/// update_voting
///
/// [Admin Route] Replaces every field of a voting.
#[utoipa::path(
    put,
    path = "/admin/votings/{voting_id}",
    params(("voting_id" = i64, Path, description = "Voting ID")),
    request_body = VotingFields,
    responses(
        (status = 200, description = "Updated", body = Voting),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_voting(
    State(state): State<AppState>,
    Path(voting_id): Path<i64>,
    JsonBody(payload): JsonBody<VotingFields>,
) -> Result<Response, AppError> {
    let voting = content::update_voting(state.repo.as_ref(), voting_id, &payload).await?;
    Ok(located(StatusCode::OK, voting_admin_path(voting.id), voting))
}

/// delete_voting
///
/// [Admin Route] Deletes a voting with all questions, answers and vote records below it.
/// Deleting an unknown id succeeds with zero rows removed.
#[utoipa::path(
    delete,
    path = "/admin/votings/{voting_id}",
    params(("voting_id" = i64, Path, description = "Voting ID")),
    responses((status = 200, description = "Deleted", body = CascadeSummary))
)]
pub async fn delete_voting(
    State(state): State<AppState>,
    Path(voting_id): Path<i64>,
) -> Result<Response, AppError> {
    let removed = content::delete_voting(state.repo.as_ref(), voting_id).await?;
    Ok(located(StatusCode::OK, "/".to_string(), removed))
}

/// admin_voting_page
///
/// [Admin Route] The management view of one voting's hierarchy.
#[utoipa::path(
    get,
    path = "/admin/votings/{voting_id}/questions/answers",
    params(("voting_id" = i64, Path, description = "Voting ID")),
    responses(
        (status = 200, description = "Voting hierarchy", body = VotingDetail),
        (status = 404, description = "Not Found")
    )
)]
pub async fn admin_voting_page(
    identity: Identity,
    State(state): State<AppState>,
    Path(voting_id): Path<i64>,
) -> Result<Response, AppError> {
    let detail = content::voting_tree(state.repo.as_ref(), voting_id, &identity).await?;
    render(state.renderer.as_ref(), "admin_voting_qa", &detail)
}

// --- Admin Handlers: Questions ---

/// create_question_form
///
/// [Admin Route] The empty question form for a voting.
#[utoipa::path(
    get,
    path = "/admin/votings/{voting_id}/questions",
    params(("voting_id" = i64, Path, description = "Voting ID")),
    responses(
        (status = 200, description = "Create question view"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn create_question_form(
    State(state): State<AppState>,
    Path(voting_id): Path<i64>,
) -> Result<Response, AppError> {
    let voting = content::find_voting(state.repo.as_ref(), voting_id).await?;
    render(
        state.renderer.as_ref(),
        "admin_create_question",
        &json!({ "voting": voting }),
    )
}

/// create_question
///
/// [Admin Route] Adds a question to a voting.
#[utoipa::path(
    post,
    path = "/admin/votings/{voting_id}/questions",
    params(("voting_id" = i64, Path, description = "Voting ID")),
    request_body = NameRequest,
    responses(
        (status = 201, description = "Created", body = Question),
        (status = 404, description = "Voting Not Found")
    )
)]
pub async fn create_question(
    State(state): State<AppState>,
    Path(voting_id): Path<i64>,
    JsonBody(payload): JsonBody<NameRequest>,
) -> Result<Response, AppError> {
    let question = content::create_question(state.repo.as_ref(), voting_id, &payload.name).await?;
    Ok(located(StatusCode::CREATED, voting_admin_path(voting_id), question))
}

/// edit_question_form
///
/// [Admin Route] The question form, pre-filled.
#[utoipa::path(
    get,
    path = "/admin/votings/{voting_id}/questions/{question_id}",
    params(
        ("voting_id" = i64, Path, description = "Voting ID"),
        ("question_id" = i64, Path, description = "Question ID")
    ),
    responses(
        (status = 200, description = "Edit question view", body = Question),
        (status = 404, description = "Not Found")
    )
)]
pub async fn edit_question_form(
    State(state): State<AppState>,
    Path((voting_id, question_id)): Path<(i64, i64)>,
) -> Result<Response, AppError> {
    let question = content::find_question_in(state.repo.as_ref(), voting_id, question_id).await?;
    render(state.renderer.as_ref(), "admin_edit_question", &question)
}

/// update_question
///
/// [Admin Route] Renames a question. The question must belong to the voting in the path.
#[utoipa::path(
    put,
    path = "/admin/votings/{voting_id}/questions/{question_id}",
    params(
        ("voting_id" = i64, Path, description = "Voting ID"),
        ("question_id" = i64, Path, description = "Question ID")
    ),
    request_body = NameRequest,
    responses(
        (status = 200, description = "Updated", body = Question),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_question(
    State(state): State<AppState>,
    Path((voting_id, question_id)): Path<(i64, i64)>,
    JsonBody(payload): JsonBody<NameRequest>,
) -> Result<Response, AppError> {
    content::find_question_in(state.repo.as_ref(), voting_id, question_id).await?;
    let question = content::update_question(state.repo.as_ref(), question_id, &payload.name).await?;
    Ok(located(
        StatusCode::OK,
        question_admin_path(voting_id, question_id),
        question,
    ))
}

/// question_page
///
/// [Admin Route] A question with its answers; also the place answers are added from.
#[utoipa::path(
    get,
    path = "/admin/votings/{voting_id}/questions/{question_id}/answers",
    params(
        ("voting_id" = i64, Path, description = "Voting ID"),
        ("question_id" = i64, Path, description = "Question ID")
    ),
    responses(
        (status = 200, description = "Question view", body = QuestionDetail),
        (status = 404, description = "Not Found")
    )
)]
pub async fn question_page(
    State(state): State<AppState>,
    Path((voting_id, question_id)): Path<(i64, i64)>,
) -> Result<Response, AppError> {
    content::find_question_in(state.repo.as_ref(), voting_id, question_id).await?;
    let detail = content::question_detail(state.repo.as_ref(), question_id).await?;
    render(state.renderer.as_ref(), "admin_open_qa", &detail)
}

/// delete_question
///
/// [Admin Route] Deletes a question and its answers; points back at the parent voting.
#[utoipa::path(
    delete,
    path = "/admin/questions/{question_id}",
    params(("question_id" = i64, Path, description = "Question ID")),
    responses(
        (status = 200, description = "Deleted", body = DeletedQuestion),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_question(
    State(state): State<AppState>,
    Path(question_id): Path<i64>,
) -> Result<Response, AppError> {
    let deleted = content::delete_question(state.repo.as_ref(), question_id).await?;
    Ok(located(
        StatusCode::OK,
        voting_admin_path(deleted.voting_id),
        deleted,
    ))
}

// --- Admin Handlers: Answers ---

/// create_answer
///
/// [Admin Route] Adds an answer to a question of the voting in the path.
#[utoipa::path(
    post,
    path = "/admin/votings/{voting_id}/questions/{question_id}/answers",
    params(
        ("voting_id" = i64, Path, description = "Voting ID"),
        ("question_id" = i64, Path, description = "Question ID")
    ),
    request_body = NameRequest,
    responses(
        (status = 201, description = "Created", body = Answer),
        (status = 404, description = "Question Not Found")
    )
)]
pub async fn create_answer(
    State(state): State<AppState>,
    Path((voting_id, question_id)): Path<(i64, i64)>,
    JsonBody(payload): JsonBody<NameRequest>,
) -> Result<Response, AppError> {
    content::find_question_in(state.repo.as_ref(), voting_id, question_id).await?;
    let answer = content::create_answer(state.repo.as_ref(), question_id, &payload.name).await?;
    Ok(located(
        StatusCode::CREATED,
        question_admin_path(voting_id, question_id),
        answer,
    ))
}

/// edit_answer_form
///
/// [Admin Route] The answer form, pre-filled.
#[utoipa::path(
    get,
    path = "/admin/questions/{question_id}/answers/{answer_id}",
    params(
        ("question_id" = i64, Path, description = "Question ID"),
        ("answer_id" = i64, Path, description = "Answer ID")
    ),
    responses(
        (status = 200, description = "Edit answer view", body = Answer),
        (status = 404, description = "Not Found")
    )
)]
pub async fn edit_answer_form(
    State(state): State<AppState>,
    Path((question_id, answer_id)): Path<(i64, i64)>,
) -> Result<Response, AppError> {
    let answer = content::find_answer_in(state.repo.as_ref(), question_id, answer_id).await?;
    render(state.renderer.as_ref(), "admin_edit_answer", &answer)
}

/// update_answer
///
/// [Admin Route] Renames an answer. The answer must belong to the question in the path.
#[utoipa::path(
    put,
    path = "/admin/questions/{question_id}/answers/{answer_id}",
    params(
        ("question_id" = i64, Path, description = "Question ID"),
        ("answer_id" = i64, Path, description = "Answer ID")
    ),
    request_body = NameRequest,
    responses(
        (status = 200, description = "Updated", body = Answer),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_answer(
    State(state): State<AppState>,
    Path((question_id, answer_id)): Path<(i64, i64)>,
    JsonBody(payload): JsonBody<NameRequest>,
) -> Result<Response, AppError> {
    content::find_answer_in(state.repo.as_ref(), question_id, answer_id).await?;
    let question = state
        .repo
        .get_question(question_id)
        .await?
        .ok_or(AppError::NotFound("question"))?;
    let answer = content::update_answer(state.repo.as_ref(), answer_id, &payload.name).await?;
    Ok(located(
        StatusCode::OK,
        question_admin_path(question.voting_id, question_id),
        answer,
    ))
}

/// delete_answer
///
/// [Admin Route] Deletes one answer; points back at its question.
#[utoipa::path(
    delete,
    path = "/admin/answers/{answer_id}",
    params(("answer_id" = i64, Path, description = "Answer ID")),
    responses(
        (status = 200, description = "Deleted", body = DeletedAnswer),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_answer(
    State(state): State<AppState>,
    Path(answer_id): Path<i64>,
) -> Result<Response, AppError> {
    let deleted = content::delete_answer(state.repo.as_ref(), answer_id).await?;
    Ok(located(
        StatusCode::OK,
        question_admin_path(deleted.voting_id, deleted.question_id),
        deleted,
    ))
}
