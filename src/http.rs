//! HTTP binding of the challenge engine.
//!
//! Routes live under `/play`. Challenge ids in paths accept either the UUID or its short id.
//! Errors are returned as `{"error": ..., "kind": ...}` with a status derived from the kind.

use axum::{
    Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, instrument};
use uuid::Uuid;

use crate::challenge::Question;
use crate::error::{ChallengeError, ErrorKind};
use crate::invite::parse_challenge_ref;
use crate::manager::{
    ChallengeManager, ChallengeStatusResponse, ChallengeSummary, CreateChallengeRequest, CreateChallengeResponse,
    JoinChallengeResponse, StartOptions, SubmitAnswerResponse,
};
use crate::scoring::ChallengeResult;

#[derive(Clone)]
pub struct AppState {
    pub manager: ChallengeManager,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: ErrorKind,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::UpstreamFailure => StatusCode::BAD_GATEWAY,
        ErrorKind::ResourceExhausted => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn api_error(err: ChallengeError) -> ApiError {
    let kind = err.kind();
    (
        status_for(kind),
        Json(ErrorResponse { error: err.to_string(), kind }),
    )
}

/// Unwrap a JSON body, reporting a malformed one as a validation error.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| api_error(ChallengeError::Validation(rejection.body_text())))
}

fn query_params<T>(payload: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    payload
        .map(|Query(value)| value)
        .map_err(|rejection| api_error(ChallengeError::Validation(rejection.body_text())))
}

fn challenge_id(raw: &str) -> Result<Uuid, ApiError> {
    parse_challenge_ref(raw).ok_or_else(|| api_error(ChallengeError::NotFound(format!("challenge {}", raw))))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JoinRequest {
    pub invite_code: String,
    pub user_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnswerRequest {
    pub user_id: String,
    pub question_index: usize,
    pub answer: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserQuery {
    pub user_id: String,
}

/// A question as shown to players: no answer key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicQuestion {
    pub text: String,
    pub options: Vec<String>,
}

impl From<Question> for PublicQuestion {
    fn from(q: Question) -> Self {
        PublicQuestion { text: q.text, options: q.options }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartResponse {
    pub challenge_id: Uuid,
    pub questions: Vec<PublicQuestion>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CompletedCountResponse {
    pub user_id: String,
    pub completed: usize,
}

pub fn build_router(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    Router::new()
        .route("/health", get(health))
        .route("/play/challenges", post(create_challenge))
        .route("/play/challenges/join", post(join_challenge))
        .route("/play/challenges/completed-last-week", get(completed_last_week))
        .route("/play/challenges/user/{user_id}", get(list_user_challenges))
        .route("/play/challenges/{id}/start", post(start_challenge))
        .route("/play/challenges/{id}/answer", post(submit_answer))
        .route("/play/challenges/{id}/result", get(get_result))
        .route("/play/challenges/{id}/status", get(get_status).put(update_status))
        .layer(middleware)
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "name": "quizduel",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[instrument(level = "info", skip(state, request))]
async fn create_challenge(
    State(state): State<AppState>,
    request: Result<Json<CreateChallengeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateChallengeResponse>), ApiError> {
    let request = json_body(request)?;
    state
        .manager
        .create_challenge(request)
        .map(|response| (StatusCode::CREATED, Json(response)))
        .map_err(api_error)
}

#[instrument(level = "info", skip(state, request))]
async fn join_challenge(
    State(state): State<AppState>,
    request: Result<Json<JoinRequest>, JsonRejection>,
) -> Result<Json<JoinChallengeResponse>, ApiError> {
    let request = json_body(request)?;
    state
        .manager
        .join_challenge(&request.invite_code, &request.user_id)
        .map(Json)
        .map_err(api_error)
}

#[instrument(level = "info", skip(state, options))]
async fn start_challenge(
    State(state): State<AppState>,
    Path(id): Path<String>,
    options: Result<Query<StartOptions>, QueryRejection>,
) -> Result<Json<StartResponse>, ApiError> {
    let id = challenge_id(&id)?;
    let options = query_params(options)?;
    let started = state.manager.start_challenge(id, options).await.map_err(api_error)?;
    Ok(Json(StartResponse {
        challenge_id: started.challenge_id,
        questions: started.questions.into_iter().map(PublicQuestion::from).collect(),
    }))
}

#[instrument(level = "info", skip(state, request))]
async fn submit_answer(
    State(state): State<AppState>,
    Path(id): Path<String>,
    request: Result<Json<AnswerRequest>, JsonRejection>,
) -> Result<Json<SubmitAnswerResponse>, ApiError> {
    let id = challenge_id(&id)?;
    let request = json_body(request)?;
    state
        .manager
        .submit_answer(id, &request.user_id, request.question_index, &request.answer)
        .map(Json)
        .map_err(api_error)
}

async fn get_result(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ChallengeResult>, ApiError> {
    let id = challenge_id(&id)?;
    state.manager.get_result(id).map(Json).map_err(api_error)
}

async fn get_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ChallengeStatusResponse>, ApiError> {
    let id = challenge_id(&id)?;
    state.manager.get_status(id).map(Json).map_err(api_error)
}

#[instrument(level = "info", skip(state, request))]
async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    request: Result<Json<StatusUpdateRequest>, JsonRejection>,
) -> Result<Json<ChallengeStatusResponse>, ApiError> {
    let id = challenge_id(&id)?;
    let request = json_body(request)?;
    state
        .manager
        .update_status(id, &request.status)
        .map(Json)
        .map_err(api_error)
}

async fn list_user_challenges(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<ChallengeSummary>>, ApiError> {
    state.manager.list_challenges_for(&user_id).map(Json).map_err(api_error)
}

async fn completed_last_week(
    State(state): State<AppState>,
    query: Result<Query<UserQuery>, QueryRejection>,
) -> Result<Json<CompletedCountResponse>, ApiError> {
    let query = query_params(query)?;
    let completed = state
        .manager
        .count_completed_last_week(&query.user_id)
        .map_err(api_error)?;
    Ok(Json(CompletedCountResponse { user_id: query.user_id, completed }))
}
