//! `/api/chat`: adaptive training over HTTP. Thin wrappers around `logic`.

use std::sync::Arc;

use axum::{
  extract::{Path, State},
  Json,
};
use tracing::{info, instrument};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::logic::{self, AnswerInput};
use crate::protocol::{
  AnswerRequest, AnswerResponse, CategoriesResponse, CategoryOut, ConversationRequest, ConversationResponse,
  ModulesResponse, NotesResponse, StartRequest, StartResponse,
};
use crate::routes::ApiJson;
use crate::state::AppState;

#[instrument(level = "debug", skip(state, _caller))]
pub async fn categories(
  State(state): State<Arc<AppState>>,
  _caller: AuthUser,
) -> Result<Json<CategoriesResponse<CategoryOut>>, ApiError> {
  Ok(Json(CategoriesResponse { categories: logic::categories(&state).await? }))
}

/// Learning-path progress for the caller.
#[instrument(level = "debug", skip(state, caller), fields(caller = %caller.id))]
pub async fn modules(State(state): State<Arc<AppState>>, caller: AuthUser) -> Result<Json<ModulesResponse>, ApiError> {
  Ok(Json(ModulesResponse { modules: logic::module_status(&state, &caller.id).await? }))
}

/// The body is optional; `{}` or nothing starts without a preferred category.
#[instrument(level = "info", skip(state, caller, body), fields(caller = %caller.id))]
pub async fn start(
  State(state): State<Arc<AppState>>,
  caller: AuthUser,
  body: Option<ApiJson<StartRequest>>,
) -> Result<Json<StartResponse>, ApiError> {
  let category = body.and_then(|ApiJson(b)| b.category_id);
  let out = logic::start_session(&state, &caller, category).await?;
  info!(target: "training", session = %out.session_id, question = %out.question.id, "HTTP start served");
  Ok(Json(out))
}

#[instrument(level = "info", skip(state, caller, body), fields(caller = %caller.id))]
pub async fn answer(
  State(state): State<Arc<AppState>>,
  caller: AuthUser,
  ApiJson(body): ApiJson<AnswerRequest>,
) -> Result<Json<AnswerResponse>, ApiError> {
  let (Some(session_id), Some(question_id), Some(selected_index)) = (body.session_id, body.question_id, body.selected_index)
  else {
    return Err(ApiError::bad_request("sessionId, questionId and selectedIndex are required"));
  };
  let out = logic::submit_answer(
    &state,
    &caller,
    AnswerInput { session_id, question_id, selected_index, free_text: body.free_text },
  )
  .await?;
  info!(target: "training", correct = out.current_question_result.correct, done = out.done, "HTTP answer evaluated");
  Ok(Json(out))
}

#[instrument(level = "info", skip(state, caller, body), fields(caller = %caller.id))]
pub async fn conversation(
  State(state): State<Arc<AppState>>,
  caller: AuthUser,
  ApiJson(body): ApiJson<ConversationRequest>,
) -> Result<Json<ConversationResponse>, ApiError> {
  let message = body.message.unwrap_or_default();
  let out = logic::conversation(&state, &caller, body.session_id.as_deref(), &message).await?;
  Ok(Json(out))
}

#[instrument(level = "info", skip(state, _caller))]
pub async fn notes(
  State(state): State<Arc<AppState>>,
  _caller: AuthUser,
  Path(category_id): Path<String>,
) -> Result<Json<NotesResponse>, ApiError> {
  Ok(Json(logic::study_notes(&state, &category_id).await?))
}
