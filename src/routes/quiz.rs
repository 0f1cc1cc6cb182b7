//! `/api/quiz` and `/api/dashboard`.

use std::sync::Arc;

use axum::{
  extract::{Path, State},
  Json,
};
use tracing::instrument;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::protocol::{
  CategoriesResponse, DashboardResponse, HistoryResponse, QuizCategory, QuizQuestionsQuery, QuizQuestionsResponse,
  SubmitTestRequest, SubmitTestResponse,
};
use crate::quiz;
use crate::routes::{ApiJson, ApiQuery};
use crate::state::AppState;

#[instrument(level = "debug", skip(state, _caller))]
pub async fn categories(
  State(state): State<Arc<AppState>>,
  _caller: AuthUser,
) -> Result<Json<CategoriesResponse<QuizCategory>>, ApiError> {
  Ok(Json(CategoriesResponse { categories: quiz::quiz_categories(&state).await? }))
}

#[instrument(level = "debug", skip(state, _caller, query))]
pub async fn questions(
  State(state): State<Arc<AppState>>,
  _caller: AuthUser,
  Path(category_id): Path<String>,
  ApiQuery(query): ApiQuery<QuizQuestionsQuery>,
) -> Result<Json<QuizQuestionsResponse>, ApiError> {
  Ok(Json(quiz::category_questions(&state, &category_id, &query).await?))
}

#[instrument(level = "info", skip(state, caller, body), fields(caller = %caller.id))]
pub async fn submit(
  State(state): State<Arc<AppState>>,
  caller: AuthUser,
  ApiJson(body): ApiJson<SubmitTestRequest>,
) -> Result<Json<SubmitTestResponse>, ApiError> {
  Ok(Json(quiz::submit_test(&state, &caller, body).await?))
}

#[instrument(level = "debug", skip(state, caller), fields(caller = %caller.id))]
pub async fn history(State(state): State<Arc<AppState>>, caller: AuthUser) -> Result<Json<HistoryResponse>, ApiError> {
  Ok(Json(HistoryResponse { results: quiz::history(&state, &caller).await? }))
}

#[instrument(level = "debug", skip(state, caller), fields(caller = %caller.id))]
pub async fn dashboard(State(state): State<Arc<AppState>>, caller: AuthUser) -> Result<Json<DashboardResponse>, ApiError> {
  Ok(Json(quiz::dashboard(&state, &caller).await?))
}
