//! `/api/analytics`: loads records and hands them to the pure roll-ups.

use std::sync::Arc;

use axum::{
  extract::{Path, State},
  Json,
};
use tracing::instrument;

use crate::admin::sync_courses;
use crate::analytics::{self, MyStats, Overview, UserSummary};
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::logic::question_index;
use crate::protocol::AdminDashboardResponse;
use crate::state::AppState;

#[instrument(level = "info", skip(state, caller), fields(caller = %caller.id))]
pub async fn overview(State(state): State<Arc<AppState>>, caller: AuthUser) -> Result<Json<Overview>, ApiError> {
  caller.require_admin()?;
  let users = state.store.list_users(None).await?;
  let sessions = state.store.list_sessions().await?;
  Ok(Json(analytics::overview(&users, &sessions)))
}

#[instrument(level = "info", skip(state, caller), fields(caller = %caller.id))]
pub async fn my_stats(State(state): State<Arc<AppState>>, caller: AuthUser) -> Result<Json<MyStats>, ApiError> {
  let sessions = state.store.list_sessions_for_user(&caller.id).await?;
  let questions = question_index(&state).await?;
  Ok(Json(analytics::my_stats(&sessions, &questions)))
}

#[instrument(level = "info", skip(state, caller), fields(caller = %caller.id))]
pub async fn user(
  State(state): State<Arc<AppState>>,
  caller: AuthUser,
  Path(user_id): Path<String>,
) -> Result<Json<UserSummary>, ApiError> {
  caller.require_admin()?;
  let user = state
    .store
    .get_user(&user_id)
    .await?
    .ok_or_else(|| ApiError::not_found("User not found"))?;
  let sessions = state.store.list_sessions_for_user(&user_id).await?;
  Ok(Json(analytics::user_summary(user, &sessions)))
}

#[instrument(level = "info", skip(state, caller), fields(caller = %caller.id))]
pub async fn admin_dashboard(
  State(state): State<Arc<AppState>>,
  caller: AuthUser,
) -> Result<Json<AdminDashboardResponse>, ApiError> {
  caller.require_admin()?;
  let courses = sync_courses(&state).await?;
  Ok(Json(AdminDashboardResponse { total_courses: courses.len(), courses }))
}
