//! `/api/auth`: register, login, promote, whoami.

use std::sync::Arc;

use axum::{
  extract::{Path, State},
  http::StatusCode,
  Json,
};
use tracing::{info, instrument};

use crate::admin;
use crate::auth::{authenticate, create_account, issue_token, AuthUser, NewAccount};
use crate::domain::Role;
use crate::error::ApiError;
use crate::protocol::{AuthResponse, LoginRequest, RegisterRequest, UserOut};
use crate::routes::ApiJson;
use crate::state::AppState;

#[instrument(level = "info", skip(state, body))]
pub async fn register(
  State(state): State<Arc<AppState>>,
  ApiJson(body): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
  let user = create_account(
    &state,
    NewAccount { name: body.name, email: body.email, password: body.password, role: Role::Learner },
  )
  .await?;
  let token = issue_token(&user, &state.auth)?;
  Ok((
    StatusCode::CREATED,
    Json(AuthResponse { message: Some("Registration successful".into()), token, user }),
  ))
}

#[instrument(level = "info", skip(state, body))]
pub async fn login(
  State(state): State<Arc<AppState>>,
  ApiJson(body): ApiJson<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
  let (Some(email), Some(password)) = (body.email.filter(|e| !e.trim().is_empty()), body.password.filter(|p| !p.is_empty()))
  else {
    return Err(ApiError::bad_request("Email and password are required"));
  };
  let user = authenticate(&state, &email, &password).await?;
  let token = issue_token(&user, &state.auth)?;
  info!(target: "auth", user = %user.id, role = user.role.as_str(), "Login");
  Ok(Json(AuthResponse { message: None, token, user }))
}

#[instrument(level = "info", skip(state, caller), fields(caller = %caller.id))]
pub async fn make_admin(
  State(state): State<Arc<AppState>>,
  caller: AuthUser,
  Path(user_id): Path<String>,
) -> Result<Json<UserOut>, ApiError> {
  caller.require_admin()?;
  let user = admin::make_admin(&state, &user_id).await?;
  Ok(Json(UserOut { user }))
}

#[instrument(level = "debug", skip(state, caller), fields(caller = %caller.id))]
pub async fn me(State(state): State<Arc<AppState>>, caller: AuthUser) -> Result<Json<UserOut>, ApiError> {
  let user = state
    .store
    .get_user(&caller.id)
    .await?
    .ok_or_else(|| ApiError::not_found("User not found"))?;
  Ok(Json(UserOut { user }))
}
