//! API error taxonomy. Every handler returns `Result<_, ApiError>`; the response body
//! is always `{"message": "..."}` so the SPA can show it verbatim.

use axum::{
  extract::rejection::{JsonRejection, QueryRejection},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::auth::AuthError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
  #[error("{0}")]
  BadRequest(String),
  #[error("{0}")]
  Unauthorized(String),
  #[error("{0}")]
  Forbidden(String),
  #[error("{0}")]
  NotFound(String),
  #[error("{0}")]
  Conflict(String),
  #[error("{0}")]
  Unavailable(String),
  #[error("{0}")]
  Internal(String),
}

impl ApiError {
  pub fn bad_request(msg: impl Into<String>) -> Self { ApiError::BadRequest(msg.into()) }
  pub fn not_found(msg: impl Into<String>) -> Self { ApiError::NotFound(msg.into()) }
  pub fn forbidden(msg: impl Into<String>) -> Self { ApiError::Forbidden(msg.into()) }
  pub fn conflict(msg: impl Into<String>) -> Self { ApiError::Conflict(msg.into()) }

  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
      ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
      ApiError::NotFound(_) => StatusCode::NOT_FOUND,
      ApiError::Conflict(_) => StatusCode::CONFLICT,
      ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
      ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    // Internal details stay in the logs.
    let message = match &self {
      ApiError::Internal(detail) => {
        error!(target: "cyberlms_backend", error = %detail, "Internal server error");
        "Internal server error".to_string()
      }
      other => other.to_string(),
    };
    (status, Json(json!({ "message": message }))).into_response()
  }
}

impl From<StoreError> for ApiError {
  fn from(e: StoreError) -> Self {
    match e {
      StoreError::NotFound => ApiError::NotFound("Not found".into()),
      StoreError::Conflict(msg) => ApiError::Conflict(msg),
      other => ApiError::Internal(other.to_string()),
    }
  }
}

impl From<JsonRejection> for ApiError {
  fn from(e: JsonRejection) -> Self {
    ApiError::BadRequest(e.body_text())
  }
}

impl From<QueryRejection> for ApiError {
  fn from(e: QueryRejection) -> Self {
    ApiError::BadRequest(e.body_text())
  }
}

impl From<AuthError> for ApiError {
  fn from(e: AuthError) -> Self {
    match e {
      AuthError::MissingToken => ApiError::Unauthorized("No token provided".into()),
      AuthError::InvalidToken => ApiError::Unauthorized("Invalid or expired token".into()),
      AuthError::Forbidden => ApiError::Forbidden("Forbidden: role not allowed".into()),
      AuthError::Hash(msg) | AuthError::Encode(msg) => ApiError::Internal(msg),
    }
  }
}
