//! `/api/admin`: every handler is admin-only.

use std::sync::Arc;

use axum::{
  extract::{Path, State},
  http::StatusCode,
  Json,
};
use tracing::instrument;

use crate::admin;
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::protocol::{
  AdminCategory, CategoriesResponse, CourseOut, CourseRequest, CoursesResponse, CreateQuestionRequest, CreateUserRequest,
  GenerateQuestionRequest, MessageOut, QuestionOutFull, QuestionsQuery, QuestionsResponse, UpdateUserRequest, UserOut,
  UsersQuery, UsersResponse,
};
use crate::routes::{ApiJson, ApiQuery};
use crate::state::AppState;

fn deleted(what: &str) -> Json<MessageOut> {
  Json(MessageOut { message: format!("{what} deleted") })
}

// --- Users ---

#[instrument(level = "info", skip(state, caller, query), fields(caller = %caller.id))]
pub async fn list_users(
  State(state): State<Arc<AppState>>,
  caller: AuthUser,
  ApiQuery(query): ApiQuery<UsersQuery>,
) -> Result<Json<UsersResponse>, ApiError> {
  caller.require_admin()?;
  Ok(Json(UsersResponse { users: admin::list_users(&state, query.role.as_deref()).await? }))
}

#[instrument(level = "info", skip(state, caller, body), fields(caller = %caller.id))]
pub async fn create_user(
  State(state): State<Arc<AppState>>,
  caller: AuthUser,
  ApiJson(body): ApiJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserOut>), ApiError> {
  caller.require_admin()?;
  let user = admin::create_user(&state, body).await?;
  Ok((StatusCode::CREATED, Json(UserOut { user })))
}

#[instrument(level = "info", skip(state, caller, body), fields(caller = %caller.id))]
pub async fn update_user(
  State(state): State<Arc<AppState>>,
  caller: AuthUser,
  Path(id): Path<String>,
  ApiJson(body): ApiJson<UpdateUserRequest>,
) -> Result<Json<UserOut>, ApiError> {
  caller.require_admin()?;
  Ok(Json(UserOut { user: admin::update_user(&state, &id, body).await? }))
}

#[instrument(level = "info", skip(state, caller), fields(caller = %caller.id))]
pub async fn delete_user(
  State(state): State<Arc<AppState>>,
  caller: AuthUser,
  Path(id): Path<String>,
) -> Result<Json<MessageOut>, ApiError> {
  caller.require_admin()?;
  admin::delete_user(&state, &caller, &id).await?;
  Ok(deleted("User"))
}

// --- Courses ---

#[instrument(level = "debug", skip(state, caller), fields(caller = %caller.id))]
pub async fn list_courses(State(state): State<Arc<AppState>>, caller: AuthUser) -> Result<Json<CoursesResponse>, ApiError> {
  caller.require_admin()?;
  Ok(Json(CoursesResponse { courses: admin::list_courses(&state).await? }))
}

#[instrument(level = "info", skip(state, caller, body), fields(caller = %caller.id))]
pub async fn create_course(
  State(state): State<Arc<AppState>>,
  caller: AuthUser,
  ApiJson(body): ApiJson<CourseRequest>,
) -> Result<(StatusCode, Json<CourseOut>), ApiError> {
  caller.require_admin()?;
  let course = admin::create_course(&state, body).await?;
  Ok((StatusCode::CREATED, Json(CourseOut { course })))
}

#[instrument(level = "info", skip(state, caller, body), fields(caller = %caller.id))]
pub async fn update_course(
  State(state): State<Arc<AppState>>,
  caller: AuthUser,
  Path(id): Path<String>,
  ApiJson(body): ApiJson<CourseRequest>,
) -> Result<Json<CourseOut>, ApiError> {
  caller.require_admin()?;
  Ok(Json(CourseOut { course: admin::update_course(&state, &id, body).await? }))
}

#[instrument(level = "info", skip(state, caller), fields(caller = %caller.id))]
pub async fn delete_course(
  State(state): State<Arc<AppState>>,
  caller: AuthUser,
  Path(id): Path<String>,
) -> Result<Json<MessageOut>, ApiError> {
  caller.require_admin()?;
  admin::delete_course(&state, &id).await?;
  Ok(deleted("Course"))
}

// --- Questions ---

#[instrument(level = "debug", skip(state, caller, query), fields(caller = %caller.id))]
pub async fn list_questions(
  State(state): State<Arc<AppState>>,
  caller: AuthUser,
  ApiQuery(query): ApiQuery<QuestionsQuery>,
) -> Result<Json<QuestionsResponse>, ApiError> {
  caller.require_admin()?;
  let questions = admin::list_questions(&state, &query).await?;
  Ok(Json(QuestionsResponse { count: questions.len(), questions }))
}

#[instrument(level = "info", skip(state, caller, body), fields(caller = %caller.id))]
pub async fn create_question(
  State(state): State<Arc<AppState>>,
  caller: AuthUser,
  ApiJson(body): ApiJson<CreateQuestionRequest>,
) -> Result<(StatusCode, Json<QuestionOutFull>), ApiError> {
  caller.require_admin()?;
  let question = admin::create_question(&state, body).await?;
  Ok((StatusCode::CREATED, Json(QuestionOutFull { question })))
}

#[instrument(level = "info", skip(state, caller, body), fields(caller = %caller.id))]
pub async fn generate_question(
  State(state): State<Arc<AppState>>,
  caller: AuthUser,
  body: Option<ApiJson<GenerateQuestionRequest>>,
) -> Result<(StatusCode, Json<QuestionOutFull>), ApiError> {
  caller.require_admin()?;
  let req = body.map(|ApiJson(b)| b).unwrap_or_default();
  let question = admin::generate_and_save(&state, &caller, req).await?;
  Ok((StatusCode::CREATED, Json(QuestionOutFull { question })))
}

#[instrument(level = "info", skip(state, caller), fields(caller = %caller.id))]
pub async fn delete_question(
  State(state): State<Arc<AppState>>,
  caller: AuthUser,
  Path(id): Path<String>,
) -> Result<Json<MessageOut>, ApiError> {
  caller.require_admin()?;
  admin::delete_question(&state, &id).await?;
  Ok(deleted("Question"))
}

#[instrument(level = "debug", skip(state, caller), fields(caller = %caller.id))]
pub async fn categories(
  State(state): State<Arc<AppState>>,
  caller: AuthUser,
) -> Result<Json<CategoriesResponse<AdminCategory>>, ApiError> {
  caller.require_admin()?;
  Ok(Json(CategoriesResponse { categories: admin::categories(&state).await? }))
}

// --- Sessions ---

#[instrument(level = "info", skip(state, caller), fields(caller = %caller.id))]
pub async fn delete_session(
  State(state): State<Arc<AppState>>,
  caller: AuthUser,
  Path(id): Path<String>,
) -> Result<Json<MessageOut>, ApiError> {
  caller.require_admin()?;
  admin::delete_session(&state, &id).await?;
  Ok(deleted("Session"))
}
