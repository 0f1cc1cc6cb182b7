//! Admin operations: user management, courses, the question bank, and session cleanup.
//! Routes check the admin role before calling in here.

use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::analytics::group_categories;
use crate::auth::{create_account, AuthUser, NewAccount};
use crate::domain::{Course, Difficulty, Question, Role, User};
use crate::error::ApiError;
use crate::generator::{generate_question, GenerateError, GenerateRequest, DEFAULT_EXPLANATION};
use crate::logic::weak_areas_for;
use crate::protocol::{
  AdminCategory, CourseRequest, CreateQuestionRequest, CreateUserRequest, GenerateQuestionRequest, QuestionsQuery,
  UpdateUserRequest,
};
use crate::state::AppState;
use crate::store::{QuestionFilter, StoreError};
use crate::util::normalize_email;

pub const LLM_NOT_CONFIGURED: &str = "AI generation is not configured";

fn parse_role(raw: Option<&str>) -> Result<Role, ApiError> {
  let raw = raw.filter(|r| !r.trim().is_empty()).ok_or_else(|| ApiError::bad_request("Role is required"))?;
  Role::parse(raw).ok_or_else(|| ApiError::bad_request(format!("Invalid role: {raw}")))
}

fn default_description(name: &str) -> String {
  format!("AI-powered cybersecurity training course: {name}")
}

// --- Users ---

pub async fn list_users(state: &AppState, role: Option<&str>) -> Result<Vec<User>, ApiError> {
  let role = match role.filter(|r| !r.trim().is_empty()) {
    Some(r) => Some(parse_role(Some(r))?),
    None => None,
  };
  Ok(state.store.list_users(role).await?)
}

#[instrument(level = "info", skip(state, req))]
pub async fn create_user(state: &AppState, req: CreateUserRequest) -> Result<User, ApiError> {
  let role = parse_role(req.role.as_deref())?;
  create_account(state, NewAccount { name: req.name, email: req.email, password: req.password, role }).await
}

#[instrument(level = "info", skip(state, user_id, req), fields(%user_id))]
pub async fn update_user(state: &AppState, user_id: &str, req: UpdateUserRequest) -> Result<User, ApiError> {
  let mut user = state.store.get_user(user_id).await?.ok_or_else(|| ApiError::not_found("User not found"))?;

  if let Some(name) = req.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()) {
    user.name = name;
  }
  if let Some(email) = req.email.map(|e| normalize_email(&e)).filter(|e| !e.is_empty()) {
    if email != user.email {
      if !email.contains('@') {
        return Err(ApiError::bad_request("Email is invalid"));
      }
      if state.store.find_user_by_email(&email).await?.is_some() {
        return Err(ApiError::conflict("Email is already registered"));
      }
      user.email = email;
    }
  }
  if let Some(raw) = req.role.as_deref().filter(|r| !r.trim().is_empty()) {
    user.role = parse_role(Some(raw))?;
  }
  user.updated_at = Utc::now();
  state.store.update_user(&user).await?;
  info!(target: "cyberlms_backend", user = %user.id, role = user.role.as_str(), "User updated");
  Ok(user)
}

/// Remove a user and their training sessions. Admins cannot remove themselves.
#[instrument(level = "info", skip(state, actor, user_id), fields(actor = %actor.id, %user_id))]
pub async fn delete_user(state: &AppState, actor: &AuthUser, user_id: &str) -> Result<(), ApiError> {
  if actor.id == user_id {
    return Err(ApiError::bad_request("You cannot delete your own account"));
  }
  if state.store.get_user(user_id).await?.is_none() {
    return Err(ApiError::not_found("User not found"));
  }
  let removed = state.store.delete_sessions_for_user(user_id).await?;
  state.store.delete_user(user_id).await?;
  info!(target: "cyberlms_backend", %user_id, sessions = removed, "User deleted");
  Ok(())
}

/// Grant the admin role. Idempotent.
#[instrument(level = "info", skip(state, user_id), fields(%user_id))]
pub async fn make_admin(state: &AppState, user_id: &str) -> Result<User, ApiError> {
  let mut user = state.store.get_user(user_id).await?.ok_or_else(|| ApiError::not_found("User not found"))?;
  if user.role != Role::Admin {
    user.role = Role::Admin;
    user.updated_at = Utc::now();
    state.store.update_user(&user).await?;
    info!(target: "auth", user = %user.id, "User promoted to admin");
  }
  Ok(user)
}

// --- Courses ---

async fn questions_in(state: &AppState, category_id: &str) -> Result<Vec<Question>, ApiError> {
  Ok(
    state
      .store
      .list_questions(&QuestionFilter { category_id: Some(category_id.to_string()), difficulty: None })
      .await?,
  )
}

pub async fn list_courses(state: &AppState) -> Result<Vec<Course>, ApiError> {
  Ok(state.store.list_courses().await?)
}

#[instrument(level = "info", skip(state, req))]
pub async fn create_course(state: &AppState, req: CourseRequest) -> Result<Course, ApiError> {
  let (Some(name), Some(category_id)) = (
    req.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
    req.category_id.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
  ) else {
    return Err(ApiError::bad_request("Name and categoryId are required"));
  };
  if state.store.find_course_by_category(&category_id).await?.is_some() {
    return Err(ApiError::conflict("A course for this category already exists"));
  }

  let count = questions_in(state, &category_id).await?.len();
  let course = Course {
    id: Uuid::new_v4().to_string(),
    description: req
      .description
      .filter(|d| !d.trim().is_empty())
      .unwrap_or_else(|| default_description(&name)),
    name,
    category_id,
    question_count: count as i64,
    created_at: Utc::now(),
  };
  state.store.insert_course(&course).await?;
  info!(target: "cyberlms_backend", course = %course.id, category = %course.category_id, "Course created");
  Ok(course)
}

#[instrument(level = "info", skip(state, course_id, req), fields(%course_id))]
pub async fn update_course(state: &AppState, course_id: &str, req: CourseRequest) -> Result<Course, ApiError> {
  let mut course = state.store.get_course(course_id).await?.ok_or_else(|| ApiError::not_found("Course not found"))?;

  if let Some(name) = req.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()) {
    course.name = name;
  }
  if let Some(description) = req.description {
    course.description = description;
  }
  if let Some(category_id) = req.category_id.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()) {
    if category_id != course.category_id {
      if state.store.find_course_by_category(&category_id).await?.is_some() {
        return Err(ApiError::conflict("A course for this category already exists"));
      }
      course.question_count = questions_in(state, &category_id).await?.len() as i64;
      course.category_id = category_id;
    }
  }
  state.store.update_course(&course).await?;
  Ok(course)
}

pub async fn delete_course(state: &AppState, course_id: &str) -> Result<(), ApiError> {
  state.store.delete_course(course_id).await.map_err(|e| match e {
    StoreError::NotFound => ApiError::not_found("Course not found"),
    other => other.into(),
  })
}

/// One course per question category: create missing ones and refresh counts.
/// Returned in category-name order.
#[instrument(level = "info", skip(state))]
pub async fn sync_courses(state: &AppState) -> Result<Vec<Course>, ApiError> {
  let questions = state.store.list_questions(&QuestionFilter::default()).await?;
  let mut out = Vec::new();
  let mut created = 0usize;
  for cat in group_categories(&questions) {
    let count = cat.question_count as i64;
    let course = match state.store.find_course_by_category(&cat.id).await? {
      Some(mut course) => {
        if course.question_count != count {
          course.question_count = count;
          state.store.update_course(&course).await?;
        }
        course
      }
      None => {
        let course = Course {
          id: Uuid::new_v4().to_string(),
          description: default_description(&cat.name),
          name: cat.name,
          category_id: cat.id,
          question_count: count,
          created_at: Utc::now(),
        };
        state.store.insert_course(&course).await?;
        created += 1;
        course
      }
    };
    out.push(course);
  }
  if created > 0 {
    info!(target: "cyberlms_backend", created, "Courses synced with question bank");
  }
  Ok(out)
}

// --- Questions ---

pub async fn list_questions(state: &AppState, query: &QuestionsQuery) -> Result<Vec<Question>, ApiError> {
  let filter = QuestionFilter {
    category_id: query.category_id.clone().filter(|c| !c.trim().is_empty()),
    difficulty: query.difficulty.map(Difficulty::new),
  };
  Ok(state.store.list_questions(&filter).await?)
}

async fn store_question(state: &AppState, question: &Question) -> Result<(), ApiError> {
  state.store.insert_question(question).await?;
  state.store.adjust_course_count(&question.category_id, 1).await?;
  Ok(())
}

#[instrument(level = "info", skip(state, req))]
pub async fn create_question(state: &AppState, req: CreateQuestionRequest) -> Result<Question, ApiError> {
  let correct_index = req
    .correct_index
    .ok_or_else(|| ApiError::bad_request("correctIndex is required"))
    .and_then(|i| usize::try_from(i).map_err(|_| ApiError::bad_request(format!("correctIndex {i} is out of range"))))?;
  let category_id = req.category_id.map(|c| c.trim().to_string()).unwrap_or_default();

  let question = Question {
    id: Uuid::new_v4().to_string(),
    external_id: req
      .external_id
      .filter(|e| !e.trim().is_empty())
      .unwrap_or_else(|| format!("manual-{}", Uuid::new_v4())),
    category_name: req
      .category_name
      .filter(|n| !n.trim().is_empty())
      .unwrap_or_else(|| category_id.clone()),
    category_id,
    difficulty: Difficulty::new(req.difficulty.unwrap_or(1)),
    text: req.question.map(|t| t.trim().to_string()).unwrap_or_default(),
    options: req.options,
    correct_index,
    explanation: req
      .explanation
      .filter(|e| !e.trim().is_empty())
      .unwrap_or_else(|| DEFAULT_EXPLANATION.into()),
    created_at: Utc::now(),
  };
  question.validate().map_err(ApiError::BadRequest)?;
  store_question(state, &question).await?;
  info!(target: "training", question = %question.id, category = %question.category_id, "Question created");
  Ok(question)
}

/// Generate a question with the LLM and save it.
#[instrument(level = "info", skip(state, actor, req), fields(actor = %actor.id))]
pub async fn generate_and_save(
  state: &AppState,
  actor: &AuthUser,
  req: GenerateQuestionRequest,
) -> Result<Question, ApiError> {
  let llm = state.llm.as_ref().ok_or_else(|| ApiError::Unavailable(LLM_NOT_CONFIGURED.into()))?;
  let request = GenerateRequest {
    difficulty: Difficulty::new(req.difficulty.unwrap_or(2)),
    category_id: req.category_id,
    weak_areas: weak_areas_for(state, &actor.id).await?,
  };
  let question = generate_question(llm, &state.prompts, state.store.as_ref(), &request)
    .await
    .map_err(|e| match e {
      GenerateError::Store(e) => ApiError::from(e),
      other => {
        warn!(target: "training", error = %other, "Admin question generation failed");
        ApiError::Unavailable("Failed to generate question".into())
      }
    })?;
  store_question(state, &question).await?;
  Ok(question)
}

#[instrument(level = "info", skip(state, question_id), fields(%question_id))]
pub async fn delete_question(state: &AppState, question_id: &str) -> Result<(), ApiError> {
  let question = state
    .store
    .get_question(question_id)
    .await?
    .ok_or_else(|| ApiError::not_found("Question not found"))?;
  state.store.delete_question(&question.id).await?;
  state.store.adjust_course_count(&question.category_id, -1).await?;
  info!(target: "training", question = %question.id, "Question deleted");
  Ok(())
}

pub async fn categories(state: &AppState) -> Result<Vec<AdminCategory>, ApiError> {
  let questions = state.store.list_questions(&QuestionFilter::default()).await?;
  Ok(
    group_categories(&questions)
      .into_iter()
      .map(|c| AdminCategory { id: c.id, name: c.name, question_count: c.question_count })
      .collect(),
  )
}

// --- Sessions ---

pub async fn delete_session(state: &AppState, session_id: &str) -> Result<(), ApiError> {
  state.store.delete_session(session_id).await.map_err(|e| match e {
    StoreError::NotFound => ApiError::not_found("Session not found"),
    other => other.into(),
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::Session;

  fn admin() -> AuthUser {
    AuthUser { id: "admin-1".into(), role: Role::Admin, name: "Root".into() }
  }

  fn user_req(email: &str, role: Option<&str>) -> CreateUserRequest {
    CreateUserRequest {
      name: Some("Learner".into()),
      email: Some(email.into()),
      password: Some("secret1".into()),
      role: role.map(str::to_string),
    }
  }

  #[tokio::test]
  async fn create_user_requires_a_valid_role() {
    let state = AppState::for_tests().await;
    assert!(matches!(create_user(&state, user_req("a@x.io", None)).await, Err(ApiError::BadRequest(_))));
    assert!(matches!(create_user(&state, user_req("a@x.io", Some("wizard"))).await, Err(ApiError::BadRequest(_))));
    let u = create_user(&state, user_req("a@x.io", Some("student"))).await.expect("create");
    assert_eq!(u.role, Role::Learner);
    assert!(matches!(create_user(&state, user_req("a@x.io", Some("admin"))).await, Err(ApiError::Conflict(_))));

    let admins = list_users(&state, Some("admin")).await.expect("list");
    assert!(admins.is_empty());
    assert!(matches!(list_users(&state, Some("nope")).await, Err(ApiError::BadRequest(_))));
  }

  #[tokio::test]
  async fn deleting_a_user_removes_their_sessions() {
    let state = AppState::for_tests().await;
    let u = create_user(&state, user_req("b@x.io", Some("learner"))).await.expect("create");
    let s = Session::new("s-1".into(), u.id.clone(), None, Utc::now());
    state.store.insert_session(&s).await.expect("session");

    let me = AuthUser { id: u.id.clone(), ..admin() };
    assert!(matches!(delete_user(&state, &me, &u.id).await, Err(ApiError::BadRequest(_))));

    delete_user(&state, &admin(), &u.id).await.expect("delete");
    assert!(state.store.get_session("s-1").await.expect("get").is_none());
    assert!(matches!(delete_user(&state, &admin(), &u.id).await, Err(ApiError::NotFound(_))));
  }

  #[tokio::test]
  async fn update_and_promote() {
    let state = AppState::for_tests().await;
    let u = create_user(&state, user_req("c@x.io", Some("learner"))).await.expect("create");
    let updated = update_user(
      &state,
      &u.id,
      UpdateUserRequest { name: Some("Carla".into()), email: Some("C2@X.io".into()), role: None },
    )
    .await
    .expect("update");
    assert_eq!(updated.name, "Carla");
    assert_eq!(updated.email, "c2@x.io");
    assert!(matches!(update_user(&state, "ghost", UpdateUserRequest::default()).await, Err(ApiError::NotFound(_))));

    let promoted = make_admin(&state, &u.id).await.expect("promote");
    assert_eq!(promoted.role, Role::Admin);
    assert!(matches!(make_admin(&state, "ghost").await, Err(ApiError::NotFound(_))));
  }

  #[tokio::test]
  async fn courses_count_questions_and_reject_duplicates() {
    let state = AppState::for_tests().await;
    let req = || CourseRequest {
      name: Some("Phishing 101".into()),
      description: None,
      category_id: Some("basic-phishing".into()),
    };
    let course = create_course(&state, req()).await.expect("course");
    assert_eq!(course.question_count, 5);
    assert_eq!(course.description, "AI-powered cybersecurity training course: Phishing 101");
    assert!(matches!(create_course(&state, req()).await, Err(ApiError::Conflict(_))));
    assert!(matches!(create_course(&state, CourseRequest::default()).await, Err(ApiError::BadRequest(_))));

    let q = create_question(
      &state,
      CreateQuestionRequest {
        category_id: Some("basic-phishing".into()),
        category_name: Some("Basic Phishing".into()),
        difficulty: Some(2),
        question: Some("Which sender is suspicious?".into()),
        options: vec!["bank.com".into(), "bank-secure-login.xyz".into()],
        correct_index: Some(1),
        ..Default::default()
      },
    )
    .await
    .expect("question");
    assert_eq!(state.store.get_course(&course.id).await.expect("get").expect("some").question_count, 6);

    delete_question(&state, &q.id).await.expect("delete");
    assert_eq!(state.store.get_course(&course.id).await.expect("get").expect("some").question_count, 5);
    assert!(matches!(delete_question(&state, &q.id).await, Err(ApiError::NotFound(_))));

    delete_course(&state, &course.id).await.expect("delete course");
    assert!(matches!(delete_course(&state, &course.id).await, Err(ApiError::NotFound(_))));
  }

  #[tokio::test]
  async fn invalid_questions_are_rejected() {
    let state = AppState::for_tests().await;
    let base = || CreateQuestionRequest {
      category_id: Some("misc".into()),
      question: Some("Q?".into()),
      options: vec!["a".into(), "b".into()],
      correct_index: Some(0),
      ..Default::default()
    };
    assert!(create_question(&state, base()).await.is_ok());
    assert!(matches!(
      create_question(&state, CreateQuestionRequest { options: vec!["only".into()], ..base() }).await,
      Err(ApiError::BadRequest(_))
    ));
    assert!(matches!(
      create_question(&state, CreateQuestionRequest { correct_index: Some(2), ..base() }).await,
      Err(ApiError::BadRequest(_))
    ));
    assert!(matches!(
      create_question(&state, CreateQuestionRequest { correct_index: Some(-1), ..base() }).await,
      Err(ApiError::BadRequest(_))
    ));
    assert!(matches!(
      create_question(&state, CreateQuestionRequest { correct_index: None, ..base() }).await,
      Err(ApiError::BadRequest(_))
    ));
  }

  #[tokio::test]
  async fn sync_creates_one_course_per_category() {
    let state = AppState::for_tests().await;
    let courses = sync_courses(&state).await.expect("sync");
    assert_eq!(courses.len(), 4);
    assert!(courses.iter().all(|c| c.question_count == 5));
    assert_eq!(sync_courses(&state).await.expect("resync").len(), 4);

    let cats = categories(&state).await.expect("categories");
    assert_eq!(cats.len(), 4);
    assert!(cats.windows(2).all(|w| w[0].name <= w[1].name));
  }

  #[tokio::test]
  async fn generation_needs_an_llm() {
    let state = AppState::for_tests().await;
    let err = generate_and_save(&state, &admin(), GenerateQuestionRequest::default()).await.unwrap_err();
    assert!(matches!(err, ApiError::Unavailable(_)));
  }

  #[tokio::test]
  async fn missing_session_is_not_found() {
    let state = AppState::for_tests().await;
    assert!(matches!(delete_session(&state, "nope").await, Err(ApiError::NotFound(_))));
  }
}
