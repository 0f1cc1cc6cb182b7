//! Persistence behind one trait so the services never care which backend is live.
//!
//! Two backends share the same data model:
//!   - `MemoryStore`: document-style collections in `RwLock<HashMap>`s (default, tests)
//!   - `SqliteStore`: relational tables via sqlx (when `DATABASE_URL` is set)

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::domain::{Course, Difficulty, Question, Role, Session, TestResult, User};

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
  #[error("not found")]
  NotFound,

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("backend error: {0}")]
  Backend(String),

  #[error("serialization error: {0}")]
  Serialization(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Optional question filters; `None` matches everything.
#[derive(Clone, Debug, Default)]
pub struct QuestionFilter {
  pub category_id: Option<String>,
  pub difficulty: Option<Difficulty>,
}

impl QuestionFilter {
  pub fn matches(&self, q: &Question) -> bool {
    self.category_id.as_deref().map_or(true, |c| q.category_id == c)
      && self.difficulty.map_or(true, |d| q.difficulty == d)
  }
}

#[async_trait]
pub trait Store: Send + Sync {
  // Users
  async fn insert_user(&self, user: &User) -> StoreResult<()>;
  async fn get_user(&self, id: &str) -> StoreResult<Option<User>>;
  async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
  /// Newest first.
  async fn list_users(&self, role: Option<Role>) -> StoreResult<Vec<User>>;
  async fn update_user(&self, user: &User) -> StoreResult<()>;
  async fn delete_user(&self, id: &str) -> StoreResult<()>;

  // Questions
  async fn insert_question(&self, question: &Question) -> StoreResult<()>;
  async fn get_question(&self, id: &str) -> StoreResult<Option<Question>>;
  /// Sorted by (category, difficulty).
  async fn list_questions(&self, filter: &QuestionFilter) -> StoreResult<Vec<Question>>;
  async fn delete_question(&self, id: &str) -> StoreResult<()>;
  /// One uniformly random question matching `filter` whose id is not in `exclude`.
  async fn sample_question(&self, filter: &QuestionFilter, exclude: &[String]) -> StoreResult<Option<Question>>;

  // Training sessions
  async fn insert_session(&self, session: &Session) -> StoreResult<()>;
  async fn get_session(&self, id: &str) -> StoreResult<Option<Session>>;
  async fn active_session_for_user(&self, user_id: &str) -> StoreResult<Option<Session>>;
  async fn update_session(&self, session: &Session) -> StoreResult<()>;
  /// Most recently updated first.
  async fn list_sessions_for_user(&self, user_id: &str) -> StoreResult<Vec<Session>>;
  async fn list_sessions(&self) -> StoreResult<Vec<Session>>;
  async fn delete_session(&self, id: &str) -> StoreResult<()>;
  async fn delete_sessions_for_user(&self, user_id: &str) -> StoreResult<u64>;

  // Courses
  async fn insert_course(&self, course: &Course) -> StoreResult<()>;
  async fn get_course(&self, id: &str) -> StoreResult<Option<Course>>;
  async fn find_course_by_category(&self, category_id: &str) -> StoreResult<Option<Course>>;
  /// Newest first.
  async fn list_courses(&self) -> StoreResult<Vec<Course>>;
  async fn update_course(&self, course: &Course) -> StoreResult<()>;
  async fn delete_course(&self, id: &str) -> StoreResult<()>;
  /// Add `delta` to the question count of every course on `category_id`, never below zero.
  async fn adjust_course_count(&self, category_id: &str, delta: i64) -> StoreResult<()>;

  // Static test results
  async fn insert_test_result(&self, result: &TestResult) -> StoreResult<()>;
  /// Newest first, at most `limit`.
  async fn list_test_results(&self, user_id: &str, limit: usize) -> StoreResult<Vec<TestResult>>;
}

pub type DynStore = Arc<dyn Store>;

/// Pick the backend: SQLite when a database URL is configured, memory otherwise.
pub async fn open(database_url: Option<&str>) -> StoreResult<DynStore> {
  match database_url {
    Some(url) => {
      let store = SqliteStore::connect(url).await?;
      info!(target: "cyberlms_backend", backend = "sqlite", "Store ready");
      Ok(Arc::new(store))
    }
    None => {
      info!(target: "cyberlms_backend", backend = "memory", "Store ready (data is lost on restart)");
      Ok(Arc::new(MemoryStore::new()))
    }
  }
}
