//! Relational backend on SQLite via sqlx.
//!
//! Option lists and per-session arrays are JSON text columns; timestamps are RFC 3339 text.

use std::{str::FromStr, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
  sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
  Row, SqlitePool,
};

use super::{QuestionFilter, Store, StoreError, StoreResult};
use crate::domain::{AnswerRecord, Course, Difficulty, Question, Role, Session, TestResult, User, UserStats};

#[derive(Clone)]
pub struct SqliteStore {
  pool: SqlitePool,
}

fn backend(e: sqlx::Error) -> StoreError {
  if let sqlx::Error::Database(db) = &e {
    if db.is_unique_violation() {
      return StoreError::Conflict(db.message().to_string());
    }
  }
  StoreError::Backend(e.to_string())
}

fn ser<E: std::fmt::Display>(e: E) -> StoreError {
  StoreError::Serialization(e.to_string())
}

fn not_found_if_zero(rows: u64) -> StoreResult<()> {
  if rows == 0 { Err(StoreError::NotFound) } else { Ok(()) }
}

// Every connection to a plain `:memory:` database is a separate database, and the
// database is gone once its last connection closes: keep exactly one, forever.
fn pool_options(in_memory: bool) -> SqlitePoolOptions {
  let opts = SqlitePoolOptions::new().acquire_timeout(Duration::from_secs(5));
  if in_memory {
    opts.max_connections(1).min_connections(1).idle_timeout(None).max_lifetime(None)
  } else {
    opts.max_connections(5)
  }
}

impl SqliteStore {
  /// Connect and bring the schema up to date.
  pub async fn connect(database_url: &str) -> StoreResult<Self> {
    let options = SqliteConnectOptions::from_str(database_url)
      .map_err(backend)?
      .create_if_missing(true)
      .foreign_keys(true)
      .busy_timeout(Duration::from_secs(5));

    let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");
    let pool = pool_options(in_memory)
      .connect_with(options)
      .await
      .map_err(backend)?;

    let store = Self { pool };
    store.migrate().await?;
    Ok(store)
  }

  pub fn pool(&self) -> &SqlitePool {
    &self.pool
  }

  async fn migrate(&self) -> StoreResult<()> {
    sqlx::query(
      r"
        CREATE TABLE IF NOT EXISTS schema_migrations (
          version INTEGER PRIMARY KEY,
          applied_at TEXT NOT NULL
        );
      ",
    )
    .execute(&self.pool)
    .await
    .map_err(backend)?;

    let applied = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = 1")
      .fetch_optional(&self.pool)
      .await
      .map_err(backend)?
      .is_some();
    if applied {
      return Ok(());
    }

    let mut tx = self.pool.begin().await.map_err(backend)?;
    let statements = [
      r"
        CREATE TABLE IF NOT EXISTS users (
          id TEXT PRIMARY KEY,
          name TEXT NOT NULL,
          email TEXT NOT NULL UNIQUE,
          password_hash TEXT NOT NULL,
          role TEXT NOT NULL DEFAULT 'learner',
          total_score INTEGER NOT NULL DEFAULT 0,
          accuracy INTEGER NOT NULL DEFAULT 0,
          streak INTEGER NOT NULL DEFAULT 0,
          tests_completed INTEGER NOT NULL DEFAULT 0,
          created_at TEXT NOT NULL,
          updated_at TEXT NOT NULL
        );
      ",
      r"
        CREATE TABLE IF NOT EXISTS questions (
          id TEXT PRIMARY KEY,
          external_id TEXT NOT NULL UNIQUE,
          category_id TEXT NOT NULL,
          category_name TEXT NOT NULL,
          difficulty INTEGER NOT NULL CHECK (difficulty BETWEEN 1 AND 5),
          text TEXT NOT NULL,
          options TEXT NOT NULL,
          correct_index INTEGER NOT NULL CHECK (correct_index >= 0),
          explanation TEXT NOT NULL,
          created_at TEXT NOT NULL
        );
      ",
      "CREATE INDEX IF NOT EXISTS idx_questions_pick ON questions (difficulty, category_id);",
      r"
        CREATE TABLE IF NOT EXISTS sessions (
          id TEXT PRIMARY KEY,
          user_id TEXT NOT NULL,
          active INTEGER NOT NULL,
          current_difficulty INTEGER NOT NULL CHECK (current_difficulty BETWEEN 1 AND 5),
          correct_streak INTEGER NOT NULL DEFAULT 0,
          total_asked INTEGER NOT NULL DEFAULT 0,
          total_correct INTEGER NOT NULL DEFAULT 0,
          asked_question_ids TEXT NOT NULL,
          answers TEXT NOT NULL,
          last_question TEXT,
          preferred_category TEXT,
          created_at TEXT NOT NULL,
          updated_at TEXT NOT NULL
        );
      ",
      "CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions (user_id, active);",
      r"
        CREATE TABLE IF NOT EXISTS courses (
          id TEXT PRIMARY KEY,
          name TEXT NOT NULL,
          description TEXT NOT NULL,
          category_id TEXT NOT NULL UNIQUE,
          question_count INTEGER NOT NULL DEFAULT 0,
          created_at TEXT NOT NULL
        );
      ",
      r"
        CREATE TABLE IF NOT EXISTS test_results (
          id TEXT PRIMARY KEY,
          user_id TEXT NOT NULL,
          category TEXT NOT NULL,
          score INTEGER NOT NULL,
          total_questions INTEGER NOT NULL,
          correct_answers INTEGER NOT NULL,
          created_at TEXT NOT NULL
        );
      ",
      "CREATE INDEX IF NOT EXISTS idx_test_results_user ON test_results (user_id, created_at);",
    ];
    for stmt in statements {
      sqlx::query(stmt).execute(&mut *tx).await.map_err(backend)?;
    }
    sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (1, ?1)")
      .bind(Utc::now())
      .execute(&mut *tx)
      .await
      .map_err(backend)?;
    tx.commit().await.map_err(backend)?;
    Ok(())
  }
}

// --- Row mapping ---

const USER_COLS: &str =
  "id, name, email, password_hash, role, total_score, accuracy, streak, tests_completed, created_at, updated_at";
const QUESTION_COLS: &str =
  "id, external_id, category_id, category_name, difficulty, text, options, correct_index, explanation, created_at";
const SESSION_COLS: &str = "id, user_id, active, current_difficulty, correct_streak, total_asked, total_correct, \
   asked_question_ids, answers, last_question, preferred_category, created_at, updated_at";
const COURSE_COLS: &str = "id, name, description, category_id, question_count, created_at";

fn user_from_row(row: &SqliteRow) -> StoreResult<User> {
  let role: String = row.try_get("role").map_err(ser)?;
  Ok(User {
    id: row.try_get("id").map_err(ser)?,
    name: row.try_get("name").map_err(ser)?,
    email: row.try_get("email").map_err(ser)?,
    password_hash: row.try_get("password_hash").map_err(ser)?,
    role: Role::parse(&role).ok_or_else(|| ser(format!("unknown role {role}")))?,
    stats: UserStats {
      total_score: row.try_get("total_score").map_err(ser)?,
      accuracy: row.try_get("accuracy").map_err(ser)?,
      streak: row.try_get("streak").map_err(ser)?,
      tests_completed: row.try_get("tests_completed").map_err(ser)?,
    },
    created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(ser)?,
    updated_at: row.try_get::<DateTime<Utc>, _>("updated_at").map_err(ser)?,
  })
}

fn question_from_row(row: &SqliteRow) -> StoreResult<Question> {
  let options: String = row.try_get("options").map_err(ser)?;
  let correct_index: i64 = row.try_get("correct_index").map_err(ser)?;
  Ok(Question {
    id: row.try_get("id").map_err(ser)?,
    external_id: row.try_get("external_id").map_err(ser)?,
    category_id: row.try_get("category_id").map_err(ser)?,
    category_name: row.try_get("category_name").map_err(ser)?,
    difficulty: Difficulty::new(row.try_get("difficulty").map_err(ser)?),
    text: row.try_get("text").map_err(ser)?,
    options: serde_json::from_str(&options).map_err(ser)?,
    correct_index: usize::try_from(correct_index).map_err(ser)?,
    explanation: row.try_get("explanation").map_err(ser)?,
    created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(ser)?,
  })
}

fn session_from_row(row: &SqliteRow) -> StoreResult<Session> {
  let asked: String = row.try_get("asked_question_ids").map_err(ser)?;
  let answers: String = row.try_get("answers").map_err(ser)?;
  let count = |col: &str| -> StoreResult<u32> {
    let v: i64 = row.try_get(col).map_err(ser)?;
    u32::try_from(v).map_err(ser)
  };
  Ok(Session {
    id: row.try_get("id").map_err(ser)?,
    user_id: row.try_get("user_id").map_err(ser)?,
    active: row.try_get("active").map_err(ser)?,
    current_difficulty: Difficulty::new(row.try_get("current_difficulty").map_err(ser)?),
    correct_streak: count("correct_streak")?,
    total_asked: count("total_asked")?,
    total_correct: count("total_correct")?,
    asked_question_ids: serde_json::from_str(&asked).map_err(ser)?,
    answers: serde_json::from_str::<Vec<AnswerRecord>>(&answers).map_err(ser)?,
    last_question: row.try_get("last_question").map_err(ser)?,
    preferred_category: row.try_get("preferred_category").map_err(ser)?,
    created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(ser)?,
    updated_at: row.try_get::<DateTime<Utc>, _>("updated_at").map_err(ser)?,
  })
}

fn course_from_row(row: &SqliteRow) -> StoreResult<Course> {
  Ok(Course {
    id: row.try_get("id").map_err(ser)?,
    name: row.try_get("name").map_err(ser)?,
    description: row.try_get("description").map_err(ser)?,
    category_id: row.try_get("category_id").map_err(ser)?,
    question_count: row.try_get("question_count").map_err(ser)?,
    created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(ser)?,
  })
}

fn test_result_from_row(row: &SqliteRow) -> StoreResult<TestResult> {
  Ok(TestResult {
    id: row.try_get("id").map_err(ser)?,
    user_id: row.try_get("user_id").map_err(ser)?,
    category: row.try_get("category").map_err(ser)?,
    score: row.try_get("score").map_err(ser)?,
    total_questions: row.try_get("total_questions").map_err(ser)?,
    correct_answers: row.try_get("correct_answers").map_err(ser)?,
    created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(ser)?,
  })
}

fn collect<T>(rows: Vec<SqliteRow>, map: fn(&SqliteRow) -> StoreResult<T>) -> StoreResult<Vec<T>> {
  rows.iter().map(map).collect()
}

#[async_trait]
impl Store for SqliteStore {
  async fn insert_user(&self, user: &User) -> StoreResult<()> {
    sqlx::query(
      r"
      INSERT INTO users (id, name, email, password_hash, role, total_score, accuracy, streak, tests_completed, created_at, updated_at)
      VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
      ",
    )
    .bind(&user.id)
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.role.as_str())
    .bind(user.stats.total_score)
    .bind(user.stats.accuracy)
    .bind(user.stats.streak)
    .bind(user.stats.tests_completed)
    .bind(user.created_at)
    .bind(user.updated_at)
    .execute(&self.pool)
    .await
    .map_err(backend)?;
    Ok(())
  }

  async fn get_user(&self, id: &str) -> StoreResult<Option<User>> {
    let row = sqlx::query(&format!("SELECT {USER_COLS} FROM users WHERE id = ?1"))
      .bind(id)
      .fetch_optional(&self.pool)
      .await
      .map_err(backend)?;
    row.as_ref().map(user_from_row).transpose()
  }

  async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
    let row = sqlx::query(&format!("SELECT {USER_COLS} FROM users WHERE email = ?1"))
      .bind(email)
      .fetch_optional(&self.pool)
      .await
      .map_err(backend)?;
    row.as_ref().map(user_from_row).transpose()
  }

  async fn list_users(&self, role: Option<Role>) -> StoreResult<Vec<User>> {
    let rows = sqlx::query(&format!(
      "SELECT {USER_COLS} FROM users WHERE (?1 IS NULL OR role = ?1) ORDER BY created_at DESC"
    ))
    .bind(role.map(|r| r.as_str()))
    .fetch_all(&self.pool)
    .await
    .map_err(backend)?;
    collect(rows, user_from_row)
  }

  async fn update_user(&self, user: &User) -> StoreResult<()> {
    let res = sqlx::query(
      r"
      UPDATE users SET name = ?2, email = ?3, password_hash = ?4, role = ?5, total_score = ?6,
        accuracy = ?7, streak = ?8, tests_completed = ?9, updated_at = ?10
      WHERE id = ?1
      ",
    )
    .bind(&user.id)
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.role.as_str())
    .bind(user.stats.total_score)
    .bind(user.stats.accuracy)
    .bind(user.stats.streak)
    .bind(user.stats.tests_completed)
    .bind(user.updated_at)
    .execute(&self.pool)
    .await
    .map_err(backend)?;
    not_found_if_zero(res.rows_affected())
  }

  async fn delete_user(&self, id: &str) -> StoreResult<()> {
    let res = sqlx::query("DELETE FROM users WHERE id = ?1")
      .bind(id)
      .execute(&self.pool)
      .await
      .map_err(backend)?;
    not_found_if_zero(res.rows_affected())
  }

  async fn insert_question(&self, q: &Question) -> StoreResult<()> {
    let options = serde_json::to_string(&q.options).map_err(ser)?;
    let correct_index = i64::try_from(q.correct_index).map_err(ser)?;
    sqlx::query(
      r"
      INSERT INTO questions (id, external_id, category_id, category_name, difficulty, text, options, correct_index, explanation, created_at)
      VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
      ",
    )
    .bind(&q.id)
    .bind(&q.external_id)
    .bind(&q.category_id)
    .bind(&q.category_name)
    .bind(i64::from(q.difficulty))
    .bind(&q.text)
    .bind(options)
    .bind(correct_index)
    .bind(&q.explanation)
    .bind(q.created_at)
    .execute(&self.pool)
    .await
    .map_err(backend)?;
    Ok(())
  }

  async fn get_question(&self, id: &str) -> StoreResult<Option<Question>> {
    let row = sqlx::query(&format!("SELECT {QUESTION_COLS} FROM questions WHERE id = ?1"))
      .bind(id)
      .fetch_optional(&self.pool)
      .await
      .map_err(backend)?;
    row.as_ref().map(question_from_row).transpose()
  }

  async fn list_questions(&self, filter: &QuestionFilter) -> StoreResult<Vec<Question>> {
    let rows = sqlx::query(&format!(
      r"
      SELECT {QUESTION_COLS} FROM questions
      WHERE (?1 IS NULL OR category_id = ?1) AND (?2 IS NULL OR difficulty = ?2)
      ORDER BY category_id ASC, difficulty ASC, external_id ASC
      "
    ))
    .bind(filter.category_id.as_deref())
    .bind(filter.difficulty.map(i64::from))
    .fetch_all(&self.pool)
    .await
    .map_err(backend)?;
    collect(rows, question_from_row)
  }

  async fn delete_question(&self, id: &str) -> StoreResult<()> {
    let res = sqlx::query("DELETE FROM questions WHERE id = ?1")
      .bind(id)
      .execute(&self.pool)
      .await
      .map_err(backend)?;
    not_found_if_zero(res.rows_affected())
  }

  async fn sample_question(&self, filter: &QuestionFilter, exclude: &[String]) -> StoreResult<Option<Question>> {
    let exclude_json = serde_json::to_string(exclude).map_err(ser)?;
    let row = sqlx::query(&format!(
      r"
      SELECT {QUESTION_COLS} FROM questions
      WHERE (?1 IS NULL OR category_id = ?1) AND (?2 IS NULL OR difficulty = ?2)
        AND id NOT IN (SELECT value FROM json_each(?3))
      ORDER BY RANDOM()
      LIMIT 1
      "
    ))
    .bind(filter.category_id.as_deref())
    .bind(filter.difficulty.map(i64::from))
    .bind(exclude_json)
    .fetch_optional(&self.pool)
    .await
    .map_err(backend)?;
    row.as_ref().map(question_from_row).transpose()
  }

  async fn insert_session(&self, s: &Session) -> StoreResult<()> {
    sqlx::query(&format!(
      "INSERT INTO sessions ({SESSION_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
    ))
    .bind(&s.id)
    .bind(&s.user_id)
    .bind(s.active)
    .bind(i64::from(s.current_difficulty))
    .bind(i64::from(s.correct_streak))
    .bind(i64::from(s.total_asked))
    .bind(i64::from(s.total_correct))
    .bind(serde_json::to_string(&s.asked_question_ids).map_err(ser)?)
    .bind(serde_json::to_string(&s.answers).map_err(ser)?)
    .bind(s.last_question.as_deref())
    .bind(s.preferred_category.as_deref())
    .bind(s.created_at)
    .bind(s.updated_at)
    .execute(&self.pool)
    .await
    .map_err(backend)?;
    Ok(())
  }

  async fn get_session(&self, id: &str) -> StoreResult<Option<Session>> {
    let row = sqlx::query(&format!("SELECT {SESSION_COLS} FROM sessions WHERE id = ?1"))
      .bind(id)
      .fetch_optional(&self.pool)
      .await
      .map_err(backend)?;
    row.as_ref().map(session_from_row).transpose()
  }

  async fn active_session_for_user(&self, user_id: &str) -> StoreResult<Option<Session>> {
    let row = sqlx::query(&format!(
      "SELECT {SESSION_COLS} FROM sessions WHERE user_id = ?1 AND active = 1 ORDER BY updated_at DESC LIMIT 1"
    ))
    .bind(user_id)
    .fetch_optional(&self.pool)
    .await
    .map_err(backend)?;
    row.as_ref().map(session_from_row).transpose()
  }

  async fn update_session(&self, s: &Session) -> StoreResult<()> {
    let res = sqlx::query(
      r"
      UPDATE sessions SET active = ?2, current_difficulty = ?3, correct_streak = ?4, total_asked = ?5,
        total_correct = ?6, asked_question_ids = ?7, answers = ?8, last_question = ?9,
        preferred_category = ?10, updated_at = ?11
      WHERE id = ?1
      ",
    )
    .bind(&s.id)
    .bind(s.active)
    .bind(i64::from(s.current_difficulty))
    .bind(i64::from(s.correct_streak))
    .bind(i64::from(s.total_asked))
    .bind(i64::from(s.total_correct))
    .bind(serde_json::to_string(&s.asked_question_ids).map_err(ser)?)
    .bind(serde_json::to_string(&s.answers).map_err(ser)?)
    .bind(s.last_question.as_deref())
    .bind(s.preferred_category.as_deref())
    .bind(s.updated_at)
    .execute(&self.pool)
    .await
    .map_err(backend)?;
    not_found_if_zero(res.rows_affected())
  }

  async fn list_sessions_for_user(&self, user_id: &str) -> StoreResult<Vec<Session>> {
    let rows = sqlx::query(&format!(
      "SELECT {SESSION_COLS} FROM sessions WHERE user_id = ?1 ORDER BY updated_at DESC"
    ))
    .bind(user_id)
    .fetch_all(&self.pool)
    .await
    .map_err(backend)?;
    collect(rows, session_from_row)
  }

  async fn list_sessions(&self) -> StoreResult<Vec<Session>> {
    let rows = sqlx::query(&format!("SELECT {SESSION_COLS} FROM sessions ORDER BY updated_at DESC"))
      .fetch_all(&self.pool)
      .await
      .map_err(backend)?;
    collect(rows, session_from_row)
  }

  async fn delete_session(&self, id: &str) -> StoreResult<()> {
    let res = sqlx::query("DELETE FROM sessions WHERE id = ?1")
      .bind(id)
      .execute(&self.pool)
      .await
      .map_err(backend)?;
    not_found_if_zero(res.rows_affected())
  }

  async fn delete_sessions_for_user(&self, user_id: &str) -> StoreResult<u64> {
    let res = sqlx::query("DELETE FROM sessions WHERE user_id = ?1")
      .bind(user_id)
      .execute(&self.pool)
      .await
      .map_err(backend)?;
    Ok(res.rows_affected())
  }

  async fn insert_course(&self, c: &Course) -> StoreResult<()> {
    sqlx::query(&format!("INSERT INTO courses ({COURSE_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"))
      .bind(&c.id)
      .bind(&c.name)
      .bind(&c.description)
      .bind(&c.category_id)
      .bind(c.question_count)
      .bind(c.created_at)
      .execute(&self.pool)
      .await
      .map_err(backend)?;
    Ok(())
  }

  async fn get_course(&self, id: &str) -> StoreResult<Option<Course>> {
    let row = sqlx::query(&format!("SELECT {COURSE_COLS} FROM courses WHERE id = ?1"))
      .bind(id)
      .fetch_optional(&self.pool)
      .await
      .map_err(backend)?;
    row.as_ref().map(course_from_row).transpose()
  }

  async fn find_course_by_category(&self, category_id: &str) -> StoreResult<Option<Course>> {
    let row = sqlx::query(&format!("SELECT {COURSE_COLS} FROM courses WHERE category_id = ?1"))
      .bind(category_id)
      .fetch_optional(&self.pool)
      .await
      .map_err(backend)?;
    row.as_ref().map(course_from_row).transpose()
  }

  async fn list_courses(&self) -> StoreResult<Vec<Course>> {
    let rows = sqlx::query(&format!("SELECT {COURSE_COLS} FROM courses ORDER BY created_at DESC"))
      .fetch_all(&self.pool)
      .await
      .map_err(backend)?;
    collect(rows, course_from_row)
  }

  async fn update_course(&self, c: &Course) -> StoreResult<()> {
    let res = sqlx::query(
      "UPDATE courses SET name = ?2, description = ?3, category_id = ?4, question_count = ?5 WHERE id = ?1",
    )
    .bind(&c.id)
    .bind(&c.name)
    .bind(&c.description)
    .bind(&c.category_id)
    .bind(c.question_count)
    .execute(&self.pool)
    .await
    .map_err(backend)?;
    not_found_if_zero(res.rows_affected())
  }

  async fn delete_course(&self, id: &str) -> StoreResult<()> {
    let res = sqlx::query("DELETE FROM courses WHERE id = ?1")
      .bind(id)
      .execute(&self.pool)
      .await
      .map_err(backend)?;
    not_found_if_zero(res.rows_affected())
  }

  async fn adjust_course_count(&self, category_id: &str, delta: i64) -> StoreResult<()> {
    sqlx::query("UPDATE courses SET question_count = MAX(question_count + ?2, 0) WHERE category_id = ?1")
      .bind(category_id)
      .bind(delta)
      .execute(&self.pool)
      .await
      .map_err(backend)?;
    Ok(())
  }

  async fn insert_test_result(&self, r: &TestResult) -> StoreResult<()> {
    sqlx::query(
      r"
      INSERT INTO test_results (id, user_id, category, score, total_questions, correct_answers, created_at)
      VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
      ",
    )
    .bind(&r.id)
    .bind(&r.user_id)
    .bind(&r.category)
    .bind(r.score)
    .bind(r.total_questions)
    .bind(r.correct_answers)
    .bind(r.created_at)
    .execute(&self.pool)
    .await
    .map_err(backend)?;
    Ok(())
  }

  async fn list_test_results(&self, user_id: &str, limit: usize) -> StoreResult<Vec<TestResult>> {
    let rows = sqlx::query(
      r"
      SELECT id, user_id, category, score, total_questions, correct_answers, created_at
      FROM test_results WHERE user_id = ?1
      ORDER BY created_at DESC
      LIMIT ?2
      ",
    )
    .bind(user_id)
    .bind(i64::try_from(limit).map_err(ser)?)
    .fetch_all(&self.pool)
    .await
    .map_err(backend)?;
    collect(rows, test_result_from_row)
  }
}

#[cfg(test)]
mod tests {
  use chrono::Duration as ChronoDuration;

  use super::*;

  async fn store() -> SqliteStore {
    SqliteStore::connect("sqlite::memory:").await.expect("connect")
  }

  fn question(id: &str, category: &str, level: i64) -> Question {
    Question {
      id: id.into(),
      external_id: format!("ext-{id}"),
      category_id: category.into(),
      category_name: "Phishing".into(),
      difficulty: Difficulty::new(level),
      text: "Which link is suspicious?".into(),
      options: vec!["paypa1.com".into(), "paypal.com".into(), "none".into()],
      correct_index: 0,
      explanation: "Digit one instead of the letter l.".into(),
      created_at: Utc::now(),
    }
  }

  #[test]
  fn store_is_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<SqliteStore>();
  }

  #[test]
  fn memory_pool_never_recycles_its_connection() {
    let mem = pool_options(true);
    assert_eq!(mem.get_max_connections(), 1);
    assert_eq!(mem.get_min_connections(), 1);
    assert_eq!(mem.get_idle_timeout(), None);
    assert_eq!(mem.get_max_lifetime(), None);

    let file = pool_options(false);
    assert_eq!(file.get_max_connections(), 5);
    assert!(file.get_idle_timeout().is_some());
  }

  #[tokio::test]
  async fn migration_is_idempotent() {
    let s = store().await;
    s.migrate().await.expect("second migrate");
  }

  #[tokio::test]
  async fn user_round_trip_and_unique_email() {
    let s = store().await;
    let now = Utc::now();
    let mut u = User {
      id: "u1".into(),
      name: "Linus".into(),
      email: "linus@example.com".into(),
      password_hash: "hash".into(),
      role: Role::Learner,
      stats: UserStats::default(),
      created_at: now,
      updated_at: now,
    };
    s.insert_user(&u).await.expect("insert");
    let mut dup = u.clone();
    dup.id = "u2".into();
    assert!(matches!(s.insert_user(&dup).await, Err(StoreError::Conflict(_))));

    u.role = Role::Admin;
    u.stats.tests_completed = 3;
    s.update_user(&u).await.expect("update");
    let fetched = s.find_user_by_email("linus@example.com").await.unwrap().expect("found");
    assert_eq!(fetched.role, Role::Admin);
    assert_eq!(fetched.stats.tests_completed, 3);
    assert_eq!(s.list_users(Some(Role::Learner)).await.unwrap().len(), 0);
  }

  #[tokio::test]
  async fn question_options_survive_json_column() {
    let s = store().await;
    s.insert_question(&question("q1", "phish", 2)).await.unwrap();
    let q = s.get_question("q1").await.unwrap().expect("q1");
    assert_eq!(q.options.len(), 3);
    assert_eq!(q.difficulty.value(), 2);
  }

  #[tokio::test]
  async fn sample_excludes_asked_ids() {
    let s = store().await;
    s.insert_question(&question("q1", "phish", 1)).await.unwrap();
    s.insert_question(&question("q2", "phish", 1)).await.unwrap();
    let filter = QuestionFilter { category_id: None, difficulty: Some(Difficulty::MIN) };
    let picked = s.sample_question(&filter, &["q2".to_string()]).await.unwrap().expect("pick");
    assert_eq!(picked.id, "q1");
    let none = s
      .sample_question(&filter, &["q1".to_string(), "q2".to_string()])
      .await
      .unwrap();
    assert!(none.is_none());
  }

  #[tokio::test]
  async fn session_arrays_round_trip() {
    let s = store().await;
    let now = Utc::now();
    let mut session = Session::new("s1".into(), "u1".into(), Some("phish".into()), now);
    s.insert_session(&session).await.unwrap();
    session.register_asked("q1");
    session.answers.push(AnswerRecord {
      question_id: "q1".into(),
      selected_index: 1,
      was_correct: false,
      difficulty: Difficulty::MIN,
      timestamp: now,
    });
    session.updated_at = now + ChronoDuration::seconds(1);
    s.update_session(&session).await.unwrap();

    let active = s.active_session_for_user("u1").await.unwrap().expect("active");
    assert_eq!(active.asked_question_ids, vec!["q1".to_string()]);
    assert_eq!(active.answers.len(), 1);
    assert_eq!(active.last_question.as_deref(), Some("q1"));
    assert_eq!(active.preferred_category.as_deref(), Some("phish"));
  }

  #[tokio::test]
  async fn test_results_newest_first_with_limit() {
    let s = store().await;
    let now = Utc::now();
    for i in 0..3 {
      let r = TestResult {
        id: format!("r{i}"),
        user_id: "u1".into(),
        category: "Phishing".into(),
        score: 50 + i,
        total_questions: 4,
        correct_answers: 2,
        created_at: now + ChronoDuration::seconds(i),
      };
      s.insert_test_result(&r).await.unwrap();
    }
    let listed = s.list_test_results("u1", 2).await.unwrap();
    assert_eq!(listed.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), vec!["r2", "r1"]);
  }
}
