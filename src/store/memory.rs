//! In-memory, document-style backend. Each collection is a map behind a tokio `RwLock`.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use rand::seq::SliceRandom;
use tokio::sync::RwLock;

use super::{QuestionFilter, Store, StoreError, StoreResult};
use crate::domain::{Course, Question, Role, Session, TestResult, User};

#[derive(Clone, Default)]
pub struct MemoryStore {
  users: Arc<RwLock<HashMap<String, User>>>,
  questions: Arc<RwLock<HashMap<String, Question>>>,
  sessions: Arc<RwLock<HashMap<String, Session>>>,
  courses: Arc<RwLock<HashMap<String, Course>>>,
  results: Arc<RwLock<Vec<TestResult>>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

fn choose_one(pool: Vec<&Question>) -> Option<Question> {
  pool.choose(&mut rand::thread_rng()).map(|q| (*q).clone())
}

#[async_trait]
impl Store for MemoryStore {
  async fn insert_user(&self, user: &User) -> StoreResult<()> {
    let mut users = self.users.write().await;
    if users.values().any(|u| u.email == user.email) {
      return Err(StoreError::Conflict(format!("email {} already registered", user.email)));
    }
    users.insert(user.id.clone(), user.clone());
    Ok(())
  }

  async fn get_user(&self, id: &str) -> StoreResult<Option<User>> {
    Ok(self.users.read().await.get(id).cloned())
  }

  async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
    Ok(self.users.read().await.values().find(|u| u.email == email).cloned())
  }

  async fn list_users(&self, role: Option<Role>) -> StoreResult<Vec<User>> {
    let mut out: Vec<User> = self
      .users
      .read()
      .await
      .values()
      .filter(|u| role.map_or(true, |r| u.role == r))
      .cloned()
      .collect();
    out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(out)
  }

  async fn update_user(&self, user: &User) -> StoreResult<()> {
    let mut users = self.users.write().await;
    if users.values().any(|u| u.id != user.id && u.email == user.email) {
      return Err(StoreError::Conflict(format!("email {} already registered", user.email)));
    }
    match users.get_mut(&user.id) {
      Some(slot) => {
        *slot = user.clone();
        Ok(())
      }
      None => Err(StoreError::NotFound),
    }
  }

  async fn delete_user(&self, id: &str) -> StoreResult<()> {
    self.users.write().await.remove(id).map(|_| ()).ok_or(StoreError::NotFound)
  }

  async fn insert_question(&self, question: &Question) -> StoreResult<()> {
    let mut questions = self.questions.write().await;
    if questions.values().any(|q| q.external_id == question.external_id) {
      return Err(StoreError::Conflict(format!("question {} already exists", question.external_id)));
    }
    questions.insert(question.id.clone(), question.clone());
    Ok(())
  }

  async fn get_question(&self, id: &str) -> StoreResult<Option<Question>> {
    Ok(self.questions.read().await.get(id).cloned())
  }

  async fn list_questions(&self, filter: &QuestionFilter) -> StoreResult<Vec<Question>> {
    let mut out: Vec<Question> = self
      .questions
      .read()
      .await
      .values()
      .filter(|q| filter.matches(q))
      .cloned()
      .collect();
    out.sort_by(|a, b| {
      (&a.category_id, a.difficulty, &a.external_id).cmp(&(&b.category_id, b.difficulty, &b.external_id))
    });
    Ok(out)
  }

  async fn delete_question(&self, id: &str) -> StoreResult<()> {
    self.questions.write().await.remove(id).map(|_| ()).ok_or(StoreError::NotFound)
  }

  async fn sample_question(&self, filter: &QuestionFilter, exclude: &[String]) -> StoreResult<Option<Question>> {
    let questions = self.questions.read().await;
    let pool: Vec<&Question> = questions
      .values()
      .filter(|q| filter.matches(q) && !exclude.contains(&q.id))
      .collect();
    Ok(choose_one(pool))
  }

  async fn insert_session(&self, session: &Session) -> StoreResult<()> {
    self.sessions.write().await.insert(session.id.clone(), session.clone());
    Ok(())
  }

  async fn get_session(&self, id: &str) -> StoreResult<Option<Session>> {
    Ok(self.sessions.read().await.get(id).cloned())
  }

  async fn active_session_for_user(&self, user_id: &str) -> StoreResult<Option<Session>> {
    Ok(
      self
        .sessions
        .read()
        .await
        .values()
        .filter(|s| s.user_id == user_id && s.active)
        .max_by_key(|s| s.updated_at)
        .cloned(),
    )
  }

  async fn update_session(&self, session: &Session) -> StoreResult<()> {
    match self.sessions.write().await.get_mut(&session.id) {
      Some(slot) => {
        *slot = session.clone();
        Ok(())
      }
      None => Err(StoreError::NotFound),
    }
  }

  async fn list_sessions_for_user(&self, user_id: &str) -> StoreResult<Vec<Session>> {
    let mut out: Vec<Session> = self
      .sessions
      .read()
      .await
      .values()
      .filter(|s| s.user_id == user_id)
      .cloned()
      .collect();
    out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    Ok(out)
  }

  async fn list_sessions(&self) -> StoreResult<Vec<Session>> {
    let mut out: Vec<Session> = self.sessions.read().await.values().cloned().collect();
    out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    Ok(out)
  }

  async fn delete_session(&self, id: &str) -> StoreResult<()> {
    self.sessions.write().await.remove(id).map(|_| ()).ok_or(StoreError::NotFound)
  }

  async fn delete_sessions_for_user(&self, user_id: &str) -> StoreResult<u64> {
    let mut sessions = self.sessions.write().await;
    let before = sessions.len();
    sessions.retain(|_, s| s.user_id != user_id);
    Ok((before - sessions.len()) as u64)
  }

  async fn insert_course(&self, course: &Course) -> StoreResult<()> {
    let mut courses = self.courses.write().await;
    if courses.values().any(|c| c.category_id == course.category_id) {
      return Err(StoreError::Conflict(format!("course for {} already exists", course.category_id)));
    }
    courses.insert(course.id.clone(), course.clone());
    Ok(())
  }

  async fn get_course(&self, id: &str) -> StoreResult<Option<Course>> {
    Ok(self.courses.read().await.get(id).cloned())
  }

  async fn find_course_by_category(&self, category_id: &str) -> StoreResult<Option<Course>> {
    Ok(self.courses.read().await.values().find(|c| c.category_id == category_id).cloned())
  }

  async fn list_courses(&self) -> StoreResult<Vec<Course>> {
    let mut out: Vec<Course> = self.courses.read().await.values().cloned().collect();
    out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(out)
  }

  async fn update_course(&self, course: &Course) -> StoreResult<()> {
    let mut courses = self.courses.write().await;
    if courses.values().any(|c| c.id != course.id && c.category_id == course.category_id) {
      return Err(StoreError::Conflict(format!("course for {} already exists", course.category_id)));
    }
    match courses.get_mut(&course.id) {
      Some(slot) => {
        *slot = course.clone();
        Ok(())
      }
      None => Err(StoreError::NotFound),
    }
  }

  async fn delete_course(&self, id: &str) -> StoreResult<()> {
    self.courses.write().await.remove(id).map(|_| ()).ok_or(StoreError::NotFound)
  }

  async fn adjust_course_count(&self, category_id: &str, delta: i64) -> StoreResult<()> {
    for c in self.courses.write().await.values_mut().filter(|c| c.category_id == category_id) {
      c.question_count = (c.question_count + delta).max(0);
    }
    Ok(())
  }

  async fn insert_test_result(&self, result: &TestResult) -> StoreResult<()> {
    self.results.write().await.push(result.clone());
    Ok(())
  }

  async fn list_test_results(&self, user_id: &str, limit: usize) -> StoreResult<Vec<TestResult>> {
    let mut out: Vec<TestResult> = self
      .results
      .read()
      .await
      .iter()
      .filter(|r| r.user_id == user_id)
      .cloned()
      .collect();
    out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    out.truncate(limit);
    Ok(out)
  }
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, Utc};

  use super::*;
  use crate::domain::{Difficulty, UserStats};

  fn question(id: &str, category: &str, level: i64) -> Question {
    Question {
      id: id.into(),
      external_id: format!("ext-{id}"),
      category_id: category.into(),
      category_name: category.to_uppercase(),
      difficulty: Difficulty::new(level),
      text: format!("Question {id}?"),
      options: vec!["a".into(), "b".into()],
      correct_index: 0,
      explanation: "because".into(),
      created_at: Utc::now(),
    }
  }

  fn user(id: &str, email: &str) -> User {
    let now = Utc::now();
    User {
      id: id.into(),
      name: id.into(),
      email: email.into(),
      password_hash: "h".into(),
      role: Role::Learner,
      stats: UserStats::default(),
      created_at: now,
      updated_at: now,
    }
  }

  #[tokio::test]
  async fn duplicate_email_is_a_conflict() {
    let store = MemoryStore::new();
    store.insert_user(&user("a", "x@example.com")).await.expect("first");
    let err = store.insert_user(&user("b", "x@example.com")).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
  }

  #[tokio::test]
  async fn sample_respects_filter_and_exclusions() {
    let store = MemoryStore::new();
    store.insert_question(&question("q1", "phish", 1)).await.unwrap();
    store.insert_question(&question("q2", "phish", 1)).await.unwrap();
    store.insert_question(&question("q3", "phish", 2)).await.unwrap();
    store.insert_question(&question("q4", "email", 1)).await.unwrap();

    let filter = QuestionFilter { category_id: Some("phish".into()), difficulty: Some(Difficulty::MIN) };
    for _ in 0..20 {
      let q = store.sample_question(&filter, &["q1".to_string()]).await.unwrap().expect("one left");
      assert_eq!(q.id, "q2");
    }
    let none = store.sample_question(&filter, &["q1".to_string(), "q2".to_string()]).await.unwrap();
    assert!(none.is_none());
  }

  #[tokio::test]
  async fn sessions_are_listed_newest_first_and_deleted_per_user() {
    let store = MemoryStore::new();
    let now = Utc::now();
    let mut older = Session::new("s1".into(), "u1".into(), None, now - Duration::minutes(5));
    older.active = false;
    let newer = Session::new("s2".into(), "u1".into(), None, now);
    let other = Session::new("s3".into(), "u2".into(), None, now);
    for s in [&older, &newer, &other] {
      store.insert_session(s).await.unwrap();
    }

    let listed = store.list_sessions_for_user("u1").await.unwrap();
    assert_eq!(listed.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(), vec!["s2", "s1"]);
    assert_eq!(store.active_session_for_user("u1").await.unwrap().map(|s| s.id), Some("s2".into()));

    assert_eq!(store.delete_sessions_for_user("u1").await.unwrap(), 2);
    assert_eq!(store.list_sessions().await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn course_count_never_goes_negative() {
    let store = MemoryStore::new();
    let course = Course {
      id: "c1".into(),
      name: "Phishing".into(),
      description: String::new(),
      category_id: "phish".into(),
      question_count: 1,
      created_at: Utc::now(),
    };
    store.insert_course(&course).await.unwrap();
    store.adjust_course_count("phish", -1).await.unwrap();
    store.adjust_course_count("phish", -1).await.unwrap();
    assert_eq!(store.get_course("c1").await.unwrap().unwrap().question_count, 0);
  }
}
