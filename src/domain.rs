//! Domain models shared by every service: users, questions, sessions, courses, test results.
//!
//! Wire names are camelCase because the SPA consumes these shapes directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who is calling? Learners train, admins manage content and users.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
  #[default]
  #[serde(alias = "student")]
  Learner,
  Admin,
}

impl Role {
  pub fn as_str(&self) -> &'static str {
    match self {
      Role::Learner => "learner",
      Role::Admin => "admin",
    }
  }

  /// Lenient parse used for query strings and admin forms.
  pub fn parse(s: &str) -> Option<Role> {
    match s.trim().to_ascii_lowercase().as_str() {
      "learner" | "student" => Some(Role::Learner),
      "admin" => Some(Role::Admin),
      _ => None,
    }
  }
}

/// Position on the difficulty ladder, always within 1..=5.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(from = "i64", into = "i64")]
pub struct Difficulty(u8);

impl Difficulty {
  pub const MIN: Difficulty = Difficulty(1);
  pub const MAX: Difficulty = Difficulty(5);

  /// Clamp any integer onto the ladder.
  pub fn new(level: i64) -> Self {
    Difficulty(level.clamp(Self::MIN.0 as i64, Self::MAX.0 as i64) as u8)
  }

  /// Map the 1..=10 scale used by imported question banks onto 1..=5.
  pub fn from_ten_point(level: i64) -> Self {
    match level {
      i64::MIN..=2 => Difficulty(1),
      3..=4 => Difficulty(2),
      5..=6 => Difficulty(3),
      7..=8 => Difficulty(4),
      _ => Difficulty(5),
    }
  }

  pub fn value(self) -> u8 { self.0 }

  pub fn up(self) -> Self { Difficulty::new(self.0 as i64 + 1) }

  pub fn down(self) -> Self { Difficulty::new(self.0 as i64 - 1) }

  pub fn label(self) -> &'static str {
    match self.0 {
      1 => "beginner/easy",
      2 => "intermediate",
      3 => "moderate",
      4 => "advanced",
      _ => "expert",
    }
  }
}

impl Default for Difficulty {
  fn default() -> Self { Difficulty::MIN }
}

impl From<i64> for Difficulty {
  fn from(v: i64) -> Self { Difficulty::new(v) }
}

impl From<Difficulty> for i64 {
  fn from(d: Difficulty) -> Self { d.0 as i64 }
}

impl std::fmt::Display for Difficulty {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self.0) }
}

/// Aggregate test statistics kept on the user record.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
  pub total_score: i64,
  pub accuracy: i64,
  pub streak: i64,
  pub tests_completed: i64,
}

impl UserStats {
  /// Coarse learner level shown on the dashboard.
  pub fn level(&self) -> &'static str {
    if self.tests_completed >= 10 && self.accuracy >= 80 {
      "Advanced"
    } else if self.tests_completed >= 3 && self.accuracy >= 60 {
      "Intermediate"
    } else {
      "Beginner"
    }
  }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
  pub id: String,
  pub name: String,
  pub email: String,
  #[serde(skip_serializing, default)]
  pub password_hash: String,
  pub role: Role,
  #[serde(default)]
  pub stats: UserStats,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// Multiple-choice question. `correct_index` points into `options`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
  pub id: String,
  pub external_id: String,
  pub category_id: String,
  pub category_name: String,
  pub difficulty: Difficulty,
  #[serde(rename = "question")]
  pub text: String,
  pub options: Vec<String>,
  pub correct_index: usize,
  pub explanation: String,
  pub created_at: DateTime<Utc>,
}

impl Question {
  /// Structural validation applied before anything is stored.
  pub fn validate(&self) -> Result<(), String> {
    if self.text.trim().is_empty() {
      return Err("question text is required".into());
    }
    if self.options.len() < 2 {
      return Err("a question needs at least 2 options".into());
    }
    if self.correct_index >= self.options.len() {
      return Err(format!("correctIndex {} is out of range", self.correct_index));
    }
    if self.category_id.trim().is_empty() {
      return Err("categoryId is required".into());
    }
    Ok(())
  }

  pub fn correct_option(&self) -> &str {
    self.options.get(self.correct_index).map(String::as_str).unwrap_or_default()
  }
}

/// Category derived by grouping questions.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Category {
  pub id: String,
  pub name: String,
  pub question_count: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
  pub id: String,
  pub name: String,
  pub description: String,
  pub category_id: String,
  pub question_count: i64,
  pub created_at: DateTime<Utc>,
}

/// One graded answer inside a training session.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
  pub question_id: String,
  pub selected_index: usize,
  pub was_correct: bool,
  pub difficulty: Difficulty,
  pub timestamp: DateTime<Utc>,
}

/// A learner's adaptive training session.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
  pub id: String,
  pub user_id: String,
  pub active: bool,
  pub current_difficulty: Difficulty,
  pub correct_streak: u32,
  pub total_asked: u32,
  pub total_correct: u32,
  pub asked_question_ids: Vec<String>,
  pub answers: Vec<AnswerRecord>,
  pub last_question: Option<String>,
  pub preferred_category: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Session {
  pub fn new(id: String, user_id: String, preferred_category: Option<String>, now: DateTime<Utc>) -> Self {
    Self {
      id,
      user_id,
      active: true,
      current_difficulty: Difficulty::MIN,
      correct_streak: 0,
      total_asked: 0,
      total_correct: 0,
      asked_question_ids: Vec::new(),
      answers: Vec::new(),
      last_question: None,
      preferred_category,
      created_at: now,
      updated_at: now,
    }
  }

  /// Record that `question_id` was just served.
  pub fn register_asked(&mut self, question_id: &str) {
    self.last_question = Some(question_id.to_string());
    self.asked_question_ids.push(question_id.to_string());
    self.total_asked += 1;
  }
}

/// Result of a completed static test.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
  pub id: String,
  pub user_id: String,
  pub category: String,
  pub score: i64,
  pub total_questions: i64,
  pub correct_answers: i64,
  pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn difficulty_clamps_to_ladder() {
    assert_eq!(Difficulty::new(0).value(), 1);
    assert_eq!(Difficulty::new(9).value(), 5);
    assert_eq!(Difficulty::MAX.up(), Difficulty::MAX);
    assert_eq!(Difficulty::MIN.down(), Difficulty::MIN);
  }

  #[test]
  fn ten_point_scale_maps_in_pairs() {
    let mapped: Vec<u8> = (1..=10).map(|d| Difficulty::from_ten_point(d).value()).collect();
    assert_eq!(mapped, vec![1, 1, 2, 2, 3, 3, 4, 4, 5, 5]);
  }

  #[test]
  fn student_role_is_accepted_as_learner() {
    let r: Role = serde_json::from_str("\"student\"").expect("role");
    assert_eq!(r, Role::Learner);
    assert_eq!(Role::parse("ADMIN"), Some(Role::Admin));
    assert_eq!(Role::parse("instructor"), None);
  }

  #[test]
  fn password_hash_is_never_serialized() {
    let now = Utc::now();
    let u = User {
      id: "u1".into(),
      name: "Ada".into(),
      email: "ada@example.com".into(),
      password_hash: "secret-hash".into(),
      role: Role::Learner,
      stats: UserStats::default(),
      created_at: now,
      updated_at: now,
    };
    let json = serde_json::to_string(&u).expect("json");
    assert!(!json.contains("secret-hash"));
    assert!(json.contains("\"role\":\"learner\""));
  }

  #[test]
  fn question_validation_rejects_bad_index() {
    let q = Question {
      id: "q".into(),
      external_id: "x".into(),
      category_id: "basic-phishing".into(),
      category_name: "Basic".into(),
      difficulty: Difficulty::MIN,
      text: "What?".into(),
      options: vec!["a".into(), "b".into()],
      correct_index: 2,
      explanation: String::new(),
      created_at: Utc::now(),
    };
    assert!(q.validate().is_err());
  }
}
