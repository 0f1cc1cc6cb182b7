//! Pure roll-ups over sessions, users and questions. No I/O here; routes load the
//! records and hand slices in.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{Category, Difficulty, Question, Role, Session, User};
use crate::util::percent;

/// Categories with accuracy below this (and enough answers) are weak areas.
pub const WEAK_AREA_ACCURACY: i64 = 70;
pub const WEAK_AREA_MIN_ASKED: u64 = 3;

const PROGRESSION_WINDOW: usize = 20;
const RECENT_WINDOW: usize = 10;

/// Stats block attached to every training response.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
  pub total_asked: u32,
  pub total_correct: u32,
  pub accuracy: i64,
  pub current_difficulty: Difficulty,
  pub correct_streak: u32,
}

impl SessionStats {
  pub fn of(s: &Session) -> Self {
    Self {
      total_asked: s.total_asked,
      total_correct: s.total_correct,
      accuracy: percent(s.total_correct.into(), s.total_asked.into()),
      current_difficulty: s.current_difficulty,
      correct_streak: s.correct_streak,
    }
  }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
  pub total_users: usize,
  pub total_learners: usize,
  pub total_sessions: usize,
  pub active_sessions: usize,
  pub total_questions: u64,
  pub total_correct: u64,
  pub accuracy: i64,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CategoryPerformance {
  pub category_id: String,
  pub category: String,
  pub asked: u64,
  pub correct: u64,
  pub accuracy: i64,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DifficultyPoint {
  pub date: DateTime<Utc>,
  pub difficulty: Difficulty,
  pub accuracy: i64,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
  pub id: String,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  pub active: bool,
  #[serde(flatten)]
  pub stats: SessionStats,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CurrentSession {
  pub session_id: String,
  #[serde(flatten)]
  pub stats: SessionStats,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OverallStats {
  pub total_sessions: usize,
  pub active_sessions: usize,
  pub total_questions: u64,
  pub total_correct: u64,
  pub accuracy: i64,
  pub last_session_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MyStats {
  pub overall: OverallStats,
  pub category_performance: Vec<CategoryPerformance>,
  pub difficulty_progression: Vec<DifficultyPoint>,
  pub recent_sessions: Vec<SessionSummary>,
  pub weak_areas: Vec<CategoryPerformance>,
  pub current_session: Option<CurrentSession>,
}

/// One step of the learning path.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModuleStatus {
  pub id: String,
  pub name: String,
  pub locked: bool,
  /// Next rung to clear; `Difficulty::MAX + 1` once the module is complete.
  pub level: u8,
  pub answered: u64,
  pub complete: bool,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
  pub user: User,
  pub total_sessions: usize,
  pub total_questions: u64,
  pub total_correct: u64,
  pub accuracy: i64,
  pub last_session_at: Option<DateTime<Utc>>,
}

fn totals(sessions: &[Session]) -> (u64, u64) {
  sessions.iter().fold((0, 0), |(asked, correct), s| {
    (asked + u64::from(s.total_asked), correct + u64::from(s.total_correct))
  })
}

pub fn overview(users: &[User], sessions: &[Session]) -> Overview {
  let (total_questions, total_correct) = totals(sessions);
  Overview {
    total_users: users.len(),
    total_learners: users.iter().filter(|u| u.role == Role::Learner).count(),
    total_sessions: sessions.len(),
    active_sessions: sessions.iter().filter(|s| s.active).count(),
    total_questions,
    total_correct,
    accuracy: percent(total_correct, total_questions),
  }
}

/// Per-category accuracy over every recorded answer, weakest first.
/// Answers whose question no longer exists are ignored.
pub fn category_performance(sessions: &[Session], questions: &HashMap<String, Question>) -> Vec<CategoryPerformance> {
  let mut by_cat: BTreeMap<&str, (&str, u64, u64)> = BTreeMap::new();
  for answer in sessions.iter().flat_map(|s| s.answers.iter()) {
    let Some(q) = questions.get(&answer.question_id) else { continue };
    let entry = by_cat.entry(q.category_id.as_str()).or_insert((q.category_name.as_str(), 0, 0));
    entry.1 += 1;
    if answer.was_correct {
      entry.2 += 1;
    }
  }
  let mut out: Vec<CategoryPerformance> = by_cat
    .into_iter()
    .map(|(id, (name, asked, correct))| CategoryPerformance {
      category_id: id.to_string(),
      category: name.to_string(),
      asked,
      correct,
      accuracy: percent(correct, asked),
    })
    .collect();
  out.sort_by_key(|c| c.accuracy);
  out
}

pub fn is_weak(c: &CategoryPerformance) -> bool {
  c.accuracy < WEAK_AREA_ACCURACY && c.asked >= WEAK_AREA_MIN_ASKED
}

pub fn weak_areas(performances: &[CategoryPerformance]) -> Vec<CategoryPerformance> {
  performances.iter().filter(|c| is_weak(c)).cloned().collect()
}

/// `sessions` must be newest first.
pub fn my_stats(sessions: &[Session], questions: &HashMap<String, Question>) -> MyStats {
  let (total_questions, total_correct) = totals(sessions);
  let category_performance = category_performance(sessions, questions);

  let mut difficulty_progression: Vec<DifficultyPoint> = sessions
    .iter()
    .filter(|s| !s.answers.is_empty())
    .take(PROGRESSION_WINDOW)
    .map(|s| DifficultyPoint {
      date: s.updated_at,
      difficulty: s.current_difficulty,
      accuracy: percent(s.total_correct.into(), s.total_asked.into()),
    })
    .collect();
  difficulty_progression.reverse();

  let recent_sessions = sessions
    .iter()
    .take(RECENT_WINDOW)
    .map(|s| SessionSummary {
      id: s.id.clone(),
      created_at: s.created_at,
      updated_at: s.updated_at,
      active: s.active,
      stats: SessionStats::of(s),
    })
    .collect();

  let weak_areas = weak_areas(&category_performance);

  let current_session = sessions
    .iter()
    .find(|s| s.active)
    .map(|s| CurrentSession { session_id: s.id.clone(), stats: SessionStats::of(s) });

  MyStats {
    overall: OverallStats {
      total_sessions: sessions.len(),
      active_sessions: sessions.iter().filter(|s| s.active).count(),
      total_questions,
      total_correct,
      accuracy: percent(total_correct, total_questions),
      last_session_at: sessions.first().map(|s| s.updated_at),
    },
    category_performance,
    difficulty_progression,
    recent_sessions,
    weak_areas,
    current_session,
  }
}

/// `sessions` must be newest first.
pub fn user_summary(user: User, sessions: &[Session]) -> UserSummary {
  let (total_questions, total_correct) = totals(sessions);
  UserSummary {
    user,
    total_sessions: sessions.len(),
    total_questions,
    total_correct,
    accuracy: percent(total_correct, total_questions),
    last_session_at: sessions.first().map(|s| s.updated_at),
  }
}

/// Progress through `path` (ordered `(id, name)` pairs). A module is complete once a
/// top-difficulty question in it was answered correctly, and each module stays
/// locked until the one before it is complete.
pub fn module_status(
  path: &[(&str, &str)],
  sessions: &[Session],
  questions: &HashMap<String, Question>,
) -> Vec<ModuleStatus> {
  let mut progress: HashMap<&str, (u64, u8)> = HashMap::new();
  for answer in sessions.iter().flat_map(|s| s.answers.iter()) {
    let Some(q) = questions.get(&answer.question_id) else { continue };
    let entry = progress.entry(q.category_id.as_str()).or_insert((0, 0));
    entry.0 += 1;
    if answer.was_correct {
      entry.1 = entry.1.max(answer.difficulty.value());
    }
  }

  let mut previous_complete = true;
  path
    .iter()
    .map(|(id, name)| {
      let (answered, cleared) = progress.get(id).copied().unwrap_or((0, 0));
      let complete = cleared >= Difficulty::MAX.value();
      let status = ModuleStatus {
        id: id.to_string(),
        name: name.to_string(),
        locked: !previous_complete,
        level: cleared + 1,
        answered,
        complete,
      };
      previous_complete = complete;
      status
    })
    .collect()
}

/// Group questions into categories, sorted by name.
pub fn group_categories(questions: &[Question]) -> Vec<Category> {
  let mut by_id: HashMap<&str, Category> = HashMap::new();
  for q in questions {
    by_id
      .entry(q.category_id.as_str())
      .or_insert_with(|| Category { id: q.category_id.clone(), name: q.category_name.clone(), question_count: 0 })
      .question_count += 1;
  }
  let mut out: Vec<Category> = by_id.into_values().collect();
  out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
  out
}

#[cfg(test)]
mod tests {
  use chrono::Duration;

  use super::*;
  use crate::domain::{AnswerRecord, UserStats};

  fn q(id: &str, cat: &str) -> Question {
    Question {
      id: id.into(),
      external_id: id.into(),
      category_id: cat.into(),
      category_name: format!("{cat} name"),
      difficulty: Difficulty::MIN,
      text: "?".into(),
      options: vec!["a".into(), "b".into()],
      correct_index: 0,
      explanation: String::new(),
      created_at: Utc::now(),
    }
  }

  fn session(id: &str, minutes_ago: i64, answers: &[(&str, bool)], active: bool) -> Session {
    let at = Utc::now() - Duration::minutes(minutes_ago);
    let mut s = Session::new(id.into(), "u1".into(), None, at);
    s.active = active;
    for (qid, ok) in answers {
      s.total_asked += 1;
      if *ok {
        s.total_correct += 1;
      }
      s.answers.push(AnswerRecord {
        question_id: qid.to_string(),
        selected_index: 0,
        was_correct: *ok,
        difficulty: Difficulty::MIN,
        timestamp: at,
      });
    }
    s
  }

  fn bank() -> HashMap<String, Question> {
    [q("p1", "phish"), q("p2", "phish"), q("m1", "mail")]
      .into_iter()
      .map(|q| (q.id.clone(), q))
      .collect()
  }

  #[test]
  fn empty_inputs_give_zero_accuracy() {
    let o = overview(&[], &[]);
    assert_eq!(o.accuracy, 0);
    let s = my_stats(&[], &bank());
    assert_eq!(s.overall.accuracy, 0);
    assert!(s.overall.last_session_at.is_none());
    assert!(s.current_session.is_none());
  }

  #[test]
  fn overview_counts_learners_and_rounds() {
    let now = Utc::now();
    let user = |role| User {
      id: "x".into(),
      name: "x".into(),
      email: "x".into(),
      password_hash: String::new(),
      role,
      stats: UserStats::default(),
      created_at: now,
      updated_at: now,
    };
    let users = vec![user(Role::Learner), user(Role::Learner), user(Role::Admin)];
    let sessions = vec![session("a", 0, &[("p1", true), ("p2", true), ("m1", false)], true)];
    let o = overview(&users, &sessions);
    assert_eq!((o.total_users, o.total_learners), (3, 2));
    assert_eq!(o.accuracy, 67);
    assert_eq!(o.active_sessions, 1);
  }

  #[test]
  fn weak_areas_need_three_answers_below_seventy() {
    let sessions = vec![
      session("new", 1, &[("p1", false), ("p2", false), ("p1", true)], true),
      session("old", 10, &[("m1", false), ("m1", false)], false),
    ];
    let stats = my_stats(&sessions, &bank());
    assert_eq!(stats.category_performance[0].category_id, "mail");
    assert_eq!(stats.weak_areas.len(), 1);
    assert_eq!(stats.weak_areas[0].category_id, "phish");
    assert_eq!(stats.weak_areas[0].accuracy, 33);
    assert_eq!(stats.current_session.as_ref().map(|c| c.session_id.as_str()), Some("new"));
  }

  #[test]
  fn progression_is_chronological() {
    let sessions = vec![
      session("newest", 1, &[("p1", true)], false),
      session("empty", 2, &[], false),
      session("oldest", 3, &[("p1", false)], false),
    ];
    let stats = my_stats(&sessions, &bank());
    let accs: Vec<i64> = stats.difficulty_progression.iter().map(|p| p.accuracy).collect();
    assert_eq!(accs, vec![0, 100]);
    assert_eq!(stats.recent_sessions.len(), 3);
  }

  #[test]
  fn weak_area_predicate_needs_enough_answers() {
    let perf = |asked, accuracy| CategoryPerformance {
      category_id: "c".into(),
      category: "C".into(),
      asked,
      correct: 0,
      accuracy,
    };
    assert!(!is_weak(&perf(1, 0)));
    assert!(is_weak(&perf(3, 69)));
    assert!(!is_weak(&perf(5, 70)));
  }

  #[test]
  fn learning_path_unlocks_in_order() {
    let mut top = q("p5", "phish");
    top.difficulty = Difficulty::MAX;
    let mut mid = q("m3", "mail");
    mid.difficulty = Difficulty::new(3);
    let questions: HashMap<String, Question> =
      [q("p1", "phish"), top, mid].into_iter().map(|q| (q.id.clone(), q)).collect();

    let mut s = session("a", 0, &[("p1", true), ("p5", true), ("m3", true), ("m3", false)], false);
    s.answers[1].difficulty = Difficulty::MAX;
    s.answers[2].difficulty = Difficulty::new(3);
    let path = [("phish", "Phishing"), ("mail", "Mail"), ("extra", "Extra")];
    let status = module_status(&path, &[s], &questions);

    assert_eq!(status.len(), 3);
    assert!(!status[0].locked && status[0].complete);
    assert_eq!((status[0].level, status[0].answered), (6, 2));
    assert!(!status[1].locked && !status[1].complete);
    assert_eq!((status[1].level, status[1].answered), (4, 2));
    assert!(status[2].locked);
    assert_eq!((status[2].level, status[2].answered), (1, 0));
  }

  #[test]
  fn fresh_learner_only_has_the_first_module_open() {
    let path = [("phish", "Phishing"), ("mail", "Mail")];
    let status = module_status(&path, &[], &bank());
    assert!(!status[0].locked);
    assert!(status[1].locked);
    assert!(status.iter().all(|m| m.level == 1 && !m.complete));
  }

  #[test]
  fn categories_sorted_by_name() {
    let qs: Vec<Question> = bank().into_values().collect();
    let cats = group_categories(&qs);
    assert_eq!(cats.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(), vec!["mail", "phish"]);
    assert_eq!(cats[1].question_count, 2);
  }
}
