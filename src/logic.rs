//! Training-session behaviors shared by the HTTP and WebSocket handlers.
//!
//! This includes:
//!   - starting or resuming a session and serving the pending question
//!   - grading answers and moving along the difficulty ladder
//!   - mentor conversation with session context
//!   - category listing and per-category study notes
//!
//! Every LLM call has a deterministic fallback; an LLM outage never fails a request.

use std::collections::HashMap;

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::adaptive::{next_difficulty, pick_next_question, PickRequest};
use crate::analytics::{self, category_performance, group_categories, CategoryPerformance, ModuleStatus, SessionStats};
use crate::auth::AuthUser;
use crate::domain::{AnswerRecord, Difficulty, Question, Session};
use crate::error::ApiError;
use crate::generator::{generate_question, GenerateRequest};
use crate::protocol::{
  AnswerResponse, CategoryOut, ConversationResponse, NotesResponse, NotesSource, QuestionOut, QuestionResult,
  StartResponse,
};
use crate::seeds::{learning_path, syllabus};
use crate::state::AppState;
use crate::store::QuestionFilter;
use crate::util::{percent, preview};

pub const WELCOME_NEW: &str = "Welcome to Cybersecurity Training! Let's get started.";
pub const WELCOME_BACK: &str = "Welcome back, continuing your training session.";
pub const NO_QUESTIONS: &str = "No questions available.";
pub const TRAINING_COMPLETE: &str = "Training complete! No more questions available at this time.";
pub const MENTOR_APOLOGY: &str = "I'm having trouble processing your question right now. Please try asking about cybersecurity concepts, your training progress, or the current question!";
const HINT_CHARS: usize = 50;
const NOTES_SAMPLE_SIZE: usize = 5;

/// Deterministic tutor feedback used when the LLM is unavailable.
pub fn fallback_feedback(was_correct: bool, explanation: &str) -> String {
  if was_correct {
    format!("Great job! You selected the correct answer. {explanation} Keep up the excellent work!")
  } else {
    format!(
      "Not quite right, but that's okay! {explanation} Remember: learning from mistakes is part of the process. Try again on the next question!"
    )
  }
}

/// Ask the LLM for a fresh question when the bank has nothing at this level.
/// The generated question is stored so later picks can reuse it.
async fn generate_and_store(
  state: &AppState,
  user_id: &str,
  difficulty: Difficulty,
  category: Option<&str>,
) -> Option<Question> {
  let llm = state.llm.as_ref()?;

  let weak_areas = match weak_areas_for(state, user_id).await {
    Ok(w) => w,
    Err(e) => {
      warn!(target: "training", error = %e, "Could not compute weak areas; generating without them");
      Vec::new()
    }
  };
  let req = GenerateRequest { difficulty, category_id: category.map(str::to_string), weak_areas };

  match generate_question(llm, &state.prompts, state.store.as_ref(), &req).await {
    Ok(q) => {
      if let Err(e) = state.store.insert_question(&q).await {
        error!(target: "training", error = %e, "Generated question could not be stored");
        return None;
      }
      if let Err(e) = state.store.adjust_course_count(&q.category_id, 1).await {
        warn!(target: "training", error = %e, "Course count not updated");
      }
      Some(q)
    }
    Err(e) => {
      error!(target: "training", error = %e, "AI question generation failed");
      None
    }
  }
}

/// Weak categories from the user's answered sessions.
pub async fn weak_areas_for(state: &AppState, user_id: &str) -> Result<Vec<CategoryPerformance>, ApiError> {
  let sessions = state.store.list_sessions_for_user(user_id).await?;
  if sessions.iter().all(|s| s.answers.is_empty()) {
    return Ok(Vec::new());
  }
  let questions = question_index(state).await?;
  Ok(analytics::weak_areas(&category_performance(&sessions, &questions)))
}

/// Learning-path progress for a user. The path is advisory: `start_session` does not
/// refuse locked modules.
#[instrument(level = "debug", skip(state))]
pub async fn module_status(state: &AppState, user_id: &str) -> Result<Vec<ModuleStatus>, ApiError> {
  let sessions = state.store.list_sessions_for_user(user_id).await?;
  let questions = question_index(state).await?;
  Ok(analytics::module_status(&learning_path(), &sessions, &questions))
}

/// All questions keyed by id.
pub async fn question_index(state: &AppState) -> Result<HashMap<String, Question>, ApiError> {
  Ok(
    state
      .store
      .list_questions(&QuestionFilter::default())
      .await?
      .into_iter()
      .map(|q| (q.id.clone(), q))
      .collect(),
  )
}

/// Start a new session or resume the active one, and return the question to answer.
/// Nothing is persisted until a question has been found.
#[instrument(level = "info", skip(state, user, category), fields(user = %user.id, ?category))]
pub async fn start_session(state: &AppState, user: &AuthUser, category: Option<String>) -> Result<StartResponse, ApiError> {
  let category = category.filter(|c| !c.trim().is_empty());
  if let Some(id) = &category {
    let known = syllabus(id).is_some()
      || !state
        .store
        .list_questions(&QuestionFilter { category_id: Some(id.clone()), difficulty: None })
        .await?
        .is_empty();
    if !known {
      return Err(ApiError::not_found("Category not found"));
    }
  }
  let now = Utc::now();

  let (mut session, is_new) = match state.store.active_session_for_user(&user.id).await? {
    Some(mut s) => {
      if category.is_some() && s.preferred_category.is_none() {
        s.preferred_category = category.clone();
        s.updated_at = now;
      }
      (s, false)
    }
    None => (Session::new(Uuid::new_v4().to_string(), user.id.clone(), category.clone(), now), true),
  };

  // A pending question is re-sent as-is (e.g. after a page refresh).
  let pending = match &session.last_question {
    Some(qid) => state.store.get_question(qid).await?,
    None => None,
  };

  let question = match pending {
    Some(q) => q,
    None => {
      let picked = pick_next_question(
        state.store.as_ref(),
        PickRequest {
          difficulty: session.current_difficulty,
          asked: &session.asked_question_ids,
          category: session.preferred_category.as_deref(),
          prefer_weak_category: None,
        },
      )
      .await?;
      let q = match picked {
        Some(q) => q,
        None => generate_and_store(state, &user.id, session.current_difficulty, session.preferred_category.as_deref())
          .await
          .ok_or_else(|| ApiError::Unavailable(NO_QUESTIONS.into()))?,
      };
      session.register_asked(&q.id);
      session.updated_at = Utc::now();
      q
    }
  };

  if is_new {
    state.store.insert_session(&session).await?;
    info!(target: "training", session = %session.id, "Session created");
  } else {
    state.store.update_session(&session).await?;
  }

  info!(target: "training", session = %session.id, question = %question.id, is_new, "Question served");
  Ok(StartResponse {
    session_id: session.id.clone(),
    message: if is_new { WELCOME_NEW } else { WELCOME_BACK }.to_string(),
    question: QuestionOut::from(&question),
    stats: SessionStats::of(&session),
  })
}

/// Parsed answer submission.
#[derive(Debug)]
pub struct AnswerInput {
  pub session_id: String,
  pub question_id: String,
  pub selected_index: i64,
  pub free_text: Option<String>,
}

/// Grade the pending question, step the difficulty, and serve the next one.
#[instrument(level = "info", skip(state, user, input), fields(user = %user.id, session = %input.session_id, question = %input.question_id))]
pub async fn submit_answer(state: &AppState, user: &AuthUser, input: AnswerInput) -> Result<AnswerResponse, ApiError> {
  let mut session = state
    .store
    .get_session(&input.session_id)
    .await?
    .filter(|s| s.active)
    .ok_or_else(|| ApiError::bad_request("Session is not active"))?;

  if session.user_id != user.id {
    return Err(ApiError::forbidden("Session does not belong to user"));
  }
  if session.last_question.as_deref() != Some(input.question_id.as_str()) {
    return Err(ApiError::bad_request("Answer does not match current question"));
  }
  let question = state
    .store
    .get_question(&input.question_id)
    .await?
    .ok_or_else(|| ApiError::not_found("Question not found"))?;

  let selected = usize::try_from(input.selected_index)
    .ok()
    .filter(|i| *i < question.options.len())
    .ok_or_else(|| ApiError::bad_request("selectedIndex is out of range"))?;
  let was_correct = selected == question.correct_index;

  let free_text = input.free_text.as_deref().map(str::trim).filter(|t| !t.is_empty());
  let free_text_evaluation = match (free_text, &state.llm) {
    (Some(text), Some(llm)) => match llm.evaluate_reasoning(&state.prompts, &question, text).await {
      Ok(eval) => Some(eval),
      Err(e) => {
        warn!(target: "training", error = %e, "Free-text evaluation failed; continuing without it");
        None
      }
    },
    _ => None,
  };

  if was_correct {
    session.total_correct += 1;
    session.correct_streak += 1;
  } else {
    session.correct_streak = 0;
  }
  let now = Utc::now();
  session.answers.push(AnswerRecord {
    question_id: question.id.clone(),
    selected_index: selected,
    was_correct,
    difficulty: question.difficulty,
    timestamp: now,
  });
  let previous = session.current_difficulty;
  session.current_difficulty = next_difficulty(previous, was_correct, session.correct_streak);
  debug!(target: "training", %previous, next = %session.current_difficulty, streak = session.correct_streak, "Difficulty stepped");

  let next = pick_next_question(
    state.store.as_ref(),
    PickRequest {
      difficulty: session.current_difficulty,
      asked: &session.asked_question_ids,
      category: session.preferred_category.as_deref(),
      prefer_weak_category: None,
    },
  )
  .await?;

  let selected_text = question.options[selected].clone();
  let ai_feedback = match &state.llm {
    Some(llm) => match llm.tutor_feedback(&state.prompts, &question, &selected_text, was_correct).await {
      Ok(text) => text,
      Err(e) => {
        warn!(target: "training", error = %e, "Tutor feedback failed; using fallback");
        fallback_feedback(was_correct, &question.explanation)
      }
    },
    None => fallback_feedback(was_correct, &question.explanation),
  };

  let current_question_result = QuestionResult {
    correct: was_correct,
    explanation: question.explanation.clone(),
    ai_feedback,
    free_text_evaluation,
  };

  session.updated_at = now;
  let Some(next) = next else {
    session.active = false;
    session.last_question = None;
    state.store.update_session(&session).await?;
    info!(target: "training", session = %session.id, "Session complete; pool exhausted");
    return Ok(AnswerResponse {
      done: true,
      current_question_result,
      next_question: None,
      stats: SessionStats::of(&session),
      feedback: Some(TRAINING_COMPLETE.into()),
    });
  };

  session.register_asked(&next.id);
  state.store.update_session(&session).await?;
  info!(target: "training", session = %session.id, was_correct, next = %next.id, "Answer graded");

  Ok(AnswerResponse {
    done: false,
    current_question_result,
    next_question: Some(QuestionOut::from(&next)),
    stats: SessionStats::of(&session),
    feedback: None,
  })
}

/// Mentor chat grounded in the learner's session and overall progress.
#[instrument(level = "info", skip(state, user, session_id, message), fields(user = %user.id, ?session_id, message_len = message.len()))]
pub async fn conversation(
  state: &AppState,
  user: &AuthUser,
  session_id: Option<&str>,
  message: &str,
) -> Result<ConversationResponse, ApiError> {
  let message = message.trim();
  if message.is_empty() {
    return Err(ApiError::bad_request("Message is required"));
  }

  let session = match session_id {
    Some(id) => state.store.get_session(id).await?.filter(|s| s.user_id == user.id),
    None => None,
  };
  let current_question = match session.as_ref().and_then(|s| s.last_question.as_deref()) {
    Some(qid) => state.store.get_question(qid).await?,
    None => None,
  };

  let session_ctx = match (&session, &current_question) {
    (Some(s), Some(q)) => format!(
      "Active course: {}; current session: {} questions, {} correct ({}% accuracy); difficulty level {}; current streak {}",
      q.category_name,
      s.total_asked,
      s.total_correct,
      percent(s.total_correct.into(), s.total_asked.into()),
      s.current_difficulty,
      s.correct_streak
    ),
    _ => "No active training session".to_string(),
  };
  let question_hint = current_question
    .as_ref()
    .map(|q| format!("{} (difficulty {}): {}", q.category_name, q.difficulty, preview(&q.text, HINT_CHARS)))
    .unwrap_or_else(|| "none".into());

  let all = state.store.list_sessions_for_user(&user.id).await?;
  let (asked, correct) = all
    .iter()
    .fold((0u64, 0u64), |(a, c), s| (a + u64::from(s.total_asked), c + u64::from(s.total_correct)));
  let progress = format!(
    "Total sessions: {}; total questions: {asked}; total correct: {correct}; overall accuracy: {}%",
    all.len(),
    percent(correct, asked)
  );

  let content = match &state.llm {
    Some(llm) => match llm.mentor_reply(&state.prompts, &session_ctx, &question_hint, &progress, message).await {
      Ok(reply) => reply,
      Err(e) => {
        error!(target: "training", error = %e, "Mentor reply failed; sending apology");
        MENTOR_APOLOGY.to_string()
      }
    },
    None => MENTOR_APOLOGY.to_string(),
  };

  Ok(ConversationResponse { kind: "message", content })
}

#[instrument(level = "debug", skip(state))]
pub async fn categories(state: &AppState) -> Result<Vec<CategoryOut>, ApiError> {
  let questions = state.store.list_questions(&QuestionFilter::default()).await?;
  Ok(group_categories(&questions).into_iter().map(CategoryOut::from).collect())
}

fn outline_notes(name: &str, topics: &[String]) -> String {
  let mut out = format!("# {name}\n\n## Key topics\n");
  for t in topics {
    out.push_str("- ");
    out.push_str(t);
    out.push('\n');
  }
  out.push_str("\nWork through the training questions in this module to practise each topic.\n");
  out
}

/// Study guide for a category. AI output is cached; the outline fallback is not.
#[instrument(level = "info", skip(state, category_id), fields(%category_id))]
pub async fn study_notes(state: &AppState, category_id: &str) -> Result<NotesResponse, ApiError> {
  let questions = state
    .store
    .list_questions(&QuestionFilter { category_id: Some(category_id.to_string()), difficulty: None })
    .await?;
  let outline = syllabus(category_id);
  if questions.is_empty() && outline.is_none() {
    return Err(ApiError::not_found("Category not found"));
  }
  let category_name = questions
    .first()
    .map(|q| q.category_name.clone())
    .unwrap_or_else(|| category_id.to_string());

  if let Some(notes) = state.notes_cache.read().await.get(category_id).cloned() {
    return Ok(NotesResponse { category_id: category_id.into(), category_name, notes, source: NotesSource::Cache });
  }

  if let Some(llm) = &state.llm {
    let samples: Vec<String> = questions.iter().take(NOTES_SAMPLE_SIZE).map(|q| q.text.clone()).collect();
    match llm.study_notes(&state.prompts, &category_name, &samples).await {
      Ok(notes) => {
        state.notes_cache.write().await.insert(category_id.to_string(), notes.clone());
        return Ok(NotesResponse { category_id: category_id.into(), category_name, notes, source: NotesSource::Ai });
      }
      Err(e) => warn!(target: "training", error = %e, "Study notes generation failed; using outline"),
    }
  }

  let topics: Vec<String> = match outline {
    Some(items) => items.iter().map(|s| s.to_string()).collect(),
    None => questions.iter().take(NOTES_SAMPLE_SIZE).map(|q| preview(&q.text, 80)).collect(),
  };
  Ok(NotesResponse {
    category_id: category_id.into(),
    notes: outline_notes(&category_name, &topics),
    category_name,
    source: NotesSource::Syllabus,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::Role;
  use crate::llm::tests::{client, completion, fake_openai};
  use crate::store::Store;

  fn learner(id: &str) -> AuthUser {
    AuthUser { id: id.into(), role: Role::Learner, name: "Learner".into() }
  }

  async fn answer_current(state: &AppState, user: &AuthUser, start: &StartResponse, correct: bool) -> AnswerResponse {
    let q = state.store.get_question(&start.question.id).await.unwrap().expect("question");
    let idx = if correct { q.correct_index } else { (q.correct_index + 1) % q.options.len() };
    submit_answer(
      state,
      user,
      AnswerInput {
        session_id: start.session_id.clone(),
        question_id: q.id.clone(),
        selected_index: idx as i64,
        free_text: None,
      },
    )
    .await
    .expect("answer")
  }

  #[tokio::test]
  async fn start_creates_then_resumes_with_same_question() {
    let state = AppState::for_tests().await;
    let user = learner("u1");
    let first = start_session(&state, &user, None).await.expect("start");
    assert_eq!(first.message, WELCOME_NEW);
    assert_eq!(first.stats.total_asked, 1);
    assert_eq!(first.question.difficulty, Difficulty::MIN);

    let again = start_session(&state, &user, None).await.expect("resume");
    assert_eq!(again.message, WELCOME_BACK);
    assert_eq!(again.session_id, first.session_id);
    assert_eq!(again.question.id, first.question.id);
    assert_eq!(again.stats.total_asked, 1);
  }

  #[tokio::test]
  async fn preferred_category_is_honoured() {
    let state = AppState::for_tests().await;
    let start = start_session(&state, &learner("u1"), Some("email-security".into())).await.expect("start");
    let q = state.store.get_question(&start.question.id).await.unwrap().expect("q");
    assert_eq!(q.category_id, "email-security");
  }

  #[tokio::test]
  async fn two_correct_answers_raise_difficulty_and_a_miss_lowers_it() {
    let state = AppState::for_tests().await;
    let user = learner("u1");
    let start = start_session(&state, &user, None).await.expect("start");

    let r1 = answer_current(&state, &user, &start, true).await;
    assert!(r1.current_question_result.correct);
    assert_eq!(r1.stats.current_difficulty.value(), 1);
    assert!(r1.current_question_result.ai_feedback.starts_with("Great job!"));

    let next = r1.next_question.expect("next");
    let s2 = StartResponse { session_id: start.session_id.clone(), message: String::new(), question: next, stats: r1.stats };
    let r2 = answer_current(&state, &user, &s2, true).await;
    assert_eq!(r2.stats.current_difficulty.value(), 2);
    assert_eq!(r2.stats.correct_streak, 2);

    let s3 = StartResponse {
      session_id: start.session_id.clone(),
      message: String::new(),
      question: r2.next_question.expect("next"),
      stats: r2.stats,
    };
    let r3 = answer_current(&state, &user, &s3, false).await;
    assert_eq!(r3.stats.current_difficulty.value(), 1);
    assert_eq!(r3.stats.correct_streak, 0);
    assert_eq!(r3.stats.total_asked, 4);
    assert_eq!(r3.stats.total_correct, 2);
    assert!(r3.current_question_result.ai_feedback.starts_with("Not quite right"));
  }

  #[tokio::test]
  async fn answers_are_validated() {
    let state = AppState::for_tests().await;
    let user = learner("u1");
    let start = start_session(&state, &user, None).await.expect("start");

    let wrong_q = AnswerInput {
      session_id: start.session_id.clone(),
      question_id: "nope".into(),
      selected_index: 0,
      free_text: None,
    };
    let err = submit_answer(&state, &user, wrong_q).await.unwrap_err();
    assert_eq!(err.to_string(), "Answer does not match current question");

    let out_of_range = AnswerInput {
      session_id: start.session_id.clone(),
      question_id: start.question.id.clone(),
      selected_index: 9,
      free_text: None,
    };
    assert!(matches!(submit_answer(&state, &user, out_of_range).await, Err(ApiError::BadRequest(_))));

    let stranger = AnswerInput {
      session_id: start.session_id.clone(),
      question_id: start.question.id.clone(),
      selected_index: 0,
      free_text: None,
    };
    assert!(matches!(submit_answer(&state, &learner("u2"), stranger).await, Err(ApiError::Forbidden(_))));

    let missing = AnswerInput { session_id: "ghost".into(), question_id: "q".into(), selected_index: 0, free_text: None };
    assert_eq!(submit_answer(&state, &user, missing).await.unwrap_err().to_string(), "Session is not active");
  }

  async fn state_with_questions(questions: &[Question]) -> AppState {
    let store = crate::store::MemoryStore::new();
    for q in questions {
      store.insert_question(q).await.expect("question");
    }
    AppState {
      config: crate::config::AppConfig::for_tests(),
      auth: crate::auth::AuthKeys::new(&crate::config::AppConfig::for_tests().auth),
      prompts: Default::default(),
      store: std::sync::Arc::new(store),
      llm: None,
      notes_cache: Default::default(),
      category_descriptions: HashMap::new(),
    }
  }

  fn easy_question(id: &str) -> Question {
    Question {
      id: id.into(),
      external_id: id.into(),
      category_id: "drills".into(),
      category_name: "Drills".into(),
      difficulty: Difficulty::MIN,
      text: format!("Drill {id}?"),
      options: vec!["right".into(), "wrong".into()],
      correct_index: 0,
      explanation: "Because.".into(),
      created_at: Utc::now(),
    }
  }

  #[tokio::test]
  async fn empty_bank_is_unavailable() {
    let state = state_with_questions(&[]).await;
    let err = start_session(&state, &learner("u1"), None).await.unwrap_err();
    assert!(matches!(err, ApiError::Unavailable(_)));
    assert_eq!(err.to_string(), NO_QUESTIONS);
    assert!(state.store.active_session_for_user("u1").await.unwrap().is_none());
  }

  #[tokio::test]
  async fn unknown_category_is_rejected_without_leaving_a_session() {
    let state = AppState::for_tests().await;
    let user = learner("u1");
    let err = start_session(&state, &user, Some("typo-category".into())).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
    assert_eq!(err.to_string(), "Category not found");
    assert!(state.store.active_session_for_user("u1").await.unwrap().is_none());

    let start = start_session(&state, &user, Some("basic-phishing".into())).await.expect("start");
    assert_eq!(start.message, WELCOME_NEW);
    let q = state.store.get_question(&start.question.id).await.unwrap().expect("q");
    assert_eq!(q.category_id, "basic-phishing");
  }

  #[tokio::test]
  async fn exhausted_pool_completes_the_session() {
    let state = state_with_questions(&[easy_question("d1"), easy_question("d2")]).await;
    let user = learner("u1");
    let start = start_session(&state, &user, None).await.expect("start");

    let r1 = answer_current(&state, &user, &start, true).await;
    assert!(!r1.done);
    let s2 = StartResponse {
      session_id: start.session_id.clone(),
      message: String::new(),
      question: r1.next_question.expect("next"),
      stats: r1.stats,
    };
    let r2 = answer_current(&state, &user, &s2, true).await;
    assert!(r2.done);
    assert_eq!(r2.feedback.as_deref(), Some(TRAINING_COMPLETE));
    assert!(r2.next_question.is_none());
    assert_eq!(r2.stats.current_difficulty.value(), 2);
    assert_eq!(r2.stats.total_correct, 2);

    let stored = state.store.get_session(&start.session_id).await.unwrap().expect("session");
    assert!(!stored.active);
    assert_eq!(stored.last_question, None);
    assert_eq!(stored.answers.len(), 2);
  }

  #[tokio::test]
  async fn a_single_miss_is_not_a_weak_area() {
    let state = AppState::for_tests().await;
    let user = learner("u1");
    let start = start_session(&state, &user, None).await.expect("start");
    answer_current(&state, &user, &start, false).await;
    assert!(weak_areas_for(&state, "u1").await.expect("weak areas").is_empty());
  }

  #[tokio::test]
  async fn module_status_starts_with_only_the_first_module_open() {
    let state = AppState::for_tests().await;
    let modules = module_status(&state, "u1").await.expect("modules");
    assert_eq!(modules.len(), 4);
    assert_eq!(modules[0].id, "basic-phishing");
    assert!(!modules[0].locked);
    assert!(modules[1..].iter().all(|m| m.locked));
  }

  #[tokio::test]
  async fn conversation_requires_text_and_falls_back() {
    let state = AppState::for_tests().await;
    let user = learner("u1");
    assert!(matches!(conversation(&state, &user, None, "   ").await, Err(ApiError::BadRequest(_))));
    let reply = conversation(&state, &user, None, "What is phishing?").await.expect("reply");
    assert_eq!(reply.kind, "message");
    assert_eq!(reply.content, MENTOR_APOLOGY);
  }

  #[tokio::test]
  async fn categories_and_outline_notes() {
    let state = AppState::for_tests().await;
    let cats = categories(&state).await.expect("categories");
    assert_eq!(cats.len(), 4);
    assert!(cats.windows(2).all(|w| w[0].name <= w[1].name));

    let notes = study_notes(&state, "basic-phishing").await.expect("notes");
    assert!(matches!(notes.source, NotesSource::Syllabus));
    assert!(notes.notes.contains("Identifying suspicious URLs"));
    assert!(state.notes_cache.read().await.is_empty());

    assert!(matches!(study_notes(&state, "nope").await, Err(ApiError::NotFound(_))));
  }

  #[tokio::test]
  async fn ai_notes_are_cached_after_success() {
    let base = fake_openai(200, completion("# Phishing guide")).await;
    let state = AppState::for_tests_with_llm(Some(client(base))).await;

    let first = study_notes(&state, "basic-phishing").await.expect("notes");
    assert!(matches!(first.source, NotesSource::Ai));
    assert_eq!(first.notes, "# Phishing guide");
    assert_eq!(state.notes_cache.read().await.get("basic-phishing").map(String::as_str), Some("# Phishing guide"));

    let second = study_notes(&state, "basic-phishing").await.expect("notes");
    assert!(matches!(second.source, NotesSource::Cache));
    assert_eq!(second.notes, first.notes);
  }

  #[tokio::test]
  async fn failed_ai_notes_fall_back_and_stay_uncached() {
    let base = fake_openai(500, serde_json::json!({ "error": { "message": "upstream down" } })).await;
    let state = AppState::for_tests_with_llm(Some(client(base))).await;

    let notes = study_notes(&state, "basic-phishing").await.expect("notes");
    assert!(matches!(notes.source, NotesSource::Syllabus));
    assert!(notes.notes.contains("Identifying suspicious URLs"));
    assert!(state.notes_cache.read().await.is_empty());
  }
}
