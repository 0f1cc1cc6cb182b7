//! Static tests: pick a category, answer a fixed set, get scored. Scores roll up into
//! the user's stats, which drive the dashboard and rank.

use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::analytics::group_categories;
use crate::auth::AuthUser;
use crate::domain::{Difficulty, TestResult, User, UserStats};
use crate::error::ApiError;
use crate::logic::module_status;
use crate::protocol::{
  ActivityItem, AnswerOutcome, DashboardResponse, DashboardUser, PublicQuestion, QuizCategory, QuizQuestionsQuery,
  QuizQuestionsResponse, SubmitTestRequest, SubmitTestResponse,
};
use crate::state::AppState;
use crate::store::QuestionFilter;
use crate::util::percent;

pub const HISTORY_LIMIT: usize = 10;
/// A test at or above this score extends the streak.
pub const STREAK_PASS_SCORE: i64 = 70;
const RECENT_ACTIVITY: usize = 5;

#[instrument(level = "debug", skip(state))]
pub async fn quiz_categories(state: &AppState) -> Result<Vec<QuizCategory>, ApiError> {
  let questions = state.store.list_questions(&QuestionFilter::default()).await?;
  Ok(
    group_categories(&questions)
      .into_iter()
      .map(|c| QuizCategory {
        description: state.category_description(&c.id, &c.name),
        id: c.id,
        name: c.name,
        question_count: c.question_count,
      })
      .collect(),
  )
}

/// Questions of one category with answers and explanations stripped.
#[instrument(level = "debug", skip(state, category_id, query), fields(%category_id))]
pub async fn category_questions(
  state: &AppState,
  category_id: &str,
  query: &QuizQuestionsQuery,
) -> Result<QuizQuestionsResponse, ApiError> {
  let all = state
    .store
    .list_questions(&QuestionFilter { category_id: Some(category_id.to_string()), difficulty: None })
    .await?;
  let Some(first) = all.first() else {
    return Err(ApiError::not_found("Category not found"));
  };
  let category = first.category_name.clone();

  let questions: Vec<PublicQuestion> = all
    .iter()
    .filter(|q| query.difficulty.map_or(true, |d| q.difficulty == Difficulty::new(d)))
    .take(query.limit.unwrap_or(usize::MAX))
    .map(PublicQuestion::from)
    .collect();

  Ok(QuizQuestionsResponse { category, total_questions: questions.len(), questions })
}

/// Fold one test score into the running stats.
pub fn apply_test_score(stats: &UserStats, score: i64) -> UserStats {
  let tests_completed = stats.tests_completed + 1;
  let accuracy = ((stats.accuracy * stats.tests_completed + score) as f64 / tests_completed as f64).round() as i64;
  UserStats {
    total_score: stats.total_score + score,
    accuracy,
    streak: if score >= STREAK_PASS_SCORE { stats.streak + 1 } else { 0 },
    tests_completed,
  }
}

#[instrument(level = "info", skip(state, user, req), fields(user = %user.id))]
pub async fn submit_test(state: &AppState, user: &AuthUser, req: SubmitTestRequest) -> Result<SubmitTestResponse, ApiError> {
  let (Some(category_id), Some(answers)) = (req.category_id.filter(|c| !c.trim().is_empty()), req.answers) else {
    return Err(ApiError::bad_request("Category ID and answers array are required"));
  };
  if answers.is_empty() {
    return Err(ApiError::bad_request("Category ID and answers array are required"));
  }

  let questions = state
    .store
    .list_questions(&QuestionFilter { category_id: Some(category_id.clone()), difficulty: None })
    .await?;
  let Some(category_name) = questions.first().map(|q| q.category_name.clone()) else {
    return Err(ApiError::not_found("Category not found"));
  };

  let mut results = Vec::with_capacity(answers.len());
  for a in &answers {
    let Some(q) = questions.iter().find(|q| q.id == a.question_id) else { continue };
    let is_correct = usize::try_from(a.selected_option).map_or(false, |i| i == q.correct_index);
    results.push(AnswerOutcome {
      question_id: q.id.clone(),
      question: q.text.clone(),
      selected_option: a.selected_option,
      correct_option: q.correct_index,
      is_correct,
      explanation: q.explanation.clone(),
    });
  }
  let correct_count = results.iter().filter(|r| r.is_correct).count() as u64;
  let total = answers.len() as u64;
  let score = percent(correct_count, total);

  let mut account = state
    .store
    .get_user(&user.id)
    .await?
    .ok_or_else(|| ApiError::not_found("User not found"))?;
  account.stats = apply_test_score(&account.stats, score);
  account.updated_at = Utc::now();
  state.store.update_user(&account).await?;

  let result = TestResult {
    id: Uuid::new_v4().to_string(),
    user_id: user.id.clone(),
    category: category_name,
    score,
    total_questions: total as i64,
    correct_answers: correct_count as i64,
    created_at: Utc::now(),
  };
  state.store.insert_test_result(&result).await?;
  info!(target: "training", user = %user.id, %category_id, score, "Test submitted");

  Ok(SubmitTestResponse {
    score,
    correct_count: correct_count as i64,
    total_questions: total as i64,
    results,
    test_result_id: result.id,
    user_stats: account.stats,
  })
}

#[instrument(level = "debug", skip(state, user), fields(user = %user.id))]
pub async fn history(state: &AppState, user: &AuthUser) -> Result<Vec<TestResult>, ApiError> {
  Ok(state.store.list_test_results(&user.id, HISTORY_LIMIT).await?)
}

/// 1-based position by total score (desc), ties broken by signup time then id.
pub fn rank_of(users: &[User], user_id: &str) -> usize {
  let mut ordered: Vec<&User> = users.iter().collect();
  ordered.sort_by(|a, b| {
    b.stats
      .total_score
      .cmp(&a.stats.total_score)
      .then_with(|| a.created_at.cmp(&b.created_at))
      .then_with(|| a.id.cmp(&b.id))
  });
  ordered.iter().position(|u| u.id == user_id).map_or(users.len().max(1), |p| p + 1)
}

#[instrument(level = "info", skip(state, user), fields(user = %user.id))]
pub async fn dashboard(state: &AppState, user: &AuthUser) -> Result<DashboardResponse, ApiError> {
  let account = state
    .store
    .get_user(&user.id)
    .await?
    .ok_or_else(|| ApiError::not_found("User not found"))?;
  let users = state.store.list_users(None).await?;
  let rank = rank_of(&users, &account.id);
  let modules = module_status(state, &account.id).await?;

  let mut recent_activity: Vec<ActivityItem> = state
    .store
    .list_test_results(&account.id, RECENT_ACTIVITY)
    .await?
    .into_iter()
    .map(|r| ActivityItem { action: format!("Completed {} test", r.category), at: r.created_at, score: Some(r.score) })
    .collect();
  recent_activity.extend(
    state
      .store
      .list_sessions_for_user(&account.id)
      .await?
      .into_iter()
      .filter(|s| s.total_asked > 0)
      .take(RECENT_ACTIVITY)
      .map(|s| ActivityItem {
        action: if s.active { "Training session in progress".into() } else { "Completed adaptive training session".into() },
        at: s.updated_at,
        score: Some(percent(s.total_correct.into(), s.total_asked.into())),
      }),
  );
  recent_activity.sort_by(|a, b| b.at.cmp(&a.at));
  recent_activity.truncate(RECENT_ACTIVITY);

  Ok(DashboardResponse {
    user: DashboardUser {
      level: account.stats.level(),
      id: account.id,
      name: account.name,
      email: account.email,
      stats: account.stats,
      rank,
    },
    recent_activity,
    modules,
  })
}
