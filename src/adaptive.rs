//! Adaptive engine: the streak-based difficulty step and "not yet asked" question pick.

use tracing::{debug, instrument};

use crate::analytics::CategoryPerformance;
use crate::domain::{Difficulty, Question};
use crate::store::{QuestionFilter, Store, StoreResult};

/// Correct answers needed in a row before stepping up.
pub const STREAK_TO_LEVEL_UP: u32 = 2;

/// `correct_streak` is the streak *after* this answer was counted.
pub fn next_difficulty(current: Difficulty, was_correct: bool, correct_streak: u32) -> Difficulty {
  if was_correct && correct_streak >= STREAK_TO_LEVEL_UP {
    current.up()
  } else if !was_correct {
    current.down()
  } else {
    current
  }
}

#[derive(Clone, Debug)]
pub struct PickRequest<'a> {
  pub difficulty: Difficulty,
  pub asked: &'a [String],
  pub category: Option<&'a str>,
  pub prefer_weak_category: Option<&'a str>,
}

/// Random unseen question at `difficulty`; falls back to repeats at the same
/// difficulty, then `None`.
#[instrument(level = "debug", skip(store, req), fields(difficulty = %req.difficulty, asked = req.asked.len()))]
pub async fn pick_next_question(store: &dyn Store, req: PickRequest<'_>) -> StoreResult<Option<Question>> {
  let base = QuestionFilter { category_id: req.category.map(str::to_string), difficulty: Some(req.difficulty) };

  let primary = match (req.category, req.prefer_weak_category) {
    (None, Some(weak)) => QuestionFilter { category_id: Some(weak.to_string()), ..base.clone() },
    _ => base.clone(),
  };

  if let Some(q) = store.sample_question(&primary, req.asked).await? {
    return Ok(Some(q));
  }

  debug!(target: "training", "Unseen pool exhausted; allowing repeats");
  store.sample_question(&base, &[]).await
}

/// Lowest-accuracy category, first one wins on ties.
pub fn weakest_category(performances: &[CategoryPerformance]) -> Option<&CategoryPerformance> {
  performances.iter().reduce(|best, c| if c.accuracy < best.accuracy { c } else { best })
}
