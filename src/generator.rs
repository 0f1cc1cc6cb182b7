//! AI question generation: prompt, call, validate, map onto a `Question`.

use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::adaptive::weakest_category;
use crate::analytics::CategoryPerformance;
use crate::config::Prompts;
use crate::domain::{Difficulty, Question};
use crate::llm::{LlmClient, LlmError};
use crate::store::{QuestionFilter, Store, StoreError};
use crate::util::{fill_template, preview};

pub const DEFAULT_CATEGORY_ID: &str = "general";
pub const DEFAULT_CATEGORY_NAME: &str = "Cybersecurity";
pub const DEFAULT_EXPLANATION: &str = "AI-generated question";
const REQUIRED_OPTIONS: usize = 4;

#[derive(Debug, Error)]
pub enum GenerateError {
  #[error(transparent)]
  Llm(#[from] LlmError),
  #[error(transparent)]
  Store(#[from] StoreError),
  #[error("invalid generated question: {0}")]
  Invalid(String),
}

#[derive(Clone, Debug)]
pub struct GenerateRequest {
  pub difficulty: Difficulty,
  pub category_id: Option<String>,
  pub weak_areas: Vec<CategoryPerformance>,
}

impl Default for GenerateRequest {
  fn default() -> Self {
    Self { difficulty: Difficulty::new(2), category_id: None, weak_areas: Vec::new() }
  }
}

/// Shape the model is asked to return.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDraft {
  #[serde(default)]
  pub question: String,
  #[serde(default)]
  pub options: Vec<String>,
  #[serde(alias = "correct_index")]
  pub correct_index: i64,
  #[serde(default)]
  pub explanation: Option<String>,
}

/// Turn a draft into a storable question, enforcing four options and an index in 0..=3.
pub fn validate_draft(
  draft: QuestionDraft,
  difficulty: Difficulty,
  category_id: Option<&str>,
  category_name: &str,
) -> Result<Question, GenerateError> {
  if draft.question.trim().is_empty() {
    return Err(GenerateError::Invalid("question text is empty".into()));
  }
  if draft.options.len() != REQUIRED_OPTIONS {
    return Err(GenerateError::Invalid(format!("expected {REQUIRED_OPTIONS} options, got {}", draft.options.len())));
  }
  let correct_index = usize::try_from(draft.correct_index)
    .ok()
    .filter(|i| *i < REQUIRED_OPTIONS)
    .ok_or_else(|| GenerateError::Invalid(format!("correctIndex {} out of range", draft.correct_index)))?;

  Ok(Question {
    id: Uuid::new_v4().to_string(),
    external_id: format!("ai-generated-{}", Uuid::new_v4()),
    category_id: category_id.unwrap_or(DEFAULT_CATEGORY_ID).to_string(),
    category_name: category_name.to_string(),
    difficulty,
    text: draft.question.trim().to_string(),
    options: draft.options,
    correct_index,
    explanation: draft
      .explanation
      .filter(|e| !e.trim().is_empty())
      .unwrap_or_else(|| DEFAULT_EXPLANATION.into()),
    created_at: Utc::now(),
  })
}

/// Explicit category wins; otherwise the weakest area, if any.
pub fn target_category(req: &GenerateRequest) -> Option<String> {
  req
    .category_id
    .clone()
    .filter(|c| !c.trim().is_empty())
    .or_else(|| weakest_category(&req.weak_areas).map(|c| c.category_id.clone()))
}

/// Generate one question. The result is not stored.
#[instrument(level = "info", skip(llm, prompts, store, req), fields(difficulty = %req.difficulty))]
pub async fn generate_question(
  llm: &LlmClient,
  prompts: &Prompts,
  store: &dyn Store,
  req: &GenerateRequest,
) -> Result<Question, GenerateError> {
  let category_id = target_category(req);
  let category_name = match &category_id {
    Some(id) => {
      let filter = QuestionFilter { category_id: Some(id.clone()), difficulty: None };
      store
        .sample_question(&filter, &[])
        .await?
        .map(|q| q.category_name)
        .unwrap_or_else(|| DEFAULT_CATEGORY_NAME.into())
    }
    None => DEFAULT_CATEGORY_NAME.into(),
  };

  let level = req.difficulty.to_string();
  let user = fill_template(
    &prompts.generator_user_template,
    &[("label", req.difficulty.label()), ("difficulty", &level), ("category", &category_name)],
  );
  let draft: QuestionDraft = llm.chat_json(&llm.strong_model, &prompts.generator_system, &user, 0.9).await?;

  match validate_draft(draft, req.difficulty, category_id.as_deref(), &category_name) {
    Ok(q) => {
      info!(target: "training", question_id = %q.id, category = %q.category_id, text = %preview(&q.text, 40), "Generated question");
      Ok(q)
    }
    Err(e) => {
      warn!(target: "training", error = %e, "Model returned an unusable question");
      Err(e)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn draft(options: usize, correct: i64) -> QuestionDraft {
    QuestionDraft {
      question: "What is vishing?".into(),
      options: (0..options).map(|i| format!("option {i}")).collect(),
      correct_index: correct,
      explanation: None,
    }
  }

  #[test]
  fn exactly_four_options_required() {
    assert!(validate_draft(draft(3, 0), Difficulty::MIN, None, "x").is_err());
    assert!(validate_draft(draft(5, 0), Difficulty::MIN, None, "x").is_err());
    assert!(validate_draft(draft(4, 0), Difficulty::MIN, None, "x").is_ok());
  }

  #[test]
  fn correct_index_bounds() {
    assert!(validate_draft(draft(4, 3), Difficulty::MIN, None, "x").is_ok());
    assert!(validate_draft(draft(4, 4), Difficulty::MIN, None, "x").is_err());
    assert!(validate_draft(draft(4, -1), Difficulty::MIN, None, "x").is_err());
  }

  #[test]
  fn defaults_are_filled() {
    let q = validate_draft(draft(4, 1), Difficulty::new(3), None, DEFAULT_CATEGORY_NAME).expect("valid");
    assert_eq!(q.category_id, "general");
    assert_eq!(q.explanation, "AI-generated question");
    assert!(q.external_id.starts_with("ai-generated-"));
    assert_eq!(q.difficulty.value(), 3);
  }

  #[test]
  fn weakest_area_is_targeted_without_explicit_category() {
    let perf = |id: &str, accuracy| CategoryPerformance {
      category_id: id.into(),
      category: id.into(),
      asked: 4,
      correct: 1,
      accuracy,
    };
    let mut req = GenerateRequest { weak_areas: vec![perf("mail", 50), perf("phish", 25)], ..Default::default() };
    assert_eq!(target_category(&req).as_deref(), Some("phish"));
    req.category_id = Some("social".into());
    assert_eq!(target_category(&req).as_deref(), Some("social"));
    assert_eq!(target_category(&GenerateRequest::default()), None);
  }

  #[test]
  fn draft_accepts_camel_case_json() {
    let d: QuestionDraft = crate::llm::decode_json(
      r#"{"question":"Q?","options":["a","b","c","d"],"correctIndex":2,"explanation":"because"}"#,
    )
    .expect("draft");
    assert_eq!(d.correct_index, 2);
  }
}
