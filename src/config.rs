//! Runtime configuration: environment variables plus an optional TOML file.
//!
//! The TOML file (path in `LMS_CONFIG_PATH`) may override prompts, the question
//! bank path and auth settings. Environment variables win over the file.

use serde::Deserialize;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Optional file-level overrides.
#[derive(Clone, Debug, Deserialize, Default)]
pub struct FileConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub question_bank_path: Option<String>,
  #[serde(default)]
  pub auth: AuthFileConfig,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AuthFileConfig {
  #[serde(default)] pub jwt_secret: Option<String>,
  #[serde(default)] pub token_ttl_secs: Option<i64>,
  #[serde(default)] pub bcrypt_cost: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct AuthSettings {
  pub jwt_secret: String,
  pub token_ttl_secs: i64,
  pub bcrypt_cost: u32,
}

#[derive(Clone, Debug)]
pub struct AdminBootstrap {
  pub email: String,
  pub password: String,
}

/// Fully resolved settings the server runs with.
#[derive(Clone, Debug)]
pub struct AppConfig {
  pub port: u16,
  pub auth: AuthSettings,
  pub database_url: Option<String>,
  pub question_bank_path: Option<String>,
  pub static_dir: String,
  pub admin: Option<AdminBootstrap>,
  pub prompts: Prompts,
}

pub const DEFAULT_TOKEN_TTL_SECS: i64 = 86_400;

/// Prompt templates sent to the LLM. Placeholders use `{name}` and are filled by
/// `util::fill_template`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub tutor_system: String,
  pub tutor_user_template: String,
  pub reasoning_system: String,
  pub reasoning_user_template: String,
  pub mentor_system: String,
  pub mentor_user_template: String,
  pub generator_system: String,
  pub generator_user_template: String,
  pub notes_system: String,
  pub notes_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      tutor_system: "You are a supportive cybersecurity tutor. Reply in 2-3 short sentences.".into(),
      tutor_user_template: "Question: {question}\nLearner chose: {selected}\nCorrect answer: {correct}\nResult: {result}\nExplanation: {explanation}\n\nGive encouraging feedback. If wrong, explain the key concept without lecturing.".into(),
      reasoning_system: "You grade short free-text answers about cybersecurity. Output JSON only.".into(),
      reasoning_user_template: "Question: {question}\nCorrect answer: {correct}\nLearner reasoning: {answer}\n\nReturn JSON {\"isCorrect\": boolean, \"score\": number between 0 and 1, \"feedback\": string}.".into(),
      mentor_system: "You are a friendly cybersecurity mentor helping a learner during an adaptive training session. Be concise, practical and never reveal the answer to the current question.".into(),
      mentor_user_template: "Session context: {session}\nCurrent question hint: {question_hint}\nOverall progress: {progress}\n\nLearner says: {message}".into(),
      generator_system: "You write multiple-choice cybersecurity questions. Output strict JSON only.".into(),
      generator_user_template: "Write one {label} question (difficulty {difficulty} of 5) about {category}. Return JSON {\"question\": string, \"options\": [4 strings], \"correctIndex\": 0-3, \"explanation\": string}.".into(),
      notes_system: "You are a cybersecurity instructor writing concise study notes in Markdown.".into(),
      notes_user_template: "Write a study guide for the module \"{category}\". Cover key concepts, common attack patterns, red flags and defensive habits. Use these sample questions for scope:\n{samples}".into(),
    }
  }
}

/// Read and parse the TOML file at `LMS_CONFIG_PATH`. Errors are logged and yield `None`.
pub fn load_file_config_from_env() -> Option<FileConfig> {
  let path = std::env::var("LMS_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<FileConfig>(&s) {
      Ok(cfg) => {
        info!(target: "cyberlms_backend", %path, "Loaded config file (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "cyberlms_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "cyberlms_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

fn env_nonempty(key: &str) -> Option<String> {
  std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
  let raw = env_nonempty(key)?;
  match raw.parse() {
    Ok(v) => Some(v),
    Err(_) => {
      warn!(target: "cyberlms_backend", %key, value = %raw, "Ignoring unparsable env value");
      None
    }
  }
}

impl AppConfig {
  /// Resolve configuration from the process environment (and the optional TOML file).
  pub fn from_env() -> Self {
    let file = load_file_config_from_env().unwrap_or_default();

    let jwt_secret = match env_nonempty("JWT_SECRET").or(file.auth.jwt_secret) {
      Some(s) => s,
      None => {
        warn!(target: "auth", "JWT_SECRET not set; using a random per-process secret (tokens die on restart)");
        format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
      }
    };

    let admin = match (env_nonempty("ADMIN_EMAIL"), env_nonempty("ADMIN_PASSWORD")) {
      (Some(email), Some(password)) => Some(AdminBootstrap { email, password }),
      _ => None,
    };

    Self {
      port: env_parse("PORT").unwrap_or(3000),
      auth: AuthSettings {
        jwt_secret,
        token_ttl_secs: env_parse("TOKEN_TTL_SECS")
          .or(file.auth.token_ttl_secs)
          .unwrap_or(DEFAULT_TOKEN_TTL_SECS),
        bcrypt_cost: file.auth.bcrypt_cost.unwrap_or(bcrypt::DEFAULT_COST),
      },
      database_url: env_nonempty("DATABASE_URL"),
      question_bank_path: env_nonempty("QUESTION_BANK_PATH").or(file.question_bank_path),
      static_dir: env_nonempty("STATIC_DIR").unwrap_or_else(|| "./static".into()),
      admin,
      prompts: file.prompts,
    }
  }

  /// In-memory settings with a fixed secret and the cheapest bcrypt cost.
  #[cfg(test)]
  pub fn for_tests() -> Self {
    Self {
      port: 0,
      auth: AuthSettings { jwt_secret: "test-secret".into(), token_ttl_secs: 3600, bcrypt_cost: 4 },
      database_url: None,
      question_bank_path: None,
      static_dir: "./static".into(),
      admin: None,
      prompts: Prompts::default(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn partial_toml_keeps_default_prompts() {
    let raw = r#"
      question_bank_path = "bank.json"

      [prompts]
      mentor_system = "Be brief."

      [auth]
      token_ttl_secs = 60
    "#;
    let cfg: FileConfig = toml::from_str(raw).expect("toml");
    assert_eq!(cfg.prompts.mentor_system, "Be brief.");
    assert_eq!(cfg.prompts.tutor_system, Prompts::default().tutor_system);
    assert_eq!(cfg.auth.token_ttl_secs, Some(60));
    assert_eq!(cfg.question_bank_path.as_deref(), Some("bank.json"));
  }

  #[test]
  fn default_templates_carry_their_placeholders() {
    let p = Prompts::default();
    assert!(p.generator_user_template.contains("{category}"));
    assert!(p.mentor_user_template.contains("{message}"));
    assert!(p.reasoning_user_template.contains("{answer}"));
  }
}
