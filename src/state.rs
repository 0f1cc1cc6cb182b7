//! Application state shared by every handler behind an `Arc`.
//!
//! This module owns:
//!   - the store (memory or SQLite, chosen from config)
//!   - signing keys and bcrypt cost
//!   - the optional LLM client and prompts
//!   - the study-notes cache and known category descriptions
//!
//! Startup seeds the built-in question bank, an optional JSON bank, and the bootstrap admin.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::{error, info, instrument, warn};

use crate::auth::AuthKeys;
use crate::config::{AppConfig, Prompts};
use crate::llm::LlmClient;
use crate::seeds::{bootstrap_admin, builtin_descriptions, builtin_questions, load_question_bank, seed_questions};
use crate::store::{self, DynStore, StoreResult};

pub struct AppState {
    pub config: AppConfig,
    pub store: DynStore,
    pub auth: AuthKeys,
    pub llm: Option<LlmClient>,
    pub prompts: Prompts,
    pub notes_cache: RwLock<HashMap<String, String>>,
    pub category_descriptions: HashMap<String, String>,
}

impl AppState {
    /// Open the configured store, seed content, and build the LLM client from env.
    #[instrument(level = "info", skip_all)]
    pub async fn new(config: AppConfig) -> StoreResult<Self> {
        let store = store::open(config.database_url.as_deref()).await?;

        let llm = LlmClient::from_env();
        if let Some(c) = &llm {
            info!(target: "cyberlms_backend", base_url = %c.base_url, fast_model = %c.fast_model, strong_model = %c.strong_model, "LLM enabled.");
        } else {
            info!(target: "cyberlms_backend", "LLM disabled (no OPENAI_API_KEY). Using deterministic fallbacks.");
        }

        Self::assemble(config, store, llm).await
    }

    /// Seed `store` and wrap everything up. Shared by `new` and tests.
    pub async fn assemble(config: AppConfig, store: DynStore, llm: Option<LlmClient>) -> StoreResult<Self> {
        let mut descriptions = builtin_descriptions();
        seed_questions(&store, &builtin_questions()).await?;

        if let Some(path) = &config.question_bank_path {
            match load_question_bank(path) {
                Ok((questions, extra)) => {
                    seed_questions(&store, &questions).await?;
                    descriptions.extend(extra);
                }
                Err(e) => error!(target: "cyberlms_backend", %path, error = %e, "Question bank not loaded"),
            }
        }

        if let Some(admin) = &config.admin {
            if let Err(e) = bootstrap_admin(&store, admin, config.auth.bcrypt_cost).await {
                warn!(target: "auth", error = %e, "Admin bootstrap failed");
            }
        }

        Ok(Self {
            auth: AuthKeys::new(&config.auth),
            prompts: config.prompts.clone(),
            config,
            store,
            llm,
            notes_cache: RwLock::new(HashMap::new()),
            category_descriptions: descriptions,
        })
    }

    pub fn category_description(&self, category_id: &str, name: &str) -> String {
        self.category_descriptions
            .get(category_id)
            .cloned()
            .unwrap_or_else(|| format!("Cybersecurity training: {name}"))
    }

    /// In-memory state with the built-in bank and no LLM.
    #[cfg(test)]
    pub async fn for_tests() -> Self {
        Self::for_tests_with_llm(None).await
    }

    #[cfg(test)]
    pub async fn for_tests_with_llm(llm: Option<LlmClient>) -> Self {
        let store: DynStore = std::sync::Arc::new(crate::store::MemoryStore::new());
        Self::assemble(AppConfig::for_tests(), store, llm)
            .await
            .expect("test state")
    }
}
