//! Environment-backed configuration, loaded once at startup.

use std::env;

const DEFAULT_DATABASE_PATH: &str = "./data/torgibot.db";

/// Runtime settings collected from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Path to the SQLite database file.
    pub database_path: String,
    /// VseGPT API key; extraction falls back to keywords without one.
    pub vsegpt_api_key: Option<String>,
    /// Model identifier override, e.g. "openai/gpt-4o-mini".
    pub vsegpt_model: Option<String>,
    /// Gateway URL override; must end with "v1".
    pub vsegpt_base_url: Option<String>,
    /// Yandex Maps geocoder key; distance features degrade without one.
    pub yandex_geocoder_api_key: Option<String>,
}

impl Settings {
    /// Read settings from the process environment. Call after
    /// `dotenv::dotenv()` so `.env` values are visible.
    pub fn from_env() -> Self {
        Self {
            database_path: env::var("DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_PATH.to_string()),
            vsegpt_api_key: env::var("VSE_GPT_API_KEY").ok().filter(|v| !v.is_empty()),
            vsegpt_model: env::var("VSE_GPT_MODEL").ok().filter(|v| !v.is_empty()),
            vsegpt_base_url: env::var("VSE_GPT_BASE_URL").ok().filter(|v| !v.is_empty()),
            yandex_geocoder_api_key: env::var("YANDEX_GEOCODER_API_KEY")
                .ok()
                .filter(|v| !v.is_empty()),
        }
    }
}
