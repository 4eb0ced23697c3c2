//! # Configuration Management
//!
//! This module handles loading application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! Configuration is loaded once in `main` and handed to the components that
//! need it. Nothing reads the environment while serving a request.
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Deployment variables (`HOST`, `PORT`, `OPENAI_API_KEY`, `DB_PATH`)
//! 2. Environment variables (`APP_SERVER__PORT`, `APP_OPENAI__CHAT_MODEL`, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impls)
//!
//! ## Rust Concepts Used:
//! - **Serde**: converts between these structs and TOML/environment values
//! - **#[serde(default)]**: missing fields fall back to `Default::default()`

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Shortest bearer secret we accept.
pub const MIN_SECRET_LENGTH: usize = 8;

/// Main application configuration that contains all settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub openai: OpenAiConfig,
    pub session: SessionConfig,
    pub assets: AssetsConfig,
    pub store: StoreConfig,
}

/// Server-specific configuration settings.
///
/// ## Fields:
/// - `host`: IP address to bind to (`0.0.0.0` accepts connections from anywhere)
/// - `port`: TCP port to listen on
/// - `access_key`: when set, `/chat/*` requests must send it in `X-Access-Key`
/// - `max_upload_bytes`: largest recorded answer accepted (provider limit is 25 MiB)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub access_key: Option<String>,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            access_key: None,
            max_upload_bytes: 25 * 1024 * 1024,
        }
    }
}

/// OpenAI provider settings.
///
/// ## Models:
/// - `chat_model`: generates the interviewer's replies
/// - `transcript_model`: transcribes the candidate's recorded answers
/// - `tts_model` / `tts_voice`: read replies aloud
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub chat_model: String,
    pub transcript_model: String,
    /// ISO 639-1 language hint for transcription
    pub transcript_language: String,
    pub tts_model: String,
    pub tts_voice: String,
    pub request_timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            chat_model: "gpt-4o".to_string(),
            transcript_model: "whisper-1".to_string(),
            transcript_language: "id".to_string(),
            tts_model: "tts-1".to_string(),
            tts_voice: "nova".to_string(),
            request_timeout_secs: 60,
        }
    }
}

// Hand-written so the API key never ends up in logs
impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("chat_model", &self.chat_model)
            .field("transcript_model", &self.transcript_model)
            .field("transcript_language", &self.transcript_language)
            .field("tts_model", &self.tts_model)
            .field("tts_voice", &self.tts_voice)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// Session credential settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Length of the generated alphanumeric bearer secret
    pub secret_length: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { secret_length: 10 }
    }
}

/// Where the greeting files live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    pub dir: PathBuf,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./assets"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Sled,
}

/// Session persistence settings.
///
/// - `backend = "memory"`: sessions vanish on restart (development)
/// - `backend = "sled"`: sessions kept in an embedded database at `path`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            path: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from all sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=3000`: override server port
    /// - `APP_OPENAI__TTS_VOICE=alloy`: override the speech voice
    /// - `APP_STORE__BACKEND=sled`: persist sessions on disk
    /// - `OPENAI_API_KEY=sk-...`: provider key (deployment convention)
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        // Deployment platforms commonly set these without a prefix
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }
        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }
        if let Ok(api_key) = env::var("OPENAI_API_KEY") {
            settings = settings.set_override("openai.api_key", api_key)?;
        }
        if let Ok(db_path) = env::var("DB_PATH") {
            settings = settings
                .set_override("store.backend", "sled")?
                .set_override("store.path", db_path)?;
        }

        let config = settings
            .build()
            .context("failed to read configuration")?
            .try_deserialize()
            .context("invalid configuration")?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0
    /// - An OpenAI API key and base URL are present
    /// - The session secret is at least [`MIN_SECRET_LENGTH`] characters
    /// - The sled backend has a database path
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            bail!("Server port cannot be 0");
        }

        if self.server.max_upload_bytes == 0 {
            bail!("Upload size limit must be greater than 0");
        }

        if self.openai.api_key.trim().is_empty() {
            bail!("OPENAI_API_KEY is required");
        }

        if self.openai.base_url.trim().is_empty() {
            bail!("OpenAI base URL cannot be empty");
        }

        if self.openai.request_timeout_secs == 0 {
            bail!("Provider request timeout must be greater than 0");
        }

        if self.session.secret_length < MIN_SECRET_LENGTH {
            bail!(
                "Session secret length must be at least {} (got {})",
                MIN_SECRET_LENGTH,
                self.session.secret_length
            );
        }

        if self.store.backend == StoreBackend::Sled && self.store.path.is_none() {
            bail!("The sled store needs store.path (or DB_PATH)");
        }

        if matches!(&self.server.access_key, Some(key) if key.is_empty()) {
            bail!("Access key cannot be empty when set");
        }

        Ok(())
    }
}
