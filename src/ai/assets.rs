//! # Greeting Assets
//!
//! Every session starts from the same three files in the asset directory:
//! - `system_prompt.txt` - interview instructions for the model
//! - `greeting.txt` - the first thing the interviewer says
//! - `greeting.mp3` - pre-recorded audio of the greeting
//!
//! Files are read on every call so they can be edited without a restart.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const SYSTEM_PROMPT_FILE: &str = "system_prompt.txt";
pub const GREETING_TEXT_FILE: &str = "greeting.txt";
pub const GREETING_AUDIO_FILE: &str = "greeting.mp3";

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to read asset {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("asset {0} is empty")]
    Empty(PathBuf),
}

/// Material a new session starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Greeting {
    pub system_prompt: String,
    pub text: String,
    pub audio: Vec<u8>,
}

#[async_trait]
pub trait GreetingSource: Send + Sync {
    async fn greeting(&self) -> Result<Greeting, AssetError>;
}

pub struct FileGreetingSource {
    dir: PathBuf,
}

impl FileGreetingSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    async fn read_bytes(&self, name: &str) -> Result<Vec<u8>, AssetError> {
        let path = self.dir.join(name);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|source| AssetError::Unreadable { path: path.clone(), source })?;
        if bytes.is_empty() {
            return Err(AssetError::Empty(path));
        }
        Ok(bytes)
    }

    async fn read_text(&self, name: &str) -> Result<String, AssetError> {
        let path = self.dir.join(name);
        let bytes = self.read_bytes(name).await?;
        let text = String::from_utf8(bytes).map_err(|e| AssetError::Unreadable {
            path: path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;

        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(AssetError::Empty(path));
        }
        Ok(text)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl GreetingSource for FileGreetingSource {
    async fn greeting(&self) -> Result<Greeting, AssetError> {
        Ok(Greeting {
            system_prompt: self.read_text(SYSTEM_PROMPT_FILE).await?,
            text: self.read_text(GREETING_TEXT_FILE).await?,
            audio: self.read_bytes(GREETING_AUDIO_FILE).await?,
        })
    }
}
