use thiserror::Error;

use crate::music::MusicError;

/// Top-level error for everything outside the playback state machine.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("missing environment variable {0}")]
    MissingEnv(&'static str),

    #[error("invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },

    #[error(transparent)]
    Discord(#[from] serenity::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Music(#[from] MusicError),

    #[error("yt-dlp failed for {url}: {reason}")]
    Extractor { url: String, reason: String },

    #[error("generative AI returned an empty answer")]
    EmptyCompletion,

    #[error("{0}")]
    Command(String),
}

pub type BotResult<T = ()> = Result<T, BotError>;

impl From<&str> for BotError {
    fn from(message: &str) -> Self {
        BotError::Command(message.to_string())
    }
}

impl From<String> for BotError {
    fn from(message: String) -> Self {
        BotError::Command(message)
    }
}
