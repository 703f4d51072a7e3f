use std::env;
use std::path::PathBuf;

use crate::error::{BotError, BotResult};
use crate::music::StopBehavior;

/// Also used for logging when the configuration itself cannot be read.
pub const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_PERSONA: &str = "You are a gentle, mysterious companion who chats with members of this \
community. Answer warmly, keep a light playful tone and stay concise.";

#[derive(Clone, Debug)]
pub struct SearchConfig {
    pub api_key: String,
    pub engine_id: String,
}

#[derive(Clone, Debug)]
pub struct AiConfig {
    pub api_key: String,
    pub model: String,
    pub persona: String,
    pub search: Option<SearchConfig>,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub discord_token: String,
    pub application_id: u64,
    pub api_endpoint: String,
    pub accept_invalid_certs: bool,
    pub ai: Option<AiConfig>,
    pub playlist_path: PathBuf,
    pub memory_dir: PathBuf,
    pub download_dir: PathBuf,
    pub log_dir: PathBuf,
    pub welcome_banner: PathBuf,
    pub stop_behavior: StopBehavior,
}

impl Config {
    /// Reads the process environment. Call `dotenvy::dotenv()` first.
    pub fn from_env() -> BotResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> BotResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &'static str| lookup(key).filter(|value| !value.trim().is_empty());
        let required = |key: &'static str| var(key).ok_or(BotError::MissingEnv(key));

        let discord_token = required("DISCORD_TOKEN")?;

        let application_id = required("APPLICATION_ID")?;
        let application_id = application_id
            .trim()
            .parse::<u64>()
            .map_err(|_| BotError::InvalidEnv {
                name: "APPLICATION_ID",
                value: application_id.clone(),
            })?;

        let api_endpoint = required("API_ENDPOINT")?.trim_end_matches('/').to_string();
        let accept_invalid_certs =
            parse_bool("API_ACCEPT_INVALID_CERTS", var("API_ACCEPT_INVALID_CERTS"), false)?;

        let search = match (var("GOOGLE_CSE_API_KEY"), var("GOOGLE_CSE_CX")) {
            (Some(api_key), Some(engine_id)) => Some(SearchConfig { api_key, engine_id }),
            _ => None,
        };

        let ai = var("GEMINI_API_KEY").map(|api_key| AiConfig {
            api_key,
            model: var("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            persona: var("AI_PERSONA").unwrap_or_else(|| DEFAULT_PERSONA.to_string()),
            search,
        });

        let stop_clears =
            parse_bool("MUSIC_STOP_CLEARS_PLAYLIST", var("MUSIC_STOP_CLEARS_PLAYLIST"), true)?;
        let stop_behavior = if stop_clears {
            StopBehavior::ClearPlaylist
        } else {
            StopBehavior::KeepPlaylist
        };

        let path = |key: &'static str, default: &str| {
            PathBuf::from(var(key).unwrap_or_else(|| default.to_string()))
        };

        Ok(Config {
            discord_token,
            application_id,
            api_endpoint,
            accept_invalid_certs,
            ai,
            playlist_path: path("PLAYLIST_PATH", "data/playlists.json"),
            memory_dir: path("MEMORY_DIR", "data/memory"),
            download_dir: path("DOWNLOAD_DIR", "downloads"),
            log_dir: path("LOG_DIR", DEFAULT_LOG_DIR),
            welcome_banner: path("WELCOME_BANNER", "assets/welcome-banner.png"),
            stop_behavior,
        })
    }
}

fn parse_bool(name: &'static str, value: Option<String>, default: bool) -> BotResult<bool> {
    match value.as_deref().map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(v) => Err(BotError::InvalidEnv { name, value: v }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const MINIMAL: [(&str, &str); 3] = [
        ("DISCORD_TOKEN", "token"),
        ("APPLICATION_ID", "1234"),
        ("API_ENDPOINT", "https://config.example/"),
    ];

    #[test]
    fn test_minimal_config_uses_defaults() {
        // Act
        let config = Config::from_lookup(lookup(&MINIMAL)).unwrap();

        // Assert
        assert_eq!(config.application_id, 1234);
        assert_eq!(config.api_endpoint, "https://config.example");
        assert!(!config.accept_invalid_certs);
        assert!(config.ai.is_none());
        assert_eq!(config.playlist_path, PathBuf::from("data/playlists.json"));
        assert_eq!(config.stop_behavior, StopBehavior::ClearPlaylist);
    }

    #[test]
    fn test_missing_token_is_an_error() {
        let result = Config::from_lookup(lookup(&[("APPLICATION_ID", "1"), ("API_ENDPOINT", "x")]));

        assert!(matches!(result, Err(BotError::MissingEnv("DISCORD_TOKEN"))));
    }

    #[test]
    fn test_non_numeric_application_id_is_rejected() {
        let result = Config::from_lookup(lookup(&[
            ("DISCORD_TOKEN", "t"),
            ("APPLICATION_ID", "abc"),
            ("API_ENDPOINT", "x"),
        ]));

        assert!(matches!(result, Err(BotError::InvalidEnv { name: "APPLICATION_ID", .. })));
    }

    #[test]
    fn test_ai_and_search_are_enabled_together() {
        // Arrange
        let mut pairs = MINIMAL.to_vec();
        pairs.extend([
            ("GEMINI_API_KEY", "g"),
            ("GOOGLE_CSE_API_KEY", "s"),
            ("GOOGLE_CSE_CX", "cx"),
            ("MUSIC_STOP_CLEARS_PLAYLIST", "false"),
        ]);

        // Act
        let config = Config::from_lookup(lookup(&pairs)).unwrap();

        // Assert
        let ai = config.ai.expect("ai config");
        assert_eq!(ai.model, DEFAULT_GEMINI_MODEL);
        assert_eq!(ai.search.expect("search config").engine_id, "cx");
        assert_eq!(config.stop_behavior, StopBehavior::KeepPlaylist);
    }

    #[test]
    fn test_search_needs_both_keys() {
        let mut pairs = MINIMAL.to_vec();
        pairs.extend([("GEMINI_API_KEY", "g"), ("GOOGLE_CSE_API_KEY", "s")]);

        let config = Config::from_lookup(lookup(&pairs)).unwrap();

        assert!(config.ai.unwrap().search.is_none());
    }

    #[test]
    fn test_bad_boolean_is_rejected() {
        let mut pairs = MINIMAL.to_vec();
        pairs.push(("API_ACCEPT_INVALID_CERTS", "maybe"));

        let result = Config::from_lookup(lookup(&pairs));

        assert!(matches!(result, Err(BotError::InvalidEnv { name: "API_ACCEPT_INVALID_CERTS", .. })));
    }
}
