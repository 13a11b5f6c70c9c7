//! Engine configuration loaded from the environment.
//!
//! Every value has a default so a local setup works with no variables set,
//! but a value that is present and cannot be parsed, or is out of range,
//! is a startup error rather than being silently replaced.

use std::path::PathBuf;
use std::str::FromStr;

use crate::infrastructure::{comfyui, ollama};
use crate::use_cases::portrait::DEFAULT_STYLE;

const DEFAULT_ROSTER_PATH: &str = "data/npcs.json";

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("{key} has invalid value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("{key} is set but empty")]
    Empty { key: &'static str },
}

/// Retry behaviour for transient dialogue failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries, just the initial attempt)
    pub max_retries: u32,
    /// Base delay in milliseconds before first retry
    pub base_delay_ms: u64,
    /// Maximum delay in milliseconds (caps exponential growth)
    pub max_delay_ms: u64,
    /// Jitter factor (0.0-1.0) for randomizing delays to prevent thundering herd
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 8000,
            jitter_factor: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DialogueConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Most recent turns rendered into a prompt.
    pub max_history_turns: usize,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            base_url: ollama::DEFAULT_OLLAMA_BASE_URL.to_string(),
            model: ollama::DEFAULT_OLLAMA_MODEL.to_string(),
            api_key: None,
            timeout_secs: ollama::DEFAULT_TIMEOUT_SECS,
            temperature: 0.8,
            max_tokens: 256,
            max_history_turns: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortraitConfig {
    pub comfyui_url: String,
    pub checkpoint: String,
    pub dir: PathBuf,
    pub url_prefix: String,
    /// Square edge length in pixels.
    pub size: u32,
    /// Art-direction text appended to every portrait prompt.
    pub style: String,
}

impl Default for PortraitConfig {
    fn default() -> Self {
        Self {
            comfyui_url: comfyui::DEFAULT_COMFYUI_BASE_URL.to_string(),
            checkpoint: comfyui::DEFAULT_CHECKPOINT.to_string(),
            dir: PathBuf::from("portraits"),
            url_prefix: "/portraits".to_string(),
            size: 512,
            style: DEFAULT_STYLE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            cors_allowed_origins: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub dialogue: DialogueConfig,
    pub retry: RetryConfig,
    pub portrait: PortraitConfig,
    pub server: ServerConfig,
    /// JSON file with the static NPC descriptors.
    pub roster_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dialogue: DialogueConfig::default(),
            retry: RetryConfig::default(),
            portrait: PortraitConfig::default(),
            server: ServerConfig::default(),
            roster_path: PathBuf::from(DEFAULT_ROSTER_PATH),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env { lookup: &lookup };
        let dialogue_defaults = DialogueConfig::default();
        let retry_defaults = RetryConfig::default();
        let portrait_defaults = PortraitConfig::default();
        let server_defaults = ServerConfig::default();

        let dialogue = DialogueConfig {
            base_url: env
                .first_string(&["DIALOGUE_BASE_URL", "OLLAMA_URL", "OLLAMA_BASE_URL"])
                .unwrap_or(dialogue_defaults.base_url),
            model: env
                .first_string(&["DIALOGUE_MODEL", "OLLAMA_MODEL"])
                .unwrap_or(dialogue_defaults.model),
            api_key: env.secret("DIALOGUE_API_KEY")?,
            timeout_secs: env
                .parse("DIALOGUE_TIMEOUT_SECS")?
                .unwrap_or(dialogue_defaults.timeout_secs),
            temperature: env
                .parse_in_range("DIALOGUE_TEMPERATURE", 0.0, 2.0)?
                .unwrap_or(dialogue_defaults.temperature),
            max_tokens: env
                .parse("DIALOGUE_MAX_TOKENS")?
                .unwrap_or(dialogue_defaults.max_tokens),
            max_history_turns: env
                .parse_in_range("HISTORY_MAX_TURNS", 1, usize::MAX)?
                .unwrap_or(dialogue_defaults.max_history_turns),
        };

        let retry = RetryConfig {
            max_retries: env
                .parse("RETRY_MAX_RETRIES")?
                .unwrap_or(retry_defaults.max_retries),
            base_delay_ms: env
                .parse("RETRY_BASE_DELAY_MS")?
                .unwrap_or(retry_defaults.base_delay_ms),
            max_delay_ms: env
                .parse("RETRY_MAX_DELAY_MS")?
                .unwrap_or(retry_defaults.max_delay_ms),
            jitter_factor: env
                .parse_in_range("RETRY_JITTER", 0.0, 1.0)?
                .unwrap_or(retry_defaults.jitter_factor),
        };

        let portrait = PortraitConfig {
            comfyui_url: env
                .first_string(&["COMFYUI_URL", "COMFYUI_BASE_URL"])
                .unwrap_or(portrait_defaults.comfyui_url),
            checkpoint: env
                .first_string(&["COMFYUI_CHECKPOINT"])
                .unwrap_or(portrait_defaults.checkpoint),
            dir: env
                .first_string(&["PORTRAIT_DIR"])
                .map(PathBuf::from)
                .unwrap_or(portrait_defaults.dir),
            url_prefix: env
                .first_string(&["PORTRAIT_URL_PREFIX"])
                .map(|prefix| url_prefix(&prefix))
                .transpose()?
                .unwrap_or(portrait_defaults.url_prefix),
            size: env
                .parse_in_range("PORTRAIT_SIZE", 64, 2048)?
                .unwrap_or(portrait_defaults.size),
            style: env
                .first_string(&["PORTRAIT_STYLE"])
                .unwrap_or(portrait_defaults.style),
        };

        let server = ServerConfig {
            host: env
                .first_string(&["SERVER_HOST"])
                .unwrap_or(server_defaults.host),
            port: match env.parse("SERVER_PORT")? {
                Some(port) => port,
                None => env.parse("PORT")?.unwrap_or(server_defaults.port),
            },
            cors_allowed_origins: env.first_string(&["CORS_ALLOWED_ORIGINS"]),
        };

        let roster_path = env
            .first_string(&["NPC_ROSTER_PATH"])
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ROSTER_PATH));

        Ok(Self {
            dialogue,
            retry,
            portrait,
            server,
            roster_path,
        })
    }
}

/// Normalise to a leading slash and no trailing slash; "/" alone is rejected.
fn url_prefix(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim_matches('/');
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid {
            key: "PORTRAIT_URL_PREFIX",
            value: raw.to_string(),
            reason: "must name a path below the root".to_string(),
        });
    }
    Ok(format!("/{trimmed}"))
}

struct Env<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl Env<'_> {
    /// First non-blank value among `keys`, trimmed.
    fn first_string(&self, keys: &[&str]) -> Option<String> {
        keys.iter()
            .filter_map(|key| (self.lookup)(key))
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty())
    }

    /// A credential: absent is fine, present-but-blank is a mistake.
    fn secret(&self, key: &'static str) -> Result<Option<String>, ConfigError> {
        match (self.lookup)(key) {
            None => Ok(None),
            Some(value) if value.trim().is_empty() => Err(ConfigError::Empty { key }),
            Some(value) => Ok(Some(value.trim().to_string())),
        }
    }

    fn parse<T>(&self, key: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let Some(raw) = (self.lookup)(key) else {
            return Ok(None);
        };
        let value = raw.trim();
        if value.is_empty() {
            return Ok(None);
        }
        value
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::Invalid {
                key,
                value: value.to_string(),
                reason: e.to_string(),
            })
    }

    fn parse_in_range<T>(&self, key: &'static str, min: T, max: T) -> Result<Option<T>, ConfigError>
    where
        T: FromStr + PartialOrd + std::fmt::Display + Copy,
        T::Err: std::fmt::Display,
    {
        let parsed = self.parse::<T>(key)?;
        if let Some(value) = parsed {
            if value < min || value > max {
                return Err(ConfigError::Invalid {
                    key,
                    value: value.to_string(),
                    reason: format!("must be between {min} and {max}"),
                });
            }
        }
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<EngineConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EngineConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = config_from(&[]).expect("config");
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.roster_path, PathBuf::from("data/npcs.json"));
        assert_eq!(config.dialogue.max_history_turns, 20);
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn reads_overrides_and_aliases() {
        let config = config_from(&[
            ("OLLAMA_URL", "http://llm:11434"),
            ("HISTORY_MAX_TURNS", "6"),
            ("RETRY_MAX_RETRIES", "5"),
            ("RETRY_JITTER", "0"),
            ("PORTRAIT_DIR", "/var/portraits"),
            ("PORT", "8080"),
            ("DIALOGUE_API_KEY", " secret "),
        ])
        .expect("config");

        assert_eq!(config.dialogue.base_url, "http://llm:11434");
        assert_eq!(config.dialogue.max_history_turns, 6);
        assert_eq!(config.dialogue.api_key.as_deref(), Some("secret"));
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.jitter_factor, 0.0);
        assert_eq!(config.portrait.dir, PathBuf::from("/var/portraits"));
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn unparseable_values_are_errors() {
        let err = config_from(&[("RETRY_MAX_RETRIES", "three")]).expect_err("must fail");
        assert!(matches!(err, ConfigError::Invalid { key: "RETRY_MAX_RETRIES", .. }));
    }

    #[test]
    fn out_of_range_values_are_errors() {
        assert!(config_from(&[("HISTORY_MAX_TURNS", "0")]).is_err());
        assert!(config_from(&[("DIALOGUE_TEMPERATURE", "3.5")]).is_err());
        assert!(config_from(&[("RETRY_JITTER", "1.5")]).is_err());
    }

    #[test]
    fn portrait_url_prefix_is_normalised() {
        let config = config_from(&[("PORTRAIT_URL_PREFIX", "static/portraits/")]).expect("config");
        assert_eq!(config.portrait.url_prefix, "/static/portraits");
        assert!(config_from(&[("PORTRAIT_URL_PREFIX", "/")]).is_err());
    }

    #[test]
    fn portrait_style_can_be_overridden() {
        let config = config_from(&[("PORTRAIT_STYLE", " watercolour sketch ")]).expect("config");
        assert_eq!(config.portrait.style, "watercolour sketch");
        assert_eq!(config_from(&[]).expect("config").portrait.style, DEFAULT_STYLE);
    }

    #[test]
    fn blank_credential_is_an_error() {
        assert_eq!(
            config_from(&[("DIALOGUE_API_KEY", "  ")]),
            Err(ConfigError::Empty { key: "DIALOGUE_API_KEY" })
        );
    }
}
