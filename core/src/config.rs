use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shape::ShapePolicy;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub endpoint: EndpointConfig,
    pub directory: DirectoryConfig,
    pub shape_policy: ShapePolicy,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub cors_origins: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: SecretString,
    pub model: String,
    pub base_url: Option<String>,
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct EndpointConfig {
    pub timeout: Duration,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DirectorySource {
    File(PathBuf),
    Sqlite(String),
}

#[derive(Clone, Debug)]
pub struct DirectoryConfig {
    pub source: DirectorySource,
    pub seed_file: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            )),
        }
    }
}

impl FromStr for DirectorySource {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if value.is_empty() {
            return Err("agent directory must not be empty".to_string());
        }
        if value.starts_with("sqlite:") {
            Ok(Self::Sqlite(value.to_string()))
        } else {
            Ok(Self::File(PathBuf::from(value)))
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable `{0}` is not set")]
    Missing(&'static str),
    #[error("invalid value for `{key}`: `{value}` ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8000";
const DEFAULT_CORS_ORIGINS: &str = "http://localhost:3000,http://localhost:3001";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_LLM_TIMEOUT_SECS: u64 = 60;
const DEFAULT_ENDPOINT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_DIRECTORY: &str = "agents/agents.json";

impl AppConfig {
    /// Loads `.env` (if any) and reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let api_key = get("OPENAI_API_KEY").ok_or(ConfigError::Missing("OPENAI_API_KEY"))?;

        let cors_origins = get("CORS_ORIGINS")
            .unwrap_or_else(|| DEFAULT_CORS_ORIGINS.to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        Ok(Self {
            server: ServerConfig {
                bind_address: get("BIND_ADDRESS").unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string()),
                cors_origins,
            },
            llm: LlmConfig {
                api_key: SecretString::from(api_key),
                model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                base_url: get("OPENAI_BASE_URL"),
                timeout: seconds(&get, "LLM_TIMEOUT_SECS", DEFAULT_LLM_TIMEOUT_SECS)?,
            },
            endpoint: EndpointConfig {
                timeout: seconds(&get, "ENDPOINT_TIMEOUT_SECS", DEFAULT_ENDPOINT_TIMEOUT_SECS)?,
            },
            directory: DirectoryConfig {
                source: parse(&get, "AGENT_DIRECTORY", DEFAULT_DIRECTORY)?,
                seed_file: get("AGENT_SEED_FILE").map(PathBuf::from),
            },
            shape_policy: parse(&get, "SHAPE_POLICY", "warn")?,
            logging: LoggingConfig {
                level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
                format: parse(&get, "LOG_FORMAT", "compact")?,
            },
        })
    }
}

fn parse<T, G>(get: &G, key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr<Err = String>,
    G: Fn(&str) -> Option<String>,
{
    let value = get(key).unwrap_or_else(|| default.to_string());
    value.parse().map_err(|reason| ConfigError::Invalid {
        key,
        value,
        reason,
    })
}

fn seconds<G>(get: &G, key: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let Some(value) = get(key) else {
        return Ok(Duration::from_secs(default));
    };
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::Invalid {
            key,
            value,
            reason: "expected a positive number of seconds".to_string(),
        }),
    }
}
