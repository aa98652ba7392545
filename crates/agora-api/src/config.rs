//! Server configuration read from the environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use agora_narrator::HttpNarratorConfig;
use agora_session::config::EngineConfig;
use chrono::TimeDelta;

use crate::error::AppError;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_MAX_TOKENS: u32 = 600;
const DEFAULT_TEMPERATURE: f32 = 0.8;

/// Everything the server needs to start.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `PostgreSQL` connection string.
    pub database_url: String,
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Narrator endpoint settings.
    pub narrator: HttpNarratorConfig,
    /// Engine tunables.
    pub engine: EngineConfig,
    /// Period of the in-process tick loop; `None` disables it.
    pub tick_interval: Option<Duration>,
    /// Directory of scenario documents replacing the built-in catalog.
    pub scenario_dir: Option<PathBuf>,
}

impl ServerConfig {
    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a required variable is missing or a
    /// value does not parse or fails validation.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a required variable is missing or a
    /// value does not parse or fails validation.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let narrator_timeout = Duration::from_secs(env.parse_or("NARRATOR_TIMEOUT_SECS", 60)?);
        let claim_lease = match env.get("CLAIM_LEASE_SECS") {
            Some(_) => env.seconds_or("CLAIM_LEASE_SECS", 0)?,
            None => i64::try_from(narrator_timeout.as_secs().saturating_mul(3))
                .ok()
                .and_then(TimeDelta::try_seconds)
                .ok_or_else(|| AppError::Config("NARRATOR_TIMEOUT_SECS is too large".into()))?,
        };

        let engine = EngineConfig {
            round_duration: env.seconds_or("ROUND_DURATION_SECS", 3600)?,
            matchmaking_timeout: env.seconds_or("MATCHMAKING_TIMEOUT_SECS", 1800)?,
            agent_recency: env.seconds_or("AGENT_RECENCY_SECS", 900)?,
            narrator_timeout,
            claim_lease,
            max_action_chars: env.parse_or("MAX_ACTION_CHARS", 2000)?,
        };
        engine
            .validate()
            .map_err(|e| AppError::Config(e.to_string()))?;

        let narrator = HttpNarratorConfig {
            endpoint: env.require("NARRATOR_URL")?,
            model: env
                .get("NARRATOR_MODEL")
                .unwrap_or_else(|| DEFAULT_MODEL.to_owned()),
            api_key: env.get("NARRATOR_API_KEY").filter(|key| !key.is_empty()),
            timeout: narrator_timeout,
            max_tokens: env.parse_or("NARRATOR_MAX_TOKENS", DEFAULT_MAX_TOKENS)?,
            temperature: env.parse_or("NARRATOR_TEMPERATURE", DEFAULT_TEMPERATURE)?,
        };

        let tick_secs: u64 = env.parse_or("TICK_INTERVAL_SECS", 0)?;

        Ok(Self {
            database_url: env.require("DATABASE_URL")?,
            host: env.get("HOST").unwrap_or_else(|| DEFAULT_HOST.to_owned()),
            port: env.parse_or("PORT", DEFAULT_PORT)?,
            narrator,
            engine,
            tick_interval: (tick_secs > 0).then(|| Duration::from_secs(tick_secs)),
            scenario_dir: env.get("SCENARIO_DIR").map(PathBuf::from),
        })
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn require(&self, key: &str) -> Result<String, AppError> {
        self.get(key)
            .ok_or_else(|| AppError::Config(format!("{key} environment variable must be set")))
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T, AppError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e| AppError::Config(format!("{key} is invalid: {e}"))),
            None => Ok(default),
        }
    }

    fn seconds_or(&self, key: &str, default: i64) -> Result<TimeDelta, AppError> {
        let secs = self.parse_or(key, default)?;
        TimeDelta::try_seconds(secs)
            .ok_or_else(|| AppError::Config(format!("{key} is out of range: {secs}")))
    }
}
