use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    delivery::{blocked, delay, throttle, DeliverySettings},
    errors::Error,
    generation::retry::RetryPolicy,
    Result,
};

pub const DEFAULT_MODEL: &str = "mistralai/mistral-small-24b-instruct";

pub const DEFAULT_COMMENT_PROMPT: &str = "You are a friendly reader. Write a short, meaningful, \
kind comment of no more than 12 words for this social media post:";

/// Process-wide settings. Per-account settings live in `session_config`.
#[derive(Clone, Debug)]
pub struct Config {
    pub sessions_dir: PathBuf,

    // Text generation endpoint
    pub neuro_addr: String,
    pub neuro_token: String,
    pub neuro_model: String,
    pub neuro_timeout: Duration,
    pub comment_prompt: String,

    /// `@username` or numeric chat id receiving delivery reports.
    pub owner: Option<String>,

    // Pacing
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub min_interval: Duration,
    pub block_ttl: Duration,
    pub max_in_flight: usize,
    pub typing_simulation: bool,

    // Generation retry
    pub generation_max_attempts: u32,
    pub generation_retry_delay: Duration,
}

impl Config {
    /// Read `.env` (existing variables win), then the process environment.
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|k| env::var(k).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            get(key).and_then(non_empty).ok_or_else(|| {
                Error::Config(format!("{key} environment variable is required"))
            })
        };
        let secs = |key: &str| get(key).and_then(|s| s.trim().parse::<u64>().ok());

        let sessions_dir = PathBuf::from(required("SESSIONS_DIR")?);
        let neuro_addr = required("NEURO_ADDR")?;
        let neuro_token = required("NEURO_TOKEN")?;
        let neuro_model = get("NEURO_MODEL")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let neuro_timeout = Duration::from_secs(secs("NEURO_TIMEOUT_SECS").unwrap_or(30));
        let comment_prompt = get("COMMENT_PROMPT")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_COMMENT_PROMPT.to_string());
        let owner = get("OWNER").and_then(non_empty);

        let min_delay = secs("COMMENT_MIN_DELAY_SECS")
            .map(Duration::from_secs)
            .unwrap_or(delay::DEFAULT_MIN_DELAY);
        let max_delay = secs("COMMENT_MAX_DELAY_SECS")
            .map(Duration::from_secs)
            .unwrap_or(delay::DEFAULT_MAX_DELAY);
        if max_delay < min_delay {
            return Err(Error::Config(format!(
                "COMMENT_MAX_DELAY_SECS ({}) is below COMMENT_MIN_DELAY_SECS ({})",
                max_delay.as_secs(),
                min_delay.as_secs()
            )));
        }
        let min_interval = secs("ACCOUNT_MIN_INTERVAL_SECS")
            .map(Duration::from_secs)
            .unwrap_or(throttle::DEFAULT_MIN_INTERVAL);
        let block_ttl = match secs("BLOCKED_CHAT_TTL_HOURS") {
            Some(h) => h.checked_mul(3600).map(Duration::from_secs).ok_or_else(|| {
                Error::Config(format!("BLOCKED_CHAT_TTL_HOURS ({h}) is out of range"))
            })?,
            None => blocked::DEFAULT_BLOCK_TTL,
        };
        let max_in_flight = get("MAX_IN_FLIGHT")
            .and_then(|s| s.trim().parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(50);
        let typing_simulation = get("TYPING_SIMULATION").map(|s| parse_bool(&s)).unwrap_or(true);

        let generation_max_attempts = get("GENERATION_MAX_ATTEMPTS")
            .and_then(|s| s.trim().parse::<u32>().ok())
            .unwrap_or(3)
            .max(1);
        let generation_retry_delay =
            Duration::from_millis(secs("GENERATION_RETRY_DELAY_MS").unwrap_or(1000));

        Ok(Self {
            sessions_dir,
            neuro_addr,
            neuro_token,
            neuro_model,
            neuro_timeout,
            comment_prompt,
            owner,
            min_delay,
            max_delay,
            min_interval,
            block_ttl,
            max_in_flight,
            typing_simulation,
            generation_max_attempts,
            generation_retry_delay,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.generation_max_attempts,
            backoff: self.generation_retry_delay,
        }
    }

    pub fn delivery_settings(&self) -> DeliverySettings {
        DeliverySettings {
            min_delay: self.min_delay,
            max_delay: self.max_delay,
            min_interval: self.min_interval,
            block_ttl: self.block_ttl,
            retry: self.retry_policy(),
            simulate_typing: self.typing_simulation,
            max_in_flight: self.max_in_flight,
        }
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // existing env wins
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((k, v)) = line.split_once('=') else {
            continue;
        };
        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim();
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = &val[1..val.len() - 1];
        }
        out.push((key.to_string(), val.to_string()));
    }
    out
}

fn parse_bool(s: &str) -> bool {
    matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s.trim().to_string())
    }
}
