use std::{env, path::PathBuf};

use async_trait::async_trait;
use serde::Deserialize;

use crate::{Error, Result};

/// Settings of one account, read from `<sessions_dir>/<name>/<name>.json`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    pub session_name: String,
    pub bot_token: String,
    /// Subscription list joined at startup (`@username` or invite link).
    pub channels: Vec<String>,
    /// Overrides the process-wide `OWNER`.
    pub owner: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionFile {
    #[serde(default)]
    session_name: Option<String>,
    #[serde(default)]
    bot_token: String,
    #[serde(default)]
    channels: Vec<String>,
    #[serde(default)]
    owner: Option<String>,
}

#[async_trait]
pub trait SessionConfigRepo: Send + Sync {
    async fn list_sessions(&self) -> Result<Vec<String>>;
    async fn get_session_config(&self, name: &str) -> Result<SessionConfig>;
}

/// One sub-directory per account, each holding a JSON file named after it.
pub struct JsonSessionConfigRepo {
    dir: PathBuf,
}

impl JsonSessionConfigRepo {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl SessionConfigRepo for JsonSessionConfigRepo {
    async fn list_sessions(&self) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with('.') {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    async fn get_session_config(&self, name: &str) -> Result<SessionConfig> {
        let path = self.dir.join(name).join(format!("{name}.json"));
        let raw = tokio::fs::read_to_string(&path).await.map_err(|e| {
            Error::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let value: serde_json::Value = serde_json::from_str(&raw)?;
        let file: SessionFile = serde_json::from_value(interpolate_env(value))?;

        let bot_token = file.bot_token.trim().to_string();
        if bot_token.is_empty() {
            return Err(Error::Config(format!("{name}: bot_token is empty")));
        }

        Ok(SessionConfig {
            session_name: file
                .session_name
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| name.to_string()),
            bot_token,
            channels: file
                .channels
                .into_iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
            owner: file.owner.filter(|o| !o.trim().is_empty()),
        })
    }
}

/// Recursively expand `${VAR}` placeholders in every JSON string.
fn interpolate_env(v: serde_json::Value) -> serde_json::Value {
    use serde_json::Value;
    match v {
        Value::String(s) => Value::String(expand_vars(&s)),
        Value::Array(xs) => Value::Array(xs.into_iter().map(interpolate_env).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, interpolate_env(v)))
                .collect(),
        ),
        other => other,
    }
}

/// Unset variables expand to "". An unterminated `${` is kept literally.
fn expand_vars(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start + 2..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let name = &rest[start + 2..start + 2 + len];
        out.push_str(&env::var(name).unwrap_or_default());
        rest = &rest[start + 2 + len + 1..];
    }
    out.push_str(rest);
    out
}
