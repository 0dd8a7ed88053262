use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use thiserror::Error;
use url::Url;

pub const SETTINGS_FILE: &str = "client.toml";
const APP_DIR_NAME: &str = "patch-project";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid api url '{url}': {reason}")]
    InvalidApiUrl { url: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub api_url: String,
    pub request_timeout_secs: u64,
    pub token_key: String,
    pub data_dir: PathBuf,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".into(),
            request_timeout_secs: 30,
            token_key: "token".into(),
            data_dir: default_data_dir(),
        }
    }
}

impl ClientSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn api_base_url(&self) -> Result<Url, SettingsError> {
        parse_api_url(&self.api_url)
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

pub fn parse_api_url(raw: &str) -> Result<Url, SettingsError> {
    let invalid = |reason: String| SettingsError::InvalidApiUrl {
        url: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw.trim()).map_err(|err| invalid(err.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(invalid(format!("unsupported scheme '{other}'"))),
    }
}

/// Defaults, then `client.toml` in the working directory, then environment.
pub fn load_settings() -> ClientSettings {
    load_settings_from(Path::new(SETTINGS_FILE), |name| std::env::var(name).ok())
}

pub fn load_settings_from(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> ClientSettings {
    let mut settings = ClientSettings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        if let Ok(table) = toml::from_str::<toml::Table>(&raw) {
            let file_cfg: HashMap<String, String> = table
                .into_iter()
                .map(|(key, value)| match value {
                    toml::Value::String(s) => (key, s),
                    other => (key, other.to_string()),
                })
                .collect();
            apply(&mut settings, |key| file_cfg.get(key).cloned());
        }
    }

    if let Some(v) = env("PATCH_API_URL") {
        settings.api_url = v;
    }
    apply(&mut settings, |key| {
        env(&format!("APP__{}", key.to_ascii_uppercase()))
    });

    settings
}

fn apply(settings: &mut ClientSettings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("api_url") {
        settings.api_url = v;
    }
    if let Some(v) = lookup("request_timeout_secs") {
        if let Ok(parsed) = v.trim().parse::<u64>() {
            settings.request_timeout_secs = parsed;
        }
    }
    if let Some(v) = lookup("token_key") {
        settings.token_key = v;
    }
    if let Some(v) = lookup("data_dir") {
        settings.data_dir = PathBuf::from(v);
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
