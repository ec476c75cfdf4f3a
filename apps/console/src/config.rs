use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use client_core::{ClientError, GatewayConfig};
use serde::Deserialize;
use url::Url;

pub const DEFAULT_CONFIG_FILE: &str = "console.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub backend_api_url: String,
    pub backend_resources_url: Option<String>,
    pub database_url: String,
    pub request_timeout_seconds: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend_api_url: "http://localhost:3000/api".into(),
            backend_resources_url: None,
            database_url: "sqlite://./data/console.db".into(),
            request_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    backend_api_url: Option<String>,
    backend_resources_url: Option<String>,
    database_url: Option<String>,
    request_timeout_seconds: Option<u64>,
}

impl Settings {
    pub fn gateway_config(&self) -> Result<GatewayConfig, ClientError> {
        let mut config = GatewayConfig::new(&self.backend_api_url)?;
        config.resources_url = self
            .backend_resources_url
            .as_deref()
            .map(|raw| {
                Url::parse(raw).map_err(|e| {
                    ClientError::Config(format!("invalid resources url '{raw}': {e}"))
                })
            })
            .transpose()?;
        config.timeout = Duration::from_secs(self.request_timeout_seconds.max(1));
        Ok(config)
    }

    fn apply_file(&mut self, file: FileSettings) {
        if let Some(v) = file.backend_api_url {
            self.backend_api_url = v;
        }
        if let Some(v) = file.backend_resources_url {
            self.backend_resources_url = Some(v);
        }
        if let Some(v) = file.database_url {
            self.database_url = v;
        }
        if let Some(v) = file.request_timeout_seconds {
            self.request_timeout_seconds = v;
        }
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("BACKEND_API_URL") {
            self.backend_api_url = v;
        }
        if let Some(v) = var("APP__BACKEND_API_URL") {
            self.backend_api_url = v;
        }

        if let Some(v) = var("BACKEND_RESOURCES_URL") {
            self.backend_resources_url = Some(v);
        }

        if let Some(v) = var("DATABASE_URL") {
            self.database_url = v;
        }
        if let Some(v) = var("APP__DATABASE_URL") {
            self.database_url = v;
        }

        if let Some(v) = var("APP__REQUEST_TIMEOUT_SECONDS") {
            if let Ok(parsed) = v.parse::<u64>() {
                self.request_timeout_seconds = parsed;
            }
        }
    }
}

/// Defaults, then the config file, then environment variables.
///
/// A missing `console.toml` in the working directory is fine; a missing file
/// passed explicitly is an error.
pub fn load_settings(config_path: Option<&Path>) -> anyhow::Result<Settings> {
    load_settings_with(config_path, |name| std::env::var(name).ok())
}

fn load_settings_with(
    config_path: Option<&Path>,
    var: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    let (path, required) = match config_path {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };
    match fs::read_to_string(&path) {
        Ok(raw) => {
            let file: FileSettings = toml::from_str(&raw)
                .with_context(|| format!("invalid config file '{}'", path.display()))?;
            settings.apply_file(file);
        }
        Err(err) if !required && err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read '{}'", path.display()));
        }
    }

    settings.apply_env(var);
    settings.database_url = normalize_database_url(&settings.database_url);
    Ok(settings)
}

/// Blank locations fall back to the default store.
pub fn normalize_database_url(raw: &str) -> String {
    storage::sqlite_url(raw).unwrap_or_else(|| Settings::default().database_url)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
