//! Application configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::CoreError;
use crate::Result;

const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the local database file
    pub database_path: PathBuf,
    /// Web API key of the Firebase project
    pub api_key: String,
    /// Firebase project id
    pub project_id: String,
    /// Identity Toolkit endpoint (Auth emulator in development)
    pub auth_base_url: String,
    /// Secure Token endpoint, for renewing id tokens
    pub token_base_url: String,
    /// Firestore endpoint (Firestore emulator in development)
    pub firestore_base_url: String,
    /// Per-request timeout for remote calls; none by default
    pub request_timeout_secs: Option<u64>,
}

impl Config {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            database_path: data_dir.join("gopizza.db"),
            api_key: String::new(),
            project_id: String::new(),
            auth_base_url: gopizza_identity::DEFAULT_BASE_URL.to_string(),
            token_base_url: gopizza_identity::DEFAULT_TOKEN_BASE_URL.to_string(),
            firestore_base_url: gopizza_documents::DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: None,
        }
    }

    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .map(|d| d.join("GoPizza"))
            .unwrap_or_else(|| PathBuf::from(".gopizza"))
    }

    /// Read a JSON config file. Missing fields take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_over(path.as_ref(), Self::default())
    }

    /// `config.json` in `data_dir` if present, defaults otherwise. Fields the
    /// file leaves out, the database path included, come from `data_dir`.
    pub fn load_or_default(data_dir: PathBuf) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE);
        let defaults = Self::new(data_dir);
        if path.exists() {
            Self::load_over(&path, defaults)
        } else {
            Ok(defaults)
        }
    }

    /// Fields present in the file replace those of `defaults`.
    fn load_over(path: &Path, defaults: Config) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("cannot read {}: {e}", path.display())))?;
        let overrides: serde_json::Value = serde_json::from_str(&contents)?;
        let serde_json::Value::Object(overrides) = overrides else {
            return Err(CoreError::Config(format!(
                "{}: expected a JSON object",
                path.display()
            )));
        };

        let mut merged = serde_json::to_value(defaults)?;
        if let serde_json::Value::Object(fields) = &mut merged {
            fields.extend(overrides);
        }
        let config: Config = serde_json::from_value(merged)?;

        tracing::debug!(path = %path.display(), "Loaded config");

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(CoreError::Config("api_key is required".to_string()));
        }
        if self.project_id.trim().is_empty() {
            return Err(CoreError::Config("project_id is required".to_string()));
        }
        self.auth_url()?;
        self.token_url()?;
        self.firestore_url()?;
        Ok(())
    }

    pub fn auth_url(&self) -> Result<Url> {
        parse_url("auth_base_url", &self.auth_base_url)
    }

    pub fn token_url(&self) -> Result<Url> {
        parse_url("token_base_url", &self.token_base_url)
    }

    pub fn firestore_url(&self) -> Result<Url> {
        parse_url("firestore_base_url", &self.firestore_base_url)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Self::data_dir())
    }
}

fn parse_url(field: &str, value: &str) -> Result<Url> {
    Url::parse(value).map_err(|e| CoreError::Config(format!("{field}: {e}")))
}
