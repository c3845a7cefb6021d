use serde::Deserialize;
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::converter::{default_languages, SupportedLanguage};
use crate::error::SettingsError;

/// Looked up in the working directory, in order, when no explicit path is given
pub const DEFAULT_CONFIG_FILES: [&str; 4] = [
    "cfconvert.yaml",
    "cfconvert.yml",
    "cfconvert.json",
    "cfconvert.toml",
];
pub const ENV_PREFIX: &str = "CONVERTER";
pub const API_KEY_VAR: &str = "OPENAI_API_KEY";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default)]
    pub request_timeout_secs: Option<u64>,

    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,

    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,

    #[serde(default = "default_languages")]
    pub languages: Vec<SupportedLanguage>,

    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Config file the settings were read from, if any
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_model() -> String {
    "gpt-4".to_string()
}

fn default_max_tokens() -> u32 {
    4000
}

fn default_temperature() -> f32 {
    0.1
}

fn default_api_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_max_content_length() -> usize {
    16 * 1024 * 1024
}

fn default_allowed_extensions() -> Vec<String> {
    ["cfm", "cfc", "cfml", "txt"].iter().map(|s| s.to_string()).collect()
}

fn default_log_filter() -> String {
    "cfconvert=info,tower_http=info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            api_base_url: default_api_base_url(),
            request_timeout_secs: None,
            upload_dir: default_upload_dir(),
            max_content_length: default_max_content_length(),
            allowed_extensions: default_allowed_extensions(),
            languages: default_languages(),
            log_filter: default_log_filter(),
            source: None,
        }
    }
}

impl Settings {
    /// Layer defaults, the config file and `CONVERTER_*` variables, then `PORT`.
    ///
    /// An explicit `path` must exist; the default files are optional.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let source = match path {
            Some(path) => Some(path.to_path_buf()),
            None => DEFAULT_CONFIG_FILES
                .iter()
                .map(PathBuf::from)
                .find(|candidate| candidate.is_file()),
        };

        let mut builder = config::Config::builder();
        if let Some(file) = &source {
            builder = builder.add_source(config::File::from(file.as_path()));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("allowed_extensions"),
        );

        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse::<u16>().ok()) {
            builder = builder.set_override("port", i64::from(port))?;
        }

        let mut settings: Settings = builder.build()?.try_deserialize()?;
        settings.source = source;
        settings.normalize();
        settings.validate()?;
        Ok(settings)
    }

    fn normalize(&mut self) {
        for ext in &mut self.allowed_extensions {
            *ext = ext.trim().trim_start_matches('.').to_lowercase();
        }
        self.allowed_extensions.retain(|ext| !ext.is_empty());
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.languages.is_empty() {
            return Err(SettingsError::Invalid(
                "at least one target language must be configured".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for language in &self.languages {
            if language.key.is_empty() {
                return Err(SettingsError::Invalid("language key must not be empty".to_string()));
            }
            if !seen.insert(language.key.as_str()) {
                return Err(SettingsError::Invalid(format!(
                    "duplicate language key: {}",
                    language.key
                )));
            }
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(SettingsError::Invalid(format!(
                "temperature must be between 0 and 2, got {}",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(SettingsError::Invalid("max_tokens must be positive".to_string()));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, SettingsError> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|_| SettingsError::Invalid(format!("invalid host address: {}", self.host)))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

/// Read the API key once at start-up. Missing or blank is fatal.
pub fn require_api_key() -> Result<String, SettingsError> {
    api_key_from(std::env::var(API_KEY_VAR).ok())
}

fn api_key_from(value: Option<String>) -> Result<String, SettingsError> {
    match value {
        Some(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(SettingsError::MissingApiKey),
    }
}
