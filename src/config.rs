use crate::error::{ProxyError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variables holding the client API keys, in priority order.
pub const API_KEY_ENV_VARS: &[&str] = &["API_KEYS", "API_KEY"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Keys clients must present as `Authorization: Bearer <key>`.
    /// Empty disables authentication.
    #[serde(default)]
    pub api_keys: Vec<String>,
    #[serde(default)]
    pub upstream: UpstreamConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_upstream_url")]
    pub url: String,
    #[serde(default = "default_origin")]
    pub origin: Option<String>,
    #[serde(default = "default_referer")]
    pub referer: Option<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Whole-request timeout for non-streaming calls.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default)]
    pub model_naming: ModelNaming,
}

/// Which model id goes into the upstream request body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelNaming {
    /// The id the client sent, e.g. `deepseek-chat`.
    #[default]
    Public,
    /// The registry's upstream id, e.g. `DeepSeek-V3`.
    Upstream,
}

fn default_port() -> u16 {
    8787
}

fn default_upstream_url() -> String {
    "https://ai-chatbot-starter.edgeone.app/api/ai".to_string()
}

#[allow(clippy::unnecessary_wraps)]
fn default_origin() -> Option<String> {
    Some("https://ai-chatbot-starter.edgeone.app".to_string())
}

#[allow(clippy::unnecessary_wraps)]
fn default_referer() -> Option<String> {
    Some("https://ai-chatbot-starter.edgeone.app/".to_string())
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: default_upstream_url(),
            origin: default_origin(),
            referer: default_referer(),
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            model_naming: ModelNaming::default(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            api_keys: Vec::new(),
            upstream: UpstreamConfig::default(),
        }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl ProxyConfig {
    /// Load config from a TOML file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProxyError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Search standard locations for a config file.
    /// Priority: CLI arg > CWD > XDG config > home dir > built-in defaults
    pub fn find_and_load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::load(path);
        }

        for candidate in &config_search_paths() {
            if candidate.exists() {
                tracing::info!(path = %candidate.display(), "Loading config");
                return Self::load(candidate);
            }
        }

        tracing::info!("No config file found, using built-in defaults");
        Ok(Self::default())
    }

    /// Replace `api_keys` with the keys from `API_KEYS` / `API_KEY`, if set.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let raw = API_KEY_ENV_VARS
            .iter()
            .find_map(|name| lookup(name).filter(|v| !v.trim().is_empty()));

        if let Some(raw) = raw {
            self.api_keys = parse_api_keys(&raw);
        }
    }

    /// Whether clients must authenticate.
    pub fn auth_enabled(&self) -> bool {
        self.api_keys.iter().any(|k| !k.is_empty())
    }

    pub fn validate(&self) -> Result<()> {
        let url = self.upstream.url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ProxyError::config(format!(
                "upstream.url must be an http(s) URL, got '{}'",
                self.upstream.url
            )));
        }
        Ok(())
    }
}

/// Split a comma-separated key list, trimming entries and dropping empties.
pub fn parse_api_keys(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(String::from)
        .collect()
}

pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // CWD
    paths.push(PathBuf::from("chat-adapter.toml"));

    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        paths.push(PathBuf::from(xdg).join("chat-adapter").join("config.toml"));
    }

    if let Some(home) = home_dir() {
        paths.push(home.join(".config").join("chat-adapter").join("config.toml"));
        paths.push(home.join(".chat-adapter.toml"));
    }

    paths
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(
            f,
            r#"
port = 5000
api_keys = ["k1"]

[upstream]
url = "http://127.0.0.1:9000/api/ai"
referer = "http://127.0.0.1:9000/"
timeout_secs = 30
model_naming = "upstream"
"#
        )
        .unwrap();

        let config = ProxyConfig::load(f.path()).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.api_keys, vec!["k1".to_string()]);
        assert_eq!(config.upstream.url, "http://127.0.0.1:9000/api/ai");
        assert_eq!(config.upstream.timeout(), Duration::from_secs(30));
        assert_eq!(config.upstream.model_naming, ModelNaming::Upstream);
        // untouched fields keep their defaults
        assert_eq!(config.upstream.connect_timeout_secs, 10);
        assert_eq!(
            config.upstream.origin.as_deref(),
            Some("https://ai-chatbot-starter.edgeone.app")
        );
    }

    #[test]
    fn test_empty_file_is_all_defaults() {
        let f = NamedTempFile::new().unwrap();
        let config = ProxyConfig::load(f.path()).unwrap();
        assert_eq!(config.port, 8787);
        assert!(!config.auth_enabled());
        assert_eq!(config.upstream.model_naming, ModelNaming::Public);
    }

    #[test]
    fn test_rejects_non_http_upstream() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "[upstream]\nurl = \"ftp://example.com\"").unwrap();
        let err = ProxyConfig::load(f.path()).unwrap_err();
        assert!(matches!(err, ProxyError::Config { .. }));
    }

    #[test]
    fn test_missing_explicit_file_is_config_error() {
        let err = ProxyConfig::find_and_load(Some(Path::new("/nonexistent/chat-adapter.toml")))
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_parse_api_keys() {
        assert_eq!(parse_api_keys("k1, k2 ,,k3 "), vec!["k1", "k2", "k3"]);
        assert!(parse_api_keys(" , ").is_empty());
    }

    #[test]
    fn test_env_keys_prefer_api_keys_var() {
        let env = HashMap::from([("API_KEYS", "a,b"), ("API_KEY", "c")]);
        let mut config = ProxyConfig {
            api_keys: vec!["from-file".to_string()],
            ..ProxyConfig::default()
        };
        config.apply_env_from(|name| env.get(name).map(|v| (*v).to_string()));
        assert_eq!(config.api_keys, vec!["a", "b"]);
    }

    #[test]
    fn test_env_single_key_fallback() {
        let env = HashMap::from([("API_KEY", "solo")]);
        let mut config = ProxyConfig::default();
        config.apply_env_from(|name| env.get(name).map(|v| (*v).to_string()));
        assert_eq!(config.api_keys, vec!["solo"]);
        assert!(config.auth_enabled());
    }

    #[test]
    fn test_no_env_keeps_file_keys() {
        let mut config = ProxyConfig {
            api_keys: vec!["from-file".to_string()],
            ..ProxyConfig::default()
        };
        config.apply_env_from(|_| None);
        assert_eq!(config.api_keys, vec!["from-file"]);
    }
}
