use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CairnConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub model: ModelConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    /// Exact origins allowed by CORS — no wildcards.
    pub allowed_origins: Vec<String>,
    /// Bearer token for /v2/admin routes. Empty disables admin entirely.
    pub admin_token: String,
    pub rate_limit_per_minute: u32,
    /// Voices offered for ephemeral voice sessions.
    pub allowed_voices: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    /// `"memory"` or `"sqlite"`.
    pub backend: String,
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ModelConfig {
    /// Empty key disables the chat model — replies fall back.
    pub api_key: String,
    pub base_url: String,
    pub chat_model: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub enabled: bool,
    pub model: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub chunk_words: usize,
    /// Directory of literature source documents for `cairn ingest`.
    pub lit_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SessionConfig {
    pub ttl_secs: u64,
    pub history_cap: usize,
    pub notes_cap: usize,
    /// Optional on-disk guardrail policy; compiled-in default when unset.
    pub policy_path: String,
}

impl Default for CairnConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            store: StoreConfig::default(),
            model: ModelConfig::default(),
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            log_level: "info".into(),
            allowed_origins: vec![
                "http://localhost:5173".into(),
                "http://localhost:3000".into(),
                "http://localhost:8000".into(),
            ],
            admin_token: String::new(),
            rate_limit_per_minute: 60,
            allowed_voices: vec![
                "alloy".into(),
                "verse".into(),
                "amber".into(),
                "copper".into(),
            ],
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        let db_path = default_cairn_dir()
            .join("cairn.db")
            .to_string_lossy()
            .into_owned();
        Self {
            backend: "sqlite".into(),
            db_path,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".into(),
            chat_model: "gpt-4o-mini".into(),
            timeout_secs: 20,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "text-embedding-3-small".into(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            chunk_words: 180,
            lit_dir: "content/lit".into(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            history_cap: 50,
            notes_cap: 20,
            policy_path: String::new(),
        }
    }
}

/// Returns `~/.cairn/`
pub fn default_cairn_dir() -> PathBuf {
    dirs::home_dir()
        .expect("home directory must exist")
        .join(".cairn")
}

/// Returns the default config file path: `~/.cairn/config.toml`
pub fn default_config_path() -> PathBuf {
    default_cairn_dir().join("config.toml")
}

impl CairnConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            CairnConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("CAIRN_DB") {
            self.store.db_path = val;
        }
        if let Ok(val) = std::env::var("CAIRN_STORE") {
            self.store.backend = val;
        }
        if let Ok(val) = std::env::var("CAIRN_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("CAIRN_API_KEY") {
            self.model.api_key = val;
        }
        if let Ok(val) = std::env::var("CAIRN_ADMIN_TOKEN") {
            self.server.admin_token = val;
        }
        if let Ok(val) = std::env::var("CAIRN_ALLOWED_ORIGINS") {
            self.server.allowed_origins = val
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }
        if let Ok(val) = std::env::var("CAIRN_RATE_LIMIT_PER_MINUTE") {
            if let Ok(n) = val.parse() {
                self.server.rate_limit_per_minute = n;
            }
        }
        if let Ok(val) = std::env::var("CAIRN_LIT_DIR") {
            self.retrieval.lit_dir = val;
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.store.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .expect("home directory must exist")
            .join(rest)
    } else {
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = CairnConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.server.rate_limit_per_minute, 60);
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.retrieval.chunk_words, 180);
        assert_eq!(config.session.ttl_secs, 3600);
        assert_eq!(config.session.history_cap, 50);
        assert!(config.store.db_path.ends_with("cairn.db"));
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[server]
log_level = "debug"
rate_limit_per_minute = 120

[store]
backend = "memory"

[retrieval]
top_k = 5
"#;
        let config: CairnConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.server.rate_limit_per_minute, 120);
        assert_eq!(config.store.backend, "memory");
        assert_eq!(config.retrieval.top_k, 5);
        // defaults still apply for unset fields
        assert_eq!(config.retrieval.chunk_words, 180);
        assert_eq!(config.session.notes_cap, 20);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = CairnConfig::default();
        std::env::set_var("CAIRN_DB", "/tmp/override.db");
        std::env::set_var("CAIRN_STORE", "memory");
        std::env::set_var("CAIRN_ALLOWED_ORIGINS", "https://a.example, https://b.example");

        config.apply_env_overrides();

        assert_eq!(config.store.db_path, "/tmp/override.db");
        assert_eq!(config.store.backend, "memory");
        assert_eq!(
            config.server.allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );

        std::env::remove_var("CAIRN_DB");
        std::env::remove_var("CAIRN_STORE");
        std::env::remove_var("CAIRN_ALLOWED_ORIGINS");
    }
}
