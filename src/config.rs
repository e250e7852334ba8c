use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub library: LibraryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Inline key; takes precedence over `api_key_env`.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// `0` disables the request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}
fn default_model() -> String {
    "openai/gpt-3.5-turbo".to_string()
}
fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}

impl CompletionConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    /// Resolve the bearer credential from the inline key or the environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Base URL of the hosted REST store (e.g. `https://xyz.supabase.co`).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_store_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_table")]
    pub table: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            url: None,
            api_key: None,
            api_key_env: default_store_key_env(),
            table: default_table(),
        }
    }
}

fn default_backend() -> String {
    "sqlite".to_string()
}
fn default_store_key_env() -> String {
    "QBX_STORE_KEY".to_string()
}
fn default_table() -> String {
    "queries".to_string()
}

impl StoreConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IdentityConfig {
    #[serde(default = "default_identity_mode")]
    pub mode: String,
    /// Signed-in address for `static` mode.
    #[serde(default)]
    pub email: Option<String>,
    /// Header carrying the address in `header` mode.
    #[serde(default = "default_identity_header")]
    pub header: String,
    #[serde(default)]
    pub sign_in_url: Option<String>,
    #[serde(default)]
    pub sign_up_url: Option<String>,
    #[serde(default)]
    pub profile_url: Option<String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            mode: default_identity_mode(),
            email: None,
            header: default_identity_header(),
            sign_in_url: None,
            sign_up_url: None,
            profile_url: None,
        }
    }
}

fn default_identity_mode() -> String {
    "static".to_string()
}
fn default_identity_header() -> String {
    "x-forwarded-email".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Idle threads older than this are dropped from memory.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    /// Upper bound on live threads; the least recently used go first.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            session_ttl_secs: default_session_ttl_secs(),
            max_sessions: default_max_sessions(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}
fn default_session_ttl_secs() -> u64 {
    3600
}
fn default_max_sessions() -> usize {
    10_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct LibraryConfig {
    /// Viewer zone offset; the server's local zone when unset.
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
    #[serde(default = "default_truncate_chars")]
    pub truncate_chars: usize,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: None,
            truncate_chars: default_truncate_chars(),
        }
    }
}

fn default_truncate_chars() -> usize {
    300
}

impl Config {
    /// A config usable without a file: local SQLite, static identity unset.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/qbx.sqlite"),
            },
            completion: CompletionConfig::default(),
            store: StoreConfig::default(),
            identity: IdentityConfig::default(),
            server: ServerConfig::default(),
            library: LibraryConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    match config.completion.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown completion provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.completion.is_enabled() && config.completion.model.trim().is_empty() {
        anyhow::bail!("completion.model must not be empty");
    }

    match config.store.backend.as_str() {
        "sqlite" | "memory" => {}
        "rest" => {
            if config.store.url.as_deref().map_or(true, |u| u.trim().is_empty()) {
                anyhow::bail!("store.url must be set when backend is 'rest'");
            }
        }
        other => anyhow::bail!(
            "Unknown store backend: '{}'. Must be sqlite, memory, or rest.",
            other
        ),
    }
    if config.store.table.trim().is_empty() {
        anyhow::bail!("store.table must not be empty");
    }

    match config.identity.mode.as_str() {
        "static" | "header" => {}
        other => anyhow::bail!(
            "Unknown identity mode: '{}'. Must be static or header.",
            other
        ),
    }
    if config.identity.mode == "header" && config.identity.header.trim().is_empty() {
        anyhow::bail!("identity.header must not be empty in header mode");
    }

    if config.server.max_sessions == 0 {
        anyhow::bail!("server.max_sessions must be > 0");
    }

    if config.library.truncate_chars == 0 {
        anyhow::bail!("library.truncate_chars must be > 0");
    }
    if let Some(offset) = config.library.utc_offset_minutes {
        if !(-24 * 60 < offset && offset < 24 * 60) {
            anyhow::bail!("library.utc_offset_minutes must be within one day");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn defaults_fill_optional_sections() {
        let cfg = parse("[db]\npath = \"/tmp/q.sqlite\"\n").unwrap();
        assert_eq!(cfg.completion.model, "openai/gpt-3.5-turbo");
        assert_eq!(cfg.completion.api_key_env, "OPENROUTER_API_KEY");
        assert_eq!(cfg.store.backend, "sqlite");
        assert_eq!(cfg.store.table, "queries");
        assert_eq!(cfg.identity.mode, "static");
        assert_eq!(cfg.library.truncate_chars, 300);
        assert_eq!(cfg.server.session_ttl_secs, 3600);
        assert_eq!(cfg.server.max_sessions, 10_000);
    }

    #[test]
    fn zero_session_cap_rejected() {
        let err = parse("[db]\npath = \"q.sqlite\"\n[server]\nmax_sessions = 0\n").unwrap_err();
        assert!(err.to_string().contains("max_sessions"));
    }

    #[test]
    fn rest_backend_requires_url() {
        let err = parse("[db]\npath = \"q.sqlite\"\n[store]\nbackend = \"rest\"\n").unwrap_err();
        assert!(err.to_string().contains("store.url"));
    }

    #[test]
    fn unknown_identity_mode_rejected() {
        let err = parse("[db]\npath = \"q.sqlite\"\n[identity]\nmode = \"oauth\"\n").unwrap_err();
        assert!(err.to_string().contains("identity mode"));
    }

    #[test]
    fn inline_key_wins_over_env() {
        let mut cfg = Config::minimal();
        cfg.completion.api_key = Some("sk-inline".to_string());
        cfg.completion.api_key_env = "QBX_TEST_UNSET_VARIABLE".to_string();
        assert_eq!(cfg.completion.resolve_api_key().as_deref(), Some("sk-inline"));
    }

    #[test]
    fn blank_key_is_treated_as_missing() {
        let mut cfg = Config::minimal();
        cfg.completion.api_key = Some("  ".to_string());
        cfg.completion.api_key_env = "QBX_TEST_UNSET_VARIABLE".to_string();
        assert!(cfg.completion.resolve_api_key().is_none());
    }
}
