//! Configuration Vault – reads/writes `~/.hunter/config.toml`.

use hunter_memory::{Backend, IngestPolicy, NewRule, StoreConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Persisted user configuration stored in `~/.hunter/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Ranking strategy: `"scan"` or `"vec-index"`.
    #[serde(default)]
    pub backend: Backend,

    /// SQLite database file, or `:memory:`.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Embedding dimension of the native vector index.
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,

    /// Base URL of the Ollama instance serving embeddings.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Embedding model name (e.g. "nomic-embed-text").
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Top-K used by `/search` and `/context`.
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,

    /// Ingested responses must be longer than this many characters.
    #[serde(default = "default_min_response_chars")]
    pub min_response_chars: usize,

    /// Rules written to an empty rule table on startup.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<NewRule>,
}

fn home_dir() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string())
}

fn default_database_path() -> String {
    PathBuf::from(home_dir()).join(".hunter").join("memory.db").to_string_lossy().into_owned()
}
fn default_embedding_dimension() -> usize {
    768
}
fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_search_limit() -> usize {
    hunter_memory::service::DEFAULT_SEARCH_LIMIT
}
fn default_min_response_chars() -> usize {
    hunter_memory::ingest::DEFAULT_MIN_RESPONSE_CHARS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            database_path: default_database_path(),
            embedding_dimension: default_embedding_dimension(),
            ollama_url: default_ollama_url(),
            embedding_model: default_embedding_model(),
            search_limit: default_search_limit(),
            min_response_chars: default_min_response_chars(),
            rules: Vec::new(),
        }
    }
}

impl Config {
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            backend: self.backend,
            path: self.database_path.clone(),
            dimension: self.embedding_dimension,
        }
    }

    pub fn ingest_policy(&self) -> IngestPolicy {
        IngestPolicy { min_response_chars: self.min_response_chars }
    }
}

/// Return the path to `~/.hunter/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&home_dir())
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".hunter").join("config.toml")
}

/// Load the config from disk with environment overrides applied.
/// Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    let mut cfg = load_from(&config_path())?;
    if let Some(cfg) = cfg.as_mut() {
        apply_env_overrides(cfg);
    }
    Ok(cfg)
}

/// Load the config from a specific path, without overrides.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config = toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `HUNTER_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `HUNTER_BACKEND` | `backend` |
/// | `HUNTER_DB_PATH` | `database_path` |
/// | `HUNTER_OLLAMA_URL` | `ollama_url` |
/// | `HUNTER_EMBED_MODEL` | `embedding_model` |
/// | `HUNTER_SEARCH_LIMIT` | `search_limit` |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("HUNTER_BACKEND") {
        match v.parse::<Backend>() {
            Ok(backend) => cfg.backend = backend,
            Err(e) => tracing::warn!(error = %e, "ignoring HUNTER_BACKEND"),
        }
    }
    if let Ok(v) = std::env::var("HUNTER_DB_PATH") {
        cfg.database_path = v;
    }
    if let Ok(v) = std::env::var("HUNTER_OLLAMA_URL") {
        cfg.ollama_url = v;
    }
    if let Ok(v) = std::env::var("HUNTER_EMBED_MODEL") {
        cfg.embedding_model = v;
    }
    if let Ok(v) = std::env::var("HUNTER_SEARCH_LIMIT")
        && let Ok(limit) = v.parse::<usize>()
    {
        cfg.search_limit = limit;
    }
}

/// Save the config to disk, creating `~/.hunter/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

/// Make sure the directory holding a file database exists.
pub fn ensure_database_dir(cfg: &Config) -> Result<(), String> {
    if cfg.database_path == ":memory:" {
        return Ok(());
    }
    match Path::new(&cfg.database_path).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create database directory {}: {}", parent.display(), e)),
        _ => Ok(()),
    }
}
