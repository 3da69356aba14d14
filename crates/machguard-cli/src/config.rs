//! Configuration vault – reads/writes `~/.machguard/config.toml`.

use machguard_audit::{MemoryAuditLog, DEFAULT_MEMORY_CAPACITY};
use machguard_runtime::{
    HazardRuleOracle, LlmOracle, PipelineConfig, ReasoningOracle,
};
use machguard_types::SafetyThresholds;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Which reasoning oracle backs the semantic and context checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OracleKind {
    /// Local hazard rules only.
    #[default]
    Rules,
    /// OpenAI-compatible model server.
    Llm,
    None,
}

impl OracleKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rules" => Some(OracleKind::Rules),
            "llm" => Some(OracleKind::Llm),
            "none" | "off" => Some(OracleKind::None),
            _ => None,
        }
    }
}

impl std::fmt::Display for OracleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OracleKind::Rules => write!(f, "rules"),
            OracleKind::Llm => write!(f, "llm"),
            OracleKind::None => write!(f, "none"),
        }
    }
}

/// Audit path value that selects the in-memory sink.
pub const MEMORY_AUDIT: &str = ":memory:";

/// Persisted operator configuration stored in `~/.machguard/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub oracle: OracleKind,

    /// Base URL of the model server (only used with `oracle = "llm"`).
    #[serde(default = "default_oracle_url")]
    pub oracle_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Bearer token for hosted model servers (stored as plain text – the
    /// file is created owner-only).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_key: String,

    /// Budget for every oracle call.
    #[serde(default = "default_oracle_timeout_ms")]
    pub oracle_timeout_ms: u64,

    /// SQLite audit database, or `":memory:"`.  Empty means
    /// `~/.machguard/audit.db`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub audit_db: String,

    /// Records retained by the in-memory audit sink before the oldest is
    /// evicted.
    #[serde(default = "default_memory_audit_capacity")]
    pub memory_audit_capacity: usize,

    #[serde(default = "default_jailbreak_threshold")]
    pub jailbreak_threshold: f64,

    #[serde(default = "default_honeypot_threshold")]
    pub honeypot_threshold: f64,

    #[serde(default)]
    pub thresholds: SafetyThresholds,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("oracle", &self.oracle)
            .field("oracle_url", &self.oracle_url)
            .field("model", &self.model)
            .field(
                "api_key",
                if self.api_key.is_empty() { &"<not set>" } else { &"<redacted>" },
            )
            .field("oracle_timeout_ms", &self.oracle_timeout_ms)
            .field("audit_db", &self.audit_db)
            .field("memory_audit_capacity", &self.memory_audit_capacity)
            .field("jailbreak_threshold", &self.jailbreak_threshold)
            .field("honeypot_threshold", &self.honeypot_threshold)
            .field("thresholds", &self.thresholds)
            .finish()
    }
}

fn default_oracle_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_model() -> String {
    "llama3".to_string()
}
fn default_oracle_timeout_ms() -> u64 {
    machguard_runtime::DEFAULT_ORACLE_TIMEOUT.as_millis() as u64
}
fn default_memory_audit_capacity() -> usize {
    DEFAULT_MEMORY_CAPACITY
}
fn default_jailbreak_threshold() -> f64 {
    machguard_kernel::semantic::JAILBREAK_THRESHOLD
}
fn default_honeypot_threshold() -> f64 {
    machguard_kernel::semantic::HONEYPOT_THRESHOLD
}

impl Default for Config {
    fn default() -> Self {
        Self {
            oracle: OracleKind::default(),
            oracle_url: default_oracle_url(),
            model: default_model(),
            api_key: String::new(),
            oracle_timeout_ms: default_oracle_timeout_ms(),
            audit_db: String::new(),
            memory_audit_capacity: default_memory_audit_capacity(),
            jailbreak_threshold: default_jailbreak_threshold(),
            honeypot_threshold: default_honeypot_threshold(),
            thresholds: SafetyThresholds::default(),
        }
    }
}

impl Config {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            thresholds: self.thresholds.clone(),
            jailbreak_threshold: self.jailbreak_threshold,
            honeypot_threshold: self.honeypot_threshold,
            oracle_timeout: Duration::from_millis(self.oracle_timeout_ms),
        }
    }

    pub fn build_oracle(&self) -> Option<Arc<dyn ReasoningOracle>> {
        match self.oracle {
            OracleKind::Rules => Some(Arc::new(HazardRuleOracle)),
            OracleKind::Llm => {
                let mut oracle = LlmOracle::new(&self.oracle_url, &self.model);
                if !self.api_key.is_empty() {
                    oracle = oracle.with_api_key(&self.api_key);
                }
                Some(Arc::new(oracle))
            }
            OracleKind::None => None,
        }
    }

    /// `None` selects the in-memory audit sink.
    pub fn audit_path(&self) -> Option<PathBuf> {
        match self.audit_db.as_str() {
            MEMORY_AUDIT => None,
            "" => config_path().parent().map(|dir| dir.join("audit.db")),
            path => Some(PathBuf::from(path)),
        }
    }

    /// The bounded sink used when [`audit_path`](Self::audit_path) is `None`.
    pub fn memory_audit(&self) -> MemoryAuditLog {
        MemoryAuditLog::with_capacity(self.memory_audit_capacity)
    }
}

/// Return the path to `~/.machguard/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".machguard").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `MACHGUARD_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `MACHGUARD_ORACLE` | `oracle` (`rules`, `llm`, `none`) |
/// | `MACHGUARD_ORACLE_URL` | `oracle_url` |
/// | `MACHGUARD_MODEL` | `model` |
/// | `MACHGUARD_API_KEY` | `api_key` |
/// | `MACHGUARD_ORACLE_TIMEOUT_MS` | `oracle_timeout_ms` |
/// | `MACHGUARD_AUDIT_DB` | `audit_db` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("MACHGUARD_ORACLE")
        && let Some(kind) = OracleKind::parse(&v)
    {
        cfg.oracle = kind;
    }
    if let Ok(v) = std::env::var("MACHGUARD_ORACLE_URL") {
        cfg.oracle_url = v;
    }
    if let Ok(v) = std::env::var("MACHGUARD_MODEL") {
        cfg.model = v;
    }
    if let Ok(v) = std::env::var("MACHGUARD_API_KEY") {
        cfg.api_key = v;
    }
    if let Ok(v) = std::env::var("MACHGUARD_ORACLE_TIMEOUT_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.oracle_timeout_ms = ms;
    }
    if let Ok(v) = std::env::var("MACHGUARD_AUDIT_DB") {
        cfg.audit_db = v;
    }
}

/// Save the config to disk, creating `~/.machguard/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
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
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
