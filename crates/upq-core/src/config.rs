use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::remote::HttpOptions;
use crate::retry::RetryPolicy;
use crate::worker::IgnoreSet;

/// Default chunk size: 5 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Per-chunk retry parameters (optional `[retry]` section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per chunk (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.5 = 500ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 0.5,
            max_delay_secs: 30,
        }
    }
}

/// Global configuration loaded from `~/.config/upq/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpqConfig {
    /// Work-queue list key.
    pub queue: String,
    /// List key that failed jobs are pushed to, verbatim.
    #[serde(default = "default_failure_queue")]
    pub failure_queue: String,
    /// Optional list key that completed jobs are appended to.
    #[serde(default)]
    pub success_queue: Option<String>,
    /// Redis connection URL for the queues and the session hash.
    #[serde(alias = "db")]
    pub url: String,
    /// Hash key holding session descriptors keyed by source path.
    #[serde(default = "default_session_key")]
    pub session_key: String,
    /// Optional SQLite file for session descriptors instead of the Redis hash.
    #[serde(default)]
    pub session_store: Option<PathBuf>,
    /// Remote destination prefix; targets land under `rootpath/<destination>`.
    pub rootpath: String,
    /// File extensions skipped when a directory job is expanded.
    #[serde(default)]
    pub ignoreext: Vec<String>,
    /// Credential file path. Defaults to `credentials.json` next to the config.
    #[serde(default)]
    pub session: Option<PathBuf>,
    /// Remote drive API base URL (trailing slash expected).
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Bytes per chunk PUT.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    /// Bounded wait of the blocking dequeue; shutdown is polled at this interval.
    #[serde(default = "default_pop_timeout_secs")]
    pub pop_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Hard per-request timeout; a hung chunk PUT fails after this.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

fn default_failure_queue() -> String {
    "failed".to_string()
}

fn default_session_key() -> String {
    "pending".to_string()
}

fn default_api_base_url() -> String {
    "https://graph.microsoft.com/v1.0/me/".to_string()
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

fn default_pop_timeout_secs() -> u64 {
    1
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_request_timeout_secs() -> u64 {
    600
}

impl Default for UpqConfig {
    fn default() -> Self {
        Self {
            queue: "upload".to_string(),
            failure_queue: default_failure_queue(),
            success_queue: None,
            url: "redis://127.0.0.1:6379/0".to_string(),
            session_key: default_session_key(),
            session_store: None,
            rootpath: "/upload".to_string(),
            ignoreext: Vec::new(),
            session: None,
            api_base_url: default_api_base_url(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            pop_timeout_secs: default_pop_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            retry: None,
        }
    }
}

impl UpqConfig {
    /// Reject values that would make the worker spin or never finish a file.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            bail!("chunk_size must be positive");
        }
        if self.pop_timeout_secs == 0 {
            bail!("pop_timeout_secs must be positive");
        }
        if self.queue.trim().is_empty() {
            bail!("queue key must not be empty");
        }
        if self.queue == self.failure_queue {
            bail!(
                "failure_queue must differ from queue (both are {:?})",
                self.queue
            );
        }
        if let Some(success) = &self.success_queue {
            if success == &self.queue || success == &self.failure_queue {
                bail!(
                    "success_queue must differ from queue and failure_queue (got {:?})",
                    success
                );
            }
        }
        Ok(())
    }

    pub fn ignore_set(&self) -> IgnoreSet {
        IgnoreSet::new(self.ignoreext.as_slice())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
            .as_ref()
            .map(RetryPolicy::from)
            .unwrap_or_default()
    }

    pub fn http_options(&self) -> HttpOptions {
        HttpOptions {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    pub fn pop_timeout(&self) -> Duration {
        Duration::from_secs(self.pop_timeout_secs)
    }

    /// Credential file: the configured `session` path, or `credentials.json`
    /// under the XDG config dir.
    pub fn credentials_path(&self) -> Result<PathBuf> {
        match &self.session {
            Some(p) => Ok(p.clone()),
            None => {
                let xdg_dirs = xdg::BaseDirectories::with_prefix("upq")?;
                Ok(xdg_dirs.get_config_home().join("credentials.json"))
            }
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("upq")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<UpqConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = UpqConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from(&path)
}

/// Load and validate an explicit config file.
pub fn load_from(path: &Path) -> Result<UpqConfig> {
    let data = fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("read config {}: {}", path.display(), e))?;
    let cfg: UpqConfig = toml::from_str(&data)?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = UpqConfig::default();
        assert_eq!(cfg.queue, "upload");
        assert_eq!(cfg.failure_queue, "failed");
        assert_eq!(cfg.session_key, "pending");
        assert_eq!(cfg.chunk_size, 5 * 1024 * 1024);
        assert_eq!(cfg.pop_timeout_secs, 1);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = UpqConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: UpqConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.queue, cfg.queue);
        assert_eq!(parsed.url, cfg.url);
        assert_eq!(parsed.rootpath, cfg.rootpath);
        assert_eq!(parsed.chunk_size, cfg.chunk_size);
    }

    #[test]
    fn config_toml_minimal_uses_defaults() {
        let toml = r#"
            queue = "upload"
            db = "redis://10.0.0.2:6380/3"
            rootpath = "/backup"
            ignoreext = ["html", "TXT"]
            session = "/etc/upq/od.json"
        "#;
        let cfg: UpqConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.url, "redis://10.0.0.2:6380/3");
        assert_eq!(cfg.rootpath, "/backup");
        assert_eq!(cfg.session.as_deref(), Some(Path::new("/etc/upq/od.json")));
        assert_eq!(cfg.failure_queue, "failed");
        assert_eq!(cfg.chunk_size, DEFAULT_CHUNK_SIZE);
        assert!(cfg.retry.is_none());
        let ignore = cfg.ignore_set();
        assert!(ignore.contains("html"));
        assert!(ignore.contains("txt"));
    }

    #[test]
    fn config_toml_retry_and_timeouts() {
        let toml = r#"
            queue = "q"
            url = "redis://127.0.0.1/"
            rootpath = "/"
            chunk_size = 327680
            request_timeout_secs = 120

            [retry]
            max_attempts = 5
            base_delay_secs = 0.25
            max_delay_secs = 10
        "#;
        let cfg: UpqConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.chunk_size, 327_680);
        assert_eq!(cfg.http_options().request_timeout, Duration::from_secs(120));
        let policy = cfg.retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay, Duration::from_millis(250));
        assert_eq!(policy.max_delay, Duration::from_secs(10));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut cfg = UpqConfig::default();
        cfg.chunk_size = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = UpqConfig::default();
        cfg.failure_queue = cfg.queue.clone();
        assert!(cfg.validate().is_err());

        let mut cfg = UpqConfig::default();
        cfg.pop_timeout_secs = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn success_queue_is_optional_and_distinct() {
        let cfg: UpqConfig = toml::from_str(
            r#"
            queue = "upload"
            url = "redis://127.0.0.1/"
            rootpath = "/"
            success_queue = "success"
        "#,
        )
        .unwrap();
        assert_eq!(cfg.success_queue.as_deref(), Some("success"));
        assert!(cfg.validate().is_ok());
        assert!(UpqConfig::default().success_queue.is_none());

        let mut cfg = UpqConfig::default();
        cfg.success_queue = Some(cfg.failure_queue.clone());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn explicit_session_path_wins() {
        let mut cfg = UpqConfig::default();
        cfg.session = Some(PathBuf::from("/tmp/creds.json"));
        assert_eq!(
            cfg.credentials_path().unwrap(),
            PathBuf::from("/tmp/creds.json")
        );
    }
}
