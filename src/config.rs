use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::handler::HandlerKind;

/// Source path meaning standard input.
pub const STDIN_SOURCE: &str = "-";

/// Top-level configuration for the jfr-metrics agent.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Logging verbosity (debug, info, warn, error). Default: "info".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Where recorder events are read from.
    #[serde(default)]
    pub source: SourceConfig,

    /// Handlers to activate, in registration order. Default: all.
    #[serde(default = "default_handlers")]
    pub handlers: Vec<HandlerKind>,

    /// Per-thread grouping limits.
    #[serde(default)]
    pub threads: ThreadsConfig,

    /// Execution profile bounds.
    #[serde(default)]
    pub profile: ProfileConfig,

    /// Prometheus metrics server configuration.
    #[serde(default)]
    pub health: HealthConfig,
}

/// Event source configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// JSON-lines file to read, or "-" for stdin. Default: "-".
    #[serde(default = "default_source_path")]
    pub path: String,

    /// Shut the agent down once the source is exhausted. Default: false.
    #[serde(default)]
    pub exit_on_eof: bool,

    /// How often per-kind event counts are logged. Default: 60s.
    #[serde(default = "default_stats_interval", with = "humantime_serde")]
    pub stats_interval: Duration,
}

/// Thread grouping configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ThreadsConfig {
    /// Thread groups per handler before new groups fold into "other".
    /// Default: 256.
    #[serde(default = "default_max_groups")]
    pub max_groups: usize,

    /// Group keys that produce no per-thread metrics.
    #[serde(default)]
    pub ignored_groups: Vec<String>,
}

/// Execution profile configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileConfig {
    /// Distinct folded stacks kept. Default: 4096.
    #[serde(default = "default_max_stacks")]
    pub max_stacks: usize,
}

/// Prometheus metrics server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    /// Listen address, ":port" shorthand accepted. Default: "0.0.0.0:9464".
    #[serde(default = "default_health_addr")]
    pub addr: String,
}

// --- Default value functions ---

fn default_log_level() -> String {
    "info".to_string()
}

fn default_source_path() -> String {
    STDIN_SOURCE.to_string()
}

fn default_stats_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_handlers() -> Vec<HandlerKind> {
    HandlerKind::all().to_vec()
}

fn default_max_groups() -> usize {
    256
}

fn default_max_stacks() -> usize {
    4096
}

fn default_health_addr() -> String {
    "0.0.0.0:9464".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            source: SourceConfig::default(),
            handlers: default_handlers(),
            threads: ThreadsConfig::default(),
            profile: ProfileConfig::default(),
            health: HealthConfig::default(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: default_source_path(),
            exit_on_eof: false,
            stats_interval: default_stats_interval(),
        }
    }
}

impl Default for ThreadsConfig {
    fn default() -> Self {
        Self {
            max_groups: default_max_groups(),
            ignored_groups: Vec::new(),
        }
    }
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            max_stacks: default_max_stacks(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            addr: default_health_addr(),
        }
    }
}

impl HealthConfig {
    /// Listen address with ":port" expanded to all interfaces.
    pub fn bind_addr(&self) -> String {
        let addr = if self.addr.is_empty() {
            ":9464"
        } else {
            &self.addr
        };

        if addr.starts_with(':') {
            format!("0.0.0.0{addr}")
        } else {
            addr.to_string()
        }
    }
}

impl SourceConfig {
    pub fn is_stdin(&self) -> bool {
        self.path == STDIN_SOURCE
    }
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        let cfg: Config = serde_yaml::from_str(&data)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        cfg.validate()?;

        Ok(cfg)
    }

    /// Validate the configuration for required fields and consistency.
    pub fn validate(&self) -> Result<()> {
        if self.source.path.is_empty() {
            bail!("source.path must not be empty (use \"-\" for stdin)");
        }

        if self.source.stats_interval.is_zero() {
            bail!("source.stats_interval must be positive");
        }

        if self.handlers.is_empty() {
            bail!("handlers must name at least one handler");
        }

        let mut seen = HashSet::with_capacity(self.handlers.len());
        for kind in &self.handlers {
            if !seen.insert(*kind) {
                bail!("handler {kind} is listed more than once");
            }
        }

        if self.threads.max_groups == 0 {
            bail!("threads.max_groups must be positive");
        }

        if self.profile.max_stacks == 0 {
            bail!("profile.max_stacks must be positive");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    #[test]
    fn test_default_config_values() {
        let cfg = Config::default();
        assert_eq!(cfg.log_level, "info");
        assert!(cfg.source.is_stdin());
        assert!(!cfg.source.exit_on_eof);
        assert_eq!(cfg.source.stats_interval, Duration::from_secs(60));
        assert_eq!(cfg.handlers.len(), HandlerKind::all().len());
        assert_eq!(cfg.threads.max_groups, 256);
        assert_eq!(cfg.profile.max_stacks, 4096);
        assert_eq!(cfg.health.addr, "0.0.0.0:9464");
        cfg.validate().expect("defaults are valid");
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
log_level: debug
source:
  path: /var/log/app/events.jsonl
  exit_on_eof: true
  stats_interval: 5s
handlers:
  - gc_heap_summary
  - network_write
threads:
  max_groups: 32
  ignored_groups: ["GC Thread", "Signal Dispatcher"]
profile:
  max_stacks: 100
health:
  addr: ":9100"
"#;
        let cfg: Config = serde_yaml::from_str(yaml).expect("parse");
        cfg.validate().expect("valid");

        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.source.path, "/var/log/app/events.jsonl");
        assert!(cfg.source.exit_on_eof);
        assert_eq!(cfg.source.stats_interval, Duration::from_secs(5));
        assert_eq!(
            cfg.handlers,
            vec![HandlerKind::GcHeapSummary, HandlerKind::NetworkWrite]
        );
        assert_eq!(cfg.threads.max_groups, 32);
        assert_eq!(cfg.threads.ignored_groups.len(), 2);
        assert_eq!(cfg.profile.max_stacks, 100);
        assert_eq!(cfg.health.bind_addr(), "0.0.0.0:9100");
    }

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let cfg: Config = serde_yaml::from_str("{}").expect("parse");
        assert_eq!(cfg.handlers, HandlerKind::all().to_vec());
        assert_eq!(cfg.health.bind_addr(), "0.0.0.0:9464");
    }

    #[test]
    fn test_unknown_handler_rejected() {
        let err = serde_yaml::from_str::<Config>("handlers: [class_loading]");
        assert!(err.is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cfg = Config {
            handlers: Vec::new(),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = Config {
            handlers: vec![HandlerKind::OverallCpuLoad, HandlerKind::OverallCpuLoad],
            ..Default::default()
        };
        let err = cfg.validate().expect_err("duplicate");
        assert!(err.to_string().contains("more than once"));

        let mut cfg = Config::default();
        cfg.threads.max_groups = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.profile.max_stacks = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.source.path = String::new();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_bind_addr() {
        let mut health = HealthConfig::default();
        assert_eq!(health.bind_addr(), "0.0.0.0:9464");
        health.addr = "127.0.0.1:0".to_string();
        assert_eq!(health.bind_addr(), "127.0.0.1:0");
        health.addr = String::new();
        assert_eq!(health.bind_addr(), "0.0.0.0:9464");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "handlers: [overall_cpu_load]\nthreads:\n  max_groups: 8").expect("write");

        let cfg = Config::load(file.path()).expect("load");
        assert_eq!(cfg.handlers, vec![HandlerKind::OverallCpuLoad]);
        assert_eq!(cfg.threads.max_groups, 8);

        let mut bad = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(bad, "profile:\n  max_stacks: 0").expect("write");
        assert!(Config::load(bad.path()).is_err());
    }
}
