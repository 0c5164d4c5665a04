//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Unique site identifier (e.g., "station-3", "training-grounds")
    #[serde(default = "default_site_id")]
    pub id: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

fn default_site_id() -> String {
    "firewatch".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the telemetry feed; /firefighters, /beacons and /alerts
    /// are fetched relative to it
    #[serde(default = "default_upstream_url")]
    pub base_url: String,
    /// Per-request timeout (milliseconds)
    #[serde(default = "default_upstream_timeout_ms")]
    pub timeout_ms: u64,
    /// Coordinate assigned to beacons created without a GPS fix
    #[serde(default = "default_fallback_lat")]
    pub fallback_lat: f64,
    #[serde(default = "default_fallback_lon")]
    pub fallback_lon: f64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_upstream_url(),
            timeout_ms: default_upstream_timeout_ms(),
            fallback_lat: default_fallback_lat(),
            fallback_lon: default_fallback_lon(),
        }
    }
}

fn default_upstream_url() -> String {
    "http://localhost:8081".to_string()
}

fn default_upstream_timeout_ms() -> u64 {
    5000
}

fn default_fallback_lat() -> f64 {
    52.2297
}

fn default_fallback_lon() -> f64 {
    21.0122
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollerConfig {
    /// Poll cadence (milliseconds)
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
    /// How many recent position samples the stationarity scan reads
    #[serde(default = "default_position_window")]
    pub position_window: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval_ms(),
            position_window: default_position_window(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    1500
}

fn default_position_window() -> usize {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertsConfig {
    /// Window within which a repeat (firefighter, type) alert is suppressed
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: u64,
    /// Maximum alert rows retained after the sweep
    #[serde(default = "default_retention_cap")]
    pub retention_cap: usize,
    /// Seed/test beacon ids that are hard-deleted when absent from a cycle
    #[serde(default = "default_legacy_beacon_ids")]
    pub legacy_beacon_ids: Vec<String>,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            dedup_window_secs: default_dedup_window_secs(),
            retention_cap: default_retention_cap(),
            legacy_beacon_ids: default_legacy_beacon_ids(),
        }
    }
}

fn default_dedup_window_secs() -> u64 {
    30
}

fn default_retention_cap() -> usize {
    50
}

fn default_legacy_beacon_ids() -> Vec<String> {
    ["B001", "B002", "B003", "B004"]
        .into_iter()
        .map(String::from)
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval_secs")]
    pub interval_secs: u64,
    /// Prometheus metrics HTTP port (0 to disable)
    #[serde(default = "default_prometheus_port")]
    pub prometheus_port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_metrics_interval_secs(),
            prometheus_port: default_prometheus_port(),
        }
    }
}

fn default_metrics_interval_secs() -> u64 {
    10
}

fn default_prometheus_port() -> u16 {
    9184
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct BlackboxConfig {
    /// File path for the shutdown snapshot; absent disables the export
    #[serde(default)]
    pub file: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub blackbox: BlackboxConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    upstream_url: String,
    upstream_timeout_ms: u64,
    fallback_gps: (f64, f64),
    poll_interval_ms: u64,
    position_window: usize,
    dedup_window_secs: u64,
    retention_cap: usize,
    legacy_beacon_ids: Vec<String>,
    metrics_interval_secs: u64,
    prometheus_port: u16,
    blackbox_file: Option<String>,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default")
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: &str) -> Self {
        Self {
            site_id: toml_config.site.id,
            upstream_url: toml_config.upstream.base_url,
            upstream_timeout_ms: toml_config.upstream.timeout_ms,
            fallback_gps: (toml_config.upstream.fallback_lat, toml_config.upstream.fallback_lon),
            poll_interval_ms: toml_config.poller.interval_ms,
            position_window: toml_config.poller.position_window,
            dedup_window_secs: toml_config.alerts.dedup_window_secs,
            retention_cap: toml_config.alerts.retention_cap,
            legacy_beacon_ids: toml_config.alerts.legacy_beacon_ids,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            prometheus_port: toml_config.metrics.prometheus_port,
            blackbox_file: toml_config.blackbox.file,
            config_file: config_file.to_string(),
        }
    }

    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        // Check for --config argument
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        // Check CONFIG_FILE environment variable
        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        // Default to dev.toml
        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, &path.display().to_string()))
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {}. Using defaults.", e);
                Self::default()
            }
        }
    }

    /// Load configuration from process args
    pub fn load(args: &[String]) -> Self {
        Self::load_from_path(&Self::resolve_config_path(args))
    }

    // Getters for all config fields
    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn upstream_url(&self) -> &str {
        &self.upstream_url
    }

    pub fn upstream_timeout_ms(&self) -> u64 {
        self.upstream_timeout_ms
    }

    pub fn fallback_gps(&self) -> (f64, f64) {
        self.fallback_gps
    }

    pub fn poll_interval_ms(&self) -> u64 {
        self.poll_interval_ms
    }

    pub fn position_window(&self) -> usize {
        self.position_window
    }

    pub fn dedup_window_secs(&self) -> u64 {
        self.dedup_window_secs
    }

    pub fn retention_cap(&self) -> usize {
        self.retention_cap
    }

    pub fn legacy_beacon_ids(&self) -> &[String] {
        &self.legacy_beacon_ids
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn prometheus_port(&self) -> u16 {
        self.prometheus_port
    }

    pub fn blackbox_file(&self) -> Option<&str> {
        self.blackbox_file.as_deref()
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to shrink the dedup window
    #[cfg(test)]
    pub fn with_dedup_window_secs(mut self, secs: u64) -> Self {
        self.dedup_window_secs = secs;
        self
    }

    /// Builder method for tests to set the retention cap
    #[cfg(test)]
    pub fn with_retention_cap(mut self, cap: usize) -> Self {
        self.retention_cap = cap;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.site_id(), "firewatch");
        assert_eq!(config.upstream_url(), "http://localhost:8081");
        assert_eq!(config.upstream_timeout_ms(), 5000);
        assert_eq!(config.poll_interval_ms(), 1500);
        assert_eq!(config.position_window(), 100);
        assert_eq!(config.dedup_window_secs(), 30);
        assert_eq!(config.retention_cap(), 50);
        assert_eq!(config.metrics_interval_secs(), 10);
        assert!(config.blackbox_file().is_none());
    }

    #[test]
    fn test_default_legacy_beacon_ids() {
        let config = Config::default();
        assert_eq!(config.legacy_beacon_ids(), &["B001", "B002", "B003", "B004"]);
    }

    #[test]
    fn test_default_fallback_gps() {
        let config = Config::default();
        let (lat, lon) = config.fallback_gps();
        assert!((lat - 52.2297).abs() < 1e-9);
        assert!((lon - 21.0122).abs() < 1e-9);
    }

    #[test]
    fn test_resolve_config_path_default() {
        let args: Vec<String> = vec!["firewatch".to_string()];
        assert_eq!(Config::resolve_config_path(&args), "config/dev.toml");
    }

    #[test]
    fn test_resolve_config_path_from_arg() {
        let args: Vec<String> = vec![
            "firewatch".to_string(),
            "--config".to_string(),
            "config/station3.toml".to_string(),
        ];
        assert_eq!(Config::resolve_config_path(&args), "config/station3.toml");
    }

    #[test]
    fn test_resolve_config_path_from_arg_equals() {
        let args: Vec<String> =
            vec!["firewatch".to_string(), "--config=config/training.toml".to_string()];
        assert_eq!(Config::resolve_config_path(&args), "config/training.toml");
    }

    #[test]
    fn test_empty_toml_yields_defaults() {
        let parsed: TomlConfig = toml::from_str("").unwrap();
        let config = Config::from_toml(parsed, "empty");
        assert_eq!(config.poll_interval_ms(), Config::default().poll_interval_ms());
        assert_eq!(config.retention_cap(), Config::default().retention_cap());
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let parsed: TomlConfig = toml::from_str(
            r#"
            [poller]
            interval_ms = 500
            "#,
        )
        .unwrap();
        let config = Config::from_toml(parsed, "partial");
        assert_eq!(config.poll_interval_ms(), 500);
        assert_eq!(config.position_window(), 100);
        assert_eq!(config.dedup_window_secs(), 30);
    }
}
