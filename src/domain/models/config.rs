use serde::{Deserialize, Serialize};

/// Main configuration structure for ModForge
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Per-project build scheduling
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Retry delay policy for transient failures
    #[serde(default)]
    pub backoff: BackoffConfig,

    /// Per-project circuit breaker
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    /// Stalled-project watchdog
    #[serde(default)]
    pub watchdog: WatchdogConfig,

    /// Pattern cache thresholds
    #[serde(default)]
    pub patterns: PatternConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Remote generation/compile service
    #[serde(default)]
    pub service: ServiceConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SchedulerConfig {
    /// Interval between build cycles when none is given at start
    #[serde(default = "default_interval_ms")]
    pub default_interval_ms: u64,

    /// In-place retries for transient failures before escalating
    #[serde(default = "default_max_transient_retries")]
    pub max_transient_retries: u32,
}

const fn default_interval_ms() -> u64 {
    300_000
}

const fn default_max_transient_retries() -> u32 {
    3
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_interval_ms: default_interval_ms(),
            max_transient_retries: default_max_transient_retries(),
        }
    }
}

/// Backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BackoffConfig {
    /// Base delay multiplied by 2^attempt
    #[serde(default = "default_base_ms")]
    pub base_ms: u64,

    /// Upper bound on any delay
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Jitter is drawn uniformly from [0, jitter_ms)
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
}

const fn default_base_ms() -> u64 {
    1000
}

const fn default_max_delay_ms() -> u64 {
    60_000
}

const fn default_jitter_ms() -> u64 {
    500
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: default_base_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ms: default_jitter_ms(),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip the breaker
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Seconds a tripped breaker stays open
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

const fn default_failure_threshold() -> u32 {
    5
}

const fn default_cooldown_secs() -> u64 {
    3600
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

/// Watchdog configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WatchdogConfig {
    /// Whether `run` starts the watchdog
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between scans
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,

    /// Seconds without activity before a project counts as stalled
    #[serde(default = "default_stall_threshold_secs")]
    pub stall_threshold_secs: u64,
}

const fn default_true() -> bool {
    true
}

const fn default_scan_interval_secs() -> u64 {
    1800
}

const fn default_stall_threshold_secs() -> u64 {
    7200
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scan_interval_secs: default_scan_interval_secs(),
            stall_threshold_secs: default_stall_threshold_secs(),
        }
    }
}

/// Pattern cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PatternConfig {
    /// Disable to always call the generation service
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Minimum similarity to reuse a generation pattern
    #[serde(default = "default_generation_threshold")]
    pub generation_threshold: f64,

    /// Minimum similarity to reuse a fix pattern (balanced auto-fix)
    #[serde(default = "default_fix_threshold")]
    pub fix_threshold: f64,

    /// Minimum similarity to reuse a fix pattern (aggressive auto-fix)
    #[serde(default = "default_aggressive_fix_threshold")]
    pub aggressive_fix_threshold: f64,
}

const fn default_generation_threshold() -> f64 {
    0.8
}

const fn default_fix_threshold() -> f64 {
    0.75
}

const fn default_aggressive_fix_threshold() -> f64 {
    0.7
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            generation_threshold: default_generation_threshold(),
            fix_threshold: default_fix_threshold(),
            aggressive_fix_threshold: default_aggressive_fix_threshold(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".modforge/modforge.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Remote generation/compile service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ServiceConfig {
    /// Base URL, e.g. `http://localhost:5000`
    #[serde(default = "default_service_url")]
    pub base_url: String,

    /// Bearer token sent with every request
    #[serde(default)]
    pub api_key: Option<String>,

    /// Per-request timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_service_url() -> String {
    "http://localhost:5000".to_string()
}

const fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_service_url(),
            api_key: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Rotation for file output: daily, hourly, never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}
