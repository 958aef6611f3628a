//! Configuration management for AgentHive.
//!
//! Configuration is layered, later sources winning:
//! - Default values
//! - An optional TOML file
//! - Environment variables
//!
//! The resulting [`Config`] is built once at startup and passed by reference
//! into every component.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// Upper bound for `sync.batch_size`.
pub const MAX_BATCH_SIZE: u64 = 500;

/// Main configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Ledger RPC configuration
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Indexer loop configuration
    #[serde(default)]
    pub sync: SyncConfig,

    /// Content inclusion policy
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Participation scoring configuration
    #[serde(default)]
    pub participation: ParticipationConfig,

    /// Payout configuration
    #[serde(default)]
    pub payout: PayoutConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Ledger RPC configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// JSON-RPC endpoints, tried in order on reconnect
    #[serde(default = "default_rpc_urls")]
    pub rpc_urls: Vec<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Database configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "sqlite://agenthive.db")
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Indexer loop configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Sleep between iterations in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Maximum blocks per iteration, clamped to `[1, 500]`
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,

    /// On first run, start this many blocks behind the irreversible height
    #[serde(default = "default_bootstrap_lag")]
    pub bootstrap_lag: u64,

    /// Log a heartbeat every N processed blocks
    #[serde(default = "default_heartbeat_every")]
    pub heartbeat_every: u64,
}

/// Which comments the indexer keeps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Also accept comments carrying a whitelisted tag
    #[serde(default)]
    pub accept_tags: bool,

    /// Tags accepted when `accept_tags` is on
    #[serde(default = "default_tag_whitelist")]
    pub tag_whitelist: Vec<String>,

    /// Require the auto-burn beneficiary setting
    #[serde(default)]
    pub auto_burn_enforced: bool,
}

/// Participation scoring configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipationConfig {
    /// Minimum stake for eligibility and the unit of the stake weight
    #[serde(default = "default_stake_min")]
    pub stake_min: f64,

    /// Interval of the external stake poller in milliseconds
    #[serde(default = "default_stake_poll_interval_ms")]
    pub stake_poll_interval_ms: u64,

    /// UTC hour at which the daily scoring run starts
    #[serde(default = "default_participation_run_hour")]
    pub run_hour: u32,
}

/// Payout configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutConfig {
    /// Compute and persist runs without transferring tokens
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,

    /// Token symbol used in transfers
    #[serde(default = "default_token_symbol")]
    pub token_symbol: String,

    /// Day zero of the emissions schedule
    #[serde(default = "default_launch_date")]
    pub launch_date: NaiveDate,

    /// UTC hour at which scheduled payouts run
    #[serde(default = "default_payout_run_hour")]
    pub run_hour: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_rpc_urls() -> Vec<String> {
    vec!["https://api.hive.blog".to_string()]
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_database_url() -> String {
    "sqlite://agenthive.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_poll_interval_ms() -> u64 {
    3_000
}

fn default_batch_size() -> u64 {
    50
}

fn default_bootstrap_lag() -> u64 {
    50
}

fn default_heartbeat_every() -> u64 {
    100
}

fn default_tag_whitelist() -> Vec<String> {
    vec![agenthive_core::DEFAULT_TAG.to_string()]
}

fn default_stake_min() -> f64 {
    1_000.0
}

fn default_stake_poll_interval_ms() -> u64 {
    60_000
}

fn default_participation_run_hour() -> u32 {
    0
}

fn default_dry_run() -> bool {
    true
}

fn default_token_symbol() -> String {
    "AGENT".to_string()
}

fn default_launch_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 2, 1).unwrap_or(NaiveDate::MIN)
}

fn default_payout_run_hour() -> u32 {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            rpc_urls: default_rpc_urls(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            batch_size: default_batch_size(),
            bootstrap_lag: default_bootstrap_lag(),
            heartbeat_every: default_heartbeat_every(),
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            accept_tags: false,
            tag_whitelist: default_tag_whitelist(),
            auto_burn_enforced: false,
        }
    }
}

impl Default for ParticipationConfig {
    fn default() -> Self {
        Self {
            stake_min: default_stake_min(),
            stake_poll_interval_ms: default_stake_poll_interval_ms(),
            run_hour: default_participation_run_hour(),
        }
    }
}

impl Default for PayoutConfig {
    fn default() -> Self {
        Self {
            dry_run: default_dry_run(),
            token_symbol: default_token_symbol(),
            launch_date: default_launch_date(),
            run_hour: default_payout_run_hour(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Build the runtime configuration: defaults, then `path` if the file
    /// exists, then process environment overrides.
    ///
    /// Ignored overrides are logged with the current subscriber. Call
    /// [`Config::load_with_ignored`] when logging is set up afterwards.
    ///
    /// # Example
    /// ```no_run
    /// # use agenthive_indexer::config::Config;
    /// let config = Config::load("agenthive.toml")?;
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let (config, ignored) = Self::load_with_ignored(path)?;
        for entry in &ignored {
            entry.log();
        }

        Ok(config)
    }

    /// Same as [`Config::load`], but hands back the overrides that were
    /// ignored instead of logging them.
    pub fn load_with_ignored<P: AsRef<Path>>(path: P) -> Result<(Self, Vec<IgnoredOverride>)> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            Self::parse_file(path)?
        } else {
            Self::default()
        };

        let ignored = config.apply_overrides(|key| std::env::var(key).ok());
        config.normalize();
        config.validate()?;

        Ok((config, ignored))
    }

    /// Load configuration from a TOML file, without environment overrides.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::parse_file(path.as_ref())?;
        config.normalize();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a TOML string, without environment overrides.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml).context("Failed to parse TOML configuration")?;
        config.normalize();
        config.validate()?;

        Ok(config)
    }

    fn parse_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Apply environment-style overrides.
    ///
    /// `lookup` returns the raw value for a variable name. Values that do not
    /// parse, or parse but fall outside the accepted range, keep the current
    /// value and are returned so the caller can report them.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Vec<IgnoredOverride>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut ignored = Vec::new();

        if let Some(urls) = lookup("HIVE_RPC_URLS") {
            let list = split_list(&urls);
            if list.is_empty() {
                ignored.push(IgnoredOverride::new("HIVE_RPC_URLS", &urls, IgnoreReason::Empty));
            } else {
                self.ledger.rpc_urls = list;
            }
        }

        override_parsed(&lookup, &mut ignored, "POLL_MS", &mut self.sync.poll_interval_ms, |ms| *ms > 0);
        // Out-of-range batch sizes are clamped by `normalize`.
        override_parsed(&lookup, &mut ignored, "BATCH_SIZE", &mut self.sync.batch_size, |_| true);
        override_parsed(
            &lookup,
            &mut ignored,
            "AGENTHIVE_BOOTSTRAP_LAG",
            &mut self.sync.bootstrap_lag,
            |_| true,
        );

        if let Some(flag) = lookup("AGENTHIVE_ACCEPT_TAGS") {
            self.policy.accept_tags = flag.trim() == "1";
        }
        if let Some(tags) = lookup("AGENTHIVE_TAG_WHITELIST") {
            self.policy.tag_whitelist = split_list(&tags);
        }
        if let Some(flag) = lookup("AGENTHIVE_AUTO_BURN_ENFORCED") {
            self.policy.auto_burn_enforced = flag.trim() == "1";
        }

        override_parsed(
            &lookup,
            &mut ignored,
            "AGENT_STAKE_MIN",
            &mut self.participation.stake_min,
            |min| min.is_finite() && *min > 0.0,
        );
        override_parsed(
            &lookup,
            &mut ignored,
            "STAKE_POLL_MS",
            &mut self.participation.stake_poll_interval_ms,
            |ms| *ms > 0,
        );
        override_parsed(
            &lookup,
            &mut ignored,
            "PARTICIPATION_RUN_HOUR",
            &mut self.participation.run_hour,
            |hour| *hour <= 23,
        );

        if let Some(flag) = lookup("PAYOUT_DRY_RUN") {
            self.payout.dry_run = flag.trim() != "0";
        }
        if let Some(symbol) = lookup("AGENT_TOKEN_SYMBOL") {
            let trimmed = symbol.trim();
            if trimmed.is_empty() {
                ignored.push(IgnoredOverride::new("AGENT_TOKEN_SYMBOL", &symbol, IgnoreReason::Empty));
            } else {
                self.payout.token_symbol = trimmed.to_string();
            }
        }
        if let Some(raw) = lookup("AGENTHIVE_LAUNCH_DATE") {
            match parse_launch_date(&raw) {
                Some(date) => self.payout.launch_date = date,
                None => ignored.push(IgnoredOverride::new(
                    "AGENTHIVE_LAUNCH_DATE",
                    &raw,
                    IgnoreReason::Unparsable,
                )),
            }
        }

        if let Some(url) = lookup("DATABASE_URL") {
            if url.trim().is_empty() {
                ignored.push(IgnoredOverride::new("DATABASE_URL", &url, IgnoreReason::Empty));
            } else {
                self.database.url = url.trim().to_string();
            }
        }

        ignored
    }

    /// Clamp and tidy values that have a safe nearest value.
    pub fn normalize(&mut self) {
        self.sync.batch_size = self.sync.batch_size.clamp(1, MAX_BATCH_SIZE);
        if self.sync.heartbeat_every == 0 {
            self.sync.heartbeat_every = default_heartbeat_every();
        }

        self.ledger.rpc_urls = self
            .ledger
            .rpc_urls
            .iter()
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .collect();

        self.policy.tag_whitelist = self
            .policy
            .tag_whitelist
            .iter()
            .map(|tag| tag.trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect();
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.ledger.rpc_urls.is_empty() {
            anyhow::bail!("Ledger rpc_urls cannot be empty");
        }
        for url in &self.ledger.rpc_urls {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("Ledger RPC URL must be http(s): {}", url);
            }
        }
        if self.ledger.request_timeout_secs == 0 {
            anyhow::bail!("Ledger request_timeout_secs must be > 0");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }
        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be > 0");
        }
        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot exceed max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        if self.sync.poll_interval_ms == 0 {
            anyhow::bail!("Sync poll_interval_ms must be > 0");
        }

        if !self.participation.stake_min.is_finite() || self.participation.stake_min <= 0.0 {
            anyhow::bail!(
                "Participation stake_min must be a positive number (got {})",
                self.participation.stake_min
            );
        }
        if self.participation.run_hour > 23 {
            anyhow::bail!(
                "Participation run_hour must be 0-23 (got {})",
                self.participation.run_hour
            );
        }

        if self.payout.run_hour > 23 {
            anyhow::bail!("Payout run_hour must be 0-23 (got {})", self.payout.run_hour);
        }
        if self.payout.token_symbol.is_empty() {
            anyhow::bail!("Payout token_symbol cannot be empty");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            anyhow::bail!(
                "Logging level must be one of: {} (got '{}')",
                valid_levels.join(", "),
                self.logging.level
            );
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            anyhow::bail!(
                "Logging format must be one of: {} (got '{}')",
                valid_formats.join(", "),
                self.logging.format
            );
        }

        Ok(())
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Why an override was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    Empty,
    Unparsable,
    OutOfRange,
}

impl IgnoreReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            IgnoreReason::Empty => "empty",
            IgnoreReason::Unparsable => "unparsable",
            IgnoreReason::OutOfRange => "out of range",
        }
    }
}

/// An environment override that was rejected; the previous value stayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoredOverride {
    pub var: String,
    pub value: String,
    pub reason: IgnoreReason,
}

impl IgnoredOverride {
    fn new(var: &str, value: &str, reason: IgnoreReason) -> Self {
        Self {
            var: var.to_string(),
            value: value.to_string(),
            reason,
        }
    }

    pub fn log(&self) {
        warn!(
            var = %self.var,
            value = %self.value,
            reason = self.reason.as_str(),
            "Ignoring environment override, keeping configured value"
        );
    }
}

fn override_parsed<F, T, A>(
    lookup: &F,
    ignored: &mut Vec<IgnoredOverride>,
    key: &str,
    target: &mut T,
    accept: A,
) where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    A: Fn(&T) -> bool,
{
    let Some(raw) = lookup(key) else {
        return;
    };

    match raw.trim().parse::<T>() {
        Ok(value) if accept(&value) => *target = value,
        Ok(_) => ignored.push(IgnoredOverride::new(key, &raw, IgnoreReason::OutOfRange)),
        Err(_) => ignored.push(IgnoredOverride::new(key, &raw, IgnoreReason::Unparsable)),
    }
}

/// Accepts `YYYY-MM-DD` or a full timestamp starting with one.
fn parse_launch_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let day = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}
