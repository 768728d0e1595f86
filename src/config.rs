//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! The team directory and feed id map are static tables loaded once at
//! startup and never mutated afterwards.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;

use crate::types::{PenaltyRule, StakeStrategy};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub pool: PoolConfig,
    #[serde(default)]
    pub settlement: SettlementConfig,
    pub feed: FeedConfig,
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub settler: SettlerConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    /// Team name → flag code (e.g. "Brazil" → "br").
    #[serde(default)]
    pub teams: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PoolConfig {
    pub name: String,
    pub currency: String,
    /// Minimum stake accepted at submission.
    #[serde(default = "default_min_stake")]
    pub min_stake: Decimal,
    /// Matches with an id at or above this are knockout matches.
    #[serde(default = "default_knockout_from")]
    pub knockout_from_match_id: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SettlementConfig {
    #[serde(default)]
    pub stake_strategy: StakeStrategy,
    #[serde(default)]
    pub penalty_rule: PenaltyRule,
    /// Allowed drift for the zero-sum check.
    #[serde(default = "default_tolerance")]
    pub tolerance: Decimal,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            stake_strategy: StakeStrategy::default(),
            penalty_rule: PenaltyRule::default(),
            tolerance: default_tolerance(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    /// HTTP endpoint returning the match list. Ignored when `snapshot_only`.
    pub url: String,
    /// Optional env var holding a bearer token for the feed.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Where the raw feed body is mirrored (and read from in snapshot mode).
    #[serde(default)]
    pub snapshot_path: Option<String>,
    #[serde(default)]
    pub snapshot_only: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// External feed id → tournament slot id, for feeds without slot ids.
    #[serde(default)]
    pub id_map: HashMap<String, u32>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    pub bets_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SettlerConfig {
    pub interval_secs: u64,
    /// Run a single pass and exit.
    #[serde(default)]
    pub run_once: bool,
}

impl Default for SettlerConfig {
    fn default() -> Self {
        Self { interval_secs: 600, run_once: false }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub enabled: bool,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self { enabled: false, port: default_port() }
    }
}

fn default_min_stake() -> Decimal {
    dec!(20)
}

fn default_knockout_from() -> u32 {
    49
}

fn default_tolerance() -> Decimal {
    dec!(0.000000001)
}

/// Upper bound on `feed.max_retries`; beyond this the backoff sleeps for hours.
pub const MAX_FEED_RETRIES: u32 = 10;

fn default_max_retries() -> u32 {
    3
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_port() -> u16 {
    9018
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall or crash the settlement loop.
    pub fn validate(&self) -> Result<()> {
        if self.settler.interval_secs == 0 {
            anyhow::bail!("settler.interval_secs must be greater than zero");
        }
        if self.feed.max_retries > MAX_FEED_RETRIES {
            anyhow::bail!(
                "feed.max_retries is {}, at most {MAX_FEED_RETRIES} allowed",
                self.feed.max_retries
            );
        }
        if self.feed.timeout_secs == 0 {
            anyhow::bail!("feed.timeout_secs must be greater than zero");
        }
        if self.settlement.tolerance.is_sign_negative() {
            anyhow::bail!("settlement.tolerance must not be negative");
        }
        if self.pool.min_stake.is_sign_negative() {
            anyhow::bail!("pool.min_stake must not be negative");
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
