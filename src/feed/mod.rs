//! Match feed integrations.
//!
//! Defines the `MatchFeed` trait and the shared parser for the tournament
//! feed's JSON format. Two sources are provided:
//! - `HttpFeed`: live feed over HTTP with bounded retry
//! - `SnapshotFeed`: the same format read from a local file
//!
//! Feed format: a JSON array of match entries. Slot ids come either from
//! `id` or, for feeds keyed by an external id, from `fifa_id` through the
//! configured id map. Team objects carry `name` (or `country`), `goals`
//! and `penalties`, the latter two nullable.

pub mod http;
pub mod snapshot;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::types::{Match, MatchStatus, Stage};

/// Abstraction over match result sources.
#[async_trait]
pub trait MatchFeed: Send + Sync {
    /// Fetch every match of the tournament, sorted by slot id.
    async fn fetch_matches(&self) -> Result<Vec<Match>>;

    /// Feed name for logging and identification.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Parsing options
// ---------------------------------------------------------------------------

/// Tournament-specific knowledge the raw feed lacks.
#[derive(Debug, Clone)]
pub struct FeedOptions {
    /// Slot ids at or above this are knockout matches.
    pub knockout_from_match_id: u32,
    /// External id → slot id.
    pub id_map: HashMap<String, u32>,
}

impl FeedOptions {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            knockout_from_match_id: cfg.pool.knockout_from_match_id,
            id_map: cfg.feed.id_map.clone(),
        }
    }
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            knockout_from_match_id: 49,
            id_map: HashMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Feed JSON → Rust
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FeedEntry {
    #[serde(default)]
    id: Option<u32>,
    #[serde(default)]
    fifa_id: Option<String>,
    status: String,
    /// Older feeds flag finished matches with `time: "full-time"`.
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    stage_name: String,
    datetime: String,
    #[serde(default)]
    knockout: Option<bool>,
    home_team: FeedTeam,
    away_team: FeedTeam,
}

#[derive(Debug, Deserialize)]
struct FeedTeam {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    goals: Option<u32>,
    #[serde(default)]
    penalties: Option<u32>,
}

impl FeedTeam {
    fn display_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.country.clone())
            .unwrap_or_else(|| crate::types::UNDETERMINED_TEAM.to_string())
    }
}

fn parse_status(status: &str, time: Option<&str>) -> MatchStatus {
    if time == Some("full-time") {
        return MatchStatus::Completed;
    }
    match status.to_lowercase().as_str() {
        "completed" => MatchStatus::Completed,
        "in progress" | "in_progress" | "live" => MatchStatus::InProgress,
        _ => MatchStatus::Scheduled,
    }
}

fn entry_to_match(entry: FeedEntry, opts: &FeedOptions) -> Result<Match> {
    let id = match (entry.id, entry.fifa_id.as_deref()) {
        (Some(id), _) => id,
        (None, Some(ext)) => *opts
            .id_map
            .get(ext)
            .with_context(|| format!("Unknown external match id {ext}"))?,
        (None, None) => anyhow::bail!("Feed entry has neither id nor fifa_id"),
    };

    let kickoff: DateTime<Utc> = DateTime::parse_from_rfc3339(&entry.datetime)
        .with_context(|| format!("Bad kickoff time for match {id}: {}", entry.datetime))?
        .with_timezone(&Utc);

    let knockout = entry
        .knockout
        .unwrap_or(id >= opts.knockout_from_match_id);

    Ok(Match {
        id,
        stage: if knockout { Stage::Knockout } else { Stage::Group },
        stage_name: entry.stage_name,
        kickoff,
        status: parse_status(&entry.status, entry.time.as_deref()),
        home_team: entry.home_team.display_name(),
        away_team: entry.away_team.display_name(),
        home_goals: entry.home_team.goals,
        away_goals: entry.away_team.goals,
        home_penalties: entry.home_team.penalties,
        away_penalties: entry.away_team.penalties,
    })
}

/// Parse a feed body into matches sorted by slot id.
///
/// Entries that cannot be interpreted are skipped with a warning; a body
/// that is not a JSON array of entries is an error.
pub fn parse_matches(body: &str, opts: &FeedOptions) -> Result<Vec<Match>> {
    let raw: Vec<serde_json::Value> =
        serde_json::from_str(body).context("Feed body is not a JSON array")?;

    let mut matches = Vec::with_capacity(raw.len());
    for value in raw {
        let parsed = serde_json::from_value::<FeedEntry>(value)
            .context("Malformed feed entry")
            .and_then(|entry| entry_to_match(entry, opts));
        match parsed {
            Ok(m) => matches.push(m),
            Err(e) => warn!(error = %format!("{e:#}"), "Skipping feed entry"),
        }
    }

    matches.sort_by_key(|m| m.id);
    debug!(count = matches.len(), "Feed parsed");
    Ok(matches)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
