//! Local snapshot of the match feed.
//!
//! Reads a previously mirrored feed body from disk. Used for offline
//! settlement runs and replays.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

use super::{parse_matches, FeedOptions, MatchFeed};
use crate::types::Match;

pub struct SnapshotFeed {
    path: PathBuf,
    opts: FeedOptions,
}

impl SnapshotFeed {
    pub fn new(path: impl Into<PathBuf>, opts: FeedOptions) -> Self {
        Self { path: path.into(), opts }
    }
}

#[async_trait]
impl MatchFeed for SnapshotFeed {
    async fn fetch_matches(&self) -> Result<Vec<Match>> {
        let body = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read feed snapshot {}", self.path.display()))?;
        let matches = parse_matches(&body, &self.opts)?;
        info!(path = %self.path.display(), count = matches.len(), "Snapshot loaded");
        Ok(matches)
    }

    fn name(&self) -> &str {
        "snapshot"
    }
}
