//! File-per-match JSON ledger.
//!
//! Each match's bets live in `<bets_dir>/<match_id>.json` as a map of
//! user → bet. Writes go to a temporary sibling file that is renamed over
//! the record, so a crash mid-write leaves the previous record intact.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{BetBook, BetLedger};

pub struct JsonFileLedger {
    dir: PathBuf,
}

impl JsonFileLedger {
    /// Open (and create if needed) the bets directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create bets directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn record_path(&self, match_id: u32) -> PathBuf {
        self.dir.join(format!("{match_id}.json"))
    }
}

impl BetLedger for JsonFileLedger {
    fn read_bets(&self, match_id: u32) -> Result<BetBook> {
        let path = self.record_path(match_id);
        if !path.exists() {
            return Ok(BetBook::new());
        }

        let json = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read bets from {}", path.display()))?;
        let book: BetBook = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse bets from {}", path.display()))?;
        Ok(book)
    }

    fn write_bets(&self, match_id: u32, bets: &BetBook) -> Result<()> {
        let path = self.record_path(match_id);
        let tmp = self
            .dir
            .join(format!(".{match_id}.json.{}.tmp", uuid::Uuid::new_v4()));

        let json = serde_json::to_string_pretty(bets).context("Failed to serialise bets")?;
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e).with_context(|| format!("Failed to replace {}", path.display()));
        }

        debug!(match_id, bets = bets.len(), path = %path.display(), "Bets saved");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
