//! Settler: one settlement pass over the tournament.
//!
//! Fetches the match list, settles every completed match that still has
//! pending bets, and reports. A failure on one match is logged and recorded
//! but never blocks the others; a feed failure fails the whole pass so it
//! is retried on the next cycle.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::engine::aggregator::aggregate;
use crate::engine::settlement::SettlementEngine;
use crate::feed::MatchFeed;
use crate::ledger::{BetBook, BetLedger};
use crate::types::{Match, Outcome, PoolError, Standing};

// ---------------------------------------------------------------------------
// Pass report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct FailedMatch {
    pub match_id: u32,
    pub reason: String,
}

/// Summary of a complete settlement pass.
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub matches_seen: usize,
    pub completed: usize,
    /// Matches with at least one mode settled in this pass.
    pub settled: Vec<u32>,
    /// Completed matches with nothing left to settle.
    pub skipped: usize,
    pub failed: Vec<FailedMatch>,
    pub timestamp: DateTime<Utc>,
}

/// A completed match together with its (settled) bets, for reporting.
#[derive(Debug, Clone)]
pub struct SettledMatch {
    pub matched: Match,
    pub bets: BetBook,
}

/// Stake placed on each outcome of a match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeTotals {
    pub home: Decimal,
    pub draw: Decimal,
    pub away: Decimal,
}

impl OutcomeTotals {
    pub fn from_book(book: &BetBook) -> Self {
        let mut totals = Self::default();
        for bet in book.values() {
            let slot = match bet.prediction.predicted_outcome() {
                Outcome::HomeWin => &mut totals.home,
                Outcome::Draw => &mut totals.draw,
                Outcome::AwayWin => &mut totals.away,
            };
            *slot = slot.saturating_add(bet.stake);
        }
        totals
    }

    pub fn on(&self, outcome: Outcome) -> Decimal {
        match outcome {
            Outcome::HomeWin => self.home,
            Outcome::Draw => self.draw,
            Outcome::AwayWin => self.away,
        }
    }

    /// Stake on every other outcome: what backers of `outcome` would share.
    pub fn against(&self, outcome: Outcome) -> Decimal {
        self.home
            .saturating_add(self.draw)
            .saturating_add(self.away)
            .saturating_sub(self.on(outcome))
    }
}

/// A match still open for betting, with its bets so far.
#[derive(Debug, Clone)]
pub struct OpenMatch {
    pub matched: Match,
    pub bets: BetBook,
    pub totals: OutcomeTotals,
}

// ---------------------------------------------------------------------------
// Settler
// ---------------------------------------------------------------------------

pub struct Settler {
    feed: Box<dyn MatchFeed>,
    ledger: Box<dyn BetLedger>,
    engine: SettlementEngine,
}

impl Settler {
    pub fn new(feed: Box<dyn MatchFeed>, ledger: Box<dyn BetLedger>, engine: SettlementEngine) -> Self {
        Self { feed, ledger, engine }
    }

    pub fn ledger(&self) -> &dyn BetLedger {
        self.ledger.as_ref()
    }

    pub async fn fetch_matches(&self) -> Result<Vec<Match>> {
        self.feed
            .fetch_matches()
            .await
            .with_context(|| format!("Match feed '{}' unavailable", self.feed.name()))
    }

    /// Fetch matches and settle every completed one. Returns the matches
    /// fetched alongside the report so callers can build standings.
    pub async fn run_pass(&self) -> Result<(Vec<Match>, PassReport)> {
        let matches = self.fetch_matches().await?;
        let report = self.settle_all(&matches);
        Ok((matches, report))
    }

    /// Settle every completed match in `matches`, isolating failures.
    pub fn settle_all(&self, matches: &[Match]) -> PassReport {
        let mut report = PassReport {
            matches_seen: matches.len(),
            completed: 0,
            settled: Vec::new(),
            skipped: 0,
            failed: Vec::new(),
            timestamp: Utc::now(),
        };

        for m in matches.iter().filter(|m| m.is_completed()) {
            report.completed += 1;

            match self.engine.settle_match(m, self.ledger.as_ref()) {
                Ok(outcome) if outcome.wrote_anything() => report.settled.push(m.id),
                Ok(_) => report.skipped += 1,
                Err(e) => {
                    match &e {
                        PoolError::Consistency { .. } => {
                            error!(match_id = m.id, error = %e, "Settlement rejected, nothing persisted")
                        }
                        _ => warn!(match_id = m.id, error = %e, "Match not settled this pass"),
                    }
                    report.failed.push(FailedMatch {
                        match_id: m.id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            seen = report.matches_seen,
            completed = report.completed,
            settled = report.settled.len(),
            skipped = report.skipped,
            failed = report.failed.len(),
            "Settlement pass complete"
        );

        report
    }

    /// Completed matches with their bets, most recent slot first.
    ///
    /// A match whose record cannot be read is left out with a warning.
    pub fn history(&self, matches: &[Match]) -> Vec<SettledMatch> {
        matches
            .iter()
            .rev()
            .filter(|m| m.is_completed())
            .filter_map(|m| {
                self.read_book(m).map(|bets| SettledMatch {
                    matched: m.clone(),
                    bets,
                })
            })
            .collect()
    }

    /// Leaderboard over every completed match.
    pub fn standings(&self, matches: &[Match]) -> Vec<Standing> {
        let history = self.history(matches);
        aggregate(history.iter().map(|h| &h.bets))
    }

    /// Matches still accepting bets at `now`, in feed order, with the bets
    /// placed so far.
    pub fn open_matches(&self, matches: &[Match], now: DateTime<Utc>) -> Vec<OpenMatch> {
        matches
            .iter()
            .filter(|m| m.is_open_for_betting(now))
            .filter_map(|m| {
                self.read_book(m).map(|bets| OpenMatch {
                    totals: OutcomeTotals::from_book(&bets),
                    matched: m.clone(),
                    bets,
                })
            })
            .collect()
    }

    fn read_book(&self, m: &Match) -> Option<BetBook> {
        match self.ledger.read_bets(m.id) {
            Ok(bets) => Some(bets),
            Err(e) => {
                warn!(match_id = m.id, error = %format!("{e:#}"), "Skipping unreadable bet record");
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
