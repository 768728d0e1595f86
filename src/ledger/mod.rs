//! Bet ledger: per-match bet records.
//!
//! Defines the `BetLedger` trait the engine reads and writes through, the
//! submission rules any front end applies before recording a bet, and two
//! stores: one JSON file per match, and an in-memory map.

pub mod json_file;
pub mod memory;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::info;

use crate::types::{Bet, Match, PoolError, Prediction};

/// All bets on one match, keyed by user. One bet per user.
pub type BetBook = BTreeMap<String, Bet>;

/// Keyed record store for bets, one record per match.
///
/// `write_bets` replaces the whole record for the match and must be atomic:
/// after a failed write, readers still see the previous record.
#[cfg_attr(test, mockall::automock)]
pub trait BetLedger: Send + Sync {
    /// Read all bets for a match. A match nobody bet on yields an empty book.
    fn read_bets(&self, match_id: u32) -> Result<BetBook>;

    /// Replace the bets for a match.
    fn write_bets(&self, match_id: u32, bets: &BetBook) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Submission rules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct BetRules {
    pub min_stake: Decimal,
}

impl BetRules {
    /// Check a bet against the match and stake rules without recording it.
    pub fn validate(&self, m: &Match, bet: &Bet, now: DateTime<Utc>) -> Result<(), PoolError> {
        if !m.is_open_for_betting(now) {
            return Err(PoolError::BettingClosed(m.id));
        }
        if bet.stake < self.min_stake {
            return Err(PoolError::InvalidBet(format!(
                "stake {} is below the minimum of {}",
                bet.stake, self.min_stake
            )));
        }
        if m.is_knockout() {
            let draw = match bet.prediction {
                Prediction::Score(s) => s.is_level(),
                Prediction::Outcome { outcome } => outcome == crate::types::Outcome::Draw,
            };
            if draw {
                return Err(PoolError::InvalidBet(format!(
                    "match {} is a knockout match and cannot end in a draw",
                    m.id
                )));
            }
        }
        Ok(())
    }
}

/// Record a bet, replacing any earlier bet by the same user on this match.
pub fn submit_bet(
    ledger: &dyn BetLedger,
    m: &Match,
    bet: Bet,
    rules: &BetRules,
    now: DateTime<Utc>,
) -> Result<(), PoolError> {
    rules.validate(m, &bet, now)?;

    let mut book = ledger
        .read_bets(m.id)
        .map_err(|e| PoolError::Storage(format!("{e:#}")))?;

    info!(
        match_id = m.id,
        user = %bet.user,
        prediction = %bet.prediction,
        stake = %bet.stake,
        replaced = book.contains_key(&bet.user),
        "Bet recorded"
    );
    book.insert(bet.user.clone(), bet);

    ledger
        .write_bets(m.id, &book)
        .map_err(|e| PoolError::Storage(format!("{e:#}")))
}

/// Withdraw a user's bet before kickoff. Returns whether a bet was removed.
pub fn cancel_bet(
    ledger: &dyn BetLedger,
    m: &Match,
    user: &str,
    now: DateTime<Utc>,
) -> Result<bool, PoolError> {
    if !m.is_open_for_betting(now) {
        return Err(PoolError::BettingClosed(m.id));
    }

    let mut book = ledger
        .read_bets(m.id)
        .map_err(|e| PoolError::Storage(format!("{e:#}")))?;

    if book.remove(user).is_none() {
        return Ok(false);
    }

    ledger
        .write_bets(m.id, &book)
        .map_err(|e| PoolError::Storage(format!("{e:#}")))?;
    info!(match_id = m.id, user, "Bet cancelled");
    Ok(true)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::memory::MemoryLedger;
    use crate::types::{MatchStatus, Outcome};
    use rust_decimal_macros::dec;

    fn open_match(id: u32) -> Match {
        let mut m = Match::sample(id);
        m.status = MatchStatus::Scheduled;
        m.kickoff = Utc::now() + chrono::Duration::hours(4);
        m.home_goals = None;
        m.away_goals = None;
        m
    }

    fn rules() -> BetRules {
        BetRules { min_stake: dec!(20) }
    }

    #[test]
    fn test_submit_and_overwrite() {
        let ledger = MemoryLedger::new();
        let m = open_match(12);

        submit_bet(&ledger, &m, Bet::new("alice", Prediction::score(1, 0), dec!(20)), &rules(), Utc::now()).unwrap();
        submit_bet(&ledger, &m, Bet::new("alice", Prediction::score(3, 3), dec!(40)), &rules(), Utc::now()).unwrap();

        let book = ledger.read_bets(12).unwrap();
        assert_eq!(book.len(), 1);
        assert_eq!(book["alice"].prediction, Prediction::score(3, 3));
        assert_eq!(book["alice"].stake, dec!(40));
    }

    #[test]
    fn test_stake_below_minimum() {
        let ledger = MemoryLedger::new();
        let m = open_match(12);
        let err = submit_bet(&ledger, &m, Bet::new("bob", Prediction::score(1, 0), dec!(19.99)), &rules(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, PoolError::InvalidBet(_)));
        assert!(ledger.read_bets(12).unwrap().is_empty());
    }

    #[test]
    fn test_knockout_draw_rejected() {
        let ledger = MemoryLedger::new();
        let m = open_match(50);
        let level = Bet::new("carol", Prediction::score(1, 1), dec!(50));
        assert!(matches!(
            submit_bet(&ledger, &m, level, &rules(), Utc::now()),
            Err(PoolError::InvalidBet(_))
        ));
        let draw = Bet::new("carol", Prediction::outcome(Outcome::Draw), dec!(50));
        assert!(matches!(
            submit_bet(&ledger, &m, draw, &rules(), Utc::now()),
            Err(PoolError::InvalidBet(_))
        ));
    }

    #[test]
    fn test_betting_closes_at_kickoff() {
        let ledger = MemoryLedger::new();
        let m = open_match(12);
        let err = submit_bet(&ledger, &m, Bet::new("dave", Prediction::score(0, 2), dec!(25)), &rules(), m.kickoff)
            .unwrap_err();
        assert!(matches!(err, PoolError::BettingClosed(12)));
    }

    #[test]
    fn test_cancel_bet() {
        let ledger = MemoryLedger::new();
        let m = open_match(12);
        submit_bet(&ledger, &m, Bet::new("erin", Prediction::score(2, 0), dec!(30)), &rules(), Utc::now()).unwrap();

        assert!(cancel_bet(&ledger, &m, "erin", Utc::now()).unwrap());
        assert!(!cancel_bet(&ledger, &m, "erin", Utc::now()).unwrap());
        assert!(ledger.read_bets(12).unwrap().is_empty());
    }

    #[test]
    fn test_storage_failure_surfaces_as_storage_error() {
        let mut ledger = MockBetLedger::new();
        ledger
            .expect_read_bets()
            .returning(|_| Err(anyhow::anyhow!("disk unavailable")));
        ledger.expect_write_bets().never();

        let m = open_match(12);
        let err = submit_bet(&ledger, &m, Bet::new("frank", Prediction::score(1, 2), dec!(20)), &rules(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, PoolError::Storage(msg) if msg.contains("disk unavailable")));
    }
}
