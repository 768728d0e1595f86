//! Settlement engine: zero-sum proportional redistribution per mode.
//!
//! For one completed match and one mode, bettors whose prediction matches
//! the actual result split the losers' forfeited stakes in proportion to
//! their own stakes. Each mode is an independent pool.

use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::engine::classifier::OutcomeClassifier;
use crate::ledger::{BetBook, BetLedger};
use crate::types::{
    Bet, BetMode, Match, ModeResult, Outcome, PoolError, Prediction, Score, SettlementState,
    StakeStrategy, UserId,
};

/// Per-user results for one mode of one match.
pub type ModeResults = BTreeMap<UserId, ModeResult>;

/// What `settle_match` did for each mode of a match.
#[derive(Debug, Clone, Default)]
pub struct MatchSettlement {
    pub match_id: u32,
    /// Modes computed and written in this call.
    pub settled: Vec<BetMode>,
    /// Modes already settled earlier, or with no participants.
    pub skipped: Vec<BetMode>,
    pub results: BTreeMap<BetMode, ModeResults>,
}

impl MatchSettlement {
    pub fn wrote_anything(&self) -> bool {
        !self.settled.is_empty()
    }
}

/// The value a prediction is judged against in a given mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Score(Score),
    Outcome(Outcome),
}

impl Target {
    fn is_hit(&self, prediction: &Prediction) -> bool {
        match (self, prediction) {
            (Target::Score(actual), Prediction::Score(picked)) => actual == picked,
            (Target::Score(_), Prediction::Outcome { .. }) => false,
            (Target::Outcome(actual), p) => *actual == p.predicted_outcome(),
        }
    }
}

/// `pool * stake / winning`, multiplying first for precision and falling
/// back to dividing first when the product does not fit.
fn winner_share(pool: Decimal, stake: Decimal, winning: Decimal) -> Option<Decimal> {
    pool.checked_mul(stake)
        .and_then(|p| p.checked_div(winning))
        .or_else(|| stake.checked_div(winning)?.checked_mul(pool))
}

pub struct SettlementEngine {
    classifier: OutcomeClassifier,
    strategy: StakeStrategy,
    tolerance: Decimal,
}

impl SettlementEngine {
    pub fn new(classifier: OutcomeClassifier, strategy: StakeStrategy, tolerance: Decimal) -> Self {
        Self {
            classifier,
            strategy,
            tolerance,
        }
    }

    pub fn strategy(&self) -> StakeStrategy {
        self.strategy
    }

    pub fn classifier(&self) -> &OutcomeClassifier {
        &self.classifier
    }

    /// Portion of the bet's stake at risk in `mode`.
    pub fn mode_stake(&self, bet: &Bet, mode: BetMode) -> Decimal {
        if !bet.prediction.applies_to(mode) {
            return Decimal::ZERO;
        }
        match self.strategy {
            StakeStrategy::FullStake => bet.stake,
            StakeStrategy::SplitStake => bet.stake / Decimal::from(bet.prediction.funded_modes()),
        }
    }

    fn target(&self, m: &Match, mode: BetMode) -> Result<Target, PoolError> {
        let score = self.classifier.finishing_score(m)?;
        Ok(match mode {
            BetMode::ExactScore => Target::Score(score),
            BetMode::OutcomeSign => Target::Outcome(score.outcome()),
        })
    }

    /// Compute win flags and earns for every bet participating in `mode`.
    ///
    /// Pure: nothing is read from or written to the ledger. Bets whose
    /// prediction does not apply to the mode are absent from the result.
    pub fn settle(&self, m: &Match, mode: BetMode, bets: &BetBook) -> Result<ModeResults, PoolError> {
        let target = self.target(m, mode)?;

        let mut entries = Vec::new();
        let mut winning_stake = Decimal::ZERO;
        let mut losing_stake = Decimal::ZERO;

        for (user, bet) in bets {
            if !bet.prediction.applies_to(mode) {
                continue;
            }
            if bet.stake.is_sign_negative() {
                return Err(PoolError::data(m.id, format!("negative stake for {user}")));
            }
            let stake = self.mode_stake(bet, mode);
            let won = target.is_hit(&bet.prediction);
            let side = if won { &mut winning_stake } else { &mut losing_stake };
            *side = side
                .checked_add(stake)
                .ok_or_else(|| PoolError::data(m.id, format!("{mode} stake total overflows")))?;
            entries.push((user, stake, won));
        }

        // Nobody to pay or nobody to pay from: every stake stays put.
        let degenerate = winning_stake.is_zero() || losing_stake.is_zero();

        let mut results = ModeResults::new();
        let mut total = Decimal::ZERO;
        for (user, stake, won) in entries {
            let earn = if degenerate {
                Decimal::ZERO
            } else if won {
                winner_share(losing_stake, stake, winning_stake)
                    .ok_or_else(|| PoolError::data(m.id, format!("{mode} payout for {user} overflows")))?
            } else {
                -stake
            };
            total = total
                .checked_add(earn)
                .ok_or_else(|| PoolError::data(m.id, format!("{mode} earn total overflows")))?;
            results.insert(user.clone(), ModeResult { won, earn });
        }

        if total.abs() > self.tolerance {
            return Err(PoolError::Consistency {
                match_id: m.id,
                mode,
                message: format!("earns sum to {total}, expected zero"),
            });
        }

        debug!(
            match_id = m.id,
            %mode,
            participants = results.len(),
            pool = %losing_stake,
            winning_stake = %winning_stake,
            degenerate,
            "Mode settled"
        );

        Ok(results)
    }

    /// Settle every not-yet-settled mode of a completed match and write the
    /// results back in a single ledger write.
    ///
    /// Modes whose participants all carry a settlement already are skipped,
    /// so re-running after a crash never settles a pool twice.
    pub fn settle_match(&self, m: &Match, ledger: &dyn BetLedger) -> Result<MatchSettlement, PoolError> {
        let book = ledger
            .read_bets(m.id)
            .map_err(|e| PoolError::Storage(format!("{e:#}")))?;

        let mut outcome = MatchSettlement {
            match_id: m.id,
            ..Default::default()
        };
        let mut updated = book.clone();
        let settled_at = Utc::now();

        for &mode in BetMode::ALL {
            let participants: Vec<&Bet> = book
                .values()
                .filter(|b| b.prediction.applies_to(mode))
                .collect();
            let already = participants
                .iter()
                .filter(|b| b.settlement(mode).is_settled())
                .count();

            if participants.is_empty() || already == participants.len() {
                outcome.skipped.push(mode);
                continue;
            }
            if already > 0 {
                return Err(PoolError::Consistency {
                    match_id: m.id,
                    mode,
                    message: format!(
                        "{already} of {} bets already settled",
                        participants.len()
                    ),
                });
            }

            let results = self.settle(m, mode, &book)?;
            for (user, result) in &results {
                if let Some(bet) = updated.get_mut(user) {
                    bet.set_settlement(
                        mode,
                        SettlementState::Settled {
                            won: result.won,
                            earn: result.earn,
                            settled_at,
                        },
                    );
                }
            }
            outcome.settled.push(mode);
            outcome.results.insert(mode, results);
        }

        if outcome.wrote_anything() {
            ledger
                .write_bets(m.id, &updated)
                .map_err(|e| PoolError::Storage(format!("{e:#}")))?;
            info!(
                match_id = m.id,
                bets = updated.len(),
                modes = ?outcome.settled,
                "Match settled"
            );
        }

        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
