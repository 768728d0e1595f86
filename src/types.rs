//! Shared types for the CUP POOL settlement engine.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that the feed, ledger, engine,
//! and dashboard modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// User identifier as supplied by the front end (chat handle).
pub type UserId = String;

/// Placeholder team name used by feeds before a knockout slot is decided.
pub const UNDETERMINED_TEAM: &str = "To Be Determined";

// ---------------------------------------------------------------------------
// Score & outcome
// ---------------------------------------------------------------------------

/// A (home, away) goal pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Score {
    pub home: u32,
    pub away: u32,
}

impl Score {
    pub fn new(home: u32, away: u32) -> Self {
        Self { home, away }
    }

    /// Outcome sign implied by this score.
    pub fn outcome(&self) -> Outcome {
        Outcome::compare(self.home, self.away)
    }

    pub fn is_level(&self) -> bool {
        self.home == self.away
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.home, self.away)
    }
}

/// Sign of a match result from the home side's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    #[serde(rename = "draw")]
    Draw,
    #[serde(rename = "home")]
    HomeWin,
    #[serde(rename = "away")]
    AwayWin,
}

impl Outcome {
    pub fn compare(home: u32, away: u32) -> Self {
        match home.cmp(&away) {
            std::cmp::Ordering::Equal => Outcome::Draw,
            std::cmp::Ordering::Greater => Outcome::HomeWin,
            std::cmp::Ordering::Less => Outcome::AwayWin,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Draw => write!(f, "draw"),
            Outcome::HomeWin => write!(f, "home"),
            Outcome::AwayWin => write!(f, "away"),
        }
    }
}

impl std::str::FromStr for Outcome {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draw" | "d" => Ok(Outcome::Draw),
            "home" | "h" => Ok(Outcome::HomeWin),
            "away" | "a" => Ok(Outcome::AwayWin),
            other => anyhow::bail!("Unknown outcome: {other}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Match
// ---------------------------------------------------------------------------

/// Tournament phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Group,
    /// Draws are impossible; level matches go to a penalty shootout.
    Knockout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchStatus {
    Scheduled,
    InProgress,
    Completed,
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchStatus::Scheduled => write!(f, "scheduled"),
            MatchStatus::InProgress => write!(f, "in progress"),
            MatchStatus::Completed => write!(f, "completed"),
        }
    }
}

/// A tournament match as reported by the match feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub id: u32,
    pub stage: Stage,
    /// Human-readable stage label from the feed ("Group A", "Final", ...).
    pub stage_name: String,
    pub kickoff: DateTime<Utc>,
    pub status: MatchStatus,
    pub home_team: String,
    pub away_team: String,
    /// Regulation (and extra-time) goals; `None` until the match starts.
    pub home_goals: Option<u32>,
    pub away_goals: Option<u32>,
    /// Penalty-shootout goals; present only for shootout-decided matches.
    pub home_penalties: Option<u32>,
    pub away_penalties: Option<u32>,
}

impl Match {
    pub fn is_completed(&self) -> bool {
        self.status == MatchStatus::Completed
    }

    pub fn is_knockout(&self) -> bool {
        self.stage == Stage::Knockout
    }

    /// Whether either side is still a placeholder.
    pub fn has_undetermined_team(&self) -> bool {
        self.home_team == UNDETERMINED_TEAM || self.away_team == UNDETERMINED_TEAM
    }

    /// Bets are accepted until kickoff, and only once both teams are known.
    pub fn is_open_for_betting(&self, now: DateTime<Utc>) -> bool {
        self.status == MatchStatus::Scheduled
            && now < self.kickoff
            && !self.has_undetermined_team()
    }

    /// Helper to build a test/sample match with sensible defaults.
    #[cfg(test)]
    pub fn sample(id: u32) -> Self {
        Match {
            id,
            stage: if id >= 49 { Stage::Knockout } else { Stage::Group },
            stage_name: if id >= 49 { "Round of 16".into() } else { "Group A".into() },
            kickoff: Utc::now() - chrono::Duration::hours(3),
            status: MatchStatus::Completed,
            home_team: "Brazil".to_string(),
            away_team: "Croatia".to_string(),
            home_goals: Some(2),
            away_goals: Some(1),
            home_penalties: None,
            away_penalties: None,
        }
    }
}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} ({}) {} ", self.id, self.stage_name, self.home_team)?;
        match (self.home_goals, self.away_goals) {
            (Some(h), Some(a)) => match (self.home_penalties, self.away_penalties) {
                (Some(hp), Some(ap)) => write!(f, "{h} ({hp}) - ({ap}) {a}")?,
                _ => write!(f, "{h} - {a}")?,
            },
            _ => write!(f, "vs")?,
        }
        write!(f, " {}", self.away_team)
    }
}

// ---------------------------------------------------------------------------
// Betting modes & predictions
// ---------------------------------------------------------------------------

/// Independently settled betting pools on the same match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetMode {
    /// Wins only on the literal finishing score.
    ExactScore,
    /// Wins on the win/draw/loss direction.
    OutcomeSign,
}

impl BetMode {
    pub const ALL: &'static [BetMode] = &[BetMode::ExactScore, BetMode::OutcomeSign];
}

impl fmt::Display for BetMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BetMode::ExactScore => write!(f, "exact-score"),
            BetMode::OutcomeSign => write!(f, "outcome-sign"),
        }
    }
}

/// What a bettor picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Prediction {
    /// A score pick; funds both modes, outcome sign derived from the score.
    Score(Score),
    /// A direction pick; funds the outcome-sign mode only.
    Outcome { outcome: Outcome },
}

impl Prediction {
    pub fn score(home: u32, away: u32) -> Self {
        Prediction::Score(Score::new(home, away))
    }

    pub fn outcome(outcome: Outcome) -> Self {
        Prediction::Outcome { outcome }
    }

    pub fn applies_to(&self, mode: BetMode) -> bool {
        match (self, mode) {
            (Prediction::Score(_), _) => true,
            (Prediction::Outcome { .. }, BetMode::OutcomeSign) => true,
            (Prediction::Outcome { .. }, BetMode::ExactScore) => false,
        }
    }

    /// Number of modes this prediction puts stake into.
    pub fn funded_modes(&self) -> u32 {
        BetMode::ALL.iter().filter(|m| self.applies_to(**m)).count() as u32
    }

    pub fn predicted_outcome(&self) -> Outcome {
        match self {
            Prediction::Score(s) => s.outcome(),
            Prediction::Outcome { outcome } => *outcome,
        }
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prediction::Score(s) => write!(f, "score {s}"),
            Prediction::Outcome { outcome } => write!(f, "outcome {outcome}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Bets & settlement state
// ---------------------------------------------------------------------------

/// Per-mode settlement state carried on a bet record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SettlementState {
    #[default]
    Pending,
    Settled {
        won: bool,
        /// Net gain (positive) or loss (negative), full precision.
        #[serde(with = "rust_decimal::serde::str")]
        earn: Decimal,
        settled_at: DateTime<Utc>,
    },
}

impl SettlementState {
    pub fn is_settled(&self) -> bool {
        matches!(self, SettlementState::Settled { .. })
    }

    /// Earn amount, zero while pending.
    pub fn earn(&self) -> Decimal {
        match self {
            SettlementState::Settled { earn, .. } => *earn,
            SettlementState::Pending => Decimal::ZERO,
        }
    }

    pub fn won(&self) -> bool {
        matches!(self, SettlementState::Settled { won: true, .. })
    }
}

/// A user's bet on one match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bet {
    pub user: UserId,
    pub prediction: Prediction,
    #[serde(with = "rust_decimal::serde::str")]
    pub stake: Decimal,
    pub placed_at: DateTime<Utc>,
    #[serde(default)]
    pub exact_score: SettlementState,
    #[serde(default)]
    pub outcome_sign: SettlementState,
}

impl Bet {
    pub fn new(user: impl Into<UserId>, prediction: Prediction, stake: Decimal) -> Self {
        Self {
            user: user.into(),
            prediction,
            stake,
            placed_at: Utc::now(),
            exact_score: SettlementState::Pending,
            outcome_sign: SettlementState::Pending,
        }
    }

    pub fn settlement(&self, mode: BetMode) -> &SettlementState {
        match mode {
            BetMode::ExactScore => &self.exact_score,
            BetMode::OutcomeSign => &self.outcome_sign,
        }
    }

    pub fn set_settlement(&mut self, mode: BetMode, state: SettlementState) {
        match mode {
            BetMode::ExactScore => self.exact_score = state,
            BetMode::OutcomeSign => self.outcome_sign = state,
        }
    }

    /// Sum of settled earns over all modes.
    pub fn total_earn(&self) -> Decimal {
        self.exact_score.earn() + self.outcome_sign.earn()
    }
}

impl fmt::Display for Bet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}, stake {}", self.user, self.prediction, round_amount(self.stake))?;
        for mode in BetMode::ALL {
            if let SettlementState::Settled { won, earn, .. } = self.settlement(*mode) {
                let mark = if *won { "won" } else { "lost" };
                write!(f, " | {mode} {mark} {:+}", round_amount(*earn))?;
            }
        }
        Ok(())
    }
}

/// Computed result for one bettor in one mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeResult {
    pub won: bool,
    pub earn: Decimal,
}

// ---------------------------------------------------------------------------
// Deployment choices
// ---------------------------------------------------------------------------

/// How much of a bet's stake is at risk in each mode it participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StakeStrategy {
    /// Full stake forfeited/redistributed in every participating mode.
    FullStake,
    /// Stake divided evenly across the modes the bet funds.
    #[default]
    SplitStake,
}

/// How a feed's penalty fields mark a shootout-decided match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PenaltyRule {
    /// Any non-null penalty field (a 0-0 shootout still counts).
    #[default]
    Presence,
    /// At least one strictly positive penalty field.
    Positive,
}

// ---------------------------------------------------------------------------
// Leaderboard
// ---------------------------------------------------------------------------

/// One row of the running leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standing {
    pub user: UserId,
    pub total: Decimal,
    pub matches_bet: u32,
    pub mode_wins: u32,
}

impl fmt::Display for Standing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {:+} ({} matches, {} wins)",
            self.user,
            round_amount(self.total),
            self.matches_bet,
            self.mode_wins,
        )
    }
}

/// Round a currency amount to two decimals for display only.
pub fn round_amount(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for CUP POOL.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Data error (match {match_id}): {message}")]
    Data { match_id: u32, message: String },

    #[error("Consistency error (match {match_id}, {mode}): {message}")]
    Consistency {
        match_id: u32,
        mode: BetMode,
        message: String,
    },

    #[error("Invalid bet: {0}")]
    InvalidBet(String),

    #[error("Betting closed for match {0}")]
    BettingClosed(u32),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Feed error: {0}")]
    Feed(String),
}

impl PoolError {
    pub fn data(match_id: u32, message: impl Into<String>) -> Self {
        PoolError::Data { match_id, message: message.into() }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_outcome_compare() {
        assert_eq!(Outcome::compare(1, 1), Outcome::Draw);
        assert_eq!(Outcome::compare(2, 1), Outcome::HomeWin);
        assert_eq!(Outcome::compare(0, 3), Outcome::AwayWin);
    }

    #[test]
    fn test_outcome_from_str() {
        assert_eq!("draw".parse::<Outcome>().unwrap(), Outcome::Draw);
        assert_eq!("HOME".parse::<Outcome>().unwrap(), Outcome::HomeWin);
        assert_eq!("a".parse::<Outcome>().unwrap(), Outcome::AwayWin);
        assert!("win".parse::<Outcome>().is_err());
    }

    #[test]
    fn test_prediction_applies_to_modes() {
        let score = Prediction::score(2, 1);
        assert!(score.applies_to(BetMode::ExactScore));
        assert!(score.applies_to(BetMode::OutcomeSign));
        assert_eq!(score.funded_modes(), 2);
        assert_eq!(score.predicted_outcome(), Outcome::HomeWin);

        let sign = Prediction::outcome(Outcome::Draw);
        assert!(!sign.applies_to(BetMode::ExactScore));
        assert!(sign.applies_to(BetMode::OutcomeSign));
        assert_eq!(sign.funded_modes(), 1);
    }

    #[test]
    fn test_bet_json_format() {
        let mut bet = Bet::new("alice", Prediction::score(2, 1), dec!(50));
        bet.set_settlement(
            BetMode::ExactScore,
            SettlementState::Settled { won: true, earn: dec!(21.4285714), settled_at: Utc::now() },
        );

        let json: serde_json::Value = serde_json::to_value(&bet).unwrap();
        assert_eq!(json["stake"], "50");
        assert_eq!(json["prediction"]["kind"], "score");
        assert_eq!(json["prediction"]["home"], 2);
        assert_eq!(json["exact_score"]["state"], "settled");
        assert_eq!(json["exact_score"]["earn"], "21.4285714");
        assert_eq!(json["outcome_sign"]["state"], "pending");

        let back: Bet = serde_json::from_value(json).unwrap();
        assert_eq!(back, bet);
    }

    #[test]
    fn test_bet_without_settlement_fields_is_pending() {
        let json = r#"{"user":"bob","prediction":{"kind":"outcome","outcome":"away"},
                       "stake":"30","placed_at":"2022-11-20T10:00:00Z"}"#;
        let bet: Bet = serde_json::from_str(json).unwrap();
        assert_eq!(bet.exact_score, SettlementState::Pending);
        assert_eq!(bet.outcome_sign, SettlementState::Pending);
        assert_eq!(bet.total_earn(), Decimal::ZERO);
    }

    #[test]
    fn test_match_betting_window() {
        let mut m = Match::sample(10);
        m.status = MatchStatus::Scheduled;
        m.kickoff = Utc::now() + chrono::Duration::hours(2);
        assert!(m.is_open_for_betting(Utc::now()));
        assert!(!m.is_open_for_betting(m.kickoff));

        m.away_team = UNDETERMINED_TEAM.to_string();
        assert!(!m.is_open_for_betting(Utc::now()));
    }

    #[test]
    fn test_match_display() {
        let mut m = Match::sample(57);
        m.home_goals = Some(1);
        m.away_goals = Some(1);
        m.home_penalties = Some(4);
        m.away_penalties = Some(2);
        assert_eq!(m.to_string(), "#57 (Round of 16) Brazil 1 (4) - (2) 1 Croatia");
    }

    #[test]
    fn test_round_amount_display_only() {
        assert_eq!(round_amount(dec!(21.428571)), dec!(21.43));
        assert_eq!(round_amount(dec!(-8.575)), dec!(-8.58));
    }

    #[test]
    fn test_pool_error_display() {
        let err = PoolError::data(7, "missing goals");
        assert_eq!(err.to_string(), "Data error (match 7): missing goals");
    }
}
