//! Outcome classifier: canonical finishing score and outcome sign.
//!
//! The finishing score of a match is regulation goals plus penalty-shootout
//! goals. Which matches count as shootout-decided depends on the feed's
//! semantics for the penalty fields, selected by [`PenaltyRule`].

use crate::types::{Match, Outcome, PenaltyRule, PoolError, Score};

#[derive(Debug, Clone, Copy, Default)]
pub struct OutcomeClassifier {
    penalty_rule: PenaltyRule,
}

impl OutcomeClassifier {
    pub fn new(penalty_rule: PenaltyRule) -> Self {
        Self { penalty_rule }
    }

    pub fn penalty_rule(&self) -> PenaltyRule {
        self.penalty_rule
    }

    /// Whether the match was decided by a penalty shootout.
    pub fn is_penalty_resolved(&self, m: &Match) -> bool {
        match self.penalty_rule {
            PenaltyRule::Presence => m.home_penalties.is_some() || m.away_penalties.is_some(),
            PenaltyRule::Positive => {
                m.home_penalties.unwrap_or(0) > 0 || m.away_penalties.unwrap_or(0) > 0
            }
        }
    }

    /// Regulation goals plus shootout goals, per side.
    pub fn finishing_score(&self, m: &Match) -> Result<Score, PoolError> {
        if !m.is_completed() {
            return Err(PoolError::data(m.id, format!("match is {}, not completed", m.status)));
        }

        let (home, away) = match (m.home_goals, m.away_goals) {
            (Some(h), Some(a)) => (h, a),
            _ => return Err(PoolError::data(m.id, "completed match without regulation goals")),
        };

        let score = if self.is_penalty_resolved(m) {
            match (m.home_penalties, m.away_penalties) {
                (Some(hp), Some(ap)) => Score::new(home + hp, away + ap),
                _ => {
                    return Err(PoolError::data(
                        m.id,
                        "penalty shootout reported for one side only",
                    ))
                }
            }
        } else {
            Score::new(home, away)
        };

        if m.is_knockout() && score.is_level() {
            return Err(PoolError::data(
                m.id,
                format!("knockout match finished level at {score}"),
            ));
        }

        Ok(score)
    }

    pub fn outcome(&self, m: &Match) -> Result<Outcome, PoolError> {
        Ok(self.finishing_score(m)?.outcome())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
