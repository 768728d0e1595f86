//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>`
//! and replaced wholesale after each settlement pass.

use axum::{extract::State, http::StatusCode, Json};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::engine::settler::{OpenMatch, PassReport, SettledMatch};
use crate::types::{round_amount, Bet, BetMode, Outcome, SettlementState, Standing};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub pool_name: String,
    pub currency: String,
    /// Team name → flag code. Static for the life of the process.
    teams: HashMap<String, String>,
    standings: RwLock<Vec<StandingEntry>>,
    history: RwLock<Vec<HistoryEntry>>,
    current: RwLock<Vec<CurrentEntry>>,
    last_pass: RwLock<Option<PassReport>>,
}

impl DashboardState {
    pub fn new(pool_name: String, currency: String, teams: HashMap<String, String>) -> Self {
        Self {
            pool_name,
            currency,
            teams,
            standings: RwLock::new(Vec::new()),
            history: RwLock::new(Vec::new()),
            current: RwLock::new(Vec::new()),
            last_pass: RwLock::new(None),
        }
    }

    /// Replace the published view with the results of a pass.
    pub async fn publish(
        &self,
        report: PassReport,
        standings: &[Standing],
        history: &[SettledMatch],
        open: &[OpenMatch],
    ) {
        let standings: Vec<StandingEntry> = standings
            .iter()
            .enumerate()
            .map(|(i, s)| StandingEntry {
                rank: i + 1,
                user: s.user.clone(),
                total: display_amount(s.total),
                matches_bet: s.matches_bet,
                mode_wins: s.mode_wins,
            })
            .collect();
        let history: Vec<HistoryEntry> = history.iter().map(|h| self.history_entry(h)).collect();
        let current: Vec<CurrentEntry> = open.iter().map(|o| self.current_entry(o)).collect();

        *self.standings.write().await = standings;
        *self.history.write().await = history;
        *self.current.write().await = current;
        *self.last_pass.write().await = Some(report);
    }

    fn flag(&self, team: &str) -> Option<String> {
        self.teams.get(team).cloned()
    }

    fn history_entry(&self, h: &SettledMatch) -> HistoryEntry {
        let m = &h.matched;
        HistoryEntry {
            match_id: m.id,
            stage_name: m.stage_name.clone(),
            kickoff: m.kickoff.to_rfc3339(),
            home_team: m.home_team.clone(),
            home_flag: self.flag(&m.home_team),
            away_team: m.away_team.clone(),
            away_flag: self.flag(&m.away_team),
            home_goals: m.home_goals,
            away_goals: m.away_goals,
            home_penalties: m.home_penalties,
            away_penalties: m.away_penalties,
            bets: h.bets.values().map(bet_entry).collect(),
        }
    }

    fn current_entry(&self, o: &OpenMatch) -> CurrentEntry {
        let m = &o.matched;
        // Knockout matches cannot be drawn, so there is no draw bucket.
        let outcomes: &[Outcome] = if m.is_knockout() {
            &[Outcome::HomeWin, Outcome::AwayWin]
        } else {
            &[Outcome::HomeWin, Outcome::Draw, Outcome::AwayWin]
        };
        CurrentEntry {
            match_id: m.id,
            stage_name: m.stage_name.clone(),
            kickoff: m.kickoff.to_rfc3339(),
            home_team: m.home_team.clone(),
            home_flag: self.flag(&m.home_team),
            away_team: m.away_team.clone(),
            away_flag: self.flag(&m.away_team),
            outcomes: outcomes
                .iter()
                .map(|&outcome| OutcomeEntry {
                    outcome: outcome.to_string(),
                    same_total: display_amount(o.totals.on(outcome)),
                    other_total: display_amount(o.totals.against(outcome)),
                })
                .collect(),
            bets: o.bets.values().map(bet_entry).collect(),
        }
    }
}

fn bet_entry(b: &Bet) -> BetEntry {
    BetEntry {
        user: b.user.clone(),
        prediction: b.prediction.to_string(),
        stake: display_amount(b.stake),
        exact_score: mode_entry(b.settlement(BetMode::ExactScore)),
        outcome_sign: mode_entry(b.settlement(BetMode::OutcomeSign)),
    }
}

fn display_amount(amount: Decimal) -> f64 {
    round_amount(amount).to_f64().unwrap_or_default()
}

fn mode_entry(state: &SettlementState) -> Option<ModeEntry> {
    match state {
        SettlementState::Settled { won, earn, .. } => Some(ModeEntry {
            won: *won,
            earn: display_amount(*earn),
        }),
        SettlementState::Pending => None,
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StandingEntry {
    pub rank: usize,
    pub user: String,
    pub total: f64,
    pub matches_bet: u32,
    pub mode_wins: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct StandingsResponse {
    pub pool: String,
    pub currency: String,
    pub standings: Vec<StandingEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub match_id: u32,
    pub stage_name: String,
    pub kickoff: String,
    pub home_team: String,
    pub home_flag: Option<String>,
    pub away_team: String,
    pub away_flag: Option<String>,
    pub home_goals: Option<u32>,
    pub away_goals: Option<u32>,
    pub home_penalties: Option<u32>,
    pub away_penalties: Option<u32>,
    pub bets: Vec<BetEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CurrentEntry {
    pub match_id: u32,
    pub stage_name: String,
    pub kickoff: String,
    pub home_team: String,
    pub home_flag: Option<String>,
    pub away_team: String,
    pub away_flag: Option<String>,
    pub outcomes: Vec<OutcomeEntry>,
    pub bets: Vec<BetEntry>,
}

/// Stake backing one outcome versus everything staked against it.
#[derive(Debug, Clone, Serialize)]
pub struct OutcomeEntry {
    pub outcome: String,
    pub same_total: f64,
    pub other_total: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BetEntry {
    pub user: String,
    pub prediction: String,
    pub stake: f64,
    pub exact_score: Option<ModeEntry>,
    pub outcome_sign: Option<ModeEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModeEntry {
    pub won: bool,
    pub earn: f64,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

pub type AppState = Arc<DashboardState>;

/// GET /api/standings
pub async fn get_standings(State(state): State<AppState>) -> Json<StandingsResponse> {
    Json(StandingsResponse {
        pool: state.pool_name.clone(),
        currency: state.currency.clone(),
        standings: state.standings.read().await.clone(),
    })
}

/// GET /api/history
pub async fn get_history(State(state): State<AppState>) -> Json<Vec<HistoryEntry>> {
    Json(state.history.read().await.clone())
}

/// GET /api/current
pub async fn get_current(State(state): State<AppState>) -> Json<Vec<CurrentEntry>> {
    Json(state.current.read().await.clone())
}

/// GET /api/last-pass
pub async fn get_last_pass(State(state): State<AppState>) -> Result<Json<PassReport>, StatusCode> {
    state
        .last_pass
        .read()
        .await
        .clone()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}
