//! Mock match feed for integration testing.
//!
//! Returns a controllable match list. Tests move matches from scheduled to
//! completed between passes, or force the feed down.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::{Arc, Mutex};

use cup_pool::feed::MatchFeed;
use cup_pool::types::{Match, MatchStatus, Stage};

/// A scripted feed. Clones share state, so a test can keep a handle after
/// boxing one into the settler.
#[derive(Clone, Default)]
pub struct MockFeed {
    matches: Arc<Mutex<Vec<Match>>>,
    /// If set, every fetch fails with this message.
    force_error: Arc<Mutex<Option<String>>>,
}

impl MockFeed {
    pub fn new(matches: Vec<Match>) -> Self {
        Self {
            matches: Arc::new(Mutex::new(matches)),
            force_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Report a final result for a match.
    pub fn finish(&self, id: u32, goals: (u32, u32), penalties: Option<(u32, u32)>) {
        let mut matches = self.matches.lock().unwrap();
        let m = matches.iter_mut().find(|m| m.id == id).expect("unknown match");
        m.status = MatchStatus::Completed;
        m.home_goals = Some(goals.0);
        m.away_goals = Some(goals.1);
        m.home_penalties = penalties.map(|p| p.0);
        m.away_penalties = penalties.map(|p| p.1);
    }

    pub fn set_error(&self, message: Option<&str>) {
        *self.force_error.lock().unwrap() = message.map(String::from);
    }

    pub fn get(&self, id: u32) -> Match {
        self.matches
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .expect("unknown match")
    }
}

#[async_trait]
impl MatchFeed for MockFeed {
    async fn fetch_matches(&self) -> Result<Vec<Match>> {
        if let Some(msg) = self.force_error.lock().unwrap().clone() {
            return Err(anyhow!(msg));
        }
        Ok(self.matches.lock().unwrap().clone())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Kick-off time far enough in the future that bets are still open.
pub fn kickoff(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2099, 6, day, 15, 0, 0).unwrap()
}

/// One second before kick-off: the moment bets are placed in these tests.
pub fn before_kickoff(m: &Match) -> DateTime<Utc> {
    m.kickoff - Duration::seconds(1)
}

/// A scheduled match between two known teams.
pub fn scheduled(id: u32, knockout: bool, home: &str, away: &str) -> Match {
    Match {
        id,
        stage: if knockout { Stage::Knockout } else { Stage::Group },
        stage_name: if knockout { "Quarter-final".into() } else { "Group B".into() },
        kickoff: kickoff(id.min(28)),
        status: MatchStatus::Scheduled,
        home_team: home.to_string(),
        away_team: away.to_string(),
        home_goals: None,
        away_goals: None,
        home_penalties: None,
        away_penalties: None,
    }
}
