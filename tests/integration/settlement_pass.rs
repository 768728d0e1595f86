//! End-to-end settlement passes: bets submitted before kick-off, results
//! reported by the feed, settlement persisted to a JSON ledger on disk.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::path::{Path, PathBuf};

use cup_pool::engine::aggregator::aggregate;
use cup_pool::engine::classifier::OutcomeClassifier;
use cup_pool::engine::settlement::SettlementEngine;
use cup_pool::engine::settler::Settler;
use cup_pool::feed::snapshot::SnapshotFeed;
use cup_pool::feed::FeedOptions;
use cup_pool::ledger::json_file::JsonFileLedger;
use cup_pool::ledger::{submit_bet, BetBook, BetLedger, BetRules};
use cup_pool::types::{round_amount, Bet, Outcome, PenaltyRule, Prediction, StakeStrategy, Standing};

use crate::mock_feed::{before_kickoff, scheduled, MockFeed};

fn temp_dir() -> PathBuf {
    std::env::temp_dir().join(format!("cup_pool_it_{}", uuid::Uuid::new_v4()))
}

fn engine(strategy: StakeStrategy) -> SettlementEngine {
    SettlementEngine::new(
        OutcomeClassifier::new(PenaltyRule::Presence),
        strategy,
        dec!(0.000000001),
    )
}

fn settler(feed: &MockFeed, dir: &Path) -> Settler {
    Settler::new(
        Box::new(feed.clone()),
        Box::new(JsonFileLedger::open(dir).unwrap()),
        engine(StakeStrategy::SplitStake),
    )
}

/// A group match, a quarter-final and the (still open) final, with bets.
fn tournament(dir: &Path) -> MockFeed {
    let feed = MockFeed::new(vec![
        scheduled(1, false, "Brazil", "Serbia"),
        scheduled(57, true, "Croatia", "Brazil"),
        scheduled(64, true, "Argentina", "France"),
    ]);
    let ledger = JsonFileLedger::open(dir).unwrap();
    let rules = BetRules { min_stake: dec!(20) };

    let bets = [
        (1, "A", Prediction::score(2, 1), dec!(50)),
        (1, "B", Prediction::score(1, 1), dec!(30)),
        (1, "C", Prediction::score(3, 1), dec!(20)),
        (57, "D", Prediction::score(5, 3), dec!(20)),
        (57, "E", Prediction::score(1, 0), dec!(40)),
        (57, "F", Prediction::score(0, 1), dec!(20)),
        (64, "G", Prediction::score(2, 0), dec!(25)),
    ];
    for (id, user, prediction, stake) in bets {
        let m = feed.get(id);
        submit_bet(&ledger, &m, Bet::new(user, prediction, stake), &rules, before_kickoff(&m)).unwrap();
    }
    feed
}

fn rounded(standings: &[Standing]) -> Vec<(String, Decimal)> {
    standings
        .iter()
        .map(|s| (s.user.clone(), round_amount(s.total)))
        .collect()
}

#[tokio::test]
async fn test_full_tournament_pass() {
    let dir = temp_dir();
    let feed = tournament(&dir);
    feed.finish(1, (2, 1), None);
    feed.finish(57, (1, 1), Some((4, 2)));

    let settler = settler(&feed, &dir);
    let (matches, report) = settler.run_pass().await.unwrap();
    assert_eq!(report.matches_seen, 3);
    assert_eq!(report.completed, 2);
    assert_eq!(report.settled, vec![1, 57]);
    assert!(report.failed.is_empty());

    let standings = settler.standings(&matches);
    assert_eq!(
        rounded(&standings),
        vec![
            ("A".to_string(), dec!(35.71)),
            ("D".to_string(), dec!(33.33)),
            ("C".to_string(), dec!(-5.71)),
            ("E".to_string(), dec!(-13.33)),
            ("F".to_string(), dec!(-20.00)),
            ("B".to_string(), dec!(-30.00)),
        ]
    );
    let net: Decimal = standings.iter().map(|s| s.total).sum();
    assert!(net.abs() <= dec!(0.000000002));

    // D called the shootout-inclusive 5-3 and wins both modes.
    assert_eq!(standings[1].mode_wins, 2);

    // The final has not been played: G's bet is untouched.
    let reopened = JsonFileLedger::open(&dir).unwrap();
    let final_bets = reopened.read_bets(64).unwrap();
    assert!(!final_bets["G"].exact_score.is_settled());
    assert!(!final_bets["G"].outcome_sign.is_settled());

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_repeated_pass_changes_nothing() {
    let dir = temp_dir();
    let feed = tournament(&dir);
    feed.finish(1, (2, 1), None);
    let settler = settler(&feed, &dir);

    settler.run_pass().await.unwrap();
    let record = dir.join("1.json");
    let first = std::fs::read(&record).unwrap();

    let (_, report) = settler.run_pass().await.unwrap();
    assert!(report.settled.is_empty());
    assert_eq!(report.skipped, 1);
    assert_eq!(std::fs::read(&record).unwrap(), first);

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_feed_outage_then_recovery() {
    let dir = temp_dir();
    let feed = tournament(&dir);
    feed.finish(1, (2, 1), None);
    feed.set_error(Some("503 from upstream"));
    let settler = settler(&feed, &dir);

    let err = settler.run_pass().await.unwrap_err();
    assert!(format!("{err:#}").contains("503 from upstream"));
    let book = settler.ledger().read_bets(1).unwrap();
    assert!(book.values().all(|b| !b.exact_score.is_settled()));

    feed.set_error(None);
    let (_, report) = settler.run_pass().await.unwrap();
    assert_eq!(report.settled, vec![1]);

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_bad_result_isolated_until_corrected() {
    let dir = temp_dir();
    let feed = tournament(&dir);
    feed.finish(1, (2, 1), None);
    // Level knockout result without a shootout: the feed is wrong.
    feed.finish(57, (1, 1), None);
    let settler = settler(&feed, &dir);

    let (_, report) = settler.run_pass().await.unwrap();
    assert_eq!(report.settled, vec![1]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].match_id, 57);
    let qf = settler.ledger().read_bets(57).unwrap();
    assert!(qf.values().all(|b| !b.exact_score.is_settled() && !b.outcome_sign.is_settled()));

    feed.finish(57, (1, 1), Some((4, 2)));
    let (_, report) = settler.run_pass().await.unwrap();
    assert_eq!(report.settled, vec![57]);
    assert_eq!(report.skipped, 1);
    assert!(report.failed.is_empty());

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_open_matches_until_kickoff() {
    let dir = temp_dir();
    let feed = tournament(&dir);
    feed.finish(1, (2, 1), None);
    let settler = settler(&feed, &dir);

    let (matches, _) = settler.run_pass().await.unwrap();
    let final_ = feed.get(64);
    let open = settler.open_matches(&matches, before_kickoff(&final_));
    let ids: Vec<u32> = open.iter().map(|o| o.matched.id).collect();
    assert_eq!(ids, vec![57, 64]);
    assert_eq!(open[1].totals.on(Outcome::HomeWin), dec!(25));
    assert_eq!(open[1].totals.against(Outcome::HomeWin), Decimal::ZERO);

    assert!(settler.open_matches(&matches, final_.kickoff).is_empty());

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_snapshot_feed_full_stake() {
    let dir = temp_dir();
    std::fs::create_dir_all(&dir).unwrap();
    let snapshot = dir.join("feed.json");
    std::fs::write(
        &snapshot,
        r#"[{"id": 1, "status": "completed", "stage_name": "Group A",
             "datetime": "2022-11-20T16:00:00Z",
             "home_team": {"name": "Qatar", "goals": 0, "penalties": null},
             "away_team": {"name": "Ecuador", "goals": 2, "penalties": null}}]"#,
    )
    .unwrap();

    let ledger = JsonFileLedger::open(dir.join("bets")).unwrap();
    let mut book = BetBook::new();
    book.insert("x".into(), Bet::new("x", Prediction::score(0, 2), dec!(20)));
    book.insert("y".into(), Bet::new("y", Prediction::score(1, 1), dec!(30)));
    ledger.write_bets(1, &book).unwrap();

    let settler = Settler::new(
        Box::new(SnapshotFeed::new(&snapshot, FeedOptions::default())),
        Box::new(ledger),
        engine(StakeStrategy::FullStake),
    );
    let (matches, report) = settler.run_pass().await.unwrap();
    assert_eq!(report.settled, vec![1]);

    let history = settler.history(&matches);
    let standings = aggregate(history.iter().map(|h| &h.bets));
    assert_eq!(standings[0].user, "x");
    assert_eq!(standings[0].total, dec!(60));
    assert_eq!(standings[1].total, dec!(-60));

    std::fs::remove_dir_all(&dir).ok();
}
