//! CUP POOL: pari-mutuel tournament betting pool settlement
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires the match feed, bet ledger and settlement engine, and runs the
//! periodic settlement pass with graceful shutdown.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use cup_pool::config::{self, AppConfig};
use cup_pool::dashboard::{self, routes::DashboardState};
use cup_pool::engine::classifier::OutcomeClassifier;
use cup_pool::engine::settlement::SettlementEngine;
use cup_pool::engine::settler::{PassReport, Settler};
use cup_pool::feed::http::HttpFeed;
use cup_pool::feed::snapshot::SnapshotFeed;
use cup_pool::feed::{FeedOptions, MatchFeed};
use cup_pool::ledger::json_file::JsonFileLedger;
use cup_pool::types::round_amount;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::var("CUP_POOL_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let cfg = config::AppConfig::load(&config_path)?;

    init_logging();

    info!(
        pool = %cfg.pool.name,
        currency = %cfg.pool.currency,
        stake_strategy = ?cfg.settlement.stake_strategy,
        penalty_rule = ?cfg.settlement.penalty_rule,
        interval_secs = cfg.settler.interval_secs,
        "CUP POOL starting up"
    );

    let settler = build_settler(&cfg)?;

    let dashboard_state = Arc::new(DashboardState::new(
        cfg.pool.name.clone(),
        cfg.pool.currency.clone(),
        cfg.teams.clone(),
    ));
    if cfg.dashboard.enabled {
        dashboard::spawn_dashboard(dashboard_state.clone(), cfg.dashboard.port).await?;
    }

    if cfg.settler.run_once {
        run_cycle(&settler, &dashboard_state).await?;
        return Ok(());
    }

    // -- Main loop -------------------------------------------------------

    let mut interval = tokio::time::interval(Duration::from_secs(cfg.settler.interval_secs));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.settler.interval_secs,
        "Entering settlement loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = run_cycle(&settler, &dashboard_state).await {
                    error!(error = %format!("{e:#}"), "Settlement pass failed, retrying next cycle");
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    info!("CUP POOL shut down cleanly.");
    Ok(())
}

/// Wire feed, ledger and engine from configuration.
fn build_settler(cfg: &AppConfig) -> Result<Settler> {
    let opts = FeedOptions::from_config(cfg);

    let feed: Box<dyn MatchFeed> = match (&cfg.feed.snapshot_path, cfg.feed.snapshot_only) {
        (Some(path), true) => {
            info!(path = %path, "Using feed snapshot");
            Box::new(SnapshotFeed::new(path, opts))
        }
        (None, true) => anyhow::bail!("feed.snapshot_only requires feed.snapshot_path"),
        (snapshot, false) => {
            let api_key = match cfg.feed.api_key_env.as_deref() {
                Some(env) => match AppConfig::resolve_env(env) {
                    Ok(key) => Some(key),
                    Err(e) => {
                        warn!(error = %e, "Feed API key not set, requesting without it");
                        None
                    }
                },
                None => None,
            };
            info!(url = %cfg.feed.url, retries = cfg.feed.max_retries, "Using HTTP feed");
            Box::new(
                HttpFeed::new(
                    cfg.feed.url.clone(),
                    cfg.feed.max_retries,
                    Duration::from_secs(cfg.feed.timeout_secs),
                    opts,
                )?
                .with_api_key(api_key)
                .with_snapshot(snapshot.as_ref().map(Into::into)),
            )
        }
    };

    let ledger = JsonFileLedger::open(&cfg.ledger.bets_dir)?;

    let engine = SettlementEngine::new(
        OutcomeClassifier::new(cfg.settlement.penalty_rule),
        cfg.settlement.stake_strategy,
        cfg.settlement.tolerance,
    );

    Ok(Settler::new(feed, Box::new(ledger), engine))
}

/// Run one settlement pass and publish the resulting standings.
async fn run_cycle(settler: &Settler, dashboard: &DashboardState) -> Result<()> {
    let (matches, report) = settler.run_pass().await?;
    let history = settler.history(&matches);
    let standings = settler.standings(&matches);
    let open = settler.open_matches(&matches, chrono::Utc::now());

    log_pass_report(&report);
    for (rank, s) in standings.iter().enumerate() {
        info!(
            rank = rank + 1,
            user = %s.user,
            total = %round_amount(s.total),
            matches = s.matches_bet,
            "Standing"
        );
    }

    info!(open = open.len(), "Matches open for betting");
    dashboard.publish(report, &standings, &history, &open).await;
    Ok(())
}

/// Log a human-readable pass summary.
fn log_pass_report(report: &PassReport) {
    info!(
        seen = report.matches_seen,
        completed = report.completed,
        settled = ?report.settled,
        skipped = report.skipped,
        failed = report.failed.len(),
        "Pass complete"
    );
    for f in &report.failed {
        warn!(match_id = f.match_id, reason = %f.reason, "Match left unsettled");
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("cup_pool=info"));

    let json_logging = std::env::var("CUP_POOL_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
