//! Aggregator: running balances across settled matches.

use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::ledger::BetBook;
use crate::types::{BetMode, Standing};

/// Sum every settled earn per user across the given match ledgers.
///
/// Pending modes contribute nothing. Sorted by total descending, ties by
/// user id ascending.
pub fn aggregate<'a, I>(books: I) -> Vec<Standing>
where
    I: IntoIterator<Item = &'a BetBook>,
{
    let mut by_user: BTreeMap<&str, Standing> = BTreeMap::new();

    for book in books {
        for (user, bet) in book {
            let settled: Vec<_> = BetMode::ALL
                .iter()
                .map(|m| bet.settlement(*m))
                .filter(|s| s.is_settled())
                .collect();
            if settled.is_empty() {
                continue;
            }

            let row = by_user.entry(user.as_str()).or_insert_with(|| Standing {
                user: user.clone(),
                total: Decimal::ZERO,
                matches_bet: 0,
                mode_wins: 0,
            });
            row.matches_bet += 1;
            for s in settled {
                row.total = row.total.saturating_add(s.earn());
                if s.won() {
                    row.mode_wins += 1;
                }
            }
        }
    }

    let mut standings: Vec<Standing> = by_user.into_values().collect();
    // Stable sort keeps the BTreeMap's user order among equal totals.
    standings.sort_by(|a, b| b.total.cmp(&a.total));
    standings
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
