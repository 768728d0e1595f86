//! In-memory ledger, for tests and for embedding the engine without disk.

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::Mutex;

use super::{BetBook, BetLedger};

#[derive(Debug, Default)]
pub struct MemoryLedger {
    books: Mutex<HashMap<u32, BetBook>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a match's bets directly.
    pub fn with_bets(self, match_id: u32, bets: BetBook) -> Self {
        if let Ok(mut books) = self.books.lock() {
            books.insert(match_id, bets);
        }
        self
    }
}

impl BetLedger for MemoryLedger {
    fn read_bets(&self, match_id: u32) -> Result<BetBook> {
        let books = self.books.lock().map_err(|_| anyhow!("ledger lock poisoned"))?;
        Ok(books.get(&match_id).cloned().unwrap_or_default())
    }

    fn write_bets(&self, match_id: u32, bets: &BetBook) -> Result<()> {
        let mut books = self.books.lock().map_err(|_| anyhow!("ledger lock poisoned"))?;
        books.insert(match_id, bets.clone());
        Ok(())
    }
}
