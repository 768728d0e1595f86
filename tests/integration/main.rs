//! Integration tests: full settlement passes over a scripted feed and an
//! on-disk ledger.

mod mock_feed;
mod settlement_pass;
