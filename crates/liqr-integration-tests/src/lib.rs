//! Integration test crate for the liquidation ledger.
//!
//! This crate has no library code — it only contains integration tests
//! that exercise full collect→swap/settle→distribute cycles across the
//! workspace crates, including the adversarial reentrancy scenarios.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p liqr-integration-tests
//! ```
