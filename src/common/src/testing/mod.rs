//! Test utilities for the shredder workspace.
//!
//! This module is only available when the `testing` feature is enabled or during tests:
//!
//! ```toml
//! [dev-dependencies]
//! common = { path = "../common", features = ["testing"] }
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use common::testing::InMemoryWarehouse;
//!
//! let warehouse = InMemoryWarehouse::new()
//!     .with_table("telemetry_stable.main_v4", 10_000)
//!     .with_dry_run_cost(128);
//! ```

mod warehouse;

pub use warehouse::{InMemoryWarehouse, SubmittedStatement};
