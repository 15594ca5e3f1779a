//! # Dynamic Worker Pool
//!
//! A bounded, runtime-reconfigurable worker pool with rejection accounting and
//! cooldown-gated utilization alerts.
//!
//! ## Core Problem Solved
//!
//! Long-running services size their worker pools once at startup and then live
//! with the choice. This crate keeps the pool tunable while it runs:
//!
//! - **Live Reconfiguration**: core size, maximum size and rejection policy
//!   change as one unit, validated before anything is touched
//! - **Transparent Rejection Accounting**: every rejection is counted exactly
//!   once without changing what the chosen policy does
//! - **Utilization Alerts**: a background check and ad-hoc checks fire at most
//!   once per cooldown window, even when they race
//! - **Cheap Metrics**: snapshots are assembled from atomic reads only
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dynamic_worker_pool::config::DynamicPoolConfig;
//! use dynamic_worker_pool::core::{AbortPolicy, DynamicPool};
//!
//! let pool = DynamicPool::new(
//!     DynamicPoolConfig::new()
//!         .with_core_pool_size(4)
//!         .with_max_pool_size(16)
//!         .with_queue_capacity(200)
//!         .with_alert_threshold(0.8),
//! )?;
//!
//! pool.submit(|| crunch_numbers())?;
//!
//! // Grow the pool and switch to fail-fast rejection while it runs.
//! pool.reconfigure(8, 32, AbortPolicy)?;
//!
//! let metrics = pool.snapshot();
//! println!("{}", metrics.details());
//!
//! pool.shutdown();
//! pool.await_termination(std::time::Duration::from_secs(30));
//! ```
//!
//! For complete examples, see:
//! - `tests/dynamic_pool_test.rs` - admission, rejection and shutdown
//! - `tests/alert_test.rs` - cooldown gating and concurrent checks
//! - `tests/reconfigure_test.rs` - live reconfiguration

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Worker pool, rejection accounting, alerting and metrics.
pub mod core;
/// Configuration models for the pool, its alerting, and runtime changes.
pub mod config;
/// Builders to construct pools from configuration.
pub mod builders;
/// Shared utilities.
pub mod util;
