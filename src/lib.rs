//! A rate-limited, deduplicating job queue with a single fair worker.
//!
//! Submissions are fingerprinted by content and deduplicated, then admitted
//! or rejected by a fixed-window rate limiter. Admitted jobs wait in the
//! store until the worker picks them up in submission order. On start, jobs
//! a crashed process left `running` are put back in the queue.

pub mod config;
pub mod dashboard;
pub mod error;
pub mod idempotency;
pub mod line_reader;
pub mod parser;
pub mod rate_limiter;
pub mod scheduler;
pub mod server;
pub mod store;
pub mod submission;
pub mod types;
pub mod util;
pub mod worker;
