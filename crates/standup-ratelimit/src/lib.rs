//! Fixed-window rate limiting for Standup.
//!
//! Every mutating operation asks the limiter first. Quotas are tracked per
//! `(identifier, action class)`: creating sessions from one address doesn't
//! eat into that address's join quota, and one email's failed verification
//! attempts don't lock out another email.
//!
//! # Pieces
//!
//! - [`ActionClass`] / [`RateLimitConfig`]: what is limited and how hard
//! - [`RateLimitStore`]: where counters live (injected, never a global)
//! - [`MemoryRateLimitStore`]: the single-process store
//! - [`RateLimiter`]: the front door callers use
//! - [`spawn_sweeper`]: background task evicting stale counters

#![allow(async_fn_in_trait)]

mod config;
mod error;
mod limiter;
mod store;
mod sweeper;

pub use config::{ActionClass, RateLimitConfig, RateLimitRule};
pub use error::RateLimitError;
pub use limiter::RateLimiter;
pub use store::{MemoryRateLimitStore, RateDecision, RateKey, RateLimitEntry, RateLimitStore};
pub use sweeper::spawn_sweeper;
