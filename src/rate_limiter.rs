//! Fixed-window admission control for submissions.
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

/// Why a submission was turned away. The `Display` form is what ends up in
/// the rejected job's `error` field.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Rejection {
    GlobalLimitExceeded,
    UserLimitExceeded,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::GlobalLimitExceeded => "global_limit_exceeded",
            Self::UserLimitExceeded => "user_limit_exceeded",
        })
    }
}

impl std::error::Error for Rejection {}

#[derive(Debug)]
struct Window {
    started: Instant,
    global: u32,
    owners: HashMap<String, OwnerCount>,
}

#[derive(Debug)]
struct OwnerCount {
    count: u32,
    first_seen: Instant,
}

/// Counts admissions globally and per owner inside a fixed window of length
/// `window`. When a window elapses, every counter is dropped at once; owners
/// don't carry a partial allowance across the boundary.
///
/// All state sits behind one mutex, so concurrent callers can never both
/// observe the last unit of headroom.
#[derive(Debug)]
pub struct RateLimiter {
    global_limit: u32,
    user_limit: u32,
    window: Duration,
    state: Mutex<Window>,
}

impl RateLimiter {
    pub fn new(global_limit: u32, user_limit: u32, window: Duration) -> Self {
        Self::starting_at(global_limit, user_limit, window, Instant::now())
    }

    /// As `new`, with the first window opening at `started`.
    pub fn starting_at(
        global_limit: u32,
        user_limit: u32,
        window: Duration,
        started: Instant,
    ) -> Self {
        Self {
            global_limit,
            user_limit,
            window,
            state: Mutex::new(Window {
                started,
                global: 0,
                owners: HashMap::new(),
            }),
        }
    }

    /// Counts one submission by `owner` at `now`, or says which limit it
    /// would break. Rejections consume nothing.
    pub fn admit_at(&self, owner: &str, now: Instant) -> Result<(), Rejection> {
        // Counters are plain integers, so a panic elsewhere while holding the
        // lock can't leave them half-updated.
        let mut w = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if now.saturating_duration_since(w.started) >= self.window {
            debug!(
                admitted = w.global,
                owners = w.owners.len(),
                "rate limit window rolled over"
            );
            w.started = now;
            w.global = 0;
            w.owners.clear();
        }

        // Global first: a saturated system fails fast without touching the
        // per-owner map.
        if w.global >= self.global_limit {
            return Err(Rejection::GlobalLimitExceeded);
        }

        let owner_count = w.owners.get(owner).map_or(0, |c| c.count);
        if owner_count >= self.user_limit {
            return Err(Rejection::UserLimitExceeded);
        }

        w.global += 1;
        w.owners
            .entry(owner.to_owned())
            .or_insert(OwnerCount {
                count: 0,
                first_seen: now,
            })
            .count += 1;

        Ok(())
    }

    /// Hands back one admission granted to `owner` at `admitted_at`, for a
    /// submission that admitted but never produced a job of its own. Does
    /// nothing once the window the admission was counted in has closed.
    pub fn refund_at(&self, owner: &str, admitted_at: Instant) {
        let mut w = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if admitted_at < w.started {
            return;
        }

        let Some(c) = w.owners.get_mut(owner) else {
            return;
        };
        c.count -= 1;
        if c.count == 0 {
            w.owners.remove(owner);
        }
        w.global = w.global.saturating_sub(1);
    }

    /// When `owner` was first admitted in the current window, if at all.
    pub fn first_seen(&self, owner: &str) -> Option<Instant> {
        let w = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        w.owners.get(owner).map(|c| c.first_seen)
    }
}
