//! Client-side submission pacing.
//!
//! One timestamp under [`LAST_SUBMIT_KEY`] decides whether a new message may
//! be sent. The gate is advisory: anything that can edit or delete the store
//! can bypass it, and two clients sharing a store are not serialized.

use super::store::KeyValueStore;
use crate::error::Result;
use log::debug;

pub const LAST_SUBMIT_KEY: &str = "lastSubmitTime";
pub const COOLDOWN_SECS: u64 = 50;
pub const COOLDOWN_WINDOW_MS: i64 = (COOLDOWN_SECS as i64) * 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateDecision {
    Open,
    Blocked { remaining_secs: u64 },
}

/// Holds two views of the cooldown that are allowed to drift apart: the
/// in-memory last submission time, which decides [`check`](Self::check), and
/// the displayed countdown, which [`tick`](Self::tick) walks down and which
/// clears the stored timestamp when it hits zero.
pub struct CooldownGate<S> {
    store: S,
    last_submit_ms: Option<i64>,
    remaining_secs: u64,
}

impl<S: KeyValueStore> CooldownGate<S> {
    /// Rebuilds state from the store at startup. A stored timestamp outside
    /// the window, or one that does not parse, is removed.
    pub fn restore(mut store: S, now_ms: i64) -> Result<Self> {
        let mut remaining_secs = 0;

        if let Some(raw) = store.get(LAST_SUBMIT_KEY) {
            match parse_timestamp(&raw) {
                Some(last) if now_ms.saturating_sub(last) < COOLDOWN_WINDOW_MS => {
                    remaining_secs = remaining_from(now_ms.saturating_sub(last));
                }
                _ => {
                    debug!("Clearing expired submission timestamp {}", raw);
                    store.remove(LAST_SUBMIT_KEY)?;
                }
            }
        }

        let last_submit_ms = store.get(LAST_SUBMIT_KEY).as_deref().and_then(parse_timestamp);

        Ok(Self { store, last_submit_ms, remaining_secs })
    }

    pub fn remaining_secs(&self) -> u64 {
        self.remaining_secs
    }

    pub fn last_submit_ms(&self) -> Option<i64> {
        self.last_submit_ms
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Decides whether a submission at `now_ms` may go out. A blocked attempt
    /// also resets the displayed countdown to the true remaining time.
    pub fn check(&mut self, now_ms: i64) -> GateDecision {
        if let Some(last) = self.last_submit_ms {
            let elapsed = now_ms.saturating_sub(last);
            if elapsed < COOLDOWN_WINDOW_MS {
                let remaining_secs = remaining_from(elapsed);
                self.remaining_secs = remaining_secs;
                return GateDecision::Blocked { remaining_secs };
            }
        }
        GateDecision::Open
    }

    pub fn record(&mut self, now_ms: i64) -> Result<()> {
        self.last_submit_ms = Some(now_ms);
        self.remaining_secs = COOLDOWN_SECS;
        self.store.set(LAST_SUBMIT_KEY, &now_ms.to_string())
    }

    /// One second of countdown. Reaching zero removes the stored timestamp
    /// but leaves the in-memory one untouched.
    pub fn tick(&mut self) -> Result<u64> {
        if self.remaining_secs == 0 {
            return Ok(0);
        }
        self.remaining_secs -= 1;
        if self.remaining_secs == 0 {
            self.store.remove(LAST_SUBMIT_KEY)?;
        }
        Ok(self.remaining_secs)
    }
}

fn parse_timestamp(raw: &str) -> Option<i64> {
    raw.trim().parse().ok()
}

fn remaining_from(elapsed_ms: i64) -> u64 {
    let left = COOLDOWN_WINDOW_MS.saturating_sub(elapsed_ms).max(0);
    (left as u64).div_ceil(1000)
}
