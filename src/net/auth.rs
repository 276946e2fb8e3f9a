//! Inbound message gate: size, parse, MAC, skew, replay.
//!
//! Nothing downstream of this module sees a message that failed
//! authentication, and nothing in node state mutates before the MAC
//! passes. Rejections are silent on the wire; counters and debug logs
//! only.

use super::message::{Message, MessageId, WireError};
use crate::types::{MAX_DATAGRAM_SIZE, REPLAY_CACHE_MAX, REPLAY_WINDOW_SECS, SKEW_MAX_SECS};
use std::collections::HashSet;
use std::collections::VecDeque;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("oversized datagram: {0} bytes")]
    Oversize(usize),
    #[error(transparent)]
    Parse(#[from] WireError),
    #[error("mac verification failed")]
    Mac,
    #[error("wall_ts outside skew window: {delta:+.1}s")]
    Skew { delta: f64 },
    #[error("replayed message id")]
    Replay,
}

/// Per-kind rejection counters, reported in engine stats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RejectCounters {
    pub auth_failures: u64,
    pub replays: u64,
    pub skews: u64,
    pub parse_errors: u64,
}

impl RejectCounters {
    pub fn record(&mut self, err: &AuthError) {
        match err {
            AuthError::Mac => self.auth_failures += 1,
            AuthError::Replay => self.replays += 1,
            AuthError::Skew { .. } => self.skews += 1,
            AuthError::Oversize(_) | AuthError::Parse(_) => self.parse_errors += 1,
        }
    }
}

/// Stateless half of the gate: everything except the replay check, which
/// mutates the cache and therefore runs under the engine lock.
pub struct Authenticator {
    key: Vec<u8>,
}

impl Authenticator {
    pub fn new(key: Vec<u8>) -> Self {
        Self { key }
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn decode(&self, raw: &[u8], now_wall: f64) -> Result<Message, AuthError> {
        if raw.len() > MAX_DATAGRAM_SIZE {
            return Err(AuthError::Oversize(raw.len()));
        }

        let msg = Message::decode(raw)?;

        if !msg.verify(&self.key) {
            return Err(AuthError::Mac);
        }

        let delta = msg.wall_ts - now_wall;
        if delta.abs() > SKEW_MAX_SECS {
            return Err(AuthError::Skew { delta });
        }

        Ok(msg)
    }
}

/// Sliding-window duplicate filter.
///
/// Bounded two ways: ids older than the 60 s window are purged against the
/// current wall clock, and the cache never holds more than
/// `REPLAY_CACHE_MAX` entries, oldest out first.
pub struct ReplayCache {
    seen: HashSet<MessageId>,
    order: VecDeque<(MessageId, f64)>,
}

impl ReplayCache {
    pub fn new() -> Self {
        Self {
            seen: HashSet::with_capacity(REPLAY_CACHE_MAX),
            order: VecDeque::with_capacity(REPLAY_CACHE_MAX),
        }
    }

    /// Returns false when the id was already present (a replay). Fresh ids
    /// are recorded with the receipt time used for window expiry.
    pub fn check_and_insert(&mut self, id: MessageId, now_wall: f64) -> bool {
        self.purge(now_wall);

        if self.seen.contains(&id) {
            return false;
        }

        while self.seen.len() >= REPLAY_CACHE_MAX {
            if let Some((old, _)) = self.order.pop_front() {
                self.seen.remove(&old);
            } else {
                break;
            }
        }

        self.seen.insert(id.clone());
        self.order.push_back((id, now_wall));
        true
    }

    fn purge(&mut self, now_wall: f64) {
        while let Some((_, seen_at)) = self.order.front() {
            if now_wall - seen_at > REPLAY_WINDOW_SECS {
                if let Some((old, _)) = self.order.pop_front() {
                    self.seen.remove(&old);
                }
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for ReplayCache {
    fn default() -> Self {
        Self::new()
    }
}
