//! In-flight request registry.
//!
//! Concurrent cache misses for the same [`CacheKey`] share one upstream call: the first
//! caller (the leader) registers a shared future, later callers await a clone of it.
//! The entry is removed as soon as the leader finishes or is dropped, so a failed call
//! is never replayed to callers that arrive afterwards.

use crate::simplifier::cache::CacheKey;
use crate::simplifier::client::{ExplanationResult, UpstreamError};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

pub type CallOutcome = Result<ExplanationResult, UpstreamError>;

type SharedCall = Shared<BoxFuture<'static, CallOutcome>>;

/// How a caller obtained its outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallRole {
    /// Started the upstream call.
    Leader,
    /// Waited on a call another request had already started.
    Follower,
}

#[derive(Default)]
pub struct InFlightRegistry {
    calls: Mutex<HashMap<CacheKey, SharedCall>>,
}

/// Removes the leader's registry entry on completion or cancellation.
struct LeaderGuard<'a> {
    registry: &'a InFlightRegistry,
    key: CacheKey,
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.key);
    }
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, SharedCall>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `start()` unless a call for `key` is already in flight, in which case wait
    /// for that call instead. `start` is only invoked by the leader.
    pub async fn run<F>(&self, key: CacheKey, start: F) -> (CallOutcome, CallRole)
    where
        F: FnOnce() -> BoxFuture<'static, CallOutcome>,
    {
        let (call, role) = {
            let mut calls = self.lock();
            match calls.get(&key) {
                Some(existing) => (existing.clone(), CallRole::Follower),
                None => {
                    let call = start().shared();
                    calls.insert(key.clone(), call.clone());
                    (call, CallRole::Leader)
                }
            }
        };

        match role {
            CallRole::Leader => {
                let _guard = LeaderGuard { registry: self, key };
                (call.await, role)
            }
            CallRole::Follower => (call.await, role),
        }
    }

    /// Number of distinct keys currently being generated.
    pub fn pending(&self) -> usize {
        self.lock().len()
    }
}
