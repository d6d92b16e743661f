//! # Explanation Service
//!
//! The request-to-explanation pipeline shared by every HTTP contract:
//!
//! ```text
//! validate → cache lookup ─hit──────────────────────────────→ result
//!                         └miss→ resolve instructions → client → cache store → result
//! ```
//!
//! ## Guarantees:
//! - Validation failures never reach the cache or the client
//! - A cache hit returns the stored result verbatim and never calls upstream
//! - Only successful results are stored; upstream failures leave the cache untouched
//! - With coalescing enabled, concurrent misses for one key share a single upstream call

use crate::config::{AppConfig, LimitsConfig};
use crate::error::{AppError, AppResult};
use crate::simplifier::cache::{CacheKey, ExplanationCache};
use crate::simplifier::client::{ExplanationClient, ExplanationPrompt, ExplanationResult};
use crate::simplifier::coalesce::{CallOutcome, CallRole, InFlightRegistry};
use crate::simplifier::prompt::SimplificationLevel;
use futures_util::future::FutureExt;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Pipeline counters. Lock-free because every request touches them.
#[derive(Debug, Default)]
pub struct PipelineStats {
    explanations_generated: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    upstream_failures: AtomicU64,
    coalesced_waits: AtomicU64,
    batch_item_failures: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatsSnapshot {
    pub explanations_generated: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub upstream_failures: u64,
    pub coalesced_waits: u64,
    pub batch_item_failures: u64,
}

impl PipelineStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_batch_item_failure(&self) {
        Self::bump(&self.batch_item_failures);
    }

    pub fn snapshot(&self) -> PipelineStatsSnapshot {
        PipelineStatsSnapshot {
            explanations_generated: self.explanations_generated.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            upstream_failures: self.upstream_failures.load(Ordering::Relaxed),
            coalesced_waits: self.coalesced_waits.load(Ordering::Relaxed),
            batch_item_failures: self.batch_item_failures.load(Ordering::Relaxed),
        }
    }
}

pub struct ExplanationService {
    client: Arc<dyn ExplanationClient>,
    cache: Arc<ExplanationCache>,
    /// `None` when coalescing is disabled in config.
    in_flight: Option<InFlightRegistry>,
    limits: LimitsConfig,
    stats: PipelineStats,
}

impl ExplanationService {
    pub fn new(config: &AppConfig, client: Arc<dyn ExplanationClient>) -> Self {
        let cache = ExplanationCache::with_capacity(config.cache.capacity, config.cache.ttl());
        let in_flight = config.cache.coalesce_in_flight.then(InFlightRegistry::new);

        Self {
            client,
            cache: Arc::new(cache),
            in_flight,
            limits: config.limits.clone(),
            stats: PipelineStats::default(),
        }
    }

    pub fn cache(&self) -> &ExplanationCache {
        &self.cache
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.limits
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn pending_calls(&self) -> usize {
        self.in_flight.as_ref().map_or(0, InFlightRegistry::pending)
    }

    /// Reject blank or oversized input. The text itself is never modified.
    pub fn validate(&self, text: &str) -> AppResult<()> {
        if text.trim().is_empty() {
            return Err(AppError::Validation("Text must not be empty".to_string()));
        }

        let max = self.limits.max_text_chars;
        if text.chars().count() > max {
            return Err(AppError::Validation(format!(
                "Text too long. Maximum {} characters.",
                max
            )));
        }

        Ok(())
    }

    /// Run the full pipeline for one input.
    pub async fn explain(
        &self,
        text: &str,
        context: Option<&str>,
        level: SimplificationLevel,
    ) -> AppResult<ExplanationResult> {
        self.validate(text)?;

        let key = CacheKey::new(text, level);

        if let Some(cached) = self.cache.get(&key) {
            PipelineStats::bump(&self.stats.cache_hits);
            debug!(key = %key.text(), level = %level, "Cache hit");
            return Ok(cached);
        }
        PipelineStats::bump(&self.stats.cache_misses);

        let prompt = ExplanationPrompt::new(text, context, level);
        debug!(key = %key.text(), level = %level, "Cache miss, generating explanation");

        let (outcome, role) = match &self.in_flight {
            Some(registry) => {
                let client = Arc::clone(&self.client);
                let cache = Arc::clone(&self.cache);
                let call_key = key.clone();
                registry
                    .run(key.clone(), move || {
                        generate(client, cache, call_key, prompt).boxed()
                    })
                    .await
            }
            None => {
                let outcome = generate(
                    Arc::clone(&self.client),
                    Arc::clone(&self.cache),
                    key.clone(),
                    prompt,
                )
                .await;
                (outcome, CallRole::Leader)
            }
        };

        if role == CallRole::Follower {
            PipelineStats::bump(&self.stats.coalesced_waits);
        }

        match outcome {
            Ok(result) => {
                if role == CallRole::Leader {
                    PipelineStats::bump(&self.stats.explanations_generated);
                    info!(
                        key = %key.text(),
                        level = %level,
                        explanation_length = result.explanation_length(),
                        "Generated explanation"
                    );
                }
                Ok(result)
            }
            Err(err) => {
                if role == CallRole::Leader {
                    PipelineStats::bump(&self.stats.upstream_failures);
                }
                warn!(key = %key.text(), kind = err.kind(), error = %err, "Upstream call failed");
                Err(AppError::Upstream(err))
            }
        }
    }

    /// Drop every cached explanation. Returns the number of entries removed.
    pub fn clear_cache(&self) -> usize {
        let removed = self.cache.clear();
        info!(removed, "Explanation cache cleared");
        removed
    }
}

/// One upstream call followed by the cache write. Runs once per leader, so the write
/// happens before the in-flight entry is released.
async fn generate(
    client: Arc<dyn ExplanationClient>,
    cache: Arc<ExplanationCache>,
    key: CacheKey,
    prompt: ExplanationPrompt,
) -> CallOutcome {
    let result = client.explain(&prompt).await?;
    cache.put(key, result.clone());
    Ok(result)
}
