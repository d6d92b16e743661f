//! # Batch Coordinator
//!
//! Runs the single-item pipeline over a list of inputs. One failing item never aborts
//! the batch: its slot gets a placeholder and processing moves on. The batch as a
//! whole only fails when the list itself is invalid: empty, or longer than an
//! explicitly configured cap.
//!
//! Items are processed in input order. With `batch_concurrency > 1` several items are
//! in flight at once, but the output stays index-aligned with the input.

use crate::error::{AppError, AppResult};
use crate::simplifier::client::ExplanationResult;
use crate::simplifier::prompt::SimplificationLevel;
use crate::simplifier::service::ExplanationService;
use futures_util::stream::{self, StreamExt};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Generic message shown in place of an explanation that could not be produced.
pub const BATCH_ITEM_FAILURE_MESSAGE: &str = "Unable to explain this term right now.";

/// One slot of a batch result.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchSlot {
    Explained(ExplanationResult),
    Failed { input_text: String, message: &'static str },
}

impl BatchSlot {
    pub fn is_error(&self) -> bool {
        matches!(self, BatchSlot::Failed { .. })
    }
}

#[derive(Debug)]
pub struct BatchOutcome {
    /// Index-aligned with the input.
    pub results: Vec<BatchSlot>,
    /// Failure detail keyed by input index (duplicates make the text alone ambiguous).
    pub item_errors: BTreeMap<usize, AppError>,
}

impl BatchOutcome {
    pub fn failed_count(&self) -> usize {
        self.item_errors.len()
    }
}

pub struct BatchCoordinator<'a> {
    service: &'a ExplanationService,
    concurrency: usize,
}

impl<'a> BatchCoordinator<'a> {
    pub fn new(service: &'a ExplanationService) -> Self {
        Self {
            service,
            concurrency: service.limits().batch_concurrency.max(1),
        }
    }

    pub async fn explain_batch(
        &self,
        items: &[String],
        context: Option<&str>,
        level: SimplificationLevel,
    ) -> AppResult<BatchOutcome> {
        if items.is_empty() {
            return Err(AppError::Validation("Please provide an array of terms".to_string()));
        }

        if let Some(max) = self.service.limits().max_batch_items {
            if items.len() > max {
                return Err(AppError::Validation(format!(
                    "Too many terms. Maximum {} per batch.",
                    max
                )));
            }
        }

        info!(count = items.len(), concurrency = self.concurrency, "Processing batch");

        let outcomes: Vec<AppResult<ExplanationResult>> = stream::iter(items)
            .map(|item| self.service.explain(item, context, level))
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut results = Vec::with_capacity(items.len());
        let mut item_errors = BTreeMap::new();

        for (index, (item, outcome)) in items.iter().zip(outcomes).enumerate() {
            match outcome {
                Ok(result) => results.push(BatchSlot::Explained(result)),
                Err(err) => {
                    warn!(index, term = %item, error = %err, "Batch item failed");
                    self.service.stats().record_batch_item_failure();
                    results.push(BatchSlot::Failed {
                        input_text: item.clone(),
                        message: BATCH_ITEM_FAILURE_MESSAGE,
                    });
                    item_errors.insert(index, err);
                }
            }
        }

        let outcome = BatchOutcome { results, item_errors };
        info!(
            count = items.len(),
            failed = outcome.failed_count(),
            "Batch complete"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::simplifier::client::UpstreamError;
    use crate::simplifier::testing::StubClient;
    use std::sync::Arc;

    fn terms(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn service(stub: Arc<StubClient>, concurrency: usize) -> ExplanationService {
        service_with_cap(stub, concurrency, None)
    }

    fn service_with_cap(stub: Arc<StubClient>, concurrency: usize, cap: Option<usize>) -> ExplanationService {
        let mut config = AppConfig::default();
        config.limits.batch_concurrency = concurrency;
        config.limits.max_batch_items = cap;
        ExplanationService::new(&config, stub)
    }

    #[tokio::test]
    async fn test_duplicates_hit_cache_and_failures_are_isolated() {
        let stub = Arc::new(StubClient::new().failing("entropy", UpstreamError::GenerationFailed("boom".into())));
        let service = service(stub.clone(), 1);

        let outcome = BatchCoordinator::new(&service)
            .explain_batch(&terms(&["gravity", "gravity", "entropy"]), None, SimplificationLevel::Eli5)
            .await
            .unwrap();

        assert_eq!(outcome.results.len(), 3);
        assert!(!outcome.results[0].is_error());
        assert_eq!(outcome.results[0], outcome.results[1]);
        assert_eq!(
            outcome.results[2],
            BatchSlot::Failed {
                input_text: "entropy".to_string(),
                message: BATCH_ITEM_FAILURE_MESSAGE
            }
        );
        assert_eq!(outcome.item_errors.keys().copied().collect::<Vec<_>>(), vec![2]);

        // gravity once, entropy once
        assert_eq!(stub.calls(), 2);
        assert_eq!(service.stats().snapshot().batch_item_failures, 1);
    }

    #[tokio::test]
    async fn test_empty_batch_is_rejected() {
        let stub = Arc::new(StubClient::new());
        let service = service(stub.clone(), 1);

        let err = BatchCoordinator::new(&service)
            .explain_batch(&[], None, SimplificationLevel::Eli5)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn test_configured_cap_rejects_oversized_batch() {
        let stub = Arc::new(StubClient::new());
        let service = service_with_cap(stub.clone(), 1, Some(50));
        let items = vec!["x".to_string(); 51];

        let err = BatchCoordinator::new(&service)
            .explain_batch(&items, None, SimplificationLevel::Eli5)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn test_large_batch_is_accepted_without_cap() {
        let stub = Arc::new(StubClient::new());
        let service = service(stub.clone(), 4);
        let items: Vec<String> = (0..51).map(|i| format!("term {}", i)).collect();

        let outcome = BatchCoordinator::new(&service)
            .explain_batch(&items, None, SimplificationLevel::Eli5)
            .await
            .unwrap();
        assert_eq!(outcome.results.len(), 51);
        assert_eq!(outcome.failed_count(), 0);
        assert_eq!(stub.calls(), 51);
    }

    #[tokio::test]
    async fn test_invalid_item_is_a_slot_failure() {
        let stub = Arc::new(StubClient::new());
        let service = service(stub.clone(), 1);

        let outcome = BatchCoordinator::new(&service)
            .explain_batch(&terms(&["osmosis", "   "]), None, SimplificationLevel::Eli5)
            .await
            .unwrap();
        assert!(!outcome.results[0].is_error());
        assert!(outcome.results[1].is_error());
        assert!(matches!(outcome.item_errors.get(&1), Some(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_concurrent_batch_keeps_input_order() {
        let stub = Arc::new(StubClient::new().with_delay_ms(10));
        let service = service(stub.clone(), 4);
        let items = terms(&["alpha", "beta", "gamma", "delta", "epsilon"]);

        let outcome = BatchCoordinator::new(&service)
            .explain_batch(&items, None, SimplificationLevel::Eli5)
            .await
            .unwrap();

        for (slot, item) in outcome.results.iter().zip(&items) {
            match slot {
                BatchSlot::Explained(result) => assert_eq!(&result.input_text, item),
                BatchSlot::Failed { .. } => panic!("unexpected failure for {}", item),
            }
        }
        assert_eq!(stub.calls(), 5);
    }
}
