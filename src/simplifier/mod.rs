//! # Simplifier
//!
//! The request-to-explanation pipeline:
//! - **prompt**: simplification levels and their fixed instructions
//! - **cache**: bounded LRU store of generated explanations
//! - **client**: OpenAI-compatible upstream client and its error taxonomy
//! - **coalesce**: in-flight registry sharing one upstream call between identical misses
//! - **service**: validate → cache → client → cache-write orchestration
//! - **batch**: per-item pipeline over a list with partial-failure handling

pub mod batch;
pub mod cache;
pub mod client;
pub mod coalesce;
pub mod prompt;
pub mod service;

pub use batch::{BatchCoordinator, BatchSlot};
pub use client::{ExplanationClient, ExplanationResult, OpenAiCompatibleClient, UpstreamError};
pub use prompt::SimplificationLevel;
pub use service::ExplanationService;

#[cfg(test)]
pub mod testing {
    use super::client::{ExplanationClient, ExplanationPrompt, ExplanationResult, UpstreamError};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Deterministic upstream stand-in that counts its calls.
    #[derive(Default)]
    pub struct StubClient {
        calls: AtomicUsize,
        failures: HashMap<String, UpstreamError>,
        delay: Option<Duration>,
    }

    impl StubClient {
        pub fn new() -> Self {
            Self::default()
        }

        /// Fail every call whose trimmed, lowercased text equals `text`.
        pub fn failing(mut self, text: &str, error: UpstreamError) -> Self {
            self.failures.insert(text.trim().to_lowercase(), error);
            self
        }

        pub fn with_delay_ms(mut self, ms: u64) -> Self {
            self.delay = Some(Duration::from_millis(ms));
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ExplanationClient for StubClient {
        async fn explain(&self, prompt: &ExplanationPrompt) -> Result<ExplanationResult, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            if let Some(err) = self.failures.get(&prompt.text.trim().to_lowercase()) {
                return Err(err.clone());
            }

            Ok(ExplanationResult::new(
                prompt.text.clone(),
                format!("{} made simple ({})", prompt.text.trim(), prompt.level),
                prompt.level,
            ))
        }
    }
}
