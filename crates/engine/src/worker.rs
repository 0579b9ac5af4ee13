//! Generation of a single (card, dimension) work item.

use std::sync::Arc;
use std::time::Duration;

use pipeline::{
    AttemptError, Card, ChatMessage, ChatRequest, ContentError, Dimension, GenerationRecord,
    ItemFailure, LlmProvider, ModelName, PromptTemplate, ProviderError, WorkItem,
};
use tracing::{debug, instrument, warn};

use crate::{CancelSignal, RateLimiter, RetryPolicy};

/// Model parameters sent with every request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    /// Model to run.
    pub model: ModelName,
    /// Sampling temperature.
    pub temperature: f32,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
    /// Per-call timeout; a call that exceeds it fails with
    /// [`ProviderError::Timeout`] and is retried like any other failure.
    pub call_timeout: Duration,
}

/// How one work item ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    /// A record was produced.
    Succeeded(GenerationRecord),
    /// Every attempt failed.
    Failed(ItemFailure),
    /// Cancellation was requested before the item finished.
    Cancelled(WorkItem),
}

impl ItemOutcome {
    /// The work item this outcome belongs to.
    pub fn item(&self) -> WorkItem {
        match self {
            Self::Succeeded(record) => WorkItem {
                card: record.card_key(),
                dimension: record.dimension_name.clone(),
            },
            Self::Failed(failure) => failure.item.clone(),
            Self::Cancelled(item) => item.clone(),
        }
    }
}

/// Turns one card × dimension pair into a record: prompt, rate gate, call,
/// retry.
///
/// Workers never touch the ledger; they hand records back to the scheduler.
pub struct GenerationWorker {
    provider: Arc<dyn LlmProvider>,
    limiter: Arc<RateLimiter>,
    template: Arc<PromptTemplate>,
    settings: GenerationSettings,
    retry: RetryPolicy,
    cancel: CancelSignal,
}

impl GenerationWorker {
    /// Creates a worker that is never cancelled.
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        limiter: Arc<RateLimiter>,
        template: Arc<PromptTemplate>,
        settings: GenerationSettings,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            limiter,
            template,
            settings,
            retry,
            cancel: CancelSignal::never(),
        }
    }

    /// Attaches a cancellation signal.
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// The cancellation signal this worker observes.
    pub fn cancel_signal(&self) -> &CancelSignal {
        &self.cancel
    }

    /// Model parameters sent with every request.
    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    /// Generates the record for `card` under `dimension`.
    ///
    /// Never returns an error: exhausted retries become
    /// [`ItemOutcome::Failed`] so the rest of the batch carries on.
    #[instrument(
        name = "generate",
        skip_all,
        fields(card = %card.name, direction = %card.direction, dimension = %dimension.name)
    )]
    pub async fn generate(&self, card: &Card, dimension: &Dimension) -> ItemOutcome {
        let item = WorkItem {
            card: card.key(),
            dimension: dimension.name.clone(),
        };
        let prompt = self.template.render(card, dimension);

        let mut attempt = 0;
        loop {
            attempt += 1;
            if self.cancel.is_cancelled() {
                return ItemOutcome::Cancelled(item);
            }

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return ItemOutcome::Cancelled(item),
                result = self.attempt(&prompt) => result,
            };

            let error = match result {
                Ok(content) => {
                    debug!(attempt, chars = content.chars().count(), "generated");
                    return ItemOutcome::Succeeded(GenerationRecord::new(card, dimension, content));
                }
                Err(error) => error,
            };

            if !self.retry.allows_retry_after(attempt) {
                warn!(attempt, %error, "giving up on work item");
                return ItemOutcome::Failed(ItemFailure {
                    item,
                    attempts: attempt,
                    last_error: error,
                });
            }

            let delay = self.retry.delay_after(attempt);
            warn!(attempt, ?delay, %error, "attempt failed, backing off");
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return ItemOutcome::Cancelled(item),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn attempt(&self, prompt: &str) -> Result<String, AttemptError> {
        self.limiter.acquire().await;

        let request = ChatRequest {
            model: self.settings.model.clone(),
            messages: vec![ChatMessage::user(prompt)],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };

        let after = self.settings.call_timeout;
        let text = tokio::time::timeout(after, self.provider.chat(request))
            .await
            .map_err(|_| ProviderError::Timeout { after })??;

        let content = text.trim();
        if content.is_empty() {
            return Err(ContentError::Empty.into());
        }
        Ok(content.to_string())
    }
}

#[cfg(test)]
mod tests {
    use pipeline::{CardName, DimensionName, Direction};
    use tokio::time::Instant;

    use super::*;
    use crate::testing::ScriptedProvider;
    use crate::CancelHandle;

    fn card() -> Card {
        Card {
            name: CardName::new("战车").unwrap(),
            direction: Direction::Upright,
            summary: "前进".into(),
            detail: String::new(),
        }
    }

    fn dimension() -> Dimension {
        Dimension {
            name: DimensionName::new("事业").unwrap(),
            category: "工作".into(),
            description: "职业发展".into(),
            aspect: None,
            aspect_type: None,
        }
    }

    fn settings() -> GenerationSettings {
        GenerationSettings {
            model: ModelName::new("test-model").unwrap(),
            temperature: 0.1,
            max_tokens: 100,
            call_timeout: Duration::from_secs(30),
        }
    }

    fn worker(provider: Arc<ScriptedProvider>, retry: RetryPolicy) -> GenerationWorker {
        GenerationWorker::new(
            provider,
            Arc::new(RateLimiter::unlimited()),
            Arc::new(PromptTemplate::parse("{card_name}:{dimension_name}").unwrap()),
            settings(),
            retry,
        )
    }

    #[tokio::test]
    async fn first_success_returns_trimmed_record() {
        let provider = Arc::new(ScriptedProvider::new(|_, _| Ok("  解读内容 \n".into())));
        let outcome = worker(provider.clone(), RetryPolicy::no_delay(3))
            .generate(&card(), &dimension())
            .await;

        match outcome {
            ItemOutcome::Succeeded(record) => {
                assert_eq!(record.content, "解读内容");
                assert_eq!(record.dimension_category, "工作");
            }
            other => panic!("expected success, got {other:?}"),
        }
        assert_eq!(provider.call_count(), 1);
        assert_eq!(provider.prompts(), vec!["战车:事业".to_string()]);
    }

    #[tokio::test]
    async fn empty_content_is_retried() {
        let provider = Arc::new(ScriptedProvider::new(|_, attempt| {
            Ok(if attempt == 1 { "   ".into() } else { "ok".into() })
        }));
        let outcome = worker(provider.clone(), RetryPolicy::no_delay(3))
            .generate(&card(), &dimension())
            .await;
        assert!(matches!(outcome, ItemOutcome::Succeeded(_)));
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_item_is_attempted_exactly_three_times() {
        let provider = Arc::new(ScriptedProvider::failing());
        let start = Instant::now();
        let outcome = worker(provider.clone(), RetryPolicy::default())
            .generate(&card(), &dimension())
            .await;

        match outcome {
            ItemOutcome::Failed(failure) => {
                assert_eq!(failure.attempts, 3);
                assert!(matches!(
                    failure.last_error,
                    AttemptError::Provider(ProviderError::Status { status: 503, .. })
                ));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(provider.call_count(), 3);
        // 2s after the first failure, 4s after the second, none after the last.
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_call_times_out_and_counts_as_an_attempt() {
        let provider = Arc::new(
            ScriptedProvider::new(|_, _| Ok("late".into())).with_latency(Duration::from_secs(3600)),
        );
        let outcome = worker(provider.clone(), RetryPolicy::no_delay(2))
            .generate(&card(), &dimension())
            .await;

        match outcome {
            ItemOutcome::Failed(failure) => {
                assert_eq!(failure.attempts, 2);
                assert_eq!(
                    failure.last_error,
                    AttemptError::Provider(ProviderError::Timeout {
                        after: Duration::from_secs(30)
                    })
                );
            }
            other => panic!("expected timeout failure, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let provider = Arc::new(ScriptedProvider::failing());
        let handle = CancelHandle::new();
        let worker = worker(provider.clone(), RetryPolicy::new(3, Duration::from_secs(60)))
            .with_cancel(handle.signal());

        let task = tokio::spawn(async move { worker.generate(&card(), &dimension()).await });
        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.cancel();

        let outcome = task.await.unwrap();
        assert!(matches!(outcome, ItemOutcome::Cancelled(_)));
        assert_eq!(provider.call_count(), 1);
    }
}
