//! In-process doubles for the provider and ledger ports.
//!
//! Used by this crate's tests and by downstream crates that want to drive the
//! engine without a network or a filesystem.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use pipeline::{ChatRequest, ChatRole, Ledger, LedgerError, LedgerStore, LlmProvider, ProviderError};

type Responder = dyn Fn(&str, u32) -> Result<String, ProviderError> + Send + Sync;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// ScriptedProvider
// ---------------------------------------------------------------------------

/// An [`LlmProvider`] whose answers come from a closure.
///
/// The closure receives the prompt (the last user message) and the 1-based
/// attempt number for that prompt.
pub struct ScriptedProvider {
    responder: Box<Responder>,
    latency: Duration,
    prompts: Mutex<Vec<String>>,
    attempts: Mutex<HashMap<String, u32>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedProvider {
    /// Answers with `responder`.
    pub fn new(
        responder: impl Fn(&str, u32) -> Result<String, ProviderError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            latency: Duration::ZERO,
            prompts: Mutex::new(Vec::new()),
            attempts: Mutex::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Answers every prompt with `generated: <prompt>`.
    pub fn echo() -> Self {
        Self::new(|prompt, _| Ok(format!("generated: {prompt}")))
    }

    /// Fails every call with HTTP 503.
    pub fn failing() -> Self {
        Self::new(|_, _| {
            Err(ProviderError::Status {
                status: 503,
                body: "service unavailable".into(),
            })
        })
    }

    /// Sleeps for `latency` (on the tokio clock) before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Every prompt received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }

    /// Total number of calls.
    pub fn call_count(&self) -> usize {
        lock(&self.prompts).len()
    }

    /// Highest number of calls that were in progress at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, request: ChatRequest) -> Result<String, ProviderError> {
        let prompt = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();

        lock(&self.prompts).push(prompt.clone());
        let attempt = {
            let mut attempts = lock(&self.attempts);
            let count = attempts.entry(prompt.clone()).or_insert(0);
            *count += 1;
            *count
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        (self.responder)(&prompt, attempt)
    }
}

// ---------------------------------------------------------------------------
// MemoryLedgerStore
// ---------------------------------------------------------------------------

/// A [`LedgerStore`] that keeps every persisted snapshot in memory.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    current: Mutex<Option<Ledger>>,
    snapshots: Mutex<Vec<Ledger>>,
    fail_after: Option<usize>,
}

impl MemoryLedgerStore {
    /// An empty store; `load` returns an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `ledger`.
    pub fn seeded(ledger: Ledger) -> Self {
        Self {
            current: Mutex::new(Some(ledger)),
            ..Self::default()
        }
    }

    /// Makes every persist after the first `successful` ones fail.
    pub fn failing_after(mut self, successful: usize) -> Self {
        self.fail_after = Some(successful);
        self
    }

    /// Every ledger passed to `persist`, oldest first.
    pub fn snapshots(&self) -> Vec<Ledger> {
        lock(&self.snapshots).clone()
    }

    /// Number of successful persists.
    pub fn persist_count(&self) -> usize {
        lock(&self.snapshots).len()
    }

    /// The most recently persisted ledger, or the seed.
    pub fn current(&self) -> Option<Ledger> {
        lock(&self.current).clone()
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn load(&self) -> Result<Ledger, LedgerError> {
        Ok(lock(&self.current)
            .clone()
            .unwrap_or_else(|| Ledger::new(String::new())))
    }

    fn persist(&self, ledger: &Ledger) -> Result<(), LedgerError> {
        let mut snapshots = lock(&self.snapshots);
        if self.fail_after.is_some_and(|limit| snapshots.len() >= limit) {
            return Err(LedgerError::Write {
                location: self.location(),
                message: "simulated write failure".into(),
            });
        }
        snapshots.push(ledger.clone());
        *lock(&self.current) = Some(ledger.clone());
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
