//! Test narrators — scripted, failing and gated `Narrator` implementations.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use agora_core::narrator::{Narrator, NarratorError, NarratorPrompt};
use async_trait::async_trait;
use tokio::sync::{Notify, Semaphore};

/// A narrator that answers `"narration <n>"` for its n-th call (1-based) and
/// records every prompt. Can be told to fail a number of upcoming calls.
#[derive(Debug, Default)]
pub struct ScriptedNarrator {
    calls: AtomicUsize,
    failures_left: AtomicUsize,
    prompts: Mutex<Vec<NarratorPrompt>>,
}

impl ScriptedNarrator {
    /// Creates a narrator that never fails.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` calls fail with a provider error.
    pub fn fail_next(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    /// Number of calls received, failed ones included.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every prompt received, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn prompts(&self) -> Vec<NarratorPrompt> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Narrator for ScriptedNarrator {
    async fn generate(&self, prompt: &NarratorPrompt) -> Result<String, NarratorError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.prompts.lock().unwrap().push(prompt.clone());
        let should_fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(NarratorError::Provider("scripted failure".into()));
        }
        Ok(format!("narration {n}"))
    }
}

/// A narrator that always times out.
#[derive(Debug)]
pub struct FailingNarrator;

#[async_trait]
impl Narrator for FailingNarrator {
    async fn generate(&self, _prompt: &NarratorPrompt) -> Result<String, NarratorError> {
        Err(NarratorError::Timeout(60_000))
    }
}

/// A narrator whose calls block until the test opens the gate. Lets a test
/// hold a resolution mid-call while other invocations race it.
#[derive(Debug)]
pub struct GatedNarrator {
    calls: AtomicUsize,
    entered: Notify,
    gate: Semaphore,
}

impl Default for GatedNarrator {
    fn default() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            entered: Notify::new(),
            gate: Semaphore::new(0),
        }
    }
}

impl GatedNarrator {
    /// Creates a closed gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until some call has entered `generate`.
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    /// Releases every blocked and future call.
    pub fn open(&self) {
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }

    /// Number of calls received.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Narrator for GatedNarrator {
    async fn generate(&self, _prompt: &NarratorPrompt) -> Result<String, NarratorError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.entered.notify_one();
        self.gate
            .acquire()
            .await
            .map_err(|e| NarratorError::Provider(e.to_string()))?
            .forget();
        Ok(format!("gated narration {n}"))
    }
}
