//! LLM interaction: the retry-with-fallback structuring call.
//!
//! This is the only stage with nontrivial failure handling. Everything
//! model-specific hides behind the [`GenerativeModel`] trait so the retry
//! machinery can be tested without a network; the production implementation
//! ([`LlmModel`]) wraps an `edgequake-llm` provider.
//!
//! ## Retry Strategy
//!
//! Transient 5xx / timeout errors from LLM APIs are frequent. Each call gets
//! a bounded budget of `max_attempts` tries with exponential backoff
//! (`base_ms * 2^attempt`, capped at `cap_ms`) plus uniform random jitter so
//! that parallel runs do not retry in lockstep against a recovering backend.
//!
//! ## Fallback Model
//!
//! Overload-class errors (`503`, "unavailable", "overloaded") additionally
//! trigger a switch to the configured fallback model. The switch is modelled
//! as an explicit two-state machine — [`ModelState::Primary`] →
//! [`ModelState::Fallback`] — whose only transition is guarded by the
//! overload predicate. The machine never transitions back, which makes the
//! at-most-one-switch guarantee a structural property rather than a loop
//! invariant to squint at.

use crate::error::StructuringError;
use crate::metrics::{UsageEntry, UsageLog};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

// ── Model seam ───────────────────────────────────────────────────────────

/// A successful generation, with provider-reported token usage.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub text: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// A failed generation attempt.
#[derive(Debug, Clone)]
pub struct ModelCallError {
    pub message: String,
}

impl ModelCallError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Overload / unavailability signature, the only error class that
    /// justifies switching models. Matched on the error text because that is
    /// all providers reliably expose across SDK versions.
    pub fn is_overload(&self) -> bool {
        let msg = self.message.to_lowercase();
        msg.contains("503") || msg.contains("unavailable") || msg.contains("overloaded")
    }
}

impl std::fmt::Display for ModelCallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// One named text-generation model.
///
/// Implemented by [`LlmModel`] in production and by scripted mocks in tests
/// (inject via [`crate::config::PipelineConfigBuilder::client`]).
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Model identifier, used in logs and usage-metric rows.
    fn name(&self) -> &str;

    /// Generate a structuring response for the given invoice text.
    async fn generate(&self, text: &str) -> Result<ModelResponse, ModelCallError>;
}

/// Production [`GenerativeModel`] backed by an `edgequake-llm` provider.
///
/// Sends the fixed instruction as the system message and the extracted
/// invoice text as the user message.
pub struct LlmModel {
    provider: Arc<dyn LLMProvider>,
    model: String,
    instruction: String,
    temperature: f32,
    max_output_tokens: usize,
}

impl LlmModel {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        model: impl Into<String>,
        instruction: impl Into<String>,
        temperature: f32,
        max_output_tokens: usize,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            instruction: instruction.into(),
            temperature,
            max_output_tokens,
        }
    }
}

#[async_trait]
impl GenerativeModel for LlmModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, text: &str) -> Result<ModelResponse, ModelCallError> {
        let messages = vec![
            ChatMessage::system(&self.instruction),
            ChatMessage::user(text),
        ];
        let options = CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_output_tokens),
            ..Default::default()
        };

        match self.provider.chat(&messages, Some(&options)).await {
            Ok(response) => Ok(ModelResponse {
                text: response.content,
                prompt_tokens: response.prompt_tokens as u32,
                completion_tokens: response.completion_tokens as u32,
            }),
            Err(e) => Err(ModelCallError::new(format!("{e}"))),
        }
    }
}

// ── Retry policy ─────────────────────────────────────────────────────────

/// Bounded exponential backoff with jitter.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, first try included. Always ≥ 1.
    pub max_attempts: u32,
    pub base_ms: u64,
    pub cap_ms: u64,
    pub jitter_ms: u64,
}

impl RetryPolicy {
    /// Deterministic part of the delay after attempt `attempt` (0-indexed):
    /// `min(base * 2^attempt, cap)`.
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        self.base_ms
            .saturating_mul(2u64.saturating_pow(attempt))
            .min(self.cap_ms)
    }

    /// Full sleep for attempt `attempt`: backoff plus uniform jitter in
    /// `[0, jitter_ms]`.
    fn delay(&self, attempt: u32) -> Duration {
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        };
        Duration::from_millis(self.backoff_ms(attempt) + jitter)
    }
}

// ── Fallback state machine ───────────────────────────────────────────────

/// Which model the structuring call is currently using.
///
/// The only legal transition is `Primary → Fallback`, taken at most once,
/// and only when an overload-class error occurs while a fallback model is
/// configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    Primary,
    Fallback,
}

impl ModelState {
    /// State after a failed attempt.
    pub fn after_failure(self, overload: bool, has_fallback: bool) -> ModelState {
        match (self, overload && has_fallback) {
            (ModelState::Primary, true) => ModelState::Fallback,
            (state, _) => state,
        }
    }
}

// ── Structurer ───────────────────────────────────────────────────────────

/// Drives the structuring call: retries, backoff, fallback switch, metering.
pub struct Structurer {
    primary: Arc<dyn GenerativeModel>,
    fallback: Option<Arc<dyn GenerativeModel>>,
    retry: RetryPolicy,
    metrics: UsageLog,
}

impl Structurer {
    pub fn new(
        primary: Arc<dyn GenerativeModel>,
        fallback: Option<Arc<dyn GenerativeModel>>,
        retry: RetryPolicy,
        metrics: UsageLog,
    ) -> Self {
        Self {
            primary,
            fallback,
            retry,
            metrics,
        }
    }

    fn model_for(&self, state: ModelState) -> &Arc<dyn GenerativeModel> {
        match state {
            ModelState::Primary => &self.primary,
            // `after_failure` only reaches Fallback when a fallback exists.
            ModelState::Fallback => self.fallback.as_ref().unwrap_or(&self.primary),
        }
    }

    fn meter(&self, entry: UsageEntry) {
        if let Err(e) = self.metrics.record(&entry) {
            warn!(
                "Could not append usage metrics to {}: {e}",
                self.metrics.path().display()
            );
        }
    }

    /// Send `text` through the structuring call.
    ///
    /// Returns the trimmed response text on the first successful attempt, or
    /// [`StructuringError::Exhausted`] once the retry budget is spent. Every
    /// attempt — success or failure — appends one usage-metric row.
    pub async fn structure(&self, text: &str) -> Result<String, StructuringError> {
        let mut state = ModelState::Primary;
        let mut last_err = String::new();

        for attempt in 0..self.retry.max_attempts {
            let model = self.model_for(state);
            debug!(
                "Structuring attempt {}/{} with model {}",
                attempt + 1,
                self.retry.max_attempts,
                model.name()
            );

            match model.generate(text).await {
                Ok(response) => {
                    debug!(
                        "Model {}: {} prompt tokens, {} completion tokens",
                        model.name(),
                        response.prompt_tokens,
                        response.completion_tokens
                    );
                    self.meter(UsageEntry::success(
                        model.name(),
                        response.prompt_tokens,
                        response.completion_tokens,
                    ));
                    return Ok(response.text.trim().to_string());
                }
                Err(e) => {
                    warn!(
                        "Structuring attempt {} with {} failed — {}",
                        attempt + 1,
                        model.name(),
                        e
                    );
                    self.meter(UsageEntry::failure(model.name()));

                    let next = state.after_failure(e.is_overload(), self.fallback.is_some());
                    if next != state {
                        info!(
                            "Overload detected, switching to fallback model {}",
                            self.model_for(next).name()
                        );
                        state = next;
                    }
                    last_err = e.message;

                    if attempt + 1 < self.retry.max_attempts {
                        let delay = self.retry.delay(attempt);
                        info!("Waiting {:.1}s before next attempt", delay.as_secs_f64());
                        sleep(delay).await;
                    }
                }
            }
        }

        Err(StructuringError::Exhausted {
            attempts: self.retry.max_attempts,
            detail: last_err,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let retry = RetryPolicy {
            max_attempts: 5,
            base_ms: 1_000,
            cap_ms: 30_000,
            jitter_ms: 500,
        };
        assert_eq!(retry.backoff_ms(0), 1_000);
        assert_eq!(retry.backoff_ms(1), 2_000);
        assert_eq!(retry.backoff_ms(4), 16_000);
        assert_eq!(retry.backoff_ms(5), 30_000);
        assert_eq!(retry.backoff_ms(63), 30_000, "no overflow at large attempts");
    }

    #[test]
    fn delay_lies_within_jitter_bounds() {
        let retry = RetryPolicy {
            max_attempts: 3,
            base_ms: 100,
            cap_ms: 30_000,
            jitter_ms: 50,
        };
        for attempt in 0..3 {
            let base = retry.backoff_ms(attempt);
            for _ in 0..20 {
                let d = retry.delay(attempt).as_millis() as u64;
                assert!(d >= base && d <= base + 50, "attempt {attempt}: {d}ms");
            }
        }
    }

    #[test]
    fn overload_predicate_matches_service_errors() {
        assert!(ModelCallError::new("HTTP 503 backend overloaded").is_overload());
        assert!(ModelCallError::new("model is UNAVAILABLE right now").is_overload());
        assert!(!ModelCallError::new("HTTP 429 rate limited").is_overload());
        assert!(!ModelCallError::new("invalid api key").is_overload());
    }

    #[test]
    fn state_machine_switches_once_and_never_back() {
        let s = ModelState::Primary;
        // Non-overload failures keep the primary.
        assert_eq!(s.after_failure(false, true), ModelState::Primary);
        // No fallback configured: overload does not switch.
        assert_eq!(s.after_failure(true, false), ModelState::Primary);
        // Overload with a fallback switches.
        let s = s.after_failure(true, true);
        assert_eq!(s, ModelState::Fallback);
        // Nothing transitions out of Fallback.
        assert_eq!(s.after_failure(true, true), ModelState::Fallback);
        assert_eq!(s.after_failure(false, true), ModelState::Fallback);
    }
}
