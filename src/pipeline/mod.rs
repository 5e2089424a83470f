//! The pipeline orchestrator.
//!
//! Steps run strictly in their canonical order, each on the output of the previous one.
//! Cancellation is checked between steps; a fatal step error halts the run and returns
//! everything completed so far.

mod executor;
pub mod run;

pub use executor::MAX_REFLOW_DRIFT;
pub use run::{
    overall_confidence, CleanedContent, PipelineRun, RunStatus, StepOutcome, StepResult,
};

use crate::cache::{CacheKey, PatternCache};
use crate::config::PipelineConfig;
use crate::error::{Error, PipelineError};
use crate::oracle::{BoundaryOracle, RetryPolicy, Retrying, Sleeper};
use crate::step::Step;
use crate::transform::lines::word_count;
use executor::StepContext;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Receives progress callbacks while a document is processed.
///
/// All methods default to doing nothing.
pub trait ProgressObserver {
    /// A step is about to run; `position` is 1-based among the `total` enabled steps.
    fn on_step_start(&mut self, _step: Step, _position: usize, _total: usize) {}

    fn on_step_complete(&mut self, _step: Step, _result: &StepResult) {}

    fn on_step_failed(&mut self, _step: Step, _error: &Error) {}

    fn on_warning(&mut self, _step: Step, _message: &str) {}
}

/// Observer that ignores every callback.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {}

/// Cooperative cancellation flag shared between a run and its controller.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation; the run stops before its next step.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs documents through the cleaning steps.
///
/// # Example
///
/// ```no_run
/// use unscaffold::{OfflineOracle, Pipeline, PipelineConfig};
///
/// let mut pipeline = Pipeline::new(OfflineOracle);
/// let config = PipelineConfig::default().local_only();
/// let cleaned = pipeline.run("raw OCR text", &config)?;
/// println!("{}", cleaned.text());
/// # Ok::<(), unscaffold::PipelineError>(())
/// ```
pub struct Pipeline<O> {
    oracle: O,
    cache: PatternCache,
    sleeper: Sleeper,
}

impl<O: BoundaryOracle> Pipeline<O> {
    pub fn new(oracle: O) -> Self {
        Self {
            oracle,
            cache: PatternCache::default(),
            sleeper: std::thread::sleep,
        }
    }

    /// Uses an existing pattern cache. Its TTL is replaced by the configured one on
    /// every run.
    pub fn with_cache(mut self, cache: PatternCache) -> Self {
        self.cache = cache;
        self
    }

    /// Replaces the function used to wait between oracle retries.
    pub fn with_sleeper(mut self, sleeper: Sleeper) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn cache(&self) -> &PatternCache {
        &self.cache
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Cleans one document with no observer and no cancellation.
    pub fn run(
        &mut self,
        text: &str,
        config: &PipelineConfig,
    ) -> Result<CleanedContent, PipelineError> {
        self.run_document(
            "document",
            text,
            config,
            &mut NoopObserver,
            &CancellationToken::new(),
        )
    }

    /// Cleans one document.
    ///
    /// Returns `Ok` with status [`RunStatus::Cancelled`] if `cancel` fired between steps,
    /// and [`PipelineError::StepFailed`] (carrying the completed steps) if a step failed.
    pub fn run_document(
        &mut self,
        document_id: &str,
        text: &str,
        config: &PipelineConfig,
        observer: &mut dyn ProgressObserver,
        cancel: &CancellationToken,
    ) -> Result<CleanedContent, PipelineError> {
        config.validate().map_err(|err| match err {
            Error::Config(message) => PipelineError::InvalidConfig(message),
            other => PipelineError::InvalidConfig(other.to_string()),
        })?;

        self.cache.set_ttl(config.cache_ttl());
        let purged = self.cache.purge_expired(Instant::now());
        if purged > 0 {
            tracing::debug!(purged, "dropped expired pattern analyses");
        }

        let steps = config.enabled_steps();
        let total = steps.len();
        let cache_key = CacheKey::new(document_id, text);
        let oracle = Retrying::new(&self.oracle, RetryPolicy::from(config.retry))
            .with_sleeper(self.sleeper);
        let mut run = PipelineRun::new(document_id, text);

        tracing::info!(document = document_id, steps = total, "starting pipeline");

        for (index, step) in steps.into_iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::info!(document = document_id, step = %step, "pipeline cancelled");
                return Ok(run.finish(RunStatus::Cancelled));
            }

            observer.on_step_start(step, index + 1, total);
            let started = Instant::now();
            let cost_before = oracle.cost_so_far();
            let before = run.text().to_string();

            let mut ctx = StepContext {
                oracle: &oracle,
                config,
                cache: &mut self.cache,
                cache_key: &cache_key,
            };

            let execution = match executor::execute(step, &before, &mut ctx) {
                Ok(execution) => execution,
                Err(err) => {
                    tracing::error!(document = document_id, step = %step, error = %err, "step failed");
                    observer.on_step_failed(step, &err);
                    return Err(run.fail(step, err));
                }
            };

            let result = StepResult {
                step,
                words_before: word_count(&before),
                words_after: word_count(&execution.text),
                text: execution.text,
                outcome: execution.outcome,
                change_count: execution.change_count,
                confidence: execution.confidence,
                cost: (oracle.cost_so_far() - cost_before).max(0.0),
                source: execution.source,
                rejection: execution.rejection,
                warnings: execution.warnings,
                duration: started.elapsed(),
            };

            for warning in &result.warnings {
                observer.on_warning(step, warning);
            }
            tracing::info!(
                step = %step,
                outcome = %result.outcome,
                changes = result.change_count,
                words = result.words_after,
                elapsed_ms = duration_ms(result.duration),
                "step finished"
            );
            observer.on_step_complete(step, &result);
            run.record(result);
        }

        let content = run.finish(RunStatus::Completed);
        tracing::info!(
            document = document_id,
            confidence = content.confidence,
            reduction = content.reduction_percent(),
            "pipeline finished"
        );
        Ok(content)
    }

    /// Cleans documents one after another.
    ///
    /// Once `cancel` fires, the current document stops between steps and no further
    /// documents are started.
    pub fn run_queue<I>(
        &mut self,
        documents: I,
        config: &PipelineConfig,
        observer: &mut dyn ProgressObserver,
        cancel: &CancellationToken,
    ) -> Vec<(String, Result<CleanedContent, PipelineError>)>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut results = Vec::new();
        for (id, text) in documents {
            if cancel.is_cancelled() {
                break;
            }
            let result = self.run_document(&id, &text, config, observer, cancel);
            results.push((id, result));
        }
        results
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
