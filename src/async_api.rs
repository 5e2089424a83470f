//! Async API for non-blocking document cleaning.
//!
//! Enable the `async` feature to use these APIs:
//!
//! ```toml
//! [dependencies]
//! unscaffold = { version = "0.1", features = ["async"] }
//! ```
//!
//! Oracle calls block, so every run happens on Tokio's blocking thread pool. Documents
//! are processed one at a time.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::oracle::BoundaryOracle;
use crate::pipeline::{CancellationToken, CleanedContent, NoopObserver, Pipeline};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::fs;

/// Async wrapper around [`Pipeline`].
///
/// # Example
///
/// ```no_run
/// # async fn example() -> Result<(), unscaffold::PipelineError> {
/// use unscaffold::async_api::AsyncPipeline;
/// use unscaffold::{OfflineOracle, PipelineConfig};
///
/// let pipeline = AsyncPipeline::new(OfflineOracle);
/// let cleaned = pipeline
///     .clean_file("book.md", PipelineConfig::default().local_only())
///     .await?;
/// println!("{}", cleaned.text());
/// # Ok(())
/// # }
/// ```
pub struct AsyncPipeline<O> {
    inner: Arc<Mutex<Pipeline<O>>>,
}

impl<O> Clone for AsyncPipeline<O> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<O: BoundaryOracle + 'static> AsyncPipeline<O> {
    pub fn new(oracle: O) -> Self {
        Self::from_pipeline(Pipeline::new(oracle))
    }

    pub fn from_pipeline(pipeline: Pipeline<O>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(pipeline)),
        }
    }

    /// Cleans one document.
    pub async fn clean(
        &self,
        document_id: impl Into<String>,
        text: impl Into<String>,
        config: PipelineConfig,
    ) -> Result<CleanedContent, PipelineError> {
        self.clean_with_cancel(document_id, text, config, CancellationToken::new())
            .await
    }

    /// Cleans one document, stopping between steps once `cancel` fires.
    pub async fn clean_with_cancel(
        &self,
        document_id: impl Into<String>,
        text: impl Into<String>,
        config: PipelineConfig,
        cancel: CancellationToken,
    ) -> Result<CleanedContent, PipelineError> {
        let inner = Arc::clone(&self.inner);
        let document_id = document_id.into();
        let text = text.into();

        tokio::task::spawn_blocking(move || {
            let mut pipeline = inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            pipeline.run_document(&document_id, &text, &config, &mut NoopObserver, &cancel)
        })
        .await
        .map_err(|e| PipelineError::Io(std::io::Error::other(e.to_string())))?
    }

    /// Reads a file and cleans it; the path is used as the document id.
    pub async fn clean_file(
        &self,
        path: impl AsRef<Path>,
        config: PipelineConfig,
    ) -> Result<CleanedContent, PipelineError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).await?;
        self.clean(path.display().to_string(), text, config).await
    }
}
