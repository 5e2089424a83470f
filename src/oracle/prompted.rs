//! An oracle built on a text-completion backend.

use super::{prompt, reply, BoundaryOracle};
use crate::boundary::BoundaryCandidate;
use crate::error::OracleError;
use crate::patterns::DetectedPatterns;
use crate::section::SectionType;
use std::sync::Mutex;

/// One completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// A completion and the tokens it used.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Completion {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Sends prompts to a language model.
pub trait CompletionBackend: Send + Sync {
    fn complete(&self, request: &CompletionRequest) -> Result<Completion, OracleError>;
}

/// Price per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl Pricing {
    pub fn per_million(input: f64, output: f64) -> Self {
        Self {
            input_per_million: input,
            output_per_million: output,
        }
    }

    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 * self.input_per_million
            + output_tokens as f64 * self.output_per_million)
            / 1_000_000.0
    }
}

/// Token usage accumulated across calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Usage {
    pub calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// [`BoundaryOracle`] that asks a language model and parses its replies tolerantly.
pub struct PromptedOracle<B> {
    backend: B,
    pricing: Pricing,
    usage: Mutex<Usage>,
}

impl<B: CompletionBackend> PromptedOracle<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            pricing: Pricing::default(),
            usage: Mutex::new(Usage::default()),
        }
    }

    pub fn with_pricing(mut self, pricing: Pricing) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Tokens used so far.
    pub fn usage(&self) -> Usage {
        *self.usage.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ask(&self, prompt: String, max_tokens: u32) -> Result<String, OracleError> {
        let request = CompletionRequest {
            system: prompt::SYSTEM_PROMPT.to_string(),
            prompt,
            max_tokens,
            temperature: 0.0,
        };
        let completion = self.backend.complete(&request)?;

        let mut usage = self
            .usage
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        usage.calls += 1;
        usage.input_tokens += completion.input_tokens;
        usage.output_tokens += completion.output_tokens;
        drop(usage);

        tracing::debug!(
            input_tokens = completion.input_tokens,
            output_tokens = completion.output_tokens,
            "oracle completion"
        );
        Ok(completion.text)
    }
}

impl<B: CompletionBackend> BoundaryOracle for PromptedOracle<B> {
    fn detect_boundary(
        &self,
        text: &str,
        section: SectionType,
    ) -> Result<Option<BoundaryCandidate>, OracleError> {
        let answer = self.ask(prompt::boundary_prompt(text, section), 400)?;
        reply::parse_boundary(&answer)
    }

    fn detect_patterns(&self, text: &str) -> Result<DetectedPatterns, OracleError> {
        let answer = self.ask(prompt::patterns_prompt(text), 1_500)?;
        reply::parse_patterns(&answer)
    }

    fn reflow_chunk(&self, text: &str) -> Result<String, OracleError> {
        // Roughly one token per four characters, plus slack for the rewrite
        let budget = (text.len() / 3 + 256).min(u32::MAX as usize) as u32;
        let answer = self.ask(prompt::reflow_prompt(text), budget)?;
        reply::parse_reflow(&answer)
    }

    fn cost_so_far(&self) -> f64 {
        let usage = self.usage();
        self.pricing.cost(usage.input_tokens, usage.output_tokens)
    }
}
