//! Chat-completions backend over HTTP (OpenAI-compatible endpoints).

use reqwest::blocking::Client as HttpClient;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use unscaffold::oracle::{Completion, CompletionBackend, CompletionRequest};
use unscaffold::OracleError;

pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub struct HttpBackend {
    client: HttpClient,
    model: String,
    api_key: String,
    base_url: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 2],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct TokenUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, model: &str, api_key: &str) -> Result<Self, OracleError> {
        let client = HttpClient::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| OracleError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            model: model.to_string(),
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn headers(&self) -> Result<HeaderMap, OracleError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|e| OracleError::Auth(e.to_string()))?;
        headers.insert(AUTHORIZATION, bearer);
        Ok(headers)
    }
}

impl CompletionBackend for HttpBackend {
    fn complete(&self, request: &CompletionRequest) -> Result<Completion, OracleError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: [
                Message {
                    role: "system",
                    content: &request.system,
                },
                Message {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(url)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(parse_retry_after);
            let message = response
                .json::<ErrorResponse>()
                .map(|body| body.error.message)
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(status_error(status, message, retry_after));
        }

        let reply: ChatResponse = response
            .json()
            .map_err(|e| OracleError::MalformedReply(e.to_string()))?;
        let text = reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| OracleError::MalformedReply("reply has no choices".into()))?;
        let (input_tokens, output_tokens) = reply
            .usage
            .map(|usage| (usage.prompt_tokens, usage.completion_tokens))
            .unwrap_or_default();

        Ok(Completion {
            text,
            input_tokens,
            output_tokens,
        })
    }
}

fn transport_error(err: reqwest::Error) -> OracleError {
    if err.is_timeout() {
        OracleError::Timeout
    } else {
        OracleError::Transport(err.to_string())
    }
}

/// Maps an unsuccessful HTTP status to an oracle error.
fn status_error(status: StatusCode, message: String, retry_after: Option<Duration>) -> OracleError {
    match status.as_u16() {
        401 | 403 => OracleError::Auth(message),
        408 => OracleError::Timeout,
        429 => OracleError::RateLimited { retry_after },
        code => OracleError::Server {
            status: code,
            message,
        },
    }
}

/// `Retry-After` in seconds; HTTP dates are not supported.
fn parse_retry_after(value: &str) -> Option<Duration> {
    let seconds: f64 = value.trim().parse().ok()?;
    (seconds.is_finite() && seconds >= 0.0).then(|| Duration::from_secs_f64(seconds))
}
