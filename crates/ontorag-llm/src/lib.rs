//! Typed facade over a chat-completions HTTP endpoint (OpenRouter-shaped).
//!
//! Responsibilities:
//! - build the per-chunk prompt by substituting `{{CHUNK_DTO_JSON}}` and
//!   `{{SCHEMA_CARD_JSON}}` in a template (compact JSON, no newlines),
//! - post the request and extract the assistant message text,
//! - parse it as strict JSON against the proposal schema, retrying once
//!   with a "return strict JSON only" reminder,
//! - enforce a minimum inter-call delay (default 10 s) and a per-call
//!   timeout (default 120 s).
//!
//! Configuration comes from the environment at the command boundary
//! ([`OpenRouterConfig::from_env`]); the pure merge paths never touch it.
//! Tests use [`MockChatClient`] instead of the network.

use ontorag_dto::ChunkDto;
use ontorag_schema::{ChunkInstances, ChunkProposal, SchemaCard};
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;

pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_MIN_CALL_DELAY: Duration = Duration::from_secs(10);

pub const CHUNK_PLACEHOLDER: &str = "{{CHUNK_DTO_JSON}}";
pub const CARD_PLACEHOLDER: &str = "{{SCHEMA_CARD_JSON}}";

pub const SCHEMA_PROMPT_TEMPLATE: &str = include_str!("../prompts/schema_extraction.txt");
pub const INSTANCE_PROMPT_TEMPLATE: &str = include_str!("../prompts/instance_extraction.txt");

const SYSTEM_PROMPT: &str =
    "You return strict JSON only: a single JSON object, no prose, no code fences.";
const STRICT_JSON_REMINDER: &str = "REMINDER: your previous reply was not a valid JSON object. \
Return strict JSON only: a single JSON object matching the requested keys, with no prose \
and no code fences.";

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum LlmError {
    /// Missing or invalid configuration; fatal at command entry.
    #[error("configuration error: {0}")]
    Config(String),
    /// Transport or endpoint failure.
    #[error("llm http error: {0}")]
    Http(String),
    /// The response was not schema-compliant JSON even after one retry.
    /// Non-fatal: the caller records a warning and skips the chunk.
    #[error("chunk {chunk_id}: llm response is not valid JSON after retry: {message}")]
    Parse { chunk_id: String, message: String },
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct OpenRouterConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub app_name: Option<String>,
    pub site_url: Option<String>,
    pub timeout: Duration,
    pub min_call_delay: Duration,
}

impl OpenRouterConfig {
    /// Read configuration from `OPENROUTER_*` environment variables.
    /// Only `OPENROUTER_API_KEY` is required.
    pub fn from_env() -> Result<Self, LlmError> {
        let api_key = std::env::var("OPENROUTER_API_KEY")
            .map_err(|_| LlmError::Config("OPENROUTER_API_KEY is not set".to_string()))?;
        Ok(Self {
            api_key,
            model: std::env::var("OPENROUTER_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            base_url: std::env::var("OPENROUTER_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            app_name: std::env::var("OPENROUTER_APP_NAME").ok(),
            site_url: std::env::var("OPENROUTER_SITE_URL").ok(),
            timeout: DEFAULT_CALL_TIMEOUT,
            min_call_delay: DEFAULT_MIN_CALL_DELAY,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_min_call_delay(mut self, delay: Duration) -> Self {
        self.min_call_delay = delay;
        self
    }
}

// ============================================================================
// Chat clients
// ============================================================================

/// One blocking chat call. Implementations must be shareable across the
/// pipeline's worker threads.
pub trait ChatClient: Send + Sync {
    fn chat(&self, system: Option<&str>, user: &str) -> Result<String, LlmError>;
}

/// Reusable HTTP client for an OpenRouter-compatible endpoint. The pacing
/// mutex spans all threads using this client, so the inter-call delay holds
/// regardless of worker-pool size.
pub struct OpenRouterClient {
    config: OpenRouterConfig,
    http: reqwest::blocking::Client,
    last_call: Mutex<Option<Instant>>,
}

impl OpenRouterClient {
    pub fn new(config: OpenRouterConfig) -> Result<Self, LlmError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self {
            config,
            http,
            last_call: Mutex::new(None),
        })
    }

    fn wait_turn(&self) {
        let mut last = self
            .last_call
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.config.min_call_delay {
                std::thread::sleep(self.config.min_call_delay - elapsed);
            }
        }
        *last = Some(Instant::now());
    }
}

impl ChatClient for OpenRouterClient {
    fn chat(&self, system: Option<&str>, user: &str) -> Result<String, LlmError> {
        self.wait_turn();

        let mut messages = Vec::new();
        if let Some(system) = system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": user }));
        let body = json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": 0
        });

        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let mut request = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body);
        if let Some(site_url) = &self.config.site_url {
            request = request.header("HTTP-Referer", site_url);
        }
        if let Some(app_name) = &self.config.app_name {
            request = request.header("X-Title", app_name);
        }

        let response = request
            .send()
            .map_err(|e| LlmError::Http(format!("failed to reach {url}: {e}")))?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().unwrap_or_default();
            return Err(LlmError::Http(format!("{url} returned {status}: {text}")));
        }

        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: Message,
        }
        #[derive(Deserialize)]
        struct Message {
            content: String,
        }

        let out: ChatResponse = response
            .json()
            .map_err(|e| LlmError::Http(format!("{url} returned invalid JSON: {e}")))?;
        out.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::Http(format!("{url} returned no choices")))
    }
}

/// Canned-response client for tests and offline runs. Responses are served
/// in call order, cycling when exhausted.
pub struct MockChatClient {
    responses: Vec<String>,
    next: AtomicUsize,
}

impl MockChatClient {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses,
            next: AtomicUsize::new(0),
        }
    }

    pub fn always(response: &str) -> Self {
        Self::new(vec![response.to_string()])
    }
}

impl ChatClient for MockChatClient {
    fn chat(&self, _system: Option<&str>, _user: &str) -> Result<String, LlmError> {
        if self.responses.is_empty() {
            return Err(LlmError::Http("mock client has no responses".to_string()));
        }
        let idx = self.next.fetch_add(1, Ordering::SeqCst);
        Ok(self.responses[idx % self.responses.len()].clone())
    }
}

// ============================================================================
// Prompt building and response parsing
// ============================================================================

/// Substitute both placeholders; the JSON arguments must be compact (no
/// newlines), which `serde_json::to_string` guarantees.
pub fn render_prompt(template: &str, chunk_json: &str, card_json: &str) -> Result<String, LlmError> {
    if !template.contains(CHUNK_PLACEHOLDER) || !template.contains(CARD_PLACEHOLDER) {
        return Err(LlmError::Config(format!(
            "prompt template must contain {CHUNK_PLACEHOLDER} and {CARD_PLACEHOLDER}"
        )));
    }
    Ok(template
        .replace(CHUNK_PLACEHOLDER, chunk_json)
        .replace(CARD_PLACEHOLDER, card_json))
}

/// Best-effort extraction of a JSON object from an LLM reply: strict parse
/// first, then the substring between the first `{` and the last `}`.
pub fn extract_json_object(text: &str) -> Result<serde_json::Value, String> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }
    let Some(start) = trimmed.find('{') else {
        return Err("response contains no '{'".to_string());
    };
    let Some(end) = trimmed.rfind('}') else {
        return Err("response contains no '}'".to_string());
    };
    if end < start {
        return Err("response contains no JSON object".to_string());
    }
    serde_json::from_str(&trimmed[start..=end]).map_err(|e| format!("invalid JSON: {e}"))
}

fn call_with_retry<T>(
    client: &dyn ChatClient,
    prompt: &str,
    chunk_id: &str,
    parse: impl Fn(&str) -> Result<T, String>,
) -> Result<T, LlmError> {
    let first = client.chat(Some(SYSTEM_PROMPT), prompt)?;
    match parse(&first) {
        Ok(value) => Ok(value),
        Err(first_error) => {
            tracing::warn!(chunk_id, error = %first_error, "llm reply not schema-compliant; retrying once");
            let retry_prompt = format!("{prompt}\n\n{STRICT_JSON_REMINDER}");
            let second = client.chat(Some(SYSTEM_PROMPT), &retry_prompt)?;
            parse(&second).map_err(|message| LlmError::Parse {
                chunk_id: chunk_id.to_string(),
                message,
            })
        }
    }
}

/// First-pass call: propose ontology additions for one chunk.
pub fn propose_for_chunk(
    client: &dyn ChatClient,
    template: &str,
    chunk: &ChunkDto,
    card: &SchemaCard,
) -> Result<ChunkProposal, LlmError> {
    let chunk_json = serde_json::to_string(chunk)
        .map_err(|e| LlmError::Config(format!("failed to encode chunk: {e}")))?;
    let card_json = serde_json::to_string(card)
        .map_err(|e| LlmError::Config(format!("failed to encode schema card: {e}")))?;
    let prompt = render_prompt(template, &chunk_json, &card_json)?;

    call_with_retry(client, &prompt, &chunk.chunk_id, |text| {
        let value = extract_json_object(text)?;
        let mut proposal = ChunkProposal::from_value(value).map_err(|e| e.to_string())?;
        if proposal.chunk_id.is_empty() {
            proposal.chunk_id = chunk.chunk_id.clone();
        }
        Ok(proposal)
    })
}

/// Second-pass call: extract instance proposals for one chunk.
pub fn instances_for_chunk(
    client: &dyn ChatClient,
    template: &str,
    chunk: &ChunkDto,
    card: &SchemaCard,
) -> Result<ChunkInstances, LlmError> {
    let chunk_json = serde_json::to_string(chunk)
        .map_err(|e| LlmError::Config(format!("failed to encode chunk: {e}")))?;
    let card_json = serde_json::to_string(card)
        .map_err(|e| LlmError::Config(format!("failed to encode schema card: {e}")))?;
    let prompt = render_prompt(template, &chunk_json, &card_json)?;

    call_with_retry(client, &prompt, &chunk.chunk_id, |text| {
        let value = extract_json_object(text)?;
        let mut instances = ChunkInstances::from_value(value).map_err(|e| e.to_string())?;
        if instances.chunk_id.is_empty() {
            instances.chunk_id = chunk.chunk_id.clone();
        }
        Ok(instances)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ontorag_dto::Provenance;
    use ontorag_schema::DEFAULT_NAMESPACE;

    fn sample_chunk() -> ChunkDto {
        ChunkDto {
            chunk_id: "c1".to_string(),
            document_id: "d1".to_string(),
            index: 0,
            text: "Alice is a person.".to_string(),
            provenance: Provenance::default(),
        }
    }

    #[test]
    fn render_substitutes_both_placeholders() {
        let prompt = render_prompt("A {{CHUNK_DTO_JSON}} B {{SCHEMA_CARD_JSON}} C", "{}", "[]")
            .expect("render");
        assert_eq!(prompt, "A {} B [] C");
    }

    #[test]
    fn render_rejects_templates_missing_a_placeholder() {
        let err = render_prompt("no placeholders here", "{}", "{}").expect_err("must fail");
        assert!(matches!(err, LlmError::Config(_)));
    }

    #[test]
    fn extract_handles_fenced_json() {
        let value =
            extract_json_object("```json\n{\"chunk_id\": \"c1\"}\n```").expect("fenced json");
        assert_eq!(value["chunk_id"], "c1");
    }

    #[test]
    fn propose_parses_a_clean_reply() {
        let client = MockChatClient::always(
            r#"{"chunk_id": "c1", "proposed_additions": {"classes": [{"name": "Person"}]}}"#,
        );
        let card = SchemaCard::empty(DEFAULT_NAMESPACE);
        let proposal =
            propose_for_chunk(&client, SCHEMA_PROMPT_TEMPLATE, &sample_chunk(), &card)
                .expect("proposal");
        assert_eq!(proposal.proposed_additions.classes[0].name, "Person");
    }

    #[test]
    fn propose_retries_once_then_succeeds() {
        let client = MockChatClient::new(vec![
            "I think the answer is Person!".to_string(),
            r#"{"chunk_id": "c1", "proposed_additions": {"classes": [{"name": "Person"}]}}"#
                .to_string(),
        ]);
        let card = SchemaCard::empty(DEFAULT_NAMESPACE);
        let proposal =
            propose_for_chunk(&client, SCHEMA_PROMPT_TEMPLATE, &sample_chunk(), &card)
                .expect("retry succeeds");
        assert_eq!(proposal.proposed_additions.classes.len(), 1);
    }

    #[test]
    fn propose_surfaces_parse_error_after_second_failure() {
        let client = MockChatClient::always("still not json");
        let card = SchemaCard::empty(DEFAULT_NAMESPACE);
        let err = propose_for_chunk(&client, SCHEMA_PROMPT_TEMPLATE, &sample_chunk(), &card)
            .expect_err("must fail");
        match err {
            LlmError::Parse { chunk_id, .. } => assert_eq!(chunk_id, "c1"),
            other => panic!("expected parse error, got {other}"),
        }
    }

    #[test]
    fn instance_pass_parses_instances() {
        let client = MockChatClient::always(
            r#"{"chunk_id": "c1", "instances": [{"local_id": "p1", "class": "Person",
                "datatype_values": {"email": "a@b.c"},
                "evidence": [{"chunk_id": "c1", "quote": "Alice"}]}]}"#,
        );
        let card = SchemaCard::empty(DEFAULT_NAMESPACE);
        let instances =
            instances_for_chunk(&client, INSTANCE_PROMPT_TEMPLATE, &sample_chunk(), &card)
                .expect("instances");
        assert_eq!(instances.instances.len(), 1);
        assert_eq!(instances.instances[0].local_id, "p1");
    }
}
