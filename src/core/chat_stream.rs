use futures_util::StreamExt;
use memchr::memchr;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::gemini::{Content, GenerateContentRequest, GenerateContentResponse, SafetySetting};
use crate::api::{ChatMessage, ChatRequest, ChatResponse};
use crate::core::backend::BackendId;
use crate::core::config::{Config, EndpointConfig};
use crate::core::message::Entry;
use crate::utils::url::{construct_api_url, model_method_url};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamMessage {
    Chunk(String),
    Error(String),
    /// The endpoint refused the prompt; carries the reported reason.
    Blocked(String),
    End,
}

/// One generation request, already reduced to what the endpoint sees.
#[derive(Clone, Debug)]
pub struct CompletionRequest {
    pub backend: BackendId,
    /// Prior turns followed by the prompt entry.
    pub contents: Vec<Entry>,
    pub system_instruction: String,
    pub safety_settings: Vec<SafetySetting>,
}

/// Starts a streamed completion. Messages arrive on the returned channel
/// until `End`, or until `cancel` fires.
pub trait CompletionBackend: Send + Sync {
    fn start_stream(
        &self,
        request: CompletionRequest,
        cancel: CancellationToken,
    ) -> mpsc::UnboundedReceiver<StreamMessage>;
}

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

fn handle_data_payload(
    backend: BackendId,
    payload: &str,
    tx: &mpsc::UnboundedSender<StreamMessage>,
) -> bool {
    if payload == "[DONE]" {
        let _ = tx.send(StreamMessage::End);
        return true;
    }

    let decoded = match backend {
        BackendId::Primary => match serde_json::from_str::<GenerateContentResponse>(payload) {
            Ok(response) if response.error.is_none() => {
                if let Some(reason) = response.block_reason() {
                    let _ = tx.send(StreamMessage::Blocked(reason.to_string()));
                }
                Some(response.text())
            }
            _ => None,
        },
        BackendId::Alternate => serde_json::from_str::<ChatResponse>(payload)
            .ok()
            .map(|response| {
                response
                    .choices
                    .first()
                    .and_then(|choice| choice.delta.content.clone())
                    .unwrap_or_default()
            }),
    };

    match decoded {
        Some(content) => {
            if !content.is_empty() {
                let _ = tx.send(StreamMessage::Chunk(content));
            }
            false
        }
        None => {
            if payload.trim().is_empty() {
                return false;
            }

            let formatted_error = format_api_error(payload);
            let _ = tx.send(StreamMessage::Error(formatted_error));
            let _ = tx.send(StreamMessage::End);
            true
        }
    }
}

fn process_sse_line(
    backend: BackendId,
    line: &str,
    tx: &mpsc::UnboundedSender<StreamMessage>,
) -> bool {
    extract_data_payload(line)
        .map(|payload| handle_data_payload(backend, payload, tx))
        .unwrap_or(false)
}

/// Splits an SSE byte stream into lines and forwards decoded messages.
pub struct SseDecoder {
    backend: BackendId,
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new(backend: BackendId) -> Self {
        Self {
            backend,
            buffer: Vec::new(),
        }
    }

    /// Feeds raw bytes; returns `true` once the stream has ended.
    pub fn push(&mut self, bytes: &[u8], tx: &mpsc::UnboundedSender<StreamMessage>) -> bool {
        self.buffer.extend_from_slice(bytes);

        while let Some(newline_pos) = memchr(b'\n', &self.buffer) {
            let should_end = match std::str::from_utf8(&self.buffer[..newline_pos]) {
                Ok(line) => process_sse_line(self.backend, line.trim(), tx),
                Err(e) => {
                    warn!("Invalid UTF-8 in stream: {e}");
                    false
                }
            };
            self.buffer.drain(..=newline_pos);
            if should_end {
                return true;
            }
        }
        false
    }

    /// Decodes a final line that arrived without a trailing newline.
    pub fn finish(&mut self, tx: &mpsc::UnboundedSender<StreamMessage>) -> bool {
        let rest = std::mem::take(&mut self.buffer);
        match std::str::from_utf8(&rest) {
            Ok(line) if !line.trim().is_empty() => process_sse_line(self.backend, line.trim(), tx),
            Ok(_) => false,
            Err(e) => {
                warn!("Invalid UTF-8 at end of stream: {e}");
                false
            }
        }
    }
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.to_string()),
                serde_json::Value::Object(map) => map
                    .get("message")
                    .and_then(|message| message.as_str().map(str::to_owned)),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        collapsed.trim().to_string()
    })
}

pub fn format_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();

    if trimmed.is_empty() {
        return "API Error:\n```\n<empty>\n```".to_string();
    }

    if let Ok(json_value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Ok(pretty_json) = serde_json::to_string_pretty(&json_value) {
            if let Some(summary) = extract_error_summary(&json_value) {
                if !summary.is_empty() {
                    return format!("API Error: {}\n```json\n{}\n```", summary, pretty_json);
                }
            }
            return format!("API Error:\n```json\n{}\n```", pretty_json);
        }
    }

    if trimmed.starts_with('<') && trimmed.ends_with('>') {
        format!("API Error:\n```xml\n{}\n```", trimmed)
    } else {
        format!("API Error:\n```\n{}\n```", trimmed)
    }
}

pub fn generate_content_body(request: &CompletionRequest) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: request
            .contents
            .iter()
            .filter(|entry| !entry.parts.is_empty())
            .map(|entry| Content::new(entry.role.as_str(), entry.parts.clone()))
            .collect(),
        system_instruction: Content::system(request.system_instruction.clone()),
        safety_settings: request.safety_settings.clone(),
    }
}

/// The chat completions endpoint is text-only: media parts are dropped and
/// entries without text are skipped.
pub fn chat_completion_body(request: &CompletionRequest, model: &str) -> ChatRequest {
    let mut messages = vec![ChatMessage {
        role: "system".to_string(),
        content: request.system_instruction.clone(),
    }];
    messages.extend(request.contents.iter().filter_map(|entry| {
        entry.text().map(|text| ChatMessage {
            role: entry.role.to_chat_role().to_string(),
            content: text.to_string(),
        })
    }));

    ChatRequest {
        model: model.to_string(),
        messages,
        stream: true,
    }
}

fn send_failure(tx: &mpsc::UnboundedSender<StreamMessage>, error_text: &str) {
    let _ = tx.send(StreamMessage::Error(format_api_error(error_text)));
    let _ = tx.send(StreamMessage::End);
}

/// HTTP implementation of [`CompletionBackend`] for both text endpoints.
#[derive(Clone)]
pub struct ChatStreamService {
    client: reqwest::Client,
    primary: EndpointConfig,
    alternate: EndpointConfig,
}

impl ChatStreamService {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            primary: config.primary.clone(),
            alternate: config.alternate.clone(),
        }
    }

    fn endpoint(&self, backend: BackendId) -> &EndpointConfig {
        match backend {
            BackendId::Primary => &self.primary,
            BackendId::Alternate => &self.alternate,
        }
    }
}

impl CompletionBackend for ChatStreamService {
    fn start_stream(
        &self,
        request: CompletionRequest,
        cancel_token: CancellationToken,
    ) -> mpsc::UnboundedReceiver<StreamMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = self.client.clone();
        let endpoint = self.endpoint(request.backend).clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = run_stream(client, endpoint, request, &tx) => {}
                _ = cancel_token.cancelled() => {
                    debug!("completion stream cancelled");
                }
            }
        });
        rx
    }
}

async fn run_stream(
    client: reqwest::Client,
    endpoint: EndpointConfig,
    request: CompletionRequest,
    tx: &mpsc::UnboundedSender<StreamMessage>,
) {
    let Some(api_key) = endpoint.api_key() else {
        send_failure(
            tx,
            &format!("environment variable {} is not set", endpoint.api_key_env),
        );
        return;
    };

    let http_request = match request.backend {
        BackendId::Primary => {
            let url = model_method_url(
                &endpoint.base_url,
                &endpoint.model,
                "streamGenerateContent?alt=sse",
            );
            client
                .post(url)
                .header("x-goog-api-key", api_key)
                .json(&generate_content_body(&request))
        }
        BackendId::Alternate => {
            let url = construct_api_url(&endpoint.base_url, "chat/completions");
            client
                .post(url)
                .bearer_auth(api_key)
                .json(&chat_completion_body(&request, &endpoint.model))
        }
    };

    debug!(backend = %request.backend, model = %endpoint.model, "starting completion stream");

    let response = match http_request
        .header("Content-Type", "application/json")
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            send_failure(tx, &e.to_string());
            return;
        }
    };

    if !response.status().is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());
        send_failure(tx, &error_text);
        return;
    }

    let mut stream = response.bytes_stream();
    let mut decoder = SseDecoder::new(request.backend);

    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(chunk_bytes) => {
                if decoder.push(&chunk_bytes, tx) {
                    return;
                }
            }
            Err(e) => {
                send_failure(tx, &e.to_string());
                return;
            }
        }
    }

    if !decoder.finish(tx) {
        let _ = tx.send(StreamMessage::End);
    }
}
