//! llama-stack inference backend (`/v1/inference/chat-completion`).
//!
//! llama-stack uses its own message schema: the image travels as a bare
//! base64 payload under `{"type": "image", "image": {"data": …}}` and the
//! answer comes back as `completion_message.content`, optionally with
//! `metrics` (token counts) and `logprobs`.

use super::http::{with_params, RemoteClient};
use super::{ensure_remote_allowed, DescriptionBackend, DescriptionStream};
use crate::config::{ApiOptions, PictureDescriptionOptions};
use crate::error::PicDescError;
use crate::pipeline::encode;
use crate::prompts::context_prompt;
use futures::stream::{self, StreamExt};
use image::DynamicImage;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ToolCall {
    call_id: String,
    tool_name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    role: String,
    content: String,
    #[serde(default)]
    stop_reason: String,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Deserialize)]
struct Metric {
    metric: String,
    #[serde(default)]
    unit: Option<String>,
    value: f64,
}

#[derive(Debug, Deserialize)]
struct LogProbs {
    logprobs_by_token: HashMap<String, f64>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    completion_message: CompletionMessage,
    #[serde(default)]
    logprobs: Option<LogProbs>,
    #[serde(default)]
    metrics: Vec<Metric>,
}

/// Describes pictures through a llama-stack server.
pub struct LlamaStackBackend {
    http: RemoteClient,
    prompt: String,
    params: serde_json::Map<String, serde_json::Value>,
    provenance: String,
}

impl LlamaStackBackend {
    /// Build the backend. Fails with [`PicDescError::OperationNotAllowed`]
    /// before any network activity when remote access was not granted.
    pub fn new(options: &PictureDescriptionOptions, api: &ApiOptions) -> Result<Self, PicDescError> {
        ensure_remote_allowed(options)?;
        Ok(Self {
            http: RemoteClient::new(api)?,
            prompt: options.prompt.clone(),
            params: api.params.clone(),
            provenance: api.provenance_or("llama-stack"),
        })
    }

    async fn describe(&self, image: DynamicImage, prompt: String) -> Result<String, PicDescError> {
        let payload = build_payload(&encode::encode_png_base64(&image)?, &prompt, &self.params);
        let reply: ApiResponse = self.http.post_json(&payload).await?;

        let msg = &reply.completion_message;
        debug!(
            "{}: role={} stop_reason={} tool_calls={} logprob_tokens={}",
            self.http.url(),
            msg.role,
            msg.stop_reason,
            msg.tool_calls.as_ref().map_or(0, Vec::len),
            reply
                .logprobs
                .as_ref()
                .map_or(0, |lp| lp.logprobs_by_token.len())
        );
        for call in msg.tool_calls.iter().flatten() {
            debug!(
                "Ignoring tool call {} ({}) with arguments {}",
                call.call_id, call.tool_name, call.arguments
            );
        }
        for m in &reply.metrics {
            debug!(
                "{}: {} = {} {}",
                self.http.url(),
                m.metric,
                m.value,
                m.unit.as_deref().unwrap_or("")
            );
        }

        Ok(reply.completion_message.content.trim().to_string())
    }
}

impl DescriptionBackend for LlamaStackBackend {
    fn provenance(&self) -> &str {
        &self.provenance
    }

    fn requires_remote(&self) -> bool {
        true
    }

    fn annotate(&self, images: Vec<DynamicImage>) -> DescriptionStream<'_> {
        Box::pin(stream::iter(images).then(move |image| self.describe(image, self.prompt.clone())))
    }

    fn annotate_with_context(&self, pairs: Vec<(DynamicImage, String)>) -> DescriptionStream<'_> {
        Box::pin(stream::iter(pairs).then(move |(image, context)| {
            let prompt = context_prompt(&context, &self.prompt);
            self.describe(image, prompt)
        }))
    }
}

fn build_payload(
    image_base64: &str,
    prompt: &str,
    params: &serde_json::Map<String, serde_json::Value>,
) -> serde_json::Value {
    let messages = json!([{
        "role": "user",
        "content": [
            {"type": "text", "text": prompt},
            {"type": "image", "image": {"data": image_base64}},
        ],
    }]);

    let mut body = serde_json::Map::new();
    body.insert("messages".to_string(), messages);
    with_params(body, params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_layout() {
        let mut params = serde_json::Map::new();
        params.insert("model_id".into(), json!("meta-llama/Llama-3.2-11B-Vision-Instruct"));
        let body = build_payload("iVBORw0KGgo=", "Describe.", &params);

        let content = &body["messages"][0]["content"];
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[0]["text"], "Describe.");
        assert_eq!(content[1]["type"], "image");
        assert_eq!(content[1]["image"]["data"], "iVBORw0KGgo=");
        assert_eq!(body["model_id"], "meta-llama/Llama-3.2-11B-Vision-Instruct");
    }

    #[test]
    fn response_with_metrics_parses() {
        let raw = r#"{
            "completion_message": {
                "role": "assistant",
                "content": "\n A line chart of quarterly revenue.\n",
                "stop_reason": "end_of_turn",
                "tool_calls": []
            },
            "metrics": [
                {"metric": "prompt_tokens", "unit": null, "value": 1620},
                {"metric": "completion_tokens", "value": 12}
            ]
        }"#;
        let r: ApiResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(r.completion_message.content.trim(), "A line chart of quarterly revenue.");
        assert_eq!(r.metrics.len(), 2);
        assert_eq!(r.metrics[0].value, 1620.0);
        assert!(r.logprobs.is_none());
    }

    #[test]
    fn missing_completion_message_is_rejected() {
        let raw = r#"{"choices": []}"#;
        assert!(serde_json::from_str::<ApiResponse>(raw).is_err());
    }

    #[test]
    fn default_provenance() {
        let options = PictureDescriptionOptions::builder()
            .allow_remote(true)
            .build()
            .unwrap();
        let backend = LlamaStackBackend::new(&options, &ApiOptions::default()).unwrap();
        assert_eq!(backend.provenance(), "llama-stack");
    }
}
