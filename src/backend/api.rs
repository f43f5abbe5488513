//! OpenAI-compatible chat-completions backend.
//!
//! Works with any server exposing `/v1/chat/completions` with vision input:
//! vLLM, Ollama, LM Studio, llama-stack's OpenAI shim, hosted gateways.
//! One request per picture:
//!
//! ```json
//! {
//!   "messages": [{
//!     "role": "user",
//!     "content": [
//!       {"type": "image_url", "image_url": {"url": "data:image/png;base64,…"}},
//!       {"type": "text", "text": "<prompt>"}
//!     ]
//!   }],
//!   "model": "…", "max_tokens": …        ← params, forwarded verbatim
//! }
//! ```

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
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// Describes pictures through an OpenAI-compatible endpoint.
pub struct ApiBackend {
    http: RemoteClient,
    prompt: String,
    params: serde_json::Map<String, serde_json::Value>,
    provenance: String,
}

impl ApiBackend {
    /// Build the backend. Fails with [`PicDescError::OperationNotAllowed`]
    /// before any network activity when remote access was not granted.
    pub fn new(options: &PictureDescriptionOptions, api: &ApiOptions) -> Result<Self, PicDescError> {
        ensure_remote_allowed(options)?;
        Ok(Self {
            http: RemoteClient::new(api)?,
            prompt: options.prompt.clone(),
            params: api.params.clone(),
            provenance: api.provenance_or("remote-api"),
        })
    }

    async fn describe(&self, image: DynamicImage, prompt: String) -> Result<String, PicDescError> {
        let payload = build_payload(&encode::to_data_uri(&image)?, &prompt, &self.params);
        let reply: ChatCompletionResponse = self.http.post_json(&payload).await?;

        if let Some(usage) = &reply.usage {
            debug!(
                "{}: {} input tokens, {} output tokens",
                self.http.url(),
                usage.prompt_tokens,
                usage.completion_tokens
            );
        }

        reply
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .ok_or_else(|| PicDescError::MalformedResponse("response has no choices".into()))
    }
}

impl DescriptionBackend for ApiBackend {
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
    data_uri: &str,
    prompt: &str,
    params: &serde_json::Map<String, serde_json::Value>,
) -> serde_json::Value {
    let messages = json!([{
        "role": "user",
        "content": [
            {"type": "image_url", "image_url": {"url": data_uri}},
            {"type": "text", "text": prompt},
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
        params.insert("model".into(), json!("granite3.2-vision:2b"));
        let body = build_payload("data:image/png;base64,AAAA", "Describe.", &params);

        let content = &body["messages"][0]["content"];
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(content[0]["type"], "image_url");
        assert_eq!(content[0]["image_url"]["url"], "data:image/png;base64,AAAA");
        assert_eq!(content[1]["text"], "Describe.");
        assert_eq!(body["model"], "granite3.2-vision:2b");
    }

    #[test]
    fn response_parses_with_and_without_usage() {
        let with_usage = r#"{"choices":[{"message":{"role":"assistant","content":" A pie chart. "}}],
                             "usage":{"prompt_tokens":812,"completion_tokens":9,"total_tokens":821}}"#;
        let r: ChatCompletionResponse = serde_json::from_str(with_usage).unwrap();
        assert_eq!(r.choices[0].message.content, " A pie chart. ");
        assert_eq!(r.usage.unwrap().prompt_tokens, 812);

        let bare = r#"{"choices":[{"message":{"content":"x"}}]}"#;
        let r: ChatCompletionResponse = serde_json::from_str(bare).unwrap();
        assert!(r.usage.is_none());
    }

    #[test]
    fn construction_is_gated() {
        let options = PictureDescriptionOptions::default();
        let err = ApiBackend::new(&options, &ApiOptions::default())
            .err()
            .expect("allow_remote is false");
        assert!(matches!(err, PicDescError::OperationNotAllowed(_)));
    }

    #[test]
    fn disabled_stage_skips_gate() {
        let options = PictureDescriptionOptions::builder()
            .enabled(false)
            .build()
            .unwrap();
        assert!(ApiBackend::new(&options, &ApiOptions::default()).is_ok());
    }
}
