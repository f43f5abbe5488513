//! Configuration types for picture description.
//!
//! All behaviour is controlled through [`PictureDescriptionOptions`], built
//! via its [`PictureDescriptionOptionsBuilder`]. Options are constructed once
//! per pipeline run and are immutable afterwards; backends copy what they
//! need at construction time.
//!
//! # Example
//! ```rust
//! use edgequake_picdesc::{ApiOptions, BackendOptions, PictureDescriptionOptions};
//!
//! let options = PictureDescriptionOptions::builder()
//!     .allow_remote(true)
//!     .text_window(2, 1)
//!     .picture_area_threshold(0.05)
//!     .backend(BackendOptions::Api(
//!         ApiOptions::new("http://localhost:8000/v1/chat/completions")
//!             .param("model", "granite3.2-vision:2b"),
//!     ))
//!     .build()
//!     .unwrap();
//! assert!(options.uses_context());
//! ```

use crate::error::PicDescError;
use crate::progress::ProgressCallback;
use crate::prompts::DEFAULT_PROMPT;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Default OpenAI-compatible endpoint (vLLM / Ollama / LM Studio style).
pub const DEFAULT_API_URL: &str = "http://localhost:8000/v1/chat/completions";

/// Options shared by every backend.
#[derive(Clone)]
pub struct PictureDescriptionOptions {
    /// Master switch. When false every picture passes through untouched and
    /// no backend is built. Default: true.
    pub enabled: bool,

    /// Pipeline-wide permission to contact remote services. Default: false.
    ///
    /// Backends that need the network refuse to be constructed without it,
    /// so a document is never sent off-host by accident.
    pub allow_remote: bool,

    /// Base prompt sent with every picture. Default: [`DEFAULT_PROMPT`].
    pub prompt: String,

    /// Number of text fragments before the picture used as context. Default: 0.
    pub text_window_before: usize,

    /// Number of text fragments after the picture used as context. Default: 0.
    pub text_window_after: usize,

    /// Minimum fraction of the page a picture must cover. Range 0–1. Default: 0.05.
    pub picture_area_threshold: f64,

    /// Pictures submitted per `process` call by `describe_document`. Default: 8.
    pub batch_size: usize,

    /// Which backend to build.
    pub backend: BackendOptions,

    /// Optional progress events for `describe_document`.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PictureDescriptionOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            allow_remote: false,
            prompt: DEFAULT_PROMPT.to_string(),
            text_window_before: 0,
            text_window_after: 0,
            picture_area_threshold: 0.05,
            batch_size: 8,
            backend: BackendOptions::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PictureDescriptionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PictureDescriptionOptions")
            .field("enabled", &self.enabled)
            .field("allow_remote", &self.allow_remote)
            .field("prompt", &self.prompt)
            .field("text_window_before", &self.text_window_before)
            .field("text_window_after", &self.text_window_after)
            .field("picture_area_threshold", &self.picture_area_threshold)
            .field("batch_size", &self.batch_size)
            .field("backend", &self.backend)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn DescriptionProgressCallback>"),
            )
            .finish()
    }
}

impl PictureDescriptionOptions {
    /// Create a new builder for `PictureDescriptionOptions`.
    pub fn builder() -> PictureDescriptionOptionsBuilder {
        PictureDescriptionOptionsBuilder {
            options: Self::default(),
        }
    }

    /// True when either context window is non-zero.
    pub fn uses_context(&self) -> bool {
        self.text_window_before > 0 || self.text_window_after > 0
    }
}

/// Builder for [`PictureDescriptionOptions`].
#[derive(Debug)]
pub struct PictureDescriptionOptionsBuilder {
    options: PictureDescriptionOptions,
}

impl PictureDescriptionOptionsBuilder {
    pub fn enabled(mut self, v: bool) -> Self {
        self.options.enabled = v;
        self
    }

    pub fn allow_remote(mut self, v: bool) -> Self {
        self.options.allow_remote = v;
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.options.prompt = prompt.into();
        self
    }

    pub fn text_window_before(mut self, n: usize) -> Self {
        self.options.text_window_before = n;
        self
    }

    pub fn text_window_after(mut self, n: usize) -> Self {
        self.options.text_window_after = n;
        self
    }

    /// Set both context windows at once.
    pub fn text_window(self, before: usize, after: usize) -> Self {
        self.text_window_before(before).text_window_after(after)
    }

    pub fn picture_area_threshold(mut self, fraction: f64) -> Self {
        self.options.picture_area_threshold = fraction;
        self
    }

    pub fn batch_size(mut self, n: usize) -> Self {
        self.options.batch_size = n;
        self
    }

    pub fn backend(mut self, backend: BackendOptions) -> Self {
        self.options.backend = backend;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.options.progress_callback = Some(cb);
        self
    }

    /// Build the options, validating constraints.
    pub fn build(self) -> Result<PictureDescriptionOptions, PicDescError> {
        let o = &self.options;
        if !o.picture_area_threshold.is_finite()
            || !(0.0..=1.0).contains(&o.picture_area_threshold)
        {
            return Err(PicDescError::InvalidConfig(format!(
                "picture_area_threshold must be within 0–1, got {}",
                o.picture_area_threshold
            )));
        }
        if o.batch_size == 0 {
            return Err(PicDescError::InvalidConfig("batch_size must be ≥ 1".into()));
        }
        if o.prompt.trim().is_empty() {
            return Err(PicDescError::InvalidConfig("prompt must not be empty".into()));
        }
        match &o.backend {
            BackendOptions::Api(api) | BackendOptions::LlamaStack(api) => api.validate()?,
            BackendOptions::Provider(_) => {}
        }
        Ok(self.options)
    }
}

// ── Backend options ──────────────────────────────────────────────────────

/// Selects the backend built by [`crate::backend::build_backend`].
///
/// An in-process model is not configured here: wrap it in
/// [`crate::backend::VlmBackend`] and pass it to
/// [`crate::describe::PictureDescriber::with_backend`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendOptions {
    /// OpenAI-compatible chat-completions endpoint.
    Api(ApiOptions),
    /// llama-stack inference endpoint.
    LlamaStack(ApiOptions),
    /// An edgequake-llm provider (OpenAI, Anthropic, Gemini, Ollama, …).
    Provider(ProviderOptions),
}

impl Default for BackendOptions {
    fn default() -> Self {
        BackendOptions::Api(ApiOptions::default())
    }
}

/// Connection settings for the HTTP backends.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiOptions {
    /// Endpoint receiving one POST per picture.
    pub url: String,

    /// Extra request headers (e.g. `Authorization`).
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Per-request timeout in seconds. Default: 20.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Backend-specific body fields forwarded verbatim (`model`, `max_tokens`, …).
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,

    /// Tag stored on each annotation. Defaults to the `model` param.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<String>,
}

fn default_timeout_secs() -> u64 {
    20
}

impl Default for ApiOptions {
    fn default() -> Self {
        Self {
            url: DEFAULT_API_URL.to_string(),
            headers: BTreeMap::new(),
            timeout_secs: default_timeout_secs(),
            params: serde_json::Map::new(),
            provenance: None,
        }
    }
}

impl fmt::Debug for ApiOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Header values routinely carry API keys.
        let header_names: Vec<&str> = self.headers.keys().map(String::as_str).collect();
        f.debug_struct("ApiOptions")
            .field("url", &self.url)
            .field("headers", &header_names)
            .field("timeout_secs", &self.timeout_secs)
            .field("params", &self.params)
            .field("provenance", &self.provenance)
            .finish()
    }
}

impl ApiOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn provenance(mut self, tag: impl Into<String>) -> Self {
        self.provenance = Some(tag.into());
        self
    }

    /// Explicit provenance, else the `model` param when it is a string.
    pub fn provenance_or(&self, fallback: &str) -> String {
        self.provenance
            .clone()
            .or_else(|| {
                self.params
                    .get("model")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| fallback.to_string())
    }

    fn validate(&self) -> Result<(), PicDescError> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(PicDescError::InvalidConfig(format!(
                "API url must be http(s), got '{}'",
                self.url
            )));
        }
        if self.timeout_secs == 0 {
            return Err(PicDescError::InvalidConfig("timeout must be ≥ 1s".into()));
        }
        Ok(())
    }
}

/// Settings for an edgequake-llm provider backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderOptions {
    /// Provider name (`openai`, `anthropic`, `gemini`, `ollama`, …).
    /// `None` auto-detects from the environment.
    #[serde(default)]
    pub provider_name: Option<String>,

    /// Model identifier. `None` uses `gpt-4.1-nano` for named providers.
    #[serde(default)]
    pub model: Option<String>,

    /// Sampling temperature. Default: 0.1.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens per description. Default: 512.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_tokens() -> usize {
    512
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            provider_name: None,
            model: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let o = PictureDescriptionOptions::default();
        assert!(o.enabled);
        assert!(!o.allow_remote);
        assert_eq!(o.prompt, DEFAULT_PROMPT);
        assert_eq!(o.picture_area_threshold, 0.05);
        assert_eq!(o.batch_size, 8);
        assert!(!o.uses_context());
        assert!(matches!(o.backend, BackendOptions::Api(ref a) if a.url == DEFAULT_API_URL));
    }

    #[test]
    fn threshold_out_of_range_rejected() {
        for bad in [-0.1, 1.5, f64::NAN] {
            let err = PictureDescriptionOptions::builder()
                .picture_area_threshold(bad)
                .build()
                .unwrap_err();
            assert!(matches!(err, PicDescError::InvalidConfig(_)), "{bad}");
        }
    }

    #[test]
    fn zero_batch_size_rejected() {
        assert!(PictureDescriptionOptions::builder().batch_size(0).build().is_err());
    }

    #[test]
    fn blank_prompt_rejected() {
        assert!(PictureDescriptionOptions::builder().prompt("  ").build().is_err());
    }

    #[test]
    fn api_url_must_be_http() {
        let err = PictureDescriptionOptions::builder()
            .backend(BackendOptions::LlamaStack(ApiOptions::new("ftp://host/x")))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("ftp://host/x"));
    }

    #[test]
    fn provenance_falls_back_to_model_param() {
        let api = ApiOptions::default().param("model", "granite3.2-vision:2b");
        assert_eq!(api.provenance_or("remote-api"), "granite3.2-vision:2b");
        assert_eq!(
            api.clone().provenance("my-tag").provenance_or("remote-api"),
            "my-tag"
        );
        assert_eq!(ApiOptions::default().provenance_or("remote-api"), "remote-api");
    }

    #[test]
    fn debug_hides_header_values() {
        let api = ApiOptions::default().header("Authorization", "Bearer sk-secret");
        let dbg = format!("{api:?}");
        assert!(dbg.contains("Authorization"));
        assert!(!dbg.contains("sk-secret"));
    }

    #[test]
    fn backend_options_deserialise_from_json() {
        let json = r#"{"type": "api", "url": "http://vllm:8000/v1/chat/completions",
                        "params": {"model": "smolvlm", "max_tokens": 200}}"#;
        let backend: BackendOptions = serde_json::from_str(json).unwrap();
        match backend {
            BackendOptions::Api(api) => {
                assert_eq!(api.timeout_secs, 20);
                assert_eq!(api.params["max_tokens"], 200);
            }
            other => panic!("unexpected backend: {other:?}"),
        }
    }
}
