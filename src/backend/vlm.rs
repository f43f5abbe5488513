//! Model-backed description: an opaque [`VisionModel`] behind a prompt.
//!
//! [`VlmBackend`] owns prompt handling (merging context into the base
//! prompt, trimming the answer) and drives the model one picture at a time.
//! The model itself is a capability: an in-process runtime (candle, ort,
//! llama.cpp bindings, …) implements [`VisionModel`] and is shared read-only
//! through an `Arc`. This crate ships one implementation, [`ProviderModel`],
//! which routes pictures to an edgequake-llm provider.
//!
//! A model instance shared across concurrent describers must serialise its
//! own inference if the runtime requires it; `VlmBackend` adds no locking.

use super::{ensure_remote_allowed, DescriptionBackend, DescriptionStream};
use crate::config::{PictureDescriptionOptions, ProviderOptions};
use crate::error::PicDescError;
use crate::pipeline::encode;
use crate::prompts::context_prompt;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use image::DynamicImage;
use std::sync::Arc;
use tracing::debug;

/// Default model used when a provider is named without a model.
const DEFAULT_PROVIDER_MODEL: &str = "gpt-4.1-nano";

/// A vision-language model that answers a prompt about one picture.
pub trait VisionModel: Send + Sync {
    /// Identifier recorded as annotation provenance (e.g. a repo id).
    fn name(&self) -> &str;

    /// Whether inference leaves the host.
    fn requires_remote(&self) -> bool {
        false
    }

    /// Generate a response for `image` under `prompt`.
    fn describe<'a>(
        &'a self,
        image: &'a DynamicImage,
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<String, PicDescError>>;
}

/// Describes pictures with a [`VisionModel`].
pub struct VlmBackend {
    model: Arc<dyn VisionModel>,
    prompt: String,
}

impl VlmBackend {
    /// Wrap `model`. Remote models are subject to the `allow_remote` gate.
    pub fn new(
        model: Arc<dyn VisionModel>,
        options: &PictureDescriptionOptions,
    ) -> Result<Self, PicDescError> {
        if model.requires_remote() {
            ensure_remote_allowed(options)?;
        }
        Ok(Self {
            model,
            prompt: options.prompt.clone(),
        })
    }

    async fn run(&self, image: DynamicImage, prompt: String) -> Result<String, PicDescError> {
        let text = self.model.describe(&image, &prompt).await?;
        Ok(text.trim().to_string())
    }
}

impl DescriptionBackend for VlmBackend {
    fn provenance(&self) -> &str {
        self.model.name()
    }

    fn requires_remote(&self) -> bool {
        self.model.requires_remote()
    }

    fn annotate(&self, images: Vec<DynamicImage>) -> DescriptionStream<'_> {
        Box::pin(stream::iter(images).then(move |image| self.run(image, self.prompt.clone())))
    }

    fn annotate_with_context(&self, pairs: Vec<(DynamicImage, String)>) -> DescriptionStream<'_> {
        Box::pin(stream::iter(pairs).then(move |(image, context)| {
            let prompt = context_prompt(&context, &self.prompt);
            self.run(image, prompt)
        }))
    }
}

// ── edgequake-llm provider ───────────────────────────────────────────────

/// A [`VisionModel`] backed by an edgequake-llm provider.
///
/// Each picture is sent as a single user turn carrying the prompt and the
/// PNG attachment. Providers are network-bound, so this model always
/// requires `allow_remote`.
pub struct ProviderModel {
    provider: Arc<dyn LLMProvider>,
    name: String,
    temperature: f32,
    max_tokens: usize,
}

impl ProviderModel {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        name: impl Into<String>,
        options: &ProviderOptions,
    ) -> Self {
        Self {
            provider,
            name: name.into(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        }
    }

    /// Resolve the provider named in `options`, or auto-detect one.
    ///
    /// Resolution order: explicit `provider_name`, then
    /// `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, then `OPENAI_API_KEY`,
    /// then [`ProviderFactory::from_env`].
    pub fn from_options(options: &ProviderOptions) -> Result<Self, PicDescError> {
        if let Some(ref name) = options.provider_name {
            let model = options.model.as_deref().unwrap_or(DEFAULT_PROVIDER_MODEL);
            let provider = create_vision_provider(name, model)?;
            return Ok(Self::new(provider, format!("{name}/{model}"), options));
        }

        if let (Ok(prov), Ok(model)) = (
            std::env::var("EDGEQUAKE_LLM_PROVIDER"),
            std::env::var("EDGEQUAKE_MODEL"),
        ) {
            if !prov.is_empty() && !model.is_empty() {
                let provider = create_vision_provider(&prov, &model)?;
                return Ok(Self::new(provider, format!("{prov}/{model}"), options));
            }
        }

        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.is_empty() {
                let model = options.model.as_deref().unwrap_or(DEFAULT_PROVIDER_MODEL);
                let provider = create_vision_provider("openai", model)?;
                return Ok(Self::new(provider, format!("openai/{model}"), options));
            }
        }

        let (provider, _) =
            ProviderFactory::from_env().map_err(|e| PicDescError::ProviderNotConfigured {
                provider: "auto".to_string(),
                hint: format!(
                    "No LLM provider could be auto-detected from environment. \
                     Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or pass --provider. Error: {e}"
                ),
            })?;
        Ok(Self::new(provider, "edgequake-llm", options))
    }

    fn build_options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

impl VisionModel for ProviderModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires_remote(&self) -> bool {
        true
    }

    fn describe<'a>(
        &'a self,
        image: &'a DynamicImage,
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<String, PicDescError>> {
        Box::pin(async move {
            let messages = vec![ChatMessage::user_with_images(
                prompt,
                vec![encode::to_image_data(image)?],
            )];
            let options = self.build_options();

            let response = self
                .provider
                .chat(&messages, Some(&options))
                .await
                .map_err(|e| PicDescError::Model(e.to_string()))?;

            debug!(
                "{}: {} input tokens, {} output tokens",
                self.name, response.prompt_tokens, response.completion_tokens
            );
            Ok(response.content)
        })
    }
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, PicDescError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        PicDescError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: e.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use std::sync::Mutex;

    /// Records every prompt and answers with the picture's width.
    struct RecordingModel {
        prompts: Mutex<Vec<String>>,
        remote: bool,
    }

    impl RecordingModel {
        fn new(remote: bool) -> Arc<Self> {
            Arc::new(Self {
                prompts: Mutex::new(Vec::new()),
                remote,
            })
        }
    }

    impl VisionModel for RecordingModel {
        fn name(&self) -> &str {
            "recording-vlm"
        }

        fn requires_remote(&self) -> bool {
            self.remote
        }

        fn describe<'a>(
            &'a self,
            image: &'a DynamicImage,
            prompt: &'a str,
        ) -> BoxFuture<'a, Result<String, PicDescError>> {
            Box::pin(async move {
                self.prompts.lock().unwrap().push(prompt.to_string());
                Ok(format!("  width {}\n", image.width()))
            })
        }
    }

    fn options() -> PictureDescriptionOptions {
        PictureDescriptionOptions::builder()
            .prompt("Describe.")
            .build()
            .unwrap()
    }

    #[test]
    fn local_model_needs_no_remote_permission() {
        let backend = VlmBackend::new(RecordingModel::new(false), &options()).unwrap();
        assert!(!backend.requires_remote());
        assert_eq!(backend.provenance(), "recording-vlm");
    }

    #[test]
    fn remote_model_is_gated() {
        let err = VlmBackend::new(RecordingModel::new(true), &options())
            .err()
            .expect("gate must fail");
        assert!(matches!(err, PicDescError::OperationNotAllowed(_)));
    }

    #[test]
    fn answers_are_trimmed_and_ordered() {
        let backend = VlmBackend::new(RecordingModel::new(false), &options()).unwrap();
        let images = vec![DynamicImage::new_rgb8(3, 1), DynamicImage::new_rgb8(7, 1)];
        let out: Vec<String> =
            tokio_test::block_on(backend.annotate(images).try_collect()).unwrap();
        assert_eq!(out, vec!["width 3", "width 7"]);
    }

    #[test]
    fn context_is_merged_into_prompt() {
        let model = RecordingModel::new(false);
        let backend = VlmBackend::new(model.clone(), &options()).unwrap();
        let pairs = vec![
            (DynamicImage::new_rgb8(1, 1), "Figure 1: revenue".to_string()),
            (DynamicImage::new_rgb8(1, 1), String::new()),
        ];
        let _: Vec<String> =
            tokio_test::block_on(backend.annotate_with_context(pairs).try_collect()).unwrap();

        let prompts = model.prompts.lock().unwrap();
        assert_eq!(
            prompts[0],
            "Figure 1: revenue\n\nDescribe.\nConsider the text context provided above when describing the image."
        );
        assert_eq!(prompts[1], "Describe.");
    }

    #[test]
    fn nothing_runs_until_polled() {
        let model = RecordingModel::new(false);
        let backend = VlmBackend::new(model.clone(), &options()).unwrap();
        let stream = backend.annotate(vec![DynamicImage::new_rgb8(1, 1)]);
        assert!(model.prompts.lock().unwrap().is_empty());
        drop(stream);
        assert!(model.prompts.lock().unwrap().is_empty());
    }
}
