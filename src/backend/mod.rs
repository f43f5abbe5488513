//! Description backends: turn pictures (optionally with context) into text.
//!
//! Every backend implements [`DescriptionBackend`]. A backend only has to
//! implement [`DescriptionBackend::annotate`]; the context-aware entry point
//! falls back to dropping the context unless the backend knows how to use
//! it.
//!
//! | Backend | Transport | Needs `allow_remote` |
//! |---------|-----------|----------------------|
//! | [`ApiBackend`] | OpenAI-compatible `/v1/chat/completions` | yes |
//! | [`LlamaStackBackend`] | llama-stack inference API | yes |
//! | [`VlmBackend`] + in-process [`VisionModel`] | none | no |
//! | [`VlmBackend`] + [`ProviderModel`] | edgequake-llm provider | yes |
//!
//! Results come back as a [`DescriptionStream`]: one item per input, in
//! input order, produced one at a time as the consumer polls. Pictures are
//! never batched into a single request (several OpenAI-compatible servers,
//! vLLM among them, reject more than one image per request) and never
//! requested concurrently, because descriptions are matched to pictures by
//! position.

pub mod api;
mod http;
pub mod llama_stack;
pub mod vlm;

pub use api::ApiBackend;
pub use llama_stack::LlamaStackBackend;
pub use vlm::{ProviderModel, VisionModel, VlmBackend};

use crate::config::{BackendOptions, PictureDescriptionOptions};
use crate::error::PicDescError;
use futures::Stream;
use image::DynamicImage;
use std::pin::Pin;
use std::sync::Arc;
use tracing::info;

/// A lazy, ordered stream of descriptions.
pub type DescriptionStream<'a> =
    Pin<Box<dyn Stream<Item = Result<String, PicDescError>> + Send + 'a>>;

/// A component that describes pictures.
pub trait DescriptionBackend: Send + Sync {
    /// Tag recorded on every annotation this backend produces.
    fn provenance(&self) -> &str;

    /// Whether this backend sends pictures off-host.
    fn requires_remote(&self) -> bool {
        false
    }

    /// Describe `images`, yielding one description per image in order.
    fn annotate(&self, images: Vec<DynamicImage>) -> DescriptionStream<'_>;

    /// Describe pictures paired with their surrounding-text context.
    ///
    /// The default ignores the context.
    fn annotate_with_context(&self, pairs: Vec<(DynamicImage, String)>) -> DescriptionStream<'_> {
        self.annotate(pairs.into_iter().map(|(image, _)| image).collect())
    }
}

/// Refuse to build a network-bound backend unless remote access was granted.
///
/// Disabled options are never checked: a disabled stage contacts nothing.
pub fn ensure_remote_allowed(options: &PictureDescriptionOptions) -> Result<(), PicDescError> {
    if options.enabled && !options.allow_remote {
        return Err(PicDescError::remote_not_allowed());
    }
    Ok(())
}

/// Build the backend selected by `options.backend`.
///
/// Returns `Ok(None)` when the stage is disabled.
pub fn build_backend(
    options: &PictureDescriptionOptions,
) -> Result<Option<Arc<dyn DescriptionBackend>>, PicDescError> {
    if !options.enabled {
        info!("Picture description disabled; no backend built");
        return Ok(None);
    }

    let backend: Arc<dyn DescriptionBackend> = match &options.backend {
        BackendOptions::Api(api) => Arc::new(ApiBackend::new(options, api)?),
        BackendOptions::LlamaStack(api) => Arc::new(LlamaStackBackend::new(options, api)?),
        BackendOptions::Provider(provider) => {
            // Gate before resolving the provider so nothing is contacted.
            ensure_remote_allowed(options)?;
            let model = ProviderModel::from_options(provider)?;
            Arc::new(VlmBackend::new(Arc::new(model), options)?)
        }
    };

    info!("Picture description backend: {}", backend.provenance());
    Ok(Some(backend))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiOptions, ProviderOptions};
    use futures::{stream, StreamExt};

    struct EchoBackend;

    impl DescriptionBackend for EchoBackend {
        fn provenance(&self) -> &str {
            "echo"
        }

        fn annotate(&self, images: Vec<DynamicImage>) -> DescriptionStream<'_> {
            Box::pin(stream::iter(
                images
                    .into_iter()
                    .map(|img| Ok::<_, PicDescError>(format!("{}x{}", img.width(), img.height()))),
            ))
        }
    }

    #[test]
    fn default_context_method_drops_context() {
        let pairs = vec![
            (DynamicImage::new_rgb8(2, 3), "ignored".to_string()),
            (DynamicImage::new_rgb8(4, 5), "also ignored".to_string()),
        ];
        let out: Vec<String> = tokio_test::block_on(
            EchoBackend
                .annotate_with_context(pairs)
                .map(|r| r.unwrap())
                .collect(),
        );
        assert_eq!(out, vec!["2x3", "4x5"]);
    }

    #[test]
    fn disabled_options_build_nothing() {
        let options = PictureDescriptionOptions::builder()
            .enabled(false)
            .build()
            .unwrap();
        assert!(build_backend(&options).unwrap().is_none());
        assert!(ensure_remote_allowed(&options).is_ok());
    }

    #[test]
    fn remote_backends_require_permission() {
        for backend in [
            BackendOptions::Api(ApiOptions::default()),
            BackendOptions::LlamaStack(ApiOptions::default()),
            BackendOptions::Provider(ProviderOptions::default()),
        ] {
            let options = PictureDescriptionOptions::builder()
                .backend(backend)
                .build()
                .unwrap();
            let err = build_backend(&options).err().expect("gate must fail");
            assert!(matches!(err, PicDescError::OperationNotAllowed(_)));
        }
    }

    #[test]
    fn api_backend_built_when_allowed() {
        let options = PictureDescriptionOptions::builder()
            .allow_remote(true)
            .backend(BackendOptions::Api(
                ApiOptions::default().param("model", "smolvlm"),
            ))
            .build()
            .unwrap();
        let backend = build_backend(&options).unwrap().expect("enabled");
        assert_eq!(backend.provenance(), "smolvlm");
        assert!(backend.requires_remote());
    }
}
