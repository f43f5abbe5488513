//! # edgequake-picdesc
//!
//! Describe the pictures of a parsed document with a vision-language model
//! and attach each description to its picture as an annotation.
//!
//! ## Why this crate?
//!
//! Converters turn figures into opaque bitmaps. Search, RAG and
//! accessibility tooling need words instead. This crate is the enrichment
//! stage that supplies them: it decides which pictures are worth
//! describing, gathers the text around each one as context, asks a backend
//! for a description and appends the answer to the document.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Document + rendered pictures
//!  │
//!  ├─ 1. Filter   drop pictures covering less than `picture_area_threshold` of their page
//!  ├─ 2. Context  last N text fragments before, first M after (optional)
//!  ├─ 3. Backend  one request per picture, strictly in order
//!  └─ 4. Merge    append {text, provenance} to each surviving picture
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_picdesc::{ApiOptions, BackendOptions, Document, PictureDescriber,
//!                         PictureDescriptionOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = PictureDescriptionOptions::builder()
//!         .allow_remote(true)
//!         .text_window(2, 1)
//!         .backend(BackendOptions::Api(
//!             ApiOptions::new("http://localhost:11434/v1/chat/completions")
//!                 .param("model", "granite3.2-vision:2b"),
//!         ))
//!         .build()?;
//!
//!     let mut doc = Document::from_json_file("report.json")?;
//!     let stats = PictureDescriber::new(options)?.describe_document(&mut doc).await?;
//!     eprintln!("described {} of {} pictures", stats.described, stats.candidates);
//!     doc.to_json_file("report.described.json")?;
//!     Ok(())
//! }
//! ```
//!
//! ## Backends
//!
//! | Backend | Selected by | Needs `allow_remote` |
//! |---------|-------------|----------------------|
//! | OpenAI-compatible API | `BackendOptions::Api` | yes |
//! | llama-stack | `BackendOptions::LlamaStack` | yes |
//! | edgequake-llm provider | `BackendOptions::Provider` | yes |
//! | in-process model | `PictureDescriber::with_backend` + [`VlmBackend`] | no |
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `picdesc` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod config;
pub mod describe;
pub mod document;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::{
    build_backend, ApiBackend, DescriptionBackend, DescriptionStream, LlamaStackBackend,
    ProviderModel, VisionModel, VlmBackend,
};
pub use config::{
    ApiOptions, BackendOptions, PictureDescriptionOptions, PictureDescriptionOptionsBuilder,
    ProviderOptions,
};
pub use describe::{DescriptionStats, EnrichmentElement, PictureDescriber, PictureStream};
pub use document::{
    BoundingBox, CoordOrigin, DocItem, Document, ImageRef, PageInfo, PictureDescriptionData,
    PictureItem, ProvenanceItem, Size,
};
pub use error::PicDescError;
pub use pipeline::{ContextWindowExtractor, RelevanceFilter};
pub use progress::{DescriptionProgressCallback, NoopProgressCallback, ProgressCallback};
