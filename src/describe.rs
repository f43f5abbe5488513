//! Picture-description orchestration.
//!
//! [`PictureDescriber::process`] is the per-batch entry point:
//!
//! ```text
//! batch ──► area filter ──► context windows ──► backend ──► zip ──► pictures
//!           (drops small)   (only if a window    (lazy,      (append one
//!                            size is non-zero)    ordered)    annotation)
//! ```
//!
//! Filtering and context extraction run eagerly when `process` is called;
//! backend requests happen only as the returned stream is polled, one
//! picture at a time. The first backend error ends the stream.
//!
//! [`PictureDescriber::describe_document`] drives `process` over every
//! picture of a [`Document`] that carries an embedded bitmap, in batches of
//! `batch_size`, and writes each yielded picture back into the document.

use crate::backend::{build_backend, ensure_remote_allowed, DescriptionBackend};
use crate::config::PictureDescriptionOptions;
use crate::document::{DocItem, Document, PictureDescriptionData, PictureItem};
use crate::error::PicDescError;
use crate::pipeline::{ContextWindowExtractor, RelevanceFilter};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use futures::stream::{self, Stream, StreamExt};
use image::DynamicImage;
use serde::Serialize;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info};

/// A lazy, ordered stream of processed pictures.
pub type PictureStream<'a> =
    Pin<Box<dyn Stream<Item = Result<PictureItem, PicDescError>> + Send + 'a>>;

/// One unit of work: a picture node and its rendered bitmap.
#[derive(Debug, Clone)]
pub struct EnrichmentElement {
    pub item: PictureItem,
    pub image: DynamicImage,
}

impl EnrichmentElement {
    pub fn new(item: PictureItem, image: DynamicImage) -> Self {
        Self { item, image }
    }
}

impl TryFrom<(DocItem, DynamicImage)> for EnrichmentElement {
    type Error = PicDescError;

    fn try_from((item, image): (DocItem, DynamicImage)) -> Result<Self, Self::Error> {
        match item {
            DocItem::Picture(picture) => Ok(Self::new(picture, image)),
            other => Err(PicDescError::NotAPicture {
                self_ref: other.self_ref().to_string(),
            }),
        }
    }
}

/// Counters reported by [`PictureDescriber::describe_document`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DescriptionStats {
    /// Pictures carrying an embedded bitmap.
    pub candidates: usize,
    /// Pictures that received a new annotation.
    pub described: usize,
    /// Candidates dropped by the area filter.
    pub skipped: usize,
    /// Pictures without a bitmap; never submitted.
    pub without_image: usize,
    /// Batches submitted.
    pub batches: usize,
}

/// Describes the pictures of a document with one backend.
pub struct PictureDescriber {
    options: PictureDescriptionOptions,
    backend: Option<Arc<dyn DescriptionBackend>>,
    filter: RelevanceFilter,
    context: ContextWindowExtractor,
}

impl PictureDescriber {
    /// Build the describer and the backend selected by `options.backend`.
    ///
    /// Fails with [`PicDescError::OperationNotAllowed`] when that backend
    /// needs the network and `allow_remote` is not set.
    pub fn new(options: PictureDescriptionOptions) -> Result<Self, PicDescError> {
        let backend = build_backend(&options)?;
        Ok(Self::assemble(options, backend))
    }

    /// Use a caller-supplied backend, e.g. a [`crate::VlmBackend`] over an
    /// in-process model. The remote gate still applies.
    pub fn with_backend(
        options: PictureDescriptionOptions,
        backend: Arc<dyn DescriptionBackend>,
    ) -> Result<Self, PicDescError> {
        if backend.requires_remote() {
            ensure_remote_allowed(&options)?;
        }
        let backend = options.enabled.then_some(backend);
        Ok(Self::assemble(options, backend))
    }

    fn assemble(
        options: PictureDescriptionOptions,
        backend: Option<Arc<dyn DescriptionBackend>>,
    ) -> Self {
        Self {
            filter: RelevanceFilter::new(options.picture_area_threshold),
            context: ContextWindowExtractor::new(
                options.text_window_before,
                options.text_window_after,
            ),
            options,
            backend,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Provenance tag of the active backend; `None` when disabled.
    pub fn provenance(&self) -> Option<&str> {
        self.backend.as_deref().map(|b| b.provenance())
    }

    pub fn options(&self) -> &PictureDescriptionOptions {
        &self.options
    }

    /// Describe one batch.
    ///
    /// When disabled, every element's picture is yielded unchanged.
    /// Otherwise only pictures passing the area filter are yielded, each with
    /// one annotation appended, in batch order. The stream does not borrow
    /// `doc`.
    pub fn process<'a>(&'a self, doc: &Document, batch: Vec<EnrichmentElement>) -> PictureStream<'a> {
        let Some(backend) = self.backend.as_deref() else {
            return Box::pin(stream::iter(
                batch.into_iter().map(|e| Ok::<_, PicDescError>(e.item)),
            ));
        };

        let submitted = batch.len();
        let (items, images): (Vec<PictureItem>, Vec<DynamicImage>) = batch
            .into_iter()
            .filter(|e| self.filter.should_describe(&e.item, doc))
            .map(|e| (e.item, e.image))
            .unzip();
        debug!(
            "{} of {} pictures pass the area filter",
            items.len(),
            submitted
        );

        let descriptions = if self.context.is_active() {
            let pairs = items
                .iter()
                .zip(images)
                .map(|(item, image)| {
                    let context = self.context.extract(doc, item);
                    debug!("Context for {}: {} chars", item.self_ref, context.len());
                    (image, context)
                })
                .collect();
            backend.annotate_with_context(pairs)
        } else {
            backend.annotate(images)
        };

        let provenance = backend.provenance().to_string();
        let annotated: PictureStream<'a> = Box::pin(stream::iter(items).zip(descriptions).map(
            move |(mut item, description)| -> Result<PictureItem, PicDescError> {
                item.annotations.push(PictureDescriptionData {
                    text: description?,
                    provenance: provenance.clone(),
                });
                Ok(item)
            },
        ));

        // End after the first error without polling the backend again.
        Box::pin(stream::unfold(Some(annotated), |state| async move {
            let mut inner = state?;
            let item = inner.next().await?;
            let next = item.is_ok().then_some(inner);
            Some((item, next))
        }))
    }

    /// Describe every picture of `doc` that carries an embedded bitmap.
    ///
    /// Annotated pictures are written back as they are yielded, so on error
    /// the pictures described before the failure keep their annotation.
    pub async fn describe_document(
        &self,
        doc: &mut Document,
    ) -> Result<DescriptionStats, PicDescError> {
        let mut stats = DescriptionStats::default();
        if !self.is_enabled() {
            info!("Picture description disabled; '{}' left unchanged", doc.name);
            return Ok(stats);
        }

        let callback: ProgressCallback = self
            .options
            .progress_callback
            .clone()
            .unwrap_or_else(|| Arc::new(NoopProgressCallback));

        let mut candidates = Vec::new();
        for picture in doc.pictures() {
            if picture.image.is_some() {
                candidates.push(picture.clone());
            } else {
                debug!("{} has no embedded image; not submitted", picture.self_ref);
                stats.without_image += 1;
            }
        }
        stats.candidates = candidates.len();

        info!(
            "Describing '{}': {} pictures in batches of {} ({})",
            doc.name,
            stats.candidates,
            self.options.batch_size,
            self.provenance().unwrap_or_default()
        );
        callback.on_start(stats.candidates);

        for (batch_index, chunk) in candidates.chunks(self.options.batch_size).enumerate() {
            callback.on_batch_start(batch_index, chunk.len());

            let mut batch = Vec::with_capacity(chunk.len());
            for picture in chunk {
                if let Some(image_ref) = &picture.image {
                    batch.push(EnrichmentElement::new(picture.clone(), image_ref.load()?));
                }
            }

            let mut described = 0;
            let mut results = self.process(doc, batch);
            while let Some(picture) = results.next().await {
                let picture = picture?;
                let len = picture.annotations.last().map_or(0, |a| a.text.len());
                callback.on_picture_described(&picture.self_ref, len);
                doc.replace_picture(picture);
                described += 1;
            }

            stats.batches += 1;
            stats.described += described;
            stats.skipped += chunk.len() - described;
            callback.on_batch_complete(batch_index, chunk.len(), described);
        }

        info!(
            "Described {} of {} pictures ({} below area threshold, {} without image)",
            stats.described, stats.candidates, stats.skipped, stats.without_image
        );
        callback.on_complete(&stats);
        Ok(stats)
    }

    /// Blocking form of [`Self::describe_document`] on a private runtime.
    pub fn describe_document_sync(
        &self,
        doc: &mut Document,
    ) -> Result<DescriptionStats, PicDescError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| PicDescError::Internal(format!("Failed to create tokio runtime: {}", e)))?
            .block_on(self.describe_document(doc))
    }
}
