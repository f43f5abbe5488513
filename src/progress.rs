//! Progress-callback trait for document-level description events.
//!
//! Inject an [`Arc<dyn DescriptionProgressCallback>`] via
//! [`crate::config::PictureDescriptionOptionsBuilder::progress_callback`] to
//! receive events while [`crate::describe::PictureDescriber::describe_document`]
//! works through the document's pictures batch by batch.
//!
//! # Example
//!
//! ```rust
//! use edgequake_picdesc::{DescriptionProgressCallback, PictureDescriptionOptions};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     described: AtomicUsize,
//! }
//!
//! impl DescriptionProgressCallback for CountingCallback {
//!     fn on_picture_described(&self, self_ref: &str, description_len: usize) {
//!         let n = self.described.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{n}: {self_ref} ({description_len} chars)");
//!     }
//! }
//!
//! let options = PictureDescriptionOptions::builder()
//!     .progress_callback(Arc::new(CountingCallback { described: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::describe::DescriptionStats;
use std::sync::Arc;

/// Called by [`crate::describe::PictureDescriber::describe_document`].
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Events arrive in order on the task driving the
/// document; pictures are never described concurrently.
pub trait DescriptionProgressCallback: Send + Sync {
    /// Called once before the first batch.
    ///
    /// # Arguments
    /// * `total_candidates`: pictures carrying an image, before filtering
    fn on_start(&self, total_candidates: usize) {
        let _ = total_candidates;
    }

    /// Called before a batch is submitted.
    fn on_batch_start(&self, batch_index: usize, batch_len: usize) {
        let _ = (batch_index, batch_len);
    }

    /// Called when a picture received its description.
    fn on_picture_described(&self, self_ref: &str, description_len: usize) {
        let _ = (self_ref, description_len);
    }

    /// Called after every element of a batch was yielded.
    ///
    /// `submitted - described` pictures were dropped by the area filter.
    fn on_batch_complete(&self, batch_index: usize, submitted: usize, described: usize) {
        let _ = (batch_index, submitted, described);
    }

    /// Called once after the last batch succeeded.
    fn on_complete(&self, stats: &DescriptionStats) {
        let _ = stats;
    }
}

/// A no-op implementation; the default when no callback is configured.
pub struct NoopProgressCallback;

impl DescriptionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in
/// [`crate::config::PictureDescriptionOptions`].
pub type ProgressCallback = Arc<dyn DescriptionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        candidates: AtomicUsize,
        batches: AtomicUsize,
        described: AtomicUsize,
        skipped: AtomicUsize,
    }

    impl DescriptionProgressCallback for TrackingCallback {
        fn on_start(&self, total_candidates: usize) {
            self.candidates.store(total_candidates, Ordering::SeqCst);
        }

        fn on_batch_start(&self, _batch_index: usize, _batch_len: usize) {
            self.batches.fetch_add(1, Ordering::SeqCst);
        }

        fn on_picture_described(&self, _self_ref: &str, _description_len: usize) {
            self.described.fetch_add(1, Ordering::SeqCst);
        }

        fn on_batch_complete(&self, _batch_index: usize, submitted: usize, described: usize) {
            self.skipped
                .fetch_add(submitted - described, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_start(5);
        cb.on_batch_start(0, 5);
        cb.on_picture_described("#/pictures/0", 42);
        cb.on_batch_complete(0, 5, 4);
        cb.on_complete(&DescriptionStats::default());
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();

        tracker.on_start(3);
        tracker.on_batch_start(0, 2);
        tracker.on_picture_described("#/pictures/0", 100);
        tracker.on_batch_complete(0, 2, 1);
        tracker.on_batch_start(1, 1);
        tracker.on_picture_described("#/pictures/2", 80);
        tracker.on_batch_complete(1, 1, 1);

        assert_eq!(tracker.candidates.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.batches.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.described.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.skipped.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_start(10);
        cb.on_picture_described("#/pictures/1", 512);
    }
}
