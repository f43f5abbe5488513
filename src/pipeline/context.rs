//! Context window: text fragments immediately around a picture.
//!
//! A chart titled "Figure 3" is described far better when the model also
//! sees the paragraph that introduces it. The extractor walks the flattened
//! item stream once, in two modes:
//!
//! ```text
//!   T1  T2  T3  [PIC]  T4  T5  T6
//!   ─── before ───┘     └─ after ─▶ stop once `after` fragments collected
//! ```
//!
//! Before the picture every non-blank text is kept (the window is applied at
//! the end, keeping the *last* `before` entries). After the picture at most
//! `after` fragments are collected and the scan stops as soon as the cap is
//! reached, so the remainder of a long document is never visited.

use crate::document::{Document, PictureItem};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    CollectingBefore,
    CollectingAfter,
}

/// Collects up to `before` preceding and `after` following text fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextWindowExtractor {
    before: usize,
    after: usize,
}

impl ContextWindowExtractor {
    pub fn new(before: usize, after: usize) -> Self {
        Self { before, after }
    }

    /// Whether any context would be collected at all.
    pub fn is_active(&self) -> bool {
        self.before > 0 || self.after > 0
    }

    /// Build the newline-joined context string for `picture`.
    ///
    /// If the picture is not part of `doc` only before-text is returned.
    /// Fewer fragments than requested is not an error.
    pub fn extract(&self, doc: &Document, picture: &PictureItem) -> String {
        debug!("Getting surrounding text for picture {}", picture.self_ref);

        let mut before_buf: Vec<&str> = Vec::new();
        let mut after_buf: Vec<&str> = Vec::with_capacity(self.after);
        let mut mode = Mode::CollectingBefore;

        for item in doc.iterate_items() {
            if mode == Mode::CollectingBefore
                && item.as_picture().is_some_and(|p| p.self_ref == picture.self_ref)
            {
                mode = Mode::CollectingAfter;
            } else if let Some(text) = item.text_value().map(str::trim).filter(|t| !t.is_empty()) {
                match mode {
                    Mode::CollectingBefore => before_buf.push(text),
                    Mode::CollectingAfter => after_buf.push(text),
                }
            }

            if mode == Mode::CollectingAfter && after_buf.len() >= self.after {
                break;
            }
        }

        let skip = before_buf.len().saturating_sub(self.before);
        debug!("Context before picture: {:?}", &before_buf[skip..]);
        debug!("Context after picture: {:?}", after_buf);

        before_buf[skip..]
            .iter()
            .chain(after_buf.iter())
            .copied()
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocItem, GroupItem, TableItem};

    fn pic(n: usize) -> PictureItem {
        PictureItem::new(format!("#/pictures/{n}"))
    }

    fn sample_doc() -> Document {
        let mut doc = Document::new("ctx");
        doc.push(DocItem::text("#/texts/0", "T1"))
            .push(DocItem::text("#/texts/1", "T2"))
            .push(DocItem::text("#/texts/2", "T3"))
            .push(DocItem::Picture(pic(0)))
            .push(DocItem::text("#/texts/3", "T4"))
            .push(DocItem::text("#/texts/4", "T5"));
        doc
    }

    #[test]
    fn last_before_and_first_after() {
        let ctx = ContextWindowExtractor::new(2, 1).extract(&sample_doc(), &pic(0));
        assert_eq!(ctx, "T2\nT3\nT4");
    }

    #[test]
    fn windows_larger_than_available_text() {
        let ctx = ContextWindowExtractor::new(10, 10).extract(&sample_doc(), &pic(0));
        assert_eq!(ctx, "T1\nT2\nT3\nT4\nT5");
    }

    #[test]
    fn before_only() {
        let ctx = ContextWindowExtractor::new(1, 0).extract(&sample_doc(), &pic(0));
        assert_eq!(ctx, "T3");
    }

    #[test]
    fn after_only() {
        let ctx = ContextWindowExtractor::new(0, 2).extract(&sample_doc(), &pic(0));
        assert_eq!(ctx, "T4\nT5");
    }

    #[test]
    fn picture_not_found_uses_before_text_only() {
        let ctx = ContextWindowExtractor::new(2, 3).extract(&sample_doc(), &pic(42));
        assert_eq!(ctx, "T4\nT5");
    }

    #[test]
    fn blank_and_non_text_items_are_skipped_and_trimmed() {
        let mut doc = Document::new("ctx");
        doc.push(DocItem::text("#/texts/0", "  Intro  "))
            .push(DocItem::text("#/texts/1", "   "))
            .push(DocItem::Group(GroupItem {
                self_ref: "#/groups/0".into(),
                name: "list".into(),
            }))
            .push(DocItem::Picture(pic(0)))
            .push(DocItem::Table(TableItem {
                self_ref: "#/tables/0".into(),
                prov: vec![],
            }))
            .push(DocItem::text("#/texts/2", ""))
            .push(DocItem::text("#/texts/3", "\tCaption\n"));

        let ctx = ContextWindowExtractor::new(5, 1).extract(&doc, &pic(0));
        assert_eq!(ctx, "Intro\nCaption");
    }

    #[test]
    fn other_pictures_do_not_switch_mode() {
        let mut doc = Document::new("ctx");
        doc.push(DocItem::text("#/texts/0", "A"))
            .push(DocItem::Picture(pic(0)))
            .push(DocItem::text("#/texts/1", "B"))
            .push(DocItem::Picture(pic(1)))
            .push(DocItem::text("#/texts/2", "C"));

        let ctx = ContextWindowExtractor::new(2, 1).extract(&doc, &pic(1));
        assert_eq!(ctx, "A\nB\nC");
    }

    #[test]
    fn is_active_reflects_window_sizes() {
        assert!(!ContextWindowExtractor::new(0, 0).is_active());
        assert!(ContextWindowExtractor::new(0, 1).is_active());
        assert!(ContextWindowExtractor::new(3, 0).is_active());
    }
}
