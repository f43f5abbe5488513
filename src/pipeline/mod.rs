//! Pure, per-picture stages that run before a backend is called.
//!
//! ## Data Flow
//!
//! ```text
//! batch ──▶ filter ──▶ context ──▶ backend ──▶ zip onto pictures
//!          (area)     (text window)  (VLM)
//! ```
//!
//! 1. [`filter`]: drop pictures covering too little of their page
//! 2. [`context`]: collect the surrounding text window for a picture
//! 3. [`encode`]: PNG/base64 helpers shared by every backend
//!
//! Backends live in [`crate::backend`]; the orchestration that ties the
//! stages together lives in [`crate::describe`].

pub mod context;
pub mod encode;
pub mod filter;

pub use context::ContextWindowExtractor;
pub use filter::RelevanceFilter;
