//! Error types for the edgequake-picdesc library.
//!
//! Unlike page conversion, picture description has no notion of partial
//! success inside a batch: a backend failure aborts the remainder of the
//! batch and surfaces as `Err(PicDescError)` on the result stream. Pictures
//! from batches that completed earlier keep their annotations.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the edgequake-picdesc library.
#[derive(Debug, Error)]
pub enum PicDescError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// A backend needs network access but remote services were not enabled.
    #[error("{0}")]
    OperationNotAllowed(String),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Backend errors ────────────────────────────────────────────────────
    /// The description endpoint answered with a non-success status.
    #[error("API returned HTTP {status}: {body}")]
    ApiStatus { status: u16, body: String },

    /// The request exceeded the configured timeout.
    #[error("API call to '{url}' timed out after {secs}s")]
    ApiTimeout { url: String, secs: u64 },

    /// The request could not be sent or the body could not be read.
    #[error("Failed to call '{url}': {reason}")]
    Transport { url: String, reason: String },

    /// The endpoint answered 2xx but the body did not match the expected schema.
    #[error("Malformed API response: {0}")]
    MalformedResponse(String),

    /// No usable edgequake-llm provider could be resolved.
    #[error("LLM provider '{provider}' is not configured: {hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The vision model failed to produce a description.
    #[error("Vision model error: {0}")]
    Model(String),

    // ── Image errors ──────────────────────────────────────────────────────
    #[error("Failed to encode picture: {0}")]
    ImageEncode(String),

    #[error("Failed to decode picture: {0}")]
    ImageDecode(String),

    // ── Data-shape errors ─────────────────────────────────────────────────
    /// A batch element was built from a document item that is not a picture.
    #[error("Item '{self_ref}' is not a picture")]
    NotAPicture { self_ref: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not read or parse a document file.
    #[error("Failed to load document '{path}': {reason}")]
    DocumentLoad { path: PathBuf, reason: String },

    /// Could not create or write the output document file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PicDescError {
    /// The error raised when a remote backend is built without
    /// `allow_remote`.
    pub fn remote_not_allowed() -> Self {
        PicDescError::OperationNotAllowed(
            "Connections to remote services is only allowed when set explicitly. \
             Set allow_remote = true (CLI: --allow-remote)."
                .to_string(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_status_display() {
        let e = PicDescError::ApiStatus {
            status: 503,
            body: "model is loading".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("503"), "got: {msg}");
        assert!(msg.contains("model is loading"), "got: {msg}");
    }

    #[test]
    fn remote_not_allowed_mentions_flag() {
        let e = PicDescError::remote_not_allowed();
        assert!(matches!(e, PicDescError::OperationNotAllowed(_)));
        assert!(e.to_string().contains("allow_remote"));
    }

    #[test]
    fn api_timeout_display() {
        let e = PicDescError::ApiTimeout {
            url: "http://localhost:8000/v1/chat/completions".into(),
            secs: 20,
        };
        assert!(e.to_string().contains("20s"));
        assert!(e.to_string().contains("localhost:8000"));
    }

    #[test]
    fn not_a_picture_display() {
        let e = PicDescError::NotAPicture {
            self_ref: "#/texts/3".into(),
        };
        assert!(e.to_string().contains("#/texts/3"));
    }
}
