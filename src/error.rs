//! Error types raised at collaborator boundaries
//!
//! Window calculation and visibility resolution never fail; every error here
//! originates in a document source or an annotation store.

/// The document source could not parse its input.
#[derive(Debug, thiserror::Error)]
#[error("unable to decode document: {detail}")]
pub struct DecodeError {
    pub detail: String,
}

impl DecodeError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

/// A geometry-only page query failed.
#[derive(Debug, thiserror::Error)]
#[error("geometry query for page {page} failed: {detail}")]
pub struct GeometryError {
    pub page: usize,
    pub detail: String,
}

impl GeometryError {
    pub fn new(page: usize, detail: impl Into<String>) -> Self {
        Self {
            page,
            detail: detail.into(),
        }
    }
}

/// Rasterizing a page failed.
#[derive(Debug, thiserror::Error)]
#[error("rendering page {page} failed: {detail}")]
pub struct RenderError {
    pub page: usize,
    pub detail: String,
}

impl RenderError {
    pub fn new(page: usize, detail: impl Into<String>) -> Self {
        Self {
            page,
            detail: detail.into(),
        }
    }
}

/// The annotation store rejected or failed a call.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("{what} not found")]
    NotFound { what: String },

    #[error("store unavailable: {detail}")]
    Unavailable { detail: String },

    #[error("store I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("store format: {0}")]
    Format(#[from] serde_yaml::Error),
}

impl PersistenceError {
    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self::Unavailable {
            detail: detail.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }
}

/// Errors that end a reader session.
///
/// Render and store failures never reach this type: the session keeps the
/// page as a placeholder or rolls the annotation back and raises a notification.
#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
}
