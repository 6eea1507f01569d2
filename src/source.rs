//! Per-request source references

use crate::config::MattingOptions;
use std::path::PathBuf;

/// Where the input image comes from
#[derive(Debug, Clone)]
pub enum SourceKind {
    /// Local file read from disk
    Path(PathBuf),
    /// Remote image fetched over HTTP(S)
    Url(String),
    /// In-memory bytes, passed through unchanged
    Buffer(Vec<u8>),
}

impl SourceKind {
    /// Diagnostic name used in logs and fetch errors. Buffer contents are
    /// never printed, only their length.
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            Self::Path(path) => format!("path:{}", path.display()),
            Self::Url(url) => format!("url:{url}"),
            Self::Buffer(bytes) => format!("buffer:{} bytes", bytes.len()),
        }
    }
}

/// One matting request: the input reference, its owning user, and the
/// processing options. Immutable once constructed; created per request and
/// discarded after processing.
#[derive(Debug, Clone)]
pub struct SourceReference {
    /// The input image
    pub kind: SourceKind,
    /// Identifier of the owning user, forwarded to the persistence
    /// collaborator
    pub owner_id: String,
    /// Processing options for this request
    pub options: MattingOptions,
}

impl SourceReference {
    /// Reference a local file
    #[must_use]
    pub fn from_path<P: Into<PathBuf>, O: Into<String>>(path: P, owner_id: O) -> Self {
        Self {
            kind: SourceKind::Path(path.into()),
            owner_id: owner_id.into(),
            options: MattingOptions::default(),
        }
    }

    /// Reference a remote URL
    #[must_use]
    pub fn from_url<U: Into<String>, O: Into<String>>(url: U, owner_id: O) -> Self {
        Self {
            kind: SourceKind::Url(url.into()),
            owner_id: owner_id.into(),
            options: MattingOptions::default(),
        }
    }

    /// Reference in-memory image bytes
    #[must_use]
    pub fn from_bytes<O: Into<String>>(bytes: Vec<u8>, owner_id: O) -> Self {
        Self {
            kind: SourceKind::Buffer(bytes),
            owner_id: owner_id.into(),
            options: MattingOptions::default(),
        }
    }

    /// Replace the default options
    #[must_use]
    pub fn with_options(mut self, options: MattingOptions) -> Self {
        self.options = options;
        self
    }
}
