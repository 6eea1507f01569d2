//! Source acquisition
//!
//! Resolves a [`SourceKind`] into raw encoded bytes. This stage does I/O
//! only; it never inspects image content. Every failure is an
//! `ImageFetch` error carrying the reference's display form, and an
//! optional deadline bounds the path and URL suspension points.

use crate::error::MatteError;
use crate::source::SourceKind;
use reqwest::Client;
use std::path::Path;
use std::time::Duration;

/// Fetches source bytes from paths, URLs and in-memory buffers
#[derive(Debug, Clone)]
pub struct ImageLoader {
    client: Client,
}

impl ImageLoader {
    /// Create a loader with a shared HTTP client
    ///
    /// # Errors
    ///
    /// Fails when the HTTP client cannot be built.
    pub fn new() -> Result<Self, MatteError> {
        let client = Client::builder()
            .build()
            .map_err(|e| MatteError::fetch("loader", format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Resolve a source into its raw encoded bytes
    ///
    /// # Errors
    ///
    /// Returns `MatteError::ImageFetch` when the file is unreadable, the URL
    /// request fails or returns a non-success status, or the deadline
    /// elapses. Buffer sources cannot fail here; bad content is caught by
    /// the decoder.
    pub async fn load(
        &self,
        kind: &SourceKind,
        deadline: Option<Duration>,
    ) -> Result<Vec<u8>, MatteError> {
        let reference = kind.display_name();
        match kind {
            SourceKind::Buffer(bytes) => Ok(bytes.clone()),
            SourceKind::Path(path) => {
                Self::bounded(deadline, &reference, self.read_path(path, &reference)).await
            },
            SourceKind::Url(url) => {
                Self::bounded(deadline, &reference, self.fetch_url(url, &reference)).await
            },
        }
    }

    async fn read_path(&self, path: &Path, reference: &str) -> Result<Vec<u8>, MatteError> {
        tokio::fs::read(path)
            .await
            .map_err(|e| MatteError::fetch(reference, e.to_string()))
    }

    async fn fetch_url(&self, url: &str, reference: &str) -> Result<Vec<u8>, MatteError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MatteError::fetch(reference, e.to_string()))?;

        if !response.status().is_success() {
            return Err(MatteError::fetch(
                reference,
                format!("HTTP {}", response.status()),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| MatteError::fetch(reference, format!("failed to read body: {e}")))?;

        log::debug!("Fetched {} bytes from {reference}", bytes.len());
        Ok(bytes.to_vec())
    }

    async fn bounded<F>(
        deadline: Option<Duration>,
        reference: &str,
        fetch: F,
    ) -> Result<Vec<u8>, MatteError>
    where
        F: std::future::Future<Output = Result<Vec<u8>, MatteError>>,
    {
        match deadline {
            Some(limit) => match tokio::time::timeout(limit, fetch).await {
                Ok(result) => result,
                Err(_) => Err(MatteError::fetch(
                    reference,
                    format!("fetch exceeded deadline of {:.1}s", limit.as_secs_f32()),
                )),
            },
            None => fetch.await,
        }
    }
}
