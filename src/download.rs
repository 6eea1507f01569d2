//! Model payload fetching and on-disk caching
//!
//! Each profile maps to a single ONNX payload. The fetcher streams it into a
//! per-user cache directory with an atomic temp-file rename, so a partial
//! download never masquerades as a cached model. Every failure surfaces as
//! `MatteError::ModelLoad`; there are no retries here.

use crate::error::MatteError;
use crate::models::ProfileSpec;
use futures_util::stream::TryStreamExt;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;

/// Downloads and caches model payloads
#[derive(Debug)]
pub struct ModelFetcher {
    client: Client,
    cache_dir: PathBuf,
}

impl ModelFetcher {
    /// Create a fetcher caching under the platform cache directory
    ///
    /// # Errors
    ///
    /// Fails when the HTTP client cannot be built or no cache directory is
    /// resolvable for the current user.
    pub fn new() -> Result<Self, MatteError> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| MatteError::model_load("no cache directory available"))?
            .join("bg-matte")
            .join("models");
        Self::with_cache_dir(cache_dir)
    }

    /// Create a fetcher caching under an explicit directory
    ///
    /// # Errors
    ///
    /// Fails when the HTTP client cannot be built.
    pub fn with_cache_dir(cache_dir: PathBuf) -> Result<Self, MatteError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| MatteError::model_load(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client, cache_dir })
    }

    /// Local path a spec's payload caches to
    #[must_use]
    pub fn cached_path(&self, spec: &ProfileSpec) -> PathBuf {
        self.cache_dir.join(format!("{}.onnx", spec.name))
    }

    /// Path of the digest file recorded next to the payload
    fn digest_path(&self, spec: &ProfileSpec) -> PathBuf {
        self.cache_dir.join(format!("{}.onnx.sha256", spec.name))
    }

    /// Return the local path of the payload, downloading it if absent
    ///
    /// A cached payload is re-verified against the digest recorded at
    /// download time; a corrupt cache entry is discarded and fetched again.
    ///
    /// # Errors
    ///
    /// Returns `MatteError::ModelLoad` on network, HTTP, or filesystem
    /// failure.
    pub async fn fetch(&self, spec: &ProfileSpec) -> Result<PathBuf, MatteError> {
        let final_path = self.cached_path(spec);
        if final_path.exists() {
            if self.verify_cached(spec, &final_path).await? {
                log::debug!("Model already cached: {}", final_path.display());
                return Ok(final_path);
            }
            log::warn!(
                "Cached model failed digest verification, re-downloading: {}",
                final_path.display()
            );
            tokio::fs::remove_file(&final_path).await.map_err(|e| {
                MatteError::model_load(format!(
                    "failed to remove corrupt cache entry {}: {e}",
                    final_path.display()
                ))
            })?;
        }

        tokio::fs::create_dir_all(&self.cache_dir).await.map_err(|e| {
            MatteError::model_load(format!(
                "failed to create cache directory {}: {e}",
                self.cache_dir.display()
            ))
        })?;

        let temp_path = self.cache_dir.join(format!(".{}.partial", spec.name));
        log::info!("Downloading model {} from {}", spec.name, spec.file_url);

        match self.download_to(spec.file_url, &temp_path).await {
            Ok((bytes, digest)) => {
                tokio::fs::rename(&temp_path, &final_path).await.map_err(|e| {
                    MatteError::model_load(format!(
                        "failed to move download into cache {}: {e}",
                        final_path.display()
                    ))
                })?;
                tokio::fs::write(self.digest_path(spec), &digest)
                    .await
                    .map_err(|e| {
                        MatteError::model_load(format!("failed to record digest: {e}"))
                    })?;
                log::info!(
                    "Cached model {} ({bytes} bytes, sha256 {digest}) at {}",
                    spec.name,
                    final_path.display()
                );
                Ok(final_path)
            },
            Err(e) => {
                if temp_path.exists() {
                    if let Err(cleanup_err) = tokio::fs::remove_file(&temp_path).await {
                        log::warn!("Failed to remove partial download: {cleanup_err}");
                    }
                }
                Err(e)
            },
        }
    }

    /// Re-hash a cached payload against its recorded digest
    ///
    /// A missing digest file counts as verified; payloads cached before
    /// digest recording existed stay usable.
    async fn verify_cached(&self, spec: &ProfileSpec, path: &Path) -> Result<bool, MatteError> {
        let digest_path = self.digest_path(spec);
        if !digest_path.exists() {
            return Ok(true);
        }

        let expected = tokio::fs::read_to_string(&digest_path).await.map_err(|e| {
            MatteError::model_load(format!("failed to read recorded digest: {e}"))
        })?;
        let contents = tokio::fs::read(path).await.map_err(|e| {
            MatteError::model_load(format!(
                "failed to read cached model {}: {e}",
                path.display()
            ))
        })?;

        let actual = format!("{:x}", Sha256::digest(&contents));
        Ok(actual == expected.trim())
    }

    /// Stream a URL into a local file, returning the byte count and digest
    async fn download_to(
        &self,
        url: &str,
        local_path: &Path,
    ) -> Result<(u64, String), MatteError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MatteError::model_load(format!("failed to download {url}: {e}")))?;

        if !response.status().is_success() {
            return Err(MatteError::model_load(format!(
                "HTTP {} for {url}",
                response.status()
            )));
        }

        let mut file = tokio::fs::File::create(local_path).await.map_err(|e| {
            MatteError::model_load(format!(
                "failed to create {}: {e}",
                local_path.display()
            ))
        })?;

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut hasher = Sha256::new();
        let mut downloaded = 0u64;
        let mut buffer = vec![0u8; 8192];

        loop {
            let bytes_read = stream
                .read(&mut buffer)
                .await
                .map_err(|e| MatteError::model_load(format!("download stream failed: {e}")))?;
            if bytes_read == 0 {
                break;
            }

            let chunk = &buffer[..bytes_read];
            hasher.update(chunk);
            file.write_all(chunk).await.map_err(|e| {
                MatteError::model_load(format!(
                    "failed to write {}: {e}",
                    local_path.display()
                ))
            })?;
            downloaded += bytes_read as u64;
        }

        file.flush().await.map_err(|e| {
            MatteError::model_load(format!("failed to flush {}: {e}", local_path.display()))
        })?;

        let digest = format!("{:x}", hasher.finalize());
        log::debug!("Downloaded {downloaded} bytes, sha256 {digest}");
        Ok((downloaded, digest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelProfile;
    use tempfile::TempDir;

    #[test]
    fn test_cached_path_layout() {
        let temp = TempDir::new().unwrap();
        let fetcher = ModelFetcher::with_cache_dir(temp.path().to_path_buf()).unwrap();

        let spec = ModelProfile::Small.spec();
        let path = fetcher.cached_path(&spec);
        assert_eq!(path, temp.path().join("rmbg-1.4-quantized.onnx"));
    }

    #[tokio::test]
    async fn test_cached_payload_short_circuits_network() {
        let temp = TempDir::new().unwrap();
        let fetcher = ModelFetcher::with_cache_dir(temp.path().to_path_buf()).unwrap();

        let spec = ModelProfile::Small.spec();
        let cached = fetcher.cached_path(&spec);
        tokio::fs::write(&cached, b"payload").await.unwrap();

        // No network activity happens when the file is already present.
        let path = fetcher.fetch(&spec).await.unwrap();
        assert_eq!(path, cached);
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_matching_digest_accepted_on_reuse() {
        let temp = TempDir::new().unwrap();
        let fetcher = ModelFetcher::with_cache_dir(temp.path().to_path_buf()).unwrap();

        let spec = ModelProfile::Medium.spec();
        let cached = fetcher.cached_path(&spec);
        tokio::fs::write(&cached, b"payload").await.unwrap();

        let digest = format!("{:x}", Sha256::digest(b"payload"));
        tokio::fs::write(fetcher.digest_path(&spec), &digest)
            .await
            .unwrap();

        let path = fetcher.fetch(&spec).await.unwrap();
        assert_eq!(path, cached);
    }
}
