//! Source archive download module.
//!
//! Handles file downloads with streaming SHA256 verification and a cache
//! keyed by the expected digest. Archives without an expected digest are
//! never served from the cache.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::StreamExt;
use kiln_schema::{PackageName, Sha256Digest, Version};
use reqwest::Client;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::Reporter;
use crate::paths::filename_from_url;

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },
}

/// A single archive to fetch.
#[derive(Debug, Clone, Copy)]
pub struct FetchRequest<'a> {
    pub name: &'a PackageName,
    pub version: &'a Version,
    pub url: &'a str,
    pub sha256: Option<&'a Sha256Digest>,
}

/// Makes a verified source archive available on local disk.
#[async_trait]
pub trait SourceFetch: Send + Sync {
    /// Fetch the archive described by `req`, returning its local path.
    async fn fetch(
        &self,
        req: FetchRequest<'_>,
        reporter: &dyn Reporter,
    ) -> Result<PathBuf, DownloadError>;
}

/// Fetches over HTTP(S) into a content-addressed cache directory.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    cache_dir: PathBuf,
}

impl HttpFetcher {
    /// Create a fetcher that caches under `cache_dir`.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Result<Self, DownloadError> {
        let client = Client::builder().user_agent(crate::USER_AGENT).build()?;
        Ok(Self::with_client(client, cache_dir))
    }

    pub fn with_client(client: Client, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            cache_dir: cache_dir.into(),
        }
    }

    /// Cache location for an archive: `<cache>/<sha256>-<filename>`.
    pub fn cached_path(&self, url: &str, sha256: &Sha256Digest) -> PathBuf {
        self.cache_dir
            .join(format!("{sha256}-{}", filename_from_url(url)))
    }

    /// Download an archive with no expected digest and report the digest
    /// it turned out to have.
    async fn fetch_unpinned(
        &self,
        req: FetchRequest<'_>,
        reporter: &dyn Reporter,
    ) -> Result<PathBuf, DownloadError> {
        let dest = self
            .cache_dir
            .join(format!("unpinned-{}", filename_from_url(req.url)));
        let actual = download_and_verify(&self.client, req, &dest, reporter).await?;

        tracing::warn!(
            url = req.url,
            sha256 = %actual,
            "Source archive has no pinned sha256, add it to sources.toml"
        );
        reporter.warning(&format!(
            "{} {} is not pinned; downloaded sha256 = \"{actual}\"",
            req.name, req.version
        ));
        Ok(dest)
    }
}

#[async_trait]
impl SourceFetch for HttpFetcher {
    async fn fetch(
        &self,
        req: FetchRequest<'_>,
        reporter: &dyn Reporter,
    ) -> Result<PathBuf, DownloadError> {
        tokio::fs::create_dir_all(&self.cache_dir).await?;
        let Some(expected) = req.sha256 else {
            return self.fetch_unpinned(req, reporter).await;
        };
        let dest = self.cached_path(req.url, expected);

        if tokio::fs::try_exists(&dest).await? {
            let actual = hash_file(&dest).await?;
            if *expected == *actual.as_str() {
                tracing::debug!(path = %dest.display(), "Source archive found in cache");
                return Ok(dest);
            }
            tracing::warn!(
                path = %dest.display(),
                "Cached archive does not match its digest, downloading again"
            );
            tokio::fs::remove_file(&dest).await?;
        }

        download_and_verify(&self.client, req, &dest, reporter).await?;
        Ok(dest)
    }
}

/// Stream `req.url` to `dest`, hashing as it goes.
///
/// Data lands in a `.part` file that is renamed only once the digest matches
/// `req.sha256` (any digest when it is `None`); on mismatch the partial file
/// is deleted. Returns the digest of the downloaded data.
pub async fn download_and_verify(
    client: &Client,
    req: FetchRequest<'_>,
    dest: &Path,
    reporter: &dyn Reporter,
) -> Result<String, DownloadError> {
    tracing::info!(url = req.url, "Downloading source archive");

    let response = client.get(req.url).send().await?.error_for_status()?;
    let total_size = response.content_length();
    reporter.downloading(req.name, req.version, 0, total_size);

    let mut partial = dest.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);

    let mut file = File::create(&partial).await?;
    let mut stream = response.bytes_stream();
    let mut hasher = Sha256::new();
    let mut downloaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        hasher.write_all(&chunk)?;
        downloaded += chunk.len() as u64;
        reporter.downloading(req.name, req.version, downloaded, total_size);
    }

    file.flush().await?;
    drop(file);
    let actual_hash = hex::encode(hasher.finalize());

    if let Some(expected) = req.sha256.filter(|e| **e != *actual_hash.as_str()) {
        reporter.failed(req.name, req.version, "hash mismatch");
        tokio::fs::remove_file(&partial).await.ok();
        return Err(DownloadError::HashMismatch {
            expected: expected.to_string(),
            actual: actual_hash,
        });
    }

    tokio::fs::rename(&partial, dest).await?;
    Ok(actual_hash)
}

/// SHA256 of a file on disk, computed on a blocking thread.
async fn hash_file(path: &Path) -> Result<String, DownloadError> {
    let path = path.to_path_buf();
    let hash = tokio::task::spawn_blocking(move || {
        let mut hasher = Sha256::new();
        let mut file = std::fs::File::open(&path)?;
        let mut buffer = [0u8; 8192];
        loop {
            let count = file.read(&mut buffer)?;
            if count == 0 {
                break;
            }
            hasher.update(&buffer[..count]);
        }
        Ok::<String, std::io::Error>(hex::encode(hasher.finalize()))
    })
    .await
    .map_err(std::io::Error::other)??;
    Ok(hash)
}
