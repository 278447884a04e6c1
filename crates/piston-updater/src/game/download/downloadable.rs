use crate::config::ASSUMED_AVERAGE_FILE_SIZE;
use crate::error::UpdaterError;
use crate::game::assets::index::AssetObject;
use crate::game::download::asset::AssetFetch;
use crate::game::download::checksummed::ChecksummedFetch;
use crate::game::download::etag::EtagFetch;
use crate::game::download::plain::PlainFetch;
use crate::game::download::progress::ProgressMonitor;
use futures::future::BoxFuture;
use futures::StreamExt;
use reqwest::header::{CACHE_CONTROL, EXPIRES, PRAGMA};
use reqwest::{Client, RequestBuilder, Response};
use sha1::digest::Output;
use sha1::Digest;
use std::fmt::{self, LowerHex};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

/// A request/verify protocol for one artifact.
///
/// `fetch` leaves a verified file at the downloadable's target and returns a short outcome
/// message, or fails. Failures are retried by the owning job.
pub trait FetchStrategy: Send + Sync {
    fn fetch<'a>(&'a self, download: &'a Downloadable) -> BoxFuture<'a, Result<String, UpdaterError>>;

    fn status(&self, download: &Downloadable) -> String {
        format!("Downloading {}", download.file_name())
    }
}

/// One artifact to bring up to date, plus its attempt bookkeeping
pub struct Downloadable {
    client: Client,
    url: String,
    target: PathBuf,
    force_download: bool,
    expected_size: AtomicU64,
    attempts: AtomicU32,
    started_at: Mutex<Option<Instant>>,
    finished_at: Mutex<Option<Instant>>,
    monitor: ProgressMonitor,
    strategy: Box<dyn FetchStrategy>,
}

impl fmt::Debug for Downloadable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Downloadable")
            .field("url", &self.url)
            .field("target", &self.target)
            .field("force_download", &self.force_download)
            .field("attempts", &self.attempts())
            .finish()
    }
}

impl Downloadable {
    pub fn new(
        client: Client,
        url: impl Into<String>,
        target: PathBuf,
        force_download: bool,
        strategy: Box<dyn FetchStrategy>,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            target,
            force_download,
            expected_size: AtomicU64::new(0),
            attempts: AtomicU32::new(0),
            started_at: Mutex::new(None),
            finished_at: Mutex::new(None),
            monitor: ProgressMonitor::new(ASSUMED_AVERAGE_FILE_SIZE),
            strategy,
        }
    }

    /// Verified against a `<url>.sha1` sidecar
    pub fn checksummed(client: Client, url: impl Into<String>, target: PathBuf, force_download: bool) -> Self {
        Self::new(client, url, target, force_download, Box::new(ChecksummedFetch::default()))
    }

    /// Conditional fetch verified against the response ETag
    pub fn etag(client: Client, url: impl Into<String>, target: PathBuf, force_download: bool) -> Self {
        Self::new(client, url, target, force_download, Box::new(EtagFetch))
    }

    /// No verification at all
    pub fn plain(client: Client, url: impl Into<String>, target: PathBuf, force_download: bool) -> Self {
        Self::new(client, url, target, force_download, Box::new(PlainFetch))
    }

    /// Content-addressed asset object stored under `objects_dir`
    pub fn asset(
        client: Client,
        name: impl Into<String>,
        object: &AssetObject,
        url_base: &str,
        objects_dir: &Path,
    ) -> Self {
        let url = format!("{}{}", url_base, object.hash_path());
        let target = objects_dir.join(object.hash_path());
        let fetch = AssetFetch::new(name, object.clone(), url_base, objects_dir);
        let download = Self::new(client, url, target, false, Box::new(fetch));
        download.set_expected_size(object.size);
        download
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn file_name(&self) -> String {
        self.target
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn is_force_download(&self) -> bool {
        self.force_download
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Acquire)
    }

    pub fn expected_size(&self) -> u64 {
        self.expected_size.load(Ordering::Acquire)
    }

    pub fn set_expected_size(&self, size: u64) {
        self.expected_size.store(size, Ordering::Release);
        if size > 0 {
            self.monitor.set_total(size);
        }
    }

    pub fn monitor(&self) -> &ProgressMonitor {
        &self.monitor
    }

    pub fn status(&self) -> String {
        self.strategy.status(self)
    }

    pub fn started_at(&self) -> Option<Instant> {
        *lock(&self.started_at)
    }

    pub fn finished_at(&self) -> Option<Instant> {
        *lock(&self.finished_at)
    }

    /// Count an attempt and run the fetch strategy.
    pub async fn download(&self) -> Result<String, UpdaterError> {
        self.attempts.fetch_add(1, Ordering::AcqRel);
        ensure_file_writable(&self.target).await?;
        self.strategy.fetch(self).await
    }

    pub(crate) fn mark_started(&self) {
        lock(&self.started_at).get_or_insert_with(Instant::now);
    }

    pub(crate) fn mark_finished(&self) {
        *lock(&self.finished_at) = Some(Instant::now());
    }

    /// GET with caching disabled end to end
    pub(crate) fn request(&self, url: &str) -> RequestBuilder {
        no_cache(self.client.get(url))
    }

    pub(crate) async fn send(&self, request: RequestBuilder, url: &str) -> Result<Response, UpdaterError> {
        request
            .send()
            .await
            .map_err(|e| UpdaterError::network(url, e))
    }

    /// Learn the size from the response when nobody told us up front
    pub(crate) fn update_expected_size(&self, response: &Response) {
        if self.expected_size() == 0 {
            if let Some(length) = response.content_length() {
                self.set_expected_size(length);
            }
        }
    }

    /// Stream a response body into `<target>.part`, digesting it on the way.
    /// The part file is removed again if the transfer fails.
    pub(crate) async fn stream_to_part<D: Digest + Send>(
        &self,
        response: Response,
        target: &Path,
    ) -> Result<(String, PathBuf), UpdaterError>
    where
        Output<D>: LowerHex,
    {
        let part = part_path(target);
        let url = response.url().to_string();

        let result = async {
            let mut file = File::create(&part).await?;
            let mut hasher = D::new();
            let mut downloaded: u64 = 0;
            let mut stream = response.bytes_stream();

            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| UpdaterError::network(url.as_str(), e))?;
                file.write_all(&chunk).await?;
                hasher.update(&chunk);
                downloaded += chunk.len() as u64;
                self.monitor.set_current(downloaded);
            }

            file.flush().await?;
            file.sync_all().await?;
            Ok::<_, UpdaterError>(format!("{:x}", hasher.finalize()))
        }
        .await;

        match result {
            Ok(digest) => Ok((digest, part)),
            Err(e) => {
                discard_part(&part).await;
                Err(e)
            }
        }
    }
}

/// Make sure `path` can be written: its directory exists and it isn't read-only.
pub async fn ensure_file_writable(path: &Path) -> Result<(), UpdaterError> {
    if let Some(parent) = path.parent() {
        if !parent.is_dir() {
            log::info!("Making directory {:?}", parent);
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                log::error!("Couldn't create directory {:?}: {}", parent, e);
                UpdaterError::NotWritable(parent.to_path_buf())
            })?;
        }
    }

    if let Ok(metadata) = tokio::fs::metadata(path).await {
        if metadata.is_file() && metadata.permissions().readonly() {
            return Err(UpdaterError::NotWritable(path.to_path_buf()));
        }
    }

    Ok(())
}

/// Disable caching along the whole request path
pub(crate) fn no_cache(request: RequestBuilder) -> RequestBuilder {
    request
        .header(CACHE_CONTROL, "no-store,max-age=0,no-cache")
        .header(EXPIRES, "0")
        .header(PRAGMA, "no-cache")
}

pub(crate) fn part_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("download");
    target.with_file_name(format!("{}.part", name))
}

/// Move a verified part file over its target
pub(crate) async fn commit_part(part: &Path, target: &Path) -> Result<(), UpdaterError> {
    tokio::fs::rename(part, target).await?;
    Ok(())
}

pub(crate) async fn discard_part(part: &Path) {
    if let Err(e) = tokio::fs::remove_file(part).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::warn!("Couldn't delete {:?}: {}", part, e);
        }
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
