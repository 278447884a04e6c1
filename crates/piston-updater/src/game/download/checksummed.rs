use crate::error::UpdaterError;
use crate::game::download::downloadable::{commit_part, discard_part, lock, Downloadable, FetchStrategy};
use crate::utils::fs::remove_file_quietly;
use crate::utils::hash::{hashes_match, sha1_file};
use futures::future::BoxFuture;
use sha1::Sha1;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Artifact verified against the SHA-1 published next to it at `<url>.sha1`.
///
/// The published checksum is cached beside the artifact as `<target>.sha`. When no checksum
/// can be obtained at all the download is trusted as-is.
#[derive(Debug, Default)]
pub struct ChecksummedFetch {
    checksum: Mutex<Option<String>>,
}

pub fn sidecar_path(target: &Path) -> PathBuf {
    let mut path = target.as_os_str().to_owned();
    path.push(".sha");
    PathBuf::from(path)
}

async fn read_sidecar(path: &Path) -> String {
    tokio::fs::read_to_string(path)
        .await
        .map(|content| content.trim().to_string())
        .unwrap_or_default()
}

impl ChecksummedFetch {
    fn cached_checksum(&self) -> Option<String> {
        lock(&self.checksum).clone()
    }

    fn set_checksum(&self, checksum: Option<String>) {
        *lock(&self.checksum) = checksum;
    }

    async fn fetch_checksum(
        &self,
        download: &Downloadable,
        sidecar: &Path,
    ) -> Result<String, UpdaterError> {
        let url = format!("{}.sha1", download.url());

        let response = match download.send(download.request(&url), &url).await {
            Ok(response) => response,
            Err(e) if download.target().is_file() => {
                log::debug!("Couldn't fetch checksum from {}: {}", url, e);
                return Ok(read_sidecar(sidecar).await);
            }
            Err(e) => return Err(e),
        };

        if !response.status().is_success() {
            log::debug!("Checksum {} responded with {}", url, response.status());
            return Ok(read_sidecar(sidecar).await);
        }

        match response.text().await {
            Ok(text) => {
                let checksum = text.trim().to_string();
                if let Err(e) = tokio::fs::write(sidecar, &checksum).await {
                    log::warn!("Couldn't save checksum to {:?}: {}", sidecar, e);
                }
                Ok(checksum)
            }
            Err(e) => {
                log::debug!("Couldn't read checksum body from {}: {}", url, e);
                Ok(String::new())
            }
        }
    }

    async fn run(&self, download: &Downloadable) -> Result<String, UpdaterError> {
        let target = download.target();
        let sidecar = sidecar_path(target);

        if target.is_file() && sidecar.is_file() && !download.is_force_download() {
            let local_hash = sha1_file(target).await?;
            let cached = read_sidecar(&sidecar).await;
            if cached.is_empty() || hashes_match(&cached, &local_hash) {
                return Ok("Local file matches local checksum, using that".to_string());
            }

            self.set_checksum(None);
            remove_file_quietly(&sidecar);
        }

        let checksum = match self.cached_checksum() {
            Some(checksum) => checksum,
            None => {
                let checksum = self.fetch_checksum(download, &sidecar).await?;
                self.set_checksum(Some(checksum.clone()));
                checksum
            }
        };

        let response = match download.send(download.request(download.url()), download.url()).await {
            Ok(response) => response,
            Err(e) => return degrade_to_local(download, &checksum, e),
        };

        let status = response.status();
        if !status.is_success() {
            if target.is_file() {
                return Ok(format!(
                    "Couldn't connect to server (responded with {}) but have local file, assuming it's good",
                    status.as_u16()
                ));
            }
            return Err(UpdaterError::HttpStatus {
                url: download.url().to_string(),
                status: status.as_u16(),
            });
        }

        download.update_expected_size(&response);
        let (digest, part) = match download.stream_to_part::<Sha1>(response, target).await {
            Ok(streamed) => streamed,
            Err(e) => return degrade_to_local(download, &checksum, e),
        };

        if checksum.is_empty() {
            commit_part(&part, target).await?;
            return Ok("Didn't have checksum so assuming our copy is good".to_string());
        }

        if hashes_match(&checksum, &digest) {
            commit_part(&part, target).await?;
            Ok("Downloaded successfully and checksum matched".to_string())
        } else {
            discard_part(&part).await;
            Err(UpdaterError::Integrity {
                kind: "Checksum",
                path: target.to_path_buf(),
                expected: checksum,
                actual: digest,
            })
        }
    }
}

// A local copy is only trusted offline when there is no checksum to hold it to
fn degrade_to_local(
    download: &Downloadable,
    checksum: &str,
    error: UpdaterError,
) -> Result<String, UpdaterError> {
    if matches!(error, UpdaterError::Network { .. }) && download.target().is_file() && checksum.is_empty() {
        return Ok(format!(
            "Couldn't connect to server ({}) but have local file, assuming it's good",
            error
        ));
    }
    Err(error)
}

impl FetchStrategy for ChecksummedFetch {
    fn fetch<'a>(&'a self, download: &'a Downloadable) -> BoxFuture<'a, Result<String, UpdaterError>> {
        Box::pin(self.run(download))
    }
}
