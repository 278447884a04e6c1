use crate::error::UpdaterError;
use crate::game::assets::index::{hash_path, AssetObject};
use crate::game::download::downloadable::{
    commit_part, discard_part, ensure_file_writable, part_path, Downloadable, FetchStrategy,
};
use crate::utils::fs::remove_file_quietly;
use crate::utils::hash::{copy_and_digest, hashes_match, sha1_file};
use flate2::read::GzDecoder;
use futures::future::BoxFuture;
use sha1::Sha1;
use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// Content-addressed asset object.
///
/// A local object of the right size is trusted. Otherwise the gzip variant is preferred when
/// the index offers one: it must match its own hash, and what it unpacks to must match the
/// object's hash. Every mismatch is an error.
#[derive(Debug)]
pub struct AssetFetch {
    name: String,
    object: AssetObject,
    url_base: String,
    objects_dir: PathBuf,
    extracting: AtomicBool,
}

impl AssetFetch {
    pub fn new(name: impl Into<String>, object: AssetObject, url_base: &str, objects_dir: &Path) -> Self {
        Self {
            name: name.into(),
            object,
            url_base: url_base.to_string(),
            objects_dir: objects_dir.to_path_buf(),
            extracting: AtomicBool::new(false),
        }
    }

    async fn run(&self, download: &Downloadable) -> Result<String, UpdaterError> {
        self.extracting.store(false, Ordering::Release);
        let local_asset = download.target();

        if local_asset.is_file() {
            let size = tokio::fs::metadata(local_asset).await?.len();
            if size == self.object.size {
                return Ok("Have local file and it's the same size; assuming it's okay!".to_string());
            }

            log::warn!(
                "Had local file but it was the wrong size... had {} but expected {}",
                size,
                self.object.size
            );
            remove_file_quietly(local_asset);
        }

        if let Some(compressed_hash) = &self.object.compressed_hash {
            let local_compressed = self.objects_dir.join(hash_path(compressed_hash));
            ensure_file_writable(&local_compressed).await?;
            return self
                .fetch_compressed(download, compressed_hash, &local_compressed)
                .await;
        }

        let response = download.send(download.request(download.url()), download.url()).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(UpdaterError::HttpStatus {
                url: download.url().to_string(),
                status: status.as_u16(),
            });
        }

        download.update_expected_size(&response);
        let (hash, part) = download.stream_to_part::<Sha1>(response, local_asset).await?;
        if !hashes_match(&self.object.hash, &hash) {
            discard_part(&part).await;
            return Err(UpdaterError::Integrity {
                kind: "Asset hash",
                path: local_asset.to_path_buf(),
                expected: self.object.hash.clone(),
                actual: hash,
            });
        }

        commit_part(&part, local_asset).await?;
        Ok("Downloaded asset and hash matched successfully".to_string())
    }

    async fn fetch_compressed(
        &self,
        download: &Downloadable,
        compressed_hash: &str,
        local_compressed: &Path,
    ) -> Result<String, UpdaterError> {
        if local_compressed.is_file() {
            let local_hash = sha1_file(local_compressed).await?;
            if hashes_match(compressed_hash, &local_hash) {
                return self.decompress(download.target(), local_compressed).await;
            }

            log::warn!(
                "Had local compressed but it was the wrong hash... expected {} but had {}",
                compressed_hash,
                local_hash
            );
            remove_file_quietly(local_compressed);
        }

        let url = format!("{}{}", self.url_base, hash_path(compressed_hash));
        let response = download.send(download.request(&url), &url).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(UpdaterError::HttpStatus {
                url,
                status: status.as_u16(),
            });
        }

        download.update_expected_size(&response);
        let (hash, part) = download
            .stream_to_part::<Sha1>(response, local_compressed)
            .await?;
        if !hashes_match(compressed_hash, &hash) {
            discard_part(&part).await;
            return Err(UpdaterError::Integrity {
                kind: "Compressed asset hash",
                path: local_compressed.to_path_buf(),
                expected: compressed_hash.to_string(),
                actual: hash,
            });
        }

        commit_part(&part, local_compressed).await?;
        self.decompress(download.target(), local_compressed).await
    }

    async fn decompress(&self, local_asset: &Path, local_compressed: &Path) -> Result<String, UpdaterError> {
        self.extracting.store(true, Ordering::Release);

        let part = part_path(local_asset);
        let source = local_compressed.to_path_buf();
        let destination = part.clone();
        let unpacked = tokio::task::spawn_blocking(move || -> io::Result<String> {
            let mut decoder = GzDecoder::new(BufReader::new(File::open(&source)?));
            let mut output = BufWriter::new(File::create(&destination)?);
            let (hash, _) = copy_and_digest::<Sha1, _, _>(&mut decoder, &mut output)?;
            Ok(hash)
        })
        .await
        .map_err(io::Error::other)?;

        self.extracting.store(false, Ordering::Release);

        let hash = match unpacked {
            Ok(hash) => hash,
            Err(e) => {
                discard_part(&part).await;
                return Err(e.into());
            }
        };

        if !hashes_match(&self.object.hash, &hash) {
            discard_part(&part).await;
            return Err(UpdaterError::Integrity {
                kind: "Unpacked asset hash",
                path: local_asset.to_path_buf(),
                expected: self.object.hash.clone(),
                actual: hash,
            });
        }

        commit_part(&part, local_asset).await?;
        Ok("Had local compressed asset, unpacked successfully and hash matched".to_string())
    }
}

impl FetchStrategy for AssetFetch {
    fn fetch<'a>(&'a self, download: &'a Downloadable) -> BoxFuture<'a, Result<String, UpdaterError>> {
        Box::pin(self.run(download))
    }

    fn status(&self, _download: &Downloadable) -> String {
        let phase = if self.extracting.load(Ordering::Acquire) {
            "Extracting"
        } else {
            "Downloading"
        };
        format!("{} {}", phase, self.name)
    }
}
