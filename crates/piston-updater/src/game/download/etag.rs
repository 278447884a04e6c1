use crate::error::UpdaterError;
use crate::game::download::downloadable::{commit_part, discard_part, Downloadable, FetchStrategy};
use crate::utils::hash::{hashes_match, md5_file};
use futures::future::BoxFuture;
use md5::Md5;
use reqwest::header::{ETAG, IF_NONE_MATCH};
use reqwest::StatusCode;

/// Conditional fetch keyed on the local file's MD5; the response ETag must equal the MD5 of
/// what was downloaded. Multipart ETags (containing `-`) carry no usable digest.
#[derive(Debug, Default, Clone, Copy)]
pub struct EtagFetch;

/// Strip surrounding quotes; a missing ETag becomes `-` so it reads as "no digest".
pub fn normalize_etag(etag: Option<&str>) -> String {
    match etag {
        None => "-".to_string(),
        Some(etag) => {
            let trimmed = etag.trim();
            trimmed
                .strip_prefix('"')
                .and_then(|inner| inner.strip_suffix('"'))
                .unwrap_or(trimmed)
                .to_string()
        }
    }
}

impl EtagFetch {
    async fn run(&self, download: &Downloadable) -> Result<String, UpdaterError> {
        let target = download.target();
        let mut request = download.request(download.url());

        if !download.is_force_download() && target.is_file() {
            let local_md5 = md5_file(target).await?;
            request = request.header(IF_NONE_MATCH, local_md5);
        }

        let response = match download.send(request, download.url()).await {
            Ok(response) => response,
            Err(e) => return degrade_to_local(download, e),
        };

        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            return Ok("Used own copy as it matched etag".to_string());
        }

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
        let etag = normalize_etag(
            response
                .headers()
                .get(ETAG)
                .and_then(|value| value.to_str().ok()),
        );

        let (md5, part) = match download.stream_to_part::<Md5>(response, target).await {
            Ok(streamed) => streamed,
            Err(e) => return degrade_to_local(download, e),
        };

        if etag.contains('-') {
            commit_part(&part, target).await?;
            return Ok("Didn't have etag so assuming our copy is good".to_string());
        }

        if hashes_match(&etag, &md5) {
            commit_part(&part, target).await?;
            Ok("Downloaded successfully and etag matched".to_string())
        } else {
            discard_part(&part).await;
            Err(UpdaterError::Integrity {
                kind: "ETag",
                path: target.to_path_buf(),
                expected: etag,
                actual: md5,
            })
        }
    }
}

fn degrade_to_local(download: &Downloadable, error: UpdaterError) -> Result<String, UpdaterError> {
    if matches!(error, UpdaterError::Network { .. }) && download.target().is_file() {
        return Ok(format!(
            "Couldn't connect to server ({}) but have local file, assuming it's good",
            error
        ));
    }
    Err(error)
}

impl FetchStrategy for EtagFetch {
    fn fetch<'a>(&'a self, download: &'a Downloadable) -> BoxFuture<'a, Result<String, UpdaterError>> {
        Box::pin(self.run(download))
    }
}
