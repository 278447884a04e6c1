use crate::error::UpdaterError;
use crate::game::download::downloadable::{commit_part, Downloadable, FetchStrategy};
use futures::future::BoxFuture;
use sha1::Sha1;

/// Fetch without any verification. An existing file is kept unless the download is forced.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainFetch;

impl PlainFetch {
    async fn run(&self, download: &Downloadable) -> Result<String, UpdaterError> {
        let target = download.target();
        if target.is_file() && !download.is_force_download() {
            return Ok("Have local file, using that".to_string());
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
        let (_, part) = download.stream_to_part::<Sha1>(response, target).await?;
        commit_part(&part, target).await?;
        Ok("Downloaded successfully".to_string())
    }
}

impl FetchStrategy for PlainFetch {
    fn fetch<'a>(&'a self, download: &'a Downloadable) -> BoxFuture<'a, Result<String, UpdaterError>> {
        Box::pin(self.run(download))
    }
}
