use crate::error::UpdaterError;
use crate::game::catalog::{CatalogStore, VersionCatalog};
use crate::game::download::downloadable::no_cache;
use crate::game::platform::Environment;
use crate::game::version::{CompleteVersion, RawVersionList, ReleaseType, Version};
use futures::future::BoxFuture;
use reqwest::Client;
use std::collections::HashMap;
use url::Url;

/// The version origin, read from `<base>/versions/versions.json`
#[derive(Debug)]
pub struct RemoteCatalog {
    base_url: Url,
    client: Client,
    store: CatalogStore,
}

impl RemoteCatalog {
    pub fn new(base_url: &str, client: Client) -> Result<Self, UpdaterError> {
        let base_url = if base_url.ends_with('/') {
            Url::parse(base_url)?
        } else {
            Url::parse(&format!("{}/", base_url))?
        };

        Ok(Self {
            base_url,
            client,
            store: CatalogStore::new(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

/// Split a raw listing into listable entries and the latest id per known type
fn parse_listing(raw: RawVersionList) -> (Vec<Version>, HashMap<ReleaseType, String>) {
    let versions = raw
        .versions
        .into_iter()
        .map(Version::Partial)
        .filter(|version| {
            let listable = version.is_listable();
            if !listable {
                log::warn!("Skipping remote version {} without type or time", version.id());
            }
            listable
        })
        .collect();

    let latest = raw
        .latest
        .into_iter()
        .filter_map(|(name, id)| ReleaseType::by_name(&name).map(|release_type| (release_type, id)))
        .collect();

    (versions, latest)
}

impl VersionCatalog for RemoteCatalog {
    fn store(&self) -> &CatalogStore {
        &self.store
    }

    fn refresh(&self) -> BoxFuture<'_, Result<(), UpdaterError>> {
        Box::pin(async move {
            self.store.clear();

            let path = "versions/versions.json";
            let content = self.content(path).await?;
            let raw: RawVersionList = serde_json::from_str(&content)
                .map_err(|e| UpdaterError::malformed(path, e.to_string()))?;

            let (versions, latest) = parse_listing(raw);
            log::info!("Found {} remote versions at {}", versions.len(), self.base_url);
            self.store.replace_all(versions, latest);
            Ok(())
        })
    }

    fn content<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<String, UpdaterError>> {
        Box::pin(async move {
            let url = self.url_for(path)?;
            log::debug!("Fetching {}", url);

            let response = no_cache(self.client.get(url.clone()))
                .send()
                .await
                .map_err(|e| UpdaterError::network(url.as_str(), e))?;

            if !response.status().is_success() {
                return Err(UpdaterError::HttpStatus {
                    url: url.to_string(),
                    status: response.status().as_u16(),
                });
            }

            response
                .text()
                .await
                .map_err(|e| UpdaterError::network(url.as_str(), e))
        })
    }

    fn url_for(&self, path: &str) -> Result<Url, UpdaterError> {
        Ok(self.base_url.join(path)?)
    }

    fn has_all_files(&self, _version: &CompleteVersion, _env: &Environment) -> bool {
        true
    }
}
