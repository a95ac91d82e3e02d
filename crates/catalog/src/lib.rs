use async_trait::async_trait;
use playbar_core::{urls, Playlist, Section};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

mod favorites;

pub use favorites::{FavoritesError, FavoritesStore};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("invalid catalog url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("catalog transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("catalog returned HTTP {status} for {url}")]
    Status { url: String, status: u16 },
}

/// Remote catalog. One request per call; callers decide about retries.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn fetch_home_feed(&self) -> Result<Vec<Section>, CatalogError>;

    async fn fetch_playlist(&self, id: i64) -> Result<Playlist, CatalogError>;
}

pub struct HttpCatalog {
    client: reqwest::Client,
    base: Url,
}

impl HttpCatalog {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CatalogError> {
        let base = urls::catalog_base(base_url)?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, CatalogError> {
        debug!(url = %url, "catalog request");
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl CatalogApi for HttpCatalog {
    async fn fetch_home_feed(&self) -> Result<Vec<Section>, CatalogError> {
        self.get_json(urls::home_feed_url(&self.base)?).await
    }

    async fn fetch_playlist(&self, id: i64) -> Result<Playlist, CatalogError> {
        self.get_json(urls::playlist_url(&self.base, id)?).await
    }
}
