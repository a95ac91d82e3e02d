use playbar_catalog::{CatalogApi, CatalogError};
use playbar_core::Section;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HomeFeedState {
    pub feed: Vec<Section>,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl Default for HomeFeedState {
    fn default() -> Self {
        Self {
            feed: Vec::new(),
            is_loading: true,
            error: None,
        }
    }
}

pub struct HomeFeedModel {
    catalog: Arc<dyn CatalogApi>,
    state: watch::Sender<HomeFeedState>,
}

impl HomeFeedModel {
    pub fn new(catalog: Arc<dyn CatalogApi>) -> Self {
        let (state, _) = watch::channel(HomeFeedState::default());
        Self { catalog, state }
    }

    pub fn observe(&self) -> watch::Receiver<HomeFeedState> {
        self.state.subscribe()
    }

    pub fn current(&self) -> HomeFeedState {
        self.state.borrow().clone()
    }

    /// Fetches the feed once. Failures are recorded in the state and
    /// returned; nothing is retried.
    pub async fn refresh(&self) -> Result<(), CatalogError> {
        self.state.send_if_modified(|state| {
            let was_idle = !state.is_loading;
            state.is_loading = true;
            was_idle
        });

        match self.catalog.fetch_home_feed().await {
            Ok(feed) => {
                info!(sections = feed.len(), "home feed loaded");
                self.state.send_replace(HomeFeedState {
                    feed,
                    is_loading: false,
                    error: None,
                });
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "home feed fetch failed");
                self.state.send_modify(|state| {
                    state.is_loading = false;
                    state.error = Some(err.to_string());
                });
                Err(err)
            }
        }
    }
}
