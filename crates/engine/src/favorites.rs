use futures_util::{FutureExt, StreamExt};
use playbar_catalog::FavoritesStore;
use playbar_core::Album;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FavoritesState {
    pub albums: Vec<Album>,
}

pub struct FavoritesModel {
    state: Arc<watch::Sender<FavoritesState>>,
    follow: Mutex<Option<JoinHandle<()>>>,
}

impl FavoritesModel {
    /// Must be called inside a tokio runtime.
    pub fn new(favorites: Arc<FavoritesStore>) -> Self {
        let mut updates = favorites.list_all();
        let albums = updates.next().now_or_never().flatten().unwrap_or_default();
        let (state, _) = watch::channel(FavoritesState { albums });
        let state = Arc::new(state);

        let publish = state.clone();
        let task = tokio::spawn(async move {
            while let Some(albums) = updates.next().await {
                debug!(count = albums.len(), "favorites updated");
                publish.send_replace(FavoritesState { albums });
            }
        });

        Self {
            state,
            follow: Mutex::new(Some(task)),
        }
    }

    pub fn observe(&self) -> watch::Receiver<FavoritesState> {
        self.state.subscribe()
    }

    pub fn current(&self) -> FavoritesState {
        self.state.borrow().clone()
    }

    pub fn close(&self) {
        let task = self
            .follow
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = task {
            task.abort();
        }
    }
}

impl Drop for FavoritesModel {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::FavoritesModel;
    use playbar_catalog::FavoritesStore;
    use playbar_core::Album;
    use std::sync::Arc;
    use std::time::Duration;

    fn album(id: i64) -> Album {
        Album {
            id,
            album: format!("album-{id}"),
            ..Album::default()
        }
    }

    #[tokio::test]
    async fn starts_with_stored_albums() {
        let favorites = Arc::new(FavoritesStore::in_memory());
        favorites.add(album(2)).await.unwrap();
        favorites.add(album(1)).await.unwrap();
        let model = FavoritesModel::new(favorites);

        let ids: Vec<i64> = model.current().albums.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn add_and_remove_are_reflected() {
        let favorites = Arc::new(FavoritesStore::in_memory());
        let model = FavoritesModel::new(favorites.clone());
        let mut rx = model.observe();

        favorites.add(album(5)).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), rx.wait_for(|s| s.albums.len() == 1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(model.current().albums[0].id, 5);

        favorites.remove(&album(5)).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), rx.wait_for(|s| s.albums.is_empty()))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn closed_model_stops_following() {
        let favorites = Arc::new(FavoritesStore::in_memory());
        let model = FavoritesModel::new(favorites.clone());

        model.close();
        tokio::task::yield_now().await;
        favorites.add(album(3)).await.unwrap();
        tokio::task::yield_now().await;

        assert!(model.current().albums.is_empty());
    }
}
