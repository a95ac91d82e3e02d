use futures_util::StreamExt;
use playbar_catalog::{CatalogApi, CatalogError, FavoritesError, FavoritesStore};
use playbar_core::{Album, Track};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistState {
    pub album: Album,
    pub is_favorite: bool,
    pub playlist: Vec<Track>,
}

impl Default for PlaylistState {
    fn default() -> Self {
        Self {
            album: Album::empty(),
            is_favorite: false,
            playlist: Vec::new(),
        }
    }
}

pub struct PlaylistModel {
    catalog: Arc<dyn CatalogApi>,
    favorites: Arc<FavoritesStore>,
    state: Arc<watch::Sender<PlaylistState>>,
    follow: Mutex<Option<JoinHandle<()>>>,
}

impl PlaylistModel {
    pub fn new(catalog: Arc<dyn CatalogApi>, favorites: Arc<FavoritesStore>) -> Self {
        let (state, _) = watch::channel(PlaylistState::default());
        Self {
            catalog,
            favorites,
            state: Arc::new(state),
            follow: Mutex::new(None),
        }
    }

    pub fn observe(&self) -> watch::Receiver<PlaylistState> {
        self.state.subscribe()
    }

    pub fn current(&self) -> PlaylistState {
        self.state.borrow().clone()
    }

    /// Shows `album`, follows its favorite flag and fetches its songs.
    pub async fn open(&self, album: Album) -> Result<(), CatalogError> {
        let id = album.id;
        self.state.send_replace(PlaylistState {
            album,
            is_favorite: self.favorites.contains(id),
            playlist: Vec::new(),
        });
        self.follow_favorite(id);

        let playlist = self.catalog.fetch_playlist(id).await.map_err(|err| {
            warn!(album_id = id, error = %err, "playlist fetch failed");
            err
        })?;
        info!(album_id = id, songs = playlist.songs.len(), "playlist loaded");

        // The user may have opened another album while this one was loading.
        self.state.send_if_modified(|state| {
            if state.album.id != id {
                return false;
            }
            state.playlist = playlist.songs;
            true
        });
        Ok(())
    }

    pub async fn toggle_favorite(&self, favorite: bool) -> Result<(), FavoritesError> {
        let album = self.state.borrow().album.clone();
        if album.id < 0 {
            debug!("no album open; ignoring favorite toggle");
            return Ok(());
        }
        if favorite {
            self.favorites.add(album).await
        } else {
            self.favorites.remove(&album).await
        }
    }

    pub fn close(&self) {
        if let Some(task) = self.follow_slot().take() {
            task.abort();
        }
    }

    fn follow_favorite(&self, id: i64) {
        let mut updates = self.favorites.is_favorite(id);
        let state = self.state.clone();
        let task = tokio::spawn(async move {
            while let Some(is_favorite) = updates.next().await {
                state.send_if_modified(|s| {
                    if s.album.id != id || s.is_favorite == is_favorite {
                        return false;
                    }
                    s.is_favorite = is_favorite;
                    true
                });
            }
        });
        if let Some(previous) = self.follow_slot().replace(task) {
            previous.abort();
        }
    }

    fn follow_slot(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.follow
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for PlaylistModel {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::PlaylistModel;
    use async_trait::async_trait;
    use playbar_catalog::{CatalogApi, CatalogError, FavoritesStore};
    use playbar_core::{Album, Playlist, Section, Track};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Default)]
    pub(crate) struct FakeCatalog {
        pub feed: Mutex<Option<Vec<Section>>>,
        pub playlists: Mutex<HashMap<i64, Playlist>>,
    }

    #[async_trait]
    impl CatalogApi for FakeCatalog {
        async fn fetch_home_feed(&self) -> Result<Vec<Section>, CatalogError> {
            self.feed.lock().unwrap().clone().ok_or(CatalogError::Status {
                url: "http://catalog/feed".to_string(),
                status: 503,
            })
        }

        async fn fetch_playlist(&self, id: i64) -> Result<Playlist, CatalogError> {
            self.playlists
                .lock()
                .unwrap()
                .get(&id)
                .cloned()
                .ok_or(CatalogError::Status {
                    url: format!("http://catalog/playlist/{id}"),
                    status: 404,
                })
        }
    }

    fn album(id: i64) -> Album {
        Album {
            id,
            album: format!("album-{id}"),
            ..Album::default()
        }
    }

    fn catalog_with(ids: &[i64]) -> Arc<FakeCatalog> {
        let catalog = FakeCatalog::default();
        for &id in ids {
            catalog.playlists.lock().unwrap().insert(
                id,
                Playlist {
                    id,
                    songs: vec![Track {
                        name: format!("song-{id}"),
                        src: format!("sim://song-{id}"),
                        ..Track::default()
                    }],
                },
            );
        }
        Arc::new(catalog)
    }

    #[tokio::test]
    async fn open_loads_songs() {
        let model = PlaylistModel::new(
            catalog_with(&[3]),
            Arc::new(FavoritesStore::in_memory()),
        );

        model.open(album(3)).await.unwrap();

        let state = model.current();
        assert_eq!(state.album.id, 3);
        assert_eq!(state.playlist.len(), 1);
        assert_eq!(state.playlist[0].name, "song-3");
        assert!(!state.is_favorite);
    }

    #[tokio::test]
    async fn favorite_flag_follows_the_store() {
        let favorites = Arc::new(FavoritesStore::in_memory());
        let model = PlaylistModel::new(catalog_with(&[3]), favorites.clone());
        let mut rx = model.observe();
        model.open(album(3)).await.unwrap();

        model.toggle_favorite(true).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), rx.wait_for(|s| s.is_favorite))
            .await
            .unwrap()
            .unwrap();
        assert!(favorites.contains(3));

        model.toggle_favorite(false).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), rx.wait_for(|s| !s.is_favorite))
            .await
            .unwrap()
            .unwrap();
        assert!(!favorites.contains(3));
    }

    #[tokio::test]
    async fn reopening_stops_following_previous_album() {
        let favorites = Arc::new(FavoritesStore::in_memory());
        favorites.add(album(1)).await.unwrap();
        let model = PlaylistModel::new(catalog_with(&[1, 2]), favorites.clone());

        model.open(album(1)).await.unwrap();
        assert!(model.current().is_favorite);

        model.open(album(2)).await.unwrap();
        favorites.remove(&album(1)).await.unwrap();
        tokio::task::yield_now().await;

        let state = model.current();
        assert_eq!(state.album.id, 2);
        assert!(!state.is_favorite);
        assert_eq!(state.playlist[0].name, "song-2");
    }

    #[tokio::test]
    async fn missing_playlist_keeps_album_and_returns_error() {
        let model = PlaylistModel::new(catalog_with(&[]), Arc::new(FavoritesStore::in_memory()));

        let err = model.open(album(9)).await.unwrap_err();

        assert!(matches!(err, CatalogError::Status { status: 404, .. }));
        assert_eq!(model.current().album.id, 9);
        assert!(model.current().playlist.is_empty());
    }

    #[tokio::test]
    async fn toggle_without_album_is_ignored() {
        let favorites = Arc::new(FavoritesStore::in_memory());
        let model = PlaylistModel::new(catalog_with(&[]), favorites.clone());

        model.toggle_favorite(true).await.unwrap();

        assert!(!favorites.contains(-1));
    }
}
