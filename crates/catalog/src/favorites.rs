use futures_util::stream::{self, BoxStream, StreamExt};
use playbar_core::Album;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info};

type Records = Arc<BTreeMap<i64, Album>>;

#[derive(Debug, Error)]
pub enum FavoritesError {
    #[error("favorites file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("favorites file {path} is malformed: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode favorites: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Favorite albums keyed by id, at most one record per id. Optionally
/// mirrored to a JSON file that is rewritten after every change.
pub struct FavoritesStore {
    records: watch::Sender<Records>,
    path: Option<PathBuf>,
    write_lock: Mutex<()>,
}

impl FavoritesStore {
    pub fn in_memory() -> Self {
        Self::with_records(BTreeMap::new(), None)
    }

    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, FavoritesError> {
        let path = path.into();
        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let albums: Vec<Album> =
                    serde_json::from_slice(&bytes).map_err(|source| FavoritesError::Decode {
                        path: path.clone(),
                        source,
                    })?;
                albums.into_iter().map(|a| (a.id, a)).collect()
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(FavoritesError::Io { path, source }),
        };
        info!(path = %path.display(), count = records.len(), "favorites opened");
        Ok(Self::with_records(records, Some(path)))
    }

    fn with_records(records: BTreeMap<i64, Album>, path: Option<PathBuf>) -> Self {
        let (records, _) = watch::channel(Arc::new(records));
        Self {
            records,
            path,
            write_lock: Mutex::new(()),
        }
    }

    /// Inserts or replaces the record with the same id.
    pub async fn add(&self, album: Album) -> Result<(), FavoritesError> {
        let _guard = self.write_lock.lock().await;
        let id = album.id;
        let mut next = (**self.records.borrow()).clone();
        next.insert(id, album);
        self.commit(next).await?;
        debug!(album_id = id, "favorite added");
        Ok(())
    }

    pub async fn remove(&self, album: &Album) -> Result<(), FavoritesError> {
        let _guard = self.write_lock.lock().await;
        let mut next = (**self.records.borrow()).clone();
        if next.remove(&album.id).is_none() {
            return Ok(());
        }
        self.commit(next).await?;
        debug!(album_id = album.id, "favorite removed");
        Ok(())
    }

    pub fn contains(&self, id: i64) -> bool {
        self.records.borrow().contains_key(&id)
    }

    /// Current flag for `id`, then every change to it.
    pub fn is_favorite(&self, id: i64) -> BoxStream<'static, bool> {
        follow(self.records.subscribe(), move |records| {
            records.contains_key(&id)
        })
    }

    /// All records ordered by id, then the full list after every change.
    pub fn list_all(&self) -> BoxStream<'static, Vec<Album>> {
        follow(self.records.subscribe(), |records| {
            records.values().cloned().collect()
        })
    }

    // Callers hold `write_lock`. Memory only moves once the file has.
    async fn commit(&self, records: BTreeMap<i64, Album>) -> Result<(), FavoritesError> {
        if let Some(path) = &self.path {
            let albums: Vec<&Album> = records.values().collect();
            let bytes = serde_json::to_vec_pretty(&albums)?;
            write_atomic(path, &bytes)
                .await
                .map_err(|source| FavoritesError::Io {
                    path: path.clone(),
                    source,
                })?;
        }
        self.records.send_replace(Arc::new(records));
        Ok(())
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await
}

// Projects every snapshot through `project`, skipping repeats.
fn follow<T, F>(rx: watch::Receiver<Records>, project: F) -> BoxStream<'static, T>
where
    T: PartialEq + Clone + Send + 'static,
    F: Fn(&BTreeMap<i64, Album>) -> T + Send + Sync + 'static,
{
    stream::unfold(
        (rx, None::<T>, Arc::new(project)),
        |(mut rx, last, project)| async move {
            loop {
                if last.is_some() && rx.changed().await.is_err() {
                    return None;
                }
                let records = rx.borrow_and_update().clone();
                let value = project(records.as_ref());
                if last.as_ref() != Some(&value) {
                    return Some((value.clone(), (rx, Some(value), project)));
                }
            }
        },
    )
    .boxed()
}
