use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use playbar_catalog::{CatalogApi, FavoritesStore, HttpCatalog};
use playbar_core::{Album, AppConfig};
use playbar_device::{build_device, DeviceFault};
use playbar_engine::{
    ErrorReporter, FavoritesModel, HomeFeedModel, LogReporter, PlaybackState, PlaybackStore,
    PlaylistModel,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "playbar", about = "Catalog -> Playback store -> Player device")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the home feed.
    Feed,
    /// Print the songs of one album.
    Playlist { album_id: i64 },
    Favorites {
        #[command(subcommand)]
        action: FavoritesAction,
    },
    /// Play one song of an album and follow its progress.
    Play {
        album_id: i64,
        #[arg(long, default_value_t = 0)]
        track: usize,
        #[arg(long)]
        seek: Option<u64>,
    },
    Doctor,
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum FavoritesAction {
    List,
    Add { album_id: i64 },
    Remove { album_id: i64 },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg_path = cli.config.unwrap_or_else(default_config_path);

    if let Commands::Config {
        action: ConfigAction::Init,
    } = cli.command
    {
        init_config(&cfg_path)?;
        println!("Initialized config at {}", cfg_path.display());
        return Ok(());
    }

    let cfg = load_or_default(&cfg_path)?;
    init_logging(&cfg.log_level);

    match cli.command {
        Commands::Feed => feed(&cfg).await,
        Commands::Playlist { album_id } => playlist(&cfg, album_id).await,
        Commands::Favorites { action } => favorites(&cfg, action).await,
        Commands::Play {
            album_id,
            track,
            seek,
        } => play(&cfg, album_id, track, seek).await,
        Commands::Doctor => doctor(&cfg).await,
        Commands::Config { .. } => Ok(()),
    }
}

fn catalog(cfg: &AppConfig) -> Result<Arc<dyn CatalogApi>> {
    let client = HttpCatalog::new(
        &cfg.catalog_base_url,
        Duration::from_millis(cfg.request_timeout_ms),
    )
    .with_context(|| format!("invalid catalog url {}", cfg.catalog_base_url))?;
    Ok(Arc::new(client))
}

async fn open_favorites(cfg: &AppConfig) -> Result<Arc<FavoritesStore>> {
    let store = match &cfg.favorites_path {
        Some(path) => FavoritesStore::open(path).await?,
        None => FavoritesStore::in_memory(),
    };
    Ok(Arc::new(store))
}

// The catalog has no album-by-id endpoint, so album metadata comes from
// the home feed.
async fn find_album(catalog: &dyn CatalogApi, album_id: i64) -> Result<Option<Album>> {
    let feed = catalog
        .fetch_home_feed()
        .await
        .context("failed to fetch home feed")?;
    Ok(feed
        .into_iter()
        .flat_map(|section| section.albums)
        .find(|album| album.id == album_id))
}

async fn feed(cfg: &AppConfig) -> Result<()> {
    let model = HomeFeedModel::new(catalog(cfg)?);
    model.refresh().await.context("failed to fetch home feed")?;

    for section in model.current().feed {
        println!("{}", section.section_title);
        for album in section.albums {
            println!(
                "  [{}] {} - {} ({})",
                album.id, album.album, album.artists, album.year
            );
        }
    }
    Ok(())
}

async fn playlist(cfg: &AppConfig, album_id: i64) -> Result<()> {
    let catalog = catalog(cfg)?;
    let album = find_album(catalog.as_ref(), album_id)
        .await?
        .unwrap_or(Album {
            id: album_id,
            album: format!("album {album_id}"),
            ..Album::default()
        });
    let model = PlaylistModel::new(catalog, open_favorites(cfg).await?);
    model
        .open(album)
        .await
        .with_context(|| format!("failed to fetch playlist {album_id}"))?;

    let state = model.current();
    let marker = if state.is_favorite { " *" } else { "" };
    println!("{}{}", state.album.album, marker);
    for (i, song) in state.playlist.iter().enumerate() {
        println!("  {i:>2}. {} ({})", song.name, song.length);
    }
    model.close();
    Ok(())
}

async fn favorites(cfg: &AppConfig, action: FavoritesAction) -> Result<()> {
    let store = open_favorites(cfg).await?;
    if cfg.favorites_path.is_none() && !matches!(action, FavoritesAction::List) {
        warn!("favorites_path is not set; changes will not be kept");
    }

    match action {
        FavoritesAction::List => {
            let model = FavoritesModel::new(store.clone());
            let albums = model.current().albums;
            model.close();
            if albums.is_empty() {
                println!("no favorites");
            }
            for album in albums {
                println!("[{}] {} - {}", album.id, album.album, album.artists);
            }
        }
        FavoritesAction::Add { album_id } => {
            let catalog = catalog(cfg)?;
            let Some(album) = find_album(catalog.as_ref(), album_id).await? else {
                bail!("album {album_id} is not in the home feed");
            };
            let name = album.album.clone();
            store.add(album).await?;
            println!("added {name}");
        }
        FavoritesAction::Remove { album_id } => {
            let album = Album {
                id: album_id,
                ..Album::default()
            };
            store.remove(&album).await?;
            println!("removed {album_id}");
        }
    }
    Ok(())
}

async fn play(cfg: &AppConfig, album_id: i64, index: usize, seek: Option<u64>) -> Result<()> {
    let catalog = catalog(cfg)?;
    let album = find_album(catalog.as_ref(), album_id)
        .await?
        .with_context(|| format!("album {album_id} is not in the home feed"))?;
    let playlist = catalog
        .fetch_playlist(album_id)
        .await
        .with_context(|| format!("failed to fetch playlist {album_id}"))?;
    let track = playlist
        .songs
        .get(index)
        .cloned()
        .with_context(|| format!("album {album_id} has no track #{index}"))?;

    let (fault_tx, mut faults) = mpsc::unbounded_channel();
    let device = build_device(&cfg.device);
    let store = PlaybackStore::new(device, Arc::new(FaultRelay(fault_tx)), &cfg.playback);
    let mut rx = store.observe();

    store.load(track, album).await?;
    store.play().await?;
    if let Some(position_ms) = seek {
        store.seek_to(position_ms).await?;
    }

    let mut started = false;
    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = rx.borrow_and_update().clone();
                print_state(&state);
                if state.is_playing {
                    started = true;
                } else if started {
                    info!("playback stopped");
                    break;
                }
            }
            Some(fault) = faults.recv() => {
                store.shutdown();
                bail!("player device failed: {fault}");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received ctrl-c; stopping playback");
                if let Err(err) = store.pause().await {
                    warn!(error = %err, "pause on exit failed");
                }
                break;
            }
        }
    }

    store.shutdown();
    Ok(())
}

// Logs device faults and forwards them so `play` can stop waiting.
struct FaultRelay(mpsc::UnboundedSender<DeviceFault>);

impl ErrorReporter for FaultRelay {
    fn report(&self, device: &str, fault: &DeviceFault) {
        LogReporter.report(device, fault);
        let _ = self.0.send(fault.clone());
    }
}

fn print_state(state: &PlaybackState) {
    let title = state.track.as_ref().map(|t| t.name.as_str()).unwrap_or("-");
    let icon = if state.is_playing { ">" } else { "||" };
    println!(
        "{icon} {title} {} / {}",
        format_ms(state.position_ms),
        format_ms(state.duration_ms)
    );
}

fn format_ms(ms: u64) -> String {
    let secs = ms / 1_000;
    format!("{}:{:02}", secs / 60, secs % 60)
}

async fn doctor(cfg: &AppConfig) -> Result<()> {
    println!("== playbar doctor ==");
    println!("Catalog: {}", cfg.catalog_base_url);

    match catalog(cfg) {
        Ok(catalog) => match catalog.fetch_home_feed().await {
            Ok(feed) => println!("Catalog reachable: {} sections", feed.len()),
            Err(err) => println!("Catalog error: {err}"),
        },
        Err(err) => println!("Catalog config error: {err:#}"),
    }

    match &cfg.favorites_path {
        Some(path) => match FavoritesStore::open(path).await {
            Ok(store) => {
                let count = store.list_all().next().await.map(|a| a.len()).unwrap_or(0);
                println!("Favorites: {} ({count} albums)", path.display());
            }
            Err(err) => println!("Favorites error: {err}"),
        },
        None => println!("Favorites: in memory only (favorites_path not set)"),
    }

    let device = build_device(&cfg.device);
    println!(
        "Device: {} (poll every {} ms)",
        device.name(),
        cfg.playback.position_poll_ms
    );
    Ok(())
}

fn default_config_path() -> PathBuf {
    let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("playbar").join("config.toml")
}

fn init_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }
    let cfg = AppConfig::default();
    let toml = toml::to_string_pretty(&cfg)?;
    std::fs::write(path, toml)
        .with_context(|| format!("failed to write config file {}", path.display()))?;
    Ok(())
}

fn load_or_default(path: &Path) -> Result<AppConfig> {
    let mut cfg = if !path.exists() {
        AppConfig::default()
    } else {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&data).with_context(|| format!("failed to parse {}", path.display()))?
    };
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

fn init_logging(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .try_init();
}

fn apply_env_overrides(cfg: &mut AppConfig) {
    if let Ok(v) = std::env::var("PLAYBAR_CATALOG_URL") {
        if !v.trim().is_empty() {
            cfg.catalog_base_url = v;
        }
    }
    if let Ok(v) = std::env::var("PLAYBAR_LOG_LEVEL") {
        if !v.trim().is_empty() {
            cfg.log_level = v;
        }
    }
    if let Ok(v) = std::env::var("PLAYBAR_POLL_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            cfg.playback.position_poll_ms = parsed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{format_ms, load_or_default};

    #[test]
    fn formats_minutes_and_seconds() {
        assert_eq!(format_ms(0), "0:00");
        assert_eq!(format_ms(201_500), "3:21");
    }

    #[test]
    fn missing_config_file_means_defaults() {
        let cfg = load_or_default(std::path::Path::new("/nonexistent/playbar.toml")).unwrap();
        assert_eq!(cfg.schema_version, 1);
    }
}
