pub mod config;
pub mod model;
pub mod urls;

pub use config::{AppConfig, DeviceConfig, PlaybackConfig};
pub use model::{Album, Playlist, Section, Track};
