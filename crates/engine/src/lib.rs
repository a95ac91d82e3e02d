pub mod error;
pub mod favorites;
pub mod home;
pub mod playlist;
pub mod poller;
pub mod state;
pub mod store;

pub use error::{ErrorReporter, LogReporter, PlaybackError};
pub use favorites::{FavoritesModel, FavoritesState};
pub use home::{HomeFeedModel, HomeFeedState};
pub use playlist::{PlaylistModel, PlaylistState};
pub use poller::{PositionPoller, Tick};
pub use state::PlaybackState;
pub use store::PlaybackStore;
