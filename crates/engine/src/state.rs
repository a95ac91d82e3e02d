use playbar_core::{Album, Track};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlaybackState {
    pub track: Option<Track>,
    pub album: Option<Album>,
    pub is_playing: bool,
    pub position_ms: u64,
    pub duration_ms: u64,
}

impl PlaybackState {
    /// Fresh state right after a load. Track and album are only ever set
    /// here, together.
    pub fn loaded(track: Track, album: Album) -> Self {
        Self {
            track: Some(track),
            album: Some(album),
            is_playing: false,
            position_ms: 0,
            duration_ms: 0,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.track.is_some()
    }

    pub fn with_playing(&self, is_playing: bool) -> Self {
        Self {
            is_playing,
            ..self.clone()
        }
    }

    pub fn with_position(&self, position_ms: u64, duration_ms: u64) -> Self {
        Self {
            position_ms,
            duration_ms,
            ..self.clone()
        }
    }

    /// Not clamped against the duration; a pending seek may overshoot.
    pub fn with_seek(&self, position_ms: u64) -> Self {
        Self {
            position_ms,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PlaybackState;
    use playbar_core::{Album, Track};

    fn track() -> Track {
        Track {
            name: "Anti-Hero".to_string(),
            src: "sim://anti-hero".to_string(),
            ..Track::default()
        }
    }

    #[test]
    fn load_resets_position_and_playing() {
        let playing = PlaybackState::default()
            .with_playing(true)
            .with_position(42_000, 200_000);
        let next = PlaybackState::loaded(track(), Album::empty());

        assert!(playing.is_playing);
        assert!(next.is_visible());
        assert!(!next.is_playing);
        assert_eq!((next.position_ms, next.duration_ms), (0, 0));
    }

    #[test]
    fn position_merge_leaves_other_fields() {
        let base = PlaybackState::loaded(track(), Album::empty()).with_playing(true);
        let ticked = base.with_position(5_000, 200_000);

        assert_eq!(ticked.track, base.track);
        assert_eq!(ticked.album, base.album);
        assert!(ticked.is_playing);
        assert_eq!(ticked.position_ms, 5_000);
    }

    #[test]
    fn seek_is_not_clamped() {
        let s = PlaybackState::default().with_position(0, 1_000).with_seek(5_000);
        assert_eq!(s.position_ms, 5_000);
        assert_eq!(s.duration_ms, 1_000);
    }
}
