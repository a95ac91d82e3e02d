use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Track {
    pub name: String,
    #[serde(default)]
    pub lyric: String,
    /// Media URI handed to the player device.
    pub src: String,
    /// Display length as served by the catalog, e.g. "3:41".
    #[serde(default)]
    pub length: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Album {
    pub id: i64,
    pub album: String,
    #[serde(default)]
    pub year: String,
    #[serde(default)]
    pub cover: String,
    #[serde(default)]
    pub artists: String,
    #[serde(default)]
    pub description: String,
}

impl Album {
    pub fn empty() -> Self {
        Self {
            id: -1,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Section {
    pub section_title: String,
    pub albums: Vec<Album>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Playlist {
    pub id: i64,
    pub songs: Vec<Track>,
}

#[cfg(test)]
mod tests {
    use super::{Album, Section};

    #[test]
    fn decodes_feed_with_missing_optional_fields() {
        let raw = r#"[{"section_title":"Top 2023","albums":[{"id":1,"album":"Midnights"}]}]"#;
        let feed: Vec<Section> = serde_json::from_str(raw).unwrap();

        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].section_title, "Top 2023");
        assert_eq!(feed[0].albums[0].album, "Midnights");
        assert!(feed[0].albums[0].cover.is_empty());
    }

    #[test]
    fn empty_album_has_sentinel_id() {
        assert_eq!(Album::empty().id, -1);
    }
}
