use url::Url;

/// Parses the catalog base, forcing a trailing slash so relative joins keep
/// any path prefix (`http://host/api` + `feed` -> `http://host/api/feed`).
pub fn catalog_base(raw: &str) -> Result<Url, url::ParseError> {
    if raw.ends_with('/') {
        Url::parse(raw)
    } else {
        Url::parse(&format!("{raw}/"))
    }
}

pub fn home_feed_url(base: &Url) -> Result<Url, url::ParseError> {
    base.join("feed")
}

pub fn playlist_url(base: &Url, id: i64) -> Result<Url, url::ParseError> {
    base.join(&format!("playlist/{id}"))
}
