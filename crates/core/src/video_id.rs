use std::fmt;

use reqwest::Url;
use serde::Serialize;

const MIN_ID_LEN: usize = 6;
const PATH_MARKERS: [&str; 4] = ["shorts", "embed", "live", "v"];
const YOUTUBE_HOSTS: [&str; 5] = [
    "youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtube-nocookie.com",
    "youtu.be",
];

/// A validated video identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct VideoId(String);

impl VideoId {
    /// Parses a bare id or a watch/short/embed/live URL on a YouTube host.
    /// Returns `None` for anything that does not carry a plausible id.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }

        if !input.contains('/') && !input.contains('?') && !input.contains('.') {
            return Self::from_candidate(input);
        }

        let url = parse_url(input)?;
        let host = url.host_str()?.to_ascii_lowercase();
        let host = host.strip_prefix("www.").unwrap_or(&host);
        if !YOUTUBE_HOSTS.contains(&host) {
            return None;
        }

        let mut segments = url.path_segments()?.filter(|s| !s.is_empty());
        if host == "youtu.be" {
            return Self::from_candidate(segments.next()?);
        }

        if let Some(id) = url
            .query_pairs()
            .find(|(k, _)| k == "v")
            .and_then(|(_, v)| Self::from_candidate(&v))
        {
            return Some(id);
        }

        let marker = segments.next()?;
        if !PATH_MARKERS.contains(&marker) {
            return None;
        }
        Self::from_candidate(segments.next()?)
    }

    fn from_candidate(candidate: &str) -> Option<Self> {
        (candidate.len() >= MIN_ID_LEN && candidate.chars().all(is_id_char)).then(|| Self(candidate.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.0)
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Accepts scheme-less input such as `youtu.be/<id>`.
fn parse_url(input: &str) -> Option<Url> {
    match Url::parse(input) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Some(url),
        Ok(_) => None,
        Err(_) => Url::parse(&format!("https://{input}")).ok(),
    }
}
