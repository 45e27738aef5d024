use serde::Serialize;
use thiserror::Error;

const EMBED_BASE: &str = "https://www.youtube.com/embed/";

/// Path prefixes on the full youtube.com host that carry the id as the next segment.
const ID_PATH_PREFIXES: [&str; 4] = ["embed", "shorts", "live", "v"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizationError {
    #[error("unrecognized YouTube URL")]
    Unrecognized,
}

/// A video identifier extracted from a YouTube link, plus its player URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoRef {
    pub video_id: String,
    pub embed_url: String,
}

impl VideoRef {
    fn from_id(id: &str) -> Self {
        Self {
            video_id: id.to_string(),
            embed_url: embed_url(id),
        }
    }
}

pub fn embed_url(video_id: &str) -> String {
    format!("{}{}", EMBED_BASE, video_id)
}

/// Maps a YouTube link to its video id.
///
/// Accepted shapes:
/// - any URL with a `v=` query parameter (`watch?v=ID&t=5s`), first one wins
/// - `youtu.be/ID`
/// - `youtube.com/{embed,shorts,live,v}/ID`
///
/// Pure string analysis; a well-formed id for a video that does not exist is accepted.
pub fn normalize(raw_url: &str) -> Result<VideoRef, NormalizationError> {
    let url = raw_url.trim();
    if url.is_empty() {
        return Err(NormalizationError::Unrecognized);
    }

    // Fragments never carry the id.
    let url = url.split('#').next().unwrap_or(url);

    let candidate = match query_param_v(url) {
        Some(id) => Some(id),
        None => path_id(url),
    };

    match candidate {
        Some(id) if is_valid_id(id) => Ok(VideoRef::from_id(id)),
        _ => Err(NormalizationError::Unrecognized),
    }
}

fn query_param_v(url: &str) -> Option<&str> {
    let (_, query) = url.split_once('?')?;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "v")
        .map(|(_, value)| value)
}

fn path_id(url: &str) -> Option<&str> {
    let without_scheme = match url.split_once("://") {
        Some((scheme, rest))
            if scheme.eq_ignore_ascii_case("https") || scheme.eq_ignore_ascii_case("http") =>
        {
            rest
        }
        Some((scheme, _)) if scheme.chars().all(|c| c.is_ascii_alphabetic()) => return None,
        _ => url,
    };
    let without_query = without_scheme.split('?').next().unwrap_or(without_scheme);

    let (host, path) = without_query.split_once('/')?;
    let host = host.to_ascii_lowercase();
    let host = host
        .strip_prefix("www.")
        .or_else(|| host.strip_prefix("m."))
        .unwrap_or(&host);

    let mut segments = path.split('/').filter(|s| !s.is_empty());
    match host {
        "youtu.be" => segments.last(),
        "youtube.com" | "youtube-nocookie.com" => {
            let prefix = segments.next()?;
            if ID_PATH_PREFIXES.contains(&prefix) {
                segments.next()
            } else {
                None
            }
        }
        _ => None,
    }
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
