//! Cacheability decisions and request identity keys.

use sha2::{Digest, Sha256};
use url::Url;

use crate::http::{Destination, Method, Request, Response};

/// Responses larger than this are never cached (5 MiB).
pub const MAX_CACHEABLE_BYTES: u64 = 5 * 1024 * 1024;

/// File extensions treated as media regardless of destination.
const MEDIA_EXTENSIONS: &[&str] = &[
  "mp3", "wav", "ogg", "mp4", "webm", "m4a", "flac", "aac", "avi", "mov", "wmv", "mkv",
];

/// Decide whether a response may be stored.
///
/// Rejects anything that is not a complete 200 GET response, anything ranged
/// or partial, media traffic, and oversized bodies. The same verdict gates
/// both the primary write path and background revalidation.
pub fn cacheable(request: &Request, response: &Response) -> bool {
  if request.method != Method::Get {
    return false;
  }
  if response.status != 200 {
    return false;
  }
  // A ranged request or a partial response must never be stored.
  if request.has_header("range") || response.header("content-range").is_some() {
    return false;
  }
  if matches!(
    request.destination,
    Destination::Audio | Destination::Video
  ) {
    return false;
  }
  if has_media_extension(&request.url) {
    return false;
  }
  if response.content_length() > MAX_CACHEABLE_BYTES {
    return false;
  }

  true
}

fn has_media_extension(url: &Url) -> bool {
  let path = url.path().to_lowercase();
  match path.rsplit_once('.') {
    Some((_, ext)) => MEDIA_EXTENSIONS.contains(&ext),
    None => false,
  }
}

/// Stable identity key for a cache entry: SHA-256 over method and URL.
pub fn entry_key(method: Method, url: &Url) -> String {
  let mut hasher = Sha256::new();
  hasher.update(method.as_str().as_bytes());
  hasher.update(b" ");
  hasher.update(url.as_str().as_bytes());
  hex::encode(hasher.finalize())
}
