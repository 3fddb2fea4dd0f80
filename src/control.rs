//! Cross-context control messages from the foreground application.

use serde::{Deserialize, Serialize};

/// A tagged command sent by a foreground page.
///
/// The wire tags are what the application has always sent; anything else is
/// ignored without error.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
  /// Force-activate: stop waiting for old clients to close.
  #[serde(rename = "SKIP_WAITING")]
  SkipWaiting,
  /// Report the active version tag over the caller's reply channel.
  #[serde(rename = "GET_VERSION")]
  GetVersion,
  /// Delete every cache store, any role, any version.
  #[serde(rename = "CLEAR_CACHE")]
  ClearCache,
  #[serde(other)]
  Unknown,
}

impl ControlMessage {
  /// Parse a raw message. Malformed payloads are treated as unknown
  /// commands, not errors.
  pub fn parse(raw: &str) -> Self {
    serde_json::from_str(raw).unwrap_or(ControlMessage::Unknown)
  }
}

/// Reply to a version query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionReply {
  pub version: String,
}
