//! Request and response types as seen by the worker.
//!
//! These mirror what the host runtime hands a background worker on a fetch
//! event: the request identity plus the metadata (mode, destination) the
//! classifier and the cacheability checks need. Headers are kept with
//! lowercased names so lookups are case-insensitive.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use url::Url;

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
  Get,
  Head,
  Post,
  Put,
  Delete,
  Patch,
  Options,
}

impl Method {
  pub fn as_str(&self) -> &'static str {
    match self {
      Method::Get => "GET",
      Method::Head => "HEAD",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Delete => "DELETE",
      Method::Patch => "PATCH",
      Method::Options => "OPTIONS",
    }
  }
}

/// How the request was initiated, as reported by the host runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
  /// Full-document load (address bar, link click, reload).
  Navigate,
  #[default]
  NoCors,
  Cors,
  SameOrigin,
}

/// The kind of resource the request is fetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
  #[default]
  Empty,
  Document,
  Script,
  Style,
  Image,
  Font,
  Audio,
  Video,
}

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub headers: HashMap<String, String>,
  pub mode: RequestMode,
  pub destination: Destination,
}

impl Request {
  /// Create a plain GET request for a URL.
  pub fn get(url: Url) -> Self {
    Self {
      method: Method::Get,
      url,
      headers: HashMap::new(),
      mode: RequestMode::default(),
      destination: Destination::default(),
    }
  }

  pub fn with_method(mut self, method: Method) -> Self {
    self.method = method;
    self
  }

  pub fn with_mode(mut self, mode: RequestMode) -> Self {
    self.mode = mode;
    self
  }

  pub fn with_destination(mut self, destination: Destination) -> Self {
    self.destination = destination;
    self
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.insert(name.to_lowercase(), value.to_string());
    self
  }

  /// Look up a header value (case-insensitive).
  pub fn header(&self, name: &str) -> Option<&str> {
    self.headers.get(&name.to_lowercase()).map(String::as_str)
  }

  pub fn has_header(&self, name: &str) -> bool {
    self.header(name).is_some()
  }
}

/// A captured response: status, headers and full body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
  pub status: u16,
  pub headers: HashMap<String, String>,
  pub body: Vec<u8>,
}

impl Response {
  pub fn new(status: u16) -> Self {
    Self {
      status,
      headers: HashMap::new(),
      body: Vec::new(),
    }
  }

  pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
    self.body = body.into();
    self
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.insert(name.to_lowercase(), value.to_string());
    self
  }

  /// Build a JSON response with the right content type.
  pub fn json(status: u16, value: &serde_json::Value) -> Self {
    Self::new(status)
      .with_header("content-type", "application/json")
      .with_body(value.to_string())
  }

  /// Look up a header value (case-insensitive).
  pub fn header(&self, name: &str) -> Option<&str> {
    self.headers.get(&name.to_lowercase()).map(String::as_str)
  }

  /// Whether the status is in the 2xx range.
  pub fn ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Body size as advertised by Content-Length, falling back to the
  /// captured body length when the header is absent.
  pub fn content_length(&self) -> u64 {
    self
      .header("content-length")
      .and_then(|v| v.parse::<u64>().ok())
      .unwrap_or(self.body.len() as u64)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn header_lookup_is_case_insensitive() {
    let request = Request::get(Url::parse("https://example.com/a").unwrap())
      .with_header("Range", "bytes=0-100");

    assert_eq!(request.header("range"), Some("bytes=0-100"));
    assert_eq!(request.header("RANGE"), Some("bytes=0-100"));
    assert!(request.header("accept").is_none());
  }

  #[test]
  fn content_length_prefers_header() {
    let response = Response::new(200)
      .with_body("abc")
      .with_header("content-length", "12345");

    assert_eq!(response.content_length(), 12345);

    let bare = Response::new(200).with_body("abc");
    assert_eq!(bare.content_length(), 3);
  }

  #[test]
  fn json_response_sets_content_type() {
    let response = Response::json(503, &serde_json::json!({"offline": true}));

    assert_eq!(response.status, 503);
    assert_eq!(response.header("content-type"), Some("application/json"));
    let value: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(value["offline"], true);
  }
}
