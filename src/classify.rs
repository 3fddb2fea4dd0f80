//! Request classification ahead of strategy dispatch.

use crate::http::{Method, Request, RequestMode};

/// The category a request is handled under. Each intercepted request maps to
/// exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
  /// Remote ticket-API traffic.
  Api,
  /// Full-document load.
  Navigation,
  /// Everything else: scripts, styles, images, fonts.
  Static,
}

/// Classifies intercepted requests.
///
/// The checks are order-sensitive: API match before navigation before the
/// static default, so a request can never land in two categories.
#[derive(Debug, Clone)]
pub struct Classifier {
  api_patterns: Vec<String>,
}

impl Classifier {
  pub fn new(api_patterns: Vec<String>) -> Self {
    Self { api_patterns }
  }

  /// Classify a request. `None` means pass through untouched: the worker
  /// does not intercept non-GET traffic or non-http(s) schemes.
  pub fn classify(&self, request: &Request) -> Option<RequestClass> {
    if request.method != Method::Get {
      return None;
    }
    if !matches!(request.url.scheme(), "http" | "https") {
      return None;
    }

    let url = request.url.as_str();
    if self.api_patterns.iter().any(|p| url.contains(p.as_str())) {
      return Some(RequestClass::Api);
    }

    if request.mode == RequestMode::Navigate {
      return Some(RequestClass::Navigation);
    }

    Some(RequestClass::Static)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use url::Url;

  fn classifier() -> Classifier {
    Classifier::new(vec![
      "/api/".to_string(),
      "script.google.com".to_string(),
    ])
  }

  fn get(url: &str) -> Request {
    Request::get(Url::parse(url).unwrap())
  }

  #[test]
  fn non_get_passes_through() {
    let request = get("https://support.example.com/api/tickets").with_method(Method::Post);
    assert_eq!(classifier().classify(&request), None);
  }

  #[test]
  fn non_http_schemes_pass_through() {
    assert_eq!(
      classifier().classify(&get("chrome-extension://abcdef/page.html")),
      None
    );
    assert_eq!(classifier().classify(&get("data:text/plain,hi")), None);
  }

  #[test]
  fn api_patterns_match_anywhere_in_the_url() {
    assert_eq!(
      classifier().classify(&get("https://support.example.com/api/tickets?id=1")),
      Some(RequestClass::Api)
    );
    assert_eq!(
      classifier().classify(&get("https://script.google.com/macros/exec")),
      Some(RequestClass::Api)
    );
  }

  #[test]
  fn api_check_wins_over_navigation() {
    let request =
      get("https://support.example.com/api/report").with_mode(RequestMode::Navigate);
    assert_eq!(classifier().classify(&request), Some(RequestClass::Api));
  }

  #[test]
  fn navigation_and_static_fall_through_in_order() {
    let nav = get("https://support.example.com/index.html").with_mode(RequestMode::Navigate);
    assert_eq!(classifier().classify(&nav), Some(RequestClass::Navigation));

    let asset = get("https://support.example.com/css/styles.css");
    assert_eq!(classifier().classify(&asset), Some(RequestClass::Static));
  }
}
