//! Shared test fixtures: a scripted network fetcher and a canned config.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};

use helpdesk_sw::config::WorkerConfig;
use helpdesk_sw::fetch::Fetcher;
use helpdesk_sw::http::{Request, Response};

pub const APP_URL: &str = "https://support.example.com/index.html";
pub const OFFLINE_URL: &str = "https://support.example.com/offline.html";
pub const STYLES_URL: &str = "https://support.example.com/css/styles.css";

/// Fetcher with scripted responses and a global offline switch.
#[derive(Default)]
pub struct ScriptedFetcher {
  routes: Mutex<HashMap<String, Response>>,
  offline: AtomicBool,
  calls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn respond(&self, url: &str, response: Response) {
    self
      .routes
      .lock()
      .unwrap()
      .insert(url.to_string(), response);
  }

  pub fn respond_text(&self, url: &str, body: &str) {
    self.respond(url, Response::new(200).with_body(body));
  }

  /// Make every subsequent fetch fail like a dead network.
  pub fn go_offline(&self) {
    self.offline.store(true, Ordering::SeqCst);
  }

  pub fn calls_for(&self, url: &str) -> usize {
    self
      .calls
      .lock()
      .unwrap()
      .iter()
      .filter(|u| u.as_str() == url)
      .count()
  }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    self
      .calls
      .lock()
      .unwrap()
      .push(request.url.to_string());

    if self.offline.load(Ordering::SeqCst) {
      return Err(eyre!("connection refused"));
    }

    self
      .routes
      .lock()
      .unwrap()
      .get(request.url.as_str())
      .cloned()
      .ok_or_else(|| eyre!("no route for {}", request.url))
  }
}

/// Config with a three-asset manifest against support.example.com.
pub fn test_config(version: &str) -> WorkerConfig {
  let yaml = format!(
    r#"
version: "{version}"
app_url: "{APP_URL}"
offline_url: "{OFFLINE_URL}"
precache_manifest:
  - "{APP_URL}"
  - "{OFFLINE_URL}"
  - "{STYLES_URL}"
api_patterns:
  - "/api/"
"#
  );

  WorkerConfig::from_yaml(&yaml).unwrap()
}

/// Register 200 responses for every manifest asset.
pub fn script_manifest(fetcher: &ScriptedFetcher) {
  fetcher.respond_text(APP_URL, "<html>app shell</html>");
  fetcher.respond_text(OFFLINE_URL, "<html>you are offline</html>");
  fetcher.respond_text(STYLES_URL, "body { color: #333 }");
}
