//! Caching strategies: network-first with fallback, cache-first with
//! background revalidation.

use std::sync::Arc;

use color_eyre::Result;
use tracing::{debug, warn};
use url::Url;

use crate::cache::{CacheStoreManager, StoreBackend};
use crate::classify::RequestClass;
use crate::fetch::Fetcher;
use crate::http::{Destination, Request, Response};

/// Inline placeholder returned for images that cannot be fetched or found.
const PLACEHOLDER_SVG: &str = "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"100\" height=\"100\"><rect fill=\"#f0f0f0\" width=\"100\" height=\"100\"/><text x=\"50\" y=\"50\" text-anchor=\"middle\" fill=\"#999\">Offline</text></svg>";

/// Executes the per-category caching strategy.
pub struct StrategyEngine<F, B>
where
  F: Fetcher + Send + Sync + 'static,
  B: StoreBackend + 'static,
{
  fetcher: Arc<F>,
  manager: CacheStoreManager<B>,
  offline_url: Url,
}

impl<F, B> StrategyEngine<F, B>
where
  F: Fetcher + Send + Sync + 'static,
  B: StoreBackend + 'static,
{
  pub fn new(fetcher: Arc<F>, manager: CacheStoreManager<B>, offline_url: Url) -> Self {
    Self {
      fetcher,
      manager,
      offline_url,
    }
  }

  /// Dispatch a classified request to its strategy.
  ///
  /// Api and Navigation never return an error; Static propagates a network
  /// failure on a cache miss (except images, which get a placeholder).
  pub async fn handle(&self, request: &Request, class: RequestClass) -> Result<Response> {
    match class {
      RequestClass::Api | RequestClass::Navigation => {
        Ok(self.network_first(request, class).await)
      }
      RequestClass::Static => self.cache_first(request).await,
    }
  }

  /// Network first; on failure fall back to cache, then to a synthesized
  /// offline response.
  async fn network_first(&self, request: &Request, class: RequestClass) -> Response {
    match self.fetcher.fetch(request).await {
      Ok(response) => {
        if response.ok() {
          self.write_detached(request.clone(), response.clone());
        }
        response
      }
      Err(e) => {
        debug!(url = %request.url, error = %e, "network failed, checking cache");

        if let Some(entry) = self.manager.read(request) {
          return entry.response;
        }

        match class {
          RequestClass::Api => offline_api_response(),
          _ => self.offline_page(),
        }
      }
    }
  }

  /// Cache first; a hit returns immediately and schedules a detached
  /// revalidation, a miss goes to the network.
  async fn cache_first(&self, request: &Request) -> Result<Response> {
    if let Some(entry) = self.manager.read(request) {
      self.revalidate(request.clone());
      return Ok(entry.response);
    }

    match self.fetcher.fetch(request).await {
      Ok(response) => {
        self.manager.write(request, &response);
        Ok(response)
      }
      Err(e) => {
        if request.destination == Destination::Image {
          debug!(url = %request.url, "image unavailable, serving placeholder");
          return Ok(placeholder_image());
        }
        Err(e)
      }
    }
  }

  /// Refetch a request in the background and store the result.
  ///
  /// Deliberately not awaited by any response path; failures are logged and
  /// swallowed since a cached copy is already being served. The write goes
  /// through the same cacheability verdict as the primary path.
  pub fn revalidate(&self, request: Request) {
    let fetcher = Arc::clone(&self.fetcher);
    let manager = self.manager.clone();

    tokio::spawn(async move {
      match fetcher.fetch(&request).await {
        Ok(response) => manager.write(&request, &response),
        Err(e) => debug!(url = %request.url, error = %e, "background revalidation failed"),
      }
    });
  }

  /// Store a fresh response without blocking the response path.
  fn write_detached(&self, request: Request, response: Response) {
    let manager = self.manager.clone();
    tokio::spawn(async move {
      manager.write(&request, &response);
    });
  }

  /// The precached offline fallback page, or a synthesized stand-in if it is
  /// missing (e.g. right after a purge).
  fn offline_page(&self) -> Response {
    if let Some(entry) = self.manager.read_url(&self.offline_url) {
      return entry.response;
    }

    warn!(url = %self.offline_url, "offline page not cached, synthesizing fallback");
    Response::new(503)
      .with_header("content-type", "text/html")
      .with_body("<h1>You are offline</h1>")
  }
}

impl<F, B> Clone for StrategyEngine<F, B>
where
  F: Fetcher + Send + Sync + 'static,
  B: StoreBackend + 'static,
{
  fn clone(&self) -> Self {
    Self {
      fetcher: Arc::clone(&self.fetcher),
      manager: self.manager.clone(),
      offline_url: self.offline_url.clone(),
    }
  }
}

/// Structured response for API calls made while offline, detectable by the
/// foreground application.
fn offline_api_response() -> Response {
  Response::json(
    503,
    &serde_json::json!({
      "success": false,
      "offline": true,
      "message": "You are offline. Please check your internet connection."
    }),
  )
}

fn placeholder_image() -> Response {
  Response::new(200)
    .with_header("content-type", "image/svg+xml")
    .with_body(PLACEHOLDER_SVG)
}
