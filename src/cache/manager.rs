//! Store lifecycle: creation, population, lookup and teardown.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::fetch::Fetcher;
use crate::http::{Method, Request, Response};

use super::backend::{CacheEntry, QuotaExceeded, StoreBackend};
use super::verdict;

/// The two roles a store can play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreRole {
  /// Populated once at install from the manifest; immutable until the next
  /// version.
  Precache,
  /// Populated lazily from responses observed at runtime.
  Dynamic,
}

/// Owns named, versioned cache stores over a storage backend.
///
/// At most one store per role is current; every other store sharing the
/// prefix belongs to an older deployment and is only ever deleted.
pub struct CacheStoreManager<B: StoreBackend> {
  backend: Arc<B>,
  prefix: String,
  version: String,
}

impl<B: StoreBackend> CacheStoreManager<B> {
  pub fn new(backend: B, prefix: &str, version: &str) -> Self {
    Self {
      backend: Arc::new(backend),
      prefix: prefix.to_string(),
      version: version.to_string(),
    }
  }

  /// The active version tag.
  pub fn version_tag(&self) -> &str {
    &self.version
  }

  /// Current store name for a role.
  pub fn store_name(&self, role: StoreRole) -> String {
    match role {
      StoreRole::Precache => format!("{}-v{}", self.prefix, self.version),
      StoreRole::Dynamic => format!("{}-dynamic-v{}", self.prefix, self.version),
    }
  }

  /// Populate the precache from the install manifest.
  ///
  /// All manifest URLs are fetched concurrently; any failure (network error,
  /// non-200 status, or a partial response) fails the whole install attempt
  /// so the host retries it later. Precache writes skip the media and size
  /// checks of the cacheability verdict - the manifest is trusted first-party
  /// content - but a partial response is never stored, anywhere.
  pub async fn initialize<F: Fetcher + ?Sized>(&self, fetcher: &F, manifest: &[Url]) -> Result<()> {
    let store = self.store_name(StoreRole::Precache);
    self.backend.open_store(&store)?;

    let fetches = manifest.iter().map(|url| async move {
      let request = Request::get(url.clone());
      let response = fetcher
        .fetch(&request)
        .await
        .map_err(|e| eyre!("Manifest fetch failed for {}: {}", url, e))?;

      if response.status != 200 {
        return Err(eyre!(
          "Manifest fetch for {} returned status {}",
          url,
          response.status
        ));
      }

      if response.header("content-range").is_some() {
        return Err(eyre!("Manifest fetch for {} returned a partial response", url));
      }

      Ok::<(Url, Response), color_eyre::Report>((url.clone(), response))
    });

    let fetched = futures::future::try_join_all(fetches).await?;

    for (url, response) in fetched {
      let key = verdict::entry_key(Method::Get, &url);
      let entry = CacheEntry {
        url: url.to_string(),
        response,
        cached_at: Utc::now(),
      };
      self.backend.put(&store, &key, &entry)?;
    }

    info!(store = %store, assets = manifest.len(), "precache populated");
    Ok(())
  }

  /// Delete every store that is not current for some role.
  ///
  /// Also makes sure both current stores exist, so a worker that activates
  /// after a purge starts from a clean but valid state. Idempotent.
  pub fn reclaim(&self) -> Result<Vec<String>> {
    let current = [
      self.store_name(StoreRole::Precache),
      self.store_name(StoreRole::Dynamic),
    ];

    let mut deleted = Vec::new();
    for name in self.backend.store_names()? {
      if !current.contains(&name) {
        info!(store = %name, "deleting stale cache store");
        self.backend.delete_store(&name)?;
        deleted.push(name);
      }
    }

    for name in &current {
      self.backend.open_store(name)?;
    }

    Ok(deleted)
  }

  /// Look up a stored response for a request.
  ///
  /// The dynamic store is consulted first so a revalidated asset shadows its
  /// precached original. Backend faults are reported as a miss, never as an
  /// error.
  pub fn read(&self, request: &Request) -> Option<CacheEntry> {
    self.read_key(&verdict::entry_key(request.method, &request.url))
  }

  /// Look up a stored response by URL (plain GET identity).
  pub fn read_url(&self, url: &Url) -> Option<CacheEntry> {
    self.read_key(&verdict::entry_key(Method::Get, url))
  }

  fn read_key(&self, key: &str) -> Option<CacheEntry> {
    for role in [StoreRole::Dynamic, StoreRole::Precache] {
      match self.backend.get(&self.store_name(role), key) {
        Ok(Some(entry)) => return Some(entry),
        Ok(None) => {}
        Err(e) => warn!(error = %e, "cache lookup failed, treating as miss"),
      }
    }
    None
  }

  /// Store a response in the dynamic store if the verdict accepts it.
  ///
  /// Never fails: rejected responses are dropped silently, and on quota
  /// exhaustion the whole dynamic store is dropped and recreated empty. The
  /// triggering write is lost so that future writes keep working.
  pub fn write(&self, request: &Request, response: &Response) {
    if !verdict::cacheable(request, response) {
      debug!(url = %request.url, "response not cacheable, skipping");
      return;
    }

    let store = self.store_name(StoreRole::Dynamic);
    let key = verdict::entry_key(request.method, &request.url);
    let entry = CacheEntry {
      url: request.url.to_string(),
      response: response.clone(),
      cached_at: Utc::now(),
    };

    if let Err(e) = self.backend.put(&store, &key, &entry) {
      if e.downcast_ref::<QuotaExceeded>().is_some() {
        warn!(store = %store, "storage quota exceeded, dropping dynamic store");
        if let Err(e) = self
          .backend
          .delete_store(&store)
          .and_then(|_| self.backend.open_store(&store))
        {
          warn!(error = %e, "failed to recreate dynamic store");
        }
        // The triggering write is not retried.
      } else {
        warn!(url = %request.url, error = %e, "cache put failed");
      }
    } else {
      debug!(url = %request.url, "cached");
    }
  }

  /// Delete every store, of any role or version.
  pub fn purge(&self) -> Result<usize> {
    let names = self.backend.store_names()?;
    for name in &names {
      self.backend.delete_store(name)?;
    }

    info!(count = names.len(), "purged all cache stores");
    Ok(names.len())
  }

  /// Names of all existing stores.
  pub fn store_names(&self) -> Result<Vec<String>> {
    self.backend.store_names()
  }

  /// Number of entries in the store for a role.
  pub fn entry_count(&self, role: StoreRole) -> Result<usize> {
    self.backend.entry_count(&self.store_name(role))
  }
}

impl<B: StoreBackend> Clone for CacheStoreManager<B> {
  fn clone(&self) -> Self {
    Self {
      backend: Arc::clone(&self.backend),
      prefix: self.prefix.clone(),
      version: self.version.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryBackend;

  fn manager(backend: MemoryBackend, version: &str) -> CacheStoreManager<MemoryBackend> {
    CacheStoreManager::new(backend, "helpdesk", version)
  }

  fn get(url: &str) -> Request {
    Request::get(Url::parse(url).unwrap())
  }

  #[test]
  fn write_then_read_roundtrips() {
    let m = manager(MemoryBackend::new(), "1");
    let request = get("https://example.com/styles.css");
    let response = Response::new(200).with_body("body {}");

    m.write(&request, &response);

    let entry = m.read(&request).unwrap();
    assert_eq!(entry.response.body, b"body {}");
  }

  #[test]
  fn rejected_responses_are_never_written() {
    let m = manager(MemoryBackend::new(), "1");
    let request = get("https://example.com/clip.mp3");

    m.write(&request, &Response::new(200).with_body("audio"));

    assert!(m.read(&request).is_none());
    assert_eq!(m.entry_count(StoreRole::Dynamic).unwrap(), 0);
  }

  #[test]
  fn reclaim_deletes_only_stale_versions() {
    let backend = MemoryBackend::new();
    backend.open_store("helpdesk-v1").unwrap();
    backend.open_store("helpdesk-dynamic-v1").unwrap();

    let m = manager(backend, "2");
    let deleted = m.reclaim().unwrap();

    assert_eq!(
      deleted,
      vec!["helpdesk-dynamic-v1".to_string(), "helpdesk-v1".to_string()]
    );
    assert_eq!(
      m.store_names().unwrap(),
      vec![
        "helpdesk-dynamic-v2".to_string(),
        "helpdesk-v2".to_string()
      ]
    );

    // Running again with no version change deletes nothing extra
    assert!(m.reclaim().unwrap().is_empty());
  }

  #[test]
  fn quota_exhaustion_drops_and_recreates_the_dynamic_store() {
    let m = manager(MemoryBackend::with_entry_cap(1), "1");

    let first = get("https://example.com/one.css");
    m.write(&first, &Response::new(200).with_body("one"));
    assert!(m.read(&first).is_some());

    // Second distinct key trips the cap; the store is dropped, the write lost
    let second = get("https://example.com/two.css");
    m.write(&second, &Response::new(200).with_body("two"));
    assert!(m.read(&first).is_none());
    assert!(m.read(&second).is_none());
    assert_eq!(m.entry_count(StoreRole::Dynamic).unwrap(), 0);

    // The recreated store accepts future writes
    m.write(&second, &Response::new(200).with_body("two"));
    assert!(m.read(&second).is_some());
  }

  #[test]
  fn purge_leaves_a_recreatable_state() {
    let m = manager(MemoryBackend::new(), "1");
    m.write(
      &get("https://example.com/a.css"),
      &Response::new(200).with_body("a"),
    );

    assert_eq!(m.purge().unwrap(), 1);
    assert!(m.store_names().unwrap().is_empty());

    m.write(
      &get("https://example.com/a.css"),
      &Response::new(200).with_body("a"),
    );
    assert!(m.read(&get("https://example.com/a.css")).is_some());
  }
}
