//! Worker composition: lifecycle methods and the event dispatch loop.
//!
//! Every platform event the worker reacts to is a named method here, so
//! tests can drive the worker directly. [`Worker::run`] is the single place
//! those methods get wired to event dispatch.

use std::sync::Arc;

use color_eyre::Result;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::cache::{CacheStoreManager, StoreBackend};
use crate::classify::Classifier;
use crate::config::WorkerConfig;
use crate::control::{ControlMessage, VersionReply};
use crate::fetch::Fetcher;
use crate::http::{Request, Response};
use crate::notify::{self, ClickOutcome, ClientRegistry, PushNotification};
use crate::strategy::StrategyEngine;

/// Lifecycle phase of the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
  /// Created, install not yet completed.
  New,
  /// Install completed; waiting to activate.
  Installed,
  /// Activated and controlling clients.
  Active,
}

/// Events delivered to the worker by the host runtime.
pub enum WorkerEvent {
  Fetch {
    request: Request,
    reply: oneshot::Sender<Result<Option<Response>>>,
  },
  Message {
    raw: String,
    reply: Option<oneshot::Sender<VersionReply>>,
  },
  Push {
    payload: Option<Vec<u8>>,
  },
  NotificationClick {
    action: String,
  },
  Sync {
    tag: String,
  },
  Shutdown,
}

/// The background worker: one instance per deployment, woken by events.
pub struct Worker<F, B>
where
  F: Fetcher + Send + Sync + 'static,
  B: StoreBackend + 'static,
{
  config: WorkerConfig,
  classifier: Classifier,
  manager: CacheStoreManager<B>,
  strategies: StrategyEngine<F, B>,
  fetcher: Arc<F>,
  clients: ClientRegistry,
  notifications: Option<mpsc::UnboundedSender<PushNotification>>,
  phase: WorkerPhase,
}

impl<F, B> Worker<F, B>
where
  F: Fetcher + Send + Sync + 'static,
  B: StoreBackend + 'static,
{
  pub fn new(config: WorkerConfig, fetcher: Arc<F>, backend: B) -> Self {
    let manager = CacheStoreManager::new(backend, &config.cache_prefix, &config.version);
    let strategies = StrategyEngine::new(
      Arc::clone(&fetcher),
      manager.clone(),
      config.offline_url.clone(),
    );
    let classifier = Classifier::new(config.api_patterns.clone());

    Self {
      config,
      classifier,
      manager,
      strategies,
      fetcher,
      clients: ClientRegistry::new(),
      notifications: None,
      phase: WorkerPhase::New,
    }
  }

  pub fn phase(&self) -> WorkerPhase {
    self.phase
  }

  pub fn version(&self) -> &str {
    self.manager.version_tag()
  }

  pub fn store_names(&self) -> Result<Vec<String>> {
    self.manager.store_names()
  }

  pub fn clients_mut(&mut self) -> &mut ClientRegistry {
    &mut self.clients
  }

  /// Channel receiving every notification the run loop displays.
  pub fn notification_sink(&mut self) -> mpsc::UnboundedReceiver<PushNotification> {
    let (tx, rx) = mpsc::unbounded_channel();
    self.notifications = Some(tx);
    rx
  }

  /// Install: populate the precache from the manifest.
  ///
  /// A failed install leaves the phase unchanged so the host retries later.
  pub async fn on_install(&mut self) -> Result<()> {
    info!(version = %self.config.version, "installing");

    self
      .manager
      .initialize(self.fetcher.as_ref(), &self.config.precache_manifest)
      .await?;

    self.phase = WorkerPhase::Installed;
    info!("installed");
    Ok(())
  }

  /// Activate: reclaim stale stores and take control of open clients.
  pub async fn on_activate(&mut self) -> Result<()> {
    let deleted = self.manager.reclaim()?;
    if !deleted.is_empty() {
      info!(deleted = deleted.len(), "reclaimed stale stores");
    }

    self.phase = WorkerPhase::Active;
    info!(
      version = %self.config.version,
      clients = self.clients.windows().len(),
      "activated, claiming clients"
    );
    Ok(())
  }

  /// Fetch interception. `Ok(None)` means the request is passed through to
  /// the network untouched.
  pub async fn on_fetch(&self, request: &Request) -> Result<Option<Response>> {
    match self.classifier.classify(request) {
      None => Ok(None),
      Some(class) => {
        debug!(url = %request.url, ?class, "intercepted");
        let response = self.strategies.handle(request, class).await?;
        Ok(Some(response))
      }
    }
  }

  /// Handle a control message from a foreground page.
  pub async fn on_message(
    &mut self,
    message: ControlMessage,
    reply: Option<oneshot::Sender<VersionReply>>,
  ) {
    match message {
      ControlMessage::SkipWaiting => {
        info!("skip-waiting requested");
        if self.phase == WorkerPhase::Installed {
          if let Err(e) = self.on_activate().await {
            error!(error = %e, "forced activation failed");
          }
        }
      }
      ControlMessage::GetVersion => {
        if let Some(tx) = reply {
          let _ = tx.send(VersionReply {
            version: self.manager.version_tag().to_string(),
          });
        }
      }
      ControlMessage::ClearCache => match self.manager.purge() {
        Ok(count) => info!(count, "cache purged on request"),
        Err(e) => warn!(error = %e, "cache purge failed"),
      },
      ControlMessage::Unknown => {
        debug!("ignoring unknown control message");
      }
    }
  }

  /// Build the notification for an inbound push payload.
  pub fn on_push(&self, payload: Option<&[u8]>) -> PushNotification {
    let notification = notify::build_notification(payload, &self.config.notifications);
    info!(title = %notification.title, tag = %notification.tag, "displaying notification");
    notification
  }

  /// Route a notification click back into the application.
  pub fn on_notification_click(&mut self, action: &str) -> ClickOutcome {
    notify::route_click(action, &mut self.clients, &self.config.app_url)
  }

  /// Background sync: for the configured tag, refresh the shell assets in
  /// the background. Returns how many refreshes were scheduled.
  pub fn on_sync(&self, tag: &str) -> usize {
    if tag != self.config.sync_tag {
      debug!(tag, "ignoring unknown sync tag");
      return 0;
    }

    info!(tag, "background sync, refreshing shell");
    for url in &self.config.precache_manifest {
      self.strategies.revalidate(Request::get(url.clone()));
    }
    self.config.precache_manifest.len()
  }

  /// Event loop: the single composition point between platform events and
  /// the named handlers above. Fetches are answered on spawned tasks so
  /// multiple can be in flight at once; until the worker is active they are
  /// passed through untouched.
  pub async fn run(&mut self, mut events: mpsc::UnboundedReceiver<WorkerEvent>) -> Result<()> {
    while let Some(event) = events.recv().await {
      match event {
        WorkerEvent::Fetch { request, reply } => {
          if self.phase != WorkerPhase::Active {
            debug!(url = %request.url, "not active yet, passing fetch through");
            let _ = reply.send(Ok(None));
            continue;
          }

          let classifier = self.classifier.clone();
          let strategies = self.strategies.clone();

          tokio::spawn(async move {
            let result = match classifier.classify(&request) {
              None => Ok(None),
              Some(class) => strategies.handle(&request, class).await.map(Some),
            };
            let _ = reply.send(result);
          });
        }
        WorkerEvent::Message { raw, reply } => {
          self.on_message(ControlMessage::parse(&raw), reply).await;
        }
        WorkerEvent::Push { payload } => {
          let notification = self.on_push(payload.as_deref());
          if let Some(sink) = &self.notifications {
            let _ = sink.send(notification);
          }
        }
        WorkerEvent::NotificationClick { action } => {
          self.on_notification_click(&action);
        }
        WorkerEvent::Sync { tag } => {
          self.on_sync(&tag);
        }
        WorkerEvent::Shutdown => break,
      }
    }

    Ok(())
  }
}
