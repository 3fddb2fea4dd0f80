//! Push payloads, notifications and click routing.

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::config::NotificationDefaults;

/// Action identifier for opening the application.
pub const ACTION_OPEN: &str = "open";
/// Action identifier for dismissing the notification.
pub const ACTION_DISMISS: &str = "dismiss";

/// A button on a displayed notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
}

/// A notification ready to display. Ephemeral; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct PushNotification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub tag: String,
  pub data: serde_json::Value,
  pub actions: Vec<NotificationAction>,
}

/// The fields a push payload may carry.
#[derive(Debug, Default, Deserialize)]
struct PushPayload {
  title: Option<String>,
  body: Option<String>,
  icon: Option<String>,
  badge: Option<String>,
  tag: Option<String>,
  data: Option<serde_json::Value>,
}

/// Build a displayable notification from an inbound push payload.
///
/// The payload is parsed as JSON and merged over the configured defaults; a
/// payload that is not JSON becomes the notification body verbatim. An absent
/// payload yields the defaults unchanged.
pub fn build_notification(
  payload: Option<&[u8]>,
  defaults: &NotificationDefaults,
) -> PushNotification {
  let parsed = match payload {
    None => PushPayload::default(),
    Some(bytes) => match serde_json::from_slice::<PushPayload>(bytes) {
      Ok(p) => p,
      Err(_) => PushPayload {
        body: Some(String::from_utf8_lossy(bytes).into_owned()),
        ..PushPayload::default()
      },
    },
  };

  PushNotification {
    title: parsed.title.unwrap_or_else(|| defaults.title.clone()),
    body: parsed.body.unwrap_or_else(|| defaults.body.clone()),
    icon: parsed.icon.unwrap_or_else(|| defaults.icon.clone()),
    badge: parsed.badge.unwrap_or_else(|| defaults.badge.clone()),
    tag: parsed.tag.unwrap_or_else(|| defaults.tag.clone()),
    data: parsed.data.unwrap_or(serde_json::Value::Null),
    actions: vec![
      NotificationAction {
        action: ACTION_OPEN.to_string(),
        title: "Open".to_string(),
      },
      NotificationAction {
        action: ACTION_DISMISS.to_string(),
        title: "Dismiss".to_string(),
      },
    ],
  }
}

// ============================================================================
// Client windows
// ============================================================================

/// An open application window known to the worker.
#[derive(Debug, Clone)]
pub struct ClientWindow {
  pub id: String,
  pub url: Url,
  pub focused: bool,
}

/// Registry of open application windows.
#[derive(Debug, Default)]
pub struct ClientRegistry {
  windows: Vec<ClientWindow>,
  next_id: u64,
}

impl ClientRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register an already-open window.
  pub fn add_window(&mut self, url: Url) -> String {
    let id = self.allocate_id();
    self.windows.push(ClientWindow {
      id: id.clone(),
      url,
      focused: false,
    });
    id
  }

  /// Open a new window, focused.
  pub fn open_window(&mut self, url: Url) -> String {
    let id = self.allocate_id();
    for window in &mut self.windows {
      window.focused = false;
    }
    self.windows.push(ClientWindow {
      id: id.clone(),
      url,
      focused: true,
    });
    id
  }

  /// Focus the first window whose URL contains the given path.
  pub fn focus_matching(&mut self, path: &str) -> Option<String> {
    let id = self
      .windows
      .iter()
      .find(|w| w.url.as_str().contains(path))?
      .id
      .clone();

    for window in &mut self.windows {
      window.focused = window.id == id;
    }
    Some(id)
  }

  pub fn windows(&self) -> &[ClientWindow] {
    &self.windows
  }

  fn allocate_id(&mut self) -> String {
    self.next_id += 1;
    format!("client-{}", self.next_id)
  }
}

/// What a notification click resulted in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
  /// The dismiss action was chosen; nothing else happens.
  Dismissed,
  /// An existing window was focused.
  Focused(String),
  /// A new window was opened at the application entry point.
  Opened(String),
}

/// Route a notification click back into the application.
pub fn route_click(action: &str, registry: &mut ClientRegistry, app_url: &Url) -> ClickOutcome {
  if action == ACTION_DISMISS {
    debug!("notification dismissed");
    return ClickOutcome::Dismissed;
  }

  if let Some(id) = registry.focus_matching(app_url.path()) {
    debug!(client = %id, "focused existing window");
    return ClickOutcome::Focused(id);
  }

  let id = registry.open_window(app_url.clone());
  debug!(client = %id, "opened new window");
  ClickOutcome::Opened(id)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn defaults() -> NotificationDefaults {
    NotificationDefaults::default()
  }

  #[test]
  fn json_payload_merges_over_defaults() {
    let notification =
      build_notification(Some(br#"{"title":"T","body":"B"}"#.as_slice()), &defaults());

    assert_eq!(notification.title, "T");
    assert_eq!(notification.body, "B");
    // Unspecified fields come from the defaults
    assert_eq!(notification.icon, defaults().icon);
    assert_eq!(notification.tag, defaults().tag);
  }

  #[test]
  fn unparseable_payload_becomes_the_body() {
    let notification = build_notification(Some(b"hello".as_slice()), &defaults());

    assert_eq!(notification.body, "hello");
    assert_eq!(notification.title, defaults().title);
  }

  #[test]
  fn absent_payload_yields_defaults() {
    let notification = build_notification(None, &defaults());

    assert_eq!(notification.title, defaults().title);
    assert_eq!(notification.body, defaults().body);
  }

  #[test]
  fn notifications_always_carry_both_actions() {
    let notification = build_notification(None, &defaults());
    let actions: Vec<&str> = notification
      .actions
      .iter()
      .map(|a| a.action.as_str())
      .collect();

    assert_eq!(actions, vec![ACTION_OPEN, ACTION_DISMISS]);
  }

  #[test]
  fn dismiss_does_nothing() {
    let mut registry = ClientRegistry::new();
    let app_url = Url::parse("https://support.example.com/index.html").unwrap();

    let outcome = route_click(ACTION_DISMISS, &mut registry, &app_url);
    assert_eq!(outcome, ClickOutcome::Dismissed);
    assert!(registry.windows().is_empty());
  }

  #[test]
  fn open_focuses_a_matching_window() {
    let mut registry = ClientRegistry::new();
    let app_url = Url::parse("https://support.example.com/index.html").unwrap();
    registry.add_window(Url::parse("https://other.example.com/").unwrap());
    let id = registry.add_window(Url::parse("https://support.example.com/index.html#tickets").unwrap());

    let outcome = route_click(ACTION_OPEN, &mut registry, &app_url);
    assert_eq!(outcome, ClickOutcome::Focused(id.clone()));

    let focused: Vec<&ClientWindow> =
      registry.windows().iter().filter(|w| w.focused).collect();
    assert_eq!(focused.len(), 1);
    assert_eq!(focused[0].id, id);
  }

  #[test]
  fn open_without_a_match_opens_a_new_window() {
    let mut registry = ClientRegistry::new();
    let app_url = Url::parse("https://support.example.com/index.html").unwrap();

    let outcome = route_click(ACTION_OPEN, &mut registry, &app_url);
    match outcome {
      ClickOutcome::Opened(id) => {
        assert_eq!(registry.windows().len(), 1);
        assert_eq!(registry.windows()[0].id, id);
        assert!(registry.windows()[0].focused);
      }
      other => panic!("expected Opened, got {:?}", other),
    }
  }
}
