//! Handles to synchronisation events living on the camera host.
//!
//! The camera service keeps one event per category. The client never owns
//! them; a [`RemoteEvent`] is only a reference that forwards `set`, `clear`,
//! `is_set` and `wait` over the proxy.

use crate::bridge::coerce;
use crate::error::CameraResult;
use crate::proxy::{CallArgs, RemoteProxy};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Event category on the camera host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    /// Set while the camera is exposing.
    Camera,
    /// Set when an autofocus run completes.
    Focuser,
}

impl EventCategory {
    /// Name used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Camera => "camera",
            EventCategory::Focuser => "focuser",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a remote event.
#[derive(Clone)]
pub struct RemoteEvent {
    proxy: Arc<dyn RemoteProxy>,
    category: EventCategory,
}

impl fmt::Debug for RemoteEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteEvent")
            .field("endpoint", &self.proxy.endpoint())
            .field("category", &self.category)
            .finish()
    }
}

impl RemoteEvent {
    /// Bind to the `category` event of the object behind `proxy`.
    pub fn new(proxy: Arc<dyn RemoteProxy>, category: EventCategory) -> Self {
        Self { proxy, category }
    }

    /// Event category.
    pub fn category(&self) -> EventCategory {
        self.category
    }

    /// Set the remote event.
    pub async fn set(&self) -> CameraResult<()> {
        self.proxy.call("event_set", self.args()).await?;
        Ok(())
    }

    /// Clear the remote event.
    pub async fn clear(&self) -> CameraResult<()> {
        self.proxy.call("event_clear", self.args()).await?;
        Ok(())
    }

    /// Whether the remote event is currently set.
    pub async fn is_set(&self) -> CameraResult<bool> {
        let value = self.proxy.call("event_is_set", self.args()).await?;
        coerce("event_is_set", value)
    }

    /// Wait on the remote side for up to `timeout`.
    ///
    /// Returns `true` if the event was set before the timeout elapsed.
    pub async fn wait(&self, timeout: Duration) -> CameraResult<bool> {
        debug!(
            category = %self.category,
            timeout_s = timeout.as_secs_f64(),
            "Waiting on remote event"
        );
        let mut args = self.args();
        args.insert("timeout".into(), Value::from(timeout.as_secs_f64()));
        let value = self.proxy.call("event_wait", args).await?;
        coerce("event_wait", value)
    }

    fn args(&self) -> CallArgs {
        let mut args = CallArgs::new();
        args.insert("event_type".into(), Value::from(self.category.as_str()));
        args
    }
}
