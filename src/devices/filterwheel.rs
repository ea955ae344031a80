//! Filter wheel attached to a remote camera.

use crate::bridge::{coerce, FromRemote};
use crate::error::CameraResult;
use crate::proxy::{CallArgs, RemoteProxy};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Which filter to move to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterSelector {
    /// 1-based slot number.
    Slot(u32),
    /// Filter name as reported by `filter_names`.
    Name(String),
}

impl From<u32> for FilterSelector {
    fn from(slot: u32) -> Self {
        FilterSelector::Slot(slot)
    }
}

impl From<&str> for FilterSelector {
    fn from(name: &str) -> Self {
        FilterSelector::Name(name.to_string())
    }
}

impl fmt::Display for FilterSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterSelector::Slot(slot) => write!(f, "slot {}", slot),
            FilterSelector::Name(name) => write!(f, "'{}'", name),
        }
    }
}

/// Remote filter wheel controller.
#[derive(Clone)]
pub struct RemoteFilterWheel {
    proxy: Arc<dyn RemoteProxy>,
    camera: String,
}

impl fmt::Debug for RemoteFilterWheel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteFilterWheel")
            .field("camera", &self.camera)
            .field("endpoint", &self.proxy.endpoint())
            .finish()
    }
}

impl RemoteFilterWheel {
    /// Filter wheel of `camera`, reached through `proxy`.
    pub fn new(proxy: Arc<dyn RemoteProxy>, camera: impl Into<String>) -> Self {
        Self {
            proxy,
            camera: camera.into(),
        }
    }

    /// Current 1-based slot.
    pub async fn position(&self) -> CameraResult<u32> {
        self.get("position").await
    }

    /// Name of the filter in the light path, if known.
    pub async fn current_filter(&self) -> CameraResult<Option<String>> {
        self.get("current_filter").await
    }

    /// Filter names in slot order.
    pub async fn filter_names(&self) -> CameraResult<Vec<String>> {
        self.get("filter_names").await
    }

    /// Whether the wheel is moving.
    pub async fn is_moving(&self) -> CameraResult<bool> {
        self.get("is_moving").await
    }

    /// Move to a filter and wait for the move; returns the slot reached.
    pub async fn move_to(&self, filter: impl Into<FilterSelector>) -> CameraResult<u32> {
        let filter = filter.into();
        debug!(camera = %self.camera, %filter, "Moving filter wheel");

        let position = match &filter {
            FilterSelector::Slot(slot) => Value::from(*slot),
            FilterSelector::Name(name) => Value::from(name.as_str()),
        };
        let mut args = CallArgs::new();
        args.insert("position".into(), position);
        args.insert("blocking".into(), Value::Bool(true));

        let value = self.proxy.call("filterwheel_move_to", args).await?;
        coerce("filterwheel_move_to", value)
    }

    async fn get<T: FromRemote>(&self, property: &str) -> CameraResult<T> {
        let mut args = CallArgs::new();
        args.insert("name".into(), Value::from(property));
        let value = self.proxy.call("filterwheel_get", args).await?;
        coerce(property, value)
    }
}
