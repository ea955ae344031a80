//! Focuser attached to a remote camera.
//!
//! The focuser has no endpoint of its own; every operation goes through the
//! camera's proxy using the `focuser_*` remote methods.

use crate::bridge::{coerce, FromRemote};
use crate::error::CameraResult;
use crate::proxy::{CallArgs, RemoteProxy};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Remote focuser controller.
#[derive(Clone)]
pub struct RemoteFocuser {
    proxy: Arc<dyn RemoteProxy>,
    camera: String,
}

impl fmt::Debug for RemoteFocuser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteFocuser")
            .field("camera", &self.camera)
            .field("endpoint", &self.proxy.endpoint())
            .finish()
    }
}

impl RemoteFocuser {
    /// Focuser of `camera`, reached through `proxy`.
    pub fn new(proxy: Arc<dyn RemoteProxy>, camera: impl Into<String>) -> Self {
        Self {
            proxy,
            camera: camera.into(),
        }
    }

    /// Current encoder position.
    pub async fn position(&self) -> CameraResult<i64> {
        self.get("position").await
    }

    /// Lower travel limit.
    pub async fn min_position(&self) -> CameraResult<i64> {
        self.get("min_position").await
    }

    /// Upper travel limit.
    pub async fn max_position(&self) -> CameraResult<i64> {
        self.get("max_position").await
    }

    /// Whether the focuser is moving.
    pub async fn is_moving(&self) -> CameraResult<bool> {
        self.get("is_moving").await
    }

    /// Move to an absolute position; returns the position reached.
    pub async fn move_to(&self, position: i64) -> CameraResult<i64> {
        debug!(camera = %self.camera, position, "Moving focuser");
        self.move_with("focuser_move_to", "position", position).await
    }

    /// Move by a relative increment; returns the position reached.
    pub async fn move_by(&self, increment: i64) -> CameraResult<i64> {
        debug!(camera = %self.camera, increment, "Moving focuser");
        self.move_with("focuser_move_by", "increment", increment).await
    }

    async fn get<T: FromRemote>(&self, property: &str) -> CameraResult<T> {
        let mut args = CallArgs::new();
        args.insert("name".into(), Value::from(property));
        let value = self.proxy.call("focuser_get", args).await?;
        coerce(property, value)
    }

    async fn move_with(&self, method: &str, key: &str, amount: i64) -> CameraResult<i64> {
        let mut args = CallArgs::new();
        args.insert(key.into(), Value::from(amount));
        args.insert("blocking".into(), Value::Bool(true));
        let value = self.proxy.call(method, args).await?;
        coerce(method, value)
    }
}
