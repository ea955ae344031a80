//! Remote proxy boundary.
//!
//! A [`RemoteProxy`] is the local stand-in for the camera object living on the
//! camera host. Every method is one network round trip; nothing is cached at
//! this layer and failures are returned as [`ConnectionError`] without retry.
//!
//! Implementations must be safe to share between tasks: the exposure readout
//! poll and the autofocus wait can run at the same time against one proxy.
//!
//! # Example
//!
//! ```rust,ignore
//! let proxy: Arc<dyn RemoteProxy> = Arc::new(TcpProxy::new(endpoint, Duration::from_secs(5)));
//! let uid = proxy.get_uid().await?;
//! let egain = proxy.get("egain").await?;
//! let reading_out = proxy.attribute("is_reading_out").await?;
//! ```

use crate::error::{CameraError, ConnectionError};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Keyword arguments for a remote method call.
pub type CallArgs = Map<String, Value>;

/// Handle to an object on the camera host.
#[async_trait]
pub trait RemoteProxy: Send + Sync {
    /// Endpoint this proxy talks to, used in log and error context.
    fn endpoint(&self) -> &str;

    /// Invoke `method` on the remote object with keyword arguments.
    async fn call(&self, method: &str, args: CallArgs) -> Result<Value, ConnectionError>;

    /// Read a plain attribute of the remote object (e.g. `is_reading_out`).
    async fn attribute(&self, name: &str) -> Result<Value, ConnectionError>;

    /// Read a camera property through the remote `get` method.
    async fn get(&self, name: &str) -> Result<Value, ConnectionError> {
        let mut args = CallArgs::new();
        args.insert("name".into(), Value::from(name));
        self.call("get", args).await
    }

    /// Write a camera property through the remote `set` method.
    async fn set(&self, name: &str, value: Value) -> Result<(), ConnectionError> {
        let mut args = CallArgs::new();
        args.insert("name".into(), Value::from(name));
        args.insert("value".into(), value);
        self.call("set", args).await.map(|_| ())
    }

    /// Fetch the unique id of the remote camera.
    ///
    /// On real hardware this also (re)initialises the remote camera, so it
    /// can take a long time.
    async fn get_uid(&self) -> Result<Value, ConnectionError> {
        self.call("get_uid", CallArgs::new()).await
    }
}

/// Address of a remote camera object: `host:port/object`.
///
/// A leading `tcp://` is accepted and dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
    object: String,
}

impl Endpoint {
    /// Build an endpoint from its parts.
    pub fn new(host: impl Into<String>, port: u16, object: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            object: object.into(),
        }
    }

    /// Host name or address of the camera host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port of the camera service.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Name of the object on the camera host.
    pub fn object(&self) -> &str {
        &self.object
    }

    /// `host:port` form suitable for `TcpStream::connect`.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.host, self.port, self.object)
    }
}

impl FromStr for Endpoint {
    type Err = CameraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CameraError::InvalidEndpoint(s.to_string());

        let rest = s.trim().strip_prefix("tcp://").unwrap_or(s.trim());
        let (addr, object) = rest.split_once('/').ok_or_else(invalid)?;
        let (host, port) = addr.rsplit_once(':').ok_or_else(invalid)?;
        let port: u16 = port.parse().map_err(|_| invalid())?;

        if host.is_empty() || object.is_empty() || object.contains('/') {
            return Err(invalid());
        }

        Ok(Self::new(host, port, object))
    }
}
