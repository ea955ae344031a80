//! TCP transport for [`RemoteProxy`].
//!
//! Each call opens a fresh connection to the camera host, writes one JSON
//! request line, reads one JSON response line and closes. The handle itself
//! holds no connection state, so a single `TcpProxy` can be used from any
//! number of tasks at once.
//!
//! ```text
//! -> {"object":"camera","kind":"call","name":"get","args":{"name":"egain"}}
//! <- {"status":"ok","value":1.5}
//! <- {"status":"error","kind":"PanError","message":"camera busy"}
//! ```
//!
//! Only the connect step is time-bounded. Reading the reply is not, because
//! `event_wait` blocks on the remote side for as long as its own timeout.

use crate::error::ConnectionError;
use crate::proxy::{CallArgs, Endpoint, RemoteProxy};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::trace;

/// Kind of remote access carried by a [`Request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// Method invocation with keyword arguments.
    Call,
    /// Plain attribute read.
    Attribute,
}

/// One request line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Object name on the camera host.
    pub object: String,
    /// Method call or attribute read.
    pub kind: RequestKind,
    /// Method or attribute name.
    pub name: String,
    /// Keyword arguments (empty for attribute reads).
    #[serde(default)]
    pub args: CallArgs,
}

/// One response line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    /// Call returned normally.
    Ok {
        #[serde(default)]
        value: Value,
    },
    /// Remote side raised.
    Error { kind: String, message: String },
}

/// Stateless TCP proxy to one remote object.
#[derive(Debug, Clone)]
pub struct TcpProxy {
    endpoint: Endpoint,
    label: String,
    connect_timeout: Duration,
}

impl TcpProxy {
    /// Create a proxy for `endpoint`. No connection is made until the first call.
    pub fn new(endpoint: Endpoint, connect_timeout: Duration) -> Self {
        let label = endpoint.to_string();
        Self {
            endpoint,
            label,
            connect_timeout,
        }
    }

    async fn round_trip(&self, request: Request) -> Result<Value, ConnectionError> {
        let addr = self.endpoint.socket_addr();
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| self.unreachable(format!("connect timed out after {:?}", self.connect_timeout)))?
            .map_err(|e| self.unreachable(e.to_string()))?;

        let (reader, mut writer) = stream.into_split();

        let mut line =
            serde_json::to_string(&request).map_err(|e| self.serialization(e.to_string()))?;
        line.push('\n');

        trace!(endpoint = %self.label, request = %line.trim_end(), "Sending request");

        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| self.unreachable(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| self.unreachable(e.to_string()))?;

        let mut reply = String::new();
        let read = BufReader::new(reader)
            .read_line(&mut reply)
            .await
            .map_err(|e| self.unreachable(e.to_string()))?;
        if read == 0 {
            return Err(self.serialization("connection closed before a response was received"));
        }

        trace!(endpoint = %self.label, response = %reply.trim_end(), "Received response");

        match serde_json::from_str::<Response>(&reply)
            .map_err(|e| self.serialization(format!("malformed response: {}", e)))?
        {
            Response::Ok { value } => Ok(value),
            Response::Error { kind, message } => Err(ConnectionError::Remote {
                endpoint: self.label.clone(),
                kind,
                message,
            }),
        }
    }

    fn unreachable(&self, reason: impl Into<String>) -> ConnectionError {
        ConnectionError::Unreachable {
            endpoint: self.label.clone(),
            reason: reason.into(),
        }
    }

    fn serialization(&self, reason: impl Into<String>) -> ConnectionError {
        ConnectionError::Serialization {
            endpoint: self.label.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl RemoteProxy for TcpProxy {
    fn endpoint(&self) -> &str {
        &self.label
    }

    async fn call(&self, method: &str, args: CallArgs) -> Result<Value, ConnectionError> {
        self.round_trip(Request {
            object: self.endpoint.object().to_string(),
            kind: RequestKind::Call,
            name: method.to_string(),
            args,
        })
        .await
    }

    async fn attribute(&self, name: &str) -> Result<Value, ConnectionError> {
        self.round_trip(Request {
            object: self.endpoint.object().to_string(),
            kind: RequestKind::Attribute,
            name: name.to_string(),
            args: CallArgs::new(),
        })
        .await
    }
}
