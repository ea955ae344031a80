//! Autofocus start and focus-complete wait.

use super::RemoteCamera;
use crate::config::{ConfigLookup, DEFAULT_FOCUS_TIMEOUT_SECS};
use crate::error::{CameraError, CameraResult};
use crate::event::RemoteEvent;
use crate::proxy::CallArgs;
use serde_json::Value;
use std::time::Duration;
use tokio::time::timeout as bounded;
use tracing::{debug, info, warn, Instrument};

/// Extra client-side time granted to the remote `wait` on the focus event
/// before the client stops waiting for its answer.
pub const FOCUS_WAIT_MARGIN: Duration = Duration::from_secs(5);

/// Parameters of one autofocus run.
#[derive(Debug, Clone, PartialEq)]
pub struct FocusRequest {
    /// Coarse run over the full focuser range, otherwise a fine run
    pub coarse: bool,
    /// Client-side wait limit; resolved from config when unset
    pub timeout: Option<Duration>,
    /// Wait for the focus event before returning
    pub blocking: bool,
    /// Extra keyword arguments passed through to the remote `autofocus`
    pub params: CallArgs,
}

impl FocusRequest {
    /// Non-blocking fine focus run.
    pub fn fine() -> Self {
        Self {
            coarse: false,
            timeout: None,
            blocking: false,
            params: CallArgs::new(),
        }
    }

    /// Non-blocking coarse focus run.
    pub fn coarse() -> Self {
        Self {
            coarse: true,
            ..Self::fine()
        }
    }

    /// Wait at most `timeout` for the focus event, overriding the config.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Return only after the focus event is set or the wait times out.
    pub fn blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    /// Add a focuser-specific keyword argument, e.g. `focus_range`.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    fn kind(&self) -> &'static str {
        if self.coarse {
            "coarse"
        } else {
            "fine"
        }
    }

    fn to_args(&self) -> CallArgs {
        let mut args = self.params.clone();
        args.insert("blocking".into(), Value::Bool(false));
        args.insert("coarse".into(), Value::Bool(self.coarse));
        args
    }
}

impl Default for FocusRequest {
    fn default() -> Self {
        Self::fine()
    }
}

/// Client-side timeout for an autofocus wait.
///
/// Order: `explicit`, then `focusing.coarse.timeout` / `focusing.fine.timeout`
/// from `config`, then 600 s. A missing lookup, a failed lookup or an unusable
/// value all fall through to the default.
pub fn resolve_focus_timeout(
    config: Option<&dyn ConfigLookup>,
    coarse: bool,
    explicit: Option<Duration>,
) -> Duration {
    let default = Duration::from_secs_f64(DEFAULT_FOCUS_TIMEOUT_SECS);
    if let Some(timeout) = explicit {
        return timeout;
    }
    let Some(config) = config else {
        return default;
    };

    let key = format!("focusing.{}.timeout", if coarse { "coarse" } else { "fine" });
    match config.get_config(&key) {
        Ok(Some(value)) => match value.as_f64().and_then(|s| Duration::try_from_secs_f64(s).ok()) {
            Some(timeout) => timeout,
            None => {
                warn!("Ignoring {} = {}, using default focus timeout", key, value);
                default
            }
        },
        Ok(None) => default,
        Err(e) => {
            warn!("Config lookup for {} failed: {}", key, e);
            default
        }
    }
}

impl RemoteCamera {
    /// Start an autofocus run on the attached focuser.
    ///
    /// The remote call never blocks; with `request.blocking` the client then
    /// waits on the focuser event and returns
    /// [`CameraError::FocusWaitTimeout`] if it is not set in time. A failure
    /// reported by the camera host comes back as
    /// [`CameraError::Connection`] instead. A remote wait that gives no answer
    /// within [`FOCUS_WAIT_MARGIN`] past the timeout also counts as a wait
    /// timeout.
    ///
    /// Returns the focus event so a non-blocking caller can wait on it later.
    pub async fn autofocus(&self, request: FocusRequest) -> CameraResult<RemoteEvent> {
        let Some(connection) = self.connection.as_ref().filter(|c| c.focuser.is_some()) else {
            return Err(CameraError::Capability {
                camera: self.name().to_string(),
                endpoint: self.endpoint().to_string(),
                capability: "focuser",
            });
        };

        async {
            let timeout =
                resolve_focus_timeout(self.config.as_deref(), request.coarse, request.timeout);
            info!(
                kind = request.kind(),
                timeout_s = timeout.as_secs_f64(),
                blocking = request.blocking,
                "Starting autofocus"
            );

            self.proxy.call("autofocus", request.to_args()).await?;

            let event = connection.focus_event.clone();
            if request.blocking {
                let answer =
                    bounded(timeout.saturating_add(FOCUS_WAIT_MARGIN), event.wait(timeout)).await;
                match answer {
                    Ok(Ok(true)) => debug!("Autofocus complete"),
                    Ok(Err(e)) => return Err(e),
                    Ok(Ok(false)) | Err(_) => {
                        warn!("Autofocus did not signal completion within {:?}", timeout);
                        return Err(CameraError::FocusWaitTimeout {
                            camera: self.name().to_string(),
                            endpoint: self.endpoint().to_string(),
                            timeout,
                        });
                    }
                }
            }
            Ok(event)
        }
        .instrument(self.span.clone())
        .await
    }
}
