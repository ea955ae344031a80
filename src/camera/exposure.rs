//! Exposure start and readout wait.
//!
//! `take_exposure` returns as soon as the camera host has accepted the
//! exposure. Completion is found by polling the remote `is_reading_out`
//! attribute from a spawned task until it goes false or the readout deadline
//! passes:
//!
//! ```text
//! Waiting --is_reading_out == false--> Done
//! Waiting --deadline passed----------> TimedOut
//! Waiting --remote call failed-------> Failed
//! ```
//!
//! The deadline is exposure time + cached readout time + the configured
//! client-side `readout_timeout`. It is independent of any timeout the
//! camera host applies itself, and also bounds each poll: a poll still
//! unanswered at the deadline counts as a timeout.

use super::RemoteCamera;
use crate::bridge::coerce;
use crate::error::{CameraError, CameraResult};
use crate::proxy::{CallArgs, RemoteProxy};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, warn, Instrument, Span};

/// Parameters of one exposure.
#[derive(Debug, Clone, PartialEq)]
pub struct ExposureRequest {
    /// Exposure time
    pub duration: Duration,
    /// Where the camera host saves the image
    pub filename: Option<PathBuf>,
    /// `Some(true)` for a dark frame, `Some(false)` for a light frame,
    /// `None` to leave the frame type unset
    pub dark: Option<bool>,
    /// Wait for readout before returning
    pub blocking: bool,
    /// Extra keyword arguments passed through to the remote `take_exposure`
    pub params: CallArgs,
}

impl ExposureRequest {
    /// Non-blocking light frame of `duration`.
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            filename: None,
            dark: Some(false),
            blocking: false,
            params: CallArgs::new(),
        }
    }

    /// Set the output filename.
    pub fn filename(mut self, filename: impl Into<PathBuf>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Mark as a dark (or light) frame.
    pub fn dark(mut self, dark: bool) -> Self {
        self.dark = Some(dark);
        self
    }

    /// Leave the frame type keyword unset.
    pub fn without_frame_type(mut self) -> Self {
        self.dark = None;
        self
    }

    /// Wait for readout before `take_exposure` returns.
    pub fn blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    /// Add a camera-specific keyword argument.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    fn to_args(&self) -> CallArgs {
        let mut args = self.params.clone();
        args.insert("seconds".into(), Value::from(self.duration.as_secs_f64()));
        args.insert(
            "filename".into(),
            self.filename
                .as_ref()
                .map_or(Value::Null, |p| Value::from(p.to_string_lossy().into_owned())),
        );
        args.insert("dark".into(), self.dark.map_or(Value::Null, Value::Bool));
        args
    }
}

/// Deadlines that would overflow `Instant` are clamped to this far ahead.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Client-side readout deadline for an exposure. Saturates instead of
/// overflowing on absurd remote readout times.
pub fn readout_timeout(exposure: Duration, readout_time: Duration, margin: Duration) -> Duration {
    exposure.saturating_add(readout_time).saturating_add(margin)
}

fn deadline_after(start: Instant, timeout: Duration) -> Instant {
    start
        .checked_add(timeout)
        .unwrap_or_else(|| start + FAR_FUTURE)
}

/// State of a readout wait task.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadoutState {
    /// Still polling.
    Waiting,
    /// Remote reported readout finished.
    Done,
    /// Deadline passed while the remote still reported reading out, or
    /// before a poll was answered.
    TimedOut,
    /// A poll failed.
    Failed(CameraError),
}

impl ReadoutState {
    /// Whether the task has reached a final state.
    pub fn is_final(&self) -> bool {
        !matches!(self, ReadoutState::Waiting)
    }
}

/// Handle to the readout wait task of one exposure.
///
/// Clones share the same task. Dropping every handle does not stop the task.
#[derive(Debug, Clone)]
pub struct ReadoutWait {
    camera: String,
    endpoint: String,
    timeout: Duration,
    started: Instant,
    state: watch::Receiver<ReadoutState>,
}

impl ReadoutWait {
    fn spawn(
        proxy: Arc<dyn RemoteProxy>,
        camera: String,
        timeout: Duration,
        poll_interval: Duration,
        span: Span,
    ) -> Self {
        let (tx, rx) = watch::channel(ReadoutState::Waiting);
        let started = Instant::now();
        let endpoint = proxy.endpoint().to_string();

        let task_camera = camera.clone();
        tokio::spawn(
            async move {
                let state = match wait_for_readout(proxy.as_ref(), &task_camera, timeout, poll_interval).await {
                    Ok(()) => ReadoutState::Done,
                    Err(CameraError::ReadoutTimeout { .. }) => ReadoutState::TimedOut,
                    Err(e) => ReadoutState::Failed(e),
                };
                tx.send_replace(state);
            }
            .instrument(span),
        );

        Self {
            camera,
            endpoint,
            timeout,
            started,
            state: rx,
        }
    }

    /// Readout timeout this task was started with.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Instant after which the task stops waiting.
    pub fn deadline(&self) -> Instant {
        deadline_after(self.started, self.timeout)
    }

    /// Current state, without waiting.
    pub fn state(&self) -> ReadoutState {
        self.state.borrow().clone()
    }

    /// Whether the task has finished, successfully or not.
    pub fn is_finished(&self) -> bool {
        self.state.borrow().is_final()
    }

    /// Wait for the task to finish.
    ///
    /// Returns [`CameraError::ReadoutTimeout`] if the deadline passed, or the
    /// error of the failed poll.
    pub async fn wait(&self) -> CameraResult<()> {
        let mut rx = self.state.clone();
        let settled = rx.wait_for(ReadoutState::is_final).await.map(|s| s.clone());

        match settled {
            Ok(ReadoutState::Done) => Ok(()),
            Ok(ReadoutState::TimedOut) => Err(CameraError::ReadoutTimeout {
                camera: self.camera.clone(),
                endpoint: self.endpoint.clone(),
                timeout: self.timeout,
            }),
            Ok(ReadoutState::Failed(e)) => Err(e),
            Ok(ReadoutState::Waiting) | Err(_) => Err(CameraError::ReadoutAborted {
                camera: self.camera.clone(),
            }),
        }
    }
}

/// Poll `is_reading_out` until it is false or `timeout` elapses.
async fn wait_for_readout(
    proxy: &dyn RemoteProxy,
    camera: &str,
    timeout: Duration,
    poll_interval: Duration,
) -> CameraResult<()> {
    let deadline = deadline_after(Instant::now(), timeout);

    while Instant::now() < deadline {
        let Ok(reply) = timeout_at(deadline, proxy.attribute("is_reading_out")).await else {
            break;
        };
        let reading_out: bool = coerce("is_reading_out", reply?)?;
        if !reading_out {
            debug!("Readout finished");
            return Ok(());
        }
        sleep_until(deadline.min(deadline_after(Instant::now(), poll_interval))).await;
    }

    warn!(
        timeout_s = timeout.as_secs_f64(),
        "Timeout reached while waiting for readout to finish"
    );
    Err(CameraError::ReadoutTimeout {
        camera: camera.to_string(),
        endpoint: proxy.endpoint().to_string(),
        timeout,
    })
}

impl RemoteCamera {
    /// Start an exposure on the camera host.
    ///
    /// Returns once the host has accepted the exposure, unless
    /// `request.blocking` is set, in which case it also waits for readout and
    /// returns any readout failure. Either way the returned handle can be
    /// awaited (again) with [`ReadoutWait::wait`].
    ///
    /// The readout wait task is only spawned after the remote start call has
    /// succeeded.
    pub async fn take_exposure(&self, request: ExposureRequest) -> CameraResult<ReadoutWait> {
        let connection = self.connected()?;
        let camera = self.name().to_string();

        async {
            debug!(
                seconds = request.duration.as_secs_f64(),
                filename = ?request.filename,
                dark = ?request.dark,
                "Taking exposure"
            );

            self.proxy.call("take_exposure", request.to_args()).await?;

            let timeout = readout_timeout(
                request.duration,
                connection.identity.readout_time,
                self.settings.readout_timeout,
            );
            let readout = ReadoutWait::spawn(
                self.proxy.clone(),
                camera,
                timeout,
                self.settings.readout_poll_interval,
                self.span.clone(),
            );

            if request.blocking {
                readout.wait().await?;
            }
            Ok(readout)
        }
        .instrument(self.span.clone())
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CameraSettings;
    use crate::error::ConnectionError;
    use crate::mock::MockCameraProxy;
    use serde_json::json;

    fn settings(margin: Duration) -> CameraSettings {
        CameraSettings {
            name: "cam00".into(),
            readout_timeout: margin,
            ..CameraSettings::default()
        }
    }

    #[test]
    fn test_request_args() {
        let request = ExposureRequest::new(Duration::from_millis(1500))
            .filename("/data/images/flat_001.fits")
            .dark(true)
            .param("gain", 100);
        let args = request.to_args();
        assert_eq!(args["seconds"], json!(1.5));
        assert_eq!(args["filename"], json!("/data/images/flat_001.fits"));
        assert_eq!(args["dark"], json!(true));
        assert_eq!(args["gain"], json!(100));

        let args = ExposureRequest::new(Duration::from_secs(1))
            .without_frame_type()
            .to_args();
        assert_eq!(args["dark"], Value::Null);
        assert_eq!(args["filename"], Value::Null);
    }

    #[test]
    fn test_readout_timeout_sums_parts() {
        assert_eq!(
            readout_timeout(
                Duration::from_secs(3),
                Duration::from_secs(2),
                Duration::from_secs(1)
            ),
            Duration::from_secs(6)
        );
        assert_eq!(
            readout_timeout(Duration::from_secs(3), Duration::MAX, Duration::from_secs(1)),
            Duration::MAX
        );
    }

    #[tokio::test]
    async fn test_take_exposure_before_connect() {
        let mock = Arc::new(MockCameraProxy::new());
        let camera = RemoteCamera::new(mock.clone(), settings(Duration::from_secs(1)), None);

        let err = camera
            .take_exposure(ExposureRequest::new(Duration::from_secs(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, CameraError::NotConnected { .. }));
        assert_eq!(mock.total_calls().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_blocking_returns_before_readout() {
        let mock = Arc::new(MockCameraProxy::new().with_readout(Duration::from_secs(4)));
        let camera = RemoteCamera::open(mock.clone(), settings(Duration::from_secs(1)), None)
            .await
            .unwrap();

        let readout = camera
            .take_exposure(ExposureRequest::new(Duration::from_secs(3)))
            .await
            .unwrap();
        assert_eq!(readout.timeout(), Duration::from_secs(6));
        assert_eq!(readout.state(), ReadoutState::Waiting);

        readout.wait().await.unwrap();
        assert_eq!(readout.state(), ReadoutState::Done);
        // A second wait sees the same settled outcome.
        readout.wait().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_failure_spawns_no_wait_task() {
        let busy = ConnectionError::Remote {
            endpoint: "mock:0/camera".into(),
            kind: "PanError".into(),
            message: "camera is already exposing".into(),
        };
        let mock = Arc::new(MockCameraProxy::new().fail_on("take_exposure", busy.clone()));
        let camera = RemoteCamera::open(mock.clone(), settings(Duration::from_secs(1)), None)
            .await
            .unwrap();

        let err = camera
            .take_exposure(ExposureRequest::new(Duration::from_secs(1)).blocking(true))
            .await
            .unwrap_err();
        assert_eq!(err, CameraError::Connection(busy));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(mock.call_count("is_reading_out").await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_failure_aborts_wait() {
        let lost = ConnectionError::Unreachable {
            endpoint: "mock:0/camera".into(),
            reason: "connection reset".into(),
        };
        let mock = Arc::new(MockCameraProxy::new().fail_on("is_reading_out", lost.clone()));
        let camera = RemoteCamera::open(mock, settings(Duration::from_secs(1)), None)
            .await
            .unwrap();

        let readout = camera
            .take_exposure(ExposureRequest::new(Duration::from_secs(1)))
            .await
            .unwrap();
        assert_eq!(readout.wait().await, Err(CameraError::Connection(lost.clone())));
        assert_eq!(
            readout.state(),
            ReadoutState::Failed(CameraError::Connection(lost))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_poll_times_out_at_deadline() {
        let mock = Arc::new(MockCameraProxy::new().hang_on("is_reading_out"));
        let camera = RemoteCamera::open(mock.clone(), settings(Duration::from_secs(1)), None)
            .await
            .unwrap();

        let started = Instant::now();
        let readout = camera
            .take_exposure(ExposureRequest::new(Duration::from_secs(3)))
            .await
            .unwrap();
        let err = readout.wait().await.unwrap_err();

        assert_eq!(
            err,
            CameraError::ReadoutTimeout {
                camera: "Mock Camera".into(),
                endpoint: "mock:0/camera".into(),
                timeout: Duration::from_secs(6),
            }
        );
        assert_eq!(readout.state(), ReadoutState::TimedOut);
        assert_eq!(started.elapsed(), Duration::from_secs(6));
        assert_eq!(mock.call_count("is_reading_out").await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_remote_readout_time_does_not_overflow_deadline() {
        let mock = Arc::new(MockCameraProxy::new().with_property("readout_time", json!(1.8e19)));
        let camera = RemoteCamera::open(mock, settings(Duration::from_secs(1)), None)
            .await
            .unwrap();

        let readout = camera
            .take_exposure(ExposureRequest::new(Duration::from_secs(3)))
            .await
            .unwrap();
        assert!(readout.deadline() > Instant::now() + Duration::from_secs(86400 * 365));

        // The mock still finishes its readout after 2 s.
        readout.wait().await.unwrap();
        assert_eq!(readout.state(), ReadoutState::Done);
    }
}
