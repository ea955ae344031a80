//! Mock camera host
//!
//! [`MockCameraProxy`] implements [`RemoteProxy`] entirely in-process so the
//! client can be exercised without a camera host. It behaves like the remote
//! camera service closely enough for the client contract:
//!
//! - `take_exposure` starts a readout window; `is_reading_out` reports true
//!   until it closes (or forever, see [`MockCameraProxy::never_finishes_readout`])
//! - `autofocus` clears the focuser event and sets it again after the
//!   configured run time
//! - `event_wait` sleeps on the tokio clock, so tests can use
//!   `#[tokio::test(start_paused = true)]`
//!
//! Every call and attribute read is recorded for call-count assertions.
//! [`MockCameraProxy::fail_on`] and [`MockCameraProxy::hang_on`] make a
//! method fail or never answer.
//!
//! # Example
//!
//! ```rust,ignore
//! let mock = Arc::new(
//!     MockCameraProxy::new()
//!         .with_readout(Duration::from_secs(4))
//!         .with_focuser(),
//! );
//! let camera = RemoteCamera::open(mock.clone(), CameraSettings::default(), None).await?;
//! camera.take_exposure(ExposureRequest::new(Duration::from_secs(3)).blocking(true)).await?;
//! assert_eq!(mock.call_count("take_exposure").await, 1);
//! ```

use crate::error::ConnectionError;
use crate::event::EventCategory;
use crate::proxy::{CallArgs, RemoteProxy};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, sleep_until, Instant};

/// Far enough in the future to count as "never" for any test.
const NEVER: Duration = Duration::from_secs(365 * 24 * 3600);

/// How long the mock keeps reporting `is_reading_out` after an exposure starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadoutBehaviour {
    /// Readout ends this long after `take_exposure` is accepted.
    After(Duration),
    /// Readout never ends.
    Never,
}

/// How an autofocus run signals completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusBehaviour {
    /// Focuser event is set this long after `autofocus` is accepted.
    After(Duration),
    /// Focuser event is never set.
    Never,
}

#[derive(Debug)]
struct MockState {
    uid: String,
    properties: HashMap<String, Value>,
    has_focuser: bool,
    has_filterwheel: bool,

    readout: ReadoutBehaviour,
    exposing_until: Option<Instant>,
    reading_out_until: Option<Instant>,

    focus: FocusBehaviour,
    focus_done_at: Option<Instant>,
    events: HashMap<EventCategory, bool>,

    focuser_position: i64,
    focuser_range: (i64, i64),
    filter_names: Vec<String>,
    filter_position: usize,

    failures: HashMap<String, ConnectionError>,
    hangs: HashSet<String>,
    calls: Vec<String>,
    exposures: Vec<CallArgs>,
    autofocus_runs: Vec<CallArgs>,
}

impl MockState {
    /// Apply any focus completion that is due at `now`.
    fn settle_focus(&mut self, now: Instant) {
        if let Some(done_at) = self.focus_done_at {
            if done_at <= now {
                self.events.insert(EventCategory::Focuser, true);
                self.focus_done_at = None;
            }
        }
    }

    fn event(&self, category: EventCategory) -> bool {
        self.events.get(&category).copied().unwrap_or(false)
    }
}

/// In-process stand-in for a remote camera service.
#[derive(Debug)]
pub struct MockCameraProxy {
    endpoint: String,
    state: Mutex<MockState>,
}

impl Default for MockCameraProxy {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCameraProxy {
    /// Mock camera with a 2 s readout, no focuser and no filter wheel.
    pub fn new() -> Self {
        let properties = [
            ("name", json!("Mock Camera")),
            ("model", json!("mock-zwo")),
            ("readout_time", json!(2.0)),
            ("file_extension", json!("fits")),
            ("is_cooled_camera", json!(true)),
            ("filter_type", json!("RGGB")),
            ("egain", json!(1.2)),
            ("bit_depth", json!(16)),
            ("temperature", json!(-4.5)),
            ("target_temperature", json!(-5.0)),
            ("temperature_tolerance", json!(0.5)),
            ("cooling_enabled", json!(true)),
            ("cooling_power", json!(42.0)),
            ("is_temperature_stable", json!(true)),
            ("is_ready", json!(true)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            endpoint: "mock:0/camera".to_string(),
            state: Mutex::new(MockState {
                uid: "mock-cam-0001".to_string(),
                properties,
                has_focuser: false,
                has_filterwheel: false,
                readout: ReadoutBehaviour::After(Duration::from_secs(2)),
                exposing_until: None,
                reading_out_until: None,
                focus: FocusBehaviour::After(Duration::from_secs(30)),
                focus_done_at: None,
                events: HashMap::new(),
                focuser_position: 10_000,
                focuser_range: (0, 20_000),
                filter_names: Vec::new(),
                filter_position: 0,
                failures: HashMap::new(),
                hangs: HashSet::new(),
                calls: Vec::new(),
                exposures: Vec::new(),
                autofocus_runs: Vec::new(),
            }),
        }
    }

    /// Report `uid` from `get_uid` (an empty string simulates a failed bootstrap).
    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.state.get_mut().uid = uid.into();
        self
    }

    /// Override a camera property.
    pub fn with_property(mut self, name: &str, value: Value) -> Self {
        self.state
            .get_mut()
            .properties
            .insert(name.to_string(), value);
        self
    }

    /// Attach a focuser.
    pub fn with_focuser(mut self) -> Self {
        self.state.get_mut().has_focuser = true;
        self
    }

    /// Attach a filter wheel holding `names` in slot order.
    pub fn with_filterwheel<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        let state = self.state.get_mut();
        state.has_filterwheel = true;
        state.filter_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Finish readout `after` the exposure is accepted.
    pub fn with_readout(mut self, after: Duration) -> Self {
        self.state.get_mut().readout = ReadoutBehaviour::After(after);
        self
    }

    /// Keep reporting `is_reading_out = true` forever once an exposure starts.
    pub fn never_finishes_readout(mut self) -> Self {
        self.state.get_mut().readout = ReadoutBehaviour::Never;
        self
    }

    /// How autofocus runs complete.
    pub fn with_focus(mut self, behaviour: FocusBehaviour) -> Self {
        self.state.get_mut().focus = behaviour;
        self
    }

    /// Make every call to `method` (or read of attribute `method`) fail with `error`.
    pub fn fail_on(mut self, method: &str, error: ConnectionError) -> Self {
        self.state
            .get_mut()
            .failures
            .insert(method.to_string(), error);
        self
    }

    /// Make every call to `method` (or read of attribute `method`) never
    /// answer, like a camera host that accepted the request and then hung.
    pub fn hang_on(mut self, method: &str) -> Self {
        self.state.get_mut().hangs.insert(method.to_string());
        self
    }

    /// Change the uid reported from now on.
    pub async fn set_uid(&self, uid: impl Into<String>) {
        self.state.lock().await.uid = uid.into();
    }

    /// Change a property from the remote side.
    pub async fn set_property(&self, name: &str, value: Value) {
        self.state
            .lock()
            .await
            .properties
            .insert(name.to_string(), value);
    }

    /// Current value of a property.
    pub async fn property(&self, name: &str) -> Option<Value> {
        self.state.lock().await.properties.get(name).cloned()
    }

    /// Whether the remote `category` event is set.
    pub async fn event_is_set(&self, category: EventCategory) -> bool {
        let mut state = self.state.lock().await;
        state.settle_focus(Instant::now());
        state.event(category)
    }

    /// Number of calls / attribute reads recorded for `name`.
    pub async fn call_count(&self, name: &str) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| c.as_str() == name)
            .count()
    }

    /// Total number of remote round trips received.
    pub async fn total_calls(&self) -> usize {
        self.state.lock().await.calls.len()
    }

    /// Every call and attribute read, in order.
    pub async fn calls(&self) -> Vec<String> {
        self.state.lock().await.calls.clone()
    }

    /// Arguments of every accepted `take_exposure`.
    pub async fn exposures(&self) -> Vec<CallArgs> {
        self.state.lock().await.exposures.clone()
    }

    /// Arguments of every accepted `autofocus`.
    pub async fn autofocus_runs(&self) -> Vec<CallArgs> {
        self.state.lock().await.autofocus_runs.clone()
    }

    fn remote_error(&self, kind: &str, message: impl Into<String>) -> ConnectionError {
        ConnectionError::Remote {
            endpoint: self.endpoint.clone(),
            kind: kind.to_string(),
            message: message.into(),
        }
    }

    fn arg<'a>(&self, args: &'a CallArgs, key: &str) -> Result<&'a Value, ConnectionError> {
        args.get(key)
            .ok_or_else(|| self.remote_error("TypeError", format!("missing argument '{}'", key)))
    }

    fn category(&self, args: &CallArgs) -> Result<EventCategory, ConnectionError> {
        match self.arg(args, "event_type")?.as_str() {
            Some("camera") => Ok(EventCategory::Camera),
            Some("focuser") => Ok(EventCategory::Focuser),
            other => Err(self.remote_error("KeyError", format!("unknown event type {:?}", other))),
        }
    }

    /// Record a round trip and apply any injected failure.
    async fn enter(&self, name: &str) -> Result<tokio::sync::MutexGuard<'_, MockState>, ConnectionError> {
        let mut state = self.state.lock().await;
        state.calls.push(name.to_string());
        if let Some(err) = state.failures.get(name) {
            return Err(err.clone());
        }
        if state.hangs.contains(name) {
            drop(state);
            return std::future::pending().await;
        }
        state.settle_focus(Instant::now());
        Ok(state)
    }

    async fn event_wait(&self, args: &CallArgs) -> Result<Value, ConnectionError> {
        let category = self.category(args)?;
        let timeout = self
            .arg(args, "timeout")?
            .as_f64()
            .and_then(|t| Duration::try_from_secs_f64(t).ok())
            .ok_or_else(|| self.remote_error("ValueError", "timeout must be a number"))?;

        let now = Instant::now();
        let deadline = now + timeout;
        let done_at = {
            let state = self.state.lock().await;
            if state.event(category) {
                return Ok(json!(true));
            }
            match category {
                EventCategory::Focuser => state.focus_done_at,
                EventCategory::Camera => None,
            }
        };

        match done_at {
            Some(at) if at <= deadline => {
                sleep_until(at).await;
                let mut state = self.state.lock().await;
                state.settle_focus(Instant::now());
                Ok(json!(state.event(category)))
            }
            _ => {
                sleep(timeout).await;
                let mut state = self.state.lock().await;
                state.settle_focus(Instant::now());
                Ok(json!(state.event(category)))
            }
        }
    }
}

#[async_trait]
impl RemoteProxy for MockCameraProxy {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call(&self, method: &str, args: CallArgs) -> Result<Value, ConnectionError> {
        if method == "event_wait" {
            drop(self.enter(method).await?);
            return self.event_wait(&args).await;
        }

        let mut state = self.enter(method).await?;
        let now = Instant::now();

        match method {
            "get_uid" => Ok(json!(state.uid)),
            "get" => {
                let name = self.arg(&args, "name")?.as_str().unwrap_or_default();
                state
                    .properties
                    .get(name)
                    .cloned()
                    .ok_or_else(|| self.remote_error("AttributeError", format!("no property '{}'", name)))
            }
            "set" => {
                let name = self.arg(&args, "name")?.as_str().unwrap_or_default().to_string();
                let value = self.arg(&args, "value")?.clone();
                state.properties.insert(name, value);
                Ok(Value::Null)
            }
            "take_exposure" => {
                let seconds = self
                    .arg(&args, "seconds")?
                    .as_f64()
                    .and_then(|s| Duration::try_from_secs_f64(s).ok())
                    .ok_or_else(|| self.remote_error("ValueError", "seconds must be a number"))?;
                state.exposing_until = Some(now + seconds);
                state.reading_out_until = Some(match state.readout {
                    ReadoutBehaviour::After(d) => now + d,
                    ReadoutBehaviour::Never => now + NEVER,
                });
                state.exposures.push(args);
                Ok(Value::Null)
            }
            "autofocus" => {
                if !state.has_focuser {
                    return Err(self.remote_error("AttributeError", "camera has no focuser"));
                }
                state.events.insert(EventCategory::Focuser, false);
                state.focus_done_at = match state.focus {
                    FocusBehaviour::After(d) => Some(now + d),
                    FocusBehaviour::Never => None,
                };
                state.autofocus_runs.push(args);
                Ok(Value::Null)
            }
            "event_set" => {
                let category = self.category(&args)?;
                state.events.insert(category, true);
                Ok(Value::Null)
            }
            "event_clear" => {
                let category = self.category(&args)?;
                state.events.insert(category, false);
                Ok(Value::Null)
            }
            "event_is_set" => {
                let category = self.category(&args)?;
                Ok(json!(state.event(category)))
            }
            "focuser_get" if state.has_focuser => {
                match self.arg(&args, "name")?.as_str().unwrap_or_default() {
                    "position" => Ok(json!(state.focuser_position)),
                    "min_position" => Ok(json!(state.focuser_range.0)),
                    "max_position" => Ok(json!(state.focuser_range.1)),
                    "is_moving" => Ok(json!(false)),
                    other => Err(self.remote_error("AttributeError", format!("no focuser property '{}'", other))),
                }
            }
            "focuser_move_to" | "focuser_move_by" if state.has_focuser => {
                let key = if method == "focuser_move_to" { "position" } else { "increment" };
                let amount = self
                    .arg(&args, key)?
                    .as_i64()
                    .ok_or_else(|| self.remote_error("ValueError", format!("{} must be an integer", key)))?;
                let target = if method == "focuser_move_to" {
                    amount
                } else {
                    state.focuser_position + amount
                };
                let (min, max) = state.focuser_range;
                state.focuser_position = target.clamp(min, max);
                Ok(json!(state.focuser_position))
            }
            "filterwheel_get" if state.has_filterwheel => {
                match self.arg(&args, "name")?.as_str().unwrap_or_default() {
                    "position" => Ok(json!(state.filter_position + 1)),
                    "current_filter" => Ok(json!(state.filter_names.get(state.filter_position))),
                    "filter_names" => Ok(json!(state.filter_names)),
                    "is_moving" => Ok(json!(false)),
                    other => Err(self.remote_error(
                        "AttributeError",
                        format!("no filterwheel property '{}'", other),
                    )),
                }
            }
            "filterwheel_move_to" if state.has_filterwheel => {
                let slot = match self.arg(&args, "position")? {
                    Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
                    Value::String(name) => state
                        .filter_names
                        .iter()
                        .position(|f| f == name)
                        .map(|idx| idx + 1),
                    _ => None,
                };
                match slot {
                    Some(slot) if slot >= 1 && slot <= state.filter_names.len() => {
                        state.filter_position = slot - 1;
                        Ok(json!(slot))
                    }
                    _ => Err(self.remote_error("ValueError", "no such filter position")),
                }
            }
            other => Err(self.remote_error("AttributeError", format!("no method '{}'", other))),
        }
    }

    async fn attribute(&self, name: &str) -> Result<Value, ConnectionError> {
        let state = self.enter(name).await?;
        let now = Instant::now();
        match name {
            "is_exposing" => Ok(json!(state.exposing_until.is_some_and(|t| now < t))),
            "is_reading_out" => Ok(json!(state.reading_out_until.is_some_and(|t| now < t))),
            "has_focuser" => Ok(json!(state.has_focuser)),
            "has_filterwheel" => Ok(json!(state.has_filterwheel)),
            other => Err(self.remote_error("AttributeError", format!("no attribute '{}'", other))),
        }
    }
}
