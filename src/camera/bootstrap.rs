//! Connection bootstrap: identity fetch, event binding and sub-device attachment.

use super::{Connection, RemoteCamera};
use crate::bridge::RemoteAttributes;
use crate::devices::{RemoteFilterWheel, RemoteFocuser};
use crate::error::CameraResult;
use crate::event::{EventCategory, RemoteEvent};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info, Instrument};

/// Device properties fetched once at connect and never refreshed.
///
/// If the camera behind the endpoint is swapped without reconnecting, these
/// values are stale.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceIdentity {
    /// Serial number / unique id
    pub uid: String,
    /// Display name
    pub name: String,
    /// Model string
    pub model: String,
    /// Time to read an image off the sensor
    #[serde(with = "humantime_serde")]
    pub readout_time: Duration,
    /// Extension of the image files the camera writes
    pub file_extension: String,
    /// Whether the sensor has active cooling
    pub is_cooled_camera: bool,
    /// Colour filter array type, if any
    pub filter_type: Option<String>,
}

impl DeviceIdentity {
    async fn fetch(attrs: &RemoteAttributes, uid: String) -> CameraResult<Self> {
        Ok(Self {
            uid,
            name: attrs.get("name").await?,
            model: attrs.get("model").await?,
            readout_time: attrs.get("readout_time").await?,
            file_extension: attrs.get("file_extension").await?,
            is_cooled_camera: attrs.get("is_cooled_camera").await?,
            filter_type: attrs.get("filter_type").await?,
        })
    }
}

/// Result of [`RemoteCamera::connect`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectOutcome {
    /// Connected; the identity is cached on the client.
    Connected(DeviceIdentity),
    /// The camera host returned no uid. The client stays disconnected.
    NoIdentity,
}

impl ConnectOutcome {
    /// Whether the client is now connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectOutcome::Connected(_))
    }
}

/// Falsy values count as "no uid": `null`, `false`, zero, and empty strings,
/// arrays or objects. Anything else is used in its JSON text form.
fn uid_from_value(value: Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        Value::Array(a) if a.is_empty() => None,
        Value::Object(o) if o.is_empty() => None,
        other => Some(other.to_string()),
    }
}

impl RemoteCamera {
    /// Connect to the remote camera.
    ///
    /// Every call re-runs the full sequence and re-fetches the identity:
    ///
    /// 1. `get_uid()`; an empty uid logs an error and returns
    ///    [`ConnectOutcome::NoIdentity`]
    /// 2. fetch and cache name, model, readout time, file extension, cooling
    ///    flag and filter type
    /// 3. bind the `camera` and `focuser` remote events
    /// 4. mark the client connected
    /// 5. attach a focuser and/or filter wheel if the host reports one
    ///
    /// Any previous connection state is dropped first, so a failed reconnect
    /// leaves the client disconnected. Remote failures are returned as
    /// errors; nothing is retried.
    ///
    /// Takes `&mut self`: connection attempts cannot overlap with each other
    /// or with operations on the same client.
    pub async fn connect(&mut self) -> CameraResult<ConnectOutcome> {
        let span = self.span.clone();
        self.run_bootstrap().instrument(span).await
    }

    async fn run_bootstrap(&mut self) -> CameraResult<ConnectOutcome> {
        self.connection = None;
        debug!("Connecting to {} at {}", self.settings.name, self.endpoint());

        let Some(uid) = uid_from_value(self.proxy.get_uid().await?) else {
            error!(
                "Couldn't connect to {} on {}, no uid found.",
                self.settings.name,
                self.endpoint()
            );
            return Ok(ConnectOutcome::NoIdentity);
        };

        let identity = DeviceIdentity::fetch(&self.attrs, uid).await?;
        self.span.record("camera", identity.name.as_str());

        self.connection = Some(Connection {
            identity: identity.clone(),
            exposure_event: RemoteEvent::new(self.proxy.clone(), EventCategory::Camera),
            focus_event: RemoteEvent::new(self.proxy.clone(), EventCategory::Focuser),
            focuser: None,
            filterwheel: None,
        });
        debug!("{} connected.", identity.name);

        let has_focuser: bool = self.attrs.attribute("has_focuser").await?;
        let has_filterwheel: bool = self.attrs.attribute("has_filterwheel").await?;

        if let Some(connection) = self.connection.as_mut() {
            if has_focuser {
                connection.focuser = Some(RemoteFocuser::new(self.proxy.clone(), identity.name.clone()));
            }
            if has_filterwheel {
                connection.filterwheel =
                    Some(RemoteFilterWheel::new(self.proxy.clone(), identity.name.clone()));
            }
        }

        info!(
            uid = %identity.uid,
            model = %identity.model,
            readout_s = identity.readout_time.as_secs_f64(),
            focuser = has_focuser,
            filterwheel = has_filterwheel,
            "Camera connected"
        );

        Ok(ConnectOutcome::Connected(identity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CameraSettings;
    use crate::error::{CameraError, ConnectionError};
    use crate::mock::MockCameraProxy;
    use serde_json::json;
    use std::sync::Arc;
    use tracing_test::traced_test;

    #[test]
    fn test_uid_falsiness() {
        assert_eq!(uid_from_value(json!("ZWO-1234")), Some("ZWO-1234".into()));
        assert_eq!(uid_from_value(json!(1234)), Some("1234".into()));
        assert_eq!(uid_from_value(json!("")), None);
        assert_eq!(uid_from_value(json!(0)), None);
        assert_eq!(uid_from_value(json!(null)), None);
        assert_eq!(uid_from_value(json!(false)), None);
        assert_eq!(uid_from_value(json!([])), None);
        assert_eq!(uid_from_value(json!({})), None);
        assert_eq!(uid_from_value(json!(true)), Some("true".into()));
        assert_eq!(uid_from_value(json!(["cam", 1])), Some(r#"["cam",1]"#.into()));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_empty_uid_is_soft_failure() {
        let mock = Arc::new(MockCameraProxy::new().with_uid(""));
        let mut camera = RemoteCamera::new(mock.clone(), CameraSettings::default(), None);

        let outcome = camera.connect().await.unwrap();
        assert_eq!(outcome, ConnectOutcome::NoIdentity);
        assert!(!camera.is_connected());
        assert!(logs_contain("no uid found"));

        // Nothing beyond the uid query went out.
        assert_eq!(mock.calls().await, vec!["get_uid".to_string()]);
    }

    #[tokio::test]
    async fn test_connect_caches_identity_and_attaches_devices() {
        let mock = Arc::new(
            MockCameraProxy::new()
                .with_uid("ZWO-1234")
                .with_focuser()
                .with_filterwheel(["g", "r"]),
        );
        let mut camera = RemoteCamera::new(mock.clone(), CameraSettings::default(), None);

        let outcome = camera.connect().await.unwrap();
        let ConnectOutcome::Connected(identity) = outcome else {
            panic!("expected a connection");
        };
        assert_eq!(identity.uid, "ZWO-1234");
        assert_eq!(identity.name, "Mock Camera");
        assert_eq!(identity.readout_time, Duration::from_secs(2));
        assert_eq!(identity.filter_type.as_deref(), Some("RGGB"));
        assert!(identity.is_cooled_camera);

        assert!(camera.is_connected());
        assert_eq!(camera.name(), "Mock Camera");
        assert_eq!(camera.identity(), Some(&identity));
        assert!(camera.focuser().is_some());
        assert!(camera.filterwheel().is_some());

        // Cached: reading identity again costs nothing.
        let calls = mock.total_calls().await;
        let _ = camera.readout_time().unwrap();
        assert_eq!(mock.total_calls().await, calls);
    }

    #[tokio::test]
    async fn test_no_sub_devices_when_host_has_none() {
        let mock = Arc::new(MockCameraProxy::new());
        let camera = RemoteCamera::open(mock, CameraSettings::default(), None)
            .await
            .unwrap();
        assert!(camera.focuser().is_none());
        assert!(camera.filterwheel().is_none());
    }

    #[tokio::test]
    async fn test_reconnect_refetches_and_failed_reconnect_disconnects() {
        let mock = Arc::new(MockCameraProxy::new());
        let mut camera = RemoteCamera::new(mock.clone(), CameraSettings::default(), None);

        let first = camera.connect().await.unwrap();
        let second = camera.connect().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(mock.call_count("get_uid").await, 2);
        assert_eq!(mock.call_count("get").await, 12);

        mock.set_uid("").await;
        assert_eq!(camera.connect().await.unwrap(), ConnectOutcome::NoIdentity);
        assert!(!camera.is_connected());
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() {
        let down = ConnectionError::Unreachable {
            endpoint: "mock:0/camera".into(),
            reason: "connection refused".into(),
        };
        let mock = Arc::new(MockCameraProxy::new().fail_on("get_uid", down.clone()));
        let mut camera = RemoteCamera::new(mock, CameraSettings::default(), None);

        assert_eq!(camera.connect().await, Err(CameraError::Connection(down)));
        assert!(!camera.is_connected());
    }
}
