//! Remote camera client.
//!
//! [`RemoteCamera`] stands in for a camera that runs on a separate camera
//! host. Everything it knows about the device, apart from the identity cached
//! at connect time, is fetched with a remote call when asked for.
//!
//! # Lifecycle
//!
//! ```text
//! new() --connect()--> connected --take_exposure()--> ReadoutWait (spawned poll task)
//!                                 \--autofocus()-----> RemoteEvent (focuser)
//! ```
//!
//! - [`RemoteCamera::connect`] fetches and caches the [`DeviceIdentity`],
//!   binds the exposure and focus events and attaches a focuser / filter wheel
//!   if the host has them. An empty uid is reported as
//!   [`ConnectOutcome::NoIdentity`], not as an error.
//! - Until a connect succeeds, every property read and
//!   [`RemoteCamera::take_exposure`] fail with [`CameraError::NotConnected`]
//!   without touching the network.
//! - Exposures and autofocus runs are independent; the camera host decides
//!   whether it can do both at once.
//!
//! # Example
//!
//! ```rust,ignore
//! let settings = ClientConfig::load()?.camera;
//! let mut camera = RemoteCamera::over_tcp(settings, None)?;
//! if !camera.connect().await?.is_connected() {
//!     anyhow::bail!("camera host has no camera");
//! }
//! let readout = camera
//!     .take_exposure(ExposureRequest::new(Duration::from_secs(30)).filename("/data/m42.fits"))
//!     .await?;
//! readout.wait().await?;
//! ```

mod autofocus;
mod bootstrap;
mod exposure;

pub use autofocus::{resolve_focus_timeout, FocusRequest};
pub use bootstrap::{ConnectOutcome, DeviceIdentity};
pub use exposure::{readout_timeout, ExposureRequest, ReadoutState, ReadoutWait};

use crate::bridge::RemoteAttributes;
use crate::config::{CameraSettings, ConfigLookup};
use crate::devices::{RemoteFilterWheel, RemoteFocuser};
use crate::error::{CameraError, CameraResult};
use crate::event::RemoteEvent;
use crate::proxy::{Endpoint, RemoteProxy};
use crate::transport::TcpProxy;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::Span;

/// State that only exists while connected.
#[derive(Debug, Clone)]
struct Connection {
    identity: DeviceIdentity,
    exposure_event: RemoteEvent,
    focus_event: RemoteEvent,
    focuser: Option<RemoteFocuser>,
    filterwheel: Option<RemoteFilterWheel>,
}

/// Client for a camera served from a remote camera host.
pub struct RemoteCamera {
    proxy: Arc<dyn RemoteProxy>,
    attrs: RemoteAttributes,
    settings: CameraSettings,
    config: Option<Arc<dyn ConfigLookup>>,
    connection: Option<Connection>,
    span: Span,
}

impl fmt::Debug for RemoteCamera {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteCamera")
            .field("name", &self.name())
            .field("endpoint", &self.endpoint())
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl fmt::Display for RemoteCamera {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) on {}", self.name(), self.model(), self.endpoint())
    }
}

impl RemoteCamera {
    /// Create an unconnected client.
    ///
    /// `config` is the lookup used for autofocus timeouts; without it the
    /// built-in default applies.
    pub fn new(
        proxy: Arc<dyn RemoteProxy>,
        settings: CameraSettings,
        config: Option<Arc<dyn ConfigLookup>>,
    ) -> Self {
        let span = tracing::info_span!(
            "remote_camera",
            camera = %settings.name,
            endpoint = %proxy.endpoint()
        );
        Self {
            attrs: RemoteAttributes::new(proxy.clone()),
            proxy,
            settings,
            config,
            connection: None,
            span,
        }
    }

    /// Create a client and run [`connect`](Self::connect) once.
    ///
    /// A soft bootstrap failure still returns the client; check
    /// [`is_connected`](Self::is_connected).
    pub async fn open(
        proxy: Arc<dyn RemoteProxy>,
        settings: CameraSettings,
        config: Option<Arc<dyn ConfigLookup>>,
    ) -> CameraResult<Self> {
        let mut camera = Self::new(proxy, settings, config);
        camera.connect().await?;
        Ok(camera)
    }

    /// Create an unconnected client talking TCP to `settings.uri`.
    pub fn over_tcp(
        settings: CameraSettings,
        config: Option<Arc<dyn ConfigLookup>>,
    ) -> CameraResult<Self> {
        let endpoint: Endpoint = settings.uri.parse()?;
        let proxy = Arc::new(TcpProxy::new(endpoint, settings.connect_timeout));
        Ok(Self::new(proxy, settings, config))
    }

    // ------------------------------------------------------------------
    // Local state
    // ------------------------------------------------------------------

    /// Whether the last [`connect`](Self::connect) succeeded.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Remote endpoint.
    pub fn endpoint(&self) -> &str {
        self.proxy.endpoint()
    }

    /// Camera name: the remote name once connected, the configured one before.
    pub fn name(&self) -> &str {
        self.connection
            .as_ref()
            .map_or(self.settings.name.as_str(), |c| c.identity.name.as_str())
    }

    /// Camera model: the remote model once connected, the configured one before.
    pub fn model(&self) -> &str {
        self.connection
            .as_ref()
            .map_or(self.settings.model.as_str(), |c| c.identity.model.as_str())
    }

    /// Configured port identifier of the physical camera.
    pub fn port(&self) -> Option<&str> {
        self.settings.port.as_deref()
    }

    /// Serial number / unique id, once connected.
    pub fn uid(&self) -> Option<&str> {
        self.connection.as_ref().map(|c| c.identity.uid.as_str())
    }

    /// Identity cached by the last successful connect.
    pub fn identity(&self) -> Option<&DeviceIdentity> {
        self.connection.as_ref().map(|c| &c.identity)
    }

    /// Settings this client was built with.
    pub fn settings(&self) -> &CameraSettings {
        &self.settings
    }

    /// Attached focuser, if the camera host has one.
    pub fn focuser(&self) -> Option<&RemoteFocuser> {
        self.connection.as_ref().and_then(|c| c.focuser.as_ref())
    }

    /// Attached filter wheel, if the camera host has one.
    pub fn filterwheel(&self) -> Option<&RemoteFilterWheel> {
        self.connection.as_ref().and_then(|c| c.filterwheel.as_ref())
    }

    /// Handle to the remote exposure event.
    pub fn exposure_event(&self) -> CameraResult<&RemoteEvent> {
        Ok(&self.connected()?.exposure_event)
    }

    /// Handle to the remote focus-complete event.
    pub fn focus_event(&self) -> CameraResult<&RemoteEvent> {
        Ok(&self.connected()?.focus_event)
    }

    fn connected(&self) -> CameraResult<&Connection> {
        self.connection
            .as_ref()
            .ok_or_else(|| CameraError::NotConnected {
                camera: self.settings.name.clone(),
                endpoint: self.endpoint().to_string(),
            })
    }

    // ------------------------------------------------------------------
    // Pass-through properties
    // ------------------------------------------------------------------

    /// Gain in electrons per ADU.
    pub async fn egain(&self) -> CameraResult<f64> {
        self.connected()?;
        self.attrs.get("egain").await
    }

    /// ADC bit depth.
    pub async fn bit_depth(&self) -> CameraResult<u32> {
        self.connected()?;
        self.attrs.get("bit_depth").await
    }

    /// Current sensor temperature.
    pub async fn temperature(&self) -> CameraResult<f64> {
        self.connected()?;
        self.attrs.get("temperature").await
    }

    /// Cooling set point.
    pub async fn target_temperature(&self) -> CameraResult<f64> {
        self.connected()?;
        self.attrs.get("target_temperature").await
    }

    /// Change the cooling set point.
    pub async fn set_target_temperature(&self, target: f64) -> CameraResult<()> {
        self.connected()?;
        self.attrs.set_f64("target_temperature", target).await
    }

    /// Allowed deviation from the set point for a stable temperature.
    pub async fn temperature_tolerance(&self) -> CameraResult<f64> {
        self.connected()?;
        self.attrs.get("temperature_tolerance").await
    }

    /// Change the temperature tolerance.
    pub async fn set_temperature_tolerance(&self, tolerance: f64) -> CameraResult<()> {
        self.connected()?;
        self.attrs.set_f64("temperature_tolerance", tolerance).await
    }

    /// Whether sensor cooling is on.
    pub async fn cooling_enabled(&self) -> CameraResult<bool> {
        self.connected()?;
        self.attrs.get("cooling_enabled").await
    }

    /// Turn sensor cooling on or off.
    pub async fn set_cooling_enabled(&self, enabled: bool) -> CameraResult<()> {
        self.connected()?;
        self.attrs.set_bool("cooling_enabled", enabled).await
    }

    /// Cooler power level, typically percent of maximum.
    pub async fn cooling_power(&self) -> CameraResult<f64> {
        self.connected()?;
        self.attrs.get("cooling_power").await
    }

    /// Whether the camera is exposing.
    pub async fn is_exposing(&self) -> CameraResult<bool> {
        self.connected()?;
        self.attrs.get("is_exposing").await
    }

    /// Set or clear the remote exposure event.
    pub async fn set_exposing(&self, exposing: bool) -> CameraResult<()> {
        let event = &self.connected()?.exposure_event;
        if exposing {
            event.set().await
        } else {
            event.clear().await
        }
    }

    /// Whether the camera is transferring an image off the sensor.
    pub async fn is_reading_out(&self) -> CameraResult<bool> {
        self.connected()?;
        self.attrs.attribute("is_reading_out").await
    }

    /// Whether the sensor temperature is within tolerance of the set point.
    pub async fn is_temperature_stable(&self) -> CameraResult<bool> {
        self.connected()?;
        self.attrs.get("is_temperature_stable").await
    }

    /// Whether the camera can start another exposure.
    pub async fn is_ready(&self) -> CameraResult<bool> {
        self.connected()?;
        self.attrs.get("is_ready").await
    }

    /// Readout time cached at connect.
    pub fn readout_time(&self) -> CameraResult<Duration> {
        Ok(self.connected()?.identity.readout_time)
    }

    /// Image file extension cached at connect.
    pub fn file_extension(&self) -> CameraResult<&str> {
        Ok(self.connected()?.identity.file_extension.as_str())
    }

    /// Whether the sensor is cooled, cached at connect.
    pub fn is_cooled_camera(&self) -> CameraResult<bool> {
        Ok(self.connected()?.identity.is_cooled_camera)
    }

    /// Colour filter array type cached at connect.
    pub fn filter_type(&self) -> CameraResult<Option<&str>> {
        Ok(self.connected()?.identity.filter_type.as_deref())
    }
}
