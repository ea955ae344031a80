//! Client library for cameras served from a remote camera host.
//!
//! A [`RemoteCamera`] stands in for a camera (and its optional focuser and
//! filter wheel) that physically lives on another machine. Each operation is
//! a round trip through a [`RemoteProxy`]; the client adds the connection
//! bootstrap, the readout and autofocus waits, and the timeouts around them.
//!
//! - [`proxy`] / [`transport`]: the remote call boundary and its TCP
//!   implementation
//! - [`camera`]: the camera client
//! - [`devices`]: focuser and filter wheel controllers
//! - [`event`]: handles to events living on the camera host
//! - [`mock`]: in-process camera host for tests and dry runs
//! - [`config`] / [`logging`]: figment configuration and tracing setup

pub mod bridge;
pub mod camera;
pub mod config;
pub mod devices;
pub mod error;
pub mod event;
pub mod logging;
pub mod mock;
pub mod proxy;
pub mod transport;

pub use camera::{
    ConnectOutcome, DeviceIdentity, ExposureRequest, FocusRequest, ReadoutState, ReadoutWait,
    RemoteCamera,
};
pub use config::{CameraSettings, ClientConfig, ConfigLookup, FigmentLookup};
pub use error::{CameraError, CameraResult, ConnectionError};
pub use event::{EventCategory, RemoteEvent};
pub use proxy::{CallArgs, Endpoint, RemoteProxy};
pub use transport::TcpProxy;
