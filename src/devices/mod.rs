//! Sub-devices a camera host may expose alongside the camera.
//!
//! Which of these exist is only known after the camera connects; the
//! camera holds each as an `Option` and checks it before use.

pub mod filterwheel;
pub mod focuser;

pub use filterwheel::{FilterSelector, RemoteFilterWheel};
pub use focuser::RemoteFocuser;
