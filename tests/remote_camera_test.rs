//! End-to-end behaviour of `RemoteCamera` against the mock camera host.
//!
//! Timing tests run on tokio's paused clock, so multi-second readouts and
//! focus runs complete instantly and deterministically.

use daq_remote_camera::camera::ReadoutState;
use daq_remote_camera::config::{CameraSettings, ClientConfig, ConfigLookup, FigmentLookup};
use daq_remote_camera::mock::{FocusBehaviour, MockCameraProxy};
use daq_remote_camera::{
    CameraError, ConnectOutcome, ConnectionError, ExposureRequest, FocusRequest, RemoteCamera,
};
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn settings(base_timeout: Duration) -> CameraSettings {
    CameraSettings {
        name: "cam00".into(),
        readout_timeout: base_timeout,
        ..CameraSettings::default()
    }
}

// ============================================================================
// Readout wait
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_blocking_exposure_succeeds_when_readout_ends_before_deadline() {
    // readout_time 2 s + base 1 s + exposure 3 s: deadline at 6 s.
    let mock = Arc::new(MockCameraProxy::new().with_readout(Duration::from_secs(4)));
    let camera = RemoteCamera::open(mock.clone(), settings(Duration::from_secs(1)), None)
        .await
        .unwrap();

    let started = Instant::now();
    let readout = camera
        .take_exposure(ExposureRequest::new(Duration::from_secs(3)).blocking(true))
        .await
        .unwrap();

    assert_eq!(readout.state(), ReadoutState::Done);
    assert_eq!(readout.timeout(), Duration::from_secs(6));
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(4));
    assert!(elapsed < Duration::from_secs(5));

    let exposures = mock.exposures().await;
    assert_eq!(exposures.len(), 1);
    assert_eq!(exposures[0]["seconds"], json!(3.0));
    assert_eq!(exposures[0]["dark"], json!(false));
}

#[tokio::test(start_paused = true)]
async fn test_blocking_exposure_reports_readout_timeout() {
    let mock = Arc::new(MockCameraProxy::new().never_finishes_readout());
    let camera = RemoteCamera::open(mock, settings(Duration::from_secs(1)), None)
        .await
        .unwrap();

    let started = Instant::now();
    let err = camera
        .take_exposure(ExposureRequest::new(Duration::from_secs(3)).blocking(true))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        CameraError::ReadoutTimeout {
            camera: "Mock Camera".into(),
            endpoint: "mock:0/camera".into(),
            timeout: Duration::from_secs(6),
        }
    );
    assert!(err.is_timeout());
    assert!(err.to_string().contains("6.000s"));
    assert!(err.to_string().contains("mock:0/camera"));
    assert!(started.elapsed() >= Duration::from_secs(6));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_readout_waits_are_independent() {
    let mock = Arc::new(MockCameraProxy::new().with_readout(Duration::from_secs(4)));
    let camera = RemoteCamera::open(mock.clone(), settings(Duration::from_secs(1)), None)
        .await
        .unwrap();

    // Deadline 0.5 + 2 + 1 = 3.5 s, before the mock's 4 s readout ends.
    let short = camera
        .take_exposure(ExposureRequest::new(Duration::from_millis(500)))
        .await
        .unwrap();
    // Deadline 10 + 2 + 1 = 13 s; the second exposure restarts the readout
    // window, which ends 4 s from now.
    let long = camera
        .take_exposure(ExposureRequest::new(Duration::from_secs(10)))
        .await
        .unwrap();

    assert!(matches!(
        short.wait().await,
        Err(CameraError::ReadoutTimeout { timeout, .. }) if timeout == Duration::from_millis(3500)
    ));
    assert_eq!(long.state(), ReadoutState::Waiting);

    long.wait().await.unwrap();
    assert_eq!(long.state(), ReadoutState::Done);
    assert_eq!(short.state(), ReadoutState::TimedOut);
    assert_eq!(mock.call_count("take_exposure").await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_readout_poll_interval_is_configurable() {
    let mock = Arc::new(MockCameraProxy::new().with_readout(Duration::from_secs(1)));
    let camera = RemoteCamera::open(
        mock.clone(),
        CameraSettings {
            readout_poll_interval: Duration::from_millis(250),
            ..settings(Duration::from_secs(1))
        },
        None,
    )
    .await
    .unwrap();

    camera
        .take_exposure(ExposureRequest::new(Duration::from_secs(1)).blocking(true))
        .await
        .unwrap();

    // Polls at 0, 250, 500, 750 and 1000 ms.
    assert_eq!(mock.call_count("is_reading_out").await, 5);
}

#[tokio::test(start_paused = true)]
async fn test_hung_camera_host_still_ends_readout_wait() {
    let mock = Arc::new(MockCameraProxy::new().hang_on("is_reading_out"));
    let camera = RemoteCamera::open(mock, settings(Duration::from_secs(1)), None)
        .await
        .unwrap();

    let readout = camera
        .take_exposure(ExposureRequest::new(Duration::from_secs(3)))
        .await
        .unwrap();
    let waiter = readout.clone();
    let err = tokio::spawn(async move { waiter.wait().await })
        .await
        .unwrap()
        .unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(readout.state(), ReadoutState::TimedOut);
}

// ============================================================================
// Autofocus
// ============================================================================

#[tokio::test]
async fn test_autofocus_without_focuser_is_capability_error_with_no_calls() {
    let mock = Arc::new(MockCameraProxy::new());
    let camera = RemoteCamera::open(mock.clone(), settings(Duration::from_secs(1)), None)
        .await
        .unwrap();
    let before = mock.total_calls().await;

    for request in [FocusRequest::fine(), FocusRequest::coarse().blocking(true)] {
        let err = camera.autofocus(request).await.unwrap_err();
        assert!(matches!(err, CameraError::Capability { .. }));
        assert!(err.to_string().contains("has no focuser"));
    }
    assert_eq!(mock.total_calls().await, before);
}

#[tokio::test(start_paused = true)]
async fn test_autofocus_timeout_comes_from_config_file() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(b"[focusing.coarse]\ntimeout = 20.0\n").unwrap();
    let lookup: Arc<dyn ConfigLookup> =
        Arc::new(FigmentLookup::new(ClientConfig::figment(file.path())));

    let mock = Arc::new(
        MockCameraProxy::new()
            .with_focuser()
            .with_focus(FocusBehaviour::After(Duration::from_secs(30))),
    );
    let camera = RemoteCamera::open(mock.clone(), settings(Duration::from_secs(1)), Some(lookup))
        .await
        .unwrap();

    let started = Instant::now();
    let err = camera
        .autofocus(FocusRequest::coarse().blocking(true))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        CameraError::FocusWaitTimeout {
            camera: "Mock Camera".into(),
            endpoint: "mock:0/camera".into(),
            timeout: Duration::from_secs(20),
        }
    );
    assert!(started.elapsed() >= Duration::from_secs(20));

    // Fine runs fall back to the 600 s default and finish.
    let event = camera
        .autofocus(FocusRequest::fine().blocking(true))
        .await
        .unwrap();
    assert!(event.is_set().await.unwrap());
    assert_eq!(mock.autofocus_runs().await.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_exposure_and_autofocus_run_concurrently() {
    let mock = Arc::new(
        MockCameraProxy::new()
            .with_focuser()
            .with_readout(Duration::from_secs(4))
            .with_focus(FocusBehaviour::After(Duration::from_secs(10))),
    );
    let camera = RemoteCamera::open(mock.clone(), settings(Duration::from_secs(1)), None)
        .await
        .unwrap();

    let (exposure, focus) = tokio::join!(
        camera.take_exposure(ExposureRequest::new(Duration::from_secs(3)).blocking(true)),
        camera.autofocus(FocusRequest::fine().blocking(true)),
    );
    exposure.unwrap();
    assert!(focus.unwrap().is_set().await.unwrap());
}

// ============================================================================
// Bootstrap
// ============================================================================

#[tokio::test]
async fn test_empty_uid_leaves_client_disconnected_with_no_fetches() {
    let mock = Arc::new(MockCameraProxy::new().with_uid(""));
    let mut camera = RemoteCamera::new(mock.clone(), settings(Duration::from_secs(1)), None);

    assert_eq!(camera.connect().await.unwrap(), ConnectOutcome::NoIdentity);
    assert!(!camera.is_connected());
    assert_eq!(mock.call_count("get").await, 0);
    assert_eq!(mock.total_calls().await, 1);

    assert!(matches!(
        camera.temperature().await,
        Err(CameraError::NotConnected { .. })
    ));
    assert_eq!(mock.total_calls().await, 1);
}

#[tokio::test]
async fn test_two_connects_give_identical_identity() {
    let mock = Arc::new(MockCameraProxy::new().with_focuser());
    let mut camera = RemoteCamera::new(mock, settings(Duration::from_secs(1)), None);

    let first = camera.connect().await.unwrap();
    let second = camera.connect().await.unwrap();
    assert!(first.is_connected());
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_identity_is_not_refreshed_without_reconnect() {
    let mock = Arc::new(MockCameraProxy::new());
    let mut camera = RemoteCamera::new(mock.clone(), settings(Duration::from_secs(1)), None);
    camera.connect().await.unwrap();

    mock.set_property("name", json!("Replacement Camera")).await;
    assert_eq!(camera.name(), "Mock Camera");

    camera.connect().await.unwrap();
    assert_eq!(camera.name(), "Replacement Camera");
}

#[tokio::test]
async fn test_remote_failure_is_not_retried() {
    let down = ConnectionError::Unreachable {
        endpoint: "mock:0/camera".into(),
        reason: "connection refused".into(),
    };
    let mock = Arc::new(MockCameraProxy::new().fail_on("is_reading_out", down.clone()));
    let camera = RemoteCamera::open(mock.clone(), settings(Duration::from_secs(1)), None)
        .await
        .unwrap();
    assert_eq!(
        camera.is_reading_out().await,
        Err(CameraError::Connection(down))
    );
    assert_eq!(mock.call_count("is_reading_out").await, 1);
}
