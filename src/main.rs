//! `remote-camera`: command line access to a camera on a remote camera host.
//!
//! ```bash
//! remote-camera --uri 10.0.0.12:9000/camera info
//! remote-camera status
//! remote-camera expose --seconds 30 --filename /data/m42.fits
//! remote-camera autofocus --coarse
//! remote-camera cooling --target -10 --enable
//! remote-camera --mock expose --seconds 1
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use daq_remote_camera::config::{ClientConfig, ConfigLookup, FigmentLookup, DEFAULT_CONFIG_FILE};
use daq_remote_camera::mock::MockCameraProxy;
use daq_remote_camera::{logging, ConnectOutcome, ExposureRequest, FocusRequest, RemoteCamera};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "remote-camera")]
#[command(about = "Control a camera served from a remote camera host")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Camera endpoint (host:port/object), overrides camera.uri
    #[arg(long)]
    uri: Option<String>,

    /// Talk to an in-process mock camera instead of the network
    #[arg(long)]
    mock: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the identity fetched at connect
    Info,

    /// Print live camera properties
    Status,

    /// Take one exposure
    Expose {
        /// Exposure time in seconds
        #[arg(short, long)]
        seconds: f64,

        /// Output file on the camera host
        #[arg(short, long)]
        filename: Option<PathBuf>,

        /// Take a dark frame
        #[arg(long)]
        dark: bool,

        /// Return once the exposure has started
        #[arg(long)]
        no_wait: bool,
    },

    /// Run autofocus on the attached focuser
    Autofocus {
        /// Coarse run instead of fine
        #[arg(long)]
        coarse: bool,

        /// Client-side wait limit in seconds
        #[arg(long)]
        timeout: Option<f64>,

        /// Return once the run has started
        #[arg(long)]
        no_wait: bool,
    },

    /// Show or change sensor cooling
    Cooling {
        /// New set point
        #[arg(long, allow_hyphen_values = true)]
        target: Option<f64>,

        /// Turn cooling on
        #[arg(long, conflicts_with = "disable")]
        enable: bool,

        /// Turn cooling off
        #[arg(long)]
        disable: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let figment = ClientConfig::figment(&cli.config);
    let mut config = ClientConfig::from_figment(&figment)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    if let Some(uri) = cli.uri {
        config.camera.uri = uri;
        config.validate()?;
    }

    logging::init(&config.logging);

    let lookup: Arc<dyn ConfigLookup> = Arc::new(FigmentLookup::new(figment));
    let mut camera = if cli.mock {
        let proxy = MockCameraProxy::new()
            .with_focuser()
            .with_filterwheel(["L", "R", "G", "B"]);
        RemoteCamera::new(Arc::new(proxy), config.camera, Some(lookup))
    } else {
        RemoteCamera::over_tcp(config.camera, Some(lookup))?
    };

    if let ConnectOutcome::NoIdentity = camera.connect().await? {
        bail!("No camera found at {}", camera.endpoint());
    }

    run(&camera, cli.command).await
}

async fn run(camera: &RemoteCamera, command: Command) -> Result<()> {
    match command {
        Command::Info => {
            let identity = camera.identity().context("camera disconnected")?;
            println!("{}", serde_json::to_string_pretty(identity)?);
            println!("focuser: {}", camera.focuser().is_some());
            println!("filterwheel: {}", camera.filterwheel().is_some());
        }

        Command::Status => print_status(camera).await?,

        Command::Expose {
            seconds,
            filename,
            dark,
            no_wait,
        } => {
            let duration =
                Duration::try_from_secs_f64(seconds).context("Invalid exposure time")?;
            let mut request = ExposureRequest::new(duration).dark(dark).blocking(!no_wait);
            if let Some(filename) = filename {
                request = request.filename(filename);
            }

            let readout = camera.take_exposure(request).await?;
            if no_wait {
                println!("Exposure started, readout deadline {:?}", readout.timeout());
            } else {
                info!("Exposure complete");
                println!("Exposure complete");
            }
        }

        Command::Autofocus {
            coarse,
            timeout,
            no_wait,
        } => {
            let mut request = if coarse {
                FocusRequest::coarse()
            } else {
                FocusRequest::fine()
            };
            if let Some(timeout) = timeout {
                request =
                    request.timeout(Duration::try_from_secs_f64(timeout).context("Invalid timeout")?);
            }

            camera.autofocus(request.blocking(!no_wait)).await?;
            println!("{}", if no_wait { "Autofocus started" } else { "Autofocus complete" });
        }

        Command::Cooling {
            target,
            enable,
            disable,
        } => {
            if let Some(target) = target {
                camera.set_target_temperature(target).await?;
            }
            if enable || disable {
                camera.set_cooling_enabled(enable).await?;
            }
            println!("cooling enabled: {}", camera.cooling_enabled().await?);
            println!("target: {:.1} C", camera.target_temperature().await?);
            println!("temperature: {:.1} C", camera.temperature().await?);
            println!("power: {:.1}", camera.cooling_power().await?);
        }
    }
    Ok(())
}

async fn print_status(camera: &RemoteCamera) -> Result<()> {
    println!("{}", camera);
    println!("temperature: {:.1} C", camera.temperature().await?);
    println!("target: {:.1} C", camera.target_temperature().await?);
    println!("tolerance: {:.1} C", camera.temperature_tolerance().await?);
    println!("temperature stable: {}", camera.is_temperature_stable().await?);
    println!("cooling enabled: {}", camera.cooling_enabled().await?);
    println!("cooling power: {:.1}", camera.cooling_power().await?);
    println!("egain: {:.3}", camera.egain().await?);
    println!("bit depth: {}", camera.bit_depth().await?);
    println!("exposing: {}", camera.is_exposing().await?);
    println!("reading out: {}", camera.is_reading_out().await?);
    println!("ready: {}", camera.is_ready().await?);

    if let Some(focuser) = camera.focuser() {
        println!(
            "focuser: {} ({}..{})",
            focuser.position().await?,
            focuser.min_position().await?,
            focuser.max_position().await?
        );
    }
    if let Some(wheel) = camera.filterwheel() {
        println!(
            "filter: {} ({})",
            wheel.position().await?,
            wheel.current_filter().await?.unwrap_or_default()
        );
    }
    Ok(())
}
