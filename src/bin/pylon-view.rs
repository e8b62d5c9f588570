//! Command-line front end: list cameras, show settings, grab a frame or run the preview.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::info;

use pylon_camera::sim::SimTransport;
use pylon_camera::{Camera, CameraConfig, Exposure, Gain, PreviewOptions, TransportLayer};

#[derive(Parser, Debug)]
#[command(name = "pylon-view")]
#[command(
    version,
    about = "Configure, grab from and preview a Basler pylon camera",
    long_about = None
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Use the simulated camera instead of the pylon SDK
    #[arg(long, global = true)]
    sim: bool,

    /// Camera index in enumeration order
    #[arg(long, default_value = "0", global = true)]
    index: usize,

    /// Exposure time in microseconds (0 = auto exposure)
    #[arg(long, default_value = "30000", global = true)]
    exposure_us: f64,

    /// Gain in dB, or raw units on cameras without a `Gain` node (0 = auto gain)
    #[arg(long, default_value = "0", global = true)]
    gain_db: f64,

    /// Grab timeout in milliseconds
    #[arg(long, default_value = "1000", global = true)]
    timeout_ms: u64,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List attached cameras
    List,
    /// Show the camera settings after configuration
    Info,
    /// Grab a single frame
    Grab {
        /// Write the frame as PNG
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Live preview; ESC closes the window
    View {
        /// Plain window without trackbars
        #[arg(long)]
        simple: bool,
        /// Key-poll delay in milliseconds
        #[arg(long, default_value = "1")]
        delay_ms: i32,
    },
}

impl Args {
    fn camera_config(&self) -> CameraConfig {
        CameraConfig::default()
            .with_index(self.index)
            .with_exposure(Exposure::from_micros(self.exposure_us))
            .with_gain(Gain::from_db(self.gain_db))
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn transport(args: &Args) -> anyhow::Result<Box<dyn TransportLayer>> {
    if args.sim {
        return Ok(Box::new(SimTransport::single()));
    }
    #[cfg(feature = "pylon")]
    {
        Ok(Box::new(pylon_camera::PylonTransport::new()))
    }
    #[cfg(not(feature = "pylon"))]
    {
        anyhow::bail!("built without the `pylon` feature; pass --sim to use the simulated camera")
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let transport = transport(&args)?;

    match &args.command {
        Command::List => {
            let devices = transport.enumerate_devices()?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&devices)?);
            } else if devices.is_empty() {
                println!("no camera present");
            } else {
                for device in &devices {
                    println!("{device}");
                }
            }
        }
        Command::Info => {
            let mut camera = Camera::new(transport.as_ref(), &args.camera_config())?;
            camera.open()?;
            let settings = camera.settings()?;
            camera.close()?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&settings)?);
            } else {
                println!("Name = {}", settings.name);
                println!("Width = {}", settings.width);
                println!("Height = {}", settings.height);
                println!("PixelFormat = {}", settings.pixel_format);
                println!("ExposureAuto = {}", settings.exposure_auto);
                println!("ExposureTime = {}[us]", settings.exposure_us);
                println!("GainAuto = {}", settings.gain_auto);
                println!("Gain = {}[{}]", settings.gain, settings.gain_node.unit());
            }
        }
        Command::Grab { output } => {
            let mut camera = Camera::new(transport.as_ref(), &args.camera_config())?;
            camera.open()?;
            let image = camera.grab(args.timeout())?;
            camera.close()?;
            println!("{}x{} {}", image.width(), image.height(), image.pixel_format());
            if let Some(path) = output {
                image
                    .to_rgb_image()
                    .save(path)
                    .with_context(|| format!("writing {}", path.display()))?;
                info!("wrote {}", path.display());
            }
        }
        Command::View { simple, delay_ms } => {
            let mut camera = Camera::new(transport.as_ref(), &args.camera_config())?;
            let mut options =
                if *simple { PreviewOptions::simple() } else { PreviewOptions::default() };
            options.delay_ms = *delay_ms;
            options.grab_timeout = args.timeout();
            camera.open()?;
            view(&mut camera, &options)?;
            camera.close()?;
        }
    }
    Ok(())
}

#[cfg(feature = "highgui")]
fn view(camera: &mut Camera<'_>, options: &PreviewOptions) -> anyhow::Result<()> {
    let mut display = pylon_camera::HighGui::new();
    let summary = pylon_camera::run_preview(camera, &mut display, options)?;
    info!("{} frame(s) shown", summary.frames);
    Ok(())
}

#[cfg(not(feature = "highgui"))]
fn view(_camera: &mut Camera<'_>, _options: &PreviewOptions) -> anyhow::Result<()> {
    anyhow::bail!("built without the `highgui` feature; no display backend available")
}
