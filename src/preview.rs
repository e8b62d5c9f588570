//! Blocking live preview with exposure, gain and magnification trackbars

use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::camera::{Camera, DEFAULT_GRAB_TIMEOUT, MAX_DISPLAY_MAGNIFICATION};
use crate::common::GainNode;
use crate::display::{Display, KEY_ESC, WindowMode};
use crate::error::{CameraError, Result};

pub const TRACKBAR_EXPOSURE: &str = "Exp[ms]";
pub const TRACKBAR_GAIN: &str = "Gain[dB]";
/// Gain trackbar on cameras that only expose the raw gain register.
pub const TRACKBAR_GAIN_RAW: &str = "Gain[raw]";
pub const TRACKBAR_MAGNIFICATION: &str = "Mag[%]";

/// Gain trackbar label matching the unit of the camera's gain register.
pub fn gain_trackbar(node: GainNode) -> &'static str {
    match node {
        GainNode::Db => TRACKBAR_GAIN,
        GainNode::Raw => TRACKBAR_GAIN_RAW,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PreviewMode {
    /// Full-size frames in a keep-ratio window, no trackbars.
    Simple,
    /// Frames scaled by the display magnification, with exposure/gain/magnification trackbars.
    #[default]
    Interactive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewOptions {
    /// Key-poll delay per iteration
    pub delay_ms: i32,
    pub grab_timeout: Duration,
    /// Key code that ends the loop
    pub exit_key: i32,
    pub window: String,
    pub mode: PreviewMode,
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self {
            delay_ms: 1,
            grab_timeout: DEFAULT_GRAB_TIMEOUT,
            exit_key: KEY_ESC,
            window: "img".to_string(),
            mode: PreviewMode::Interactive,
        }
    }
}

impl PreviewOptions {
    /// Full-size frames in a keep-ratio window, without trackbars.
    pub fn simple() -> Self {
        Self { mode: PreviewMode::Simple, ..Default::default() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PreviewSummary {
    pub frames: u64,
    /// Size of the last frame handed to the display
    pub last_size: Option<(u32, u32)>,
}

/// Trackbar positions the loop last wrote, used to tell user moves apart from refreshes.
#[derive(Debug, Clone, Copy)]
struct Trackbars {
    exposure_ms: i32,
    gain: i32,
    magnification: i32,
}

/// Run the preview until the exit key is pressed. Blocks the calling thread.
///
/// Windows are destroyed on every exit path.
pub fn run_preview<D: Display + ?Sized>(
    camera: &mut Camera<'_>,
    display: &mut D,
    options: &PreviewOptions,
) -> Result<PreviewSummary> {
    if !camera.is_open()? {
        return Err(CameraError::NotOpen);
    }
    let result = preview_loop(camera, display, options);
    let destroyed = display.destroy_all_windows();
    let summary = result?;
    destroyed?;
    info!("preview closed after {} frame(s)", summary.frames);
    Ok(summary)
}

fn preview_loop<D: Display + ?Sized>(
    camera: &mut Camera<'_>,
    display: &mut D,
    options: &PreviewOptions,
) -> Result<PreviewSummary> {
    let window = options.window.as_str();
    let mut summary = PreviewSummary::default();
    let mut bars: Option<Trackbars> = None;

    match options.mode {
        PreviewMode::Simple => display.named_window(window, WindowMode::KeepRatio)?,
        PreviewMode::Interactive => display.named_window(window, WindowMode::AutoSize)?,
    }

    loop {
        let frame = camera.grab(options.grab_timeout)?;
        let frame = match options.mode {
            PreviewMode::Simple => frame,
            PreviewMode::Interactive => {
                let (w, h) = camera.display_size()?;
                frame.resized(w, h)
            }
        };
        display.show(window, &frame)?;
        summary.frames += 1;
        summary.last_size = Some((frame.width(), frame.height()));

        if options.mode == PreviewMode::Interactive {
            bars = Some(refresh_trackbars(camera, display, window, bars)?);
        }

        let key = display.wait_key(options.delay_ms)?;
        if key == options.exit_key {
            return Ok(summary);
        }

        if let Some(written) = bars {
            apply_trackbar_moves(camera, display, window, written)?;
        }
    }
}

/// Push the current camera state into the trackbars, creating them on the first pass.
fn refresh_trackbars<D: Display + ?Sized>(
    camera: &Camera<'_>,
    display: &mut D,
    window: &str,
    previous: Option<Trackbars>,
) -> Result<Trackbars> {
    let gain_bar = gain_trackbar(camera.gain_node());
    let current = Trackbars {
        exposure_ms: (camera.exposure_us()? / 1000.0) as i32,
        gain: camera.gain_db()? as i32,
        magnification: camera.display_magnification() as i32,
    };
    let exposure_max = (camera.exposure_upper_limit_us()? / 1000.0) as i32;
    let gain_max = camera.gain_upper_limit_db()? as i32;
    let magnification_max = MAX_DISPLAY_MAGNIFICATION as i32;

    let bars = [
        (TRACKBAR_EXPOSURE, current.exposure_ms, exposure_max),
        (gain_bar, current.gain, gain_max),
        (TRACKBAR_MAGNIFICATION, current.magnification, magnification_max),
    ];
    for (name, value, max) in bars {
        if previous.is_none() {
            display.create_trackbar(name, window, value, max)?;
        } else {
            display.set_trackbar(name, window, value, max)?;
        }
    }
    // Read back: the display clamps positions to the bar range.
    Ok(Trackbars {
        exposure_ms: display.trackbar_pos(TRACKBAR_EXPOSURE, window)?,
        gain: display.trackbar_pos(gain_bar, window)?,
        magnification: display.trackbar_pos(TRACKBAR_MAGNIFICATION, window)?,
    })
}

/// Apply trackbars the user moved since the last refresh. A bar at 0 selects auto mode.
fn apply_trackbar_moves<D: Display + ?Sized>(
    camera: &mut Camera<'_>,
    display: &D,
    window: &str,
    written: Trackbars,
) -> Result<()> {
    let exposure_ms = display.trackbar_pos(TRACKBAR_EXPOSURE, window)?;
    if exposure_ms != written.exposure_ms {
        debug!("trackbar {TRACKBAR_EXPOSURE} -> {exposure_ms}");
        camera.set_exposure_us(f64::from(exposure_ms) * 1000.0)?;
    }
    let gain_bar = gain_trackbar(camera.gain_node());
    let gain = display.trackbar_pos(gain_bar, window)?;
    if gain != written.gain {
        debug!("trackbar {gain_bar} -> {gain}");
        camera.set_gain_db(f64::from(gain))?;
    }
    let magnification = display.trackbar_pos(TRACKBAR_MAGNIFICATION, window)?;
    if magnification != written.magnification {
        debug!("trackbar {TRACKBAR_MAGNIFICATION} -> {magnification}");
        camera.set_display_magnification(magnification.max(0) as u32);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraConfig;
    use crate::common::{Exposure, Gain};
    use crate::display::{ScriptStep, ScriptedDisplay};
    use crate::sim::{SimCamera, SimTransport};

    #[test]
    fn closed_camera_is_rejected_before_any_window_opens() {
        let transport = SimTransport::single();
        let mut camera = Camera::new(&transport, &CameraConfig::default()).unwrap();
        let mut display = ScriptedDisplay::new([]);
        let err = run_preview(&mut camera, &mut display, &PreviewOptions::default()).unwrap_err();
        assert_eq!(err, CameraError::NotOpen);
        assert!(display.shown_sizes().is_empty());
        assert!(display.opened_windows().is_empty());
    }

    #[test]
    fn simple_mode_shows_full_frames_without_trackbars() {
        let transport = SimTransport::single();
        let mut camera = Camera::new(&transport, &CameraConfig::default()).unwrap();
        camera.open().unwrap();
        let mut display = ScriptedDisplay::new([ScriptStep::idle(), ScriptStep::idle()]);
        let summary = run_preview(&mut camera, &mut display, &PreviewOptions::simple()).unwrap();
        assert_eq!(summary.frames, 3);
        assert_eq!(display.shown_sizes(), &[(640, 480); 3]);
        assert_eq!(display.opened_windows(), &[("img".to_string(), WindowMode::KeepRatio)]);
        assert!(display.created_trackbars().is_empty());
        assert!(display.was_destroyed());
    }

    #[test]
    fn trackbars_drive_exposure_gain_and_magnification() {
        let transport = SimTransport::single();
        let config = CameraConfig::default()
            .with_exposure(Exposure::Manual(20_000.0))
            .with_gain(Gain::Manual(2.0));
        let mut camera = Camera::new(&transport, &config).unwrap();
        camera.open().unwrap();
        let mut display = ScriptedDisplay::new([
            ScriptStep::move_trackbar(TRACKBAR_EXPOSURE, 40),
            ScriptStep::move_trackbar(TRACKBAR_GAIN, 12),
            ScriptStep::move_trackbar(TRACKBAR_MAGNIFICATION, 100),
        ]);

        let summary = run_preview(&mut camera, &mut display, &PreviewOptions::default()).unwrap();

        assert_eq!(summary.frames, 4);
        assert_eq!(camera.exposure().unwrap(), Exposure::Manual(40_000.0));
        assert_eq!(camera.gain().unwrap(), Gain::Manual(12.0));
        assert_eq!(camera.display_magnification(), 100);
        assert_eq!(display.shown_sizes().first(), Some(&(320, 240)));
        assert_eq!(summary.last_size, Some((640, 480)));
        assert_eq!(display.opened_windows(), &[("img".to_string(), WindowMode::AutoSize)]);
        // Created once, refreshed afterwards.
        assert_eq!(
            display.created_trackbars(),
            &[TRACKBAR_EXPOSURE, TRACKBAR_GAIN, TRACKBAR_MAGNIFICATION]
        );
    }

    #[test]
    fn trackbar_at_zero_switches_to_auto() {
        let transport = SimTransport::single();
        let config = CameraConfig::default()
            .with_exposure(Exposure::Manual(20_000.0))
            .with_gain(Gain::Manual(2.0));
        let mut camera = Camera::new(&transport, &config).unwrap();
        camera.open().unwrap();
        let mut display = ScriptedDisplay::new([
            ScriptStep::move_trackbar(TRACKBAR_EXPOSURE, 0),
            ScriptStep::move_trackbar(TRACKBAR_GAIN, 0),
        ]);

        let summary = run_preview(&mut camera, &mut display, &PreviewOptions::default()).unwrap();

        assert_eq!(summary.frames, 3);
        assert_eq!(camera.exposure().unwrap(), Exposure::Auto);
        assert_eq!(camera.gain().unwrap(), Gain::Auto);
    }

    #[test]
    fn raw_gain_cameras_get_a_raw_gain_trackbar() {
        let transport = SimTransport::new(vec![SimCamera::new("acA640-90gm", "20123456").legacy()]);
        let config = CameraConfig::default().with_gain(Gain::Manual(100.0));
        let mut camera = Camera::new(&transport, &config).unwrap();
        camera.open().unwrap();
        let mut display = ScriptedDisplay::new([ScriptStep::move_trackbar(TRACKBAR_GAIN_RAW, 300)]);

        run_preview(&mut camera, &mut display, &PreviewOptions::default()).unwrap();

        assert!(display.created_trackbars().iter().any(|name| name == TRACKBAR_GAIN_RAW));
        assert!(!display.created_trackbars().iter().any(|name| name == TRACKBAR_GAIN));
        assert_eq!(camera.gain().unwrap(), Gain::Manual(300.0));
    }
}
