//! Window, trackbar and key-poll primitives used by the preview loop

use std::collections::{BTreeMap, VecDeque};

use crate::error::{CameraError, Result};
use crate::frame::BgrImage;

/// `wait_key` result when no key was pressed within the delay.
pub const NO_KEY: i32 = -1;
pub const KEY_ESC: i32 = 27;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowMode {
    /// Window follows the image size.
    AutoSize,
    /// User-resizable window that keeps the image aspect ratio.
    KeepRatio,
}

/// Window toolkit seam: the highgui primitives the preview loop needs.
pub trait Display {
    fn named_window(&mut self, name: &str, mode: WindowMode) -> Result<()>;
    fn show(&mut self, window: &str, image: &BgrImage) -> Result<()>;
    fn create_trackbar(&mut self, name: &str, window: &str, value: i32, max: i32) -> Result<()>;
    /// Move an existing trackbar and update its range.
    fn set_trackbar(&mut self, name: &str, window: &str, value: i32, max: i32) -> Result<()>;
    fn trackbar_pos(&self, name: &str, window: &str) -> Result<i32>;
    /// Pump window events for up to `delay_ms` and return the pressed key or [`NO_KEY`].
    fn wait_key(&mut self, delay_ms: i32) -> Result<i32>;
    fn destroy_all_windows(&mut self) -> Result<()>;
}

/// One scripted user action, consumed by `wait_key`.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptStep {
    Key(i32),
    /// Drag a trackbar, then report no key.
    MoveTrackbar { name: String, value: i32 },
}

impl ScriptStep {
    pub fn idle() -> Self {
        ScriptStep::Key(NO_KEY)
    }

    pub fn move_trackbar(name: impl Into<String>, value: i32) -> Self {
        ScriptStep::MoveTrackbar { name: name.into(), value }
    }
}

/// Trackbar positions run from 0 to `max`.
fn clamp_position(value: i32, max: i32) -> i32 {
    value.min(max).max(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackbarState {
    pub value: i32,
    pub max: i32,
}

/// Headless display that replays a script of key presses and trackbar moves.
///
/// When the script runs out, `wait_key` returns `exit_key` so a preview loop always terminates.
#[derive(Debug, Default)]
pub struct ScriptedDisplay {
    script: VecDeque<ScriptStep>,
    exit_key: i32,
    windows: BTreeMap<String, WindowMode>,
    trackbars: BTreeMap<(String, String), TrackbarState>,
    opened: Vec<(String, WindowMode)>,
    created_trackbars: Vec<String>,
    shown: Vec<(u32, u32)>,
    destroyed: bool,
}

impl ScriptedDisplay {
    pub fn new(script: impl IntoIterator<Item = ScriptStep>) -> Self {
        ScriptedDisplay {
            script: script.into_iter().collect(),
            exit_key: KEY_ESC,
            ..Default::default()
        }
    }

    pub fn with_exit_key(mut self, key: i32) -> Self {
        self.exit_key = key;
        self
    }

    /// Sizes of every frame passed to `show`, in order.
    pub fn shown_sizes(&self) -> &[(u32, u32)] {
        &self.shown
    }

    /// Every `named_window` call, in order; survives `destroy_all_windows`.
    pub fn opened_windows(&self) -> &[(String, WindowMode)] {
        &self.opened
    }

    /// Names of every trackbar created, in order; survives `destroy_all_windows`.
    pub fn created_trackbars(&self) -> &[String] {
        &self.created_trackbars
    }

    /// Live trackbar state, until the windows are destroyed.
    pub fn trackbar(&self, name: &str, window: &str) -> Option<TrackbarState> {
        self.trackbars.get(&(window.to_string(), name.to_string())).copied()
    }

    pub fn was_destroyed(&self) -> bool {
        self.destroyed
    }

    fn window_must_exist(&self, window: &str) -> Result<()> {
        if self.windows.contains_key(window) {
            Ok(())
        } else {
            Err(CameraError::Display(format!("no window named {window}")))
        }
    }
}

impl Display for ScriptedDisplay {
    fn named_window(&mut self, name: &str, mode: WindowMode) -> Result<()> {
        self.windows.entry(name.to_string()).or_insert(mode);
        self.opened.push((name.to_string(), mode));
        self.destroyed = false;
        Ok(())
    }

    fn show(&mut self, window: &str, image: &BgrImage) -> Result<()> {
        // Like highgui, showing into an unknown window creates it.
        self.windows.entry(window.to_string()).or_insert(WindowMode::AutoSize);
        self.shown.push((image.width(), image.height()));
        Ok(())
    }

    fn create_trackbar(&mut self, name: &str, window: &str, value: i32, max: i32) -> Result<()> {
        self.window_must_exist(window)?;
        let state = TrackbarState { value: clamp_position(value, max), max };
        self.trackbars.insert((window.to_string(), name.to_string()), state);
        self.created_trackbars.push(name.to_string());
        Ok(())
    }

    fn set_trackbar(&mut self, name: &str, window: &str, value: i32, max: i32) -> Result<()> {
        let bar = self
            .trackbars
            .get_mut(&(window.to_string(), name.to_string()))
            .ok_or_else(|| CameraError::Display(format!("no trackbar {name} in {window}")))?;
        bar.max = max;
        bar.value = clamp_position(value, max);
        Ok(())
    }

    fn trackbar_pos(&self, name: &str, window: &str) -> Result<i32> {
        self.trackbar(name, window)
            .map(|bar| bar.value)
            .ok_or_else(|| CameraError::Display(format!("no trackbar {name} in {window}")))
    }

    fn wait_key(&mut self, _delay_ms: i32) -> Result<i32> {
        match self.script.pop_front() {
            None => Ok(self.exit_key),
            Some(ScriptStep::Key(key)) => Ok(key),
            Some(ScriptStep::MoveTrackbar { name, value }) => {
                let bar = self
                    .trackbars
                    .iter_mut()
                    .find(|((_, bar_name), _)| *bar_name == name)
                    .map(|(_, bar)| bar)
                    .ok_or_else(|| {
                        CameraError::Display(format!("script moves unknown trackbar {name}"))
                    })?;
                bar.value = clamp_position(value, bar.max);
                Ok(NO_KEY)
            }
        }
    }

    fn destroy_all_windows(&mut self) -> Result<()> {
        self.windows.clear();
        self.trackbars.clear();
        self.destroyed = true;
        Ok(())
    }
}

#[cfg(feature = "highgui")]
pub use self::highgui::HighGui;

#[cfg(feature = "highgui")]
mod highgui {
    use opencv::core::Mat;
    use opencv::highgui as cv;
    use opencv::prelude::*;

    use super::{Display, WindowMode, clamp_position};
    use crate::error::Result;
    use crate::frame::BgrImage;

    /// OpenCV highgui windows.
    #[derive(Debug, Default)]
    pub struct HighGui;

    impl HighGui {
        pub fn new() -> Self {
            HighGui
        }
    }

    fn to_mat(image: &BgrImage) -> Result<Mat> {
        let flat = Mat::from_slice(image.as_raw())?;
        let bgr = flat.reshape(3, image.height() as i32)?;
        Ok(bgr.try_clone()?)
    }

    impl Display for HighGui {
        fn named_window(&mut self, name: &str, mode: WindowMode) -> Result<()> {
            let flags = match mode {
                WindowMode::AutoSize => cv::WINDOW_AUTOSIZE,
                WindowMode::KeepRatio => cv::WINDOW_KEEPRATIO | cv::WINDOW_NORMAL,
            };
            cv::named_window(name, flags)?;
            Ok(())
        }

        fn show(&mut self, window: &str, image: &BgrImage) -> Result<()> {
            let mat = to_mat(image)?;
            cv::imshow(window, &mat)?;
            Ok(())
        }

        fn create_trackbar(
            &mut self,
            name: &str,
            window: &str,
            value: i32,
            max: i32,
        ) -> Result<()> {
            cv::create_trackbar(name, window, None, max, None)?;
            cv::set_trackbar_pos(name, window, clamp_position(value, max))?;
            Ok(())
        }

        fn set_trackbar(&mut self, name: &str, window: &str, value: i32, max: i32) -> Result<()> {
            cv::set_trackbar_max(name, window, max)?;
            cv::set_trackbar_pos(name, window, clamp_position(value, max))?;
            Ok(())
        }

        fn trackbar_pos(&self, name: &str, window: &str) -> Result<i32> {
            Ok(cv::get_trackbar_pos(name, window)?)
        }

        fn wait_key(&mut self, delay_ms: i32) -> Result<i32> {
            Ok(cv::wait_key(delay_ms)?)
        }

        fn destroy_all_windows(&mut self) -> Result<()> {
            cv::destroy_all_windows()?;
            Ok(())
        }
    }
}
