use std::path::{Path, PathBuf};

use crate::ops::resample::{RotationMode, ScaleFilter};
use crate::selection::MarqueeShape;

/// Tunables for the selection / transform engine.
#[derive(Clone, Debug, PartialEq)]
pub struct SelectionSettings {
    /// Grab radius of the 8 scale handles, in screen pixels.
    pub handle_radius: f32,
    /// Outer radius of the rotation ring around each handle, in screen pixels.
    pub rotate_ring: f32,
    /// Guide snapping distance, in document pixels.
    pub snap_threshold: i32,
    pub rotate_step: f32,
    /// Step used while the snap modifier (Shift) is held.
    pub rotate_snap_step: f32,
    pub scale_filter: ScaleFilter,
    pub rotation_mode: RotationMode,
    pub scale_link: bool,
    pub marquee_shape: MarqueeShape,
    pub max_undo_steps: usize,
    pub max_history_mb: usize,
}

impl Default for SelectionSettings {
    fn default() -> Self {
        Self {
            handle_radius: 6.0,
            rotate_ring: 20.0,
            snap_threshold: 4,
            rotate_step: 1.0,
            rotate_snap_step: 15.0,
            scale_filter: ScaleFilter::Nearest,
            rotation_mode: RotationMode::Nearest,
            scale_link: false,
            marquee_shape: MarqueeShape::Rectangle,
            max_undo_steps: 50,
            max_history_mb: 100,
        }
    }
}

impl SelectionSettings {
    /// Default location of the settings file.
    /// On Linux:   ~/.config/pixelfe/selection.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\PixelFE\selection.cfg
    /// On macOS:   ~/Library/Application Support/PixelFE/selection.cfg
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA").ok()?;
            return Some(PathBuf::from(appdata).join("PixelFE").join("selection.cfg"));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").ok()?;
            return Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("PixelFE")
                    .join("selection.cfg"),
            );
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME").map(PathBuf::from).or_else(|_| {
                std::env::var("HOME").map(|home| PathBuf::from(home).join(".config"))
            });
            config_dir.ok().map(|d| d.join("pixelfe").join("selection.cfg"))
        }
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "handle_radius={}\n\
             rotate_ring={}\n\
             snap_threshold={}\n\
             rotate_step={}\n\
             rotate_snap_step={}\n\
             scale_filter={}\n\
             rotation_mode={}\n\
             scale_link={}\n\
             marquee_shape={}\n\
             max_undo_steps={}\n\
             max_history_mb={}\n",
            self.handle_radius,
            self.rotate_ring,
            self.snap_threshold,
            self.rotate_step,
            self.rotate_snap_step,
            self.scale_filter.name(),
            self.rotation_mode.name(),
            self.scale_link,
            self.marquee_shape.name(),
            self.max_undo_steps,
            self.max_history_mb,
        )
    }

    /// Parse `key=value` lines. Unknown keys are ignored and unparsable
    /// values keep their defaults.
    pub fn parse(content: &str) -> Self {
        let d = Self::default();
        let mut s = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "handle_radius" => {
                    s.handle_radius = val.parse().ok().filter(|v: &f32| *v > 0.0).unwrap_or(d.handle_radius);
                }
                "rotate_ring" => {
                    s.rotate_ring = val.parse().ok().filter(|v: &f32| *v > 0.0).unwrap_or(d.rotate_ring);
                }
                "snap_threshold" => {
                    s.snap_threshold = val.parse().ok().filter(|v: &i32| *v >= 0).unwrap_or(d.snap_threshold);
                }
                "rotate_step" => {
                    s.rotate_step = val.parse().ok().filter(|v: &f32| *v > 0.0).unwrap_or(d.rotate_step);
                }
                "rotate_snap_step" => {
                    s.rotate_snap_step = val.parse().ok().filter(|v: &f32| *v > 0.0).unwrap_or(d.rotate_snap_step);
                }
                "scale_filter" => {
                    s.scale_filter = ScaleFilter::from_name(val);
                }
                "rotation_mode" => {
                    s.rotation_mode = RotationMode::from_name(val);
                }
                "scale_link" => {
                    s.scale_link = val == "true";
                }
                "marquee_shape" => {
                    s.marquee_shape = MarqueeShape::from_name(val);
                }
                "max_undo_steps" => {
                    s.max_undo_steps = val.parse().unwrap_or(d.max_undo_steps);
                }
                "max_history_mb" => {
                    s.max_history_mb = val.parse().unwrap_or(d.max_history_mb);
                }
                _ => {}
            }
        }
        s
    }

    /// Load settings from `path` (returns default if the file is missing or corrupt).
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(_) => Self::default(),
        }
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_config_string())
    }

    /// Memory cap for the undo stack, in bytes.
    pub fn max_history_bytes(&self) -> usize {
        self.max_history_mb.saturating_mul(1024 * 1024)
    }
}
