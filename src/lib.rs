//! # asciivid - ASCII Video Converter Library
//!
//! `asciivid` converts videos into videos where every frame has been
//! re-rendered as monospaced ASCII/block-character art, optionally remuxed
//! with the original audio track.
//!
//! ## Features
//!
//! - Frame-by-frame conversion through an ffmpeg rawvideo pipe
//! - Configurable character palettes, contrast and font size
//! - Two-phase assembly: silent ASCII video, then audio mux with ordered
//!   tool fallback (degrading to a silent video, never failing the job)
//! - A pollable job registry with progress and timestamped logs, usable
//!   from CLI, GUI or HTTP front ends
//!
//! ## Example
//!
//! ```no_run
//! use asciivid::{pipeline, JobTracker, Settings};
//! use std::path::PathBuf;
//!
//! let tracker = JobTracker::new();
//! let job_id = JobTracker::new_job_id();
//! tracker.create(&job_id, "clip.mp4", PathBuf::from("uploads/clip.mp4"));
//!
//! let worker = pipeline::spawn(
//!     tracker.clone(),
//!     job_id.clone(),
//!     PathBuf::from("uploads/clip.mp4"),
//!     PathBuf::from("outputs"),
//!     Settings::default(),
//! );
//!
//! // Any number of pollers may watch the job while it runs.
//! while !tracker.snapshot(&job_id).map_or(true, |j| j.completed) {
//!     std::thread::sleep(std::time::Duration::from_millis(250));
//! }
//! worker.join().unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

pub mod error;
pub mod jobs;
pub mod mux;
pub mod palette;
pub mod pipeline;
pub mod raster;
pub mod video;

pub use error::{ConvertError, FailedAttempt};
pub use jobs::{Job, JobStatus, JobTracker};
pub use mux::MuxOutcome;
pub use palette::Palette;
pub use raster::CharacterGrid;
pub use video::VideoMeta;

/// Output quality tier: a (compression-quality, encode-speed) tradeoff.
/// Tiers are monotonically ordered, trading file size for speed/fidelity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    #[default]
    High,
    Medium,
    Low,
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Quality::High => "high",
            Quality::Medium => "medium",
            Quality::Low => "low",
        };
        f.write_str(name)
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "high" => Ok(Quality::High),
            "medium" => Ok(Quality::Medium),
            "low" => Ok(Quality::Low),
            other => Err(format!(
                "unknown quality '{}', expected high, medium or low",
                other
            )),
        }
    }
}

/// Immutable per-conversion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Target character columns.
    pub ascii_width: u32,
    /// Luminance multiplier, applied before palette mapping.
    pub contrast: f32,
    /// Glyph size in pixels when rasterizing the grid back to an image.
    pub font_size: u32,
    /// Name of a built-in palette.
    pub palette: String,
    /// Mux the original audio track into the final video.
    pub include_audio: bool,
    pub quality: Quality,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ascii_width: 80,
            contrast: 1.5,
            font_size: 10,
            palette: "detailed".to_string(),
            include_audio: false,
            quality: Quality::High,
        }
    }
}

impl Settings {
    /// Check the settings invariants: positive dimensions and a palette
    /// name that resolves to a non-empty character sequence.
    pub fn validate(&self) -> error::Result<()> {
        if self.ascii_width == 0 {
            return Err(ConvertError::InvalidDimension(
                "ascii_width must be positive".into(),
            ));
        }
        if self.font_size == 0 {
            return Err(ConvertError::InvalidDimension(
                "font_size must be positive".into(),
            ));
        }
        if !(self.contrast > 0.0) {
            return Err(ConvertError::InvalidDimension(
                "contrast must be positive".into(),
            ));
        }
        self.resolve_palette().map(|_| ())
    }

    pub fn resolve_palette(&self) -> error::Result<Palette> {
        Palette::by_name(&self.palette).ok_or_else(|| {
            ConvertError::InvalidDimension(format!(
                "unknown palette '{}', expected one of: {}",
                self.palette,
                Palette::builtin_names().join(", ")
            ))
        })
    }
}

fn default_width() -> u32 {
    Settings::default().ascii_width
}
fn default_contrast() -> f32 {
    Settings::default().contrast
}
fn default_font_size() -> u32 {
    Settings::default().font_size
}
fn default_palette() -> String {
    Settings::default().palette
}

/// Application configuration: default conversion settings, loadable from a
/// JSON file in the user's data directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_width")]
    pub ascii_width: u32,
    #[serde(default = "default_contrast")]
    pub contrast: f32,
    #[serde(default = "default_font_size")]
    pub font_size: u32,
    #[serde(default = "default_palette")]
    pub palette: String,
    #[serde(default)]
    pub quality: Quality,
}

impl Default for AppConfig {
    fn default() -> Self {
        let s = Settings::default();
        Self {
            ascii_width: s.ascii_width,
            contrast: s.contrast,
            font_size: s.font_size,
            palette: s.palette,
            quality: s.quality,
        }
    }
}

impl AppConfig {
    /// Look for asciivid.json in the user data dir, then the current
    /// directory, then fall back to built-in defaults.
    pub fn load() -> anyhow::Result<Self> {
        use anyhow::Context;

        let mut tried: Vec<PathBuf> = Vec::new();
        if let Some(mut d) = dirs::data_dir() {
            d.push("asciivid");
            d.push("asciivid.json");
            tried.push(d);
        }
        tried.push(PathBuf::from("asciivid.json"));

        for p in &tried {
            if p.exists() {
                let text = fs::read_to_string(p)
                    .with_context(|| format!("reading config {}", p.display()))?;
                let cfg: AppConfig =
                    serde_json::from_str(&text).context("parsing config json")?;
                return Ok(cfg);
            }
        }
        Ok(AppConfig::default())
    }

    /// Settings for one conversion, starting from the configured defaults.
    pub fn settings(&self, include_audio: bool) -> Settings {
        Settings {
            ascii_width: self.ascii_width,
            contrast: self.contrast,
            font_size: self.font_size,
            palette: self.palette.clone(),
            include_audio,
            quality: self.quality,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn bad_settings_are_rejected() {
        let mut s = Settings::default();
        s.ascii_width = 0;
        assert!(matches!(
            s.validate(),
            Err(ConvertError::InvalidDimension(_))
        ));

        let mut s = Settings::default();
        s.contrast = 0.0;
        assert!(s.validate().is_err());

        let mut s = Settings::default();
        s.palette = "nonexistent".to_string();
        assert!(s.validate().is_err());
    }

    #[test]
    fn quality_round_trips_through_strings() {
        for q in [Quality::High, Quality::Medium, Quality::Low] {
            assert_eq!(q.to_string().parse::<Quality>().unwrap(), q);
        }
        assert!("extreme".parse::<Quality>().is_err());
    }

    #[test]
    fn config_with_missing_fields_uses_defaults() {
        let cfg: AppConfig = serde_json::from_str(r#"{"ascii_width": 120}"#).unwrap();
        assert_eq!(cfg.ascii_width, 120);
        assert_eq!(cfg.contrast, Settings::default().contrast);
        assert_eq!(cfg.quality, Quality::High);
        let settings = cfg.settings(true);
        assert!(settings.include_audio);
        assert!(settings.validate().is_ok());
    }
}
