//! Socialshot
//!
//! Turns a short prompt into a finished social-media post: an LLM writes an
//! HTML/CSS fragment, the fragment is spliced into a platform template, and
//! the page is rendered to PNG, JPEG, GIF or MP4 with headless Chrome.
//!
//! # Features
//!
//! - **CDP Backend** (default): primary renderer, drives Chrome over the DevTools Protocol
//! - **WebDriver Backend** (default): fallback renderer, drives `chromedriver` with on-disk HTML
//! - **Fallback chain**: backends are tried in order; the first success wins
//!
//! # Example
//!
//! ```no_run
//! use socialshot::{templates, OutputKind, Platform, RenderConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = socialshot::new_engine(RenderConfig::default());
//! let document = templates::template(Platform::Linkedin)
//!     .render("<h1 class=\"text-white text-6xl\">Hello</h1>");
//! let result = engine.render(&document, OutputKind::Png, Some(Platform::Linkedin))?;
//! std::fs::write(&result.filename, &result.bytes)?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub mod error;
pub use error::{BackendFailure, Error, Result};

pub mod cache;
pub mod generator;
pub mod render;
pub mod templates;
pub mod viewport;

#[cfg(feature = "cdp")]
pub mod cdp;

#[cfg(feature = "webdriver")]
pub mod webdriver;

// Async-friendly render service (worker-thread pool over the blocking engine)
pub mod async_api;

// HTTP surface
pub mod server;

pub use async_api::RenderService;
pub use render::RenderEngine;

/// Target social network profile
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Instagram,
    Linkedin,
    Twitter,
}

impl Platform {
    pub fn all() -> [Platform; 3] {
        [Platform::Instagram, Platform::Linkedin, Platform::Twitter]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Instagram => "instagram",
            Platform::Linkedin => "linkedin",
            Platform::Twitter => "twitter",
        }
    }

    /// Canvas size of the platform's template
    pub fn viewport(&self) -> Viewport {
        match self {
            Platform::Instagram => Viewport { width: 1080, height: 1080 },
            Platform::Linkedin => Viewport { width: 1200, height: 630 },
            Platform::Twitter => Viewport { width: 1200, height: 675 },
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "instagram" => Ok(Platform::Instagram),
            "linkedin" => Ok(Platform::Linkedin),
            "twitter" => Ok(Platform::Twitter),
            _ => Err(Error::InvalidPlatform(s.to_string())),
        }
    }
}

/// Viewport dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1080,
        }
    }
}

/// Output formats accepted by `download`
pub const ALLOWED_FORMATS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "mp4"];

/// Kind of artifact requested from the render engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Png,
    Jpeg,
    Gif,
    Mp4,
}

impl OutputKind {
    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputKind::Png => "image/png",
            OutputKind::Jpeg => "image/jpeg",
            OutputKind::Gif => "image/gif",
            OutputKind::Mp4 => "video/mp4",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputKind::Png => "png",
            OutputKind::Jpeg => "jpg",
            OutputKind::Gif => "gif",
            OutputKind::Mp4 => "mp4",
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, OutputKind::Mp4)
    }
}

impl FromStr for OutputKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(OutputKind::Png),
            "jpg" | "jpeg" => Ok(OutputKind::Jpeg),
            "gif" => Ok(OutputKind::Gif),
            "mp4" => Ok(OutputKind::Mp4),
            _ => Err(Error::InvalidFormat(s.to_string())),
        }
    }
}

/// A complete, self-contained HTML document (template + spliced content).
///
/// Cloning is cheap and never copies the markup; the content cannot be
/// mutated once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedDocument(Arc<str>);

impl GeneratedDocument {
    pub fn new(html: impl Into<String>) -> Self {
        Self(Arc::from(html.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<String> for GeneratedDocument {
    fn from(html: String) -> Self {
        Self::new(html)
    }
}

impl From<&str> for GeneratedDocument {
    fn from(html: &str) -> Self {
        Self::new(html)
    }
}

impl AsRef<str> for GeneratedDocument {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Rendered artifact ready to hand to a client
#[derive(Debug, Clone)]
pub struct RenderResult {
    /// Encoded file contents
    pub bytes: Vec<u8>,
    /// MIME type describing `bytes`
    pub mime_type: &'static str,
    /// Suggested download name (`post_<timestamp>_<suffix>.<ext>`)
    pub filename: String,
    /// Set when a video was requested but a still image was produced instead.
    /// `mime_type` and `filename` then describe the PNG actually returned.
    pub degraded: bool,
}

impl RenderResult {
    pub fn new(bytes: Vec<u8>, kind: OutputKind) -> Self {
        Self {
            bytes,
            mime_type: kind.mime_type(),
            filename: suggested_filename(kind.extension()),
            degraded: false,
        }
    }
}

/// Build a unique download name: local timestamp plus a random 8-hex suffix.
pub fn suggested_filename(extension: &str) -> String {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("post_{}_{}.{}", stamp, &suffix[..8], extension)
}

/// Configuration shared by the render engine and its backends
///
/// Defaults: a 2s settle for the primary
/// backend, 3s for the fallback, and ten GIF frames 300ms apart.
///
/// # Examples
///
/// ```
/// let cfg = socialshot::RenderConfig::default();
/// assert_eq!(cfg.gif_frames, 10);
/// assert_eq!(cfg.jpeg_quality, 95);
/// ```
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Fixed wait after loading the document in the primary backend
    pub primary_settle_ms: u64,
    /// Fixed wait after loading the document in the fallback backend
    pub fallback_settle_ms: u64,
    /// Number of frames captured for an animated GIF
    pub gif_frames: usize,
    /// Delay between GIF frames, also used as each frame's display duration
    pub gif_interval_ms: u64,
    /// JPEG encoder quality (1-100)
    pub jpeg_quality: u8,
    /// Frames per second sampled while recording video
    pub video_fps: u32,
    /// Video duration used when the caller does not pass one
    pub default_video_secs: u64,
    /// Longest video a caller may ask for
    pub max_video_secs: u64,
    /// Timeout for starting `chromedriver` and for each WebDriver command
    pub launch_timeout_ms: u64,
    /// Chrome executable override (primary backend)
    pub chrome_path: Option<PathBuf>,
    /// `chromedriver` executable override (fallback backend)
    pub chromedriver_path: Option<PathBuf>,
    /// Use an already running WebDriver server instead of spawning `chromedriver`
    pub webdriver_url: Option<String>,
    /// `ffmpeg` executable used to mux captured video frames
    pub ffmpeg_path: PathBuf,
    /// Infer the viewport from pixel markers in the markup when no platform is given
    pub detect_viewport: bool,
    /// Directory for temporary pages and video frames (system temp dir if unset)
    pub temp_dir: Option<PathBuf>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            primary_settle_ms: 2000,
            fallback_settle_ms: 3000,
            gif_frames: 10,
            gif_interval_ms: 300,
            jpeg_quality: 95,
            video_fps: 10,
            default_video_secs: 5,
            max_video_secs: 60,
            launch_timeout_ms: 30000,
            chrome_path: None,
            chromedriver_path: None,
            webdriver_url: None,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            detect_viewport: true,
            temp_dir: None,
        }
    }
}

impl RenderConfig {
    pub fn gif_interval(&self) -> Duration {
        Duration::from_millis(self.gif_interval_ms)
    }

    /// Requested video length, or the default when absent. Zero and anything
    /// above `max_video_secs` are caller errors.
    pub fn video_duration(&self, requested_secs: Option<u64>) -> Result<Duration> {
        let secs = requested_secs.unwrap_or(self.default_video_secs);
        if secs == 0 || secs > self.max_video_secs {
            return Err(Error::InvalidDuration(format!(
                "{}s. Use 1 to {} seconds",
                secs, self.max_video_secs
            )));
        }
        Ok(Duration::from_secs(secs))
    }

    pub(crate) fn scratch_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// How many frames to grab from a loaded page, and how far apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapturePlan {
    pub frames: usize,
    pub interval: Duration,
}

impl CapturePlan {
    /// A single frame
    pub fn still() -> Self {
        Self {
            frames: 1,
            interval: Duration::ZERO,
        }
    }

    /// The configured GIF frame sequence
    pub fn animation(config: &RenderConfig) -> Self {
        Self {
            frames: config.gif_frames.max(1),
            interval: config.gif_interval(),
        }
    }
}

/// A rendering strategy in the engine's fallback chain
///
/// Implementations launch their own browser per call and tear it down before
/// returning; nothing is shared between calls. All frames are returned as
/// PNG bytes; format conversion happens in the engine.
pub trait RenderBackend: Send + Sync {
    /// Short identifier used in logs and failure contexts
    fn name(&self) -> &'static str;

    /// Whether the backend's browser/driver can be found in this environment
    fn is_available(&self) -> bool {
        true
    }

    /// Load `document` at `viewport`, wait for it to settle, then capture
    /// `plan.frames` PNG frames from the same page, `plan.interval` apart.
    fn capture(&self, document: &str, viewport: Viewport, plan: &CapturePlan) -> Result<Vec<Vec<u8>>>;

    /// Record the page for `duration` and return MP4 bytes.
    fn record_video(&self, _document: &str, _viewport: Viewport, _duration: Duration) -> Result<Vec<u8>> {
        Err(Error::Unsupported(format!(
            "{} backend cannot record video",
            self.name()
        )))
    }
}

/// Build the default ordered backend list for the enabled features:
/// CDP first, WebDriver second.
pub fn default_backends(config: &RenderConfig) -> Vec<Box<dyn RenderBackend>> {
    #[allow(unused_mut)]
    let mut backends: Vec<Box<dyn RenderBackend>> = Vec::new();

    #[cfg(feature = "cdp")]
    backends.push(Box::new(cdp::CdpBackend::new(config.clone())));

    #[cfg(feature = "webdriver")]
    backends.push(Box::new(webdriver::WebDriverBackend::new(config.clone())));

    if backends.is_empty() {
        log::warn!("No rendering backends enabled; every render will fail");
    }
    backends
}

/// Create a render engine over the default backend chain
pub fn new_engine(config: RenderConfig) -> RenderEngine {
    let backends = default_backends(&config);
    RenderEngine::new(backends, config)
}
