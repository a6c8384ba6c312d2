//! Render engine: an ordered chain of backends with viewport resolution,
//! per-format encoding and a still-image fallback for video.

pub mod encode;

use std::time::Duration;

use log::{debug, info, warn};

use crate::viewport::resolve_viewport;
use crate::{
    BackendFailure, CapturePlan, Error, GeneratedDocument, OutputKind, Platform, RenderBackend,
    RenderConfig, RenderResult, Result, Viewport,
};

/// Tries each backend in order and returns the first success.
///
/// A backend failure is logged and recorded, never returned directly; only
/// when the whole chain is exhausted does the caller see
/// `Error::AllBackendsFailed` carrying every recorded context.
pub struct RenderEngine {
    backends: Vec<Box<dyn RenderBackend>>,
    config: RenderConfig,
}

impl RenderEngine {
    pub fn new(backends: Vec<Box<dyn RenderBackend>>, config: RenderConfig) -> Self {
        Self { backends, config }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Backend names in chain order with their current availability
    pub fn availability(&self) -> Vec<(&'static str, bool)> {
        self.backends
            .iter()
            .map(|b| (b.name(), b.is_available()))
            .collect()
    }

    /// Validate `format` against the allow-list, then render.
    ///
    /// An unknown format is rejected before any backend is touched.
    pub fn render_format(
        &self,
        document: &GeneratedDocument,
        format: &str,
        duration_secs: Option<u64>,
        platform: Option<Platform>,
    ) -> Result<RenderResult> {
        let kind: OutputKind = format.parse()?;
        match kind {
            OutputKind::Mp4 => {
                let duration = self.config.video_duration(duration_secs)?;
                self.render_video(document, duration, platform)
            }
            _ => self.render(document, kind, platform),
        }
    }

    /// Render a still or animated image. `Mp4` is forwarded to
    /// `render_video` with the default duration.
    pub fn render(
        &self,
        document: &GeneratedDocument,
        kind: OutputKind,
        platform: Option<Platform>,
    ) -> Result<RenderResult> {
        if kind.is_video() {
            let duration = Duration::from_secs(self.config.default_video_secs);
            return self.render_video(document, duration, platform);
        }
        if document.is_empty() {
            return Err(Error::MissingInput("HTML content is required".into()));
        }

        let viewport = self.viewport_for(document, platform);
        let plan = match kind {
            OutputKind::Gif => CapturePlan::animation(&self.config),
            _ => CapturePlan::still(),
        };

        let frames = self.capture_with_fallback(document, viewport, &plan)?;
        let bytes = encode::encode_frames(kind, frames, &self.config)?;
        Ok(RenderResult::new(bytes, kind))
    }

    /// Record a video of the page.
    ///
    /// When no backend can record, the result is a single PNG with
    /// `degraded` set; its MIME type and filename are those of the PNG.
    pub fn render_video(
        &self,
        document: &GeneratedDocument,
        duration: Duration,
        platform: Option<Platform>,
    ) -> Result<RenderResult> {
        if document.is_empty() {
            return Err(Error::MissingInput("HTML content is required".into()));
        }
        let viewport = self.viewport_for(document, platform);
        let duration = duration.min(Duration::from_secs(self.config.max_video_secs));

        for backend in self.backends.iter().filter(|b| b.is_available()) {
            info!(
                "Recording {}s video at {}x{} with {}",
                duration.as_secs(),
                viewport.width,
                viewport.height,
                backend.name()
            );
            match backend.record_video(document.as_str(), viewport, duration) {
                Ok(bytes) if !bytes.is_empty() => return Ok(RenderResult::new(bytes, OutputKind::Mp4)),
                Ok(_) => warn!("{} returned an empty video", backend.name()),
                Err(e) => warn!("{} video capture failed: {}", backend.name(), e),
            }
        }

        warn!("Video capture unavailable; returning a still image instead");
        let mut still = self.render(document, OutputKind::Png, platform)?;
        still.degraded = true;
        Ok(still)
    }

    fn viewport_for(&self, document: &GeneratedDocument, platform: Option<Platform>) -> Viewport {
        resolve_viewport(platform, document.as_str(), self.config.detect_viewport)
    }

    fn capture_with_fallback(
        &self,
        document: &GeneratedDocument,
        viewport: Viewport,
        plan: &CapturePlan,
    ) -> Result<Vec<Vec<u8>>> {
        let mut failures = Vec::new();

        for backend in &self.backends {
            let name = backend.name();
            if !backend.is_available() {
                debug!("Skipping {}: not available in this environment", name);
                failures.push(BackendFailure {
                    backend: name,
                    message: "not available".into(),
                });
                continue;
            }

            info!(
                "Capturing {} frame(s) at {}x{} with {}",
                plan.frames, viewport.width, viewport.height, name
            );
            match backend.capture(document.as_str(), viewport, plan) {
                Ok(frames) if frames.len() == plan.frames => return Ok(frames),
                Ok(frames) => {
                    let message = format!("expected {} frame(s), got {}", plan.frames, frames.len());
                    warn!("{} failed: {}; trying next backend", name, message);
                    failures.push(BackendFailure { backend: name, message });
                }
                Err(e) => {
                    warn!("{} failed: {}; trying next backend", name, e);
                    failures.push(BackendFailure {
                        backend: name,
                        message: e.to_string(),
                    });
                }
            }
        }

        Err(Error::AllBackendsFailed(failures))
    }
}
