//! Chrome DevTools Protocol backend (primary renderer)

use std::ffi::OsStr;
use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use base64::Engine as Base64Engine;
use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::Page;
use headless_chrome::{Browser, LaunchOptions};
use log::{debug, info};

use crate::render::encode;
use crate::{CapturePlan, Error, RenderBackend, RenderConfig, Result, Viewport};

/// CDP-based backend (uses the `headless_chrome` crate)
///
/// Every call launches a fresh headless Chrome sized to the viewport, loads
/// the document inline as a `data:` URL and drops the browser (terminating
/// the child process) before returning.
pub struct CdpBackend {
    config: RenderConfig,
}

impl CdpBackend {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    fn launch(&self, viewport: Viewport) -> Result<Browser> {
        let launch_options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(false)
            .window_size(Some((viewport.width, viewport.height)))
            .path(self.config.chrome_path.clone())
            .args(vec![OsStr::new("--hide-scrollbars")])
            .build()
            .map_err(|e| Error::InitializationError(format!("Failed to build launch options: {}", e)))?;

        Browser::new(launch_options)
            .map_err(|e| Error::InitializationError(format!("Failed to launch browser: {}", e)))
    }

    /// Launch, load the document and wait the settle delay. The browser is
    /// returned alongside the tab so the caller controls its lifetime.
    fn open(&self, document: &str, viewport: Viewport) -> Result<(Browser, Arc<Tab>)> {
        let browser = self.launch(viewport)?;

        let tab = browser
            .new_tab()
            .map_err(|e| Error::InitializationError(format!("Failed to create tab: {}", e)))?;

        tab.navigate_to(&data_url(document))
            .map_err(|e| Error::LoadError(format!("Navigation failed: {}", e)))?;

        tab.wait_until_navigated()
            .map_err(|e| Error::LoadError(format!("Wait for navigation failed: {}", e)))?;

        // Fixed settle time for webfonts, the CSS framework and entry animations
        thread::sleep(Duration::from_millis(self.config.primary_settle_ms));

        Ok((browser, tab))
    }

    fn screenshot(tab: &Tab) -> Result<Vec<u8>> {
        tab.capture_screenshot(Page::CaptureScreenshotFormatOption::Png, None, None, true)
            .map_err(|e| Error::RenderError(format!("Screenshot failed: {}", e)))
    }
}

/// Encode a document as a base64 `data:` URL
fn data_url(document: &str) -> String {
    let b64 = base64::engine::general_purpose::STANDARD.encode(document.as_bytes());
    format!("data:text/html;charset=utf-8;base64,{}", b64)
}

impl RenderBackend for CdpBackend {
    fn name(&self) -> &'static str {
        "cdp"
    }

    fn is_available(&self) -> bool {
        match &self.config.chrome_path {
            Some(path) => path.exists(),
            None => headless_chrome::browser::default_executable().is_ok(),
        }
    }

    fn capture(&self, document: &str, viewport: Viewport, plan: &CapturePlan) -> Result<Vec<Vec<u8>>> {
        let (browser, tab) = self.open(document, viewport)?;

        let mut frames = Vec::with_capacity(plan.frames);
        for i in 0..plan.frames {
            if i > 0 {
                thread::sleep(plan.interval);
            }
            frames.push(Self::screenshot(&tab)?);
        }
        debug!("cdp captured {} frame(s)", frames.len());

        drop(tab);
        drop(browser);
        Ok(frames)
    }

    /// Samples screenshots at `video_fps` for `duration` and muxes them into
    /// an MP4 with `ffmpeg`. The frame directory and container live in a
    /// temporary directory removed on every exit path.
    fn record_video(&self, document: &str, viewport: Viewport, duration: Duration) -> Result<Vec<u8>> {
        if duration.is_zero() {
            return Err(Error::RenderError("video duration must be positive".into()));
        }

        let workdir = tempfile::Builder::new()
            .prefix("socialshot-video-")
            .tempdir_in(self.config.scratch_dir())?;
        let (browser, tab) = self.open(document, viewport)?;

        let frame_interval = Duration::from_secs(1) / self.config.video_fps.max(1);
        let started = Instant::now();
        let mut count = 0usize;

        while started.elapsed() < duration {
            let tick = Instant::now();
            let png = Self::screenshot(&tab)?;
            fs::write(workdir.path().join(format!("frame_{:05}.png", count)), png)?;
            count += 1;
            if let Some(rest) = frame_interval.checked_sub(tick.elapsed()) {
                thread::sleep(rest);
            }
        }

        drop(tab);
        drop(browser);

        // Screenshots can be slower than the target rate; spread what we got
        // over the requested duration so playback time matches.
        let frame_rate = count as f64 / duration.as_secs_f64();
        info!("cdp captured {} video frame(s) ({:.1} fps)", count, frame_rate);

        let output = workdir.path().join("capture.mp4");
        encode::mux_mp4(&self.config.ffmpeg_path, workdir.path(), frame_rate, &output)?;
        Ok(fs::read(&output)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_url_round_trips_document() {
        let url = data_url("<p>olá</p>");
        let b64 = url.strip_prefix("data:text/html;charset=utf-8;base64,").unwrap();
        let decoded = base64::engine::general_purpose::STANDARD.decode(b64).unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), "<p>olá</p>");
    }

    #[test]
    fn missing_chrome_override_is_unavailable() {
        let config = RenderConfig {
            chrome_path: Some("/nonexistent/chrome".into()),
            ..Default::default()
        };
        assert!(!CdpBackend::new(config).is_available());
    }

    #[test]
    fn test_cdp_capture_png() {
        let backend = CdpBackend::new(RenderConfig {
            primary_settle_ms: 100,
            ..Default::default()
        });
        // This test requires Chrome to be installed, so we skip it in CI
        if std::env::var("CI").is_ok() || !backend.is_available() {
            return;
        }
        let viewport = Viewport { width: 320, height: 200 };
        let frames = match backend.capture("<html><body>hi</body></html>", viewport, &CapturePlan::still()) {
            Ok(f) => f,
            Err(e) => {
                eprintln!("Skipping CDP capture test because Chrome failed to launch: {}", e);
                return;
            }
        };
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][0..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn failed_mux_removes_video_workdir() {
        let scratch = tempfile::tempdir().unwrap();
        let backend = CdpBackend::new(RenderConfig {
            primary_settle_ms: 100,
            ffmpeg_path: "/nonexistent/ffmpeg".into(),
            temp_dir: Some(scratch.path().to_path_buf()),
            ..Default::default()
        });
        // This test requires Chrome to be installed, so we skip it in CI
        if std::env::var("CI").is_ok() || !backend.is_available() {
            return;
        }
        let viewport = Viewport { width: 320, height: 200 };
        let result = backend.record_video("<p>frames</p>", viewport, Duration::from_secs(1));
        assert!(result.is_err());
        let leftovers: Vec<_> = fs::read_dir(scratch.path()).unwrap().collect();
        assert!(leftovers.is_empty(), "{:?}", leftovers);
    }
}
