//! W3C WebDriver backend (fallback renderer)
//!
//! Drives Chrome through `chromedriver`: the document is written to a
//! temporary `.html` file and loaded via `file://`, then screenshots are
//! pulled over the WebDriver HTTP protocol. This path does not record video.

use std::io::Write;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use base64::Engine as Base64Engine;
use log::{debug, warn};
use reqwest::blocking::Client;
use reqwest::Method;
use serde_json::{json, Value};

use crate::{CapturePlan, Error, RenderBackend, RenderConfig, Result, Viewport};

/// Chrome flags used for every WebDriver session
const CHROME_ARGS: [&str; 6] = [
    "--headless",
    "--no-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--hide-scrollbars",
    "--disable-web-security",
];

/// WebDriver-based backend
pub struct WebDriverBackend {
    config: RenderConfig,
}

/// Spawned `chromedriver`; killed when dropped.
struct DriverProcess {
    child: Child,
}

impl Drop for DriverProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// An open WebDriver session; deleted (closing Chrome) when dropped.
struct Session<'a> {
    client: &'a Client,
    base: &'a str,
    id: String,
}

impl Session<'_> {
    fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = format!("{}/session/{}{}", self.base, self.id, path);
        send(self.client, method, &url, body)
    }

    fn navigate(&self, url: &str) -> Result<()> {
        self.command(Method::POST, "/url", Some(json!({ "url": url })))
            .map_err(|e| Error::LoadError(format!("Navigation failed: {}", e)))?;
        Ok(())
    }

    fn set_window_size(&self, viewport: Viewport) -> Result<()> {
        self.command(
            Method::POST,
            "/window/rect",
            Some(json!({ "width": viewport.width, "height": viewport.height })),
        )?;
        Ok(())
    }

    fn screenshot(&self) -> Result<Vec<u8>> {
        let value = self
            .command(Method::GET, "/screenshot", None)
            .map_err(|e| Error::RenderError(format!("Screenshot failed: {}", e)))?;
        let b64 = value
            .as_str()
            .ok_or_else(|| Error::WebDriverError("screenshot response is not a string".into()))?;
        base64::engine::general_purpose::STANDARD
            .decode(b64)
            .map_err(|e| Error::WebDriverError(format!("invalid screenshot payload: {}", e)))
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        let url = format!("{}/session/{}", self.base, self.id);
        if let Err(e) = send(self.client, Method::DELETE, &url, None) {
            debug!("Failed to delete WebDriver session {}: {}", self.id, e);
        }
    }
}

/// Issue a WebDriver command and unwrap the `value` member of the reply.
fn send(client: &Client, method: Method, url: &str, body: Option<Value>) -> Result<Value> {
    let mut request = client.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request.send()?;
    let status = response.status();
    let payload: Value = response
        .json()
        .map_err(|e| Error::WebDriverError(format!("invalid response ({}): {}", status, e)))?;
    let value = payload.get("value").cloned().unwrap_or(Value::Null);

    if let Some(kind) = value.get("error").and_then(Value::as_str) {
        let message = value.get("message").and_then(Value::as_str).unwrap_or("");
        return Err(Error::WebDriverError(format!("{}: {}", kind, message)));
    }
    if !status.is_success() {
        return Err(Error::WebDriverError(format!("HTTP {}", status)));
    }
    Ok(value)
}

/// Ask the OS for a free local port
fn free_port() -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// Look for `name` in the directories of `PATH`
fn find_on_path(name: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

fn file_url(path: &Path) -> Result<String> {
    url::Url::from_file_path(path)
        .map(|u| u.to_string())
        .map_err(|_| Error::Other(format!("cannot build file URL for {}", path.display())))
}

impl WebDriverBackend {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    fn driver_executable(&self) -> Option<PathBuf> {
        match &self.config.chromedriver_path {
            Some(path) => Some(path.clone()).filter(|p| p.exists()),
            None => find_on_path("chromedriver"),
        }
    }

    fn client(&self) -> Result<Client> {
        Client::builder()
            .timeout(Duration::from_millis(self.config.launch_timeout_ms))
            .build()
            .map_err(|e| Error::InitializationError(format!("Failed to build HTTP client: {}", e)))
    }

    /// Start `chromedriver` on a free port unless a remote endpoint is
    /// configured. Returns the process guard (if any) and the base URL.
    fn start_driver(&self, client: &Client) -> Result<(Option<DriverProcess>, String)> {
        if let Some(url) = &self.config.webdriver_url {
            return Ok((None, url.trim_end_matches('/').to_string()));
        }

        let exe = self
            .driver_executable()
            .ok_or_else(|| Error::InitializationError("chromedriver not found".into()))?;
        let port = free_port()?;

        let child = Command::new(&exe)
            .arg(format!("--port={}", port))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::InitializationError(format!("Failed to spawn {}: {}", exe.display(), e)))?;
        let process = DriverProcess { child };
        let base = format!("http://127.0.0.1:{}", port);

        self.wait_ready(client, &base)?;
        Ok((Some(process), base))
    }

    fn wait_ready(&self, client: &Client, base: &str) -> Result<()> {
        let deadline = Instant::now() + Duration::from_millis(self.config.launch_timeout_ms);
        let status_url = format!("{}/status", base);

        while Instant::now() < deadline {
            if let Ok(value) = send(client, Method::GET, &status_url, None) {
                if value.get("ready").and_then(Value::as_bool).unwrap_or(false) {
                    return Ok(());
                }
            }
            thread::sleep(Duration::from_millis(100));
        }
        Err(Error::Timeout(self.config.launch_timeout_ms))
    }

    fn new_session<'a>(&self, client: &'a Client, base: &'a str) -> Result<Session<'a>> {
        let mut options = json!({ "args": CHROME_ARGS });
        if let Some(binary) = &self.config.chrome_path {
            options["binary"] = json!(binary);
        }
        let capabilities = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": options,
                }
            }
        });

        let value = send(client, Method::POST, &format!("{}/session", base), Some(capabilities))
            .map_err(|e| Error::InitializationError(format!("Failed to create session: {}", e)))?;
        let id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::WebDriverError("session response has no sessionId".into()))?
            .to_string();

        debug!("WebDriver session {} created", id);
        Ok(Session { client, base, id })
    }
}

impl RenderBackend for WebDriverBackend {
    fn name(&self) -> &'static str {
        "webdriver"
    }

    fn is_available(&self) -> bool {
        self.config.webdriver_url.is_some() || self.driver_executable().is_some()
    }

    fn capture(&self, document: &str, viewport: Viewport, plan: &CapturePlan) -> Result<Vec<Vec<u8>>> {
        // Declaration order matters: the session is dropped before the driver
        // and the temp file.
        let mut page = tempfile::Builder::new()
            .prefix("socialshot-")
            .suffix(".html")
            .tempfile_in(self.config.scratch_dir())?;
        page.write_all(document.as_bytes())?;
        page.flush()?;

        let client = self.client()?;
        let (_driver, base) = self.start_driver(&client)?;
        let session = self.new_session(&client, &base)?;

        session.navigate(&file_url(page.path())?)?;
        thread::sleep(Duration::from_millis(self.config.fallback_settle_ms));

        if let Err(e) = session.set_window_size(viewport) {
            warn!("Failed to resize window to {}x{}: {}", viewport.width, viewport.height, e);
        }

        let mut frames = Vec::with_capacity(plan.frames);
        for i in 0..plan.frames {
            if i > 0 {
                thread::sleep(plan.interval);
            }
            frames.push(session.screenshot()?);
        }
        debug!("webdriver captured {} frame(s)", frames.len());
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_driver(replies: Vec<(u16, &'static str)>) -> String {
        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        thread::spawn(move || {
            for (status, body) in replies {
                if let Ok(request) = server.recv() {
                    let response = tiny_http::Response::from_string(body).with_status_code(status);
                    let _ = request.respond(response);
                }
            }
        });
        format!("http://{}", addr)
    }

    #[test]
    fn send_unwraps_value() {
        let base = fake_driver(vec![(200, r#"{"value":{"ready":true}}"#)]);
        let client = Client::new();
        let value = send(&client, Method::GET, &format!("{}/status", base), None).unwrap();
        assert_eq!(value["ready"], json!(true));
    }

    #[test]
    fn send_surfaces_protocol_errors() {
        let base = fake_driver(vec![(
            500,
            r#"{"value":{"error":"session not created","message":"Chrome failed to start"}}"#,
        )]);
        let client = Client::new();
        let err = send(&client, Method::POST, &format!("{}/session", base), Some(json!({})))
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("session not created"));
        assert!(msg.contains("Chrome failed to start"));
    }

    #[test]
    fn remote_endpoint_counts_as_available() {
        let backend = WebDriverBackend::new(RenderConfig {
            webdriver_url: Some("http://127.0.0.1:4444/".into()),
            ..Default::default()
        });
        assert!(backend.is_available());
    }

    #[test]
    fn missing_driver_override_is_unavailable() {
        let backend = WebDriverBackend::new(RenderConfig {
            chromedriver_path: Some("/nonexistent/chromedriver".into()),
            ..Default::default()
        });
        assert!(!backend.is_available());
        let err = backend.capture("<p>x</p>", Viewport::default(), &CapturePlan::still());
        assert!(matches!(err, Err(Error::InitializationError(_))));
    }

    #[test]
    fn capture_against_fake_remote_driver() {
        // 1x1 transparent PNG
        const PNG_B64: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";
        let screenshot = Box::leak(format!(r#"{{"value":"{}"}}"#, PNG_B64).into_boxed_str());
        let base = fake_driver(vec![
            (200, r#"{"value":{"sessionId":"abc","capabilities":{}}}"#),
            (200, r#"{"value":null}"#),
            (200, r#"{"value":{"x":0,"y":0,"width":320,"height":200}}"#),
            (200, screenshot),
            (200, screenshot),
            (200, r#"{"value":null}"#),
        ]);
        let scratch = tempfile::tempdir().unwrap();
        let backend = WebDriverBackend::new(RenderConfig {
            webdriver_url: Some(base),
            fallback_settle_ms: 0,
            temp_dir: Some(scratch.path().to_path_buf()),
            ..Default::default()
        });
        let plan = CapturePlan { frames: 2, interval: Duration::from_millis(1) };
        let frames = backend
            .capture("<p>x</p>", Viewport { width: 320, height: 200 }, &plan)
            .unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0][0..8], b"\x89PNG\r\n\x1a\n");
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[test]
    fn failed_screenshot_leaves_no_page_behind() {
        let base = fake_driver(vec![
            (200, r#"{"value":{"sessionId":"abc","capabilities":{}}}"#),
            (200, r#"{"value":null}"#),
            (200, r#"{"value":{"x":0,"y":0,"width":320,"height":200}}"#),
            (500, r#"{"value":{"error":"unknown error","message":"tab crashed"}}"#),
            (200, r#"{"value":null}"#),
        ]);
        let scratch = tempfile::tempdir().unwrap();
        let backend = WebDriverBackend::new(RenderConfig {
            webdriver_url: Some(base),
            fallback_settle_ms: 0,
            temp_dir: Some(scratch.path().to_path_buf()),
            ..Default::default()
        });

        let err = backend
            .capture("<p>x</p>", Viewport { width: 320, height: 200 }, &CapturePlan::still())
            .unwrap_err();
        assert!(err.to_string().contains("tab crashed"));
        let leftovers: Vec<_> = std::fs::read_dir(scratch.path()).unwrap().collect();
        assert!(leftovers.is_empty(), "{:?}", leftovers);
    }
}
