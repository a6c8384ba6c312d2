//! HTTP façade over the generator, content cache and render service

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{error, info, warn};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use crate::cache::{ContentHandle, ContentStore};
use crate::generator::ContentGenerator;
use crate::templates::template;
use crate::{Error, GeneratedDocument, OutputKind, Platform, RenderService, Result};

/// Header set on a video download that was served as a still image
pub const DEGRADED_HEADER: &str = "X-Render-Degraded";

const TEST_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="UTF-8"></head>
<body style="margin:0">
    <div style="width:1080px;height:1080px;background:linear-gradient(135deg,#667eea,#764ba2);display:flex;align-items:center;justify-content:center">
        <h1 style="color:white;font-family:sans-serif;font-size:72px">Conversion test</h1>
    </div>
</body>
</html>"#;

#[derive(Clone)]
pub struct AppState {
    pub generator: Arc<ContentGenerator>,
    pub store: Arc<dyn ContentStore>,
    pub renderer: RenderService,
}

/// JSON error response: `{ "error": ..., "details"?: ... }`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    details: Option<String>,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            details: None,
        }
    }

    /// A render that failed after validation; the full error chain goes in `details`.
    fn render_failed(err: Error) -> Self {
        if err.is_caller_error() {
            return err.into();
        }
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Error generating file".into(),
            details: Some(error_chain(&err)),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = if err.is_caller_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self {
            status,
            message: err.to_string(),
            details: None,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self.details {
            Some(details) => json!({ "error": self.message, "details": details }),
            None => json!({ "error": self.message }),
        };
        (self.status, Json(body)).into_response()
    }
}

/// `Json` extractor whose rejections come back as [`ApiError`] payloads
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Render an error and its sources as `outer: inner: ...`
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

fn parse_platform(platform: Option<&str>) -> Result<Option<Platform>> {
    platform
        .filter(|p| !p.trim().is_empty())
        .map(str::parse::<Platform>)
        .transpose()
}

#[derive(Debug, Deserialize)]
pub struct PromptRequest {
    #[serde(default)]
    pub prompt: String,
    pub platform: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub success: bool,
    pub html: String,
    pub content_id: ContentHandle,
    pub timestamp: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub fallback: bool,
}

#[derive(Debug, Serialize)]
pub struct EnhanceResponse {
    pub success: bool,
    pub enhanced_prompt: String,
    pub original_prompt: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub fallback: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct DownloadRequest {
    pub format: Option<String>,
    pub html: Option<String>,
    pub content_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_secs")]
    pub duration: Option<u64>,
    pub platform: Option<String>,
}

/// Seconds given either as a JSON number or a numeric string (`"10"`)
fn lenient_secs<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Secs {
        Number(u64),
        Text(String),
    }

    match Option::<Secs>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Secs::Number(secs)) => Ok(Some(secs)),
        Some(Secs::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid duration: {:?}", text))),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PreviewRequest {
    pub html: Option<String>,
    pub content_id: Option<String>,
}

impl AppState {
    /// A stored handle wins over inline markup. Returns the handle that was
    /// consumed, if any.
    fn resolve_document(
        &self,
        content_id: Option<&str>,
        html: Option<&str>,
    ) -> Option<(GeneratedDocument, Option<ContentHandle>)> {
        let cached = content_id
            .and_then(|id| id.parse::<ContentHandle>().ok())
            .and_then(|handle| self.store.get(&handle).map(|doc| (doc, Some(handle))));
        if cached.is_some() {
            return cached;
        }
        if let Some(id) = content_id {
            warn!("Content {} not found in storage", id);
        }
        html.filter(|h| !h.trim().is_empty())
            .map(|h| (GeneratedDocument::new(h), None))
    }
}

async fn generate(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<PromptRequest>,
) -> std::result::Result<Json<GenerateResponse>, ApiError> {
    let platform = parse_platform(req.platform.as_deref())?.unwrap_or_default();
    info!("Generating {} post", platform);

    let fragment = state.generator.generate(&req.prompt, platform).await?;
    let document = template(platform).render(&fragment.html);
    let content_id = state.store.put(document.clone());

    Ok(Json(GenerateResponse {
        success: true,
        html: document.as_str().to_string(),
        content_id,
        timestamp: chrono::Local::now().to_rfc3339(),
        fallback: fragment.fallback,
    }))
}

async fn enhance_prompt(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<PromptRequest>,
) -> std::result::Result<Json<EnhanceResponse>, ApiError> {
    let platform = parse_platform(req.platform.as_deref())?.unwrap_or_default();
    let enhanced = state.generator.enhance_prompt(&req.prompt, platform).await?;

    Ok(Json(EnhanceResponse {
        success: true,
        enhanced_prompt: enhanced.enhanced,
        original_prompt: enhanced.original,
        fallback: enhanced.fallback,
    }))
}

async fn download(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<DownloadRequest>,
) -> std::result::Result<Response, ApiError> {
    let format = req.format.as_deref().unwrap_or("png").to_ascii_lowercase();
    // Reject bad formats and platforms before touching the cache or a browser
    format.parse::<OutputKind>()?;
    let platform = parse_platform(req.platform.as_deref())?;

    let (document, handle) = state
        .resolve_document(req.content_id.as_deref(), req.html.as_deref())
        .ok_or_else(|| ApiError::bad_request("HTML content is required"))?;

    info!("Download requested: format={}", format);
    let result = state
        .renderer
        .render_format(document, &format, req.duration, platform)
        .await
        .map_err(|e| {
            error!("Render failed: {}", e);
            ApiError::render_failed(e)
        })?;

    if let Some(handle) = handle {
        state.store.delete(&handle);
    }

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, result.mime_type)
        .header(
            CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", result.filename),
        );
    if result.degraded {
        response = response.header(DEGRADED_HEADER, "still-image");
    }
    response
        .body(Body::from(result.bytes))
        .map_err(|e| ApiError::from(Error::Other(e.to_string())))
}

async fn download_deprecated(Path(format): Path<String>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "error": "This endpoint is deprecated. Use POST /download with a JSON body.",
            "example": {
                "format": format,
                "content_id": "<content_id from /generate>",
                "duration": 5,
            }
        })),
    )
}

async fn preview(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<PreviewRequest>,
) -> std::result::Result<Html<String>, ApiError> {
    let (document, _) = state
        .resolve_document(req.content_id.as_deref(), req.html.as_deref())
        .ok_or_else(|| ApiError::bad_request("No content to preview"))?;
    Ok(Html(document.as_str().to_string()))
}

async fn test_conversion(State(state): State<AppState>) -> Json<Value> {
    let document = GeneratedDocument::new(TEST_PAGE);
    let mut results = serde_json::Map::new();

    for format in ["png", "jpg", "gif"] {
        let outcome = match state
            .renderer
            .render_format(document.clone(), format, None, Some(Platform::Instagram))
            .await
        {
            Ok(result) => json!({ "success": true, "size": result.bytes.len() }),
            Err(e) => json!({ "success": false, "error": error_chain(&e) }),
        };
        results.insert(format.to_string(), outcome);
    }

    let backends: Vec<Value> = state
        .renderer
        .availability()
        .into_iter()
        .map(|(name, available)| json!({ "name": name, "available": available }))
        .collect();
    let primary_available = state
        .renderer
        .availability()
        .first()
        .map(|(_, available)| *available)
        .unwrap_or(false);

    Json(json!({
        "results": results,
        "backends": backends,
        "primary_available": primary_available,
    }))
}

async fn cleanup_storage(State(state): State<AppState>) -> Json<Value> {
    let removed = state.store.clear();
    info!("Cleared {} items from storage", removed);
    Json(json!({
        "status": "success",
        "message": format!("Cleared {} items from storage", removed),
    }))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/generate", post(generate))
        .route("/enhance-prompt", post(enhance_prompt))
        .route("/download", post(download))
        .route("/download/{format}", get(download_deprecated))
        .route("/preview", post(preview))
        .route("/test-conversion", get(test_conversion))
        .route("/cleanup-storage", get(cleanup_storage))
        .with_state(state)
}

/// Bind `addr` and serve until the process exits
pub async fn serve(state: AppState, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_is_optional_but_validated() {
        assert_eq!(parse_platform(None).unwrap(), None);
        assert_eq!(parse_platform(Some("")).unwrap(), None);
        assert_eq!(parse_platform(Some("twitter")).unwrap(), Some(Platform::Twitter));
        assert!(parse_platform(Some("friendster")).is_err());
    }

    #[test]
    fn render_failures_carry_details() {
        let err = ApiError::render_failed(Error::AllBackendsFailed(vec![crate::BackendFailure {
            backend: "cdp",
            message: "launch failed".into(),
        }]));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.details.unwrap().contains("cdp: launch failed"));

        let err = ApiError::render_failed(Error::InvalidFormat("bmp".into()));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }
}
