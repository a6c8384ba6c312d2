//! End-to-end renders against real browsers

use std::io::Cursor;
use std::time::Duration;

use image::codecs::gif::GifDecoder;
use image::AnimationDecoder;
use socialshot::templates::template;
use socialshot::{OutputKind, Platform, RenderBackend, RenderConfig, RenderEngine};

fn quick_config() -> RenderConfig {
    RenderConfig {
        primary_settle_ms: 500,
        fallback_settle_ms: 500,
        ..RenderConfig::default()
    }
}

fn post(platform: Platform) -> socialshot::GeneratedDocument {
    template(platform).render(r#"<h1 class="text-6xl font-bold text-white animate-float">Smoke test</h1>"#)
}

#[cfg(feature = "cdp")]
#[test]
#[ignore] // Requires Chrome to be installed
fn test_cdp_png_matches_platform_canvas() {
    let config = quick_config();
    let backend = socialshot::cdp::CdpBackend::new(config.clone());
    let engine = RenderEngine::new(vec![Box::new(backend)], config);

    let result = engine
        .render(&post(Platform::Linkedin), OutputKind::Png, Some(Platform::Linkedin))
        .expect("CDP render failed");
    let img = image::load_from_memory(&result.bytes).unwrap();
    assert_eq!((img.width(), img.height()), (1200, 630));
}

#[cfg(feature = "cdp")]
#[test]
#[ignore] // Requires Chrome to be installed
fn test_cdp_gif_has_ten_frames() {
    let config = quick_config();
    let backend = socialshot::cdp::CdpBackend::new(config.clone());
    let engine = RenderEngine::new(vec![Box::new(backend)], config);

    let result = engine
        .render(&post(Platform::Instagram), OutputKind::Gif, None)
        .expect("CDP render failed");
    let frames = GifDecoder::new(Cursor::new(&result.bytes))
        .unwrap()
        .into_frames()
        .collect_frames()
        .unwrap();
    assert_eq!(frames.len(), 10);
}

#[cfg(feature = "cdp")]
#[test]
#[ignore] // Requires Chrome and ffmpeg to be installed
fn test_cdp_records_mp4() {
    let backend = socialshot::cdp::CdpBackend::new(quick_config());
    let video = backend
        .record_video(
            post(Platform::Twitter).as_str(),
            Platform::Twitter.viewport(),
            Duration::from_secs(2),
        )
        .expect("video capture failed");
    // ISO base media: `ftyp` box right after the first size field
    assert_eq!(&video[4..8], b"ftyp");
}

#[cfg(feature = "webdriver")]
#[test]
#[ignore] // Requires Chrome and chromedriver to be installed
fn test_webdriver_jpeg() {
    let config = quick_config();
    let backend = socialshot::webdriver::WebDriverBackend::new(config.clone());
    let engine = RenderEngine::new(vec![Box::new(backend)], config);

    let result = engine
        .render(&post(Platform::Twitter), OutputKind::Jpeg, Some(Platform::Twitter))
        .expect("WebDriver render failed");
    assert_eq!(&result.bytes[0..2], &[0xFF, 0xD8]);
}
