//! Viewport selection for a document about to be rendered

use crate::{Platform, Viewport};

/// Infer the canvas size from literal pixel markers in the markup.
///
/// Checked in order, first match wins: `1080px` → 1080×1080, `1200px` with
/// `630px` → 1200×630, `1200px` with `675px` → 1200×675, otherwise 1080×1080.
/// This is a plain substring test, so a stray `1080px` anywhere in the
/// fragment selects the square canvas.
pub fn detect_viewport(markup: &str) -> Viewport {
    let has = |marker: &str| markup.contains(marker);

    if has("1080px") {
        Viewport { width: 1080, height: 1080 }
    } else if has("1200px") && has("630px") {
        Viewport { width: 1200, height: 630 }
    } else if has("1200px") && has("675px") {
        Viewport { width: 1200, height: 675 }
    } else {
        Viewport::default()
    }
}

/// Pick the viewport for a render: an explicit platform wins, then the
/// markup heuristic when `detect` is enabled, then the default canvas.
pub fn resolve_viewport(platform: Option<Platform>, markup: &str, detect: bool) -> Viewport {
    match platform {
        Some(p) => p.viewport(),
        None if detect => detect_viewport(markup),
        None => Viewport::default(),
    }
}
