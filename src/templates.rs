//! Static per-platform page templates
//!
//! Each template is a full HTML document sized to the platform's canvas, with
//! a single `{CONTENT}` marker where the generated fragment is spliced in.

use crate::{GeneratedDocument, Platform, Viewport};

/// Substitution point for the generated fragment
pub const CONTENT_MARKER: &str = "{CONTENT}";

/// A platform page template
#[derive(Debug)]
pub struct Template {
    pub platform: Platform,
    pub body: &'static str,
    pub width: u32,
    pub height: u32,
}

impl Template {
    pub fn viewport(&self) -> Viewport {
        Viewport {
            width: self.width,
            height: self.height,
        }
    }

    /// CSS class carrying the platform's background gradient
    pub fn background_class(&self) -> &'static str {
        match self.platform {
            Platform::Instagram => "gradient-bg",
            Platform::Linkedin => "professional-bg",
            Platform::Twitter => "twitter-bg",
        }
    }

    /// Splice `fragment` into the template.
    pub fn render(&self, fragment: &str) -> GeneratedDocument {
        GeneratedDocument::new(self.body.replacen(CONTENT_MARKER, fragment, 1))
    }
}

static INSTAGRAM: Template = Template {
    platform: Platform::Instagram,
    body: include_str!("../templates/instagram.html"),
    width: 1080,
    height: 1080,
};

static LINKEDIN: Template = Template {
    platform: Platform::Linkedin,
    body: include_str!("../templates/linkedin.html"),
    width: 1200,
    height: 630,
};

static TWITTER: Template = Template {
    platform: Platform::Twitter,
    body: include_str!("../templates/twitter.html"),
    width: 1200,
    height: 675,
};

/// Look up the template for `platform`
pub fn template(platform: Platform) -> &'static Template {
    match platform {
        Platform::Instagram => &INSTAGRAM,
        Platform::Linkedin => &LINKEDIN,
        Platform::Twitter => &TWITTER,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_template_has_one_marker_and_its_canvas_size() {
        for platform in Platform::all() {
            let t = template(platform);
            assert_eq!(t.body.matches(CONTENT_MARKER).count(), 1, "{}", platform);
            assert_eq!(t.viewport(), platform.viewport());
            assert!(t.body.contains(&format!("w-[{}px]", t.width)));
            assert!(t.body.contains(&format!("h-[{}px]", t.height)));
            assert!(t.body.contains(t.background_class()));
        }
    }

    #[test]
    fn render_replaces_marker() {
        let doc = template(Platform::Twitter).render("<p id=\"x\">hi</p>");
        assert!(doc.as_str().contains("<p id=\"x\">hi</p>"));
        assert!(!doc.as_str().contains(CONTENT_MARKER));
        assert!(doc.as_str().contains("twitter-bg"));
    }

    #[test]
    fn fragment_containing_marker_is_not_expanded_again() {
        let doc = template(Platform::Linkedin).render("literal {CONTENT} text");
        assert_eq!(doc.as_str().matches(CONTENT_MARKER).count(), 1);
    }

    #[test]
    fn instagram_template_defines_animation_classes() {
        let body = template(Platform::Instagram).body;
        for class in crate::generator::ANIMATION_CLASSES {
            assert!(body.contains(&format!(".{}", class)), "missing {}", class);
        }
    }
}
