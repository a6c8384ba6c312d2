//! Content generator: prompt → HTML fragment via a chat-completions API
//!
//! Generation never fails the caller because of the upstream model: any
//! error or empty reply is replaced by a deterministic fallback fragment
//! (or fallback prompt), flagged so callers can tell the difference.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::templates::template;
use crate::{Error, GeneratedDocument, Platform, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";
pub const DEFAULT_MODEL: &str = "deepseek-reasoner";

/// Animation classes defined by the templates and offered to the model
pub const ANIMATION_CLASSES: [&str; 6] = [
    "animate-float",
    "animate-pulse-slow",
    "animate-slide-in",
    "animate-rotate",
    "animate-bounce-slow",
    "animate-glow",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".into(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// A chat-completions endpoint
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Send the conversation and return the first choice's text
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Client for any OpenAI-compatible `/chat/completions` API
pub struct OpenAiCompatClient {
    api_key: Option<String>,
    base_url: String,
    client: Client,
}

impl OpenAiCompatClient {
    pub fn new(api_key: Option<String>, base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::ConfigError(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompatClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Upstream("no API key configured".into()))?;

        let url = format!("{}/chat/completions", self.base_url);
        debug!("Calling {} with model {}", url, request.model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!("HTTP {}: {}", status, body.trim())));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("invalid response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::Upstream("response has no content".into()))
    }
}

/// Markup produced for a prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub html: String,
    /// The model was unreachable or returned nothing; `html` is the canned fragment
    pub fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnhancedPrompt {
    pub enhanced: String,
    pub original: String,
    pub fallback: bool,
}

fn platform_profile(platform: Platform) -> &'static str {
    match platform {
        Platform::Instagram => "1080x1080px, striking visuals, vibrant colors, engagement focus",
        Platform::Linkedin => "1200x630px, professional, corporate, networking focus",
        Platform::Twitter => "1200x675px, concise, viral, shareability focus",
    }
}

fn platform_audience(platform: Platform) -> &'static str {
    match platform {
        Platform::Instagram => "Instagram (visual, young, engagement, hashtags, stories)",
        Platform::Linkedin => "LinkedIn (professional, networking, B2B, thought leadership)",
        Platform::Twitter => "Twitter/X (viral, concise, trending, retweets)",
    }
}

fn design_prompt(platform: Platform) -> String {
    format!(
        "You are a social media design specialist. Create ONLY the HTML content that goes inside the main div.\n\
         \n\
         Platform: {platform}\n\
         Specifications: {profile}\n\
         \n\
         RULES:\n\
         1. Use only Tailwind CSS utility classes\n\
         2. Use Font Awesome icons where appropriate\n\
         3. Create a modern, attractive design\n\
         4. Include CSS animations for videos: {animations}\n\
         5. Do NOT include html, head or body tags, only the div content\n\
         6. Use colors that contrast well with the background\n\
         7. Focus on readability and visual impact\n\
         8. For videos, use more animated and dynamic elements\n\
         \n\
         RETURN ONLY THE CONTENT HTML, WITHOUT EXPLANATIONS.",
        platform = platform,
        profile = platform_profile(platform),
        animations = ANIMATION_CLASSES.join(", "),
    )
}

fn enhancement_prompt(prompt: &str, platform: Platform) -> String {
    format!(
        "You are a social media marketing specialist.\n\
         The user provided this basic idea: \"{prompt}\"\n\
         \n\
         Target platform: {audience}\n\
         \n\
         Expand and improve this prompt into a detailed brief for post generation.\n\
         \n\
         Include:\n\
         1. Detailed visual description (colors, style, elements)\n\
         2. Tone of voice and main message\n\
         3. Specific target audience\n\
         4. Suggested call-to-action\n\
         5. Design elements (icons, graphics, layout)\n\
         6. Relevant keywords and hashtags\n\
         \n\
         Keep the expanded prompt concise but complete (3-4 lines at most).\n\
         Return ONLY the improved prompt, without additional explanations.",
        prompt = prompt,
        audience = platform_audience(platform),
    )
}

/// Remove a surrounding Markdown code fence (```html ... ```), if any.
pub fn strip_code_fences(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (`html`, `HTML`, ...) on the opening line; a
    // reply that never gets past that line has no body
    let Some(i) = rest.find('\n') else {
        return "";
    };
    let body = &rest[i + 1..];
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Canned fragment used when the model cannot be reached
pub fn fallback_fragment(prompt: &str) -> String {
    format!(
        r#"<div class="text-center text-white p-8">
    <i class="fas fa-image text-6xl mb-4 animate-pulse-slow"></i>
    <h1 class="text-5xl font-bold mb-4 animate-float">{}</h1>
    <p class="text-xl opacity-90">Automatically generated post</p>
    <div class="mt-8 flex justify-center space-x-4">
        <i class="fab fa-instagram text-3xl animate-bounce-slow"></i>
        <i class="fab fa-linkedin text-3xl animate-bounce-slow" style="animation-delay: 0.2s"></i>
        <i class="fab fa-twitter text-3xl animate-bounce-slow" style="animation-delay: 0.4s"></i>
    </div>
</div>"#,
        escape_html(prompt)
    )
}

/// Canned enhancement used when the model cannot be reached
pub fn fallback_enhancement(prompt: &str, platform: Platform) -> String {
    format!(
        "{}. Modern, eye-catching design for {}, with vibrant colors, striking visual elements, \
         focus on the platform's target audience, including a relevant call-to-action.",
        prompt, platform
    )
}

fn require_prompt(prompt: &str) -> Result<&str> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return Err(Error::MissingInput("Prompt is required".into()));
    }
    Ok(prompt)
}

/// Produces post markup for a prompt and platform
pub struct ContentGenerator {
    client: Arc<dyn CompletionClient>,
    model: String,
}

impl ContentGenerator {
    pub fn new(client: Arc<dyn CompletionClient>, model: impl Into<String>) -> Self {
        Self { client, model: model.into() }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Ask the model for a content fragment. Upstream failures yield the
    /// fallback fragment; only an empty prompt is an error.
    pub async fn generate(&self, prompt: &str, platform: Platform) -> Result<Fragment> {
        let prompt = require_prompt(prompt)?;
        let request = CompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(design_prompt(platform)),
                ChatMessage::user(format!("Create a post about: {}", prompt)),
            ],
            temperature: 0.8,
            max_tokens: None,
        };

        match self.client.complete(request).await {
            Ok(reply) => {
                let html = strip_code_fences(&reply);
                if html.is_empty() {
                    warn!("Model returned an empty fragment; using fallback content");
                    return Ok(Fragment { html: fallback_fragment(prompt), fallback: true });
                }
                info!("Generated {} bytes of {} content", html.len(), platform);
                Ok(Fragment { html: html.to_string(), fallback: false })
            }
            Err(e) => {
                warn!("Content generation failed: {}; using fallback content", e);
                Ok(Fragment { html: fallback_fragment(prompt), fallback: true })
            }
        }
    }

    /// Expand a short idea into a detailed design brief
    pub async fn enhance_prompt(&self, prompt: &str, platform: Platform) -> Result<EnhancedPrompt> {
        let prompt = require_prompt(prompt)?;
        let request = CompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system("You are a digital marketing and social media copywriting expert."),
                ChatMessage::user(enhancement_prompt(prompt, platform)),
            ],
            temperature: 0.7,
            max_tokens: Some(300),
        };

        let reply = match self.client.complete(request).await {
            Ok(reply) => reply.trim().to_string(),
            Err(e) => {
                warn!("Prompt enhancement failed: {}; using fallback", e);
                String::new()
            }
        };

        if reply.is_empty() {
            return Ok(EnhancedPrompt {
                enhanced: fallback_enhancement(prompt, platform),
                original: prompt.to_string(),
                fallback: true,
            });
        }
        Ok(EnhancedPrompt { enhanced: reply, original: prompt.to_string(), fallback: false })
    }

    /// Generate a fragment and splice it into the platform template
    pub async fn create_post(&self, prompt: &str, platform: Platform) -> Result<GeneratedDocument> {
        let fragment = self.generate(prompt, platform).await?;
        Ok(template(platform).render(&fragment.html))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Replays canned replies and records every request
    struct Scripted {
        replies: Mutex<Vec<Result<String>>>,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String>>) -> Arc<Self> {
            Arc::new(Self { replies: Mutex::new(replies), seen: Mutex::new(Vec::new()) })
        }
    }

    #[async_trait]
    impl CompletionClient for Scripted {
        async fn complete(&self, request: CompletionRequest) -> Result<String> {
            self.seen.lock().unwrap().push(request);
            self.replies.lock().unwrap().remove(0)
        }
    }

    #[test]
    fn strips_fences() {
        assert_eq!(strip_code_fences("```html\n<div>x</div>\n```"), "<div>x</div>");
        assert_eq!(strip_code_fences("```\n<p>y</p>```"), "<p>y</p>");
        assert_eq!(strip_code_fences("  <p>plain</p>\n"), "<p>plain</p>");
        assert_eq!(strip_code_fences("```html"), "");
        assert_eq!(strip_code_fences("```"), "");
    }

    #[test]
    fn fallback_escapes_prompt() {
        let html = fallback_fragment("<script>alert(1)</script> & more");
        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt; &amp; more"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("animate-float"));
    }

    #[tokio::test]
    async fn generate_builds_request() {
        let client = Scripted::new(vec![Ok("<div>ok</div>".into())]);
        let generator = ContentGenerator::new(client.clone(), "test-model");
        assert_eq!(generator.model(), "test-model");

        let fragment = generator.generate("  coffee  ", Platform::Twitter).await.unwrap();
        assert_eq!(fragment, Fragment { html: "<div>ok</div>".into(), fallback: false });

        let seen = client.seen.lock().unwrap();
        let request = &seen[0];
        assert_eq!(request.model, "test-model");
        assert_eq!(request.temperature, 0.8);
        assert!(request.messages[0].content.contains("1200x675px"));
        assert!(request.messages[0].content.contains("animate-glow"));
        assert_eq!(request.messages[1].content, "Create a post about: coffee");
    }

    #[tokio::test]
    async fn upstream_error_falls_back() {
        let client = Scripted::new(vec![Err(Error::Upstream("HTTP 500".into()))]);
        let generator = ContentGenerator::new(client, DEFAULT_MODEL);
        let fragment = generator.generate("summer sale", Platform::Instagram).await.unwrap();
        assert!(fragment.fallback);
        assert!(fragment.html.contains("summer sale"));
    }

    #[tokio::test]
    async fn empty_reply_falls_back() {
        let client = Scripted::new(vec![Ok("```html\n```".into()), Ok("  ```html ".into())]);
        let generator = ContentGenerator::new(client, DEFAULT_MODEL);
        let fragment = generator.generate("x", Platform::Instagram).await.unwrap();
        assert!(fragment.fallback);
        let fragment = generator.generate("x", Platform::Instagram).await.unwrap();
        assert!(fragment.fallback);
        assert!(!fragment.html.starts_with("html"));
    }

    #[tokio::test]
    async fn empty_prompt_is_rejected_without_calling_model() {
        let client = Scripted::new(vec![]);
        let generator = ContentGenerator::new(client.clone(), DEFAULT_MODEL);
        let err = generator.generate("   ", Platform::Instagram).await.unwrap_err();
        assert!(err.is_caller_error());
        assert!(generator.enhance_prompt("", Platform::Linkedin).await.is_err());
        assert!(client.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn enhance_uses_limits_and_falls_back() {
        let client = Scripted::new(vec![Ok(" A bold brief. ".into()), Err(Error::Upstream("down".into()))]);
        let generator = ContentGenerator::new(client.clone(), DEFAULT_MODEL);

        let ok = generator.enhance_prompt("bakery", Platform::Linkedin).await.unwrap();
        assert_eq!(ok.enhanced, "A bold brief.");
        assert!(!ok.fallback);
        {
            let seen = client.seen.lock().unwrap();
            assert_eq!(seen[0].max_tokens, Some(300));
            assert_eq!(seen[0].temperature, 0.7);
        }

        let fb = generator.enhance_prompt("bakery", Platform::Linkedin).await.unwrap();
        assert!(fb.fallback);
        assert_eq!(fb.original, "bakery");
        assert!(fb.enhanced.starts_with("bakery. Modern, eye-catching design for linkedin"));
    }

    #[tokio::test]
    async fn create_post_uses_platform_template() {
        let client = Scripted::new(vec![Ok("<h1>Hi</h1>".into())]);
        let generator = ContentGenerator::new(client, DEFAULT_MODEL);
        let doc = generator.create_post("hi", Platform::Linkedin).await.unwrap();
        assert!(doc.as_str().contains("<h1>Hi</h1>"));
        assert!(doc.as_str().contains("professional-bg"));
        assert!(!doc.as_str().contains("{CONTENT}"));
    }

    #[tokio::test]
    async fn client_without_key_is_an_upstream_error() {
        let client = OpenAiCompatClient::new(None, DEFAULT_BASE_URL, Duration::from_secs(1)).unwrap();
        let err = client
            .complete(CompletionRequest {
                model: DEFAULT_MODEL.into(),
                messages: vec![ChatMessage::user("x")],
                temperature: 0.8,
                max_tokens: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Upstream(_)));
    }
}
