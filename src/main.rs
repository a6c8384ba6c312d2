use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;
use tracing_subscriber::EnvFilter;

use socialshot::cache::MemoryContentStore;
use socialshot::generator::{ContentGenerator, OpenAiCompatClient, DEFAULT_BASE_URL, DEFAULT_MODEL};
use socialshot::server::{self, AppState};
use socialshot::{new_engine, GeneratedDocument, Platform, RenderConfig, RenderService};

#[derive(Parser)]
#[command(name = "socialshot", version, about = "Generate social media posts and render them with headless Chrome")]
struct Cli {
    #[command(flatten)]
    llm: LlmArgs,

    #[command(flatten)]
    render: RenderArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct LlmArgs {
    /// API key for the chat-completions endpoint
    #[arg(long, env = "DEEPSEEK_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long, env = "LLM_BASE_URL", default_value = DEFAULT_BASE_URL)]
    llm_base_url: String,

    #[arg(long, env = "LLM_MODEL", default_value = DEFAULT_MODEL)]
    llm_model: String,

    #[arg(long, env = "LLM_TIMEOUT_SECS", default_value_t = 120)]
    llm_timeout_secs: u64,
}

#[derive(Args)]
struct RenderArgs {
    /// Chrome executable for the primary backend
    #[arg(long, env = "CHROME_PATH")]
    chrome_path: Option<PathBuf>,

    /// chromedriver executable for the fallback backend
    #[arg(long, env = "CHROMEDRIVER_PATH")]
    chromedriver_path: Option<PathBuf>,

    /// Use a running WebDriver server instead of spawning chromedriver
    #[arg(long, env = "WEBDRIVER_URL")]
    webdriver_url: Option<String>,

    #[arg(long, env = "FFMPEG_PATH", default_value = "ffmpeg")]
    ffmpeg_path: PathBuf,

    /// Concurrent renders (each owns a browser)
    #[arg(long, env = "RENDER_WORKERS")]
    workers: Option<usize>,

    /// Do not infer the canvas size from pixel markers when no platform is given
    #[arg(long)]
    no_viewport_detection: bool,

    /// Longest video a request may ask for, in seconds
    #[arg(long, env = "MAX_VIDEO_SECS", default_value_t = 60)]
    max_video_secs: u64,

    /// Directory for temporary pages and video frames
    #[arg(long, env = "SOCIALSHOT_TMPDIR")]
    temp_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve {
        #[arg(long, env = "PORT", default_value_t = 5010)]
        port: u16,

        #[arg(long, default_value = "127.0.0.1")]
        bind: IpAddr,
    },
    /// Render an HTML file to png, jpg, gif or mp4
    Render {
        input: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(short, long, default_value = "png")]
        format: String,

        /// Video length in seconds (mp4 only)
        #[arg(long, default_value_t = 5)]
        duration: u64,

        #[arg(long)]
        platform: Option<Platform>,
    },
    /// Generate a post and print the full HTML document
    Generate {
        prompt: String,

        #[arg(long, default_value = "instagram")]
        platform: Platform,

        /// Expand the prompt into a detailed brief first
        #[arg(long)]
        enhance: bool,
    },
}

impl RenderArgs {
    fn config(&self) -> RenderConfig {
        RenderConfig {
            chrome_path: self.chrome_path.clone(),
            chromedriver_path: self.chromedriver_path.clone(),
            webdriver_url: self.webdriver_url.clone(),
            ffmpeg_path: self.ffmpeg_path.clone(),
            detect_viewport: !self.no_viewport_detection,
            max_video_secs: self.max_video_secs,
            temp_dir: self.temp_dir.clone(),
            ..RenderConfig::default()
        }
    }

    fn service(&self) -> Result<RenderService> {
        let workers = self.workers.unwrap_or_else(num_cpus::get);
        let engine = new_engine(self.config());
        for (name, available) in engine.availability() {
            info!("Backend {}: {}", name, if available { "available" } else { "not found" });
        }
        RenderService::new(engine, workers).context("failed to start render workers")
    }
}

impl LlmArgs {
    fn generator(&self) -> Result<ContentGenerator> {
        let client = OpenAiCompatClient::new(
            self.api_key.clone(),
            self.llm_base_url.clone(),
            Duration::from_secs(self.llm_timeout_secs),
        )?;
        Ok(ContentGenerator::new(Arc::new(client), self.llm_model.clone()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Also picks up `log` records from the library
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { port, bind } => {
            let generator = cli.llm.generator()?;
            info!("Generating content with model {}", generator.model());
            let state = AppState {
                generator: Arc::new(generator),
                store: Arc::new(MemoryContentStore::new()),
                renderer: cli.render.service()?,
            };
            server::serve(state, SocketAddr::new(bind, port)).await?;
        }
        Command::Render { input, output, format, duration, platform } => {
            let html = std::fs::read_to_string(&input)
                .with_context(|| format!("failed to read {}", input.display()))?;
            let service = cli.render.service()?;
            let result = service
                .render_format(GeneratedDocument::new(html), &format, Some(duration), platform)
                .await?;
            if result.degraded {
                eprintln!("Video capture unavailable; wrote a still image instead");
            }
            let path = output.unwrap_or_else(|| PathBuf::from(&result.filename));
            std::fs::write(&path, &result.bytes)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("{} ({} bytes, {})", path.display(), result.bytes.len(), result.mime_type);
        }
        Command::Generate { prompt, platform, enhance } => {
            let generator = cli.llm.generator()?;
            let prompt = if enhance {
                let enhanced = generator.enhance_prompt(&prompt, platform).await?;
                eprintln!("Enhanced prompt: {}", enhanced.enhanced);
                enhanced.enhanced
            } else {
                prompt
            };
            let document = generator.create_post(&prompt, platform).await?;
            println!("{}", document.as_str());
        }
    }

    Ok(())
}
