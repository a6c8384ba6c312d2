use crate::render::RenderEngine;
use crate::{Error, GeneratedDocument, OutputKind, Platform, RenderConfig, RenderResult, Result};
use log::{debug, error};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;

enum Job {
    Render(GeneratedDocument, OutputKind, Option<Platform>, oneshot::Sender<Result<RenderResult>>),
    Video(GeneratedDocument, Duration, Option<Platform>, oneshot::Sender<Result<RenderResult>>),
}

/// An async-friendly render service backed by a pool of worker threads.
///
/// Every backend blocks (browser launch, settle delays, driver round-trips),
/// so jobs run on dedicated OS threads that share one `RenderEngine`. Async
/// callers await a oneshot reply and never block the runtime. Each job
/// launches and tears down its own browser, so concurrent jobs share nothing.
#[derive(Clone)]
pub struct RenderService {
    job_tx: Sender<Job>,
    engine: Arc<RenderEngine>,
}

impl RenderService {
    /// Start `workers` threads (at least one) over `engine`.
    pub fn new(engine: RenderEngine, workers: usize) -> Result<Self> {
        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let job_rx = Arc::new(Mutex::new(job_rx));
        let engine = Arc::new(engine);

        for i in 0..workers.max(1) {
            let rx = Arc::clone(&job_rx);
            let engine = Arc::clone(&engine);
            thread::Builder::new()
                .name(format!("render-worker-{}", i))
                .spawn(move || worker_loop(&engine, &rx))
                .map_err(|e| Error::InitializationError(format!("Failed to spawn render worker: {}", e)))?;
        }

        Ok(Self { job_tx, engine })
    }

    pub fn config(&self) -> &RenderConfig {
        self.engine.config()
    }

    /// Backend names in chain order with their current availability
    pub fn availability(&self) -> Vec<(&'static str, bool)> {
        self.engine.availability()
    }

    /// Render a still or animated image (or a video with the default duration)
    pub async fn render(
        &self,
        document: GeneratedDocument,
        kind: OutputKind,
        platform: Option<Platform>,
    ) -> Result<RenderResult> {
        let (tx, rx) = oneshot::channel();
        self.submit(Job::Render(document, kind, platform, tx))?;
        rx.await
            .map_err(|e| Error::Other(format!("Render canceled: {}", e)))?
    }

    /// Record a video; degrades to a still PNG when no backend can record.
    pub async fn render_video(
        &self,
        document: GeneratedDocument,
        duration: Duration,
        platform: Option<Platform>,
    ) -> Result<RenderResult> {
        let (tx, rx) = oneshot::channel();
        self.submit(Job::Video(document, duration, platform, tx))?;
        rx.await
            .map_err(|e| Error::Other(format!("Video render canceled: {}", e)))?
    }

    /// Validate `format` and dispatch. Unknown formats fail before any job is queued.
    pub async fn render_format(
        &self,
        document: GeneratedDocument,
        format: &str,
        duration_secs: Option<u64>,
        platform: Option<Platform>,
    ) -> Result<RenderResult> {
        let kind: OutputKind = format.parse()?;
        if kind.is_video() {
            let duration = self.config().video_duration(duration_secs)?;
            self.render_video(document, duration, platform).await
        } else {
            self.render(document, kind, platform).await
        }
    }

    fn submit(&self, job: Job) -> Result<()> {
        self.job_tx
            .send(job)
            .map_err(|_| Error::Other("Render workers have shut down".into()))
    }
}

fn worker_loop(engine: &RenderEngine, jobs: &Mutex<Receiver<Job>>) {
    loop {
        // Hold the lock only while waiting for the next job
        let job = {
            let rx = match jobs.lock() {
                Ok(rx) => rx,
                Err(poisoned) => poisoned.into_inner(),
            };
            rx.recv()
        };

        match job {
            Ok(Job::Render(document, kind, platform, resp)) => {
                let res = engine.render(&document, kind, platform);
                if let Err(e) = &res {
                    error!("Render failed: {}", e);
                }
                let _ = resp.send(res);
            }
            Ok(Job::Video(document, duration, platform, resp)) => {
                let res = engine.render_video(&document, duration, platform);
                if let Err(e) = &res {
                    error!("Video render failed: {}", e);
                }
                let _ = resp.send(res);
            }
            Err(_) => {
                debug!("Render queue closed; worker exiting");
                break;
            }
        }
    }
}
