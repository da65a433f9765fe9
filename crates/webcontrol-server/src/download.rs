//! Download manager
//!
//! Each `downloadFile` becomes an independent tokio task that streams the
//! response body to disk and reports through its own event channel:
//!
//! ```text
//!   Started ─► Progress(p)* ─► Completed ─► Refreshed(kind, files)
//!                          └─► Failed
//! ```
//!
//! Jobs never touch the frame queue.  All jobs share one parent cancellation
//! token; `shutdown()` cancels whatever is in flight.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::Mutex;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use webcontrol_proto::config::DownloadConfig;
use webcontrol_proto::protocol::{MODEL_EXTENSIONS, VIDEO_EXTENSIONS};

use crate::error::DownloadError;
use crate::filesystem::{list_with_extras, sanitize_filename, ContentKind, ContentRoots};

/// A fetch request as validated from `downloadFile`.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    pub filename: String,
    pub folder: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DownloadEvent {
    Started,
    Progress(u8),
    Completed { path: PathBuf },
    /// `progress` is the last percentage reported before the failure.
    Failed { message: String, progress: u8 },
    /// Fresh listing of the content root the file landed in.
    Refreshed { kind: ContentKind, files: Vec<String> },
}

/// Smallest spacing between two progress events, whatever the config asks for.
pub const MIN_PROGRESS_STEP: u8 = 5;

/// Emits a progress value only once it has moved `step` points past the last
/// emitted one.  100 is left to the terminal event.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    step: u8,
    last: u8,
}

impl ProgressThrottle {
    pub fn new(step: u8) -> Self {
        Self {
            step: step.max(MIN_PROGRESS_STEP),
            last: 0,
        }
    }

    pub fn observe(&mut self, percent: u8) -> Option<u8> {
        if percent >= 100 || percent < self.last.saturating_add(self.step) {
            return None;
        }
        self.last = percent;
        Some(percent)
    }

    pub fn last(&self) -> u8 {
        self.last
    }
}

/// Handle to one running download.  Dropping it does not stop the job.
pub struct DownloadJob {
    pub id: u64,
    pub filename: String,
    pub folder: String,
    events: mpsc::UnboundedReceiver<DownloadEvent>,
    cancel: CancellationToken,
}

impl DownloadJob {
    /// Next lifecycle event; `None` once the job has finished and every
    /// event has been read.
    pub async fn next_event(&mut self) -> Option<DownloadEvent> {
        self.events.recv().await
    }

    /// Stop this job only; it ends with a `Failed` event.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

pub struct DownloadManager {
    client: Client,
    roots: Arc<ContentRoots>,
    progress_step: u8,
    parent: Mutex<CancellationToken>,
    next_id: AtomicU64,
    active: Arc<AtomicUsize>,
}

impl DownloadManager {
    pub fn new(config: &DownloadConfig, roots: Arc<ContentRoots>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        Ok(Self {
            client,
            roots,
            progress_step: config.progress_step,
            parent: Mutex::new(CancellationToken::new()),
            next_id: AtomicU64::new(1),
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn active_jobs(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Cancel every in-flight job.  Jobs started afterwards run normally.
    pub fn shutdown(&self) {
        let old = std::mem::replace(&mut *self.parent.lock(), CancellationToken::new());
        old.cancel();
    }

    /// Spawn a job on the current tokio runtime and return its handle.
    /// `Started` is already queued on the handle when this returns.
    pub fn start(&self, request: DownloadRequest) -> DownloadJob {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = self.parent.lock().child_token();
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(DownloadEvent::Started);

        let job = JobContext {
            id,
            client: self.client.clone(),
            roots: self.roots.clone(),
            step: self.progress_step,
            cancel: cancel.clone(),
            events: tx,
        };
        let active = self.active.clone();
        let filename = request.filename.clone();
        let folder = request.folder.clone();

        active.fetch_add(1, Ordering::Relaxed);
        tokio::spawn(async move {
            job.run(request).await;
            active.fetch_sub(1, Ordering::Relaxed);
        });

        DownloadJob {
            id,
            filename,
            folder,
            events: rx,
            cancel,
        }
    }
}

struct JobContext {
    id: u64,
    client: Client,
    roots: Arc<ContentRoots>,
    step: u8,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<DownloadEvent>,
}

impl JobContext {
    fn emit(&self, event: DownloadEvent) {
        // Nobody listening any more is fine: the job still runs to completion
        let _ = self.events.send(event);
    }

    async fn run(self, request: DownloadRequest) {
        let mut throttle = ProgressThrottle::new(self.step);

        let Some(name) = sanitize_filename(&request.filename) else {
            let err = DownloadError::InvalidFilename(request.filename.clone());
            warn!("Download {} rejected: {}", self.id, err);
            self.emit(DownloadEvent::Failed {
                message: err.to_string(),
                progress: 0,
            });
            return;
        };

        let kind = ContentRoots::classify(&request.folder, &name);
        let target_dir = self.roots.download_dir(&request.folder, kind);
        let dest = target_dir.join(&name);
        let part = target_dir.join(format!(".{}.{}.part", name, self.id));

        info!(
            "Download {} started: {} -> {}",
            self.id,
            request.url,
            dest.display()
        );

        match self.fetch(&request.url, &dest, &part, &mut throttle).await {
            Ok(bytes) => {
                info!("Download {} complete: {} ({} bytes)", self.id, dest.display(), bytes);
                self.emit(DownloadEvent::Completed { path: dest });
                self.refresh(kind).await;
            }
            Err(e) => {
                warn!("Download {} of {} failed: {}", self.id, request.url, e);
                if let Err(rm) = tokio::fs::remove_file(&part).await {
                    if rm.kind() != std::io::ErrorKind::NotFound {
                        debug!("Could not remove {}: {}", part.display(), rm);
                    }
                }
                self.emit(DownloadEvent::Failed {
                    message: e.to_string(),
                    progress: throttle.last(),
                });
            }
        }
    }

    /// Stream `url` into `part`, then move it onto `dest`.
    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        part: &Path,
        throttle: &mut ProgressThrottle,
    ) -> Result<u64, DownloadError> {
        let response = tokio::select! {
            _ = self.cancel.cancelled() => return Err(DownloadError::Cancelled),
            r = self.client.get(url).send() => r?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status(status));
        }

        let total = response.content_length().filter(|&n| n > 0);
        if let Some(parent) = part.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(part).await?;
        let mut stream = response.bytes_stream();
        let mut received: u64 = 0;

        loop {
            let chunk = tokio::select! {
                _ = self.cancel.cancelled() => return Err(DownloadError::Cancelled),
                c = stream.next() => c,
            };
            let Some(chunk) = chunk else {
                break;
            };
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            received += chunk.len() as u64;

            if let Some(total) = total {
                let percent = (received.saturating_mul(100) / total).min(100) as u8;
                if let Some(p) = throttle.observe(percent) {
                    self.emit(DownloadEvent::Progress(p));
                }
            }
        }

        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(part, dest).await?;
        Ok(received)
    }

    async fn refresh(&self, kind: ContentKind) {
        let roots = self.roots.clone();
        let listing = tokio::task::spawn_blocking(move || match kind {
            ContentKind::Video => list_with_extras(&roots.videos, VIDEO_EXTENSIONS, &roots.stream_urls),
            ContentKind::Model => list_with_extras(&roots.models, MODEL_EXTENSIONS, &[]),
        })
        .await;

        match listing {
            Ok(files) => self.emit(DownloadEvent::Refreshed { kind, files }),
            Err(e) => warn!("Download {}: listing refresh failed: {}", self.id, e),
        }
    }
}
