//! Image generation for persisted sentences.
//!
//! Every job is independent, so a fixed pool of workers drains a shared
//! queue. A failing job never stops its siblings: failures are recorded, the
//! pool is joined, and only then is the first recorded failure returned.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::core::imaging::{ImagePromptDeriver, ImageRenderer};
use crate::core::pipeline::sentences::{RowWindow, row_window};
use crate::core::store::SentenceRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageJob {
    pub sequence_index: usize,
    pub total: usize,
    pub id: u64,
    pub source_sentence: String,
    pub output_path: PathBuf,
}

/// Produces image bytes for one job.
#[async_trait]
pub trait ImageJobRunner: Send + Sync {
    async fn produce(&self, job: &ImageJob) -> Result<Vec<u8>>;
}

/// Prompt derivation followed by rendering.
pub struct RenderingRunner {
    pub deriver: ImagePromptDeriver,
    pub renderer: ImageRenderer,
}

#[async_trait]
impl ImageJobRunner for RenderingRunner {
    async fn produce(&self, job: &ImageJob) -> Result<Vec<u8>> {
        let prompt = self.deriver.derive(&job.source_sentence).await?;
        info!("[{}/{}] #{} prompt: {}", job.sequence_index, job.total, job.id, prompt);
        self.renderer.render(&prompt).await
    }
}

pub fn image_path(images_dir: &Path, id: u64, ext: &str) -> PathBuf {
    images_dir.join(format!("{}.{}", id, ext))
}

/// Window over the records, by position, analogous to the sentence window.
pub fn record_window(total: usize, start: usize, limit: Option<usize>) -> RowWindow {
    row_window(total, start.max(1), limit)
}

/// Jobs for in-window records whose image file does not exist yet.
pub fn plan_image_jobs(
    records: &[SentenceRecord],
    images_dir: &Path,
    ext: &str,
    window: RowWindow,
) -> Vec<ImageJob> {
    let pending: Vec<(&SentenceRecord, PathBuf)> = records
        .iter()
        .enumerate()
        .filter(|(offset, _)| window.contains(offset + 1))
        .map(|(_, record)| (record, image_path(images_dir, record.id, ext)))
        .filter(|(_, path)| !path.exists())
        .collect();

    let total = pending.len();
    pending
        .into_iter()
        .enumerate()
        .map(|(i, (record, output_path))| ImageJob {
            sequence_index: i + 1,
            total,
            id: record.id,
            source_sentence: record.translation.clone(),
            output_path,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRunSummary {
    pub planned: usize,
    pub written: usize,
    pub workers: usize,
}

/// Run `jobs` on `min(concurrency, jobs.len())` workers.
pub async fn run_image_jobs(
    jobs: Vec<ImageJob>,
    runner: Arc<dyn ImageJobRunner>,
    concurrency: usize,
) -> Result<ImageRunSummary> {
    let planned = jobs.len();
    let workers = concurrency.max(1).min(planned);
    if planned == 0 {
        info!("No images to generate");
        return Ok(ImageRunSummary {
            planned,
            written: 0,
            workers,
        });
    }
    info!("Generating {} images with {} workers", planned, workers);

    let queue = Arc::new(Mutex::new(VecDeque::from(jobs)));
    let first_error: Arc<Mutex<Option<anyhow::Error>>> = Arc::new(Mutex::new(None));

    let mut set = JoinSet::new();
    for worker in 0..workers {
        let queue = queue.clone();
        let first_error = first_error.clone();
        let runner = runner.clone();
        set.spawn(async move {
            let mut written = 0usize;
            loop {
                let next = queue.lock().map(|mut q| q.pop_front()).unwrap_or(None);
                let Some(job) = next else { break };
                match run_one(runner.as_ref(), &job).await {
                    Ok(()) => {
                        written += 1;
                        info!(
                            "[{}/{}] worker {} wrote {}",
                            job.sequence_index,
                            job.total,
                            worker,
                            job.output_path.display()
                        );
                    }
                    Err(e) => {
                        error!(
                            "[{}/{}] image job #{} failed: {:#}",
                            job.sequence_index, job.total, job.id, e
                        );
                        if let Ok(mut slot) = first_error.lock()
                            && slot.is_none()
                        {
                            *slot = Some(e.context(format!("image job #{} failed", job.id)));
                        }
                    }
                }
            }
            written
        });
    }

    let mut written = 0;
    let mut panicked = None;
    while let Some(res) = set.join_next().await {
        match res {
            Ok(n) => written += n,
            Err(e) => panicked = Some(anyhow!("image worker panicked: {}", e)),
        }
    }

    let recorded = first_error.lock().ok().and_then(|mut slot| slot.take());
    if let Some(err) = recorded.or(panicked) {
        return Err(err);
    }
    Ok(ImageRunSummary {
        planned,
        written,
        workers,
    })
}

/// Produce and write one image. Bytes land in a `.part` file that is renamed
/// into place, so only complete images count as done.
async fn run_one(runner: &dyn ImageJobRunner, job: &ImageJob) -> Result<()> {
    let bytes = runner.produce(job).await?;
    if let Some(parent) = job.output_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let mut partial = job.output_path.clone().into_os_string();
    partial.push(".part");
    let partial = PathBuf::from(partial);
    if let Err(e) = write_then_rename(&partial, &job.output_path, &bytes).await {
        if let Err(cleanup) = tokio::fs::remove_file(&partial).await
            && cleanup.kind() != std::io::ErrorKind::NotFound
        {
            warn!("Failed to remove {}: {}", partial.display(), cleanup);
        }
        return Err(e);
    }
    Ok(())
}

async fn write_then_rename(partial: &Path, target: &Path, bytes: &[u8]) -> Result<()> {
    tokio::fs::write(partial, bytes)
        .await
        .with_context(|| format!("Failed to write {}", partial.display()))?;
    tokio::fs::rename(partial, target)
        .await
        .with_context(|| format!("Failed to move image into {}", target.display()))?;
    Ok(())
}
