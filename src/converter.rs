//! Video converter: runs HLS conversions on a worker pool and keeps each
//! video's stored status in step.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use opentelemetry::KeyValue;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info};
use uuid::Uuid;

use crate::db::VideoRepository;
use crate::error::Result;
use crate::model::{FileType, OutputFile, VideoStatus, converted_dir};
use crate::pool::{PoolConfig, Processor, WorkerPool};
use crate::telemetry::{metrics, video};
use crate::transcode::Transcoder;

/// One video to convert.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub video_id: Uuid,
    pub input_path: PathBuf,
    /// Defaults to `{output_base}/converted/{video_id}`.
    pub output_dir: Option<PathBuf>,
}

/// Outcome of one conversion.
#[derive(Debug, Clone)]
pub struct ConversionResult {
    pub video_id: Uuid,
    pub success: bool,
    pub error: Option<String>,
    pub output_files: Vec<OutputFile>,
    pub duration: Duration,
}

impl ConversionResult {
    fn failed(video_id: Uuid, error: String, duration: Duration) -> Self {
        Self {
            video_id,
            success: false,
            error: Some(error),
            output_files: Vec::new(),
            duration,
        }
    }
}

/// Configuration for a [`VideoConverter`].
#[derive(Debug, Clone)]
pub struct ConverterConfig {
    /// Passed through to the worker pool.
    pub pool: PoolConfig,
    /// Root for default output directories.
    pub output_base: PathBuf,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::new(3),
            output_base: PathBuf::from("uploads"),
        }
    }
}

/// Runs conversions concurrently on a [`WorkerPool`].
pub struct VideoConverter {
    pool: WorkerPool<ConversionJob, ConversionResult>,
}

impl VideoConverter {
    pub fn new(
        transcoder: Arc<dyn Transcoder>,
        videos: Arc<dyn VideoRepository>,
        config: ConverterConfig,
    ) -> Self {
        let processor = ConversionProcessor {
            transcoder,
            videos,
            output_base: config.output_base,
        };
        Self {
            pool: WorkerPool::new(processor, config.pool),
        }
    }

    /// Start converting jobs from `jobs`. See [`WorkerPool::start`].
    pub fn start_conversion(
        &self,
        cancel: CancellationToken,
        jobs: async_channel::Receiver<ConversionJob>,
    ) -> Result<mpsc::Receiver<ConversionResult>> {
        self.pool.start(cancel, jobs)
    }

    /// Stop the current batch and wait for it to drain.
    pub async fn stop_conversion(&self) -> Result<()> {
        self.pool.stop().await
    }

    pub fn is_running(&self) -> bool {
        self.pool.is_running()
    }

    pub fn pool(&self) -> &WorkerPool<ConversionJob, ConversionResult> {
        &self.pool
    }
}

struct ConversionProcessor {
    transcoder: Arc<dyn Transcoder>,
    videos: Arc<dyn VideoRepository>,
    output_base: PathBuf,
}

#[async_trait]
impl Processor<ConversionJob, ConversionResult> for ConversionProcessor {
    async fn process(&self, cancel: CancellationToken, job: ConversionJob) -> ConversionResult {
        let span = video::start_conversion_span(&job.video_id);
        let result = self.convert(&cancel, job, &span).instrument(span.clone()).await;

        let outcome = if result.success { "ok" } else { "error" };
        metrics::video_conversions().add(1, &[KeyValue::new("result", outcome)]);
        result
    }
}

impl ConversionProcessor {
    async fn convert(
        &self,
        cancel: &CancellationToken,
        job: ConversionJob,
        span: &tracing::Span,
    ) -> ConversionResult {
        let started = Instant::now();
        let video_id = job.video_id;
        info!(%video_id, input = %job.input_path.display(), "video conversion started");

        if let Err(e) = self
            .videos
            .update_status(video_id, VideoStatus::Processing, None)
            .await
        {
            let message = format!("failed to mark video processing: {e}");
            error!(%video_id, error = %e, "status update failed");
            self.mark_failed(video_id, &message).await;
            return ConversionResult::failed(video_id, message, started.elapsed());
        }
        video::record_status_transition(span, "pending", "processing");

        let output_dir = job
            .output_dir
            .unwrap_or_else(|| converted_dir(&self.output_base, video_id));

        let output_files = match self
            .transcoder
            .convert_to_hls(cancel, &job.input_path, &output_dir)
            .await
        {
            Ok(files) => files,
            Err(e) => {
                let message = format!("HLS conversion failed: {e}");
                error!(%video_id, error = %e, "HLS conversion failed");
                self.mark_failed(video_id, &message).await;
                video::record_status_transition(span, "processing", "failed");
                return ConversionResult::failed(video_id, message, started.elapsed());
            }
        };
        video::record_output_files(span, output_files.len());

        if let Some((hls_path, manifest_path)) = hls_locations(&output_files) {
            let hls_path = hls_path.display().to_string();
            let manifest_path = manifest_path.display().to_string();
            if let Err(e) = self
                .videos
                .update_hls_paths(video_id, &hls_path, &manifest_path)
                .await
            {
                error!(%video_id, error = %e, "failed to store HLS paths");
            }
        }

        if let Err(e) = self
            .videos
            .update_status(video_id, VideoStatus::Completed, None)
            .await
        {
            error!(%video_id, error = %e, "failed to mark video completed");
        }
        video::record_status_transition(span, "processing", "completed");

        let duration = started.elapsed();
        info!(
            %video_id,
            duration_ms = duration.as_millis() as u64,
            output_files = output_files.len(),
            "video conversion completed"
        );

        ConversionResult {
            video_id,
            success: true,
            error: None,
            output_files,
            duration,
        }
    }

    async fn mark_failed(&self, video_id: Uuid, message: &str) {
        if let Err(e) = self
            .videos
            .update_status(video_id, VideoStatus::Failed, Some(message))
            .await
        {
            error!(%video_id, error = %e, "failed to mark video failed");
        }
    }
}

/// The first manifest and the directory of the first segment.
///
/// `None` unless both are present.
pub fn hls_locations(files: &[OutputFile]) -> Option<(&Path, &Path)> {
    let manifest = files
        .iter()
        .find(|f| f.file_type == FileType::Manifest)
        .map(|f| f.path.as_path())?;
    let segment_dir = files
        .iter()
        .find(|f| f.file_type == FileType::Segment)
        .and_then(|f| f.path.parent())?;
    Some((segment_dir, manifest))
}
