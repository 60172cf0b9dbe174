//! Converter tests against an in-memory repository and a fake transcoder.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use vidpool::converter::{ConversionJob, ConversionResult, ConverterConfig, VideoConverter};
use vidpool::db::VideoRepository;
use vidpool::error::{Error, Result};
use vidpool::model::{OutputFile, UploadStatus, Video, VideoStatus};
use vidpool::pool::PoolConfig;
use vidpool::transcode::Transcoder;

#[derive(Default)]
struct MemoryVideos {
    videos: Mutex<HashMap<Uuid, Video>>,
}

impl MemoryVideos {
    fn with(videos: &[Video]) -> Arc<Self> {
        let repo = Self::default();
        for v in videos {
            repo.videos.lock().unwrap().insert(v.id, v.clone());
        }
        Arc::new(repo)
    }

    fn get(&self, id: Uuid) -> Video {
        self.videos.lock().unwrap()[&id].clone()
    }

    fn update(&self, id: Uuid, f: impl FnOnce(&mut Video)) -> Result<()> {
        let mut videos = self.videos.lock().unwrap();
        let video = videos
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        f(video);
        Ok(())
    }
}

#[async_trait]
impl VideoRepository for MemoryVideos {
    async fn create(&self, video: &Video) -> Result<()> {
        self.videos.lock().unwrap().insert(video.id, video.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Video> {
        self.videos
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    async fn list(&self, _page: i64, _page_size: i64) -> Result<Vec<Video>> {
        Ok(self.videos.lock().unwrap().values().cloned().collect())
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: VideoStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        self.update(id, |v| {
            v.status = status;
            v.error_message = error_message.map(str::to_string);
        })
    }

    async fn update_hls_paths(&self, id: Uuid, hls_path: &str, manifest_path: &str) -> Result<()> {
        self.update(id, |v| {
            v.hls_path = Some(hls_path.to_string());
            v.manifest_path = Some(manifest_path.to_string());
        })
    }

    async fn update_upload_status(&self, id: Uuid, upload_status: UploadStatus) -> Result<()> {
        self.update(id, |v| v.upload_status = upload_status)
    }

    async fn update_s3_urls(&self, id: Uuid, s3_url: &str, s3_manifest_url: &str) -> Result<()> {
        self.update(id, |v| {
            v.s3_url = Some(s3_url.to_string());
            v.s3_manifest_url = Some(s3_manifest_url.to_string());
        })
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.videos
            .lock()
            .unwrap()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }
}

/// Pretends to transcode: inputs named `broken.mp4` fail, everything else
/// yields a manifest plus two segments in the requested directory.
#[derive(Default)]
struct FakeTranscoder {
    calls: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn convert_to_hls(
        &self,
        cancel: &CancellationToken,
        input: &Path,
        output_dir: &Path,
    ) -> Result<Vec<OutputFile>> {
        self.calls.lock().unwrap().push(output_dir.to_path_buf());
        if cancel.is_cancelled() {
            return Err(Error::Transcode("conversion cancelled".to_string()));
        }
        if input.ends_with("broken.mp4") {
            return Err(Error::Transcode("ffmpeg exited with status 1".to_string()));
        }
        Ok(vec![
            OutputFile::new(output_dir.join("playlist.m3u8")),
            OutputFile::new(output_dir.join("playlist0.ts")),
            OutputFile::new(output_dir.join("playlist1.ts")),
        ])
    }
}

fn converter(
    transcoder: Arc<FakeTranscoder>,
    videos: Arc<MemoryVideos>,
    workers: usize,
) -> VideoConverter {
    VideoConverter::new(
        transcoder,
        videos,
        ConverterConfig {
            pool: PoolConfig::new(workers),
            output_base: PathBuf::from("/srv/uploads"),
        },
    )
}

fn job(video: &Video) -> ConversionJob {
    ConversionJob {
        video_id: video.id,
        input_path: PathBuf::from(&video.file_path),
        output_dir: None,
    }
}

async fn run_all(converter: &VideoConverter, jobs: Vec<ConversionJob>) -> Vec<ConversionResult> {
    let (tx, rx) = async_channel::bounded(jobs.len().max(1));
    let mut results = converter
        .start_conversion(CancellationToken::new(), rx)
        .unwrap();
    for j in jobs {
        tx.send(j).await.unwrap();
    }
    drop(tx);

    let mut out = Vec::new();
    while let Some(r) = results.recv().await {
        out.push(r);
    }
    out
}

#[tokio::test]
async fn successful_conversion_completes_video() {
    let video = Video::new("Intro", "/media/intro.mp4");
    let videos = MemoryVideos::with(std::slice::from_ref(&video));
    let transcoder = Arc::new(FakeTranscoder::default());
    let converter = converter(transcoder.clone(), videos.clone(), 2);

    let results = run_all(&converter, vec![job(&video)]).await;
    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(result.video_id, video.id);
    assert_eq!(result.output_files.len(), 3);

    let expected_dir = Path::new("/srv/uploads/converted").join(video.id.to_string());
    assert_eq!(*transcoder.calls.lock().unwrap(), vec![expected_dir.clone()]);

    let stored = videos.get(video.id);
    assert_eq!(stored.status, VideoStatus::Completed);
    assert_eq!(
        stored.hls_path.as_deref(),
        Some(expected_dir.display().to_string().as_str())
    );
    assert_eq!(
        stored.manifest_path.as_deref(),
        Some(expected_dir.join("playlist.m3u8").display().to_string().as_str())
    );
    assert!(stored.error_message.is_none());
    assert!(!converter.is_running());
}

#[tokio::test]
async fn failed_transcode_marks_video_failed() {
    let video = Video::new("Broken", "/media/broken.mp4");
    let videos = MemoryVideos::with(std::slice::from_ref(&video));
    let converter = converter(Arc::new(FakeTranscoder::default()), videos.clone(), 1);

    let results = run_all(&converter, vec![job(&video)]).await;
    let result = &results[0];
    assert!(!result.success);
    assert!(result.output_files.is_empty());
    let error = result.error.as_deref().unwrap();
    assert!(error.contains("HLS conversion failed"), "got {error}");

    let stored = videos.get(video.id);
    assert_eq!(stored.status, VideoStatus::Failed);
    assert!(stored.error_message.unwrap().contains("status 1"));
    assert!(stored.hls_path.is_none());
}

#[tokio::test]
async fn unknown_video_fails_before_transcoding() {
    let videos = MemoryVideos::with(&[]);
    let transcoder = Arc::new(FakeTranscoder::default());
    let converter = converter(transcoder.clone(), videos, 1);

    let orphan = ConversionJob {
        video_id: Uuid::new_v4(),
        input_path: PathBuf::from("/media/orphan.mp4"),
        output_dir: None,
    };
    let results = run_all(&converter, vec![orphan]).await;
    assert!(!results[0].success);
    assert!(transcoder.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn batch_reports_each_video_once() {
    let good: Vec<Video> = (0..5)
        .map(|i| Video::new(format!("clip {i}"), format!("/media/clip{i}.mp4")))
        .collect();
    let bad = Video::new("Broken", "/media/broken.mp4");
    let mut all = good.clone();
    all.push(bad.clone());

    let videos = MemoryVideos::with(&all);
    let converter = converter(Arc::new(FakeTranscoder::default()), videos.clone(), 3);

    let results = run_all(&converter, all.iter().map(job).collect()).await;
    assert_eq!(results.len(), 6);
    assert_eq!(results.iter().filter(|r| r.success).count(), 5);
    for v in &good {
        assert_eq!(videos.get(v.id).status, VideoStatus::Completed);
    }
    assert_eq!(videos.get(bad.id).status, VideoStatus::Failed);
}

#[tokio::test]
async fn explicit_output_dir_is_used() {
    let video = Video::new("Intro", "/media/intro.mp4");
    let videos = MemoryVideos::with(std::slice::from_ref(&video));
    let transcoder = Arc::new(FakeTranscoder::default());
    let converter = converter(transcoder.clone(), videos, 1);

    let mut j = job(&video);
    j.output_dir = Some(PathBuf::from("/tmp/hls/intro"));
    run_all(&converter, vec![j]).await;

    assert_eq!(
        *transcoder.calls.lock().unwrap(),
        vec![PathBuf::from("/tmp/hls/intro")]
    );
}

#[tokio::test]
async fn stop_conversion_outside_a_batch_is_rejected() {
    let converter = converter(
        Arc::new(FakeTranscoder::default()),
        MemoryVideos::with(&[]),
        1,
    );
    assert!(matches!(
        converter.stop_conversion().await,
        Err(Error::NotRunning(_))
    ));
}

#[tokio::test]
async fn stop_conversion_ends_an_open_batch() {
    let converter = converter(
        Arc::new(FakeTranscoder::default()),
        MemoryVideos::with(&[]),
        2,
    );
    let (_tx, rx) = async_channel::bounded::<ConversionJob>(1);
    let mut results = converter
        .start_conversion(CancellationToken::new(), rx)
        .unwrap();
    assert!(converter.is_running());

    tokio::time::timeout(Duration::from_secs(5), converter.stop_conversion())
        .await
        .unwrap()
        .unwrap();
    assert!(results.recv().await.is_none());
    assert!(!converter.is_running());
}
