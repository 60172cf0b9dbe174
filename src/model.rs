//! Core data model.
//!
//! A video is an uploaded source file that gets converted to HLS. It carries
//! its processing status, the produced HLS paths, and upload bookkeeping.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Video
// ---------------------------------------------------------------------------

/// A video tracked through conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Video {
    pub id: Uuid,
    pub title: String,

    /// Source file on the local filesystem.
    pub file_path: String,

    /// Directory holding the HLS segments once converted.
    pub hls_path: Option<String>,

    /// The `.m3u8` playlist once converted.
    pub manifest_path: Option<String>,

    pub s3_url: Option<String>,
    pub s3_manifest_url: Option<String>,

    pub status: VideoStatus,
    pub upload_status: UploadStatus,

    /// Set when `status` is `Failed`.
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Video {
    pub fn new(title: impl Into<String>, file_path: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            file_path: file_path.into(),
            hls_path: None,
            manifest_path: None,
            s3_url: None,
            s3_manifest_url: None,
            status: VideoStatus::Pending,
            upload_status: UploadStatus::None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mark_processing(&mut self) {
        self.status = VideoStatus::Processing;
        self.updated_at = Utc::now();
    }

    pub fn mark_completed(&mut self, hls_path: impl Into<String>, manifest_path: impl Into<String>) {
        self.status = VideoStatus::Completed;
        self.hls_path = Some(hls_path.into());
        self.manifest_path = Some(manifest_path.into());
        self.updated_at = Utc::now();
    }

    pub fn mark_failed(&mut self, error_message: impl Into<String>) {
        self.status = VideoStatus::Failed;
        self.error_message = Some(error_message.into());
        self.updated_at = Utc::now();
    }

    pub fn set_s3_url(&mut self, url: impl Into<String>) {
        self.s3_url = Some(url.into());
        self.updated_at = Utc::now();
    }

    pub fn set_s3_manifest_url(&mut self, url: impl Into<String>) {
        self.s3_manifest_url = Some(url.into());
        self.updated_at = Utc::now();
    }

    pub fn is_completed(&self) -> bool {
        self.status == VideoStatus::Completed
    }

    /// Where converted output for this video goes under `base_dir`.
    pub fn output_path(&self, base_dir: &Path) -> PathBuf {
        converted_dir(base_dir, self.id)
    }
}

/// `{base_dir}/converted/{video_id}`.
pub fn converted_dir(base_dir: &Path, video_id: Uuid) -> PathBuf {
    base_dir.join("converted").join(video_id.to_string())
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Processing status of a video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    /// Registered, conversion not started.
    Pending,
    /// A worker is converting it.
    Processing,
    /// HLS output is ready.
    Completed,
    /// Conversion failed; see `error_message`.
    Failed,
}

impl std::fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            VideoStatus::Pending => "pending",
            VideoStatus::Processing => "processing",
            VideoStatus::Completed => "completed",
            VideoStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for VideoStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(VideoStatus::Pending),
            "processing" => Ok(VideoStatus::Processing),
            "completed" => Ok(VideoStatus::Completed),
            "failed" => Ok(VideoStatus::Failed),
            other => Err(format!("unknown video status: {other}")),
        }
    }
}

/// Progress of pushing converted output to object storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    None,
    PendingS3,
    UploadingS3,
    CompletedS3,
    FailedS3,
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UploadStatus::None => "none",
            UploadStatus::PendingS3 => "pending_s3",
            UploadStatus::UploadingS3 => "uploading_s3",
            UploadStatus::CompletedS3 => "completed_s3",
            UploadStatus::FailedS3 => "failed_s3",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for UploadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(UploadStatus::None),
            "pending_s3" => Ok(UploadStatus::PendingS3),
            "uploading_s3" => Ok(UploadStatus::UploadingS3),
            "completed_s3" => Ok(UploadStatus::CompletedS3),
            "failed_s3" => Ok(UploadStatus::FailedS3),
            other => Err(format!("unknown upload status: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Output files
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    /// `.m3u8` playlist.
    Manifest,
    /// Media segment (anything that is not a playlist).
    Segment,
}

impl FileType {
    /// Classify a produced file by extension.
    pub fn from_path(path: &Path) -> Self {
        if path.extension().is_some_and(|ext| ext == "m3u8") {
            FileType::Manifest
        } else {
            FileType::Segment
        }
    }
}

/// One file produced by a conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFile {
    pub path: PathBuf,
    pub file_type: FileType,
}

impl OutputFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file_type = FileType::from_path(&path);
        Self { path, file_type }
    }
}
