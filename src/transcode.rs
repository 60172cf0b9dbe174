//! HLS transcoding via an external ffmpeg binary.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::model::OutputFile;

/// Name of the playlist written into every output directory.
pub const MANIFEST_NAME: &str = "playlist.m3u8";

/// Converts a source video into an HLS playlist plus segments.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Convert `input` into `output_dir`, returning every file found there
    /// afterwards. Fails without doing any work if `cancel` already fired.
    async fn convert_to_hls(
        &self,
        cancel: &CancellationToken,
        input: &Path,
        output_dir: &Path,
    ) -> Result<Vec<OutputFile>>;
}

/// Encoder parameters for HLS output.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HlsSettings {
    /// Target segment duration in seconds.
    pub segment_seconds: u32,
    /// Playlist length; 0 keeps every segment.
    pub list_size: u32,
    pub video_codec: String,
    pub audio_codec: String,
    pub audio_bitrate: String,
}

impl Default for HlsSettings {
    fn default() -> Self {
        Self {
            segment_seconds: 10,
            list_size: 0,
            video_codec: "h264".to_string(),
            audio_codec: "aac".to_string(),
            audio_bitrate: "128k".to_string(),
        }
    }
}

/// Top-level TOML wrapper.
#[derive(Debug, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    hls: HlsSettings,
}

impl HlsSettings {
    /// Load the `[hls]` table from a TOML file. Missing keys keep their defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read settings file {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
            .map_err(|e| Error::Config(format!("bad settings file {}: {e}", path.display())))
    }

    fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        let file: SettingsFile = toml::from_str(content)?;
        Ok(file.hls)
    }

    /// ffmpeg arguments converting `input` into `manifest`.
    pub fn ffmpeg_args(&self, input: &Path, manifest: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-i".to_string(),
            input.display().to_string(),
            "-f".to_string(),
            "hls".to_string(),
            "-hls_time".to_string(),
            self.segment_seconds.to_string(),
            "-hls_list_size".to_string(),
            self.list_size.to_string(),
            "-c:v".to_string(),
            self.video_codec.clone(),
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
            manifest.display().to_string(),
        ]
    }
}

/// [`Transcoder`] that shells out to ffmpeg.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    binary: PathBuf,
    settings: HlsSettings,
}

impl FfmpegTranscoder {
    pub fn new(binary: impl Into<PathBuf>, settings: HlsSettings) -> Self {
        Self {
            binary: binary.into(),
            settings,
        }
    }

    async fn run_ffmpeg(
        &self,
        cancel: &CancellationToken,
        input: &Path,
        output_dir: &Path,
    ) -> Result<()> {
        let manifest = output_dir.join(MANIFEST_NAME);
        let args = self.settings.ffmpeg_args(input, &manifest);
        debug!(
            binary = %self.binary.display(),
            input = %input.display(),
            manifest = %manifest.display(),
            "running ffmpeg"
        );

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::Transcode(format!("cannot start {}: {e}", self.binary.display()))
            })?;
        let stderr = child.stderr.take();
        let stderr_tail = tokio::spawn(read_tail(stderr));

        let status = tokio::select! {
            _ = cancel.cancelled() => {
                warn!(input = %input.display(), "conversion cancelled, killing ffmpeg");
                let _ = child.kill().await;
                return Err(Error::Transcode("conversion cancelled".to_string()));
            }
            status = child.wait() => status?,
        };

        if status.success() {
            return Ok(());
        }
        let tail = stderr_tail.await.unwrap_or_default();
        Err(Error::Transcode(format!(
            "ffmpeg exited with status {}: {tail}",
            status.code().unwrap_or(-1)
        )))
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn convert_to_hls(
        &self,
        cancel: &CancellationToken,
        input: &Path,
        output_dir: &Path,
    ) -> Result<Vec<OutputFile>> {
        if cancel.is_cancelled() {
            return Err(Error::Transcode("conversion cancelled".to_string()));
        }

        tokio::fs::create_dir_all(output_dir).await?;
        self.run_ffmpeg(cancel, input, output_dir).await?;
        collect_output_files(output_dir).await
    }
}

/// List the files in `output_dir`, classified as manifest or segment.
/// Sorted by path.
pub async fn collect_output_files(output_dir: &Path) -> Result<Vec<OutputFile>> {
    let mut entries = tokio::fs::read_dir(output_dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(OutputFile::new(entry.path()));
        }
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

/// Keep the last few lines of ffmpeg's stderr for error messages.
async fn read_tail(stderr: Option<tokio::process::ChildStderr>) -> String {
    use tokio::io::AsyncBufReadExt as _;

    const KEEP: usize = 5;
    let Some(stderr) = stderr else {
        return String::new();
    };
    let mut lines = tokio::io::BufReader::new(stderr).lines();
    let mut tail = std::collections::VecDeque::with_capacity(KEEP);
    while let Ok(Some(line)) = lines.next_line().await {
        if tail.len() == KEEP {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    Vec::from(tail).join(" | ")
}
