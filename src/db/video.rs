//! Video persistence: status tracking, HLS paths, upload bookkeeping.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{UploadStatus, Video, VideoStatus};

/// Operations the converter and CLI need from video storage.
///
/// Every update targets a live (not soft-deleted) row and fails with
/// [`Error::NotFound`] otherwise.
#[async_trait]
pub trait VideoRepository: Send + Sync {
    async fn create(&self, video: &Video) -> Result<()>;

    async fn find_by_id(&self, id: Uuid) -> Result<Video>;

    /// Newest first. `page` starts at 1; `page < 1` is treated as 1 and
    /// `page_size < 1` as 10.
    async fn list(&self, page: i64, page_size: i64) -> Result<Vec<Video>>;

    async fn update_status(
        &self,
        id: Uuid,
        status: VideoStatus,
        error_message: Option<&str>,
    ) -> Result<()>;

    async fn update_hls_paths(&self, id: Uuid, hls_path: &str, manifest_path: &str) -> Result<()>;

    async fn update_upload_status(&self, id: Uuid, upload_status: UploadStatus) -> Result<()>;

    async fn update_s3_urls(&self, id: Uuid, s3_url: &str, s3_manifest_url: &str) -> Result<()>;

    /// Soft delete.
    async fn delete(&self, id: Uuid) -> Result<()>;
}

/// Normalize pagination input into `(limit, offset)`.
pub(crate) fn page_bounds(page: i64, page_size: i64) -> (i64, i64) {
    let page = page.max(1);
    let page_size = if page_size < 1 { 10 } else { page_size };
    (page_size, (page - 1) * page_size)
}

const VIDEO_COLUMNS: &str = "id, title, file_path, hls_path, manifest_path, s3_url, s3_manifest_url, status, upload_status, error_message, created_at, updated_at";

#[async_trait]
impl VideoRepository for super::Db {
    async fn create(&self, video: &Video) -> Result<()> {
        sqlx::query(
            "INSERT INTO videos (id, title, file_path, hls_path, manifest_path, s3_url, s3_manifest_url, status, upload_status, error_message, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(video.id)
        .bind(&video.title)
        .bind(&video.file_path)
        .bind(&video.hls_path)
        .bind(&video.manifest_path)
        .bind(&video.s3_url)
        .bind(&video.s3_manifest_url)
        .bind(video.status.to_string())
        .bind(video.upload_status.to_string())
        .bind(&video.error_message)
        .bind(video.created_at)
        .bind(video.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Video> {
        let row: Option<VideoRow> = sqlx::query_as(&format!(
            "SELECT {VIDEO_COLUMNS} FROM videos WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| Error::NotFound(id.to_string()))?
            .try_into_video()
    }

    async fn list(&self, page: i64, page_size: i64) -> Result<Vec<Video>> {
        let (limit, offset) = page_bounds(page, page_size);
        let rows: Vec<VideoRow> = sqlx::query_as(&format!(
            "SELECT {VIDEO_COLUMNS} FROM videos WHERE deleted_at IS NULL
             ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(VideoRow::try_into_video).collect()
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: VideoStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        let rows_affected = sqlx::query(
            "UPDATE videos SET status = $1, error_message = $2, updated_at = $3
             WHERE id = $4 AND deleted_at IS NULL",
        )
        .bind(status.to_string())
        .bind(error_message)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        expect_one(rows_affected, id)
    }

    async fn update_hls_paths(&self, id: Uuid, hls_path: &str, manifest_path: &str) -> Result<()> {
        let rows_affected = sqlx::query(
            "UPDATE videos SET hls_path = $1, manifest_path = $2, updated_at = $3
             WHERE id = $4 AND deleted_at IS NULL",
        )
        .bind(hls_path)
        .bind(manifest_path)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        expect_one(rows_affected, id)
    }

    async fn update_upload_status(&self, id: Uuid, upload_status: UploadStatus) -> Result<()> {
        let rows_affected = sqlx::query(
            "UPDATE videos SET upload_status = $1, updated_at = $2
             WHERE id = $3 AND deleted_at IS NULL",
        )
        .bind(upload_status.to_string())
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        expect_one(rows_affected, id)
    }

    async fn update_s3_urls(&self, id: Uuid, s3_url: &str, s3_manifest_url: &str) -> Result<()> {
        let rows_affected = sqlx::query(
            "UPDATE videos SET s3_url = $1, s3_manifest_url = $2, updated_at = $3
             WHERE id = $4 AND deleted_at IS NULL",
        )
        .bind(s3_url)
        .bind(s3_manifest_url)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        expect_one(rows_affected, id)
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let rows_affected = sqlx::query(
            "UPDATE videos SET deleted_at = $1 WHERE id = $2 AND deleted_at IS NULL",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        expect_one(rows_affected, id)
    }
}

fn expect_one(rows_affected: u64, id: Uuid) -> Result<()> {
    if rows_affected == 0 {
        return Err(Error::NotFound(id.to_string()));
    }
    Ok(())
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct VideoRow {
    id: Uuid,
    title: String,
    file_path: String,
    hls_path: Option<String>,
    manifest_path: Option<String>,
    s3_url: Option<String>,
    s3_manifest_url: Option<String>,
    status: String,
    upload_status: String,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl VideoRow {
    fn try_into_video(self) -> Result<Video> {
        Ok(Video {
            id: self.id,
            title: self.title,
            file_path: self.file_path,
            hls_path: self.hls_path,
            manifest_path: self.manifest_path,
            s3_url: self.s3_url,
            s3_manifest_url: self.s3_manifest_url,
            status: self.status.parse().map_err(Error::Other)?,
            upload_status: self.upload_status.parse().map_err(Error::Other)?,
            error_message: self.error_message,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
