//! vidpool CLI: operator interface to the conversion service.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use rand::Rng;
use secrecy::ExposeSecret;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;
use vidpool::config::{Config, log_level_from_env};
use vidpool::converter::{ConversionJob, ConverterConfig, VideoConverter};
use vidpool::db::{Db, VideoRepository};
use vidpool::model::Video;
use vidpool::pool::{PoolConfig, WorkerPool};
use vidpool::telemetry::{TelemetryConfig, TracingSink, init_telemetry, start_run_span};
use vidpool::transcode::{FfmpegTranscoder, HlsSettings};

#[derive(Parser)]
#[command(name = "vidpool", about = "Concurrent video-to-HLS conversion")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the numeric worker pool demo (no database needed)
    Demo {
        /// Number of jobs to submit
        #[arg(long, default_value_t = 20)]
        jobs: u32,
        /// Worker count; non-positive values become 1
        #[arg(long, default_value_t = 3, allow_negative_numbers = true)]
        workers: i64,
        /// Input buffer size
        #[arg(long, default_value_t = 10)]
        buffer: usize,
        /// Output buffer size; 0 becomes 1
        #[arg(long, default_value_t = 1)]
        result_buffer: usize,
    },
    /// Convert stored videos to HLS
    Convert {
        /// TOML file with an [hls] table
        #[arg(long)]
        settings: Option<PathBuf>,
        /// Video IDs to convert
        #[arg(required = true)]
        ids: Vec<Uuid>,
    },
    /// Video record operations
    Video {
        #[command(subcommand)]
        action: VideoAction,
    },
}

#[derive(Subcommand)]
enum VideoAction {
    /// Register a source video
    Add {
        title: String,
        /// Path to the source file
        file: PathBuf,
    },
    /// List videos, newest first
    List {
        #[arg(long, default_value_t = 1)]
        page: i64,
        #[arg(long, default_value_t = 20)]
        page_size: i64,
    },
    /// Show a video
    Show {
        id: Uuid,
        /// Print the record as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        on_signal.cancel();
    });

    match cli.command {
        Command::Demo {
            jobs,
            workers,
            buffer,
            result_buffer,
        } => {
            let _guard = init_telemetry(TelemetryConfig {
                endpoint: std::env::var("OTEL_ENDPOINT").ok(),
                service_name: "vidpool-demo".to_string(),
                log_level: log_level_from_env(),
            })?;
            cmd_demo(cancel, jobs, workers, buffer, result_buffer).await
        }
        Command::Convert { settings, ids } => {
            let config = Config::from_env()?;
            let _guard = init_telemetry(TelemetryConfig {
                endpoint: config.otel_endpoint.clone(),
                service_name: "vidpool".to_string(),
                log_level: config.log_level.clone(),
            })?;
            let db = connect(&config).await?;
            cmd_convert(&config, db, cancel, settings, ids).await
        }
        Command::Video { action } => {
            let config = Config::from_env()?;
            let db = connect(&config).await?;
            match action {
                VideoAction::Add { title, file } => cmd_video_add(&db, title, file).await,
                VideoAction::List { page, page_size } => {
                    cmd_video_list(&db, page, page_size).await
                }
                VideoAction::Show { id, json } => cmd_video_show(&db, id, json).await,
            }
        }
    }
}

async fn connect(config: &Config) -> anyhow::Result<Db> {
    let db = Db::connect(config.database_url.expose_secret()).await?;
    db.migrate().await?;
    Ok(db)
}

/// A demo job result: which job, and which worker lane it hashed to.
struct Numbered {
    value: u32,
    lane: u32,
    finished_at: chrono::DateTime<chrono::Utc>,
}

async fn cmd_demo(
    cancel: CancellationToken,
    jobs: u32,
    workers: i64,
    buffer: usize,
    result_buffer: usize,
) -> anyhow::Result<()> {
    let pool = WorkerPool::from_fn(
        |_cancel: CancellationToken, value: u32| async move {
            let millis = rand::thread_rng().gen_range(100..500);
            tokio::time::sleep(Duration::from_millis(millis)).await;
            Numbered {
                value,
                lane: value % 3,
                finished_at: chrono::Utc::now(),
            }
        },
        PoolConfig::new(PoolConfig::coerce_worker_count(workers))
            .with_result_buffer(result_buffer)
            .with_sink(Arc::new(TracingSink::new("demo"))),
    );

    let (tx, rx) = async_channel::bounded(buffer.max(1));
    let mut results = pool.start(cancel, rx)?;
    println!("Starting pool with {} workers for {jobs} numbers", pool.worker_count());

    tokio::spawn(async move {
        for value in 0..jobs {
            if tx.send(value).await.is_err() {
                break;
            }
        }
        // tx dropped here: input closes once drained
    });

    let received = async {
        let mut received = 0;
        while let Some(r) = results.recv().await {
            println!(
                "Number: {:>3}, Lane: {}, Finished: {}",
                r.value,
                r.lane,
                r.finished_at.format("%H:%M:%S%.3f")
            );
            received += 1;
        }
        received
    }
    .instrument(start_run_span("demo", pool.worker_count()))
    .await;

    let stats = pool.stats();
    println!(
        "\nPool drained: {received}/{jobs} results, {} dropped",
        stats.results_dropped
    );
    Ok(())
}

async fn cmd_convert(
    config: &Config,
    db: Db,
    cancel: CancellationToken,
    settings: Option<PathBuf>,
    ids: Vec<Uuid>,
) -> anyhow::Result<()> {
    let settings = match settings {
        Some(path) => HlsSettings::load_from_file(&path)?,
        None => HlsSettings::default(),
    };
    let transcoder = FfmpegTranscoder::new(&config.ffmpeg_path, settings);
    let db = Arc::new(db);

    let mut jobs = Vec::with_capacity(ids.len());
    for id in ids {
        let video = db.find_by_id(id).await?;
        jobs.push(ConversionJob {
            video_id: video.id,
            input_path: PathBuf::from(&video.file_path),
            output_dir: Some(video.output_path(&config.output_base_dir)),
        });
    }
    let total = jobs.len();

    let converter = VideoConverter::new(
        Arc::new(transcoder),
        db,
        ConverterConfig {
            pool: PoolConfig::new(config.worker_count)
                .with_sink(Arc::new(TracingSink::new("converter"))),
            output_base: config.output_base_dir.clone(),
        },
    );

    let (tx, rx) = async_channel::bounded(total.max(1));
    let mut results = converter.start_conversion(cancel, rx)?;
    for job in jobs {
        tx.send(job).await?;
    }
    drop(tx);

    let failed = async {
        let mut failed = 0;
        while let Some(result) = results.recv().await {
            if result.success {
                println!(
                    "{}  ok      {} file(s) in {:.1}s",
                    result.video_id,
                    result.output_files.len(),
                    result.duration.as_secs_f64()
                );
            } else {
                failed += 1;
                println!(
                    "{}  failed  {}",
                    result.video_id,
                    result.error.as_deref().unwrap_or("-")
                );
            }
        }
        failed
    }
    .instrument(start_run_span("converter", converter.pool().worker_count()))
    .await;

    let stats = converter.pool().stats();
    println!(
        "\n{} of {total} converted, {failed} failed, {} interrupted",
        stats.results_delivered as usize - failed,
        stats.results_dropped
    );
    Ok(())
}

async fn cmd_video_add(db: &Db, title: String, file: PathBuf) -> anyhow::Result<()> {
    let file = std::fs::canonicalize(&file)
        .map_err(|e| anyhow::anyhow!("cannot resolve {}: {e}", file.display()))?;
    let video = Video::new(title, file.display().to_string());
    db.create(&video).await?;
    println!("Created: {} (status: {})", video.id, video.status);
    Ok(())
}

async fn cmd_video_list(db: &Db, page: i64, page_size: i64) -> anyhow::Result<()> {
    let videos = db.list(page, page_size).await?;
    if videos.is_empty() {
        println!("No videos found.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<10}  {:<12}  {:<30}  CREATED",
        "ID", "STATUS", "UPLOAD", "TITLE"
    );
    println!("{}", "-".repeat(110));
    for video in &videos {
        let title: String = video.title.chars().take(30).collect();
        println!(
            "{:<36}  {:<10}  {:<12}  {:<30}  {}",
            video.id,
            video.status,
            video.upload_status,
            title,
            video.created_at.format("%Y-%m-%d %H:%M")
        );
    }
    println!("\n{} video(s)", videos.len());
    Ok(())
}

async fn cmd_video_show(db: &Db, id: Uuid, json: bool) -> anyhow::Result<()> {
    let video = db.find_by_id(id).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&video)?);
        return Ok(());
    }
    let or_dash = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());

    println!("ID:         {}", video.id);
    println!("Title:      {}", video.title);
    println!("File:       {}", video.file_path);
    println!("Status:     {}", video.status);
    println!("Upload:     {}", video.upload_status);
    println!("HLS Dir:    {}", or_dash(&video.hls_path));
    println!("Manifest:   {}", or_dash(&video.manifest_path));
    println!("S3 URL:     {}", or_dash(&video.s3_url));
    println!("Created:    {}", video.created_at);
    println!("Updated:    {}", video.updated_at);
    if let Some(ref err) = video.error_message {
        println!("Error:      {err}");
    }
    Ok(())
}
