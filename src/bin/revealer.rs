use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ggrevealer::config::InputLimits;
use ggrevealer::hands::parse_file;
use ggrevealer::pipeline::{HandFileInput, JobInputs, Pipeline, ScreenshotInput};
use ggrevealer::store::{InMemoryJobStore, JobStore, SeaOrmJobStore};
use ggrevealer::vision::{HttpVisionClient, ImageRef, VisionClient, VisionError};
use ggrevealer::PipelineConfig;

const LOG_TARGET: &str = "bin::revealer";
const DEFAULT_FILTER: &str = "info";

const HAND_EXTENSIONS: &[&str] = &["txt"];
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

#[derive(Debug, Parser)]
#[command(name = "revealer")]
#[command(about = "De-anonymize hand histories by pairing them with table screenshots", long_about = None)]
struct Args {
    /// Toggle structured (JSON) tracing output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the full pipeline over a batch of inputs
    Run {
        /// Directory containing the hand-history .txt files
        #[arg(long)]
        hands: PathBuf,

        /// Directory containing the table screenshots
        #[arg(long)]
        screenshots: PathBuf,

        /// Output directory for per-table files, archives, and snapshots
        #[arg(long, default_value = "output")]
        out: PathBuf,

        /// Vision credential; the run refuses to start without one
        #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// Override the vision endpoint
        #[arg(long, env = "VISION_ENDPOINT")]
        endpoint: Option<String>,

        /// Override the vision model
        #[arg(long, env = "VISION_MODEL")]
        model: Option<String>,

        /// SQLite url for the durable job store; in-memory when absent
        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,

        /// Vision semaphore size
        #[arg(long, default_value_t = 10)]
        ocr_concurrency: usize,

        /// Lift the free-tier input limits
        #[arg(long)]
        paid_tier: bool,
    },

    /// Parse one hand-history file and report what it contains
    Validate {
        file: PathBuf,
    },

    /// List jobs recorded in the durable store
    Jobs {
        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init_tracing(args.json);

    match args.command {
        Command::Run {
            hands,
            screenshots,
            out,
            api_key,
            endpoint,
            model,
            database_url,
            ocr_concurrency,
            paid_tier,
        } => {
            run(
                &hands,
                &screenshots,
                &out,
                api_key.as_deref(),
                endpoint.as_deref(),
                model.as_deref(),
                database_url.as_deref(),
                ocr_concurrency,
                paid_tier,
            )
            .await
        }
        Command::Validate { file } => validate(&file).await,
        Command::Jobs { database_url } => list_jobs(database_url.as_deref()).await,
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[allow(clippy::too_many_arguments)]
async fn run(
    hands_dir: &Path,
    screenshots_dir: &Path,
    out_dir: &Path,
    api_key: Option<&str>,
    endpoint: Option<&str>,
    model: Option<&str>,
    database_url: Option<&str>,
    ocr_concurrency: usize,
    paid_tier: bool,
) -> Result<()> {
    let mut config = PipelineConfig {
        ocr_concurrency,
        ..PipelineConfig::default()
    };
    if paid_tier {
        config.input_limits = InputLimits::paid_tier();
    }

    let vision: Arc<dyn VisionClient> = match HttpVisionClient::new(
        api_key.unwrap_or(""),
        endpoint,
        model,
        Duration::from_secs(config.ocr_call_timeout_secs),
    ) {
        Ok(client) => Arc::new(client),
        Err(VisionError::AuthMissing) => {
            bail!("no vision credential: set OPENAI_API_KEY or pass --api-key")
        }
        Err(err) => return Err(err).context("vision client setup failed"),
    };

    let store = open_store(database_url).await?;
    let hand_files = collect_hand_files(hands_dir).await?;
    let shots = collect_screenshots(screenshots_dir).await?;
    if hand_files.is_empty() {
        bail!("no hand-history files under {}", hands_dir.display());
    }
    info!(
        target: LOG_TARGET,
        hand_files = hand_files.len(),
        screenshots = shots.len(),
        "inputs collected"
    );

    let pipeline = Pipeline::new(Arc::clone(&store), vision, config);
    let job = store.create_job().await?;
    let job_dir = out_dir.join(job.id.to_string());

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if signal::ctrl_c().await.is_ok() {
                warn!(target: LOG_TARGET, "interrupt received; cancelling job");
                cancel.cancel();
            }
        }
    });

    let outcome = pipeline
        .run_job(
            job.id,
            JobInputs {
                hand_files,
                screenshots: shots,
                output_dir: job_dir.clone(),
            },
            cancel,
        )
        .await
        .with_context(|| format!("job {} failed", job.id))?;

    let stats = &outcome.statistics;
    println!("job {} completed", outcome.job_id);
    println!(
        "  hands: {} parsed, {} resolved, {} incomplete",
        stats.hands_parsed, stats.hands_resolved, stats.hands_incomplete
    );
    println!(
        "  screenshots: {} total, {} matched, {} discarded",
        stats.screenshots_total, stats.matched_screenshots, stats.discarded_screenshots
    );
    println!(
        "  tables: {} resolved, {} incomplete",
        stats.tables_resolved, stats.tables_incomplete
    );
    if !stats.residual_ids.is_empty() {
        println!("  unresolved ids: {}", stats.residual_ids.join(", "));
    }
    println!("  outputs: {}", job_dir.display());
    Ok(())
}

async fn validate(file: &Path) -> Result<()> {
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string());
    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("cannot read {}", file.display()))?;

    let parsed = parse_file(&name, &text)?;
    println!("{}: {} hands", name, parsed.hands.len());
    for hand in &parsed.hands {
        println!(
            "  {} @ {} | {} seats | roles btn={:?} sb={:?} bb={:?}",
            hand.hand_id,
            hand.table_name.as_deref().unwrap_or("unknown"),
            hand.seat_count(),
            hand.roles.button_seat,
            hand.roles.small_blind_seat,
            hand.roles.big_blind_seat,
        );
    }
    for skip in &parsed.skipped {
        println!(
            "  skipped {}: {}",
            skip.hand_id.as_deref().unwrap_or("?"),
            skip.reason
        );
    }
    Ok(())
}

async fn list_jobs(database_url: Option<&str>) -> Result<()> {
    let store = open_store(database_url.or(Some("sqlite://ggrevealer.db?mode=rwc"))).await?;
    let jobs = store.list_jobs().await?;
    if jobs.is_empty() {
        println!("no jobs recorded");
        return Ok(());
    }
    for job in jobs {
        println!(
            "{} | {} | created {} | ocr {}/{}{}",
            job.id,
            job.status.as_str(),
            job.created_at.format("%Y-%m-%d %H:%M:%S"),
            job.ocr_processed,
            job.ocr_total,
            job.failure_reason
                .map(|r| format!(" | {r}"))
                .unwrap_or_default(),
        );
    }
    Ok(())
}

async fn open_store(database_url: Option<&str>) -> Result<Arc<dyn JobStore>> {
    match database_url {
        Some(url) => {
            let conn = ggrevealer::db::connect_to(url).await?;
            ggrevealer::db::init_schema(&conn).await?;
            Ok(Arc::new(SeaOrmJobStore::new(conn)))
        }
        None => Ok(Arc::new(InMemoryJobStore::new())),
    }
}

async fn collect_hand_files(dir: &Path) -> Result<Vec<HandFileInput>> {
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("cannot read {}", dir.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !has_extension(&path, HAND_EXTENSIONS) {
            continue;
        }
        let text = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("cannot read {}", path.display()))?;
        files.push(HandFileInput {
            name: file_name(&path),
            text,
        });
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

async fn collect_screenshots(dir: &Path) -> Result<Vec<ScreenshotInput>> {
    let mut shots = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) => {
            warn!(
                target: LOG_TARGET,
                dir = %dir.display(),
                error = %err,
                "no screenshot directory; hands will stay anonymous"
            );
            return Ok(shots);
        }
    };
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !has_extension(&path, IMAGE_EXTENSIONS) {
            continue;
        }
        let captured_at = entry
            .metadata()
            .await
            .ok()
            .and_then(|m| m.modified().ok())
            .map(|mtime| DateTime::<Local>::from(mtime).naive_local());
        shots.push(ScreenshotInput {
            id: file_name(&path),
            image: ImageRef::Path(path),
            captured_at,
        });
    }
    shots.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(shots)
}

fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| allowed.iter().any(|a| e.eq_ignore_ascii_case(a)))
        .unwrap_or(false)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
