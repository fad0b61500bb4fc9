/*
[INPUT]:  CLI arguments, YAML configuration file, files to upload, OS shutdown signals
[OUTPUT]: Uploaded files, progress log lines, final per-file summary
[POS]:    Binary entry point
[UPDATE]: When changing CLI flags, startup flow, or shutdown handling
*/

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use uplift_adapter::UploadPayload;
use uplift_tracker::{ProgressSummary, TaskRecord, TaskStatus, TrackerConfig, UploadManager};

const INTERRUPT_GRACE: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(name = "uplift-tracker", version, about = "Upload files and track their progress")]
struct Cli {
    /// Defaults to <config dir>/uplift/uplift.yaml
    #[arg(long = "config", value_name = "PATH")]
    config_path: Option<PathBuf>,
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    log_level: String,
    /// Write logs to this file instead of stderr
    #[arg(long = "log-file", value_name = "PATH")]
    log_file: Option<PathBuf>,
    /// Validate configuration and inputs, then exit
    #[arg(long = "dry-run")]
    dry_run: bool,
    /// Print the effective configuration as YAML and exit
    #[arg(long = "print-config")]
    print_config: bool,
    /// Print the final summary as JSON
    #[arg(long = "json")]
    json: bool,
    #[arg(value_name = "FILE")]
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let _log_guard = init_tracing(&args.log_level, args.log_file.as_deref())?;

    let config_path = match args.config_path.clone() {
        Some(path) => path,
        None => TrackerConfig::default_path()
            .ok_or_else(|| anyhow!("no --config given and no platform config directory"))?,
    };

    info!(
        config_path = %config_path.display(),
        files = args.files.len(),
        dry_run = args.dry_run,
        "starting uplift-tracker"
    );

    let config = TrackerConfig::from_file(&config_path).context("load config")?;
    info!(base_url = %config.gateway.base_url, codec = ?config.preprocess.codec, "configuration loaded");

    if args.print_config {
        print!("{}", config.to_yaml().context("serialize config")?);
        return Ok(());
    }

    let payloads = read_payloads(&args.files).await?;

    if args.dry_run {
        info!(files = payloads.len(), "dry-run requested; configuration validated");
        return Ok(());
    }

    if payloads.is_empty() {
        warn!("no files given; nothing to upload");
        return Ok(());
    }

    let manager = Arc::new(UploadManager::from_config(&config).context("build upload manager")?);
    let interrupt = CancellationToken::new();
    setup_signal_handlers(interrupt.clone());

    let ids = manager.submit(payloads);
    info!(tasks = ids.len(), "uploads started");

    let reporter = tokio::spawn(report_progress(manager.clone(), config.progress_interval()));

    let idle = manager.wait_idle();
    tokio::pin!(idle);

    tokio::select! {
        _ = &mut idle => {}
        _ = interrupt.cancelled() => {
            let signaled = manager.cancel_all();
            info!(signaled, "shutdown signal received; canceling uploads");
            if tokio::time::timeout(INTERRUPT_GRACE, &mut idle).await.is_err() {
                warn!("uploads did not stop in time; aborting");
                manager.shutdown_and_wait().await.context("shutdown uploads")?;
            }
        }
    }
    reporter.abort();

    let records = manager.snapshot();
    let summary = manager.progress();
    print_summary(&records, summary, args.json)?;

    let failed = records
        .iter()
        .filter(|record| record.status == TaskStatus::Failed)
        .count();
    if failed > 0 {
        return Err(anyhow!("{failed} of {} uploads failed", records.len()));
    }

    Ok(())
}

fn init_tracing(log_level: &str, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_new(log_level).context("invalid log level")?;

    let Some(path) = log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|err| anyhow!(err))
            .context("initialize tracing subscriber")?;
        return Ok(None);
    };

    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow!("log file path has no file name: {}", path.display()))?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create log directory {}", dir.display()))?;

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|err| anyhow!(err))
        .context("initialize tracing subscriber")?;
    Ok(Some(guard))
}

async fn read_payloads(files: &[PathBuf]) -> Result<Vec<UploadPayload>> {
    let mut payloads = Vec::with_capacity(files.len());
    for path in files {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        payloads.push(UploadPayload::new(name, bytes));
    }
    Ok(payloads)
}

async fn report_progress(manager: Arc<UploadManager>, interval: Duration) {
    let mut revisions = manager.subscribe();
    let mut last: Option<ProgressSummary> = None;

    loop {
        if revisions.changed().await.is_err() {
            return;
        }

        let summary = manager.progress();
        if last != Some(summary) {
            info!(
                percentage = summary.percentage,
                pending = summary.has_pending,
                "upload progress"
            );
            last = Some(summary);
        }
        if !summary.has_pending {
            return;
        }

        tokio::time::sleep(interval).await;
    }
}

fn print_summary(records: &[TaskRecord], summary: ProgressSummary, json: bool) -> Result<()> {
    if json {
        let output = serde_json::json!({
            "progress": summary,
            "tasks": records,
        });
        println!("{}", serde_json::to_string_pretty(&output).context("serialize summary")?);
        return Ok(());
    }

    for record in records {
        let detail = match (&record.remote_location, &record.failure) {
            (Some(location), _) => location.to_string(),
            (None, Some(failure)) => failure.clone(),
            (None, None) => String::new(),
        };
        println!(
            "{:<10} {:<32} {:>12} {}",
            record.status, record.name, record.transferred_bytes, detail
        );
    }
    println!("overall: {}%", summary.percentage);
    Ok(())
}

fn setup_signal_handlers(shutdown: CancellationToken) {
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install SIGINT handler");
            return;
        }
        info!("received SIGINT");
        shutdown_clone.cancel();
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let shutdown_clone = shutdown.clone();
        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                    info!("received SIGTERM");
                    shutdown_clone.cancel();
                }
                Err(err) => {
                    warn!(error = %err, "failed to install SIGTERM handler");
                }
            }
        });
    }
}
