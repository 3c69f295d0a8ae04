use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::{Context, bail};
use chrono::Utc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use mailbrief::config::AppConfig;
use mailbrief::pipeline::{Pipeline, spawn_scheduler};
use mailbrief::sink::{NotionConfig, NotionSink};
use mailbrief::source::{EmlDirSource, ImapConfig, ImapSource, MailSource};
use mailbrief::store::LibSqlStore;
use mailbrief::summarize::{
    HttpSummaryEngine, LeadSentenceEngine, SummaryApiConfig, SummaryEngine, Summarizer,
};

/// Console logging, plus a daily-rolling file when `log_dir` is set.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "mailbrief.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        bail!("Failed to install rustls crypto provider");
    }

    let config = AppConfig::from_env().context("Invalid configuration")?;
    let _log_guard = init_tracing(config.log_dir.as_deref());

    info!(
        version = env!("CARGO_PKG_VERSION"),
        mode = if config.dry_run { "dry run" } else { "live" },
        "mailbrief starting"
    );

    // ── Source ───────────────────────────────────────────────────────────
    let source: Arc<dyn MailSource> = if let Some(dir) = &config.eml_dir {
        info!(dir = %dir.display(), "Reading .eml files");
        Arc::new(EmlDirSource::new(dir))
    } else if let Some(imap) = ImapConfig::from_env().context("Invalid IMAP configuration")? {
        info!(host = %imap.host, folder = %imap.folder, "Reading IMAP mailbox");
        Arc::new(ImapSource::new(imap))
    } else {
        bail!("No mail source configured: set IMAP_HOST or MAILBRIEF_EML_DIR");
    };

    // ── Summary engine ───────────────────────────────────────────────────
    let engine: Arc<dyn SummaryEngine> = match SummaryApiConfig::from_env() {
        Some(api) => {
            let engine = HttpSummaryEngine::new(api).context("Failed to create summary engine")?;
            info!(model = engine.model(), "Using HTTP summary engine");
            Arc::new(engine)
        }
        None => {
            info!("SUMMARY_API_URL not set, using lead-sentence summaries");
            Arc::new(LeadSentenceEngine)
        }
    };

    // ── Database ─────────────────────────────────────────────────────────
    let store = LibSqlStore::new_local(&config.db_path)
        .await
        .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?;

    let mut pipeline = Pipeline::new(Arc::new(store), Summarizer::new(engine))
        .with_dry_run(config.dry_run)
        .with_summary_max_len(config.summary_max_len);

    // ── Knowledge sink ───────────────────────────────────────────────────
    if let Some(notion) = NotionConfig::from_env() {
        let sink = NotionSink::new(notion).context("Failed to create Notion sink")?;
        if config.dry_run {
            pipeline = pipeline.with_sink(Arc::new(sink));
        } else {
            match sink.verify().await {
                Ok(()) => pipeline = pipeline.with_sink(Arc::new(sink)),
                Err(e) => warn!(
                    error = %e,
                    "Notion unavailable, records will only be saved to the database"
                ),
            }
        }
    }

    let pipeline = Arc::new(pipeline);
    let criteria = config.criteria();

    let Some(interval) = config.interval else {
        let report = pipeline
            .run_once(source.as_ref(), &criteria, Utc::now())
            .await
            .context("Run failed")?;
        info!(
            fetched = report.fetched,
            processed = report.processed,
            duplicates = report.skipped_duplicate,
            pages = report.sink_pages_created,
            failed = report.failed,
            "Run complete"
        );
        if report.aborted {
            bail!("Run aborted: the record store became unavailable");
        }
        return Ok(());
    };

    let (handle, shutdown) = spawn_scheduler(Arc::clone(&pipeline), source, criteria, interval);
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown requested, finishing current run");
    shutdown.store(true, Ordering::Relaxed);

    let total = handle.await.context("Scheduler task failed")?;
    info!(
        fetched = total.fetched,
        processed = total.processed,
        pages = total.sink_pages_created,
        failed = total.failed,
        "Scheduler stopped"
    );
    Ok(())
}
