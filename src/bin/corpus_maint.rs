//! # Corpus Maintenance CLI
//!
//! Runs the maintenance jobs against the corpus database.
//!
//! ## Usage
//!
//! ```bash
//! # Flag accession numbers that do not match their repository's pattern
//! corpus-maint validate-accessions
//!
//! # Resolve organizations against ROR, then retry the leftovers by title
//! corpus-maint reconcile-ror
//! corpus-maint reconcile-ror --by-title
//!
//! # Use an explicit configuration file
//! corpus-maint --config config/production.toml normalize-dois
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use citation_corpus::config::{sanitize_for_logging, ConfigLoader};
use citation_corpus::database::DatabaseConnection;
use citation_corpus::error::CorpusError;
use citation_corpus::jobs::{self, JobContext};
use citation_corpus::logging;
use citation_corpus::pipeline::{RunReport, ShutdownHandle};
use citation_corpus::report;
use citation_corpus::ror::RorClient;
use citation_corpus::store::PgRecordStore;
use citation_corpus::transform::reconcile::ReconcileMode;

#[derive(Parser)]
#[command(name = "corpus-maint")]
#[command(about = "Batched maintenance jobs for the Data Citation Corpus database")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file layered over config/corpus.toml
    #[arg(short, long, global = true, env = "CORPUS_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for per-run failure and rollback CSV exports
    #[arg(long, global = true, default_value = "reports")]
    report_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store the pattern-match flag for assertions that have none
    ValidateAccessions,

    /// Write one CSV per repository with every assertion's pattern verdict
    ExportAccessions {
        #[arg(long, default_value = "accession_exports")]
        out_dir: PathBuf,
    },

    /// Summarize exported accession CSVs into one report
    AccessionReport {
        #[arg(long, default_value = "accession_exports")]
        dir: PathBuf,

        #[arg(long, default_value = "accession_summary.csv")]
        out: PathBuf,
    },

    /// Delete assertions with malformed accession numbers, or those listed in files
    DeleteInvalid {
        /// Directory of `*-remove*` CSV files listing assertion ids to delete
        #[arg(long)]
        from_csv: Option<PathBuf>,
    },

    /// Rewrite DOI columns into https://doi.org/ form
    NormalizeDois,

    /// Insert subject rows for assertions of repositories with known subjects
    BackfillSubjects,

    /// Fill ror_id/ror_name for affiliations and funders
    ReconcileRor {
        /// Match by organization name only, for rows whose identifier did not resolve
        #[arg(long)]
        by_title: bool,
    },

    /// Write the top ROR candidates for organizations without an identifier
    RorCandidates {
        #[arg(long, default_value = "ror_id_candidate_matches.csv")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_structured_logging();
    let cli = Cli::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_config_file(path);
    }
    let config = loader.load().context("failed to load configuration")?;
    info!(config = %sanitize_for_logging(&config), "Configuration loaded");

    // Summarizing exported files needs no database
    if let Command::AccessionReport { dir, out } = &cli.command {
        let summaries = report::summarize_dir(dir)?;
        report::write_summary(out, &summaries)?;
        for summary in &summaries {
            println!(
                "{} ({}): {} accession numbers, {} false matches ({})",
                summary.file,
                summary.group,
                summary.total_accession_numbers,
                summary.false_match,
                summary.percent_false_match
            );
        }
        return Ok(());
    }

    let connection = DatabaseConnection::connect(&config.database)
        .await
        .context("failed to connect to the corpus database")?;
    if !connection.health_check().await? {
        anyhow::bail!("corpus database failed its health check");
    }
    let store = Arc::new(PgRecordStore::new(connection.pool().clone()));

    let shutdown = ShutdownHandle::new();
    tokio::spawn(stop_on_signal(shutdown.clone()));

    let ctx = JobContext::new(config, store).with_shutdown(shutdown);
    let outcome = run_command(&ctx, cli.command).await;
    connection.close().await;

    let reports = match outcome {
        Ok(reports) => reports,
        Err(e) => {
            // Groups that finished before the failure are committed and still reported
            if let Some(corpus_error) = e.downcast_ref::<CorpusError>() {
                report_runs(&cli.report_dir, corpus_error.completed_runs());
            }
            logging::log_error("corpus-maint", "run_command", &format!("{e:#}"), None);
            return Err(e);
        }
    };
    report_runs(&cli.report_dir, &reports);
    Ok(())
}

fn report_runs(report_dir: &Path, reports: &[RunReport]) {
    for run in reports {
        println!("{run}");
        if let Err(e) = report::export_failures(report_dir, run) {
            warn!(job = %run.job, error = %e, "Could not export run failures");
        }
    }

    let unclean = reports.iter().filter(|run| !run.is_clean()).count();
    if unclean > 0 {
        warn!(runs = unclean, "Some runs finished with failures, see the report directory");
    }
}

async fn run_command(ctx: &JobContext, command: Command) -> Result<Vec<RunReport>> {
    let reports = match command {
        Command::ValidateAccessions => jobs::validate_accessions(ctx).await?,
        Command::ExportAccessions { out_dir } => jobs::export_accessions(ctx, &out_dir).await?,
        Command::DeleteInvalid { from_csv: Some(dir) } => vec![jobs::delete_listed(ctx, &dir).await?],
        Command::DeleteInvalid { from_csv: None } => jobs::delete_invalid_accessions(ctx).await?,
        Command::NormalizeDois => vec![jobs::normalize_dois(ctx).await?],
        Command::BackfillSubjects => jobs::backfill_subjects(ctx).await?,
        Command::ReconcileRor { by_title } => {
            let client = Arc::new(RorClient::new(&ctx.config.ror)?);
            let mode = if by_title {
                ReconcileMode::TitleOnly
            } else {
                ReconcileMode::IdentifierFirst
            };
            let reports = jobs::reconcile_ror(ctx, client.clone(), mode).await?;
            info!(stats = ?client.stats(), "ROR lookups finished");
            reports
        }
        Command::RorCandidates { out } => {
            let client = Arc::new(RorClient::new(&ctx.config.ror)?);
            let reports = jobs::ror_candidates(ctx, client.clone(), &out).await?;
            info!(stats = ?client.stats(), file = %out.display(), "Candidate report written");
            reports
        }
        Command::AccessionReport { .. } => Vec::new(),
    };
    Ok(reports)
}

/// Request a stop on Ctrl+C or SIGTERM; in-flight records finish and are written
async fn stop_on_signal(shutdown: ShutdownHandle) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, stopping after in-flight records"),
        _ = terminate => info!("Received SIGTERM, stopping after in-flight records"),
    }
    shutdown.request_stop();
}
