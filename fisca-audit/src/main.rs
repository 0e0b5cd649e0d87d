//! fisca-audit - SYSCOHADA balance audit command line
//!
//! `run` audits a balance and writes the session, `compare` reports the
//! evolution between two sessions, `archive` stores a completed session for
//! the continuity controls of later exercises.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use fisca_common::config::ConfigResolver;
use fisca_common::events::EventBus;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fisca_audit::diff::{generate_correction_report, generate_partie2_report};
use fisca_audit::event_bridge::{log_events, EventBridge};
use fisca_audit::export::{findings_to_csv, session_to_json};
use fisca_audit::loader::{load_archives, load_balance, load_session, store_archive};
use fisca_audit::models::{ArchiveAudit, PhaseAudit, StatutSession};
use fisca_audit::{AuditContext, AuditRunner, TokenObserver, TypeLiasse};

#[derive(Parser, Debug)]
#[command(name = "fisca-audit")]
#[command(about = "Audit of SYSCOHADA trial balances")]
#[command(version)]
struct Args {
    /// Configuration file (overrides FISCA_AUDIT_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Audit a balance
    Run {
        /// Balance of the exercise (JSON array of lines)
        #[arg(long)]
        balance: PathBuf,

        /// Balance of the previous exercise
        #[arg(long)]
        balance_n1: Option<PathBuf>,

        /// Directory of archived audits
        #[arg(long, env = "FISCA_AUDIT_ARCHIVES")]
        archives: Option<PathBuf>,

        #[arg(long, default_value = "")]
        exercice: String,

        /// 1, 2 or 3
        #[arg(long, default_value = "1")]
        phase: String,

        /// Statement template (SN, SMT, BANQUE, ASSURANCE, ...)
        #[arg(long, default_value = "SN")]
        liasse: String,

        /// Completed balance audit to extend (phase 3 only)
        #[arg(long)]
        resume: Option<PathBuf>,

        /// Session JSON output (stdout when absent)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Findings CSV output
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Compare two sessions of the same balance lineage
    Compare {
        #[arg(long)]
        before: PathBuf,

        #[arg(long)]
        after: PathBuf,

        #[arg(long)]
        balance_before: PathBuf,

        #[arg(long)]
        balance_after: PathBuf,

        /// Compliance report over anomalies only
        #[arg(long)]
        partie2: bool,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Store a completed session with its balance as an archive
    Archive {
        #[arg(long)]
        session: PathBuf,

        #[arg(long)]
        balance: PathBuf,

        #[arg(long, env = "FISCA_AUDIT_ARCHIVES")]
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fisca_audit=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        git = env!("FISCA_GIT_HASH"),
        profile = env!("FISCA_BUILD_PROFILE"),
        "fisca-audit starting"
    );
    let config = ConfigResolver::new(args.config.clone())
        .resolve()
        .context("Failed to resolve configuration")?;

    match args.command {
        Command::Run {
            balance,
            balance_n1,
            archives,
            exercice,
            phase,
            liasse,
            resume,
            output,
            csv,
        } => {
            let phase = PhaseAudit::parse(&phase).with_context(|| format!("Unknown phase '{}'", phase))?;
            let type_liasse =
                TypeLiasse::parse(&liasse).with_context(|| format!("Unknown liasse type '{}'", liasse))?;

            let lines = load_balance(&balance)
                .with_context(|| format!("Failed to load balance {}", balance.display()))?;
            let mut builder = AuditContext::builder(lines)
                .exercice(exercice.clone())
                .type_liasse(type_liasse)
                .config(config.clone());
            if let Some(path) = balance_n1 {
                let n1 = load_balance(&path)
                    .with_context(|| format!("Failed to load N-1 balance {}", path.display()))?;
                builder = builder.balance_n1(n1);
            }
            if let Some(dir) = archives {
                builder = builder.archives(load_archives(&dir).context("Failed to load archives")?);
            }
            let ctx = builder.build();

            let runner = AuditRunner::standard().context("Invalid control catalogue")?;
            let bus = EventBus::new(config.event_capacity);
            let logger = tokio::spawn(log_events(bus.subscribe()));
            let token = CancellationToken::new();
            spawn_ctrl_c(token.clone());
            let mut observer = TokenObserver::with_inner(token, EventBridge::new(bus));

            let session = match (phase, resume) {
                (PhaseAudit::Phase3, Some(path)) => {
                    let phase1 = load_session(&path)
                        .with_context(|| format!("Failed to load session {}", path.display()))?;
                    runner.resume_phase3(&phase1, &ctx, &mut observer).await
                }
                (_, Some(_)) => bail!("--resume only applies to phase 3"),
                (_, None) => {
                    let balance_id = balance.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
                    let session = runner.start_session(balance_id, exercice, phase);
                    runner.run(session, &ctx, &mut observer).await
                }
            };
            drop(observer);
            if let Err(e) = logger.await {
                warn!(error = %e, "Event logger task failed");
            }

            write_output(output.as_deref(), &session_to_json(&session)?)?;
            if let Some(path) = csv {
                fs::write(&path, findings_to_csv(&session.resultats))
                    .with_context(|| format!("Failed to write {}", path.display()))?;
            }

            info!(
                statut = %session.statut,
                score = session.resume.score_global,
                bloquants = session.resume.bloquants_restants,
                "Audit finished"
            );
            if session.statut == StatutSession::Erreur {
                bail!(
                    "Audit session failed: {}",
                    session.erreur.as_deref().unwrap_or("unknown fault")
                );
            }
        }

        Command::Compare {
            before,
            after,
            balance_before,
            balance_after,
            partie2,
            output,
        } => {
            let avant = load_session(&before).with_context(|| format!("Failed to load {}", before.display()))?;
            let apres = load_session(&after).with_context(|| format!("Failed to load {}", after.display()))?;
            let balance_avant = load_balance(&balance_before)
                .with_context(|| format!("Failed to load {}", balance_before.display()))?;
            let balance_apres = load_balance(&balance_after)
                .with_context(|| format!("Failed to load {}", balance_after.display()))?;

            let json = if partie2 {
                let rapport =
                    generate_partie2_report(&avant, &apres, &balance_avant, &balance_apres, config.tolerance);
                info!(
                    conforme = rapport.synthese.conforme,
                    bloquants = rapport.synthese.bloquants_restants,
                    "Part-2 report generated"
                );
                serde_json::to_string_pretty(&rapport)?
            } else {
                let rapport =
                    generate_correction_report(&avant, &apres, &balance_avant, &balance_apres, config.tolerance);
                info!(
                    corrections = rapport.corrections.len(),
                    comptes = rapport.comptes_modifies.len(),
                    "Correction report generated"
                );
                serde_json::to_string_pretty(&rapport)?
            };
            write_output(output.as_deref(), &json)?;
        }

        Command::Archive { session, balance, dir } => {
            let session = load_session(&session).with_context(|| format!("Failed to load {}", session.display()))?;
            if session.statut != StatutSession::Terminee {
                bail!("Only completed sessions can be archived (found {})", session.statut);
            }
            let lines = load_balance(&balance).with_context(|| format!("Failed to load {}", balance.display()))?;
            let path = store_archive(&dir, &ArchiveAudit::from_session(session, lines))
                .context("Failed to store archive")?;
            info!(path = %path.display(), "Archive stored");
        }
    }

    Ok(())
}

fn write_output(path: Option<&Path>, content: &str) -> Result<()> {
    match path {
        Some(path) => fs::write(path, content).with_context(|| format!("Failed to write {}", path.display())),
        None => {
            println!("{}", content);
            Ok(())
        }
    }
}

/// Cancel the running audit on Ctrl+C
fn spawn_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling audit");
            token.cancel();
        }
    });
}
