//! Arcana CLI entry point.
//!
//! This binary is the composition root for the workspace. Responsibilities:
//!
//! 1. **Load configuration** from defaults, `arcana.toml` (or `--config`) and
//!    the environment, and validate it before any work starts.
//! 2. **Wire observability**: a `tracing-subscriber` console layer plus an
//!    optional OpenTelemetry OTLP exporter. Every span emitted by the other
//!    crates flows through it.
//! 3. **Construct infrastructure**: the catalog, the JSON ledger store, the
//!    prompt template and the configured LLM provider, injected into the
//!    engine's [`Reconciler`].
//! 4. **Dispatch the command** and print its report.
//!
//! Per-item generation failures are reported but do not change the exit code;
//! configuration and ledger errors exit with status 1.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use engine::{
    CancelHandle, GenerationWorker, LedgerView, RateLimiter, Reconciler, RunScope, Scheduler,
};
use pipeline::{Catalog, Direction, LedgerStore, LlmProvider};
use store::JsonLedgerStore;
use tracing::{error, info, info_span, warn, Instrument};

mod progress;
mod report;
mod settings;
mod telemetry;

use progress::BarProgress;
use settings::AppConfig;
use telemetry::LogFormat;

#[derive(Debug, Parser)]
#[command(
    name = "arcana",
    version,
    about = "Fill the tarot card × dimension interpretation matrix with LLM-generated text"
)]
struct Cli {
    /// Configuration file (defaults to ./arcana.toml when present).
    #[arg(long, global = true, env = "ARCANA_CONFIG")]
    config: Option<PathBuf>,

    /// Console log format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate every missing card × dimension interpretation.
    GenerateAll {
        /// Regenerate every item, replacing existing records.
        #[arg(long)]
        force: bool,
        /// Skip the confirmation prompt.
        #[arg(long, short)]
        yes: bool,
    },
    /// Show per-dimension completion without generating anything.
    CheckStatus,
    /// Generate the missing cards of one dimension.
    GenerateForDimension {
        /// Dimension name as it appears in the dimensions file.
        name: String,
        #[arg(long, short)]
        yes: bool,
    },
    /// Generate the missing dimensions of one card.
    GenerateForCard {
        /// Card name as it appears in the cards file.
        name: String,
        /// 正位/逆位 or upright/reversed.
        direction: Direction,
        #[arg(long, short)]
        yes: bool,
    },
    /// Generate debug samples into a separate file, ignoring the ledger.
    Sample {
        /// Number of (card, dimension) pairs to generate.
        #[arg(value_parser = clap::value_parser!(u32).range(1..))]
        count: u32,
        #[arg(long, short)]
        yes: bool,
    },
    /// List the cards in the catalog.
    ListCards {
        /// Show at most this many cards.
        #[arg(long)]
        limit: Option<usize>,
    },
    /// List the dimensions in the catalog.
    ListDimensions,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let guard = match telemetry::init(cli.log_format) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let span = info_span!("arcana", command = ?cli.command);
    let result = run(cli).instrument(span).await;
    let code = match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "command failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    };
    drop(guard);
    code
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;
    let catalog = Arc::new(
        store::load_catalog(&config.paths.cards, &config.paths.dimensions)
            .context("loading catalog")?,
    );
    let ledger_store =
        JsonLedgerStore::new(&config.paths.ledger).with_description(&config.ledger.description);

    match cli.command {
        Command::ListCards { limit } => report::print_cards(&catalog, limit),
        Command::ListDimensions => report::print_dimensions(&catalog),
        Command::CheckStatus => {
            let status = LedgerView::new(catalog, ledger_store).check_status()?;
            report::print_status(&status);
        }
        Command::GenerateAll { force, yes } => {
            generate(&config, catalog, ledger_store, RunScope::All, force, yes || force).await?;
        }
        Command::GenerateForDimension { name, yes } => {
            generate(&config, catalog, ledger_store, RunScope::Dimension(name), false, yes).await?;
        }
        Command::GenerateForCard {
            name,
            direction,
            yes,
        } => {
            let scope = RunScope::Card { name, direction };
            generate(&config, catalog, ledger_store, scope, false, yes).await?;
        }
        Command::Sample { count, yes } => {
            sample(&config, catalog, ledger_store, count as usize, yes).await?;
        }
    }
    Ok(())
}

struct Engine {
    reconciler: Reconciler<JsonLedgerStore>,
    provider: Arc<dyn LlmProvider>,
    cancel: CancelHandle,
}

/// Builds the engine for a generation command.
fn build_engine(
    config: &AppConfig,
    catalog: Arc<Catalog>,
    ledger_store: JsonLedgerStore,
) -> anyhow::Result<Engine> {
    let template = store::load_prompt_template(&config.paths.prompt_template)
        .context("loading prompt template")?;
    let provider = llm::Provider::from_config(&config.provider_config()?)
        .context("configuring LLM provider")?
        .into_shared();

    let cancel = CancelHandle::new();
    let signal = cancel.signal();
    let worker = GenerationWorker::new(
        Arc::clone(&provider),
        Arc::new(RateLimiter::per_minute(config.llm.rate_limit_per_minute)),
        Arc::new(template),
        config.generation_settings()?,
        config.retry_policy()?,
    )
    .with_cancel(signal);
    let scheduler =
        Scheduler::new(worker, config.llm.batch_size).with_progress(Arc::new(BarProgress::new()));
    let reconciler = Reconciler::new(catalog, ledger_store, scheduler)
        .with_description(config.ledger.description.clone());
    Ok(Engine {
        reconciler,
        provider,
        cancel,
    })
}

/// Turns Ctrl-C into a cooperative cancel: in-flight items stop, and what was
/// produced so far is checkpointed.
fn cancel_on_interrupt(cancel: CancelHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping and saving progress");
            cancel.cancel();
        }
    });
}

async fn generate(
    config: &AppConfig,
    catalog: Arc<Catalog>,
    ledger_store: JsonLedgerStore,
    scope: RunScope,
    force: bool,
    yes: bool,
) -> anyhow::Result<()> {
    let Engine {
        reconciler,
        provider,
        cancel,
    } = build_engine(config, catalog, ledger_store)?;

    let plan = reconciler.plan(&scope, force)?;
    if !plan.is_empty() && !yes {
        let model = config.model()?;
        println!(
            "{}",
            report::estimate(plan.total_missing(), provider.name(), model.as_str())
        );
        if !confirm().await? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    info!(
        provider = provider.name(),
        rate_limit_per_minute = config.llm.rate_limit_per_minute,
        batch_size = config.llm.batch_size,
        "generation starting"
    );
    cancel_on_interrupt(cancel);
    let run = reconciler.run(scope, force).await?;
    report::print_run(&run);
    Ok(())
}

async fn sample(
    config: &AppConfig,
    catalog: Arc<Catalog>,
    ledger_store: JsonLedgerStore,
    count: usize,
    yes: bool,
) -> anyhow::Result<()> {
    let Engine {
        reconciler,
        provider,
        cancel,
    } = build_engine(config, catalog, ledger_store)?;
    let sink = JsonLedgerStore::new(config.paths.sample_file());

    if !yes {
        let model = config.model()?;
        println!("{}", report::estimate(count, provider.name(), model.as_str()));
        if !confirm().await? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    cancel_on_interrupt(cancel);
    let samples = reconciler.run_sample(count, &sink).await?;
    report::print_sample(&samples, &sink.location());
    Ok(())
}

/// Asks for a yes/no answer on stdin; anything but `y`/`yes` declines.
async fn confirm() -> anyhow::Result<bool> {
    let answer = tokio::task::spawn_blocking(|| -> std::io::Result<String> {
        print!("Continue? [y/N] ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        Ok(line)
    })
    .await
    .context("confirmation prompt")??;

    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
