mod diff;
mod error;
mod extract;
mod fetch;
mod journal;
mod model;
mod notify;
mod price;
mod run;
mod settings;
mod store;
mod writer;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use fetch::HttpSource;
use journal::Journal;
use notify::SmtpMailer;
use run::RunOptions;
use settings::{Settings, StoreBackend};
use store::sheets::SheetsStore;
use store::sqlite::SqliteStore;
use store::RowStore;

#[derive(Parser)]
#[command(
    name = "recon_watch",
    about = "Watch the Festool Recon page and mail when products appear or sell out"
)]
struct Cli {
    /// Verbose logging (does not imply --dryrun)
    #[arg(long)]
    debug: bool,
    /// Read and write the devel worksheet
    #[arg(long)]
    devel: bool,
    /// Do not write to the store or send email
    #[arg(long)]
    dryrun: bool,
    /// Optional settings file; RECON_* environment variables override it
    #[arg(long, default_value = "recon.toml")]
    config: PathBuf,
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let opts = RunOptions {
        debug: cli.debug,
        devel: cli.devel,
        dry_run: cli.dryrun,
    };
    init_tracing(opts.debug);

    if opts.debug {
        info!("Running in debug mode...");
    }
    if opts.devel {
        info!("Running in devel mode, reading and writing to devel sheet...");
    }
    if opts.dry_run {
        info!("Running in dry run mode, not writing to sheet...");
    }

    let settings = Settings::load(&cli.config).context("Failed to load settings")?;
    let worksheet = settings.worksheet(opts.devel);

    match settings.store {
        StoreBackend::Sheets => {
            let (sheet_id, token) = settings.sheets()?;
            let store = SheetsStore::open(sheet_id, token.expose(), worksheet)
                .await
                .context("Failed to open spreadsheet")?;
            execute(&settings, &opts, &store).await
        }
        StoreBackend::Sqlite => {
            let store = SqliteStore::open(&settings.sqlite_path, worksheet)
                .with_context(|| format!("Failed to open {}", settings.sqlite_path.display()))?;
            execute(&settings, &opts, &store).await
        }
    }
}

async fn execute<S: RowStore>(settings: &Settings, opts: &RunOptions, store: &S) -> anyhow::Result<()> {
    let t0 = Instant::now();

    match journal::unfinished(&settings.journal_path) {
        Ok(left) if !left.is_empty() => {
            warn!(
                "{} store writes from earlier runs never completed (see {}):",
                left.len(),
                settings.journal_path.display()
            );
            for entry in &left {
                if let Some(op) = &entry.op {
                    warn!("  run {} #{} [{:?}] {}", entry.run_id, entry.seq, entry.status, op);
                }
            }
        }
        Ok(_) => {}
        Err(e) => warn!("Could not read write journal: {}", e),
    }

    let mailer = match settings.email().and_then(|email| SmtpMailer::new(&email)) {
        Ok(m) => Some(m),
        Err(e) => {
            warn!("Email disabled: {}", e);
            None
        }
    };

    let now = model::now_timestamp();
    let mut journal = if opts.dry_run {
        Journal::disabled()
    } else {
        Journal::open(&settings.journal_path, &now)
    };

    let pages = HttpSource::new()?;
    let report = run::run(settings, opts, &pages, store, mailer.as_ref(), &mut journal, &now)
        .await
        .context("Run failed")?;

    info!("{}", report.summary());
    info!("Done in {:.1}s", t0.elapsed().as_secs_f64());
    Ok(())
}
