use tracing::{debug, info, warn};

use crate::diff::{diff, Diff};
use crate::error::Result;
use crate::extract::extract_products;
use crate::fetch::PageSource;
use crate::journal::Journal;
use crate::model::{Product, StoreRow};
use crate::notify::{self, MailSink};
use crate::settings::{ExtractPolicy, Settings};
use crate::store::RowStore;
use crate::writer;

/// Command-line modes. `debug` only raises log verbosity; it never implies
/// `dry_run`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub debug: bool,
    pub devel: bool,
    pub dry_run: bool,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub products: usize,
    pub skipped: usize,
    pub diff: Diff,
    pub stored: bool,
    pub emailed: bool,
}

impl RunReport {
    pub fn summary(&self) -> String {
        format!(
            "{} products scraped ({} skipped): {} new, {} updated, {} removed; store {}, email {}",
            self.products,
            self.skipped,
            self.diff.insert.len(),
            self.diff.update.len(),
            self.diff.removed.len(),
            if self.stored { "written" } else { "untouched" },
            if self.emailed { "sent" } else { "not sent" },
        )
    }
}

/// One monitoring pass: fetch, extract, diff, write, notify.
pub async fn run<P, S, M>(
    settings: &Settings,
    opts: &RunOptions,
    pages: &P,
    store: &S,
    mailer: Option<&M>,
    journal: &mut Journal,
    now: &str,
) -> Result<RunReport>
where
    P: PageSource,
    S: RowStore,
    M: MailSink,
{
    let mut report = RunReport::default();

    let attempts = extract_products(
        pages,
        &settings.root_url,
        settings.site_root(),
        &settings.locale,
    )
    .await?;
    let (products, skipped) = settle(attempts, settings.on_extract_error)?;
    report.products = products.len();
    report.skipped = skipped;

    if products.is_empty() {
        info!("No products to write...");
        return Ok(report);
    }

    let rows = store.read_rows().await?;
    report.diff = diff(&products, &rows, now, settings.update_policy);
    let d = &report.diff;

    log_rows("Inserting rows", &d.insert);
    log_rows("Updated rows", &d.update);
    log_rows("Removed rows", &d.removed);

    if opts.dry_run {
        info!("Dry-run mode: skipping write to store and sending email...");
    }
    info!(
        "Writing {} new rows, {} updated rows, {} removed rows",
        d.insert.len(),
        d.update.len(),
        d.removed.len()
    );

    let ops = writer::plan(d);
    if opts.dry_run {
        for op in &ops {
            info!("Dry-run mode: would write {}", op);
        }
    } else if !d.is_empty() {
        writer::apply(store, &ops, journal).await?;
        report.stored = true;
    }

    if d.has_changes() {
        info!("Sending email for product changes");
        let email = notify::compose(&settings.site_name, d, &settings.locale);
        report.emailed = notify::deliver(mailer, &email, opts.dry_run).await;
    } else {
        info!("No product changes, not sending email");
    }

    Ok(report)
}

/// Apply the extraction policy to the per-product results.
fn settle(attempts: Vec<Result<Product>>, policy: ExtractPolicy) -> Result<(Vec<Product>, usize)> {
    let mut products = Vec::with_capacity(attempts.len());
    let mut skipped = 0;
    for attempt in attempts {
        match (attempt, policy) {
            (Ok(p), _) => products.push(p),
            (Err(e), ExtractPolicy::Abort) => return Err(e),
            (Err(e), ExtractPolicy::Skip) => {
                warn!("Skipping product: {}", e);
                skipped += 1;
            }
        }
    }
    Ok((products, skipped))
}

fn log_rows(label: &str, rows: &[StoreRow]) {
    if rows.is_empty() {
        return;
    }
    let lines: String = rows
        .iter()
        .map(|r| {
            format!(
                "\n  [{}, {}, {}, {}, {}]",
                r.first_seen, r.last_seen, r.name, r.original_price, r.sale_price
            )
        })
        .collect();
    debug!("{}: {}", label, lines);
}
