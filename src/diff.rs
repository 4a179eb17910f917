use std::collections::HashSet;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::model::{Product, StoreRow};

/// What an update does with the prices of a product that is still listed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdatePolicy {
    /// Take the prices from the latest scrape.
    #[default]
    Refresh,
    /// Keep the prices recorded when the row was last written.
    Retain,
}

/// Three-way partition of a run against the current batch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Diff {
    /// New rows, `first_seen == last_seen == now`.
    pub insert: Vec<StoreRow>,
    /// Current-batch rows still listed, `last_seen` refreshed.
    pub update: Vec<StoreRow>,
    /// Current-batch rows no longer listed, written back unchanged.
    pub removed: Vec<StoreRow>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.insert.is_empty() && self.update.is_empty() && self.removed.is_empty()
    }

    /// Whether the operator should hear about this run.
    pub fn has_changes(&self) -> bool {
        !self.insert.is_empty() || !self.removed.is_empty()
    }
}

/// Leading rows sharing the first row's `last_seen`.
pub fn current_batch(rows: &[StoreRow]) -> &[StoreRow] {
    let Some(first) = rows.first() else {
        return &[];
    };
    let len = rows
        .iter()
        .take_while(|r| r.last_seen == first.last_seen)
        .count();
    &rows[..len]
}

/// Classify scraped products against the stored rows (most recent batch first).
pub fn diff(products: &[Product], rows: &[StoreRow], now: &str, policy: UpdatePolicy) -> Diff {
    let batch = current_batch(rows);
    debug!("Current batch: {} of {} stored rows", batch.len(), rows.len());

    let mut seen = HashSet::new();
    let scraped: Vec<&Product> = products
        .iter()
        .filter(|p| {
            let fresh = seen.insert(p.name.as_str());
            if !fresh {
                warn!("Duplicate product in scrape, keeping first: {}", p.name);
            }
            fresh
        })
        .collect();

    let mut out = Diff::default();
    let mut matched: HashSet<&str> = HashSet::new();

    for row in batch {
        let product = scraped.iter().find(|p| p.name == row.name);
        if product.is_some() && matched.contains(row.name.as_str()) {
            warn!("Duplicate row in current batch, retiring it: {}", row.name);
            out.removed.push(row.clone());
            continue;
        }
        match product {
            Some(product) => {
                matched.insert(row.name.as_str());
                let (original_price, sale_price) = match policy {
                    UpdatePolicy::Refresh => (product.original_price, product.sale_price),
                    UpdatePolicy::Retain => (row.original_price, row.sale_price),
                };
                out.update.push(StoreRow {
                    first_seen: row.first_seen.clone(),
                    last_seen: now.to_string(),
                    name: row.name.clone(),
                    original_price,
                    sale_price,
                });
            }
            None => out.removed.push(row.clone()),
        }
    }

    out.insert = scraped
        .into_iter()
        .filter(|p| !matched.contains(p.name.as_str()))
        .map(|p| StoreRow::first_sighting(p, now))
        .collect();

    out
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use super::*;

    const NOW: &str = "2024-01-03 09:30:00";

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn product(name: &str, original: &str, sale: &str) -> Product {
        Product::new(name, dec(original), dec(sale))
    }

    fn row(first: &str, last: &str, name: &str, original: &str, sale: &str) -> StoreRow {
        StoreRow {
            first_seen: first.into(),
            last_seen: last.into(),
            name: name.into(),
            original_price: dec(original),
            sale_price: dec(sale),
        }
    }

    fn names(rows: &[StoreRow]) -> Vec<&str> {
        rows.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn empty_store_inserts_everything() {
        let products = vec![
            product("Widget A", "129.99", "99.99"),
            product("Widget B", "59.00", "45.00"),
        ];
        let d = diff(&products, &[], NOW, UpdatePolicy::Refresh);
        assert_eq!(names(&d.insert), ["Widget A", "Widget B"]);
        assert!(d.update.is_empty());
        assert!(d.removed.is_empty());
        assert!(d.insert.iter().all(|r| r.first_seen == NOW && r.last_seen == NOW));
    }

    #[test]
    fn current_batch_stops_at_first_mismatch() {
        let rows = vec![
            row("2024-01-01 10:00:00", "2024-01-02 10:00:00", "A", "1", "1"),
            row("2023-12-01 10:00:00", "2024-01-02 10:00:00", "B", "1", "1"),
            row("2023-11-01 10:00:00", "2023-12-20 10:00:00", "C", "1", "1"),
            row("2023-10-01 10:00:00", "2024-01-02 10:00:00", "D", "1", "1"),
        ];
        assert_eq!(names(current_batch(&rows)), ["A", "B"]);
        assert!(current_batch(&[]).is_empty());
    }

    #[test]
    fn unchanged_listing_is_update_only() {
        let rows = vec![row(
            "2024-01-01 10:00:00",
            "2024-01-02 10:00:00",
            "Widget A",
            "129.99",
            "99.99",
        )];
        let d = diff(&[product("Widget A", "129.99", "99.99")], &rows, NOW, UpdatePolicy::Refresh);
        assert!(d.insert.is_empty());
        assert!(d.removed.is_empty());
        assert!(!d.has_changes());
        assert_eq!(d.update.len(), 1);
        assert_eq!(d.update[0].first_seen, "2024-01-01 10:00:00");
        assert_eq!(d.update[0].last_seen, NOW);
    }

    #[test]
    fn vanished_product_is_removed() {
        let rows = vec![
            row("2024-01-01 10:00:00", "2024-01-02 10:00:00", "Widget A", "129.99", "99.99"),
            row("2024-01-01 10:00:00", "2024-01-02 10:00:00", "Widget B", "59.00", "45.00"),
        ];
        let d = diff(&[product("Widget B", "59.00", "45.00")], &rows, NOW, UpdatePolicy::Refresh);
        assert!(d.insert.is_empty());
        assert_eq!(names(&d.update), ["Widget B"]);
        assert_eq!(d.removed, vec![rows[0].clone()]);
        assert!(d.has_changes());
    }

    #[test]
    fn rows_outside_current_batch_are_ignored() {
        let rows = vec![
            row("2024-01-02 10:00:00", "2024-01-02 10:00:00", "Widget B", "59.00", "45.00"),
            row("2023-12-01 10:00:00", "2023-12-05 10:00:00", "Widget A", "129.99", "99.99"),
        ];
        // Widget A sold out earlier; seeing it again makes it new.
        let d = diff(
            &[product("Widget A", "129.99", "89.99"), product("Widget B", "59.00", "45.00")],
            &rows,
            NOW,
            UpdatePolicy::Refresh,
        );
        assert_eq!(names(&d.insert), ["Widget A"]);
        assert_eq!(names(&d.update), ["Widget B"]);
        assert!(d.removed.is_empty());
    }

    #[test]
    fn duplicate_batch_row_is_matched_once() {
        let rows = vec![
            row("2024-01-01 10:00:00", "2024-01-02 10:00:00", "Widget A", "129.99", "99.99"),
            row("2023-12-01 10:00:00", "2024-01-02 10:00:00", "Widget A", "129.99", "89.99"),
        ];
        let d = diff(&[product("Widget A", "129.99", "99.99")], &rows, NOW, UpdatePolicy::Refresh);
        assert!(d.insert.is_empty());
        assert_eq!(d.update.len(), 1);
        assert_eq!(d.update[0].first_seen, "2024-01-01 10:00:00");
        assert_eq!(d.removed, vec![rows[1].clone()]);

        // The retired copy keeps its old last_seen and drops out of the next batch.
        let mut next = d.update.clone();
        next.extend(d.removed.clone());
        let again = diff(&[product("Widget A", "129.99", "99.99")], &next, NOW, UpdatePolicy::Refresh);
        assert_eq!(again.update.len(), 1);
        assert!(again.removed.is_empty());
    }

    #[test]
    fn update_policy_controls_prices() {
        let rows = vec![row("2024-01-01 10:00:00", "2024-01-01 10:00:00", "Widget A", "129.99", "99.99")];
        let scraped = [product("Widget A", "129.99", "79.99")];

        let refreshed = diff(&scraped, &rows, NOW, UpdatePolicy::Refresh);
        assert_eq!(refreshed.update[0].sale_price, dec("79.99"));

        let retained = diff(&scraped, &rows, NOW, UpdatePolicy::Retain);
        assert_eq!(retained.update[0].sale_price, dec("99.99"));
    }

    #[test]
    fn every_name_lands_in_exactly_one_set() {
        let rows = vec![
            row("2024-01-01 10:00:00", "2024-01-02 10:00:00", "A", "10", "8"),
            row("2024-01-01 10:00:00", "2024-01-02 10:00:00", "B", "10", "8"),
            row("2024-01-01 10:00:00", "2024-01-02 10:00:00", "C", "10", "8"),
            row("2023-01-01 10:00:00", "2023-01-02 10:00:00", "D", "10", "8"),
        ];
        let scrapes: Vec<Vec<Product>> = vec![
            vec![],
            vec![product("A", "10", "8")],
            vec![product("B", "10", "8"), product("E", "10", "8"), product("E", "10", "7")],
            vec![product("D", "10", "8"), product("C", "10", "8"), product("A", "10", "8")],
        ];
        for scrape in scrapes {
            let d = diff(&scrape, &rows, NOW, UpdatePolicy::Refresh);
            let all: Vec<&str> = names(&d.insert)
                .into_iter()
                .chain(names(&d.update))
                .chain(names(&d.removed))
                .collect();
            let unique: HashSet<&str> = all.iter().copied().collect();
            assert_eq!(all.len(), unique.len(), "double classification in {:?}", all);

            let scraped: HashSet<&str> = scrape.iter().map(|p| p.name.as_str()).collect();
            let batch: HashSet<&str> = ["A", "B", "C"].into_iter().collect();
            let expected: HashSet<&str> = scraped.union(&batch).copied().collect();
            assert_eq!(unique, expected);
        }
    }

    #[test]
    fn second_run_is_quiet() {
        let stored = vec![
            row("2024-01-01 10:00:00", "2024-01-02 10:00:00", "Old", "10", "8"),
            row("2024-01-01 10:00:00", "2024-01-02 10:00:00", "Kept", "10", "8"),
        ];
        let scrape = vec![product("Kept", "10", "8"), product("Fresh", "20", "15")];

        let first = diff(&scrape, &stored, NOW, UpdatePolicy::Refresh);
        assert!(first.has_changes());

        // Store layout after the writer: inserts on top, then updates, then removed.
        let mut next: Vec<StoreRow> = first.insert.clone();
        next.extend(first.update.clone());
        next.extend(first.removed.clone());

        let second = diff(&scrape, &next, "2024-01-03 10:30:00", UpdatePolicy::Refresh);
        assert!(second.insert.is_empty());
        assert!(second.removed.is_empty());
        assert_eq!(names(&second.update), ["Fresh", "Kept"]);
    }
}
