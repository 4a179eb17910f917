use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};

use crate::error::{ReconError, Result};
use crate::fetch::PageSource;
use crate::model::Product;
use crate::price::{parse_price, Locale};

const SINGLE_TITLE: &str = "h1.product-single__title";
const SINGLE_COMPARE_PRICE: &str = "#ComparePrice-product-template";
const SINGLE_SALE_PRICE: &str = "#ProductPrice-product-template";
const COLLECTION_LINK: &str = "a.collection-card";
const CARD: &str = ".product-card__info";
const CARD_NAME: &str = ".product-card__name";
const CARD_REGULAR_PRICE: &str = ".product-card__regular-price";
const CARD_PRICE: &str = ".product-card__price";

static SINGLE_TITLE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse(SINGLE_TITLE).unwrap());
static SINGLE_COMPARE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse(SINGLE_COMPARE_PRICE).unwrap());
static SINGLE_SALE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse(SINGLE_SALE_PRICE).unwrap());
static COLLECTION_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse(COLLECTION_LINK).unwrap());
static CARD_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse(CARD).unwrap());
static CARD_NAME_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse(CARD_NAME).unwrap());
static CARD_REGULAR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse(CARD_REGULAR_PRICE).unwrap());
static CARD_PRICE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse(CARD_PRICE).unwrap());

/// What the landing page turned out to be.
#[derive(Debug)]
pub enum Landing {
    /// A single product page; the one extraction attempt.
    Single(Result<Product>),
    /// A collection card pointing at the listing page (absolute URL).
    Collection(String),
    Nothing,
}

/// Fetch the root page and, if needed, the collection page it links to.
///
/// Each product comes back as its own `Result` so the caller decides whether
/// one broken card aborts the run.
pub async fn extract_products<S: PageSource>(
    source: &S,
    root_url: &str,
    site_root: &str,
    locale: &Locale,
) -> Result<Vec<Result<Product>>> {
    let html = source.get(root_url).await?;

    match read_landing(&html, site_root, locale) {
        Landing::Single(product) => {
            if let Ok(p) = &product {
                debug!("Single product: {} - {} - {}", p.name, p.original_price, p.sale_price);
            }
            Ok(vec![product])
        }
        Landing::Collection(url) => {
            debug!("Collection page found, navigating to <{}>", url);
            let listing = source.get(&url).await?;
            let products = read_collection(&listing, locale);
            debug!("Multiple products found: {}", products.len());
            for p in products.iter().flatten() {
                debug!("    {} - {} - {}", p.name, p.original_price, p.sale_price);
            }
            Ok(products)
        }
        Landing::Nothing => {
            info!("No products found...");
            Ok(Vec::new())
        }
    }
}

/// Classify the landing page. Single-product markup wins over a collection link.
pub fn read_landing(html: &str, site_root: &str, locale: &Locale) -> Landing {
    let doc = Html::parse_document(html);

    if let Some(title) = doc.select(&SINGLE_TITLE_SEL).next() {
        return Landing::Single(read_single(&doc, title, locale));
    }

    match doc
        .select(&COLLECTION_SEL)
        .next()
        .and_then(|a| a.value().attr("href"))
    {
        Some(href) => Landing::Collection(absolute_url(href, site_root)),
        None => Landing::Nothing,
    }
}

fn read_single(doc: &Html, title: ElementRef, locale: &Locale) -> Result<Product> {
    let name = title_text(title);
    let compare = doc
        .select(&SINGLE_COMPARE_SEL)
        .next()
        .ok_or_else(|| ReconError::missing(SINGLE_COMPARE_PRICE))?;
    let sale = doc
        .select(&SINGLE_SALE_SEL)
        .next()
        .ok_or_else(|| ReconError::missing(SINGLE_SALE_PRICE))?;

    Ok(Product::new(
        name,
        parse_price(&compare.text().collect::<String>(), locale)?,
        parse_price(&own_text(sale), locale)?,
    ))
}

/// One extraction attempt per listing card.
pub fn read_collection(html: &str, locale: &Locale) -> Vec<Result<Product>> {
    let doc = Html::parse_document(html);
    doc.select(&CARD_SEL)
        .enumerate()
        .map(|(i, card)| read_card(card, i + 1, locale))
        .collect()
}

fn read_card(card: ElementRef, index: usize, locale: &Locale) -> Result<Product> {
    let within = |selector: &'static str, sel: &Selector| {
        card.select(sel).next().ok_or_else(|| ReconError::Parse {
            selector,
            context: Some(format!("product card {}", index)),
        })
    };

    let name = within(CARD_NAME, &CARD_NAME_SEL)?;
    let regular = within(CARD_REGULAR_PRICE, &CARD_REGULAR_SEL)?;
    let price = within(CARD_PRICE, &CARD_PRICE_SEL)?;

    Ok(Product::new(
        title_text(name),
        parse_price(&regular.text().collect::<String>(), locale)?,
        parse_price(&own_text(price), locale)?,
    ))
}

/// Concatenate the element's direct text nodes only, skipping nested markup
/// such as a struck-through "was" price.
fn own_text(el: ElementRef) -> String {
    el.children()
        .filter_map(|node| node.value().as_text())
        .map(|text| &**text)
        .collect::<String>()
        .trim()
        .to_string()
}

/// Full text of a title element, trimmed at the ends only. Stored names are
/// matched byte for byte, so inner line breaks are kept as the site serves them.
fn title_text(el: ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn absolute_url(href: &str, site_root: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else {
        format!("{}{}", site_root.trim_end_matches('/'), href)
    }
}
