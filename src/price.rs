use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::{ReconError, Result};

/// Currency and number conventions for one locale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Locale {
    pub tag: &'static str,
    pub symbol: &'static str,
    pub group: char,
    pub decimal: char,
    pub symbol_first: bool,
    /// Space between amount and symbol when the symbol trails.
    pub spaced: bool,
}

pub const EN_US: Locale = Locale {
    tag: "en_US",
    symbol: "$",
    group: ',',
    decimal: '.',
    symbol_first: true,
    spaced: false,
};

pub const EN_GB: Locale = Locale {
    tag: "en_GB",
    symbol: "£",
    group: ',',
    decimal: '.',
    symbol_first: true,
    spaced: false,
};

pub const DE_DE: Locale = Locale {
    tag: "de_DE",
    symbol: "€",
    group: '.',
    decimal: ',',
    symbol_first: false,
    spaced: true,
};

pub const FR_FR: Locale = Locale {
    tag: "fr_FR",
    symbol: "€",
    group: '\u{202f}',
    decimal: ',',
    symbol_first: false,
    spaced: true,
};

const LOCALES: &[Locale] = &[EN_US, EN_GB, DE_DE, FR_FR];

impl Locale {
    pub fn from_tag(tag: &str) -> Option<Locale> {
        let tag = tag.replace('-', "_");
        LOCALES.iter().copied().find(|l| l.tag.eq_ignore_ascii_case(&tag))
    }
}

impl Default for Locale {
    fn default() -> Self {
        EN_US
    }
}

impl<'de> Deserialize<'de> for Locale {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let tag = String::deserialize(d)?;
        Locale::from_tag(&tag)
            .ok_or_else(|| serde::de::Error::custom(format!("unsupported locale `{}`", tag)))
    }
}

/// Parse a localized price such as `$1,299.00` or `1.299,00 €`.
pub fn parse_price(text: &str, locale: &Locale) -> Result<Decimal> {
    let bad = || ReconError::Price {
        text: text.to_string(),
        locale: locale.tag,
    };

    let trimmed = text.trim();
    let unsigned = trimmed
        .strip_prefix(locale.symbol)
        .or_else(|| trimmed.strip_suffix(locale.symbol))
        .unwrap_or(trimmed)
        .trim();

    let mut normalized = String::with_capacity(unsigned.len());
    for c in unsigned.chars() {
        if c == locale.group || (locale.group.is_whitespace() && c.is_whitespace()) {
            continue;
        } else if c == locale.decimal {
            normalized.push('.');
        } else if c.is_ascii_digit() || (c == '-' && normalized.is_empty()) {
            normalized.push(c);
        } else {
            return Err(bad());
        }
    }

    if normalized.is_empty() || normalized == "-" {
        return Err(bad());
    }
    Decimal::from_str(&normalized).map_err(|_| bad())
}

/// Render a price with two fraction digits in the locale's conventions.
pub fn format_price(value: Decimal, locale: &Locale) -> String {
    let rounded = value.round_dp(2);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let plain = format!("{:.2}", rounded.abs());
    let (int_part, frac_part) = plain.split_once('.').unwrap_or((plain.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(locale.group);
        }
        grouped.push(c);
    }

    let amount = format!(
        "{}{}{}{}",
        if negative { "-" } else { "" },
        grouped,
        locale.decimal,
        frac_part
    );
    match (locale.symbol_first, locale.spaced) {
        (true, false) => format!("{}{}", locale.symbol, amount),
        (true, true) => format!("{} {}", locale.symbol, amount),
        (false, true) => format!("{} {}", amount, locale.symbol),
        (false, false) => format!("{}{}", amount, locale.symbol),
    }
}
