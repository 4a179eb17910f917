//! Error taxonomy for a monitoring run.
//!
//! Network, parse, price and store failures abort the run. Missing email
//! credentials and SMTP failures are reported but never abort, since by the
//! time the notifier runs the store may already have been written.

pub type Result<T> = std::result::Result<T, ReconError>;

#[derive(Debug, thiserror::Error)]
pub enum ReconError {
    /// Page fetch failed or returned a non-success status.
    #[error("fetch failed for {url}: {message}")]
    Network { url: String, message: String },

    /// An expected element was missing from the page.
    #[error("element `{selector}` not found{}", context_suffix(.context))]
    Parse {
        selector: &'static str,
        context: Option<String>,
    },

    /// Text could not be read as a price in the configured locale.
    #[error("invalid price {text:?} for locale {locale}")]
    Price { text: String, locale: &'static str },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("email error: {0}")]
    Email(String),

    #[error("write journal error: {0}")]
    Journal(#[from] std::io::Error),
}

fn context_suffix(context: &Option<String>) -> String {
    match context {
        Some(c) => format!(" in {}", c),
        None => String::new(),
    }
}

impl ReconError {
    pub fn network(url: &str, err: impl std::fmt::Display) -> Self {
        ReconError::Network {
            url: url.to_string(),
            message: err.to_string(),
        }
    }

    pub fn missing(selector: &'static str) -> Self {
        ReconError::Parse {
            selector,
            context: None,
        }
    }
}

impl From<rusqlite::Error> for ReconError {
    fn from(e: rusqlite::Error) -> Self {
        ReconError::Store(e.to_string())
    }
}

impl From<serde_json::Error> for ReconError {
    fn from(e: serde_json::Error) -> Self {
        ReconError::Journal(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}
