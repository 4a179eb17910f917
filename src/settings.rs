use std::fmt;
use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::diff::UpdatePolicy;
use crate::error::{ReconError, Result};
use crate::price::Locale;

const ENV_PREFIX: &str = "RECON";

/// Credential that never shows up in logs.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("\"***\"")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sheets,
    Sqlite,
}

/// What to do when one product on the page cannot be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractPolicy {
    /// Fail the whole run.
    #[default]
    Abort,
    /// Log it and carry on with the rest.
    Skip,
}

/// Everything a run needs, built once at startup.
///
/// Layered as built-in defaults, then an optional TOML file, then
/// `RECON_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub root_url: String,
    /// Prefix for relative collection links; defaults to `root_url`.
    pub site_root: Option<String>,
    /// Used in the email subject tag.
    pub site_name: String,
    pub locale: Locale,

    pub email_sender: Option<String>,
    pub email_password: Option<Secret>,
    pub email_recipient: Option<String>,
    pub smtp_host: String,
    pub smtp_port: u16,

    pub store: StoreBackend,
    pub sheet_id: Option<String>,
    pub sheets_token: Option<Secret>,
    pub primary_worksheet: usize,
    pub devel_worksheet: usize,
    pub sqlite_path: PathBuf,

    pub journal_path: PathBuf,
    pub update_policy: UpdatePolicy,
    pub on_extract_error: ExtractPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            root_url: "https://www.festoolrecon.com".into(),
            site_root: None,
            site_name: "Festool Recon".into(),
            locale: Locale::default(),
            email_sender: None,
            email_password: None,
            email_recipient: None,
            smtp_host: "smtp.gmail.com".into(),
            smtp_port: 465,
            store: StoreBackend::default(),
            sheet_id: None,
            sheets_token: None,
            primary_worksheet: 0,
            devel_worksheet: 1,
            sqlite_path: PathBuf::from("data/recon.sqlite"),
            journal_path: PathBuf::from("data/write_journal.jsonl"),
            update_policy: UpdatePolicy::default(),
            on_extract_error: ExtractPolicy::default(),
        }
    }
}

/// Sender, password and recipient, all present.
#[derive(Debug, Clone)]
pub struct EmailSettings {
    pub sender: String,
    pub password: Secret,
    pub recipient: String,
    pub smtp_host: String,
    pub smtp_port: u16,
}

impl Settings {
    pub fn load(file: &Path) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from(file).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()
            .and_then(|c| c.try_deserialize::<Settings>())
            .map_err(|e| ReconError::Config(e.to_string()))?;
        Ok(settings)
    }

    pub fn site_root(&self) -> &str {
        self.site_root.as_deref().unwrap_or(&self.root_url)
    }

    pub fn worksheet(&self, devel: bool) -> usize {
        if devel {
            self.devel_worksheet
        } else {
            self.primary_worksheet
        }
    }

    /// Email settings, or a `Config` error naming what is missing.
    pub fn email(&self) -> Result<EmailSettings> {
        let (Some(sender), Some(password)) = (&self.email_sender, &self.email_password) else {
            return Err(ReconError::Config("no email sender or password found".into()));
        };
        let recipient = self
            .email_recipient
            .clone()
            .ok_or_else(|| ReconError::Config("no email recipient configured".into()))?;
        Ok(EmailSettings {
            sender: sender.clone(),
            password: password.clone(),
            recipient,
            smtp_host: self.smtp_host.clone(),
            smtp_port: self.smtp_port,
        })
    }

    /// Spreadsheet id and token for the Sheets backend.
    pub fn sheets(&self) -> Result<(&str, &Secret)> {
        match (&self.sheet_id, &self.sheets_token) {
            (Some(id), Some(token)) => Ok((id, token)),
            _ => Err(ReconError::Config(format!(
                "sheets store needs {0}_SHEET_ID and {0}_SHEETS_TOKEN",
                ENV_PREFIX
            ))),
        }
    }
}
