use std::fmt;

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, error, info, warn};

use crate::diff::Diff;
use crate::error::{ReconError, Result};
use crate::model::StoreRow;
use crate::price::{format_price, Locale};
use crate::settings::EmailSettings;

/// Port that speaks TLS from the first byte; anything else upgrades via STARTTLS.
const IMPLICIT_TLS_PORT: u16 = 465;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub subject: String,
    pub body: String,
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Subject: {}\n\n{}", self.subject, self.body)
    }
}

/// Somewhere to deliver the run summary.
#[allow(async_fn_in_trait)]
pub trait MailSink {
    async fn send(&self, email: &Email) -> Result<()>;
}

/// Subject line for the changes in `diff`.
pub fn subject(site_name: &str, diff: &Diff) -> String {
    let what = match diff.insert.as_slice() {
        [only] => only.name.clone(),
        [] if !diff.removed.is_empty() => format!("{} out-of-stock products", diff.removed.len()),
        [] => "changes in product inventory".to_string(),
        many => format!("{} new products", many.len()),
    };
    format!("[{}] - {}", site_name, what)
}

pub fn compose(site_name: &str, diff: &Diff, locale: &Locale) -> Email {
    let new_products: String = diff
        .insert
        .iter()
        .map(|r| {
            format!(
                "\n\t{} - {} / {}",
                r.name,
                format_price(r.sale_price, locale),
                format_price(r.original_price, locale)
            )
        })
        .collect();

    let body = format!(
        "New products:  {}\n\nSold out products:  {}\n\nStill on sale:  {}",
        new_products,
        name_list(&diff.removed),
        name_list(&diff.update)
    );

    Email {
        subject: subject(site_name, diff),
        body,
    }
}

fn name_list(rows: &[StoreRow]) -> String {
    rows.iter().map(|r| format!("\n\t{}", r.name)).collect()
}

/// Hand the email to the sink unless this is a dry run. Delivery problems are
/// logged, never returned: the store has already been written by now.
pub async fn deliver<M: MailSink>(mailer: Option<&M>, email: &Email, dry_run: bool) -> bool {
    debug!("Email message:\n{}", email);
    if dry_run {
        info!("Dry-run mode: not sending email:\n{}", email);
        return false;
    }
    let Some(mailer) = mailer else {
        warn!("No email sender or password found, not sending:\n{}", email);
        return false;
    };
    match mailer.send(email).await {
        Ok(()) => true,
        Err(e) => {
            error!("Failed to send email: {}", e);
            false
        }
    }
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl SmtpMailer {
    pub fn new(settings: &EmailSettings) -> Result<Self> {
        let from: Mailbox = settings
            .sender
            .parse()
            .map_err(|e| ReconError::Config(format!("email sender: {}", e)))?;
        let to: Mailbox = settings
            .recipient
            .parse()
            .map_err(|e| ReconError::Config(format!("email recipient: {}", e)))?;

        let builder = if settings.smtp_port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.smtp_host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.smtp_host)
        }
        .map_err(|e| ReconError::Config(format!("smtp host: {}", e)))?;

        let transport = builder
            .port(settings.smtp_port)
            .credentials(Credentials::new(
                settings.sender.clone(),
                settings.password.expose().to_string(),
            ))
            .build();

        Ok(Self { transport, from, to })
    }
}

impl MailSink for SmtpMailer {
    async fn send(&self, email: &Email) -> Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(email.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(email.body.clone())
            .map_err(|e| ReconError::Email(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| ReconError::Email(e.to_string()))?;
        info!("Email sent from {}", self.from);
        Ok(())
    }
}
