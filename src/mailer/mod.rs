use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::info;

mod smtp;
pub mod templates;

pub use smtp::SmtpMailer;

use crate::config::SmtpConfig;

/// Outbound notification sink. Callers run it off the request path and only
/// log failures.
#[async_trait::async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, recipient: &str, template: &str, data: &Value) -> anyhow::Result<()>;
}

pub type DynMailer = Arc<dyn Mailer>;

pub fn create_mailer(smtp: Option<&SmtpConfig>) -> anyhow::Result<DynMailer> {
    match smtp {
        Some(cfg) => Ok(Arc::new(SmtpMailer::new(cfg)?)),
        None => {
            info!("no SMTP host configured, mail will only be logged");
            Ok(Arc::new(LogMailer::new()))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delivered {
    pub recipient: String,
    pub template: String,
    pub data: Value,
}

/// Renders and logs mail instead of sending it. A recording instance also
/// keeps every message for inspection.
#[derive(Default)]
pub struct LogMailer {
    outbox: Option<Mutex<Vec<Delivered>>>,
}

impl LogMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recording() -> Self {
        Self {
            outbox: Some(Mutex::new(Vec::new())),
        }
    }

    pub fn delivered(&self) -> Vec<Delivered> {
        self.outbox
            .as_ref()
            .map(|o| o.lock().clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl Mailer for LogMailer {
    async fn send(&self, recipient: &str, template: &str, data: &Value) -> anyhow::Result<()> {
        let rendered = templates::render(template, data)?;
        info!(%recipient, template, subject = %rendered.subject, "mail (not sent)");
        if let Some(outbox) = &self.outbox {
            outbox.lock().push(Delivered {
                recipient: recipient.to_string(),
                template: template.to_string(),
                data: data.clone(),
            });
        }
        Ok(())
    }
}
