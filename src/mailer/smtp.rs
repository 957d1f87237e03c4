use std::time::Duration;

use anyhow::anyhow;
use lettre::{
    message::{header::ContentType, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use serde_json::Value;
use tracing::info;

use super::{templates, Mailer};
use crate::config::SmtpConfig;

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: String,
}

impl SmtpMailer {
    pub fn new(cfg: &SmtpConfig) -> anyhow::Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)
            .map_err(|e| anyhow!("failed to create SMTP transport: {e}"))?
            .port(cfg.port)
            .timeout(Some(Duration::from_secs(5)));
        if !cfg.username.is_empty() {
            builder = builder.credentials(Credentials::new(cfg.username.clone(), cfg.password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            sender: cfg.sender.clone(),
        })
    }
}

#[async_trait::async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, recipient: &str, template: &str, data: &Value) -> anyhow::Result<()> {
        let rendered = templates::render(template, data)?;

        let email = Message::builder()
            .from(
                self.sender
                    .parse()
                    .map_err(|e| anyhow!("invalid sender address: {e}"))?,
            )
            .to(recipient
                .parse()
                .map_err(|e| anyhow!("invalid recipient address: {e}"))?)
            .subject(rendered.subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(rendered.text),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(rendered.html),
                    ),
            )
            .map_err(|e| anyhow!("failed to build email: {e}"))?;

        // Transient relay failures get a few more chances.
        let mut attempt = 1;
        loop {
            match self.transport.send(email.clone()).await {
                Ok(_) => break,
                Err(e) if attempt < 3 => {
                    info!(attempt, error = %e, "smtp send failed, retrying");
                    attempt += 1;
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
                Err(e) => return Err(anyhow!("failed to send email via SMTP: {e}")),
            }
        }

        info!(%recipient, template, "mail sent");
        Ok(())
    }
}
