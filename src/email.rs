use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, Message},
    transport::smtp::authentication::Credentials,
    transport::smtp::client::{Tls, TlsParameters},
    AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
};
use log::debug;
use std::time::Duration;

use crate::config::{Config, SenderCredentials};
use crate::error::AlertError;
use crate::models::OutgoingEmail;
use crate::notifier::Mailer;

const IMPLICIT_TLS_PORT: u16 = 465;

pub struct SmtpMailer {
    from: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(cfg: &Config, sender: &SenderCredentials) -> Result<Self, AlertError> {
        let from = sender
            .email
            .parse::<Mailbox>()
            .map_err(|e| AlertError::Config(format!("invalid sender address: {e}")))?;

        let tls_parameters = TlsParameters::new(cfg.smtp_host.clone())
            .map_err(|e| AlertError::Config(format!("TLS setup for {}: {e}", cfg.smtp_host)))?;

        // 465 speaks TLS from the first byte; anything else (587) upgrades with STARTTLS.
        let tls = if cfg.smtp_port == IMPLICIT_TLS_PORT {
            Tls::Wrapper(tls_parameters)
        } else {
            Tls::Required(tls_parameters)
        };

        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(cfg.smtp_host.as_str())
            .port(cfg.smtp_port)
            .tls(tls)
            .credentials(Credentials::new(sender.email.clone(), sender.password.clone()))
            .timeout(Some(Duration::from_secs(30)))
            .build();

        debug!("SMTP transport ready for {}:{}", cfg.smtp_host, cfg.smtp_port);
        Ok(Self { from, transport })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), AlertError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(email.subject.clone())
            .header(ContentType::TEXT_PLAIN);

        // Bcc only, so no recipient sees the others.
        for rcpt in &email.bcc {
            let mailbox = rcpt
                .parse::<Mailbox>()
                .map_err(|e| AlertError::Delivery(format!("invalid recipient {rcpt}: {e}")))?;
            builder = builder.bcc(mailbox);
        }

        let message = builder
            .body(email.body.clone())
            .map_err(|e| AlertError::Delivery(format!("could not build message: {e}")))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| AlertError::Delivery(e.to_string()))?;

        Ok(())
    }
}
