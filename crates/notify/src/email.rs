//! SMTP email notifier via `lettre` with TLS support.
//!
//! Delivers rendered alerts as plain-text emails. Supports STARTTLS and
//! implicit TLS connections.

use lettre::{
    message::Mailbox, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};
use runwatch_core::config::EmailConfig;

use crate::traits::{Notification, Notifier, NotifyError};

/// Sends notifications as emails via SMTP.
#[derive(Debug)]
pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl EmailNotifier {
    /// Build an `EmailNotifier` from the `[email]` config section.
    ///
    /// Port defaults to 587. Port 465 uses implicit TLS; any other port uses
    /// STARTTLS unless `tls = false`. Credentials come from
    /// [`EmailConfig::credentials`]; without them the connection is
    /// unauthenticated.
    pub fn from_config(config: &EmailConfig) -> Result<Self, NotifyError> {
        let from_mailbox: Mailbox = config
            .from
            .parse()
            .map_err(|e: lettre::address::AddressError| NotifyError::Config(e.to_string()))?;

        let to_mailboxes: Vec<Mailbox> = config
            .to
            .iter()
            .map(|addr| {
                addr.parse()
                    .map_err(|e: lettre::address::AddressError| NotifyError::Config(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if to_mailboxes.is_empty() {
            return Err(NotifyError::Config(
                "at least one recipient is required".to_string(),
            ));
        }

        let host = config.smtp_host.as_str();
        let port = config.smtp_port.unwrap_or(587);
        let use_tls = config.tls.unwrap_or(true);

        let mut builder = if port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .map_err(|e| NotifyError::Config(e.to_string()))?
                .port(port)
        } else if use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| NotifyError::Config(e.to_string()))?
                .port(port)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host).port(port)
        };

        if let Some((username, password)) = config.credentials() {
            builder = builder.credentials(Credentials::new(username, password));
        } else {
            tracing::debug!(host, "no SMTP credentials configured, sending unauthenticated");
        }

        Ok(Self {
            transport: builder.build(),
            from: from_mailbox,
            to: to_mailboxes,
        })
    }
}

#[async_trait::async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut message_builder = Message::builder().from(self.from.clone());

        for recipient in &self.to {
            message_builder = message_builder.to(recipient.clone());
        }

        let email = message_builder
            .subject(&notification.subject)
            .body(notification.body.clone())
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        tracing::info!(
            channel = "email",
            subject = %notification.subject,
            recipients = self.to.len(),
            "notification delivered"
        );

        Ok(())
    }

    fn channel_name(&self) -> &str {
        "email"
    }
}
