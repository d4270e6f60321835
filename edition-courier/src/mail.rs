//! Mail relay integration: implements the [`MailSender`] contract against an
//! HTTP mail relay. One multipart POST per recipient; the relay handles the
//! actual SMTP framing.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use tracing::{error, info};

use edition_courier_core::contract::{MailSender, OutboundMail};
use edition_courier_core::error::{CourierError, Result};

use crate::load_config::MailSection;

pub struct MailRelayClient {
    http: reqwest::Client,
    endpoint: String,
    sender: String,
    token: String,
}

impl MailRelayClient {
    /// Construct from the mail config section; the relay token comes from
    /// the environment variable the section names.
    pub fn from_config(section: &MailSection) -> Result<Self> {
        let token = std::env::var(&section.token_env).map_err(|_| {
            CourierError::Configuration(format!(
                "mail relay token missing: set {}",
                section.token_env
            ))
        })?;
        let http = reqwest::Client::new();
        info!(endpoint = %section.endpoint, sender = %section.sender, "Initialized mail relay client");
        Ok(Self {
            http,
            endpoint: section.endpoint.clone(),
            sender: section.sender.clone(),
            token,
        })
    }
}

#[async_trait]
impl MailSender for MailRelayClient {
    async fn send(&self, mail: OutboundMail) -> Result<()> {
        info!(to = %mail.to, subject = %mail.subject, "Sending mail via relay");

        let mut form = Form::new()
            .text("from", self.sender.clone())
            .text("to", mail.to.clone())
            .text("subject", mail.subject.clone())
            .text("body", mail.body);
        if let Some(attachment) = mail.attachment {
            let part = Part::bytes(attachment.bytes)
                .file_name(attachment.filename)
                .mime_str("application/octet-stream")
                .map_err(|e| CourierError::delivery("email", e))?;
            form = form.part("attachment", part);
        }

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                error!(to = %mail.to, error = %e, "Mail relay transport failure");
                CourierError::Transient(format!("mail relay: {e}"))
            })?;

        let status = response.status();
        match status {
            s if s.is_success() => {
                info!(to = %mail.to, "Mail accepted by relay");
                Ok(())
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                error!(to = %mail.to, %status, "Mail relay rejected the token");
                Err(CourierError::Authentication(format!(
                    "mail relay rejected the token ({status})"
                )))
            }
            s if s.is_server_error() => {
                error!(to = %mail.to, %status, "Mail relay upstream failure");
                Err(CourierError::Transient(format!("mail relay: {status}")))
            }
            _ => {
                error!(to = %mail.to, %status, "Mail relay refused the message");
                Err(CourierError::delivery(
                    "email",
                    format!("relay refused the message for {}: {status}", mail.to),
                ))
            }
        }
    }
}
