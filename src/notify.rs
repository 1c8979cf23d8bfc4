//! Outbound email.

use async_trait::async_trait;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_sesv2::{
    config::Region,
    types::{Body, Content, Destination, EmailContent, Message},
    Client,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::config::MailConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryReceipt {
    pub message_id: String,
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("could not build message: {0}")]
    Message(String),

    #[error("mail transport failed: {0}")]
    Transport(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str)
        -> Result<DeliveryReceipt, DeliveryError>;
}

/// Sends plain-text mail through AWS SES v2.
#[derive(Clone)]
pub struct SesNotifier {
    client: Client,
    from: String,
}

impl SesNotifier {
    pub async fn new(config: &MailConfig) -> Self {
        let mut loader = defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));
        if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
            loader = loader.credentials_provider(Credentials::new(
                access_key, secret_key, None, None, "static",
            ));
        }
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;

        Self {
            client: Client::new(&shared),
            from: config.from.clone(),
        }
    }
}

fn utf8(data: &str) -> Result<Content, DeliveryError> {
    Content::builder()
        .data(data)
        .charset("UTF-8")
        .build()
        .map_err(|e| DeliveryError::Message(e.to_string()))
}

#[async_trait]
impl Notifier for SesNotifier {
    #[instrument(skip(self, body))]
    async fn send(
        &self,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let message = Message::builder()
            .subject(utf8(subject)?)
            .body(Body::builder().text(utf8(body)?).build())
            .build();

        let result = self
            .client
            .send_email()
            .from_email_address(&self.from)
            .destination(Destination::builder().to_addresses(to).build())
            .content(EmailContent::builder().simple(message).build())
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "SES send failed");
                DeliveryError::Transport(e.to_string())
            })?;

        let message_id = result.message_id().unwrap_or("unknown").to_string();
        info!(%message_id, "email sent");
        Ok(DeliveryReceipt { message_id })
    }
}

/// Writes mail to the log instead of delivering it. Used when no transport
/// is configured.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        _body: &str,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let message_id = Uuid::new_v4().to_string();
        info!(%message_id, to, subject, "mail transport not configured; message logged only");
        Ok(DeliveryReceipt { message_id })
    }
}
