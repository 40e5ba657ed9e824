//! Webhook delivery gateway.
//!
//! The chat transport sits behind an HTTP edge: the engine POSTs
//! `{recipient, text}` and the transport fans it out to the actual
//! messaging platform. Non-2xx responses are failures and bubble up into
//! the caller's retry handling.

use std::time::Duration;

use anyhow::{Context, bail};
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use tandem_types::DeliveryGateway;

pub struct WebhookDelivery {
    client: Client,
    url: String,
}

impl WebhookDelivery {
    pub fn new(url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("failed to build reqwest client");
        Self {
            client,
            url: url.into(),
        }
    }
}

#[derive(Serialize)]
struct DeliverPayload<'a> {
    recipient: &'a str,
    text: &'a str,
}

#[async_trait::async_trait]
impl DeliveryGateway for WebhookDelivery {
    async fn deliver(&self, chat_id: &str, text: &str) -> anyhow::Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&DeliverPayload {
                recipient: chat_id,
                text,
            })
            .send()
            .await
            .context("deliver request failed")?;

        if !response.status().is_success() {
            bail!("deliver failed with status {}", response.status());
        }
        debug!(recipient = chat_id, "Message delivered");
        Ok(())
    }
}
