//! Messaging transport collaborator
//!
//! Outbound messages go to a chat gateway webhook; inbound traffic arrives as
//! [`InboundEvent`]s and is normalised into state machine events here.

use crate::state_machine::{Action, Command, DocumentMeta, Event, Outbound};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Delivery failed: {0}")]
    Delivery(String),
    #[error("Document fetch failed: {0}")]
    Fetch(String),
    #[error("Unknown button action: {0}")]
    UnknownAction(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Send a message; returns the transport's message reference
    async fn deliver(&self, participant_id: &str, message: &Outbound) -> Result<String, TransportError>;

    /// Download an uploaded document into `dest`; returns the byte count
    async fn fetch_document(&self, file_ref: &str, dest: &Path) -> Result<u64, TransportError>;
}

// ============================================================================
// Inbound Normalisation
// ============================================================================

/// Raw participant input as posted by the chat gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    Text {
        text: String,
        /// Participant's handle, if the chat platform exposes one
        #[serde(default)]
        handle: Option<String>,
    },
    Document {
        file_name: String,
        size_bytes: u64,
        file_ref: String,
    },
    Button {
        action: String,
    },
}

impl InboundEvent {
    pub fn into_event(self) -> Result<Event, TransportError> {
        match self {
            InboundEvent::Text { text, handle } => {
                Ok(match Command::parse(&text, handle.as_deref()) {
                    Some(command) => Event::command(command),
                    None => Event::text(text),
                })
            }
            InboundEvent::Document {
                file_name,
                size_bytes,
                file_ref,
            } => Ok(Event::UserDocument {
                document: DocumentMeta {
                    file_name,
                    size_bytes,
                    file_ref,
                },
            }),
            InboundEvent::Button { action } => Action::parse(&action)
                .map(Event::button)
                .ok_or(TransportError::UnknownAction(action)),
        }
    }
}

// ============================================================================
// Webhook Transport
// ============================================================================

#[derive(Debug, Serialize)]
struct OutboundButton<'a> {
    text: &'a str,
    callback_data: &'a str,
}

#[derive(Debug, Serialize)]
struct OutboundPayload<'a> {
    participant_id: &'a str,
    text: &'a str,
    /// One button per row
    #[serde(skip_serializing_if = "Vec::is_empty")]
    buttons: Vec<Vec<OutboundButton<'a>>>,
}

impl<'a> OutboundPayload<'a> {
    fn new(participant_id: &'a str, message: &'a Outbound) -> Self {
        let buttons = message
            .controls
            .map(|controls| {
                controls
                    .buttons()
                    .iter()
                    .map(|&(text, callback_data)| vec![OutboundButton { text, callback_data }])
                    .collect()
            })
            .unwrap_or_default();
        Self {
            participant_id,
            text: &message.text,
            buttons,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DeliveryReceipt {
    #[serde(default)]
    message_id: Option<serde_json::Value>,
}

/// Posts outbound messages to a webhook and downloads documents over HTTP.
///
/// Without an outbound URL messages are only logged (local development).
pub struct WebhookTransport {
    client: Client,
    outbound_url: Option<Url>,
    document_url: Option<Url>,
}

impl WebhookTransport {
    pub fn new(
        outbound_url: Option<&str>,
        document_url: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let parse = |raw: Option<&str>| -> Result<Option<Url>, TransportError> {
            raw.filter(|u| !u.trim().is_empty())
                .map(|u| Url::parse(u).map_err(|e| TransportError::Delivery(format!("Invalid URL {u}: {e}"))))
                .transpose()
        };
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Delivery(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            outbound_url: parse(outbound_url)?,
            document_url: parse(document_url)?,
        })
    }

    fn document_endpoint(&self, file_ref: &str) -> Result<Url, TransportError> {
        let base = self
            .document_url
            .as_ref()
            .ok_or_else(|| TransportError::Fetch("No document URL configured".into()))?;
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|()| TransportError::Fetch(format!("Document URL {base} cannot be a base")))?
            .pop_if_empty()
            .push(file_ref);
        Ok(url)
    }
}

#[async_trait]
impl MessageTransport for WebhookTransport {
    async fn deliver(&self, participant_id: &str, message: &Outbound) -> Result<String, TransportError> {
        let Some(url) = &self.outbound_url else {
            tracing::info!(participant_id, text = %message.text, "Outbound message (no webhook configured)");
            return Ok(uuid::Uuid::new_v4().to_string());
        };

        let response = self
            .client
            .post(url.clone())
            .json(&OutboundPayload::new(participant_id, message))
            .send()
            .await
            .map_err(|e| TransportError::Delivery(format!("Request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Delivery(format!("HTTP {status}: {body}")));
        }

        let receipt: DeliveryReceipt = response
            .json()
            .await
            .unwrap_or(DeliveryReceipt { message_id: None });
        Ok(match receipt.message_id {
            Some(serde_json::Value::String(id)) => id,
            Some(other) => other.to_string(),
            None => uuid::Uuid::new_v4().to_string(),
        })
    }

    async fn fetch_document(&self, file_ref: &str, dest: &Path) -> Result<u64, TransportError> {
        let url = self.document_endpoint(file_ref)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TransportError::Fetch(format!("Request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Fetch(format!("HTTP {status}")));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Fetch(format!("Failed to read body: {e}")))?;
        tokio::fs::write(dest, &bytes).await?;
        Ok(bytes.len() as u64)
    }
}
