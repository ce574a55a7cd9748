//! HTTP transport for the SES API.
//!
//! Each [`HttpTransport`] owns one `reqwest` client, so a handle reused by the
//! sequential strategy or shared by the call pool keeps its connections warm.

use std::time::Duration;

use async_trait::async_trait;
use courier_common::{incoming, logging::api_span, outgoing, tracing::Instrument};
use reqwest::Client;

use super::{Connect, TransferLog, TransferResponse, Transport, TransportError};
use crate::{config::DeliveryConfig, error::DeliveryError, request::SignedRequest};

/// Wall-clock limit for one request, connect included.
pub const TRANSFER_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds [`HttpTransport`] handles from the delivery configuration.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    user_agent: String,
    transfer_log: Option<TransferLog>,
}

impl HttpConnector {
    pub fn new(config: &DeliveryConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            transfer_log: config
                .verbose
                .then(|| TransferLog::new(config.log_dir.clone())),
        }
    }
}

impl Connect for HttpConnector {
    type Handle = HttpTransport;

    fn connect(&self) -> Result<Self::Handle, DeliveryError> {
        // With rustls this also skips hostname verification.
        let client = Client::builder()
            .timeout(TRANSFER_TIMEOUT)
            .danger_accept_invalid_certs(true)
            .user_agent(self.user_agent.as_str())
            .build()
            .map_err(|e| DeliveryError::TransportInit(e.to_string()))?;

        Ok(HttpTransport {
            client,
            transfer_log: self.transfer_log.clone(),
        })
    }
}

/// One reusable HTTP client. Connections and resolved addresses are kept
/// between calls until the handle is dropped.
#[derive(Debug)]
pub struct HttpTransport {
    client: Client,
    transfer_log: Option<TransferLog>,
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: &SignedRequest) -> Result<TransferResponse, TransportError> {
        self.exchange(request)
            .instrument(api_span(&request.recipient))
            .await
    }
}

impl HttpTransport {
    async fn exchange(&self, request: &SignedRequest) -> Result<TransferResponse, TransportError> {
        outgoing!(
            url = %request.url,
            bytes = request.body.len(),
            "POST"
        );
        if let Some(log) = &self.transfer_log {
            log.request(request).await;
        }

        let result = self.send(request).await;

        match &result {
            Ok(response) => {
                incoming!(status = response.status, "Response received");
                if let Some(log) = &self.transfer_log {
                    log.response(request, response).await;
                }
            }
            Err(e) => {
                incoming!(level = DEBUG, error = %e, "Transfer failed");
                if let Some(log) = &self.transfer_log {
                    log.failure(request, e).await;
                }
            }
        }

        result
    }

    async fn send(&self, request: &SignedRequest) -> Result<TransferResponse, TransportError> {
        let mut builder = self.client.post(request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(*name, value.as_str());
        }

        let response = builder.body(request.body.clone()).send().await?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response.text().await?;

        Ok(TransferResponse {
            status,
            headers,
            body,
        })
    }
}
