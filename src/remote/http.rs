// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! HTTP delivery via reqwest.
//!
//! `POST {base_url}/identifications` with the record as camelCase JSON.
//! Any 2xx is acceptance; every other status is a rejection.

use std::time::Duration;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::record::IdentifiedRecord;
use super::{DeliveryError, RemoteSink};

pub struct HttpRemote {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpRemote {
    /// Build a client with a per-request timeout.
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::Unreachable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn classify(err: reqwest::Error) -> DeliveryError {
        if err.is_timeout() {
            DeliveryError::Timeout
        } else {
            DeliveryError::Unreachable(err.to_string())
        }
    }
}

#[async_trait]
impl RemoteSink for HttpRemote {
    async fn deliver(&self, record: &IdentifiedRecord) -> Result<(), DeliveryError> {
        let mut request = self.client.post(self.endpoint("identifications")).json(record);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(Self::classify)?;
        let status = response.status();
        debug!(id = %record.id, %status, "Delivery response");

        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => DeliveryError::Timeout,
            _ if body.is_empty() => DeliveryError::Rejected(status.to_string()),
            _ => DeliveryError::Rejected(format!("{}: {}", status, body)),
        })
    }

    async fn health_check(&self) -> bool {
        match self.client.get(self.endpoint("health")).send().await {
            Ok(response) => !response.status().is_server_error(),
            Err(_) => false,
        }
    }
}
