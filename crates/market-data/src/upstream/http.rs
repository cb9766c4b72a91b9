//! HTTP client for the reference-data bridge
//!
//! `POST {endpoint}/reference` with `{securities, fields}`; the bridge answers
//! `{data: [{security, field, value, error}]}`.

use super::{
    ReferenceDataClient, ReferenceDataRequest, ReferenceDataResponse, ReferenceDataRow,
    UpstreamError,
};
use async_trait::async_trait;
use reqwest::Client;

/// Header carrying the bridge API key
pub const API_KEY_HEADER: &str = "X-Api-Key";

/// HTTP-based reference-data client
pub struct HttpReferenceDataClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpReferenceDataClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn map_transport_error(e: reqwest::Error) -> UpstreamError {
    if e.is_timeout() {
        UpstreamError::Timeout
    } else if e.is_decode() {
        UpstreamError::Decode(e.to_string())
    } else {
        UpstreamError::Connection(e.to_string())
    }
}

#[async_trait]
impl ReferenceDataClient for HttpReferenceDataClient {
    fn name(&self) -> &str {
        "http"
    }

    async fn reference_data(
        &self,
        request: ReferenceDataRequest,
    ) -> Result<Vec<ReferenceDataRow>, UpstreamError> {
        let url = format!("{}/reference", self.base_url);

        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header(API_KEY_HEADER, key);
        }

        let response = builder.send().await.map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body = response
            .json::<ReferenceDataResponse>()
            .await
            .map_err(|e| UpstreamError::Decode(e.to_string()))?;

        Ok(body.data)
    }
}
