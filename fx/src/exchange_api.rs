//! Primary provider: an ExchangeRate-API style endpoint.
//!
//! `GET {base_url}/{api_key}/latest/PEN` answers with
//! `{ "result": "success", "conversion_rates": { "USD": 0.27, ... } }`.

use async_trait::async_trait;
use cambio_common::RawRate;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{FxError, FxResult};
use crate::provider::{checked_rate, http_client, report, RateProvider};

const PROVIDER_ID: &str = "EXCHANGE_API";

#[derive(Debug, Deserialize)]
struct LatestResponse {
    result: Option<String>,
    #[serde(default)]
    conversion_rates: HashMap<String, f64>,
}

impl LatestResponse {
    fn usd_per_pen(&self) -> FxResult<f64> {
        if self.result.as_deref() != Some("success") {
            return Err(FxError::MalformedPayload(format!(
                "result is {:?}",
                self.result
            )));
        }

        let usd = self
            .conversion_rates
            .get("USD")
            .copied()
            .ok_or(FxError::MissingRate("conversion_rates.USD"))?;

        checked_rate(usd)
    }
}

/// Keyed provider tried first.
pub struct ExchangeApiProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl ExchangeApiProvider {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: http_client(),
            base_url: base_url.into(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        }
    }

    async fn try_fetch(&self, timeout: Duration) -> FxResult<RawRate> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(FxError::NotConfigured("primary API key"))?;

        let url = format!(
            "{}/{}/latest/PEN",
            self.base_url.trim_end_matches('/'),
            api_key
        );

        let response = self.client.get(&url).timeout(timeout).send().await?;

        if !response.status().is_success() {
            return Err(FxError::HttpStatus(response.status().as_u16()));
        }

        // Body decode failures surface as `FxError::MalformedPayload`.
        let payload: LatestResponse = response.json().await?;
        payload.usd_per_pen().map(RawRate::UsdPerPen)
    }
}

#[async_trait]
impl RateProvider for ExchangeApiProvider {
    fn name(&self) -> &str {
        PROVIDER_ID
    }

    async fn fetch(&self, timeout: Duration) -> Option<RawRate> {
        report(PROVIDER_ID, self.try_fetch(timeout).await)
    }
}
