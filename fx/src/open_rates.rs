//! Secondary provider: a keyless open rates endpoint.
//!
//! `GET {base_url}/latest/PEN` answers with `{ "rates": { "USD": 0.26, ... } }`.
//! Some feeds omit USD but quote BMD, which is pegged 1:1 to it. Entries are
//! read leniently: a null or non-numeric quote counts as absent.

use async_trait::async_trait;
use cambio_common::RawRate;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{FxError, FxResult};
use crate::provider::{checked_rate, http_client, report, RateProvider};

const PROVIDER_ID: &str = "OPEN_RATES";

#[derive(Debug, Deserialize)]
struct LatestResponse {
    rates: HashMap<String, Value>,
}

impl LatestResponse {
    fn quote(&self, code: &str) -> Option<f64> {
        self.rates.get(code).and_then(Value::as_f64)
    }

    fn usd_per_pen(&self) -> FxResult<f64> {
        let usd = self
            .quote("USD")
            .or_else(|| self.quote("BMD"))
            .ok_or(FxError::MissingRate("rates.USD"))?;

        checked_rate(usd)
    }
}

/// Keyless provider tried when the primary is unavailable.
pub struct OpenRatesProvider {
    client: Client,
    base_url: String,
}

impl OpenRatesProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: http_client(),
            base_url: base_url.into(),
        }
    }

    async fn try_fetch(&self, timeout: Duration) -> FxResult<RawRate> {
        let base_url = self.base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(FxError::NotConfigured("secondary base URL"));
        }

        let response = self
            .client
            .get(format!("{}/latest/PEN", base_url))
            .timeout(timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FxError::HttpStatus(response.status().as_u16()));
        }

        let payload: LatestResponse = response.json().await?;
        payload.usd_per_pen().map(RawRate::UsdPerPen)
    }
}

#[async_trait]
impl RateProvider for OpenRatesProvider {
    fn name(&self) -> &str {
        PROVIDER_ID
    }

    async fn fetch(&self, timeout: Duration) -> Option<RawRate> {
        report(PROVIDER_ID, self.try_fetch(timeout).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::test_server::serve_once;

    fn parse_latest(body: &str) -> FxResult<f64> {
        serde_json::from_str::<LatestResponse>(body)
            .map_err(|e| FxError::MalformedPayload(e.to_string()))?
            .usd_per_pen()
    }

    #[test]
    fn test_parse_usd() {
        let body = r#"{"result":"success","base_code":"PEN","rates":{"PEN":1,"USD":0.26}}"#;
        assert_eq!(parse_latest(body).unwrap(), 0.26);
    }

    #[test]
    fn test_parse_falls_back_to_bmd() {
        let body = r#"{"rates":{"BMD":0.265,"EUR":0.24}}"#;
        assert_eq!(parse_latest(body).unwrap(), 0.265);
    }

    #[test]
    fn test_usd_preferred_over_bmd() {
        let body = r#"{"rates":{"BMD":0.3,"USD":0.26}}"#;
        assert_eq!(parse_latest(body).unwrap(), 0.26);
    }

    #[test]
    fn test_non_numeric_entries_are_ignored() {
        let body = r#"{"rates":{"XDR":null,"VES":"n/a","USD":0.26}}"#;
        assert_eq!(parse_latest(body).unwrap(), 0.26);
    }

    #[test]
    fn test_null_usd_falls_back_to_bmd() {
        let body = r#"{"rates":{"USD":null,"BMD":0.265}}"#;
        assert_eq!(parse_latest(body).unwrap(), 0.265);

        let body = r#"{"rates":{"USD":"0.26","BMD":0.265}}"#;
        assert_eq!(parse_latest(body).unwrap(), 0.265);

        let body = r#"{"rates":{"USD":null}}"#;
        assert!(matches!(parse_latest(body), Err(FxError::MissingRate(_))));
    }

    #[test]
    fn test_parse_failures() {
        assert!(matches!(
            parse_latest(r#"{"rates":{"EUR":0.24}}"#),
            Err(FxError::MissingRate(_))
        ));
        assert!(matches!(
            parse_latest(r#"{"rates":{"USD":-0.26}}"#),
            Err(FxError::InvalidRate(_))
        ));
        assert!(matches!(
            parse_latest(r#"{"error":"quota"}"#),
            Err(FxError::MalformedPayload(_))
        ));
    }

    #[tokio::test]
    async fn test_blank_base_url_is_unavailable() {
        let provider = OpenRatesProvider::new("  ");
        assert!(matches!(
            provider.try_fetch(Duration::from_millis(200)).await,
            Err(FxError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_unavailable() {
        let provider = OpenRatesProvider::new("http://127.0.0.1:9");
        assert_eq!(provider.fetch(Duration::from_millis(500)).await, None);
    }

    #[tokio::test]
    async fn test_fetch_reads_rates_payload() {
        let base_url = serve_once("200 OK", r#"{"result":"success","rates":{"PEN":1,"USD":0.26}}"#).await;
        let provider = OpenRatesProvider::new(base_url);

        assert_eq!(
            provider.fetch(Duration::from_secs(2)).await,
            Some(RawRate::UsdPerPen(0.26))
        );
    }

    #[tokio::test]
    async fn test_fetch_server_error_is_unavailable() {
        let base_url = serve_once("500 Internal Server Error", "{}").await;
        let provider = OpenRatesProvider::new(base_url);

        assert!(matches!(
            provider.try_fetch(Duration::from_secs(2)).await,
            Err(FxError::HttpStatus(500))
        ));
    }
}
