//! Provider clients for the REST forex-rate APIs.
//!
//! Each service answers a slightly different JSON shape for the same logical
//! question ("what is one BASE in QUOTE?"); this client knows the URL scheme
//! and extraction path per provider and exposes them behind one trait.

use async_trait::async_trait;
use serde_json::Value;

use super::rest_client::{clip, RestClient};
use crate::modules::market_data::domain::{DataCategory, ProviderKind};
use crate::modules::market_data::traits::MarketDataProviderClient;
use crate::shared::errors::{AppError, AppResult};

pub struct ForexRateClient {
    kind: ProviderKind,
    rest: RestClient,
    base_url: String,
    api_key: String,
}

impl ForexRateClient {
    pub fn new(kind: ProviderKind, api_key: String) -> AppResult<Self> {
        let base_url = match kind {
            ProviderKind::ExchangeRate => "https://v6.exchangerate-api.com/v6",
            ProviderKind::FreeCurrency => "https://api.freecurrencyapi.com/v1",
            ProviderKind::CurrencyApi => "https://api.currencyapi.com/v3",
            ProviderKind::Fixer => "http://data.fixer.io/api",
            ProviderKind::ExchangeRates => "http://api.exchangeratesapi.io/v1",
            other => {
                return Err(AppError::ConfigurationError(format!(
                    "{} is not a forex rate API",
                    other
                )))
            }
        };

        Ok(Self {
            kind,
            rest: RestClient::new(kind.as_str(), 1.0, 2),
            base_url: base_url.to_string(),
            api_key,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn rate_url(&self, base: &str, quote: &str) -> String {
        let key = urlencoding::encode(&self.api_key);
        match self.kind {
            ProviderKind::ExchangeRate => {
                format!("{}/{}/pair/{}/{}", self.base_url, key, base, quote)
            }
            ProviderKind::FreeCurrency | ProviderKind::CurrencyApi => format!(
                "{}/latest?apikey={}&base_currency={}&currencies={}",
                self.base_url, key, base, quote
            ),
            ProviderKind::Fixer | ProviderKind::ExchangeRates => format!(
                "{}/latest?access_key={}&base={}&symbols={}",
                self.base_url, key, base, quote
            ),
            // Unreachable: constructor rejects every other kind.
            _ => String::new(),
        }
    }

    fn extract_rate(&self, quote: &str, body: &Value) -> AppResult<f64> {
        let rate = match self.kind {
            ProviderKind::ExchangeRate => {
                if body.get("result").and_then(Value::as_str) != Some("success") {
                    return Err(self.shape_error(body));
                }
                body.get("conversion_rate").and_then(Value::as_f64)
            }
            ProviderKind::FreeCurrency => body
                .get("data")
                .and_then(|d| d.get(quote))
                .and_then(Value::as_f64),
            ProviderKind::CurrencyApi => body
                .get("data")
                .and_then(|d| d.get(quote))
                .and_then(|q| q.get("value"))
                .and_then(Value::as_f64),
            ProviderKind::Fixer | ProviderKind::ExchangeRates => {
                if body.get("success").and_then(Value::as_bool) != Some(true) {
                    return Err(self.shape_error(body));
                }
                body.get("rates")
                    .and_then(|r| r.get(quote))
                    .and_then(Value::as_f64)
            }
            _ => None,
        };

        match rate {
            Some(rate) if rate > 0.0 => Ok(rate),
            Some(rate) => Err(AppError::ApiError(format!(
                "{} returned non-positive rate {}",
                self.kind, rate
            ))),
            None => Err(self.shape_error(body)),
        }
    }

    fn shape_error(&self, body: &Value) -> AppError {
        let preview = body.to_string();
        let preview = if preview.len() > 200 {
            format!("{}...", clip(&preview, 200))
        } else {
            preview
        };
        AppError::ApiError(format!(
            "{} answered with an unexpected shape: {}",
            self.kind, preview
        ))
    }
}

#[async_trait]
impl MarketDataProviderClient for ForexRateClient {
    fn provider_kind(&self) -> ProviderKind {
        self.kind
    }

    async fn fetch_value(&self, category: DataCategory, symbol: &str) -> AppResult<f64> {
        if category != DataCategory::Price {
            return Err(AppError::InvalidInput(format!(
                "{} only serves price data, asked for {}",
                self.kind, category
            )));
        }

        let (base, quote) = split_pair(symbol)?;
        let url = self.rate_url(base, quote);
        let body = self.rest.get_json(&url).await?;
        self.extract_rate(quote, &body)
    }
}

/// Split a six-letter pair like `EURUSD` into `(EUR, USD)`.
fn split_pair(symbol: &str) -> AppResult<(&str, &str)> {
    if symbol.len() == 6 && symbol.chars().all(|c| c.is_ascii_uppercase()) {
        Ok((&symbol[..3], &symbol[3..]))
    } else {
        Err(AppError::InvalidInput(format!(
            "'{}' is not a currency pair",
            symbol
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn splits_well_formed_pairs() {
        assert_eq!(split_pair("EURUSD").unwrap(), ("EUR", "USD"));
        assert!(split_pair("eurusd").is_err());
        assert!(split_pair("EUR/USD").is_err());
        assert!(split_pair("GOLD").is_err());
    }

    #[test]
    fn extracts_each_provider_shape() {
        let cases = [
            (
                ProviderKind::ExchangeRate,
                json!({"result": "success", "conversion_rate": 1.1001}),
            ),
            (
                ProviderKind::FreeCurrency,
                json!({"data": {"USD": 1.1001}}),
            ),
            (
                ProviderKind::CurrencyApi,
                json!({"data": {"USD": {"value": 1.1001}}}),
            ),
            (
                ProviderKind::Fixer,
                json!({"success": true, "rates": {"USD": 1.1001}}),
            ),
            (
                ProviderKind::ExchangeRates,
                json!({"success": true, "rates": {"USD": 1.1001}}),
            ),
        ];

        for (kind, body) in cases {
            let client = ForexRateClient::new(kind, "k".to_string()).unwrap();
            assert_eq!(client.extract_rate("USD", &body).unwrap(), 1.1001);
        }
    }

    #[test]
    fn failed_or_malformed_answers_are_api_errors() {
        let client = ForexRateClient::new(ProviderKind::Fixer, "k".to_string()).unwrap();
        assert!(client
            .extract_rate("USD", &json!({"success": false}))
            .is_err());
        assert!(client.extract_rate("USD", &json!({})).is_err());

        let client = ForexRateClient::new(ProviderKind::ExchangeRate, "k".to_string()).unwrap();
        assert!(client
            .extract_rate("USD", &json!({"result": "success", "conversion_rate": 0.0}))
            .is_err());
    }

    #[test]
    fn shape_error_preview_survives_multibyte_bodies() {
        let client = ForexRateClient::new(ProviderKind::Fixer, "k".to_string()).unwrap();
        // Serialized, byte 200 of this body falls inside a two-byte character.
        let body = json!({"ab": "é".repeat(150), "success": false});

        let err = client.extract_rate("USD", &body).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("unexpected shape"));
        assert!(message.ends_with("..."));
    }

    #[test]
    fn non_forex_kind_is_rejected() {
        assert!(ForexRateClient::new(ProviderKind::Fred, "k".to_string()).is_err());
    }
}
