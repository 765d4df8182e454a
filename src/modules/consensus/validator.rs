//! Cross-source price validation.
//!
//! One symbol is quoted by several independent providers; a value is only
//! trusted when enough of them agree. Agreement is judged around the median
//! of the collected quotes, which keeps a single wild outlier from dragging
//! the center away from the cluster.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::modules::market_data::application::MarketDataService;
use crate::modules::market_data::domain::{DataCategory, ProviderKind};
use crate::modules::market_data::infrastructure::adapters::{fetch_cached_gated, GatePolicy};
use crate::modules::market_data::infrastructure::http_client::ForexRateClient;
use crate::modules::market_data::traits::MarketDataProviderClient;
use crate::shared::errors::{AppError, AppResult};

/// One provider's answer for one symbol.
#[derive(Debug, Clone, Serialize)]
pub struct Quote {
    pub provider: ProviderKind,
    pub value: f64,
    pub at: DateTime<Utc>,
}

/// The outcome of validating one symbol across its provider chain.
#[derive(Debug, Clone, Serialize)]
pub struct ConsensusOutcome {
    pub symbol: String,
    /// Every quote that survived the sentinel filter, agreeing or not.
    pub quotes: Vec<Quote>,
    /// The relative tolerance the agreement was judged under.
    pub tolerance: f64,
    /// The values retained as agreeing with the median.
    pub retained: Vec<f64>,
    /// Mean of the retained values, rounded to five decimal places.
    pub consensus: Option<f64>,
    pub is_valid: bool,
    /// Why validation failed, when it did.
    pub reason: Option<String>,
}

impl ConsensusOutcome {
    fn rejected(symbol: &str, quotes: Vec<Quote>, tolerance: f64, reason: String) -> Self {
        Self {
            symbol: symbol.to_string(),
            quotes,
            tolerance,
            retained: Vec::new(),
            consensus: None,
            is_valid: false,
            reason: Some(reason),
        }
    }
}

/// Fans one symbol out across every eligible provider and reduces the
/// answers to a consensus value.
pub struct ConsensusValidator {
    service: Arc<MarketDataService>,
    clients: HashMap<ProviderKind, Arc<dyn MarketDataProviderClient>>,
}

impl ConsensusValidator {
    pub fn new(
        service: Arc<MarketDataService>,
        clients: HashMap<ProviderKind, Arc<dyn MarketDataProviderClient>>,
    ) -> Self {
        Self { service, clients }
    }

    /// Build a validator with a REST client for every price provider that has
    /// an API key configured.
    pub fn from_settings(service: Arc<MarketDataService>) -> AppResult<Self> {
        let mut clients: HashMap<ProviderKind, Arc<dyn MarketDataProviderClient>> = HashMap::new();
        let settings = service.settings().clone();

        for provider in settings.chain(DataCategory::Price) {
            let Some(key) = settings.api_keys.get(&provider.kind) else {
                debug!(provider = %provider.kind, "no API key, skipping client");
                continue;
            };
            let client = ForexRateClient::new(provider.kind, key.clone())?;
            clients.insert(provider.kind, Arc::new(client));
        }

        Ok(Self { service, clients })
    }

    pub fn register_client(&mut self, client: Arc<dyn MarketDataProviderClient>) {
        self.clients.insert(client.provider_kind(), client);
    }

    /// Validate one symbol: fan out, filter placeholders, reduce to consensus.
    pub async fn validate_symbol(&self, symbol: &str) -> ConsensusOutcome {
        let request_id = Uuid::new_v4();
        let settings = self.service.settings().clone();

        let eligible = self.service.eligible_providers(DataCategory::Price).await;
        let candidates: Vec<ProviderKind> = eligible
            .into_iter()
            .filter(|kind| self.clients.contains_key(kind))
            .collect();

        debug!(
            request = %request_id,
            symbol = %symbol,
            providers = candidates.len(),
            "validating symbol"
        );

        if candidates.is_empty() {
            return ConsensusOutcome::rejected(
                symbol,
                Vec::new(),
                settings.tolerance,
                "no eligible provider has a configured client".to_string(),
            );
        }

        let fetches = candidates
            .iter()
            .map(|kind| self.fetch_quote(*kind, symbol));
        let answers = join_all(fetches).await;

        let mut quotes = Vec::new();
        for (kind, answer) in candidates.iter().zip(answers) {
            match answer {
                Ok(value) if settings.is_sentinel(symbol, value) => {
                    warn!(
                        request = %request_id,
                        provider = %kind,
                        symbol = %symbol,
                        value,
                        "discarding known placeholder price"
                    );
                }
                Ok(value) => quotes.push(Quote {
                    provider: *kind,
                    value,
                    at: Utc::now(),
                }),
                Err(e) => {
                    debug!(
                        request = %request_id,
                        provider = %kind,
                        symbol = %symbol,
                        error = %e,
                        "provider gave no quote"
                    );
                }
            }
        }

        let values: Vec<f64> = quotes.iter().map(|q| q.value).collect();
        let (consensus, retained, reason) =
            consensus_from(&values, settings.tolerance, settings.min_sources);

        let is_valid = consensus.is_some();
        if is_valid {
            info!(
                request = %request_id,
                symbol = %symbol,
                consensus = consensus.unwrap_or_default(),
                sources = retained.len(),
                "consensus reached"
            );
        } else {
            warn!(
                request = %request_id,
                symbol = %symbol,
                reason = reason.as_deref().unwrap_or("unknown"),
                "consensus failed"
            );
        }

        ConsensusOutcome {
            symbol: symbol.to_string(),
            quotes,
            tolerance: settings.tolerance,
            retained,
            consensus,
            is_valid,
            reason,
        }
    }

    /// Validate several symbols concurrently, keeping only the valid ones.
    pub async fn validated_values(&self, symbols: &[&str]) -> HashMap<String, f64> {
        let outcomes = join_all(symbols.iter().map(|s| self.validate_symbol(s))).await;

        outcomes
            .into_iter()
            .filter_map(|outcome| Some((outcome.symbol, outcome.consensus?)))
            .collect()
    }

    /// One provider branch: cache, rate gate, fetch, health bookkeeping,
    /// all under the per-request deadline.
    async fn fetch_quote(&self, kind: ProviderKind, symbol: &str) -> AppResult<f64> {
        let settings = self.service.settings();
        let params = [("symbol", symbol)];

        // A warm cache answers without touching the provider, so it must
        // not move the provider's health either way.
        if let Some(cached) = self
            .service
            .cache()
            .cached_response(kind, "quote", &params)
            .await
        {
            return as_quote(kind, cached);
        }

        let client = self
            .clients
            .get(&kind)
            .ok_or_else(|| AppError::ConfigurationError(format!("no client for {}", kind)))?;
        let provider = settings
            .provider(kind)
            .ok_or_else(|| AppError::ConfigurationError(format!("no config for {}", kind)))?;

        let fetched = timeout(
            settings.request_timeout,
            fetch_cached_gated(
                self.service.cache(),
                self.service.tracker(),
                provider,
                "quote",
                &params,
                DataCategory::Price,
                GatePolicy::Deny,
                || async {
                    let value = client.fetch_value(DataCategory::Price, symbol).await?;
                    Ok(serde_json::json!(value))
                },
            ),
        )
        .await;

        let result = match fetched {
            Ok(result) => result,
            Err(_) => Err(AppError::ProviderTimeout(format!(
                "{} gave no answer within {:?}",
                kind, settings.request_timeout
            ))),
        };

        match &result {
            Ok(_) => self.service.health().record_success(kind).await,
            // A throttled provider is not a broken provider.
            Err(AppError::ProviderUnavailable(_)) => {}
            Err(_) => self.service.health().record_failure(kind).await,
        }

        result.and_then(|payload| as_quote(kind, payload))
    }
}

fn as_quote(kind: ProviderKind, payload: serde_json::Value) -> AppResult<f64> {
    payload
        .as_f64()
        .ok_or_else(|| AppError::ApiError(format!("{} cached a non-numeric quote", kind)))
}

/// Reduce raw values to a consensus: values within `tolerance` (relative) of
/// the median are retained, and their mean, rounded to five decimal places,
/// is the consensus. Returns `(consensus, retained, failure_reason)`.
pub fn consensus_from(
    values: &[f64],
    tolerance: f64,
    min_sources: usize,
) -> (Option<f64>, Vec<f64>, Option<String>) {
    if values.len() < min_sources {
        return (
            None,
            Vec::new(),
            Some(format!(
                "only {} usable source(s), need {}",
                values.len(),
                min_sources
            )),
        );
    }

    let center = median(values);
    let retained: Vec<f64> = values
        .iter()
        .copied()
        .filter(|v| (v - center).abs() <= center.abs() * tolerance)
        .collect();

    if retained.len() < min_sources {
        return (
            None,
            retained.clone(),
            Some(format!(
                "only {} of {} sources agree within {:.4}%",
                retained.len(),
                values.len(),
                tolerance * 100.0
            )),
        );
    }

    let mean = retained.iter().sum::<f64>() / retained.len() as f64;
    (Some(round5(mean)), retained, None)
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn round5(value: f64) -> f64 {
    (value * 100_000.0).round() / 100_000.0
}
