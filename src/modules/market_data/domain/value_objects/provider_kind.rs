use serde::{Deserialize, Serialize};

/// External data sources the feed layer knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    AlphaVantage,
    TwelveData,
    Fred,
    Finnhub,
    NewsApi,
    ExchangeRate,
    FreeCurrency,
    CurrencyApi,
    Fixer,
    ExchangeRates,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::AlphaVantage => "alpha_vantage",
            ProviderKind::TwelveData => "twelve_data",
            ProviderKind::Fred => "fred",
            ProviderKind::Finnhub => "finnhub",
            ProviderKind::NewsApi => "news_api",
            ProviderKind::ExchangeRate => "exchangerate",
            ProviderKind::FreeCurrency => "freecurrency",
            ProviderKind::CurrencyApi => "currencyapi",
            ProviderKind::Fixer => "fixer",
            ProviderKind::ExchangeRates => "exchangerates",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
