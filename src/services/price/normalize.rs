//! Response normalization for the supported upstream price providers.
//!
//! Every provider is reduced to the same `(price, change_24h, volume_24h)` triple.
//! Normalization never touches the network; the caller stamps the capture time.

use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use super::error::FetchError;

/// Wire format of an upstream price endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// `{"price": .., "change24h": .., "volume24h": ..}`
    Generic,
    CoinGecko,
    Binance,
    Coinbase,
    CoinDesk,
}

impl SourceFormat {
    pub fn name(&self) -> &'static str {
        match self {
            SourceFormat::Generic => "generic",
            SourceFormat::CoinGecko => "coingecko",
            SourceFormat::Binance => "binance",
            SourceFormat::Coinbase => "coinbase",
            SourceFormat::CoinDesk => "coindesk",
        }
    }

    /// Public endpoint used when no explicit URL is configured.
    pub fn default_url(&self) -> Option<&'static str> {
        match self {
            SourceFormat::Generic => None,
            SourceFormat::CoinGecko => Some(
                "https://api.coingecko.com/api/v3/simple/price?ids=bitcoin&vs_currencies=usd&include_24hr_change=true&include_24hr_vol=true",
            ),
            SourceFormat::Binance => {
                Some("https://api.binance.com/api/v3/ticker/24hr?symbol=BTCUSDT")
            }
            SourceFormat::Coinbase => {
                Some("https://api.coinbase.com/v2/exchange-rates?currency=BTC")
            }
            SourceFormat::CoinDesk => {
                Some("https://api.coindesk.com/v1/bpi/currentprice.json")
            }
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SourceFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "generic" => Ok(SourceFormat::Generic),
            "coingecko" => Ok(SourceFormat::CoinGecko),
            "binance" => Ok(SourceFormat::Binance),
            "coinbase" => Ok(SourceFormat::Coinbase),
            "coindesk" => Ok(SourceFormat::CoinDesk),
            other => Err(format!("unknown price source '{}'", other)),
        }
    }
}

/// Price fields extracted from an upstream body, before timestamping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawQuote {
    pub price: f64,
    pub change_24h: f64,
    pub volume_24h: f64,
}

pub fn normalize(format: SourceFormat, body: &Value) -> Result<RawQuote, FetchError> {
    let (price, change, volume) = match format {
        SourceFormat::Generic => (
            body.get("price"),
            body.get("change24h"),
            body.get("volume24h"),
        ),
        SourceFormat::CoinGecko => {
            let btc = body
                .get("bitcoin")
                .ok_or_else(|| malformed(format, "missing 'bitcoin' object"))?;
            (
                btc.get("usd"),
                btc.get("usd_24h_change"),
                btc.get("usd_24h_vol"),
            )
        }
        SourceFormat::Binance => (
            body.get("lastPrice"),
            body.get("priceChangePercent"),
            body.get("quoteVolume"),
        ),
        // Exchange-rate endpoints carry no 24h statistics.
        SourceFormat::Coinbase => (body.pointer("/data/rates/USD"), None, None),
        SourceFormat::CoinDesk => (body.pointer("/bpi/USD/rate_float"), None, None),
    };

    let price = price
        .and_then(as_number)
        .ok_or_else(|| malformed(format, "missing or non-numeric price"))?;
    if !price.is_finite() || price <= 0.0 {
        return Err(malformed(format, &format!("price {} is not positive", price)));
    }

    Ok(RawQuote {
        price,
        change_24h: change.and_then(as_number).filter(|v| v.is_finite()).unwrap_or(0.0),
        volume_24h: volume.and_then(as_number).filter(|v| v.is_finite()).unwrap_or(0.0),
    })
}

/// Accepts JSON numbers and numeric strings (Binance and Coinbase quote as strings).
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn malformed(format: SourceFormat, reason: &str) -> FetchError {
    FetchError::MalformedResponse(format!("{}: {}", format, reason))
}
