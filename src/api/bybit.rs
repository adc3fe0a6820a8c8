use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::Client;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::MarketDataGateway;
use crate::error::BotError;
use crate::execution::{ExecutionGateway, OrderOutcome};
use crate::models::{Candle, OrderSide};
use crate::Result;

// Bybit Unified V5 REST
// Docs: https://bybit-exchange.github.io/docs/v5/intro
const BYBIT_MAINNET: &str = "https://api.bybit.com";
const BYBIT_TESTNET: &str = "https://api-testnet.bybit.com";
const RECV_WINDOW_MS: u64 = 5000;
const RATE_LIMIT_PER_SEC: u32 = 10;
const REQUEST_TIMEOUT_SECS: u64 = 10;
const MAX_KLINE_LIMIT: usize = 1000;

type BybitRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

type HmacSha256 = Hmac<Sha256>;

/// Venue-level settings for one traded pair
#[derive(Debug, Clone)]
pub struct BybitSettings {
    /// Venue symbol, e.g. `BTCUSDT`
    pub symbol: String,
    /// `spot`, `linear`, ...
    pub category: String,
    /// Kline interval in venue syntax (`1`, `5`, `60`, `D`, ...)
    pub interval: String,
    pub quote_coin: String,
    pub api_key: String,
    pub api_secret: String,
    pub testnet: bool,
}

/// Client for the Bybit V5 REST API
///
/// Serves both as market data gateway and as the live execution gateway.
/// Clones share the HTTP connection pool and the rate limiter.
#[derive(Clone)]
pub struct BybitClient {
    client: Client,
    base_url: String,
    settings: BybitSettings,
    rate_limiter: Arc<BybitRateLimiter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BybitResponse<T> {
    ret_code: i64,
    #[serde(default)]
    ret_msg: String,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct KlineResult {
    #[serde(default)]
    list: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct TickerResult {
    #[serde(default)]
    list: Vec<TickerEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TickerEntry {
    #[serde(default)]
    last_price: String,
}

#[derive(Debug, Deserialize)]
struct WalletResult {
    #[serde(default)]
    list: Vec<WalletAccount>,
}

#[derive(Debug, Deserialize)]
struct WalletAccount {
    #[serde(default)]
    coin: Vec<CoinBalance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoinBalance {
    #[serde(default)]
    coin: String,
    #[serde(default)]
    wallet_balance: String,
    #[serde(default)]
    available_to_withdraw: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResult {
    #[serde(default)]
    order_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrderRequest<'a> {
    category: &'a str,
    symbol: &'a str,
    side: &'a str,
    order_type: &'a str,
    qty: String,
    time_in_force: &'a str,
    order_link_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    market_unit: Option<&'a str>,
}

impl BybitClient {
    pub fn new(settings: BybitSettings) -> Result<Self> {
        let base_url = if settings.testnet {
            BYBIT_TESTNET
        } else {
            BYBIT_MAINNET
        };
        Self::with_base_url(settings, base_url)
    }

    /// Point the client at a different host (testing, proxies)
    pub fn with_base_url(settings: BybitSettings, base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        let quota = Quota::per_second(NonZeroU32::new(RATE_LIMIT_PER_SEC).unwrap_or(NonZeroU32::MIN));

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            settings,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    fn build_query(params: &[(&str, String)]) -> String {
        params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Headers for an authenticated request over `payload` (query string or JSON body)
    fn auth_headers(&self, payload: &str) -> Result<Vec<(&'static str, String)>> {
        let timestamp = Utc::now().timestamp_millis().to_string();
        let message = format!(
            "{}{}{}{}",
            timestamp, self.settings.api_key, RECV_WINDOW_MS, payload
        );
        let signature = sign_message(&self.settings.api_secret, &message)?;

        Ok(vec![
            ("X-BAPI-API-KEY", self.settings.api_key.clone()),
            ("X-BAPI-TIMESTAMP", timestamp),
            ("X-BAPI-RECV-WINDOW", RECV_WINDOW_MS.to_string()),
            ("X-BAPI-SIGN", signature),
        ])
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
        signed: bool,
    ) -> Result<T> {
        self.rate_limiter.until_ready().await;

        let query = Self::build_query(params);
        let url = format!("{}{}?{}", self.base_url, path, query);

        let mut request = self.client.get(&url);
        if signed {
            for (name, value) in self.auth_headers(&query)? {
                request = request.header(name, value);
            }
        }

        let response: BybitResponse<T> = request.send().await?.json().await?;
        Self::into_result(path, response)
    }

    fn into_result<T>(path: &str, response: BybitResponse<T>) -> Result<T> {
        if response.ret_code != 0 {
            return Err(BotError::data_fetch(format!(
                "{} returned retCode {}: {}",
                path, response.ret_code, response.ret_msg
            )));
        }

        response
            .result
            .ok_or_else(|| BotError::data_fetch(format!("{} returned no result", path)))
    }

    fn parse_kline_row(row: &[String]) -> Result<Candle> {
        // [startTime, open, high, low, close, volume, turnover]
        if row.len() < 6 {
            return Err(BotError::data_fetch(format!("unknown kline format: {:?}", row)));
        }

        let start_ms: i64 = row[0]
            .parse()
            .map_err(|_| BotError::data_fetch(format!("invalid kline start '{}'", row[0])))?;
        let timestamp = DateTime::<Utc>::from_timestamp_millis(start_ms)
            .ok_or_else(|| BotError::data_fetch(format!("kline start out of range: {}", start_ms)))?;

        Ok(Candle {
            timestamp,
            open: parse_number("open", &row[1])?,
            high: parse_number("high", &row[2])?,
            low: parse_number("low", &row[3])?,
            close: parse_number("close", &row[4])?,
            volume: parse_number("volume", &row[5])?,
        })
    }

    async fn submit_order(&self, side: OrderSide, quantity: f64) -> Result<String> {
        let qty = format_quantity(quantity)?;
        let market_unit = if self.settings.category == "spot" {
            Some("baseCoin")
        } else {
            None
        };

        let request = CreateOrderRequest {
            category: &self.settings.category,
            symbol: &self.settings.symbol,
            side: side.as_venue_str(),
            order_type: "Market",
            qty,
            time_in_force: "IOC",
            order_link_id: Uuid::new_v4().to_string(),
            market_unit,
        };
        let body = serde_json::to_string(&request)?;

        self.rate_limiter.until_ready().await;

        let mut http_request = self
            .client
            .post(format!("{}/v5/order/create", self.base_url))
            .header("Content-Type", "application/json");
        for (name, value) in self.auth_headers(&body)? {
            http_request = http_request.header(name, value);
        }

        let response: BybitResponse<OrderResult> =
            http_request.body(body).send().await?.json().await?;

        if response.ret_code != 0 {
            return Err(BotError::Order(format!(
                "retCode {}: {}",
                response.ret_code, response.ret_msg
            )));
        }

        Ok(response
            .result
            .map(|r| r.order_id)
            .unwrap_or_default())
    }
}

#[async_trait]
impl MarketDataGateway for BybitClient {
    async fn get_candles(&self, limit: usize) -> Result<Vec<Candle>> {
        let limit = limit.clamp(1, MAX_KLINE_LIMIT);
        let params = [
            ("category", self.settings.category.clone()),
            ("symbol", self.settings.symbol.clone()),
            ("interval", self.settings.interval.clone()),
            ("limit", limit.to_string()),
        ];

        let result: KlineResult = self.get("/v5/market/kline", &params, false).await?;

        let mut candles = result
            .list
            .iter()
            .map(|row| Self::parse_kline_row(row))
            .collect::<Result<Vec<_>>>()?;

        // Venue returns newest first
        candles.sort_by_key(|c| c.timestamp);
        candles.dedup_by_key(|c| c.timestamp);

        tracing::debug!(symbol = %self.settings.symbol, count = candles.len(), "Fetched candles");

        Ok(candles)
    }

    async fn get_last_price(&self) -> Result<f64> {
        let params = [
            ("category", self.settings.category.clone()),
            ("symbol", self.settings.symbol.clone()),
        ];

        let result: TickerResult = self.get("/v5/market/tickers", &params, false).await?;
        let ticker = result
            .list
            .first()
            .ok_or_else(|| BotError::data_fetch(format!("no ticker for {}", self.settings.symbol)))?;

        parse_number("lastPrice", &ticker.last_price)
    }

    async fn get_quote_balance(&self) -> Result<f64> {
        let params = [
            ("accountType", "UNIFIED".to_string()),
            ("coin", self.settings.quote_coin.clone()),
        ];

        let result: WalletResult = self
            .get("/v5/account/wallet-balance", &params, true)
            .await?;

        let balance = result
            .list
            .iter()
            .flat_map(|account| account.coin.iter())
            .find(|c| c.coin == self.settings.quote_coin)
            .ok_or_else(|| {
                BotError::data_fetch(format!("no {} balance in wallet", self.settings.quote_coin))
            })?;

        // availableToWithdraw is the free balance; newer accounts may leave it blank
        if balance.available_to_withdraw.is_empty() {
            parse_number("walletBalance", &balance.wallet_balance)
        } else {
            parse_number("availableToWithdraw", &balance.available_to_withdraw)
        }
    }
}

#[async_trait]
impl ExecutionGateway for BybitClient {
    async fn place_order(&self, side: OrderSide, quantity: f64) -> OrderOutcome {
        match self.submit_order(side, quantity).await {
            Ok(order_id) => {
                tracing::info!(side = %side, quantity, order_id = %order_id, "Order accepted");
                OrderOutcome::filled(order_id)
            }
            Err(e) => {
                tracing::warn!(side = %side, quantity, "Order failed: {}", e);
                OrderOutcome::rejected(e.to_string())
            }
        }
    }

    fn label(&self) -> &str {
        "bybit"
    }
}

/// Hex HMAC-SHA256 of `message` keyed by `secret`
pub fn sign_message(secret: &str, message: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| BotError::config(format!("invalid API secret: {}", e)))?;
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn parse_number(field: &str, value: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .map_err(|_| BotError::data_fetch(format!("invalid {} '{}'", field, value)))
}

/// Decimal rendering of a quantity, free of float artefacts
fn format_quantity(quantity: f64) -> Result<String> {
    Decimal::from_f64(quantity)
        .map(|d| d.normalize().to_string())
        .ok_or_else(|| BotError::Order(format!("unrepresentable quantity {}", quantity)))
}
