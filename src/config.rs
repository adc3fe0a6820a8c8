use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::api::BybitSettings;
use crate::error::BotError;
use crate::execution::RiskParams;
use crate::Result;

/// Kline intervals the venue accepts
const VALID_INTERVALS: &[&str] = &[
    "1", "3", "5", "15", "30", "60", "120", "240", "360", "720", "D", "W", "M",
];

/// Venue the bot talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Exchange {
    Bybit,
    Synthetic,
}

/// Which price the position state machine decides on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    /// Close of the newest candle
    LastClose,
    /// Venue ticker last traded price
    Ticker,
}

/// Bot configuration
///
/// Field names match the environment variables (upper-cased) so a `.env`
/// file of the form `SHORT_WINDOW=5` maps straight onto it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub exchange: Exchange,
    pub symbol: String,
    pub category: String,
    pub interval: String,
    pub max_candles: usize,
    pub short_window: usize,
    pub long_window: usize,
    pub quote_spend_pct: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub qty_precision: u32,
    pub dry_run: bool,
    pub testnet: bool,
    pub default_balance: f64,
    /// Seconds between cycles
    pub sleep_interval: u64,
    /// Seconds to pause after a failed cycle
    pub error_cooldown: u64,
    pub price_source: PriceSource,
    pub bybit_api_key: String,
    pub bybit_api_secret: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            exchange: Exchange::Bybit,
            symbol: "BTC/USDT".to_string(),
            category: "spot".to_string(),
            interval: "1".to_string(),
            max_candles: 200,
            short_window: 5,
            long_window: 20,
            quote_spend_pct: 0.1,
            stop_loss_pct: 0.03,
            take_profit_pct: 0.05,
            qty_precision: 6,
            dry_run: true,
            testnet: true,
            default_balance: 1000.0,
            sleep_interval: 60,
            error_cooldown: 2,
            price_source: PriceSource::LastClose,
            bybit_api_key: String::new(),
            bybit_api_secret: String::new(),
        }
    }
}

impl BotConfig {
    /// Load from `.env`, an optional TOML file, then the process environment
    ///
    /// Later sources win. The result is validated before it is returned.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(config::Environment::default().try_parsing(true))
            .build()?;

        let config: BotConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Fail fast on parameters the loop cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.short_window == 0 || self.long_window == 0 {
            return Err(BotError::config("SMA windows must be positive"));
        }
        if self.short_window >= self.long_window {
            tracing::warn!(
                short = self.short_window,
                long = self.long_window,
                "Fast window is not shorter than slow window"
            );
        }
        if !(self.quote_spend_pct > 0.0 && self.quote_spend_pct <= 1.0) {
            return Err(BotError::config(format!(
                "quote_spend_pct must be in (0, 1], got {}",
                self.quote_spend_pct
            )));
        }
        if !(self.stop_loss_pct > 0.0 && self.stop_loss_pct < 1.0) {
            return Err(BotError::config(format!(
                "stop_loss_pct must be in (0, 1), got {}",
                self.stop_loss_pct
            )));
        }
        if !(self.take_profit_pct > 0.0 && self.take_profit_pct.is_finite()) {
            return Err(BotError::config(format!(
                "take_profit_pct must be positive, got {}",
                self.take_profit_pct
            )));
        }
        if !VALID_INTERVALS.contains(&self.interval.as_str()) {
            return Err(BotError::config(format!(
                "interval '{}' must be one of {}",
                self.interval,
                VALID_INTERVALS.join(", ")
            )));
        }
        if self.sleep_interval == 0 {
            return Err(BotError::config("sleep_interval must be at least 1 second"));
        }
        if self.error_cooldown >= self.sleep_interval {
            return Err(BotError::config(format!(
                "error_cooldown ({}s) must be shorter than sleep_interval ({}s)",
                self.error_cooldown, self.sleep_interval
            )));
        }
        if self.max_candles < self.short_window.max(self.long_window) {
            return Err(BotError::config(format!(
                "max_candles ({}) cannot cover the {}-candle window",
                self.max_candles,
                self.short_window.max(self.long_window)
            )));
        }
        if self.qty_precision > 12 {
            return Err(BotError::config("qty_precision must be at most 12"));
        }
        if !(self.default_balance >= 0.0 && self.default_balance.is_finite()) {
            return Err(BotError::config("default_balance must be a non-negative number"));
        }
        if self.quote_coin().is_empty() {
            return Err(BotError::config(format!(
                "symbol '{}' must look like BASE/QUOTE",
                self.symbol
            )));
        }
        if self.is_live()
            && (self.bybit_api_key.is_empty() || self.bybit_api_secret.is_empty())
        {
            return Err(BotError::config(
                "live trading requires BYBIT_API_KEY and BYBIT_API_SECRET",
            ));
        }

        Ok(())
    }

    /// Real orders against a real venue
    pub fn is_live(&self) -> bool {
        !self.dry_run && self.exchange == Exchange::Bybit
    }

    /// `BTC/USDT` -> `BTCUSDT`
    pub fn venue_symbol(&self) -> String {
        self.symbol.replace('/', "")
    }

    /// `BTC/USDT` -> `USDT`
    pub fn quote_coin(&self) -> String {
        self.symbol
            .split_once('/')
            .map(|(_, quote)| quote.trim().to_string())
            .unwrap_or_default()
    }

    pub fn loop_interval(&self) -> Duration {
        Duration::from_secs(self.sleep_interval)
    }

    pub fn error_cooldown(&self) -> Duration {
        Duration::from_secs(self.error_cooldown)
    }

    /// Candle spacing in minutes, used by the synthetic feed
    ///
    /// Only meaningful for a validated config.
    pub fn interval_minutes(&self) -> i64 {
        match self.interval.as_str() {
            "D" => 1440,
            "W" => 10080,
            "M" => 43200,
            other => other.parse().unwrap_or(1),
        }
    }

    pub fn risk_params(&self) -> RiskParams {
        RiskParams {
            spend_fraction: self.quote_spend_pct,
            stop_loss_pct: self.stop_loss_pct,
            take_profit_pct: self.take_profit_pct,
            qty_precision: self.qty_precision,
        }
    }

    pub fn bybit_settings(&self) -> BybitSettings {
        BybitSettings {
            symbol: self.venue_symbol(),
            category: self.category.clone(),
            interval: self.interval.clone(),
            quote_coin: self.quote_coin(),
            api_key: self.bybit_api_key.clone(),
            api_secret: self.bybit_api_secret.clone(),
            testnet: self.testnet,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = BotConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.dry_run);
        assert!(!config.is_live());
        assert_eq!(config.short_window, 5);
        assert_eq!(config.long_window, 20);
        assert_eq!(config.loop_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_symbol_helpers() {
        let config = BotConfig::default();
        assert_eq!(config.venue_symbol(), "BTCUSDT");
        assert_eq!(config.quote_coin(), "USDT");

        let config = BotConfig {
            symbol: "BTCUSDT".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_fractions() {
        let config = BotConfig {
            quote_spend_pct: 0.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(BotError::Config(_))));

        let config = BotConfig {
            quote_spend_pct: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = BotConfig {
            stop_loss_pct: 1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = BotConfig {
            take_profit_pct: -0.05,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_timing() {
        let config = BotConfig {
            sleep_interval: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = BotConfig {
            sleep_interval: 2,
            error_cooldown: 2,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_short_history() {
        let config = BotConfig {
            max_candles: 10,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_candles"));
    }

    #[test]
    fn test_live_mode_requires_credentials() {
        let config = BotConfig {
            dry_run: false,
            ..Default::default()
        };
        assert!(config.is_live());
        assert!(config.validate().is_err());

        let config = BotConfig {
            dry_run: false,
            bybit_api_key: "key".to_string(),
            bybit_api_secret: "secret".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        // Synthetic venue never places live orders
        let config = BotConfig {
            dry_run: false,
            exchange: Exchange::Synthetic,
            ..Default::default()
        };
        assert!(!config.is_live());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_unknown_interval() {
        let config = BotConfig {
            interval: "1000000000".to_string(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, BotError::Config(_)));
        assert!(err.to_string().contains("interval"));

        let config = BotConfig {
            interval: "2h".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = BotConfig {
            interval: "240".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_interval_minutes() {
        let mut config = BotConfig::default();
        assert_eq!(config.interval_minutes(), 1);
        config.interval = "15".to_string();
        assert_eq!(config.interval_minutes(), 15);
        config.interval = "D".to_string();
        assert_eq!(config.interval_minutes(), 1440);
    }

    #[test]
    fn test_risk_params_mapping() {
        let config = BotConfig::default();
        let risk = config.risk_params();
        assert_eq!(risk.spend_fraction, 0.1);
        assert_eq!(risk.stop_loss_pct, 0.03);
        assert_eq!(risk.take_profit_pct, 0.05);
        assert_eq!(risk.qty_precision, 6);
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir().join(format!("trendbot-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bot.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "exchange = \"synthetic\"\nsymbol = \"ETH/USDC\"\nshort_window = 3\nlong_window = 8\nmax_candles = 50"
        )
        .unwrap();

        let config = BotConfig::load(Some(&path)).unwrap();
        assert_eq!(config.exchange, Exchange::Synthetic);
        assert_eq!(config.venue_symbol(), "ETHUSDC");
        assert_eq!(config.quote_coin(), "USDC");
        assert_eq!(config.short_window, 3);
        assert_eq!(config.long_window, 8);

        std::fs::remove_dir_all(&dir).ok();
    }
}
