use thiserror::Error;

/// Failure taxonomy for the trading loop.
///
/// `DataFetch` and `Order` are recoverable: the loop controller logs them and
/// carries on with the next cycle. `Config` and `ConfigLoad` are raised before
/// the loop ever starts.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("market data fetch failed: {0}")]
    DataFetch(String),

    #[error("order rejected: {0}")]
    Order(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to load configuration: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    #[error("no async runtime available: {0}")]
    Runtime(String),
}

impl BotError {
    pub fn data_fetch(msg: impl Into<String>) -> Self {
        Self::DataFetch(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the loop can keep going after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::DataFetch(_) | Self::Order(_))
    }
}

impl From<reqwest::Error> for BotError {
    fn from(err: reqwest::Error) -> Self {
        Self::DataFetch(err.to_string())
    }
}

impl From<serde_json::Error> for BotError {
    fn from(err: serde_json::Error) -> Self {
        Self::DataFetch(format!("malformed response: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_errors() {
        assert!(BotError::data_fetch("timeout").is_recoverable());
        assert!(BotError::Order("insufficient balance".to_string()).is_recoverable());
        assert!(!BotError::config("bad window").is_recoverable());
    }

    #[test]
    fn test_error_messages() {
        let err = BotError::data_fetch("empty kline list");
        assert_eq!(err.to_string(), "market data fetch failed: empty kline list");

        let err = BotError::Order("retCode 170131".to_string());
        assert!(err.to_string().contains("retCode 170131"));
    }

    #[test]
    fn test_json_error_maps_to_data_fetch() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: BotError = parse_err.into();
        assert!(matches!(err, BotError::DataFetch(_)));
    }
}
