use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::{DeskError, Result};

use super::{ExchangeKind, PaperExchange};

/// Exchange kind implied by `exchange.test_mode`
pub fn configured_exchange_kind(app_config: &AppConfig) -> ExchangeKind {
    if app_config.exchange.test_mode {
        ExchangeKind::Paper
    } else {
        ExchangeKind::Live
    }
}

/// Create the runtime exchange client from `AppConfig`.
pub fn build_exchange_client(app_config: &AppConfig) -> Result<Arc<PaperExchange>> {
    build_exchange_client_for(configured_exchange_kind(app_config), app_config)
}

/// Create exchange client for an explicit exchange kind.
///
/// Only the paper exchange ships with this crate; live routing is refused
/// rather than silently downgraded.
pub fn build_exchange_client_for(
    exchange: ExchangeKind,
    app_config: &AppConfig,
) -> Result<Arc<PaperExchange>> {
    match exchange {
        ExchangeKind::Paper => Ok(Arc::new(PaperExchange::from_config(&app_config.exchange))),
        ExchangeKind::Live => Err(DeskError::InvalidInput(format!(
            "live trading against {} is not supported; set exchange.test_mode = true",
            app_config.exchange.base_url
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_builds_paper_exchange() {
        let config = AppConfig::default();
        assert_eq!(configured_exchange_kind(&config), ExchangeKind::Paper);
        assert!(build_exchange_client(&config).is_ok());
    }

    #[test]
    fn test_live_mode_is_refused() {
        let mut config = AppConfig::default();
        config.exchange.test_mode = false;
        assert!(matches!(
            build_exchange_client(&config),
            Err(DeskError::InvalidInput(_))
        ));
    }
}
