//! Tracing initialization

use makerspace_error::{TransactionError, TransactionResult};
use std::sync::Once;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use crate::config::TracingConfig;

//-----------------------------------------------------------------------------
// Tracing Initialization
//-----------------------------------------------------------------------------

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins over `config.level` when set. Fails if a global
/// subscriber is already installed.
pub fn init_tracing(config: &TracingConfig) -> TransactionResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| TransactionError::Tracing(e.to_string()))?;

    let subscriber = Registry::default().with(env_filter);

    let installed = if config.json {
        let json_layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true);
        tracing::subscriber::set_global_default(subscriber.with(json_layer))
    } else {
        let fmt_layer = fmt::layer().with_target(true).with_level(true);
        tracing::subscriber::set_global_default(subscriber.with(fmt_layer))
    };

    installed.map_err(|e| TransactionError::Tracing(e.to_string()))
}

//-----------------------------------------------------------------------------
// Test Logging
//-----------------------------------------------------------------------------

static TEST_INIT: Once = Once::new();

/// Initialize debug-level logging routed through the test writer.
/// Safe to call from every test.
pub fn init_test_logging() {
    TEST_INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("makerspace_transactions=debug"));
        let subscriber = Registry::default()
            .with(filter)
            .with(fmt::layer().with_test_writer());
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}
