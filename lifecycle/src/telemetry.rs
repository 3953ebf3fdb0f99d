//! Tracing setup for test processes.

use config::{HarborSettings, load_settings_from_env};
use std::sync::Once;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static INIT: Once = Once::new();

/// Installs a subscriber filtered by `HARBOR_LOG` (then `RUST_LOG`,
/// default `info`) that writes through the test writer. Later calls are
/// no-ops, as is the first one when another subscriber is already set.
pub fn init_test_tracing() {
    let settings = load_settings_from_env(HarborSettings::default());
    init_tracing(&settings.log_filter);
}

pub fn init_tracing(filter: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_new(filter).unwrap_or_else(|e| {
            eprintln!("Invalid log filter {:?} ({}); using info", filter, e);
            EnvFilter::new("info")
        });
        let _ = tracing_subscriber::registry()
            .with(fmt::layer().with_test_writer())
            .with(filter)
            .try_init();
    });
}
