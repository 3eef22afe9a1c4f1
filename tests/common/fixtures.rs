use std::path::PathBuf;
use std::sync::Arc;

use firmographer::batch::InputTable;
use firmographer::config::{AppConfig, DEFAULT_CONFIG};
use firmographer::fabricator::RequestFabricator;
use firmographer::governor::{RecordingSleeper, SharedGovernor};
use firmographer::sources::FetchContext;

pub fn fixture_path(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(relative)
}

pub fn load_fixture(relative: &str) -> String {
    std::fs::read_to_string(fixture_path(relative))
        .unwrap_or_else(|_| panic!("Failed to load fixture: {}", relative))
}

/// Shipped config with instant pacing, no override file and only `enabled` sources
pub fn offline_config(enabled: &[&str]) -> AppConfig {
    let mut config = AppConfig::from_toml_str(DEFAULT_CONFIG).expect("default config parses");
    for window in [
        &mut config.throttle.windows.professional_network,
        &mut config.throttle.windows.company_website,
        &mut config.throttle.windows.public_directory,
    ] {
        window.min_ms = 0;
        window.max_ms = 0;
    }
    config.throttle.max_delay_ms = 10;
    config.http.request_timeout_secs = 5;
    config.sources.enabled = enabled.iter().map(|s| s.to_string()).collect();
    config.overrides.path = None;
    config.validate().expect("offline config validates");
    config
}

/// Governor that records its delays instead of sleeping
pub fn recording_governor(config: &AppConfig) -> (SharedGovernor, RecordingSleeper) {
    let sleeper = RecordingSleeper::new();
    let governor = SharedGovernor::with_sleeper(&config.throttle, Arc::new(sleeper.clone()), 7);
    (governor, sleeper)
}

pub fn fetch_context(config: &AppConfig, governor: &SharedGovernor) -> FetchContext {
    FetchContext::new(
        Arc::new(RequestFabricator::with_seed(&config.http, 7)),
        governor.clone(),
    )
}

/// In-memory input table from literal headers and rows
pub fn table(headers: &[&str], rows: &[Vec<String>]) -> InputTable {
    InputTable {
        headers: headers.iter().map(|h| h.to_string()).collect(),
        rows: rows
            .iter()
            .map(|row| {
                headers
                    .iter()
                    .zip(row.iter())
                    .map(|(h, v)| (h.to_string(), v.clone()))
                    .collect()
            })
            .collect(),
    }
}
