pub mod builders;
pub mod fake_grid;
pub mod fake_handler;

use std::sync::Once;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Install a tracing subscriber for tests, once per process.
///
/// Uses the per-test writer, so output only shows up for failing tests
/// (or with `-- --nocapture`). Levels come from `RUST_LOG`, e.g.
/// `RUST_LOG=gridflow=debug cargo test`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Bound a future that should resolve quickly; panics if it does not.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("future did not resolve within 5 seconds")
}
