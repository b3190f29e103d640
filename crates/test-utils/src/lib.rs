//! Shared helpers for the `phpmon-runtime` integration tests.

pub mod fakes;

use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

/// Upper bound for any single awaited step in the shell tests. Real
/// processes are involved, so this is generous.
pub const STEP_LIMIT: Duration = Duration::from_secs(5);

/// Crate logs at debug, dependencies at warn, unless `RUST_LOG` says
/// otherwise. Output goes through the test writer and only shows for
/// failing tests.
pub fn init_tracing() {
    static SUBSCRIBER: OnceLock<()> = OnceLock::new();
    SUBSCRIBER.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("warn,phpmon_runtime=debug"));
        // Another harness may have installed a global subscriber first.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Await `fut`, failing the test if it takes longer than [`STEP_LIMIT`].
pub async fn with_timeout<F: Future>(fut: F) -> F::Output {
    match tokio::time::timeout(STEP_LIMIT, fut).await {
        Ok(output) => output,
        Err(_) => panic!("step did not finish within {STEP_LIMIT:?}"),
    }
}
