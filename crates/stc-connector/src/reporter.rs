//! Periodic status report in the log.

use crate::registry::ModuleRegistry;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::info;

/// Logs one line per module every `period`. The first report comes after one period.
pub fn spawn_status_reporter(registry: ModuleRegistry, period: Duration) -> JoinHandle<()> {
    info!("[Reporter] Reporting module status every {:?}", period);
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        loop {
            ticker.tick().await;
            report(&registry);
        }
    })
}

/// Logs the current status of every module.
pub fn report(registry: &ModuleRegistry) {
    for handle in registry.list() {
        let status = handle.data().status();
        info!(
            module = %handle.id(),
            running = status.running(),
            fatal = status.fatal(),
            last_get = ?status.last_get(),
            last_post = ?status.last_post(),
            post_success = status.observations_posted_ok(),
            post_failed = status.observations_posted_failed(),
            errors = status.error_count(),
            "[Reporter] Status report for module {}",
            handle.data().file_name()
        );
    }
}
