use tracing::{info, warn};

/// Sink for the human-readable claim log.
pub trait ClaimLog: Send + Sync {
    fn info(&self, category: &str, message: &str);
    fn warn(&self, category: &str, message: &str);
}

/// Forwards claim log lines to `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLog;

impl ClaimLog for TracingLog {
    fn info(&self, category: &str, message: &str) {
        info!(category, "{}", message);
    }

    fn warn(&self, category: &str, message: &str) {
        warn!(category, "{}", message);
    }
}
