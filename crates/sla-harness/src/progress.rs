//! Progress reporting through tracing.

use tracing::info;
use verification::ProgressObserver;

/// Logs `"{completed}/{total} requests completed"` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressObserver for TracingProgress {
    fn on_progress(&self, completed: usize, total: usize) {
        info!(completed, total, "{completed}/{total} requests completed");
    }
}
