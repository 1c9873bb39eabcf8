//! Stage timers.

use std::time::{Duration, Instant};

use tracing::info;

/// Measures one pipeline stage and reports it when finished.
pub struct Timer {
    stage: &'static str,
    start: Instant,
}

impl Timer {
    pub fn start(stage: &'static str) -> Self {
        Self {
            stage,
            start: Instant::now(),
        }
    }

    /// Print the elapsed time and return it.
    pub fn finish(self) -> Duration {
        let elapsed = self.start.elapsed();
        println!("  [{}] {}", format_elapsed(elapsed), self.stage);
        info!(stage = self.stage, elapsed_ms = elapsed.as_millis() as u64, "stage finished");
        elapsed
    }
}

/// Seconds below a minute, minutes below an hour, hours otherwise.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs >= 3600.0 {
        format!("{:.1}h", secs / 3600.0)
    } else if secs >= 60.0 {
        format!("{:.1}m", secs / 60.0)
    } else {
        format!("{:.1}s", secs)
    }
}
