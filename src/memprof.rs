//! Memory and timing checkpoints for pipeline phases
//!
//! - Memory: RSS (Resident Set Size) read from /proc/self/status (0 elsewhere)
//! - Timing: std::time::Instant between checkpoints
//!
//! All output goes to stderr so stdout stays a clean progress log.

use std::time::Instant;

/// Current RSS in bytes from /proc/self/status, 0 if unavailable
pub fn rss_bytes() -> u64 {
    let Ok(status) = std::fs::read_to_string("/proc/self/status") else {
        return 0;
    };
    status
        .lines()
        .find(|line| line.starts_with("VmRSS:"))
        // Format: "VmRSS:    123456 kB"
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb * 1024)
        .unwrap_or(0)
}

/// Current RSS in megabytes
pub fn rss_mb() -> f64 {
    rss_bytes() as f64 / (1024.0 * 1024.0)
}

/// Tracks elapsed time and RSS across the phases of one run
#[derive(Debug)]
pub struct PhaseLog {
    start: Instant,
    last: Instant,
    last_rss_mb: f64,
}

impl PhaseLog {
    /// Start the log and print the first checkpoint
    pub fn start(label: &str) -> Self {
        let now = Instant::now();
        let rss = rss_mb();
        eprintln!("[PHASE @0.000s] {} [{:.2} MB]", label, rss);
        Self {
            start: now,
            last: now,
            last_rss_mb: rss,
        }
    }

    /// Print a checkpoint with the time and RSS change since the previous one
    pub fn checkpoint(&mut self, label: &str) {
        let now = Instant::now();
        let rss = rss_mb();
        eprintln!(
            "[PHASE @{:.3}s] {} [+{:.3}s, {:.2} MB (delta: {:+.2} MB)]",
            now.duration_since(self.start).as_secs_f64(),
            label,
            now.duration_since(self.last).as_secs_f64(),
            rss,
            rss - self.last_rss_mb
        );
        self.last = now;
        self.last_rss_mb = rss;
    }

    /// Seconds since the log was started
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}
