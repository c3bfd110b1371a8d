use std::sync::atomic::{AtomicU64, Ordering};

/// Receives byte counts as a download or upload advances
pub trait ProgressObserver: Send + Sync {
    fn on_bytes_transferred(&self, delta: u64);
}

/// Logs every 10% milestone of a transfer with a known total size
pub struct LoggingProgress {
    label: String,
    total: u64,
    transferred: AtomicU64,
    last_milestone: AtomicU64,
}

impl LoggingProgress {
    pub fn new(label: impl Into<String>, total: u64) -> Self {
        Self {
            label: label.into(),
            total,
            transferred: AtomicU64::new(0),
            last_milestone: AtomicU64::new(0),
        }
    }

    pub fn transferred(&self) -> u64 {
        self.transferred.load(Ordering::Relaxed)
    }
}

impl ProgressObserver for LoggingProgress {
    fn on_bytes_transferred(&self, delta: u64) {
        let transferred = self.transferred.fetch_add(delta, Ordering::Relaxed) + delta;

        if self.total == 0 {
            tracing::debug!(label = %self.label, bytes = transferred, "Transfer progress");
            return;
        }

        let percent = (transferred.saturating_mul(100) / self.total).min(100);
        let milestone = percent - percent % 10;
        let previous = self.last_milestone.fetch_max(milestone, Ordering::Relaxed);

        if milestone > previous {
            tracing::info!(
                label = %self.label,
                percent = milestone,
                bytes = transferred,
                total = self.total,
                "Transfer progress"
            );
        }
    }
}

/// Byte sizes in 1024 steps, e.g. `1.5 MB`
pub fn format_size(size_bytes: u64) -> String {
    const UNITS: [&str; 9] = ["B", "KB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

    if size_bytes == 0 {
        return "0B".to_string();
    }

    let mut exponent = 0;
    let mut remaining = size_bytes;
    while remaining >= 1024 && exponent < UNITS.len() - 1 {
        remaining /= 1024;
        exponent += 1;
    }
    let scaled = size_bytes as f64 / 1024f64.powi(exponent as i32);
    let rounded = (scaled * 100.0).round() / 100.0;

    format!("{} {}", rounded, UNITS[exponent])
}
