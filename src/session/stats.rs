use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics about a recording session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    /// When the recording started
    pub started_at: DateTime<Utc>,

    /// Total duration in seconds
    pub duration_secs: f64,

    /// Audio records appended to the log
    pub packets_written: u64,

    /// Packets dropped because resolution or the write failed
    pub packets_dropped: u64,
}

/// Lock-free counters shared between the packet path and status queries
#[derive(Debug, Default)]
pub struct PacketCounters {
    written: AtomicU64,
    dropped: AtomicU64,
}

impl PacketCounters {
    pub fn record_written(&self) {
        self.written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self, started_at: DateTime<Utc>) -> SessionStats {
        let duration = Utc::now().signed_duration_since(started_at);

        SessionStats {
            started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            packets_written: self.written(),
            packets_dropped: self.dropped(),
        }
    }
}
