//! Statistics for relayed tracks

use std::time::{Duration, Instant};

/// Per-track relay statistics
#[derive(Debug, Clone)]
pub struct RelayStats {
    /// When the relay started
    pub started_at: Instant,
    /// Packets forwarded to the local track
    pub packets: u64,
    /// Bytes forwarded to the local track
    pub bytes: u64,
    /// Packets also forwarded to the distribution sink
    pub sink_packets: u64,
}

impl RelayStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            packets: 0,
            bytes: 0,
            sink_packets: 0,
        }
    }

    /// Record one forwarded packet
    pub fn on_packet(&mut self, size: usize, to_sink: bool) {
        self.packets += 1;
        self.bytes += size as u64;
        if to_sink {
            self.sink_packets += 1;
        }
    }

    /// Time since the relay started
    pub fn duration(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Average bitrate (bits/sec) over the relay's lifetime
    pub fn bitrate(&self) -> Option<u64> {
        let secs = self.duration().as_secs();
        if secs > 0 {
            Some((self.bytes * 8) / secs)
        } else {
            None
        }
    }
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}
