use std::time::Duration;

/// Bytes in the megabyte used for throughput figures.
pub const BYTES_PER_MEGABYTE: f64 = 1_048_576.0;

/// Timings of one download.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    /// Time from issuing the call to the first streamed chunk.
    pub ttfb: Duration,
    /// Time from issuing the call until the final status arrived.
    pub total: Duration,
    /// Object bytes received across all chunks.
    pub bytes: u64,
    /// Remote peer the channel was connected to, as rendered by [`crate::path::peer_string`].
    pub peer: String,
}

impl RunResult {
    pub fn ttfb_millis(&self) -> u64 {
        duration_millis(self.ttfb)
    }

    pub fn total_millis(&self) -> u64 {
        duration_millis(self.total)
    }

    pub fn throughput_mbps(&self) -> f64 {
        throughput_mbps(self.bytes, self.total)
    }
}

/// Whole milliseconds, truncated.
pub fn duration_millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

/// Megabytes per second for `bytes` moved in `elapsed`.
pub fn throughput_mbps(bytes: u64, elapsed: Duration) -> f64 {
    bytes as f64 / (elapsed.as_secs_f64() * BYTES_PER_MEGABYTE)
}

/// Total times of the measured runs, in milliseconds, in recording order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunTimes {
    millis: Vec<u64>,
}

impl RunTimes {
    pub fn record(&mut self, millis: u64) {
        self.millis.push(millis);
    }

    pub fn len(&self) -> usize {
        self.millis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.millis.is_empty()
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.millis
    }

    /// Summarize the recorded runs. `None` if nothing was recorded.
    pub fn summary(&self) -> Option<Summary> {
        Summary::from_run_times(self.millis.clone())
    }
}

impl From<Vec<u64>> for RunTimes {
    fn from(millis: Vec<u64>) -> Self {
        Self { millis }
    }
}

/// Aggregate latency figures over the measured runs, all in milliseconds.
///
/// Percentiles index straight into the ascending-sorted samples with a
/// truncated index, no interpolation between neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub avg: u64,
    pub min: u64,
    pub p50: u64,
    pub p90: u64,
    pub p99: u64,
    pub max: u64,
}

impl Summary {
    pub fn from_run_times(mut millis: Vec<u64>) -> Option<Self> {
        if millis.is_empty() {
            return None;
        }
        millis.sort_unstable();
        let count = millis.len();
        let sum: u64 = millis.iter().sum();

        Some(Self {
            avg: sum / count as u64,
            min: millis[0],
            p50: millis[count / 2],
            p90: millis[percentile_index(count, 0.9)],
            p99: millis[percentile_index(count, 0.99)],
            max: millis[count - 1],
        })
    }
}

/// `floor(count * fraction)`, kept inside the sample range.
pub fn percentile_index(count: usize, fraction: f64) -> usize {
    let index = (count as f64 * fraction) as usize;
    index.min(count.saturating_sub(1))
}

/// Sums over every iteration, warmups included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunningTotals {
    pub runs: usize,
    pub ttfb_millis: u64,
    pub transfer_millis: u64,
}

impl RunningTotals {
    pub fn add(&mut self, result: &RunResult) {
        self.runs += 1;
        self.ttfb_millis += result.ttfb_millis();
        self.transfer_millis += result.total_millis();
    }
}
