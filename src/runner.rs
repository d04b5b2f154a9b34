use std::{io::Write, time::Instant};

use tonic::Request;
use tracing::{debug, warn};

use crate::{
    client::{self, PeerTracker, StorageStub},
    config::RunConfig,
    error::RpcError,
    proto::storage::v1::GetObjectMediaRequest,
    report,
    stats::{RunResult, RunTimes, RunningTotals, Summary},
};

/// What a completed benchmark produced.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkOutcome {
    /// Total times of the measured runs, in the order they ran.
    pub run_times: RunTimes,
    /// `None` when `runs == 1`, or when there was nothing to summarize.
    pub summary: Option<Summary>,
    pub totals: RunningTotals,
}

/// Drives the download loop over one shared channel.
pub struct BenchmarkRunner {
    config: RunConfig,
    stub: StorageStub,
    peers: PeerTracker,
}

impl BenchmarkRunner {
    /// Connect to the configured host. The channel is reused by every run.
    pub async fn connect(config: RunConfig) -> Result<Self, RpcError> {
        let peers = PeerTracker::new();
        let stub = client::connect(&config, peers.clone()).await?;
        Ok(Self {
            config,
            stub,
            peers,
        })
    }

    fn request(&self) -> GetObjectMediaRequest {
        GetObjectMediaRequest {
            bucket: self.config.bucket.clone(),
            object: self.config.object.clone(),
            ..Default::default()
        }
    }

    /// Download the object once, draining the stream to its final status.
    pub async fn run_once(&mut self) -> Result<RunResult, RpcError> {
        let request = Request::new(self.request());
        let start = Instant::now();

        let mut stream = self.stub.get_object_media(request).await?.into_inner();
        let mut first_byte = None;
        let mut bytes = 0u64;
        while let Some(response) = stream.message().await? {
            if first_byte.is_none() {
                first_byte = Some(Instant::now());
            }
            if let Some(data) = response.checksummed_data {
                bytes += data.content.len() as u64;
            }
        }
        let end = Instant::now();

        // An empty object never produced a first byte.
        let first_byte = first_byte.unwrap_or(end);
        Ok(RunResult {
            ttfb: first_byte - start,
            total: end - start,
            bytes,
            peer: self.peers.peer(),
        })
    }

    /// Fail unless the run took the network path the config asked for.
    pub fn check_path(&self, result: &RunResult) -> Result<(), RpcError> {
        let used = self.config.directpath_matcher.matches(&result.peer);
        if used != self.config.directpath {
            return Err(RpcError::PathMismatch {
                expected: self.config.directpath,
                used,
                peer: result.peer.clone(),
            });
        }
        Ok(())
    }

    /// Run warmups and measured runs back to back, then summarize.
    ///
    /// Verbose diagnostics and the summary table go to `out`. The first
    /// failed download or path mismatch ends the loop.
    pub async fn run<W: Write>(&mut self, out: &mut W) -> Result<BenchmarkOutcome, RpcError> {
        let mut run_times = RunTimes::default();
        let mut totals = RunningTotals::default();

        for run in 0..self.config.total_runs() {
            let result = self.run_once().await?;
            debug!(
                "Run {} finished: {} bytes from {} in {:?}",
                run, result.bytes, result.peer, result.total
            );
            self.check_path(&result)?;

            if self.config.verbose {
                report::write_run_diagnostics(out, &result)?;
            }
            if self.config.is_measured(run) {
                run_times.record(result.total_millis());
            }
            totals.add(&result);
        }
        debug!(
            "Accumulated over {} runs: ttfb {} ms, transfer {} ms",
            totals.runs, totals.ttfb_millis, totals.transfer_millis
        );

        let summary = if self.config.wants_summary() {
            let summary = run_times.summary();
            match &summary {
                Some(summary) => report::write_summary(out, summary)?,
                None => warn!("No measured runs, nothing to summarize"),
            }
            summary
        } else {
            None
        };

        Ok(BenchmarkOutcome {
            run_times,
            summary,
            totals,
        })
    }
}
