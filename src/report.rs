use std::io::{self, Write};

use crate::stats::{RunResult, Summary};

/// Per-run diagnostics printed in verbose mode.
pub fn write_run_diagnostics<W: Write>(out: &mut W, result: &RunResult) -> io::Result<()> {
    writeln!(out, "Was connected to {}", result.peer)?;
    writeln!(out, "Downloaded {} bytes.", result.bytes)?;
    writeln!(out, "Time to first byte: {} millis.", result.ttfb_millis())?;
    writeln!(
        out,
        "Total transfer time: {} seconds.",
        result.total.as_secs_f64()
    )?;
    writeln!(out, "Download speed of {} MBps.", result.throughput_mbps())?;
    writeln!(out)
}

/// The aggregate table printed after the loop.
pub fn write_summary<W: Write>(out: &mut W, summary: &Summary) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "\t\tAvg\tMin\tp50\tp90\tp99\tMax")?;
    writeln!(
        out,
        "Time(ms)\t{}\t{}\t{}\t{}\t{}\t{}",
        summary.avg, summary.min, summary.p50, summary.p90, summary.p99, summary.max
    )
}
