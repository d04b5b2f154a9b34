use std::process::ExitCode;

use clap::Parser;
use gcs_grpc_bench::{
    config::{BenchArgs, RunConfig},
    error::RpcError,
    runner::BenchmarkRunner,
};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: bool) {
    let default_directive = if verbose {
        "info,gcs_grpc_bench=debug"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(config: RunConfig) -> Result<(), RpcError> {
    let mut runner = BenchmarkRunner::connect(config).await?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let outcome = runner.run(&mut out).await?;
    debug!("Benchmark finished: {:?}", outcome.summary);
    Ok(())
}

fn main() -> ExitCode {
    let args = BenchArgs::parse();
    init_tracing(args.verbose);
    let config = RunConfig::from(args);
    debug!("Running with {:?}", config);

    // Runs are strictly sequential, a single thread drives everything.
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("Failed to start the runtime: {}", err);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", err);
            ExitCode::from(err.exit_code())
        }
    }
}
