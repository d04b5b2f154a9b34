use clap::Parser;
use gcs_grpc_bench::{
    config::{DEFAULT_BUCKET, DEFAULT_OBJECT},
    server::{serve, FakeObject, FakeStorage, DEFAULT_CHUNK_SIZE},
};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Serve a synthetic object over the storage gRPC API for local benchmarking.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct ServerArgs {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:50051")]
    addr: String,

    /// Bucket name to serve
    #[arg(long, default_value = DEFAULT_BUCKET)]
    bucket: String,

    /// Object name to serve
    #[arg(long, default_value = DEFAULT_OBJECT)]
    object: String,

    /// Object size in bytes
    #[arg(long, default_value_t = 1024 * 1024 * 1024)]
    size: u64,

    /// Bytes per streamed response
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = ServerArgs::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let storage = FakeStorage::new(args.chunk_size).with_object(
        &args.bucket,
        &args.object,
        FakeObject::new(args.size),
    );
    let listener = TcpListener::bind(&args.addr).await?;
    info!(
        "Serving {}/{} ({} bytes) on {}",
        args.bucket,
        args.object,
        args.size,
        listener.local_addr()?
    );
    serve(listener, storage).await?;

    Ok(())
}
