use std::net::SocketAddr;

use gcs_grpc_bench::{
    config::{Credentials, RunConfig},
    error::{RpcError, EXIT_DOWNLOAD_FAILURE, EXIT_PATH_MISMATCH},
    path::DirectPathMatcher,
    runner::BenchmarkRunner,
    server::{spawn, FakeObject, FakeStorage},
};
use tonic::Code;

const BUCKET: &str = "bench-bucket";
const OBJECT: &str = "5M.bin";
const OBJECT_SIZE: u64 = 5 * 1024 * 1024;
const CHUNK_SIZE: usize = 1024 * 1024;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Start a fake storage server on a loopback port.
async fn start_storage(object: FakeObject) -> (FakeStorage, SocketAddr) {
    init_tracing();
    let storage = FakeStorage::new(CHUNK_SIZE).with_object(BUCKET, OBJECT, object);
    let (addr, _handle) = spawn("127.0.0.1:0", storage.clone())
        .await
        .expect("Failed to start fake storage");
    (storage, addr)
}

/// Loopback peers never look like DirectPath, so expect the regular path.
fn config(addr: SocketAddr, runs: usize, warmup_runs: usize) -> RunConfig {
    RunConfig {
        host: format!("http://{}", addr),
        bucket: BUCKET.to_string(),
        object: OBJECT.to_string(),
        runs,
        warmup_runs,
        directpath: false,
        ..RunConfig::default()
    }
}

#[tokio::test]
async fn measured_runs_feed_the_summary() {
    let (storage, addr) = start_storage(FakeObject::new(OBJECT_SIZE)).await;
    let config = RunConfig {
        verbose: true,
        ..config(addr, 5, 2)
    };

    let mut runner = BenchmarkRunner::connect(config).await.unwrap();
    let mut out = Vec::new();
    let outcome = runner.run(&mut out).await.unwrap();

    assert_eq!(storage.requests(), 7);
    assert_eq!(outcome.run_times.len(), 5);
    assert_eq!(outcome.totals.runs, 7);

    let summary = outcome.summary.expect("summary for five runs");
    let mut sorted = outcome.run_times.as_slice().to_vec();
    sorted.sort_unstable();
    assert_eq!(summary.min, sorted[0]);
    assert_eq!(summary.p50, sorted[2]);
    assert_eq!(summary.max, sorted[4]);

    let text = String::from_utf8(out).unwrap();
    assert_eq!(text.matches("Downloaded 5242880 bytes.").count(), 7);
    assert_eq!(text.matches("Was connected to ipv4:127.0.0.1:").count(), 7);
    assert!(text.contains("\t\tAvg\tMin\tp50\tp90\tp99\tMax\nTime(ms)\t"));
}

#[tokio::test]
async fn single_run_prints_no_summary() {
    let (storage, addr) = start_storage(FakeObject::new(OBJECT_SIZE)).await;

    let mut runner = BenchmarkRunner::connect(config(addr, 1, 3)).await.unwrap();
    let mut out = Vec::new();
    let outcome = runner.run(&mut out).await.unwrap();

    assert_eq!(storage.requests(), 4);
    assert_eq!(outcome.run_times.len(), 1);
    assert_eq!(outcome.summary, None);
    assert!(out.is_empty());
}

#[tokio::test]
async fn zero_runs_only_warm_up() {
    let (storage, addr) = start_storage(FakeObject::new(OBJECT_SIZE)).await;

    let mut runner = BenchmarkRunner::connect(config(addr, 0, 2)).await.unwrap();
    let mut out = Vec::new();
    let outcome = runner.run(&mut out).await.unwrap();

    assert_eq!(storage.requests(), 2);
    assert!(outcome.run_times.is_empty());
    assert_eq!(outcome.summary, None);
    assert_eq!(outcome.totals.runs, 2);
    assert!(out.is_empty());
}

#[tokio::test]
async fn run_once_counts_every_byte() {
    let (_storage, addr) = start_storage(FakeObject::new(OBJECT_SIZE + 17)).await;

    let mut runner = BenchmarkRunner::connect(config(addr, 1, 0)).await.unwrap();
    let result = runner.run_once().await.unwrap();

    assert_eq!(result.bytes, OBJECT_SIZE + 17);
    assert!(result.ttfb <= result.total);
    assert_eq!(result.peer, format!("ipv4:{}", addr));
}

#[tokio::test]
async fn empty_object_reports_total_as_ttfb() {
    let (_storage, addr) = start_storage(FakeObject::new(0)).await;

    let mut runner = BenchmarkRunner::connect(config(addr, 1, 0)).await.unwrap();
    let result = runner.run_once().await.unwrap();

    assert_eq!(result.bytes, 0);
    assert_eq!(result.ttfb, result.total);
}

#[tokio::test]
async fn missing_object_aborts_before_summary() {
    let (storage, addr) = start_storage(FakeObject::new(OBJECT_SIZE)).await;
    let config = RunConfig {
        object: "missing.bin".to_string(),
        ..config(addr, 5, 1)
    };

    let mut runner = BenchmarkRunner::connect(config).await.unwrap();
    let mut out = Vec::new();
    let err = runner.run(&mut out).await.unwrap_err();

    match &err {
        RpcError::Download(status) => assert_eq!(status.code(), Code::NotFound),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(err.exit_code(), EXIT_DOWNLOAD_FAILURE);
    assert!(err.to_string().starts_with("Download Failure!\nNo such object"));
    assert_eq!(storage.requests(), 1);
    assert!(out.is_empty());
}

#[tokio::test]
async fn mid_stream_failure_aborts() {
    let (storage, addr) = start_storage(FakeObject::failing_after(OBJECT_SIZE, 2)).await;

    let mut runner = BenchmarkRunner::connect(config(addr, 3, 0)).await.unwrap();
    let mut out = Vec::new();
    let err = runner.run(&mut out).await.unwrap_err();

    match err {
        RpcError::Download(status) => assert_eq!(status.code(), Code::Unavailable),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(storage.requests(), 1);
}

#[tokio::test]
async fn unexpected_path_stops_on_first_run() {
    let (storage, addr) = start_storage(FakeObject::new(OBJECT_SIZE)).await;
    let config = RunConfig {
        directpath: true,
        verbose: true,
        ..config(addr, 3, 1)
    };

    let mut runner = BenchmarkRunner::connect(config).await.unwrap();
    let mut out = Vec::new();
    let err = runner.run(&mut out).await.unwrap_err();

    match &err {
        RpcError::PathMismatch {
            expected,
            used,
            peer,
        } => {
            assert!(*expected);
            assert!(!*used);
            assert_eq!(peer, &format!("ipv4:{}", addr));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(err.exit_code(), EXIT_PATH_MISMATCH);
    assert_eq!(storage.requests(), 1);
    assert!(out.is_empty());
}

#[tokio::test]
async fn directpath_peer_rejected_when_disabled() {
    let (storage, addr) = start_storage(FakeObject::new(OBJECT_SIZE)).await;
    let config = RunConfig {
        directpath: false,
        directpath_matcher: DirectPathMatcher::new("ipv4:127."),
        ..config(addr, 3, 1)
    };

    let mut runner = BenchmarkRunner::connect(config).await.unwrap();
    let mut out = Vec::new();
    let err = runner.run(&mut out).await.unwrap_err();

    match &err {
        RpcError::PathMismatch {
            expected,
            used,
            peer,
        } => {
            assert!(!*expected);
            assert!(*used);
            assert_eq!(peer, &format!("ipv4:{}", addr));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(err.exit_code(), EXIT_PATH_MISMATCH);
    assert_eq!(storage.requests(), 1);
    assert!(out.is_empty());
}

#[tokio::test]
async fn custom_prefix_marks_loopback_as_directpath() {
    let (_storage, addr) = start_storage(FakeObject::new(OBJECT_SIZE)).await;
    let config = RunConfig {
        directpath: true,
        directpath_matcher: DirectPathMatcher::new("ipv4:127."),
        ..config(addr, 2, 0)
    };

    let mut runner = BenchmarkRunner::connect(config).await.unwrap();
    let mut out = Vec::new();
    let outcome = runner.run(&mut out).await.unwrap();

    assert_eq!(outcome.run_times.len(), 2);
    assert!(outcome.summary.is_some());
}

#[tokio::test]
async fn access_token_over_plaintext() {
    let (storage, addr) = start_storage(FakeObject::new(OBJECT_SIZE)).await;
    let config = RunConfig {
        credentials: Credentials::AccessToken("ya29.test-token".to_string()),
        ..config(addr, 1, 0)
    };

    let mut runner = BenchmarkRunner::connect(config).await.unwrap();
    let mut out = Vec::new();
    runner.run(&mut out).await.unwrap();
    assert_eq!(storage.requests(), 1);
}

#[tokio::test]
async fn unreachable_host_fails_to_connect() {
    init_tracing();
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = BenchmarkRunner::connect(config(addr, 1, 0))
        .await
        .err()
        .expect("connect should fail");
    assert!(matches!(err, RpcError::Transport(_)));
    assert_eq!(err.exit_code(), EXIT_DOWNLOAD_FAILURE);
}

#[tokio::test]
async fn invalid_host_is_a_config_error() {
    let config = RunConfig {
        host: "http://".to_string(),
        ..RunConfig::default()
    };
    let err = BenchmarkRunner::connect(config).await.err().unwrap();
    assert!(matches!(err, RpcError::InvalidTarget { .. }));
    assert_eq!(err.exit_code(), 2);
}

#[tokio::test]
async fn invalid_port_is_a_config_error() {
    for host in ["http://127.0.0.1:notaport", "dns:///storage.googleapis.com:99999"] {
        let config = RunConfig {
            host: host.to_string(),
            ..RunConfig::default()
        };
        let err = BenchmarkRunner::connect(config).await.err().unwrap();
        assert!(
            matches!(err, RpcError::InvalidTarget { .. }),
            "{:?} should be rejected",
            host
        );
        assert_eq!(err.exit_code(), 2);
    }
}
