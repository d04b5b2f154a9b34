use std::{
    collections::HashMap,
    io,
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use tokio::{net::TcpListener, sync::mpsc, task::JoinHandle};
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tonic::{transport::Server, Request, Response, Status};
use tracing::{debug, info};

use crate::proto::storage::v1::{
    storage_server::{Storage, StorageServer},
    ChecksummedData, GetObjectMediaRequest, GetObjectMediaResponse,
};

/// Largest chunk the real service sends in one `GetObjectMediaResponse`.
pub const DEFAULT_CHUNK_SIZE: usize = 2 * 1024 * 1024;

/// Responses buffered ahead of the client.
const STREAM_BUFFER: usize = 4;

/// An object served by [`FakeStorage`]. Its content is all zeros.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FakeObject {
    pub size: u64,
    /// Abort the stream with `UNAVAILABLE` after this many chunks.
    pub fail_after_chunks: Option<usize>,
}

impl FakeObject {
    pub fn new(size: u64) -> Self {
        Self {
            size,
            fail_after_chunks: None,
        }
    }

    pub fn failing_after(size: u64, chunks: usize) -> Self {
        Self {
            size,
            fail_after_chunks: Some(chunks),
        }
    }
}

/// In-process stand-in for the storage service's media download.
#[derive(Debug, Clone)]
pub struct FakeStorage {
    objects: Arc<HashMap<(String, String), FakeObject>>,
    chunk_size: usize,
    requests: Arc<AtomicUsize>,
}

impl Default for FakeStorage {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl FakeStorage {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            objects: Arc::new(HashMap::new()),
            chunk_size: chunk_size.max(1),
            requests: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_object(mut self, bucket: &str, object: &str, fake: FakeObject) -> Self {
        Arc::make_mut(&mut self.objects).insert((bucket.to_string(), object.to_string()), fake);
        self
    }

    /// Number of `GetObjectMedia` calls received so far, across clones.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn into_service(self) -> StorageServer<Self> {
        StorageServer::new(self)
    }
}

#[tonic::async_trait]
impl Storage for FakeStorage {
    type GetObjectMediaStream = ReceiverStream<Result<GetObjectMediaResponse, Status>>;

    async fn get_object_media(
        &self,
        request: Request<GetObjectMediaRequest>,
    ) -> Result<Response<Self::GetObjectMediaStream>, Status> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let request = request.into_inner();
        debug!("GetObjectMedia {}/{}", request.bucket, request.object);

        let fake = self
            .objects
            .get(&(request.bucket.clone(), request.object.clone()))
            .copied()
            .ok_or_else(|| {
                Status::not_found(format!(
                    "No such object: {}/{}",
                    request.bucket, request.object
                ))
            })?;
        let chunk_size = self.chunk_size as u64;

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        tokio::spawn(async move {
            let mut offset = 0u64;
            let mut sent = 0usize;
            while offset < fake.size {
                if fake.fail_after_chunks == Some(sent) {
                    let _ = tx
                        .send(Err(Status::unavailable(format!(
                            "Stream aborted after {} chunks",
                            sent
                        ))))
                        .await;
                    return;
                }
                let len = chunk_size.min(fake.size - offset);
                let response = GetObjectMediaResponse {
                    checksummed_data: Some(ChecksummedData {
                        content: vec![0u8; len as usize],
                    }),
                };
                if tx.send(Ok(response)).await.is_err() {
                    debug!("Client went away after {} chunks", sent);
                    return;
                }
                offset += len;
                sent += 1;
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

/// Serve `storage` on an already bound listener until the task is dropped.
pub async fn serve(listener: TcpListener, storage: FakeStorage) -> Result<(), tonic::transport::Error> {
    Server::builder()
        .add_service(storage.into_service())
        .serve_with_incoming(TcpListenerStream::new(listener))
        .await
}

/// Bind `addr`, start serving in the background and return the bound address.
pub async fn spawn(
    addr: &str,
    storage: FakeStorage,
) -> io::Result<(SocketAddr, JoinHandle<Result<(), tonic::transport::Error>>)> {
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    info!("Fake storage listening on {}", local_addr);
    let handle = tokio::spawn(serve(listener, storage));
    Ok((local_addr, handle))
}
