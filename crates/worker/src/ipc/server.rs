//! IPC server side: accepting hosts and serving their requests.
//!
//! Requests on one connection are handled strictly in order. The worker call
//! for a request runs on a blocking thread and its responses are all written
//! before the next request is read, so at most one bridge command is ever in
//! flight.

use std::io;
use std::path::Path;
use std::sync::Arc;

use protocol::messages::ErrorMessage;
use protocol::{Envelope, ErrorCode, FrameCodec, Message, ProtocolError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info, warn};

use crate::dispatch::Dispatcher;
use crate::worker::Worker;

/// Read buffer size for incoming frames.
const READ_CHUNK_SIZE: usize = 8192;

/// A server that listens for hosts on a Unix Domain Socket.
pub struct IpcServer {
    listener: UnixListener,
}

impl IpcServer {
    /// Bind the server to the specified socket path.
    ///
    /// This will create the socket file and any necessary parent directories.
    /// If a socket file already exists at the path, it will be removed first.
    pub async fn bind(path: &Path) -> Result<Self, io::Error> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        if path.exists() {
            std::fs::remove_file(path)?;
        }

        let listener = UnixListener::bind(path)?;

        Ok(Self { listener })
    }

    /// Accept a new incoming connection.
    pub async fn accept(&self) -> Result<IpcConnection, io::Error> {
        let (stream, _addr) = self.listener.accept().await?;
        Ok(IpcConnection::new(stream))
    }

    /// Serve hosts one connection at a time until accepting fails.
    ///
    /// A connection that errors is logged and dropped; the server then goes
    /// back to accepting.
    pub async fn serve<W: Worker + 'static>(
        &self,
        dispatcher: Arc<Dispatcher<W>>,
    ) -> Result<(), IpcError> {
        loop {
            let conn = self.accept().await?;
            info!("host connected");
            match serve_connection(conn, Arc::clone(&dispatcher)).await {
                Ok(()) => info!("host disconnected"),
                Err(e) => warn!(error = %e, "host connection failed"),
            }
        }
    }
}

/// Handle every request on `conn` until the peer disconnects.
pub async fn serve_connection<W: Worker + 'static>(
    mut conn: IpcConnection,
    dispatcher: Arc<Dispatcher<W>>,
) -> Result<(), IpcError> {
    while let Some(request) = conn.read_envelope().await? {
        let request_id = request.request_id;
        let worker = Arc::clone(&dispatcher);

        let responses = match tokio::task::spawn_blocking(move || worker.dispatch(request)).await {
            Ok(responses) => responses,
            Err(e) => {
                error!(request_id, error = %e, "worker task failed");
                vec![Envelope::new(
                    request_id,
                    Message::Error(ErrorMessage {
                        code: ErrorCode::Internal,
                        message: format!("worker task failed: {}", e),
                    }),
                )]
            }
        };

        for response in &responses {
            conn.write_envelope(response).await?;
        }
        debug!(request_id, responses = responses.len(), "request answered");
    }
    Ok(())
}

/// A framed connection carrying [`Envelope`]s in either direction.
pub struct IpcConnection {
    stream: UnixStream,
    codec: FrameCodec,
    buffer: Vec<u8>,
}

impl IpcConnection {
    /// Wrap a connected Unix stream.
    pub fn new(stream: UnixStream) -> Self {
        Self {
            stream,
            codec: FrameCodec::new(),
            buffer: Vec::with_capacity(READ_CHUNK_SIZE),
        }
    }

    /// Read the next envelope from the peer.
    ///
    /// Returns `None` if the peer disconnected between frames.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream fails, the peer disconnects inside a
    /// frame, or the frame does not decode.
    pub async fn read_envelope(&mut self) -> Result<Option<Envelope>, IpcError> {
        loop {
            if let Some((frame, consumed)) = self.codec.try_decode(&self.buffer)? {
                self.buffer.drain(..consumed);
                let envelope = Envelope::from_msgpack(&frame.payload).map_err(ProtocolError::from)?;
                return Ok(Some(envelope));
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = self.stream.read(&mut chunk).await?;
            if read == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(ProtocolError::ConnectionClosed(format!(
                    "peer closed with {} bytes of a partial frame buffered",
                    self.buffer.len()
                ))
                .into());
            }
            self.buffer.extend_from_slice(&chunk[..read]);
        }
    }

    /// Send an envelope to the peer.
    pub async fn write_envelope(&mut self, envelope: &Envelope) -> Result<(), IpcError> {
        let payload = envelope.to_msgpack().map_err(ProtocolError::from)?;
        let frame = self.codec.encode(&payload)?;

        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;

        Ok(())
    }
}

/// Errors that can occur during IPC communication.
#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A frame or message could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The peer answered out of turn.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adb::{AdbBridge, CommandOutput, ScriptedRunner};
    use crate::worker::AdbWorker;
    use protocol::messages::{Finished, Ping, Pong, UrlRequest};
    use protocol::FRAME_MAGIC;
    use tempfile::tempdir;

    fn dispatcher() -> Arc<Dispatcher<AdbWorker<ScriptedRunner>>> {
        let runner = ScriptedRunner::new().on(
            &["devices", "-l"],
            CommandOutput::success("ABC123 device product:Pixel model:Pixel_5 device:redfin\n"),
        );
        Arc::new(Dispatcher::new(AdbWorker::new(AdbBridge::new("adb", runner))))
    }

    #[tokio::test]
    async fn test_server_bind_creates_parent_dirs() {
        let temp_dir = tempdir().unwrap();
        let socket_path = temp_dir.path().join("nested").join("dir").join("test.sock");

        let server = IpcServer::bind(&socket_path).await.unwrap();
        assert!(socket_path.exists());
        drop(server);
    }

    #[tokio::test]
    async fn test_server_bind_removes_existing_socket() {
        let temp_dir = tempdir().unwrap();
        let socket_path = temp_dir.path().join("test.sock");

        let _server1 = IpcServer::bind(&socket_path).await.unwrap();
        drop(_server1);

        let _server2 = IpcServer::bind(&socket_path).await.unwrap();
        assert!(socket_path.exists());
    }

    #[tokio::test]
    async fn test_envelopes_cross_the_socket() {
        let (a, b) = UnixStream::pair().unwrap();
        let mut left = IpcConnection::new(a);
        let mut right = IpcConnection::new(b);

        let sent = Envelope::new(3, Message::Ping(Ping { timestamp: 5 }));
        left.write_envelope(&sent).await.unwrap();

        assert_eq!(right.read_envelope().await.unwrap(), Some(sent));
    }

    #[tokio::test]
    async fn test_large_envelope_is_compressed_and_restored() {
        let (a, b) = UnixStream::pair().unwrap();
        let mut left = IpcConnection::new(a);
        let mut right = IpcConnection::new(b);

        let url = format!("adb://ABC123/{}", "x".repeat(64 * 1024));
        let sent = Envelope::new(1, Message::ListDir(UrlRequest::new(url)));

        let writer = tokio::spawn(async move {
            left.write_envelope(&sent).await.unwrap();
            sent
        });
        let received = right.read_envelope().await.unwrap();

        assert_eq!(received, Some(writer.await.unwrap()));
    }

    #[tokio::test]
    async fn test_read_returns_none_on_disconnect() {
        let (a, b) = UnixStream::pair().unwrap();
        drop(a);

        let mut conn = IpcConnection::new(b);
        assert!(conn.read_envelope().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_partial_frame_then_disconnect_is_error() {
        let (mut a, b) = UnixStream::pair().unwrap();
        a.write_all(&FRAME_MAGIC).await.unwrap();
        drop(a);

        let mut conn = IpcConnection::new(b);
        let err = conn.read_envelope().await.unwrap_err();
        assert!(matches!(
            err,
            IpcError::Protocol(ProtocolError::ConnectionClosed(_))
        ));
    }

    #[tokio::test]
    async fn test_bad_magic_is_error() {
        let (mut a, b) = UnixStream::pair().unwrap();
        a.write_all(b"HTTP/1.1 200 OK\r\n").await.unwrap();

        let mut conn = IpcConnection::new(b);
        let err = conn.read_envelope().await.unwrap_err();
        assert!(matches!(
            err,
            IpcError::Protocol(ProtocolError::InvalidFrameMagic { .. })
        ));
    }

    #[tokio::test]
    async fn test_serve_connection_answers_in_order() {
        let (host, worker_side) = UnixStream::pair().unwrap();
        let serving = tokio::spawn(serve_connection(IpcConnection::new(worker_side), dispatcher()));

        let mut host = IpcConnection::new(host);
        host.write_envelope(&Envelope::new(1, Message::Ping(Ping { timestamp: 11 })))
            .await
            .unwrap();
        host.write_envelope(&Envelope::new(2, Message::ListDir(UrlRequest::new("adb:/"))))
            .await
            .unwrap();

        let mut received = Vec::new();
        for _ in 0..4 {
            received.push(host.read_envelope().await.unwrap().unwrap());
        }
        drop(host);

        assert_eq!(received[0].request_id, 1);
        assert_eq!(received[0].payload, Message::Pong(Pong { timestamp: 11 }));
        assert_eq!(received[1].payload, Message::Finished(Finished {}));
        assert_eq!(received[2].request_id, 2);
        match &received[2].payload {
            Message::ListEntries(list) => assert_eq!(list.entries[0].name, "ABC123"),
            other => panic!("expected entries, got {:?}", other),
        }
        assert_eq!(received[3].payload, Message::Finished(Finished {}));

        serving.await.unwrap().unwrap();
    }
}
