//! IPC client for talking to a running worker.
//!
//! The client plays the host's part of the channel: it sends one request and
//! collects responses until the terminal `Finished` or `Error`.

use std::io;
use std::path::Path;
use std::time::Duration;

use protocol::messages::{
    Capabilities, CapabilitiesQuery, ErrorMessage, FreeSpace, Ping, UrlRequest,
};
use protocol::{Entry, Envelope, Message};
use tokio::net::UnixStream;

use super::server::{IpcConnection, IpcError};

/// Default timeout for client operations in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Collected responses to one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// Non-terminal responses in arrival order.
    pub messages: Vec<Message>,
    /// `None` when the request finished, the error otherwise.
    pub error: Option<ErrorMessage>,
}

impl Reply {
    /// All entries from every `ListEntries` batch.
    pub fn entries(&self) -> Vec<Entry> {
        self.messages
            .iter()
            .filter_map(|m| match m {
                Message::ListEntries(list) => Some(list.entries.iter().cloned()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Target of a `Redirection`, if one was sent.
    pub fn redirection(&self) -> Option<&str> {
        self.messages.iter().find_map(|m| match m {
            Message::Redirection(r) => Some(r.url.as_str()),
            _ => None,
        })
    }
}

/// A host-side client for a worker listening on a Unix socket.
pub struct WorkerClient {
    conn: IpcConnection,
    timeout: Duration,
    next_request_id: u64,
}

impl WorkerClient {
    /// Connect to the worker at the specified socket path.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    /// This typically indicates that no worker is serving the socket.
    pub async fn connect(path: &Path) -> Result<Self, IpcError> {
        let stream = UnixStream::connect(path).await?;
        Ok(Self::from_stream(stream, Duration::from_secs(DEFAULT_TIMEOUT_SECS)))
    }

    /// Connect to the worker with a custom timeout.
    pub async fn connect_with_timeout(path: &Path, timeout: Duration) -> Result<Self, IpcError> {
        let stream = tokio::time::timeout(timeout, UnixStream::connect(path))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connection timed out"))??;
        Ok(Self::from_stream(stream, timeout))
    }

    fn from_stream(stream: UnixStream, timeout: Duration) -> Self {
        Self {
            conn: IpcConnection::new(stream),
            timeout,
            next_request_id: 1,
        }
    }

    /// Send a request and wait for its terminal response.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be sent, the connection closes
    /// before the terminal response, a response carries another request's id,
    /// or the operation times out.
    pub async fn request(&mut self, message: Message) -> Result<Reply, IpcError> {
        tokio::time::timeout(self.timeout, self.request_internal(message))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "operation timed out"))?
    }

    async fn request_internal(&mut self, message: Message) -> Result<Reply, IpcError> {
        let request_id = self.next_request_id;
        self.next_request_id += 1;

        self.conn
            .write_envelope(&Envelope::new(request_id, message))
            .await?;

        let mut messages = Vec::new();
        loop {
            let response = self.conn.read_envelope().await?.ok_or_else(|| {
                io::Error::new(io::ErrorKind::UnexpectedEof, "worker closed connection")
            })?;

            if response.request_id != request_id {
                return Err(IpcError::UnexpectedResponse(format!(
                    "{} for request {} while waiting on {}",
                    response.payload.name(),
                    response.request_id,
                    request_id
                )));
            }

            match response.payload {
                Message::Error(err) => {
                    return Ok(Reply {
                        messages,
                        error: Some(err),
                    })
                }
                message if message.is_terminal() => return Ok(Reply { messages, error: None }),
                other => messages.push(other),
            }
        }
    }

    /// List a url.
    pub async fn list_dir(&mut self, url: &str) -> Result<Reply, IpcError> {
        self.request(Message::ListDir(UrlRequest::new(url))).await
    }

    /// Ask for free space; `Ok(Err(_))` carries the worker's error.
    pub async fn free_space(
        &mut self,
        url: &str,
    ) -> Result<Result<FreeSpace, ErrorMessage>, IpcError> {
        let reply = self
            .request(Message::FileSystemFreeSpace(UrlRequest::new(url)))
            .await?;
        if let Some(err) = reply.error {
            return Ok(Err(err));
        }
        reply
            .messages
            .into_iter()
            .find_map(|m| match m {
                Message::FreeSpace(space) => Some(Ok(space)),
                _ => None,
            })
            .ok_or_else(|| IpcError::UnexpectedResponse("finished without free space".into()))
    }

    /// Query the worker's capabilities.
    pub async fn capabilities(&mut self) -> Result<Capabilities, IpcError> {
        let reply = self
            .request(Message::QueryCapabilities(CapabilitiesQuery {}))
            .await?;
        reply
            .messages
            .into_iter()
            .find_map(|m| match m {
                Message::Capabilities(caps) => Some(caps),
                _ => None,
            })
            .ok_or_else(|| IpcError::UnexpectedResponse("finished without capabilities".into()))
    }

    /// Check that the worker is responsive.
    pub async fn ping(&mut self) -> Result<bool, IpcError> {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let reply = self.request(Message::Ping(Ping { timestamp })).await?;
        Ok(reply
            .messages
            .iter()
            .any(|m| matches!(m, Message::Pong(p) if p.timestamp == timestamp)))
    }
}
