//! Request dispatch between the host channel and a [`Worker`].
//!
//! Every request envelope turns into a short sequence of response envelopes
//! carrying the same request id: zero or more data messages, then exactly
//! one `Finished` or `Error`.

use protocol::messages::{ErrorMessage, Finished, ListEntries, Pong, Redirection, UrlRequest};
use protocol::{Envelope, ErrorCode, Message, ProtocolError, PROTOCOL_VERSION};
use tracing::{debug, warn};
use url::Url;

use crate::worker::{Listing, Worker, WorkerError};

/// Entries per `ListEntries` message unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 200;

/// Errors that end a request.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The worker failed the operation.
    #[error(transparent)]
    Worker(#[from] WorkerError),

    /// The envelope could not be decoded into a request.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The envelope could not be acted on.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl DispatchError {
    /// Convert the error to a protocol ErrorMessage.
    pub fn to_error_message(&self) -> ErrorMessage {
        match self {
            DispatchError::Worker(e) => e.to_error_message(),
            DispatchError::Protocol(_) | DispatchError::InvalidRequest(_) => ErrorMessage {
                code: ErrorCode::InvalidRequest,
                message: self.to_string(),
            },
        }
    }
}

type DispatchResult = Result<Vec<Message>, DispatchError>;

/// Turns request envelopes into response envelopes by calling a [`Worker`].
pub struct Dispatcher<W> {
    worker: W,
    batch_size: usize,
}

impl<W: Worker> Dispatcher<W> {
    pub fn new(worker: W) -> Self {
        Self {
            worker,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Split listings into messages of at most `batch_size` entries.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn worker(&self) -> &W {
        &self.worker
    }

    /// Handle one request and produce all of its responses.
    ///
    /// Blocks for as long as the worker operation takes.
    pub fn dispatch(&self, envelope: Envelope) -> Vec<Envelope> {
        let request_id = envelope.request_id;
        let request = envelope.payload.name();

        let result = if envelope.version != PROTOCOL_VERSION {
            Err(ProtocolError::UnsupportedVersion {
                expected: PROTOCOL_VERSION,
                got: envelope.version,
            }
            .into())
        } else {
            debug!(request_id, request, "dispatching request");
            self.route(envelope.payload)
        };

        let messages = match result {
            Ok(mut messages) => {
                messages.push(Message::Finished(Finished {}));
                messages
            }
            Err(e) => {
                warn!(request_id, request, error = %e, "request failed");
                vec![Message::Error(e.to_error_message())]
            }
        };

        messages
            .into_iter()
            .map(|message| Envelope::new(request_id, message))
            .collect()
    }

    fn route(&self, message: Message) -> DispatchResult {
        if !message.is_request() {
            return Err(DispatchError::InvalidRequest(format!(
                "{} is a response, not a request",
                message.name()
            )));
        }

        match message {
            Message::ListDir(req) => self.handle_list_dir(req),
            Message::FileSystemFreeSpace(req) => {
                let space = self.worker.file_system_free_space(&parse_url(&req.url)?)?;
                Ok(vec![Message::FreeSpace(space)])
            }
            Message::QueryCapabilities(_) => {
                Ok(vec![Message::Capabilities(self.worker.capabilities())])
            }
            Message::Ping(ping) => Ok(vec![Message::Pong(Pong {
                timestamp: ping.timestamp,
            })]),

            Message::Stat(req) => done(self.worker.stat(&parse_url(&req.url)?)),
            Message::Get(req) => done(self.worker.get(&parse_url(&req.url)?)),
            Message::Put(req) => done(self.worker.put(
                &parse_url(&req.url)?,
                req.permissions,
                req.flags,
            )),
            Message::Copy(req) => done(self.worker.copy(
                &parse_url(&req.source)?,
                &parse_url(&req.dest)?,
                req.permissions,
                req.flags,
            )),
            Message::Rename(req) => done(self.worker.rename(
                &parse_url(&req.source)?,
                &parse_url(&req.dest)?,
                req.flags,
            )),
            Message::Symlink(req) => {
                done(self.worker.symlink(&req.target, &parse_url(&req.dest)?, req.flags))
            }
            Message::Chmod(req) => done(self.worker.chmod(&parse_url(&req.url)?, req.permissions)),
            Message::Chown(req) => {
                done(self.worker.chown(&parse_url(&req.url)?, &req.owner, &req.group))
            }
            Message::SetModificationTime(req) => {
                done(self.worker.set_modification_time(&parse_url(&req.url)?, req.mtime))
            }
            Message::Delete(req) => done(self.worker.delete(&parse_url(&req.url)?, req.is_file)),
            Message::Mkdir(req) => done(self.worker.mkdir(&parse_url(&req.url)?, req.permissions)),

            other => Err(DispatchError::InvalidRequest(format!("no handler for {}", other.name()))),
        }
    }

    fn handle_list_dir(&self, req: UrlRequest) -> DispatchResult {
        match self.worker.list_dir(&parse_url(&req.url)?)? {
            Listing::Redirect(url) => Ok(vec![Message::Redirection(Redirection {
                url: url.to_string(),
            })]),
            Listing::Entries(entries) => Ok(entries
                .chunks(self.batch_size)
                .map(|batch| {
                    Message::ListEntries(ListEntries {
                        entries: batch.to_vec(),
                    })
                })
                .collect()),
        }
    }
}

fn parse_url(raw: &str) -> Result<Url, WorkerError> {
    Url::parse(raw).map_err(|e| WorkerError::MalformedUrl(format!("{}: {}", raw, e)))
}

fn done(result: Result<(), WorkerError>) -> DispatchResult {
    result.map(|()| Vec::new()).map_err(DispatchError::from)
}
