use crate::config::ReaderOptions;
use crate::connection::Connection;
use crate::error::{HeosError, Result};
use crate::protocol::{decode_frame, Command, CommandResult, HeosResult, FRAME_DELIMITER};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::Instrument;

/// Messages the device sends while it is still working on an earlier command
const DELAY_MESSAGES: [&str; 2] = ["command under process", "processing previous command"];

fn is_delayed(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    DELAY_MESSAGES.iter().any(|m| message.contains(m))
}

/// Pulls decoded frames off a connection, discarding noise.
///
/// Duplicates (when enabled), non-JSON lines and "still processing" notices
/// are skipped. The timeout budget restarts on every processing notice.
/// When reading a response, frames for any other command are skipped too.
pub(crate) struct FrameReader {
    connection: Arc<Connection>,
    options: ReaderOptions,
    last_frame: Option<Vec<u8>>,
}

impl FrameReader {
    pub(crate) fn new(connection: Arc<Connection>, options: ReaderOptions) -> Self {
        Self {
            connection,
            options,
            last_frame: None,
        }
    }

    /// Read the next acceptable frame
    pub(crate) async fn next_frame(&mut self) -> Result<HeosResult> {
        self.read(None).await
    }

    /// Read the response to `command`, skipping frames for anything else
    pub(crate) async fn next_response(&mut self, command: &str) -> Result<HeosResult> {
        self.read(Some(command)).await
    }

    async fn read(&mut self, expected: Option<&str>) -> Result<HeosResult> {
        let mut deadline = Instant::now() + self.options.message_timeout;

        loop {
            let frame = self
                .connection
                .read_until(FRAME_DELIMITER, self.options.read_timeout)
                .await?;

            let Some(frame) = frame else {
                if Instant::now() >= deadline {
                    return Err(HeosError::Timeout);
                }
                continue;
            };

            let frame = frame.trim_ascii();
            if frame.is_empty() {
                continue;
            }
            tracing::trace!("Received: {}", String::from_utf8_lossy(frame));

            if self.options.deduplicate && self.last_frame.as_deref() == Some(frame) {
                tracing::debug!("Dropping duplicate frame");
                if Instant::now() >= deadline {
                    return Err(HeosError::Timeout);
                }
                continue;
            }
            self.last_frame = Some(frame.to_vec());

            let result = match decode_frame(frame) {
                Ok(result) => result,
                Err(e) => {
                    tracing::debug!("Discarding frame: {}", e);
                    if Instant::now() >= deadline {
                        return Err(HeosError::Timeout);
                    }
                    continue;
                }
            };

            if is_delayed(&result.header.message) {
                tracing::debug!("Delayed - {} still processing", result.header.command);
                deadline = Instant::now() + self.options.message_timeout;
                continue;
            }

            if let Some(expected) = expected {
                if result.header.command != expected {
                    tracing::debug!(
                        "Skipping {} frame while waiting for {}",
                        result.header.command,
                        expected
                    );
                    if Instant::now() >= deadline {
                        return Err(HeosError::Timeout);
                    }
                    continue;
                }
            }

            return Ok(result);
        }
    }
}

/// Sends commands and reads their responses over one connection.
///
/// The protocol has no request ids: the next frame naming the command is
/// taken as its response. A mutex held from write until the response is
/// accepted keeps concurrent callers from stealing each other's responses.
/// A response left on the wire by a dropped call, or an event pushed on the
/// same connection, is skipped by the next call.
pub struct CommandChannel {
    connection: Arc<Connection>,
    reader: Mutex<FrameReader>,
    span: tracing::Span,
}

impl CommandChannel {
    /// Wrap a connection. The connection may be connected later.
    pub fn new(connection: Arc<Connection>, options: ReaderOptions, span: tracing::Span) -> Self {
        Self {
            reader: Mutex::new(FrameReader::new(connection.clone(), options)),
            connection,
            span,
        }
    }

    /// The underlying connection
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Send `command` and wait for its response.
    ///
    /// A `fail` response becomes [`HeosError::CommandFailed`]; a response with
    /// no `result` at all becomes [`HeosError::InvalidResponse`].
    pub async fn call(&self, command: Command) -> Result<HeosResult> {
        let span = tracing::debug_span!(parent: &self.span, "call", command = %command.name());
        async {
            let mut reader = self.reader.lock().await;

            tracing::debug!("Sending command: {}", command);
            self.connection.write(command.encode().as_bytes()).await?;

            let result = reader.next_response(&command.name()).await?;

            match result.header.result {
                CommandResult::Success => Ok(result),
                CommandResult::Fail => Err(HeosError::command_failed(result)),
                CommandResult::Absent => Err(HeosError::InvalidResponse(format!(
                    "{} response carries no result",
                    result.header.command
                ))),
            }
        }
        .instrument(span)
        .await
    }
}
