//! stdio transport.
//!
//! - Messages are UTF-8 encoded JSON-RPC
//! - Messages are delimited by newlines
//! - Messages must not contain embedded newlines
//! - stdin: receives messages from client
//! - stdout: sends messages to client
//! - stderr: may be used for logging (not MCP messages)
//!
//! The whole process is one session and frames are handled strictly in
//! arrival order.

use std::io;

use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin,
    Stdout,
};

use crate::mcp::engine::ProtocolEngine;
use crate::mcp::protocol::{ErrorCode, JsonRpcError, JsonRpcReply};
use crate::mcp::session::Session;

/// Maximum bytes per frame, excluding the newline (1 MiB).
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// One frame read from the input stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete line, newline stripped.
    Message(String),
    /// A line longer than [`MAX_FRAME_BYTES`]; its content was discarded.
    Oversized(usize),
    /// A line that is not valid UTF-8.
    NotUtf8,
}

/// Newline-delimited JSON transport over any async reader/writer pair.
///
/// Defaults to stdin/stdout.
pub struct StdioTransport<R = BufReader<Stdin>, W = Stdout> {
    reader: R,
    writer: W,
    buf: Vec<u8>,
}

impl StdioTransport {
    /// Creates a transport over the process's stdin and stdout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_io(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl<R, W> StdioTransport<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a transport over arbitrary streams.
    pub const fn with_io(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            buf: Vec::new(),
        }
    }

    /// Reads the next frame.
    ///
    /// Returns `None` at EOF. Oversized lines are skipped up to their
    /// newline without being buffered in full.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails.
    pub async fn read_frame(&mut self) -> io::Result<Option<Frame>> {
        self.buf.clear();
        let limit = u64::try_from(MAX_FRAME_BYTES + 1).unwrap_or(u64::MAX);
        let bytes_read = (&mut self.reader)
            .take(limit)
            .read_until(b'\n', &mut self.buf)
            .await?;

        if bytes_read == 0 {
            // EOF - input closed
            return Ok(None);
        }

        let terminated = self.buf.last() == Some(&b'\n');
        if !terminated && self.buf.len() > MAX_FRAME_BYTES {
            let skipped = self.discard_line().await?;
            return Ok(Some(Frame::Oversized(self.buf.len() + skipped)));
        }

        // Remove the trailing newline
        if terminated {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        }

        Ok(Some(match std::str::from_utf8(&self.buf) {
            Ok(line) => Frame::Message(line.to_string()),
            Err(_) => Frame::NotUtf8,
        }))
    }

    /// Consumes input up to and including the next newline.
    async fn discard_line(&mut self) -> io::Result<usize> {
        let mut skipped = 0;
        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(skipped);
            }
            let (consumed, done) = match available.iter().position(|&b| b == b'\n') {
                Some(pos) => (pos + 1, true),
                None => (available.len(), false),
            };
            self.reader.consume(consumed);
            skipped += consumed;
            if done {
                return Ok(skipped);
            }
        }
    }

    /// Writes a reply frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or writing fails.
    pub async fn write_reply(&mut self, reply: &JsonRpcReply) -> io::Result<()> {
        let json = serde_json::to_string(reply)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        self.write_raw(&json).await
    }

    /// Writes a raw JSON string with newline termination.
    async fn write_raw(&mut self, json: &str) -> io::Result<()> {
        // Messages must not contain embedded newlines
        debug_assert!(
            !json.contains('\n'),
            "JSON message must not contain embedded newlines"
        );

        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;

        Ok(())
    }
}

/// Serves one session over a [`StdioTransport`].
pub struct StdioServer<R = BufReader<Stdin>, W = Stdout> {
    engine: ProtocolEngine,
    session: Session,
    transport: StdioTransport<R, W>,
}

impl StdioServer {
    /// Creates a server on the process's stdin and stdout.
    #[must_use]
    pub fn new(engine: ProtocolEngine) -> Self {
        Self::with_transport(engine, StdioTransport::new())
    }
}

impl<R, W> StdioServer<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a server on an arbitrary transport.
    pub fn with_transport(engine: ProtocolEngine, transport: StdioTransport<R, W>) -> Self {
        Self {
            engine,
            session: Session::new("stdio"),
            transport,
        }
    }

    /// The process-wide session.
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Runs the main loop until EOF, SIGINT or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    #[cfg(unix)]
    pub async fn run(&mut self) -> io::Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt()).map_err(io::Error::other)?;
        let mut sigterm = signal(SignalKind::terminate()).map_err(io::Error::other)?;

        loop {
            tokio::select! {
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT, initiating graceful shutdown");
                    return Ok(());
                }

                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, initiating graceful shutdown");
                    return Ok(());
                }

                frame = self.transport.read_frame() => {
                    if self.handle_read(frame).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Runs the main loop until EOF or Ctrl+C.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    #[cfg(windows)]
    pub async fn run(&mut self) -> io::Result<()> {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    tracing::info!("Received Ctrl+C, initiating graceful shutdown");
                    return Ok(());
                }

                frame = self.transport.read_frame() => {
                    if self.handle_read(frame).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Runs until the input reaches EOF, without signal handling.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn run_until_eof(&mut self) -> io::Result<()> {
        loop {
            let frame = self.transport.read_frame().await;
            if self.handle_read(frame).await? {
                return Ok(());
            }
        }
    }

    /// Handles the result of one read. Returns `true` at EOF.
    async fn handle_read(&mut self, frame: io::Result<Option<Frame>>) -> io::Result<bool> {
        let Some(frame) = frame? else {
            tracing::info!("Input closed, shutting down");
            return Ok(true);
        };

        let reply = match frame {
            Frame::Message(line) if line.trim().is_empty() => return Ok(false),
            Frame::Message(line) => self.engine.handle_text(&self.session, &line).await,
            Frame::Oversized(len) => {
                tracing::warn!(bytes = len, limit = MAX_FRAME_BYTES, "Frame too large");
                Some(
                    JsonRpcError::with_message(
                        None,
                        ErrorCode::ParseError,
                        format!("Message too large: {len} bytes (limit {MAX_FRAME_BYTES})"),
                    )
                    .into(),
                )
            }
            Frame::NotUtf8 => Some(JsonRpcError::parse_error().into()),
        };

        if let Some(reply) = reply {
            self.transport.write_reply(&reply).await?;
        }
        Ok(false)
    }
}
