//! Line-buffered transport over an open device stream.
//!
//! [`LineTransport`] is the seam the relay talks to. [`SerialLink`] is the
//! production implementation; it works over any async byte stream, so the
//! same code drives a `tokio_serial::SerialStream` and an in-memory
//! `tokio::io::duplex` pipe.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::TransportError;

/// Line-oriented access to the controller.
#[async_trait]
pub trait LineTransport: Send + fmt::Debug {
    /// Writes `line` followed by a single `\n`, then flushes.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the write or flush fails or the
    /// handle is closed.
    async fn write_line(&mut self, line: &[u8]) -> Result<(), TransportError>;

    /// Returns `true` if input is ready to be read without waiting.
    ///
    /// Never blocks.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] once the device has hung up.
    fn bytes_available(&mut self) -> Result<bool, TransportError>;

    /// Reads the next line with trailing whitespace stripped.
    ///
    /// Bounded by the per-read timeout. A line still incomplete when the
    /// timeout fires is kept and completed by a later call; this call
    /// returns an empty string.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on I/O failure or end of stream.
    async fn read_line(&mut self) -> Result<String, TransportError>;

    /// Releases the handle. Safe to call more than once.
    async fn close(&mut self);

    /// Name of the port this transport was opened on.
    fn port_name(&self) -> &str;
}

/// [`LineTransport`] over a buffered async byte stream.
pub struct SerialLink<S> {
    reader: Option<BufReader<S>>,
    partial: Vec<u8>,
    read_timeout: Duration,
    port_name: String,
}

impl<S> SerialLink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wraps an open stream.
    #[must_use]
    pub fn new(stream: S, port_name: impl Into<String>, read_timeout: Duration) -> Self {
        Self {
            reader: Some(BufReader::new(stream)),
            partial: Vec::new(),
            read_timeout,
            port_name: port_name.into(),
        }
    }
}

impl<S> SerialLink<S> {
    /// Returns `true` until [`LineTransport::close`] is called.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.reader.is_some()
    }
}

impl<S> fmt::Debug for SerialLink<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialLink")
            .field("port_name", &self.port_name)
            .field("open", &self.is_open())
            .field("partial_len", &self.partial.len())
            .field("read_timeout", &self.read_timeout)
            .finish()
    }
}

#[async_trait]
impl<S> LineTransport for SerialLink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn write_line(&mut self, line: &[u8]) -> Result<(), TransportError> {
        let reader = self.reader.as_mut().ok_or(TransportError::NotOpen)?;

        let mut frame = Vec::with_capacity(line.len() + 1);
        frame.extend_from_slice(line);
        frame.push(b'\n');

        let stream = reader.get_mut();
        stream.write_all(&frame).await?;
        stream.flush().await?;
        Ok(())
    }

    fn bytes_available(&mut self) -> Result<bool, TransportError> {
        let reader = self.reader.as_mut().ok_or(TransportError::NotOpen)?;
        if !reader.buffer().is_empty() {
            return Ok(true);
        }
        match reader.fill_buf().now_or_never() {
            None => Ok(false),
            Some(Ok([])) => Err(TransportError::Closed),
            Some(Ok(_)) => Ok(true),
            Some(Err(err)) => Err(err.into()),
        }
    }

    async fn read_line(&mut self) -> Result<String, TransportError> {
        let Self {
            reader,
            partial,
            read_timeout,
            port_name,
        } = self;
        let reader = reader.as_mut().ok_or(TransportError::NotOpen)?;

        match tokio::time::timeout(*read_timeout, reader.read_until(b'\n', partial)).await {
            Err(_) => {
                tracing::debug!(
                    port = %port_name,
                    buffered = partial.len(),
                    "read timed out mid-line"
                );
                Ok(String::new())
            }
            Ok(Ok(0)) => Err(TransportError::Closed),
            Ok(Ok(_)) => {
                let line = String::from_utf8_lossy(partial).trim_end().to_string();
                partial.clear();
                Ok(line)
            }
            Ok(Err(err)) => Err(err.into()),
        }
    }

    async fn close(&mut self) {
        if let Some(mut reader) = self.reader.take() {
            if let Err(err) = reader.get_mut().shutdown().await {
                tracing::debug!(port = %self.port_name, error = %err, "error while closing port");
            }
            tracing::info!(port = %self.port_name, "serial port closed");
        }
        self.partial.clear();
    }

    fn port_name(&self) -> &str {
        &self.port_name
    }
}
