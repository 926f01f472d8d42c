//! Raw TCP socket connector.
//!
//! Messages are newline-delimited JSON-RPC 2.0 objects.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::debug;

use crate::client::ClientConfig;
use crate::error::Result;

use super::connection::{FrameSink, FrameStream, LinkConnection};
use super::{Connector, Established};

// ============================================================================
// Constants
// ============================================================================

/// Longest accepted line (16 MiB).
const MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

// ============================================================================
// SocketConnector
// ============================================================================

/// Opens line-framed TCP connections to one endpoint.
#[derive(Debug, Clone)]
pub struct SocketConnector {
    /// Target host.
    host: String,
    /// Target port.
    port: u16,
    /// Per-call timeout for links it creates.
    call_timeout: Duration,
}

impl SocketConnector {
    /// Creates a connector for the configured endpoint.
    #[must_use]
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            call_timeout: config.call_timeout,
        }
    }
}

#[async_trait]
impl Connector for SocketConnector {
    async fn connect(&self) -> Result<Established> {
        let stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        stream.set_nodelay(true)?;

        debug!(host = %self.host, port = self.port, "Socket connected");

        let (read_half, write_half) = stream.into_split();
        let reader = FramedRead::new(
            read_half,
            LinesCodec::new_with_max_length(MAX_LINE_LENGTH),
        );
        let writer = FramedWrite::new(
            write_half,
            LinesCodec::new_with_max_length(MAX_LINE_LENGTH),
        );

        Ok(LinkConnection::spawn(
            Box::new(LineSink(writer)),
            Box::new(LineStream(reader)),
            self.call_timeout,
        ))
    }
}

// ============================================================================
// Line Framing
// ============================================================================

struct LineSink(FramedWrite<OwnedWriteHalf, LinesCodec>);

struct LineStream(FramedRead<OwnedReadHalf, LinesCodec>);

#[async_trait]
impl FrameSink for LineSink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.0.send(text).await?;
        Ok(())
    }

    async fn close(&mut self) {
        let _ = SinkExt::<String>::close(&mut self.0).await;
    }
}

#[async_trait]
impl FrameStream for LineStream {
    async fn next_text(&mut self) -> Option<Result<String>> {
        loop {
            match self.0.next().await? {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => return Some(Ok(line)),
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
