//! WebSocket connector.
//!
//! Each JSON-RPC message travels as one text frame.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace};
use url::Url;

use crate::client::ClientConfig;
use crate::error::{Error, Result};

use super::connection::{FrameSink, FrameStream, LinkConnection};
use super::{Connector, Established};

// ============================================================================
// Types
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// WebSocketConnector
// ============================================================================

/// Opens WebSocket connections to one endpoint.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    /// Endpoint URL, `ws://host:port{path}`.
    url: Url,
    /// Per-call timeout for links it creates.
    call_timeout: Duration,
}

impl WebSocketConnector {
    /// Creates a connector for the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL cannot be formed.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        Ok(Self {
            url: config.endpoint_url("ws")?,
            call_timeout: config.call_timeout,
        })
    }

    /// Returns the endpoint URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> Result<Established> {
        let (ws_stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| Error::connection(format!("WebSocket connect failed: {e}")))?;

        debug!(url = %self.url, "WebSocket connected");

        let (write, read) = ws_stream.split();

        Ok(LinkConnection::spawn(
            Box::new(TextSink(write)),
            Box::new(TextStream(read)),
            self.call_timeout,
        ))
    }
}

// ============================================================================
// Text Framing
// ============================================================================

struct TextSink(SplitSink<WsStream, Message>);

struct TextStream(SplitStream<WsStream>);

#[async_trait]
impl FrameSink for TextSink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.0.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn close(&mut self) {
        let _ = self.0.close().await;
    }
}

#[async_trait]
impl FrameStream for TextStream {
    async fn next_text(&mut self) -> Option<Result<String>> {
        loop {
            match self.0.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "WebSocket closed by remote");
                    return None;
                }
                Ok(other) => trace!(?other, "Ignoring non-text frame"),
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
