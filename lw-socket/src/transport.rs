//! WebSocket transport.
//!
//! The driver talks to sockets only through [`Connector`], [`WsWriter`] and
//! [`WsReader`]. [`TungsteniteConnector`] is the production implementation;
//! [`crate::testing::MockConnector`] is the in-memory one.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tracing::debug;

use lw_core::error::{LwError, LwResult};

use crate::events::CloseInfo;

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// A received data or close frame. Ping/pong is handled by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
    /// Close frame with status code and reason.
    Close(CloseInfo),
}

/// Write half of a connection.
#[async_trait]
pub trait WsWriter: Send {
    /// Send a text frame.
    async fn send_text(&mut self, text: &str) -> LwResult<()>;

    /// Send a close frame with the given code and reason.
    async fn close(&mut self, code: u16, reason: &str) -> LwResult<()>;
}

/// Read half of a connection.
#[async_trait]
pub trait WsReader: Send {
    /// Receive the next frame, returning `None` when the stream ends.
    ///
    /// Must be cancel-safe: it is polled inside `tokio::select!`.
    async fn recv(&mut self) -> Option<LwResult<Frame>>;
}

/// Split halves of an established connection.
pub type WsPair = (Box<dyn WsWriter>, Box<dyn WsReader>);

/// Opens connections. One call is one network connection attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Perform the handshake against `url`, offering `protocols`.
    async fn connect(&self, url: &str, protocols: &[String]) -> LwResult<WsPair>;
}

/// Production connector backed by `tokio-tungstenite`.
#[derive(Debug, Default, Clone)]
pub struct TungsteniteConnector;

impl TungsteniteConnector {
    /// Create a new connector.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &str, protocols: &[String]) -> LwResult<WsPair> {
        use tungstenite::client::IntoClientRequest;

        let mut request = url
            .into_client_request()
            .map_err(|e| LwError::Socket(format!("invalid WebSocket URL {url}: {e}")))?;

        if !protocols.is_empty() {
            let value = tungstenite::http::HeaderValue::from_str(&protocols.join(", "))
                .map_err(|e| LwError::Socket(format!("invalid protocol list: {e}")))?;
            request.headers_mut().insert("Sec-WebSocket-Protocol", value);
        }

        let (ws_stream, response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| LwError::Socket(format!("WebSocket connect failed: {e}")))?;
        debug!("handshake with {url} complete (status {})", response.status());

        let (sink, stream) = ws_stream.split();
        Ok((
            Box::new(TungsteniteWriter { sink }),
            Box::new(TungsteniteReader { stream }),
        ))
    }
}

struct TungsteniteWriter {
    sink: SplitSink<WsStream, tungstenite::Message>,
}

#[async_trait]
impl WsWriter for TungsteniteWriter {
    async fn send_text(&mut self, text: &str) -> LwResult<()> {
        self.sink
            .send(tungstenite::Message::Text(text.to_string()))
            .await
            .map_err(|e| LwError::Socket(format!("WebSocket send failed: {e}")))
    }

    async fn close(&mut self, code: u16, reason: &str) -> LwResult<()> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_string().into(),
        };
        self.sink
            .send(tungstenite::Message::Close(Some(frame)))
            .await
            .map_err(|e| LwError::Socket(format!("WebSocket close failed: {e}")))?;
        let _ = self.sink.close().await;
        Ok(())
    }
}

struct TungsteniteReader {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl WsReader for TungsteniteReader {
    async fn recv(&mut self) -> Option<LwResult<Frame>> {
        loop {
            match self.stream.next().await {
                Some(Ok(tungstenite::Message::Text(text))) => {
                    return Some(Ok(Frame::Text(text.to_string())));
                }
                Some(Ok(tungstenite::Message::Binary(data))) => {
                    return Some(Ok(Frame::Binary(data.to_vec())));
                }
                Some(Ok(tungstenite::Message::Close(close_frame))) => {
                    let info = close_frame
                        .map(|cf| CloseInfo { code: cf.code.into(), reason: cf.reason.to_string() })
                        .unwrap_or_else(|| CloseInfo { code: 1005, reason: String::new() });
                    return Some(Ok(Frame::Close(info)));
                }
                // Pongs are queued by tungstenite itself
                Some(Ok(tungstenite::Message::Ping(_) | tungstenite::Message::Pong(_))) => continue,
                Some(Ok(tungstenite::Message::Frame(_))) => continue,
                Some(Err(e)) => {
                    return Some(Err(LwError::Socket(format!("WebSocket read error: {e}"))));
                }
                None => return None,
            }
        }
    }
}
