//! In-memory transport for tests.
//!
//! [`MockConnector`] hands out a [`MockPeer`] per successful connect. The peer
//! plays the server: it pushes frames to the client and observes what the
//! client writes. Dropping a peer ends the client's read stream, which the
//! driver reports as an abnormal close (1006).

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use lw_core::error::{LwError, LwResult};

use crate::events::CloseInfo;
use crate::transport::{Connector, Frame, WsPair, WsReader, WsWriter};

/// How long [`MockConnector::next_peer`] and [`MockPeer::recv`] wait.
const MOCK_WAIT: Duration = Duration::from_secs(5);

/// Something the client wrote to the mock socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A text frame.
    Text(String),
    /// A close frame.
    Close {
        /// Close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

/// Connector that produces in-memory sockets.
pub struct MockConnector {
    peers_tx: mpsc::UnboundedSender<MockPeer>,
    peers_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<MockPeer>>,
    attempts: Mutex<Vec<String>>,
    failures: Mutex<VecDeque<String>>,
}

impl MockConnector {
    /// Create a connector.
    pub fn new() -> Arc<Self> {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            peers_tx,
            peers_rx: tokio::sync::Mutex::new(peers_rx),
            attempts: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
        })
    }

    /// Make the next `count` connection attempts fail.
    pub fn fail_next(&self, count: usize) {
        let mut failures = self.failures.lock();
        for _ in 0..count {
            failures.push_back("connection refused".to_string());
        }
    }

    /// URLs of every connection attempt so far, in order.
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().clone()
    }

    /// Number of connection attempts so far.
    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().len()
    }

    /// Wait for the next successful connection.
    pub async fn next_peer(&self) -> Option<MockPeer> {
        let mut peers = self.peers_rx.lock().await;
        tokio::time::timeout(MOCK_WAIT, peers.recv()).await.ok().flatten()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &str, protocols: &[String]) -> LwResult<WsPair> {
        self.attempts.lock().push(url.to_string());
        if let Some(reason) = self.failures.lock().pop_front() {
            return Err(LwError::Socket(reason));
        }

        let (to_client, client_rx) = mpsc::unbounded_channel();
        let (client_tx, from_client) = mpsc::unbounded_channel();
        let peer = MockPeer {
            url: url.to_string(),
            protocols: protocols.to_vec(),
            to_client,
            from_client,
        };
        self.peers_tx
            .send(peer)
            .map_err(|_| LwError::Socket("mock connector dropped".into()))?;

        Ok((
            Box::new(MockWriter { tx: client_tx }),
            Box::new(MockReader { rx: client_rx }),
        ))
    }
}

/// Server side of one mock connection.
pub struct MockPeer {
    /// URL the client connected to.
    pub url: String,
    /// Subprotocols the client offered.
    pub protocols: Vec<String>,
    to_client: mpsc::UnboundedSender<LwResult<Frame>>,
    from_client: mpsc::UnboundedReceiver<Outbound>,
}

impl MockPeer {
    /// Push a text frame to the client.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.to_client.send(Ok(Frame::Text(text.into()))).is_ok()
    }

    /// Push a binary frame to the client.
    pub fn send_binary(&self, data: Vec<u8>) -> bool {
        self.to_client.send(Ok(Frame::Binary(data))).is_ok()
    }

    /// Close the connection from the server side.
    pub fn close(&self, code: u16, reason: &str) -> bool {
        let info = CloseInfo { code, reason: reason.to_string() };
        self.to_client.send(Ok(Frame::Close(info))).is_ok()
    }

    /// Fail the client's read stream with a transport error.
    pub fn fail(&self, reason: &str) -> bool {
        self.to_client.send(Err(LwError::Socket(reason.to_string()))).is_ok()
    }

    /// Wait for the next thing the client wrote.
    pub async fn recv(&mut self) -> Option<Outbound> {
        tokio::time::timeout(MOCK_WAIT, self.from_client.recv()).await.ok().flatten()
    }

    /// Wait for the next text frame. A close frame or a timeout yields `None`.
    pub async fn recv_text(&mut self) -> Option<String> {
        match self.recv().await? {
            Outbound::Text(text) => Some(text),
            Outbound::Close { .. } => None,
        }
    }

    /// Take what the client wrote without waiting.
    pub fn try_recv(&mut self) -> Option<Outbound> {
        self.from_client.try_recv().ok()
    }

    /// Collect everything written so far.
    pub fn drain(&mut self) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Some(item) = self.try_recv() {
            out.push(item);
        }
        out
    }
}

struct MockWriter {
    tx: mpsc::UnboundedSender<Outbound>,
}

#[async_trait]
impl WsWriter for MockWriter {
    async fn send_text(&mut self, text: &str) -> LwResult<()> {
        self.tx.send(Outbound::Text(text.to_string())).map_err(|_| LwError::SocketClosed)
    }

    async fn close(&mut self, code: u16, reason: &str) -> LwResult<()> {
        self.tx
            .send(Outbound::Close { code, reason: reason.to_string() })
            .map_err(|_| LwError::SocketClosed)
    }
}

struct MockReader {
    rx: mpsc::UnboundedReceiver<LwResult<Frame>>,
}

#[async_trait]
impl WsReader for MockReader {
    async fn recv(&mut self) -> Option<LwResult<Frame>> {
        self.rx.recv().await
    }
}
