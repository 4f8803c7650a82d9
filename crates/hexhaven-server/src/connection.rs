//! Duplex message channel between the game session and one player.
//!
//! A [`Connection`] looks the same whatever sits on the other side: another
//! task in this process ([`in_process_pair`]) or a remote peer over TCP
//! (see [`crate::net`]). Sending never blocks; receiving suspends the caller
//! until a whole message arrives or the channel closes.

use crate::protocol::{ClientMessage, ServerMessage};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

/// The session's end of a seat
pub type ServerConnection = Connection<ServerMessage, ClientMessage>;

/// A player's end of a seat
pub type ClientConnection = Connection<ClientMessage, ServerMessage>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("connection closed")]
    ConnectionClosed,

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("timed out waiting for a message")]
    Timeout,

    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ConnectionError {
    fn from(err: std::io::Error) -> Self {
        ConnectionError::Io(err.to_string())
    }
}

/// Queue item for one direction of a channel
pub(crate) type Delivery<T> = Result<T, ConnectionError>;

/// One end of a duplex channel: sends `Out`, receives `In`.
pub struct Connection<Out, In> {
    outbound: Option<mpsc::UnboundedSender<Delivery<Out>>>,
    inbound: mpsc::UnboundedReceiver<Delivery<In>>,
    close_tx: Arc<watch::Sender<bool>>,
    close_rx: watch::Receiver<bool>,
    peer: String,
}

/// Two connected ends sharing a close signal
pub fn in_process_pair<A, B>() -> (Connection<A, B>, Connection<B, A>) {
    let (a_tx, a_rx) = mpsc::unbounded_channel::<Delivery<A>>();
    let (b_tx, b_rx) = mpsc::unbounded_channel::<Delivery<B>>();
    let (close_tx, close_rx) = watch::channel(false);
    let close_tx = Arc::new(close_tx);

    let first = Connection::from_parts(
        a_tx,
        b_rx,
        Arc::clone(&close_tx),
        close_rx.clone(),
        "in-process".to_string(),
    );
    let second = Connection::from_parts(b_tx, a_rx, close_tx, close_rx, "in-process".to_string());
    (first, second)
}

impl<Out, In> Connection<Out, In> {
    pub(crate) fn from_parts(
        outbound: mpsc::UnboundedSender<Delivery<Out>>,
        inbound: mpsc::UnboundedReceiver<Delivery<In>>,
        close_tx: Arc<watch::Sender<bool>>,
        close_rx: watch::Receiver<bool>,
        peer: String,
    ) -> Self {
        Self {
            outbound: Some(outbound),
            inbound,
            close_tx,
            close_rx,
            peer,
        }
    }

    /// Who is on the other end, for logs
    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn is_closed(&self) -> bool {
        *self.close_rx.borrow() || self.outbound.is_none()
    }

    /// Queue a message for the other end
    pub fn send(&self, message: Out) -> Result<(), ConnectionError> {
        if *self.close_rx.borrow() {
            return Err(ConnectionError::ConnectionClosed);
        }
        let outbound = self
            .outbound
            .as_ref()
            .ok_or(ConnectionError::ConnectionClosed)?;
        outbound
            .send(Ok(message))
            .map_err(|_| ConnectionError::ConnectionClosed)
    }

    /// Wait for the next message.
    ///
    /// Messages already queued are delivered before a close is reported.
    pub async fn receive(&mut self) -> Result<In, ConnectionError> {
        tokio::select! {
            biased;
            message = self.inbound.recv() => match message {
                Some(result) => result,
                None => Err(ConnectionError::ConnectionClosed),
            },
            _ = wait_closed(&mut self.close_rx) => Err(ConnectionError::ConnectionClosed),
        }
    }

    /// [`receive`](Self::receive) bounded by `timeout`
    pub async fn receive_timeout(&mut self, timeout: Duration) -> Result<In, ConnectionError> {
        tokio::time::timeout(timeout, self.receive())
            .await
            .map_err(|_| ConnectionError::Timeout)?
    }

    /// Release the channel.
    ///
    /// Pending and future receives on both ends fail with `ConnectionClosed`
    /// once their queues are empty.
    pub fn close(&mut self) {
        self.close_tx.send_replace(true);
        self.outbound = None;
    }
}

/// Resolves once the close flag is set or every sender is gone
pub(crate) async fn wait_closed(close_rx: &mut watch::Receiver<bool>) {
    loop {
        let closed = *close_rx.borrow_and_update();
        if closed {
            return;
        }
        if close_rx.changed().await.is_err() {
            return;
        }
    }
}
