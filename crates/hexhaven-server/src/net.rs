//! TCP transport for [`Connection`].
//!
//! Each socket gets a reader task and a writer task so one slow peer never
//! holds up delivery to the others. The writer serializes each outbound
//! message to JSON and writes it as a single flushed frame; the reader decodes
//! frames into the inbound queue.

use crate::connection::{wait_closed, ClientConnection, Connection, ConnectionError, Delivery};
use crate::framing::{read_frame, write_frame};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, warn};

impl<Out, In> Connection<Out, In>
where
    Out: Serialize + Send + 'static,
    In: DeserializeOwned + Send + 'static,
{
    /// Wrap a connected socket, spawning its reader and writer tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn over_tcp(stream: TcpStream) -> Self {
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, "set_nodelay failed: {}", e);
        }

        let (reader, writer) = stream.into_split();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = watch::channel(false);
        let close_tx = Arc::new(close_tx);

        tokio::spawn(write_loop(writer, out_rx, peer.clone()));
        tokio::spawn(read_loop(reader, in_tx, Arc::clone(&close_tx), peer.clone()));

        Connection::from_parts(out_tx, in_rx, close_tx, close_rx, peer)
    }
}

/// Connect to a server as a player
pub async fn connect(addr: impl ToSocketAddrs) -> io::Result<ClientConnection> {
    let stream = TcpStream::connect(addr).await?;
    Ok(Connection::over_tcp(stream))
}

/// Drain the outbound queue onto the socket until the connection is released
async fn write_loop<Out: Serialize>(
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Delivery<Out>>,
    peer: String,
) {
    while let Some(delivery) = outbound.recv().await {
        let Ok(message) = delivery else {
            continue;
        };
        let payload = match serde_json::to_vec(&message) {
            Ok(payload) => payload,
            Err(e) => {
                error!(%peer, "failed to encode message: {}", e);
                continue;
            }
        };
        if let Err(e) = write_frame(&mut writer, &payload).await {
            warn!(%peer, "write failed: {}", e);
            break;
        }
    }
    // Lets the peer's reader see EOF
    let _ = writer.shutdown().await;
    debug!(%peer, "writer finished");
}

/// Decode inbound frames until EOF, an IO error, or the local end goes away.
///
/// Marks the connection closed on the way out so later sends fail.
async fn read_loop<In: DeserializeOwned>(
    mut reader: OwnedReadHalf,
    inbound: mpsc::UnboundedSender<Delivery<In>>,
    close_tx: Arc<watch::Sender<bool>>,
    peer: String,
) {
    let mut close_rx = close_tx.subscribe();
    loop {
        let frame = tokio::select! {
            frame = read_frame(&mut reader) => frame,
            _ = wait_closed(&mut close_rx) => break,
            _ = inbound.closed() => break,
        };

        let item = match frame {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                warn!(%peer, "undecodable message: {}", e);
                ConnectionError::MalformedMessage(e.to_string())
            }),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                debug!(%peer, "peer closed the stream");
                break;
            }
            Err(e) => {
                warn!(%peer, "read failed: {}", e);
                let _ = inbound.send(Err(e.into()));
                break;
            }
        };
        if inbound.send(item).is_err() {
            break;
        }
    }
    close_tx.send_replace(true);
}
