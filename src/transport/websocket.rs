//! WebSocket transport built on tokio-tungstenite
//!
//! Each `open` spawns one task that owns the stream: it performs the
//! handshake (bounded by a timeout), forwards frames to the socket's sink,
//! and reports exactly one `Closed` when it ends.

use super::{EventSink, Socket, Transport, TransportError};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, warn};
use url::Url;

/// Default handshake timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Close code sent when the client closes the socket
const NORMAL_CLOSURE: u16 = 1000;

/// tokio-tungstenite backed [`Transport`]
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    runtime: Handle,
    connect_timeout: Duration,
}

impl WebSocketTransport {
    pub fn new(runtime: Handle, connect_timeout: Duration) -> Self {
        // A provider may already be installed by the host process
        let _ = rustls::crypto::ring::default_provider().install_default();
        Self {
            runtime,
            connect_timeout,
        }
    }

    /// Spawn socket tasks on the runtime of the calling context
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime.
    pub fn current(connect_timeout: Duration) -> Self {
        Self::new(Handle::current(), connect_timeout)
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

impl Transport for WebSocketTransport {
    fn open(&self, url: &Url, sink: EventSink) -> Result<Box<dyn Socket>, TransportError> {
        match url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(TransportError::UnsupportedUrl(format!(
                    "{url} (scheme '{other}')"
                )))
            }
        }

        let (close_tx, close_rx) = oneshot::channel();
        self.runtime.spawn(run_socket(
            url.to_string(),
            sink,
            close_rx,
            self.connect_timeout,
        ));

        Ok(Box::new(WebSocketSocket {
            close_tx: Some(close_tx),
        }))
    }
}

/// Handle to a socket task; closing (or dropping) it stops the task
struct WebSocketSocket {
    close_tx: Option<oneshot::Sender<()>>,
}

impl Socket for WebSocketSocket {
    fn close(&mut self) {
        if let Some(close_tx) = self.close_tx.take() {
            let _ = close_tx.send(());
        }
    }
}

impl Drop for WebSocketSocket {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_socket(
    url: String,
    sink: EventSink,
    mut close_rx: oneshot::Receiver<()>,
    connect_timeout: Duration,
) {
    debug!(url = %url, "Opening WebSocket");

    let handshake = tokio::time::timeout(connect_timeout, connect_async(url.as_str()));
    let stream = tokio::select! {
        _ = &mut close_rx => {
            debug!(url = %url, "Socket closed before handshake completed");
            sink.closed(None, "closed before open");
            return;
        }
        result = handshake => match result {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => {
                sink.error(format!("connect to {url} failed: {e}"));
                sink.closed(None, "connect failed");
                return;
            }
            Err(_) => {
                sink.error(format!(
                    "connect to {url} timed out after {}ms",
                    connect_timeout.as_millis()
                ));
                sink.closed(None, "connect timeout");
                return;
            }
        }
    };

    sink.opened();
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            _ = &mut close_rx => {
                if let Err(e) = write.send(Message::Close(None)).await {
                    debug!("Close frame not sent: {}", e);
                }
                sink.closed(Some(NORMAL_CLOSURE), "closed by client");
                break;
            }
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => sink.frame(text.as_str()),
                Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => sink.frame(text),
                    Err(e) => sink.undecodable(format!(
                        "binary frame of {} bytes is not UTF-8: {e}",
                        bytes.len()
                    )),
                },
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = match frame {
                        Some(frame) => (Some(u16::from(frame.code)), frame.reason.as_str().to_string()),
                        None => (None, String::new()),
                    };
                    sink.closed(code, reason);
                    break;
                }
                // Ping/pong are answered by tungstenite itself
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("WebSocket read failed: {}", e);
                    sink.error(e.to_string());
                    sink.closed(None, "transport error");
                    break;
                }
                None => {
                    sink.closed(None, "stream ended");
                    break;
                }
            }
        }
    }

    debug!(url = %url, "WebSocket task finished");
}
