//! WebSocket live provider.
//!
//! Requests are JSON objects `{"op": "subscribe" | "unsubscribe", "symbol": ..}`.
//! Each request is answered by an `ack` frame; a subscribe acked with code
//! `accepted` is confirmed later by a `subscribed` or `subscribe_failed`
//! frame. `quote` frames go straight into the inbox.
//!
//! A reader task owns the receive half of the socket. When the socket
//! closes or errors the reader pushes `Disconnected` and fails every
//! request still waiting for its ack.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, trace, warn};

use super::dto::{refusal, WsFrame, WsRequest};
use crate::domain::Symbol;
use crate::error::ProviderError;
use crate::infrastructure::inbox::InboxSender;
use crate::port::{LiveProvider, PolledQuote, ProviderEvent, SubscribeAck};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;

const SUBSCRIBE: &str = "subscribe";
const UNSUBSCRIBE: &str = "unsubscribe";

/// Reply to a request, as delivered to the waiting caller.
type AckResult = Result<SubscribeAck, ProviderError>;

#[derive(Default)]
struct Waiters {
    pending: HashMap<(&'static str, Symbol), oneshot::Sender<AckResult>>,
}

struct Connection {
    writer: Arc<AsyncMutex<WsWriter>>,
    reader: JoinHandle<()>,
}

pub struct WsLiveProvider {
    url: String,
    connection: Mutex<Option<Connection>>,
    waiters: Arc<Mutex<Waiters>>,
}

impl WsLiveProvider {
    #[must_use]
    pub fn new(url: String) -> Self {
        Self {
            url,
            connection: Mutex::new(None),
            waiters: Arc::new(Mutex::new(Waiters::default())),
        }
    }

    fn writer(&self) -> Result<Arc<AsyncMutex<WsWriter>>, ProviderError> {
        self.connection
            .lock()
            .as_ref()
            .filter(|connection| !connection.reader.is_finished())
            .map(|connection| Arc::clone(&connection.writer))
            .ok_or(ProviderError::Disconnected)
    }

    /// Send a request and wait for its ack.
    async fn request(&self, op: &'static str, symbol: &Symbol) -> AckResult {
        let writer = self.writer()?;
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().pending.insert((op, symbol.clone()), tx);

        let body = serde_json::to_string(&WsRequest {
            op,
            symbol: symbol.as_str(),
        })
        .map_err(|err| ProviderError::Transient(err.to_string()))?;
        debug!(op, symbol = %symbol, "Sending request");
        if let Err(err) = writer.lock().await.send(Message::Text(body)).await {
            self.waiters.lock().pending.remove(&(op, symbol.clone()));
            return Err(ProviderError::Transient(err.to_string()));
        }

        // A dropped sender means the reader ended.
        rx.await.unwrap_or(Err(ProviderError::Disconnected))
    }
}

/// Route one text frame.
fn dispatch(text: &str, events: &InboxSender, waiters: &Mutex<Waiters>) {
    let frame = match serde_json::from_str::<WsFrame>(text) {
        Ok(frame) => frame,
        Err(err) => {
            warn!(error = %err, bytes = text.len(), "Failed to parse frame");
            return;
        }
    };

    match frame {
        WsFrame::Quote(quote) => {
            let PolledQuote { symbol, sample } = quote.into_polled(Utc::now());
            let server_time = sample.observed_at;
            events.send(ProviderEvent::Quote {
                symbol,
                sample,
                server_time,
            });
        }
        WsFrame::Ack {
            op,
            symbol,
            ok,
            code,
            reason,
        } => {
            let key = match op.as_str() {
                SUBSCRIBE => SUBSCRIBE,
                UNSUBSCRIBE => UNSUBSCRIBE,
                other => {
                    warn!(op = other, symbol = %symbol, "Ack for unknown operation");
                    return;
                }
            };
            let result = if ok {
                Ok(if code.as_deref() == Some("accepted") {
                    SubscribeAck::Accepted
                } else {
                    SubscribeAck::Confirmed
                })
            } else {
                Err(refusal(&symbol, code.as_deref(), reason))
            };
            match waiters.lock().pending.remove(&(key, symbol.clone())) {
                Some(waiter) => {
                    let _ = waiter.send(result);
                }
                None => trace!(op = key, symbol = %symbol, "Ack with no waiter"),
            }
        }
        WsFrame::Subscribed { symbol } => {
            events.send(ProviderEvent::SubscribeConfirmed { symbol });
        }
        WsFrame::SubscribeFailed {
            symbol,
            code,
            reason,
        } => {
            let error = refusal(&symbol, code.as_deref(), reason);
            events.send(ProviderEvent::SubscribeFailed { symbol, error });
        }
    }
}

async fn read_loop(
    mut read: SplitStream<WsStream>,
    writer: Arc<AsyncMutex<WsWriter>>,
    events: InboxSender,
    waiters: Arc<Mutex<Waiters>>,
) {
    let reason = loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => {
                trace!(bytes = text.len(), "Received WebSocket text frame");
                dispatch(&text, &events, &waiters);
            }
            Some(Ok(Message::Ping(data))) => {
                trace!("Received WebSocket ping");
                if let Err(err) = writer.lock().await.send(Message::Pong(data)).await {
                    break format!("pong failed: {err}");
                }
            }
            Some(Ok(Message::Close(frame))) => {
                info!(frame = ?frame, "WebSocket closed by server");
                break "closed by server".to_string();
            }
            Some(Ok(_)) => {}
            Some(Err(err)) => {
                error!(error = %err, "WebSocket error");
                break err.to_string();
            }
            None => break "stream ended".to_string(),
        }
    };

    // Waiting callers see their sender dropped and report Disconnected.
    waiters.lock().pending.clear();
    events.send(ProviderEvent::Disconnected { reason });
}

#[async_trait]
impl LiveProvider for WsLiveProvider {
    async fn connect(&self, events: InboxSender) -> Result<(), ProviderError> {
        info!(url = %self.url, "Connecting to WebSocket");
        let (stream, response) = connect_async(&self.url)
            .await
            .map_err(|err| ProviderError::Transient(err.to_string()))?;
        info!(status = %response.status(), "WebSocket connected");

        let (write, read) = stream.split();
        let writer = Arc::new(AsyncMutex::new(write));
        let reader = tokio::spawn(read_loop(
            read,
            Arc::clone(&writer),
            events.clone(),
            Arc::clone(&self.waiters),
        ));
        let previous = self.connection.lock().replace(Connection { writer, reader });
        if let Some(previous) = previous {
            previous.reader.abort();
        }
        events.send(ProviderEvent::Connected);
        Ok(())
    }

    async fn subscribe(&self, symbol: &Symbol) -> Result<SubscribeAck, ProviderError> {
        self.request(SUBSCRIBE, symbol).await
    }

    async fn unsubscribe(&self, symbol: &Symbol) -> Result<(), ProviderError> {
        self.request(UNSUBSCRIBE, symbol).await.map(|_| ())
    }

    async fn close(&self) -> Result<(), ProviderError> {
        let Some(connection) = self.connection.lock().take() else {
            return Ok(());
        };
        connection.reader.abort();
        self.waiters.lock().pending.clear();
        let result = connection.writer.lock().await.close().await;
        result.map_err(|err| ProviderError::Transient(err.to_string()))
    }

    fn name(&self) -> &'static str {
        "websocket"
    }
}
