// src/connection/handler.rs

//! Defines the `ConnectionHandler` which manages the full lifecycle of one
//! WebSocket client: registration with the hub, the reader and writer pumps,
//! and teardown.

use super::guard::ConnectionGuard;
use crate::config::ConnectionConfig;
use crate::core::control;
use crate::core::hub::Hub;
use crate::core::protocol::OutboundFrame;
use crate::core::session::Session;
use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, timeout};
use tracing::{debug, info, warn};

/// Why the reader pump stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderExit {
    /// The peer sent a close frame or the stream ended.
    Closed,
    /// No inbound frame arrived within the read deadline.
    DeadlineExceeded,
    /// The transport returned an error.
    TransportError,
    /// A control ack could not be queued.
    Backpressure,
}

/// Why the writer pump stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterExit {
    /// The hub closed the outbound queue.
    QueueClosed,
    /// A write failed or did not finish within the write timeout.
    WriteFailed,
}

/// Manages the full lifecycle of a client connection.
pub struct ConnectionHandler {
    hub: Hub,
    config: ConnectionConfig,
    session: Arc<Session>,
    outbound_rx: mpsc::Receiver<OutboundFrame>,
}

impl ConnectionHandler {
    /// Opens a new session on the hub. The session is registered once `run`
    /// (or `serve`) starts.
    pub fn new(hub: Hub, config: ConnectionConfig) -> Self {
        let (session, outbound_rx) = hub.open_session();
        Self {
            hub,
            config,
            session,
            outbound_rx,
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Drives an upgraded socket until either pump stops.
    pub async fn run(self, socket: WebSocket) {
        let (sink, stream) = socket.split();
        self.serve(sink, stream).await;
    }

    /// Registers the session, then runs the reader and writer pumps until the
    /// first one finishes. The other pump is dropped with it.
    pub async fn serve<S, R, E>(self, mut sink: S, stream: R)
    where
        S: Sink<Message> + Unpin,
        S::Error: Display,
        R: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
    {
        let ConnectionHandler {
            hub,
            config,
            session,
            outbound_rx,
        } = self;
        let session_id = session.id().clone();
        let _guard = ConnectionGuard::new(hub.clone(), session_id.clone());

        if let Err(e) = hub.register(session.clone()).await {
            warn!(session_id = %session_id, "Rejecting connection: {}", e);
            let _ = timeout(config.write_timeout, sink.send(Message::Close(None))).await;
            return;
        }
        info!(session_id = %session_id, "WebSocket client connected.");

        tokio::select! {
            exit = read_pump(&session, stream, config.read_deadline) => {
                debug!(session_id = %session_id, ?exit, "Reader stopped.");
            }
            exit = write_pump(sink, outbound_rx, config.ping_interval, config.write_timeout) => {
                debug!(session_id = %session_id, ?exit, "Writer stopped.");
            }
        }

        info!(
            session_id = %session_id,
            connected_for = ?session.connected_for(),
            "WebSocket client disconnected."
        );
    }
}

/// Reads inbound frames until the peer goes away.
///
/// Every frame refreshes the session's last activity and restarts the read
/// deadline. Text frames are control messages; binary frames are ignored.
pub async fn read_pump<R, E>(session: &Session, mut stream: R, read_deadline: Duration) -> ReaderExit
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    loop {
        let message = match timeout(read_deadline, stream.next()).await {
            Err(_) => {
                info!(session_id = %session.id(), "Read deadline exceeded, closing connection.");
                return ReaderExit::DeadlineExceeded;
            }
            Ok(None) => return ReaderExit::Closed,
            Ok(Some(Err(e))) => {
                debug!(session_id = %session.id(), "WebSocket read error: {}", e);
                return ReaderExit::TransportError;
            }
            Ok(Some(Ok(message))) => message,
        };

        session.touch();
        match message {
            Message::Text(text) => {
                if !control::handle_frame(session, text.as_str()) {
                    return ReaderExit::Backpressure;
                }
            }
            Message::Binary(data) => {
                debug!(session_id = %session.id(), len = data.len(), "Ignoring binary frame.");
            }
            // Pongs to inbound pings are sent by the transport.
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(_) => return ReaderExit::Closed,
        }
    }
}

/// Writes queued frames and periodic pings to the transport.
///
/// When the hub closes the queue a close frame is sent before returning.
pub async fn write_pump<S>(
    mut sink: S,
    mut outbound_rx: mpsc::Receiver<OutboundFrame>,
    ping_interval: Duration,
    write_timeout: Duration,
) -> WriterExit
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let mut ping_ticker = tokio::time::interval_at(Instant::now() + ping_interval, ping_interval);
    ping_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let message = tokio::select! {
            frame = outbound_rx.recv() => match frame {
                Some(frame) => Message::Text(frame.to_string().into()),
                None => {
                    let _ = send_with_timeout(&mut sink, Message::Close(None), write_timeout).await;
                    return WriterExit::QueueClosed;
                }
            },
            _ = ping_ticker.tick() => Message::Ping(Default::default()),
        };

        if !send_with_timeout(&mut sink, message, write_timeout).await {
            return WriterExit::WriteFailed;
        }
    }
}

async fn send_with_timeout<S>(sink: &mut S, message: Message, write_timeout: Duration) -> bool
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    match timeout(write_timeout, sink.send(message)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!("WebSocket write failed: {}", e);
            false
        }
        Err(_) => {
            debug!("WebSocket write timed out after {:?}.", write_timeout);
            false
        }
    }
}
