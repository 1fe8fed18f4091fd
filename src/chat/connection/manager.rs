//! Lifecycle of the single streaming connection.
//!
//! Each `open` spawns one task that owns the transport and reports
//! [`ConnectionEvent`]s over a fresh channel. State transitions are applied
//! when the owner pulls an event with [`ConnectionManager::next_event`], so
//! the connection state is only ever written from the owner's side. There is
//! no automatic reconnect: reopening is the caller's decision.
//!
//! Inbound events go through a bounded channel. When the owner stops pulling
//! events the connection task stops reading the transport until there is room
//! again. Outbound text stays unbounded; it is paced by user submits.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::{Notify, broadcast, mpsc};
use tracing::{debug, info, warn};
use url::Url;

use crate::chat::connection::endpoint::authorize;
use crate::chat::connection::state::{ConnectionEvent, ConnectionState};
use crate::chat::connection::transport::{Connector, TransportChannels, TransportFuture};
use crate::chat::core::errors::{ChatError, ChatResult};
use crate::chat::credentials::Credentials;

/// Inbound events buffered per connection unless configured otherwise.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Owns at most one live connection and its state.
pub struct ConnectionManager<C> {
    connector: C,
    connect_timeout: Duration,
    event_capacity: usize,
    state: ConnectionState,
    transitions: broadcast::Sender<ConnectionState>,
    active: Option<ActiveConnection>,
}

struct ActiveConnection {
    endpoint: Url,
    events: mpsc::Receiver<ConnectionEvent>,
    outbound: mpsc::UnboundedSender<String>,
    shutdown: Arc<Notify>,
}

impl Drop for ActiveConnection {
    fn drop(&mut self) {
        self.shutdown.notify_one();
    }
}

impl<C: Connector> ConnectionManager<C> {
    /// Create a manager in the `Disconnected` state.
    #[must_use]
    pub fn new(connector: C, connect_timeout: Duration, transition_capacity: usize) -> Self {
        let (transitions, _) = broadcast::channel(transition_capacity.max(1));
        Self {
            connector,
            connect_timeout,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            state: ConnectionState::Disconnected,
            transitions,
            active: None,
        }
    }

    /// Bound the inbound event buffer of every connection opened from now on.
    #[must_use]
    pub fn with_event_capacity(mut self, event_capacity: usize) -> Self {
        self.event_capacity = event_capacity.max(1);
        self
    }

    /// Current connection state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Endpoint of the live connection, without credentials.
    #[must_use]
    pub fn endpoint(&self) -> Option<&Url> {
        self.active.as_ref().map(|active| &active.endpoint)
    }

    /// Whether a connection task is still attached.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.active.is_some()
    }

    /// Receive every state transition from now on.
    #[must_use]
    pub fn subscribe_transitions(&self) -> broadcast::Receiver<ConnectionState> {
        self.transitions.subscribe()
    }

    /// Open a connection to `endpoint`, tearing down any previous one.
    ///
    /// Returns immediately; the outcome arrives as an `Opened` or `Errored`
    /// event. Failures never escape as errors.
    pub fn open(&mut self, endpoint: &Url, credentials: &Credentials) {
        self.close();
        self.set_state(ConnectionState::Connecting);

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(err) => {
                warn!(error = %err, "open requested outside a tokio runtime");
                self.set_state(ConnectionState::Errored);
                return;
            }
        };

        let (events_tx, events) = mpsc::channel(self.event_capacity);
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let shutdown = Arc::new(Notify::new());

        let connecting = self.connector.connect(authorize(endpoint, credentials));
        runtime.spawn(drive(
            connecting,
            self.connect_timeout,
            outbound_rx,
            events_tx,
            Arc::clone(&shutdown),
        ));

        info!(%endpoint, "opening streaming connection");
        self.active = Some(ActiveConnection {
            endpoint: endpoint.clone(),
            events,
            outbound,
            shutdown,
        });
    }

    /// Record an open that could not even be attempted (e.g. bad endpoint).
    pub fn reject_open(&mut self, reason: &ChatError) {
        self.close();
        warn!(error = %reason, "cannot open streaming connection");
        self.set_state(ConnectionState::Connecting);
        self.set_state(ConnectionState::Errored);
    }

    /// Forward one raw text frame.
    ///
    /// Dropped (and logged) unless the connection is `Connected`; returns
    /// whether the frame was handed to the transport.
    pub fn send(&self, text: &str) -> bool {
        if self.state != ConnectionState::Connected {
            warn!(state = %self.state, "not connected, dropping outbound message");
            return false;
        }
        let Some(active) = &self.active else {
            warn!("no live connection, dropping outbound message");
            return false;
        };
        if active.outbound.send(text.to_owned()).is_err() {
            warn!("connection task has exited, dropping outbound message");
            return false;
        }
        true
    }

    /// Wait for the next event of the live connection and apply its transition.
    ///
    /// Returns `None` when no connection is live. Cancel-safe.
    pub async fn next_event(&mut self) -> Option<ConnectionEvent> {
        let active = self.active.as_mut()?;
        let Some(event) = active.events.recv().await else {
            debug!("connection task ended without a terminal event");
            self.active = None;
            if self.state != ConnectionState::Errored {
                self.set_state(ConnectionState::Disconnected);
            }
            return None;
        };

        if let Some(next) = event.next_state() {
            self.set_state(next);
        }
        if matches!(event, ConnectionEvent::Closed | ConnectionEvent::Errored(_)) {
            self.active = None;
        }
        Some(event)
    }

    /// Tear down the connection. Idempotent; never fails.
    pub fn close(&mut self) {
        if let Some(active) = self.active.take() {
            debug!(endpoint = %active.endpoint, "closing streaming connection");
        }
        self.set_state(ConnectionState::Disconnected);
    }

    fn set_state(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        debug!(from = %self.state, to = %next, "connection state transition");
        self.state = next;
        // no subscribers is fine
        let _ = self.transitions.send(next);
    }
}

async fn drive(
    connecting: TransportFuture<'static, ChatResult<TransportChannels>>,
    connect_timeout: Duration,
    mut outbound: mpsc::UnboundedReceiver<String>,
    events: mpsc::Sender<ConnectionEvent>,
    shutdown: Arc<Notify>,
) {
    let connected = tokio::select! {
        () = shutdown.notified() => {
            debug!("connect abandoned");
            return;
        }
        result = tokio::time::timeout(connect_timeout, connecting) => match result {
            Ok(result) => result,
            Err(_) => Err(ChatError::ConnectTimeout(connect_timeout.as_secs())),
        },
    };

    let TransportChannels { mut sink, mut stream } = match connected {
        Ok(channels) => channels,
        Err(err) => {
            warn!(error = %err, "streaming connection failed to open");
            let _ = events.send(ConnectionEvent::Errored(err.to_string())).await;
            return;
        }
    };
    if events.send(ConnectionEvent::Opened).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            () = shutdown.notified() => {
                if let Err(err) = sink.close().await {
                    debug!(error = %err, "transport close failed");
                }
                return;
            }
            Some(text) = outbound.recv() => {
                if let Err(err) = sink.send(text).await {
                    warn!(error = %err, "send failed");
                    let _ = events.send(ConnectionEvent::Errored(err.to_string())).await;
                    return;
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(frame)) => {
                    // waits for room; the owner dropping the receiver ends the task
                    if events.send(ConnectionEvent::Fragment(frame)).await.is_err() {
                        let _ = sink.close().await;
                        return;
                    }
                }
                Some(Err(err)) => {
                    warn!(error = %err, "transport error");
                    let _ = events.send(ConnectionEvent::Errored(err.to_string())).await;
                    return;
                }
                None => {
                    info!("streaming connection closed by remote");
                    let _ = events.send(ConnectionEvent::Closed).await;
                    return;
                }
            },
        }
    }
}
