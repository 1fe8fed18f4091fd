//! Session controller: wires input, connection and transcript together.
//!
//! The controller exclusively owns one connection and one transcript. Every
//! mutation happens on the owner's task, either from a user call (`submit`,
//! `close`) or while applying one event in `next_event`, so no locking is
//! needed. Presentation layers watch [`SessionSnapshot`]s; they never see the
//! live store.

use std::collections::BTreeMap;

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};
use url::Url;

use crate::chat::connection::endpoint::EndpointTemplate;
use crate::chat::connection::manager::ConnectionManager;
use crate::chat::connection::state::{ConnectionEvent, ConnectionState};
use crate::chat::connection::transport::Connector;
use crate::chat::core::config::ChatConfig;
use crate::chat::core::errors::{ChatError, ChatResult};
use crate::chat::core::ids::SessionId;
use crate::chat::credentials::CredentialProvider;
use crate::chat::dispatch::{OutboundDispatcher, SubmitOutcome};
use crate::chat::transcript::aggregator::{AggregatorStats, FragmentAggregator};
use crate::chat::transcript::entry::TranscriptEntry;
use crate::chat::transcript::store::TranscriptStore;

/// Lifecycle of a controller instance.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ControllerState {
    /// Created, never mounted.
    Uninitialized,
    /// Mounted; carries the current connection state.
    Initialized(ConnectionState),
    /// Closed for good; a new controller is needed.
    TornDown,
}

/// Read-only view handed to the presentation layer.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct SessionSnapshot {
    /// Entries in conversation order.
    pub transcript: Vec<TranscriptEntry>,
    /// Connection status at the time of the snapshot.
    pub status: ConnectionState,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Phase {
    Uninitialized,
    Initialized,
    TornDown,
}

/// Composes the connection manager, aggregator, dispatcher and transcript.
pub struct SessionController<C> {
    id: SessionId,
    template: EndpointTemplate,
    default_params: BTreeMap<String, String>,
    credentials: Box<dyn CredentialProvider>,
    connection: ConnectionManager<C>,
    aggregator: FragmentAggregator,
    dispatcher: OutboundDispatcher,
    transcript: TranscriptStore,
    phase: Phase,
    endpoint: Option<Url>,
    snapshots: watch::Sender<SessionSnapshot>,
}

impl<C: Connector> SessionController<C> {
    /// Create an unmounted controller.
    ///
    /// # Errors
    /// Returns an error if the config is invalid.
    pub fn new<P>(config: &ChatConfig, connector: C, credentials: P) -> ChatResult<Self>
    where
        P: CredentialProvider + 'static,
    {
        config.validate()?;
        let (snapshots, _) = watch::channel(SessionSnapshot::default());
        Ok(Self {
            id: SessionId::new(),
            template: EndpointTemplate::from_config(config)?,
            default_params: config.params.clone(),
            credentials: Box::new(credentials),
            connection: ConnectionManager::new(
                connector,
                config.connect_timeout(),
                config.transition_capacity,
            )
            .with_event_capacity(config.event_capacity),
            aggregator: FragmentAggregator::new(),
            dispatcher: OutboundDispatcher::new(),
            transcript: TranscriptStore::new(),
            phase: Phase::Uninitialized,
            endpoint: None,
            snapshots,
        })
    }

    /// Identifier used in log lines.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Controller lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ControllerState {
        match self.phase {
            Phase::Uninitialized => ControllerState::Uninitialized,
            Phase::Initialized => ControllerState::Initialized(self.connection.state()),
            Phase::TornDown => ControllerState::TornDown,
        }
    }

    /// Current connection status.
    #[must_use]
    pub const fn status(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Transcript in conversation order.
    #[must_use]
    pub fn transcript(&self) -> &[TranscriptEntry] {
        self.transcript.entries()
    }

    /// Endpoint most recently derived (without credentials).
    #[must_use]
    pub const fn endpoint(&self) -> Option<&Url> {
        self.endpoint.as_ref()
    }

    /// Whether a connection is still delivering events.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.connection.is_live()
    }

    /// Aggregation counters.
    #[must_use]
    pub const fn aggregator_stats(&self) -> AggregatorStats {
        self.aggregator.stats()
    }

    /// Owned copy of transcript and status.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            transcript: self.transcript.snapshot(),
            status: self.connection.state(),
        }
    }

    /// Be notified with a fresh snapshot after every change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.subscribe()
    }

    /// Receive raw connection state transitions.
    #[must_use]
    pub fn subscribe_transitions(&self) -> broadcast::Receiver<ConnectionState> {
        self.connection.subscribe_transitions()
    }

    /// Derive the endpoint from `params` and open the connection.
    ///
    /// Endpoint or transport failures show up as `Errored` status, not as
    /// errors here.
    ///
    /// # Errors
    /// Returns an error if the controller was already mounted or torn down.
    pub fn mount(&mut self, params: &BTreeMap<String, String>) -> ChatResult<()> {
        match self.phase {
            Phase::TornDown => return Err(ChatError::SessionTornDown),
            Phase::Initialized => return Err(ChatError::AlreadyMounted),
            Phase::Uninitialized => {}
        }
        self.phase = Phase::Initialized;
        info!(session = %self.id, template = self.template.as_str(), "mounting chat session");
        self.connect(params, true);
        Ok(())
    }

    /// Re-derive the endpoint; reopen only if it changed.
    ///
    /// Returns whether a new connection was opened. An unmounted controller
    /// is mounted.
    ///
    /// # Errors
    /// Returns an error if the controller was torn down.
    pub fn set_endpoint_params(&mut self, params: &BTreeMap<String, String>) -> ChatResult<bool> {
        match self.phase {
            Phase::TornDown => Err(ChatError::SessionTornDown),
            Phase::Uninitialized => {
                self.mount(params)?;
                Ok(self.endpoint.is_some())
            }
            Phase::Initialized => Ok(self.connect(params, false)),
        }
    }

    /// Submit explicit text.
    pub fn submit(&mut self, text: &str) -> SubmitOutcome {
        let outcome = self
            .dispatcher
            .submit(text, &self.connection, &mut self.transcript);
        self.publish_if(outcome != SubmitOutcome::Ignored);
        outcome
    }

    /// Replace the pending input buffer.
    pub fn compose(&mut self, text: impl Into<String>) {
        self.dispatcher.compose(text);
    }

    /// Append a line to the pending input buffer.
    pub fn push_input_line(&mut self, line: &str) {
        self.dispatcher.push_line(line);
    }

    /// Text composed but not yet submitted.
    #[must_use]
    pub fn pending_input(&self) -> &str {
        self.dispatcher.pending_input()
    }

    /// Submit the pending input buffer.
    pub fn submit_pending(&mut self) -> SubmitOutcome {
        let outcome = self
            .dispatcher
            .submit_pending(&self.connection, &mut self.transcript);
        self.publish_if(outcome != SubmitOutcome::Ignored);
        outcome
    }

    /// Wait for and apply the next connection event.
    ///
    /// Returns `None` once no connection is live. Cancel-safe, so it can sit
    /// in a `tokio::select!` next to user input.
    pub async fn next_event(&mut self) -> Option<ConnectionEvent> {
        if self.phase == Phase::TornDown {
            return None;
        }
        let event = self.connection.next_event().await?;
        if let ConnectionEvent::Fragment(frame) = &event {
            self.aggregator
                .on_fragment(&mut self.transcript, frame.clone());
        } else {
            debug!(session = %self.id, status = %self.connection.state(), "connection event");
        }
        self.publish();
        Some(event)
    }

    /// Tear down the session. Idempotent; the transcript is kept.
    pub fn close(&mut self) {
        if self.phase == Phase::TornDown {
            return;
        }
        self.connection.close();
        self.phase = Phase::TornDown;
        let stats = self.aggregator.stats();
        info!(
            session = %self.id,
            entries = self.transcript.len(),
            fragments = stats.fragments,
            degraded = stats.degraded,
            "chat session torn down"
        );
        self.publish();
    }

    fn connect(&mut self, params: &BTreeMap<String, String>, force: bool) -> bool {
        let mut merged = self.default_params.clone();
        merged.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));

        let opened = match self.template.resolve(&merged) {
            Ok(endpoint) => {
                if !force && self.endpoint.as_ref() == Some(&endpoint) {
                    debug!(session = %self.id, %endpoint, "endpoint unchanged");
                    return false;
                }
                let credentials = self.credentials.credentials();
                self.connection.open(&endpoint, &credentials);
                self.endpoint = Some(endpoint);
                true
            }
            Err(err) => {
                self.connection.reject_open(&err);
                self.endpoint = None;
                false
            }
        };
        self.publish();
        opened
    }

    fn publish_if(&self, changed: bool) {
        if changed {
            self.publish();
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.snapshot());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::chat::connection::transport::testing::{FakeConnector, FakeRemote};
    use crate::chat::credentials::Credentials;
    use crate::chat::transcript::entry::TranscriptRole;
    use tokio::sync::mpsc;

    fn config() -> ChatConfig {
        ChatConfig {
            endpoint_template: "ws://backend/ai/chat/${ns}".to_string(),
            ..ChatConfig::default()
        }
    }

    fn params(ns: &str) -> BTreeMap<String, String> {
        BTreeMap::from([("ns".to_string(), ns.to_string())])
    }

    async fn mounted() -> (
        SessionController<FakeConnector>,
        FakeRemote,
        mpsc::UnboundedReceiver<FakeRemote>,
    ) {
        let (connector, mut remotes) = FakeConnector::new();
        let mut session =
            SessionController::new(&config(), connector, Credentials::new(Some("tk".to_string())))
                .unwrap();
        session.mount(&params("default")).unwrap();
        assert_eq!(session.next_event().await, Some(ConnectionEvent::Opened));
        let remote = remotes.recv().await.unwrap();
        (session, remote, remotes)
    }

    fn roles(session: &SessionController<FakeConnector>) -> Vec<(TranscriptRole, &str)> {
        session
            .transcript()
            .iter()
            .map(|entry| (entry.role(), entry.content()))
            .collect()
    }

    #[tokio::test]
    async fn test_mount_opens_with_token() {
        let (session, remote, _remotes) = mounted().await;
        assert_eq!(
            session.state(),
            ControllerState::Initialized(ConnectionState::Connected)
        );
        assert_eq!(remote.endpoint.as_str(), "ws://backend/ai/chat/default?token=tk");
        assert_eq!(
            session.endpoint().map(Url::as_str),
            Some("ws://backend/ai/chat/default")
        );
    }

    #[tokio::test]
    async fn test_fragments_merge_into_one_reply() {
        let (mut session, remote, _remotes) = mounted().await;
        for fragment in ["Hel", "lo", " world"] {
            remote.push_text(fragment);
            session.next_event().await;
        }
        assert_eq!(roles(&session), vec![(TranscriptRole::Agent, "Hello world")]);
    }

    #[tokio::test]
    async fn test_user_turn_closes_agent_turn() {
        let (mut session, mut remote, _remotes) = mounted().await;

        remote.push_text("A");
        session.next_event().await;
        assert_eq!(session.submit("hi"), SubmitOutcome::Sent);
        remote.push_text("B");
        session.next_event().await;

        assert_eq!(
            roles(&session),
            vec![
                (TranscriptRole::Agent, "A"),
                (TranscriptRole::User, "hi"),
                (TranscriptRole::Agent, "B"),
            ]
        );
        assert_eq!(remote.drain_sent(), vec!["hi".to_string()]);
    }

    #[tokio::test]
    async fn test_echo_while_disconnected_or_connecting() {
        let (connector, mut remotes) = FakeConnector::new();
        let mut session = SessionController::new(&config(), connector, Credentials::default()).unwrap();

        assert_eq!(session.submit("ping"), SubmitOutcome::EchoedOnly);
        assert_eq!(session.status(), ConnectionState::Disconnected);

        session.mount(&params("default")).unwrap();
        assert_eq!(session.status(), ConnectionState::Connecting);
        assert_eq!(session.submit("ping"), SubmitOutcome::EchoedOnly);
        assert_eq!(session.submit("ping"), SubmitOutcome::EchoedOnly);

        session.next_event().await;
        let mut remote = remotes.recv().await.unwrap();
        assert!(remote.drain_sent().is_empty());
        assert_eq!(
            roles(&session),
            vec![
                (TranscriptRole::User, "ping"),
                (TranscriptRole::User, "ping"),
                (TranscriptRole::User, "ping"),
            ]
        );
        assert!(session.transcript().iter().all(TranscriptEntry::is_finalized));
    }

    #[tokio::test]
    async fn test_close_twice_is_one_transition() {
        let (mut session, remote, _remotes) = mounted().await;
        remote.push_text("kept");
        session.next_event().await;

        let mut transitions = session.subscribe_transitions();
        session.close();
        session.close();

        assert_eq!(transitions.try_recv().ok(), Some(ConnectionState::Disconnected));
        assert!(transitions.try_recv().is_err());
        assert_eq!(session.state(), ControllerState::TornDown);
        assert_eq!(roles(&session), vec![(TranscriptRole::Agent, "kept")]);
        assert_eq!(session.next_event().await, None);
        assert!(matches!(
            session.mount(&params("default")),
            Err(ChatError::SessionTornDown)
        ));
    }

    #[tokio::test]
    async fn test_malformed_frame_adds_an_entry() {
        let (mut session, remote, _remotes) = mounted().await;
        remote.push_text("ok");
        session.next_event().await;

        let before = session.transcript().len();
        remote.push_binary(&[0xc3, 0x28]);
        session.next_event().await;

        assert_eq!(session.transcript().len(), before + 1);
        assert_eq!(session.aggregator_stats().degraded, 1);
    }

    #[tokio::test]
    async fn test_transcript_only_grows_and_roles_are_stable() {
        let (mut session, remote, _remotes) = mounted().await;
        let script: [(bool, &str); 8] = [
            (false, "a"),
            (false, "b"),
            (true, "q1"),
            (true, "q2"),
            (false, "c"),
            (true, "  "),
            (false, ""),
            (false, "d"),
        ];

        let mut previous: Vec<TranscriptRole> = Vec::new();
        for (is_user, text) in script {
            if is_user {
                session.submit(text);
            } else {
                remote.push_text(text);
                session.next_event().await;
            }
            let current: Vec<TranscriptRole> =
                session.transcript().iter().map(TranscriptEntry::role).collect();
            assert!(current.len() >= previous.len());
            assert_eq!(&current[..previous.len()], previous.as_slice());
            previous = current;
        }
        assert_eq!(previous.len(), 4);
    }

    #[tokio::test]
    async fn test_remote_hang_up_keeps_transcript_and_does_not_reconnect() {
        let (mut session, mut remote, mut remotes) = mounted().await;
        remote.push_text("partial ");
        remote.push_text("answer");
        session.next_event().await;
        session.next_event().await;

        remote.hang_up();
        assert_eq!(session.next_event().await, Some(ConnectionEvent::Closed));
        assert_eq!(session.status(), ConnectionState::Disconnected);
        assert_eq!(
            session.state(),
            ControllerState::Initialized(ConnectionState::Disconnected)
        );
        assert_eq!(roles(&session), vec![(TranscriptRole::Agent, "partial answer")]);

        assert_eq!(session.submit("still there?"), SubmitOutcome::EchoedOnly);
        assert_eq!(session.next_event().await, None);
        assert!(remote.drain_sent().is_empty());
        assert!(remotes.try_recv().is_err());
        assert_eq!(
            roles(&session),
            vec![
                (TranscriptRole::Agent, "partial answer"),
                (TranscriptRole::User, "still there?"),
            ]
        );
    }

    #[tokio::test]
    async fn test_transport_error_keeps_transcript_and_does_not_reconnect() {
        let (mut session, remote, mut remotes) = mounted().await;
        remote.push_text("streamed");
        session.next_event().await;

        remote.fail();
        assert!(matches!(session.next_event().await, Some(ConnectionEvent::Errored(_))));
        assert_eq!(session.status(), ConnectionState::Errored);
        assert!(!session.is_live());

        assert_eq!(session.submit("retry?"), SubmitOutcome::EchoedOnly);
        assert_eq!(session.next_event().await, None);
        assert_eq!(session.status(), ConnectionState::Errored);
        assert!(remotes.try_recv().is_err());
        assert_eq!(
            roles(&session),
            vec![(TranscriptRole::Agent, "streamed"), (TranscriptRole::User, "retry?")]
        );
    }

    #[tokio::test]
    async fn test_endpoint_change_reopens() {
        let (mut session, _first, mut remotes) = mounted().await;

        assert!(!session.set_endpoint_params(&params("default")).unwrap());
        assert!(session.set_endpoint_params(&params("kube-system")).unwrap());

        assert_eq!(session.next_event().await, Some(ConnectionEvent::Opened));
        let second = remotes.recv().await.unwrap();
        assert_eq!(second.endpoint.as_str(), "ws://backend/ai/chat/kube-system?token=tk");
    }

    #[tokio::test]
    async fn test_bad_endpoint_surfaces_as_errored() {
        let (connector, _remotes) = FakeConnector::new();
        let mut session = SessionController::new(&config(), connector, Credentials::default()).unwrap();

        assert!(session.mount(&BTreeMap::new()).is_ok());
        assert_eq!(session.status(), ConnectionState::Errored);
        assert!(!session.is_live());
        assert_eq!(session.next_event().await, None);
    }

    #[tokio::test]
    async fn test_snapshots_are_pushed() {
        let (mut session, remote, _remotes) = mounted().await;
        let mut snapshots = session.subscribe();

        remote.push_text("streamed");
        session.next_event().await;

        assert!(snapshots.has_changed().unwrap());
        let snapshot = snapshots.borrow_and_update().clone();
        assert_eq!(snapshot.status, ConnectionState::Connected);
        assert_eq!(snapshot.transcript.len(), 1);
        assert_eq!(snapshot.transcript[0].content(), "streamed");
    }

    #[tokio::test]
    async fn test_credentials_are_read_on_every_open() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let provider = move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Some(format!("t{n}"))
        };

        let (connector, mut remotes) = FakeConnector::new();
        let mut session = SessionController::new(&config(), connector, provider).unwrap();
        session.mount(&params("a")).unwrap();
        session.set_endpoint_params(&params("b")).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let _ = remotes.recv().await.unwrap();
        let second = remotes.recv().await.unwrap();
        assert_eq!(second.endpoint.as_str(), "ws://backend/ai/chat/b?token=t1");
    }
}
