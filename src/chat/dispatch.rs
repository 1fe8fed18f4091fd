//! Outbound dispatcher: user text to the wire, with optimistic echo.
//!
//! The send and the local echo are independent. When the connection is not
//! open the frame is dropped at the transport boundary, but the User entry is
//! still appended so the transcript shows what the user attempted to say.

use tracing::debug;

use crate::chat::connection::manager::ConnectionManager;
use crate::chat::connection::transport::Connector;
use crate::chat::transcript::store::TranscriptStore;

/// Result of one submit.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SubmitOutcome {
    /// Empty or whitespace-only input; nothing happened.
    Ignored,
    /// Handed to the transport and echoed.
    Sent,
    /// Echoed locally only; the transport was not open.
    EchoedOnly,
}

/// Pending input buffer plus the submit path.
#[derive(Debug, Default)]
pub struct OutboundDispatcher {
    pending: String,
}

impl OutboundDispatcher {
    /// Create a dispatcher with an empty input buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: String::new(),
        }
    }

    /// Text composed but not yet submitted.
    #[must_use]
    pub fn pending_input(&self) -> &str {
        &self.pending
    }

    /// Replace the input buffer.
    pub fn compose(&mut self, text: impl Into<String>) {
        self.pending = text.into();
    }

    /// Add a line to the input buffer, newline-separated.
    pub fn push_line(&mut self, line: &str) {
        if !self.pending.is_empty() {
            self.pending.push('\n');
        }
        self.pending.push_str(line);
    }

    /// Submit whatever is in the input buffer.
    pub fn submit_pending<C: Connector>(
        &mut self,
        connection: &ConnectionManager<C>,
        store: &mut TranscriptStore,
    ) -> SubmitOutcome {
        let text = self.pending.clone();
        self.submit(&text, connection, store)
    }

    /// Send `text` verbatim, echo it as a User entry, then clear the buffer.
    pub fn submit<C: Connector>(
        &mut self,
        text: &str,
        connection: &ConnectionManager<C>,
        store: &mut TranscriptStore,
    ) -> SubmitOutcome {
        if text.trim().is_empty() {
            return SubmitOutcome::Ignored;
        }

        let sent = connection.send(text);
        store.push_user(text);
        self.pending.clear();

        debug!(sent, chars = text.len(), "user message submitted");
        if sent {
            SubmitOutcome::Sent
        } else {
            SubmitOutcome::EchoedOnly
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::chat::connection::transport::testing::FakeConnector;
    use crate::chat::credentials::Credentials;
    use crate::chat::transcript::entry::TranscriptRole;
    use futures::StreamExt;
    use url::Url;

    #[test]
    fn test_whitespace_is_ignored_and_buffer_kept() {
        let (connector, _remotes) = FakeConnector::new();
        let connection = ConnectionManager::new(connector, Duration::from_secs(1), 4);
        let mut store = TranscriptStore::new();
        let mut dispatcher = OutboundDispatcher::new();

        dispatcher.compose("   \n\t");
        assert_eq!(dispatcher.submit_pending(&connection, &mut store), SubmitOutcome::Ignored);
        assert!(store.is_empty());
        assert_eq!(dispatcher.pending_input(), "   \n\t");
    }

    #[test]
    fn test_echo_without_connection() {
        let (connector, _remotes) = FakeConnector::new();
        let connection = ConnectionManager::new(connector, Duration::from_secs(1), 4);
        let mut store = TranscriptStore::new();
        let mut dispatcher = OutboundDispatcher::new();

        dispatcher.push_line("first");
        dispatcher.push_line("second");
        let outcome = dispatcher.submit_pending(&connection, &mut store);

        assert_eq!(outcome, SubmitOutcome::EchoedOnly);
        assert_eq!(store.len(), 1);
        let entry = &store.entries()[0];
        assert_eq!(entry.role(), TranscriptRole::User);
        assert_eq!(entry.content(), "first\nsecond");
        assert!(entry.is_finalized());
        assert!(dispatcher.pending_input().is_empty());
    }

    #[tokio::test]
    async fn test_text_is_sent_verbatim() {
        let (connector, mut remotes) = FakeConnector::new();
        let mut connection = ConnectionManager::new(connector, Duration::from_secs(1), 4);
        connection.open(&Url::parse("ws://backend/chat").unwrap(), &Credentials::default());
        connection.next_event().await;

        let mut store = TranscriptStore::new();
        let mut dispatcher = OutboundDispatcher::new();
        let outcome = dispatcher.submit("  padded  ", &connection, &mut store);

        assert_eq!(outcome, SubmitOutcome::Sent);
        let mut remote = remotes.recv().await.unwrap();
        assert_eq!(remote.sent.next().await.as_deref(), Some("  padded  "));
        assert_eq!(store.entries()[0].content(), "  padded  ");
    }
}
