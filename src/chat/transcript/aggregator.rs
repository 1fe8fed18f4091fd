//! Folds inbound fragments into the transcript.
//!
//! Merge rule: when the last entry is an open Agent entry the fragment is
//! concatenated onto it, otherwise a new Agent entry is started. There is no
//! end-of-turn marker on the wire; a turn closes structurally when the next
//! User entry or a fresh Agent entry is appended.

use tracing::{trace, warn};

use crate::chat::connection::transport::InboundFrame;
use crate::chat::transcript::store::TranscriptStore;

/// What a single fragment did to the transcript.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FragmentOutcome {
    /// A new Agent entry was started.
    Created,
    /// The open Agent entry grew.
    Extended,
    /// A non-text payload was coerced and appended as its own entry.
    Degraded,
    /// An empty text frame carried nothing to merge.
    Skipped,
}

/// Running counters for logging.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct AggregatorStats {
    /// Fragments seen.
    pub fragments: u64,
    /// Agent entries created.
    pub created: u64,
    /// Fragments merged into an open entry.
    pub extended: u64,
    /// Non-text fragments appended in degraded form.
    pub degraded: u64,
    /// Empty text fragments.
    pub skipped: u64,
}

/// Fragment aggregator.
#[derive(Debug, Default)]
pub struct FragmentAggregator {
    stats: AggregatorStats,
}

impl FragmentAggregator {
    /// Create an aggregator with zeroed counters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            stats: AggregatorStats {
                fragments: 0,
                created: 0,
                extended: 0,
                degraded: 0,
                skipped: 0,
            },
        }
    }

    /// Counters so far.
    #[must_use]
    pub const fn stats(&self) -> AggregatorStats {
        self.stats
    }

    /// Apply one inbound frame, in arrival order.
    pub fn on_fragment(&mut self, store: &mut TranscriptStore, frame: InboundFrame) -> FragmentOutcome {
        self.stats.fragments += 1;
        let outcome = match frame {
            InboundFrame::Text(text) if text.is_empty() => FragmentOutcome::Skipped,
            InboundFrame::Text(text) => Self::merge(store, &text),
            // a non-text frame always lands somewhere, even when it carries nothing
            InboundFrame::Binary(bytes) => match String::from_utf8(bytes) {
                Ok(text) => Self::merge(store, &text),
                Err(err) => {
                    let lossy = String::from_utf8_lossy(err.as_bytes()).into_owned();
                    warn!(
                        bytes = err.as_bytes().len(),
                        "non-text fragment, appending lossy text"
                    );
                    store.push_degraded_agent(lossy);
                    FragmentOutcome::Degraded
                }
            },
        };

        match outcome {
            FragmentOutcome::Created => self.stats.created += 1,
            FragmentOutcome::Extended => self.stats.extended += 1,
            FragmentOutcome::Degraded => self.stats.degraded += 1,
            FragmentOutcome::Skipped => self.stats.skipped += 1,
        }
        trace!(?outcome, entries = store.len(), "fragment applied");
        outcome
    }

    fn merge(store: &mut TranscriptStore, text: &str) -> FragmentOutcome {
        if store.append_to_open(text) {
            FragmentOutcome::Extended
        } else {
            store.open_agent(text);
            FragmentOutcome::Created
        }
    }
}
