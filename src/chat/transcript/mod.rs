//! Transcript model, store and fragment aggregation.

pub mod aggregator;
pub mod entry;
pub mod store;

pub use aggregator::{AggregatorStats, FragmentAggregator, FragmentOutcome};
pub use entry::{TranscriptEntry, TranscriptRole};
pub use store::TranscriptStore;
