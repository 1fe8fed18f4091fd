//! Streaming chat client.
//!
//! One full-duplex connection to a conversational backend, with inbound
//! fragments folded into an ordered transcript:
//! - `core`: configuration, errors and identifiers
//! - `transcript`: entries, the append-only store and fragment aggregation
//! - `connection`: endpoint derivation, transport seam, websocket connector and lifecycle
//! - `dispatch`: outbound submit path with optimistic echo
//! - `credentials`: injected credential providers
//! - `session`: the controller composing all of the above

pub mod connection;
pub mod core;
pub mod credentials;
pub mod dispatch;
pub mod session;
pub mod transcript;

pub use connection::{
    ConnectionEvent, ConnectionManager, ConnectionState, Connector, EndpointTemplate,
    InboundFrame, TransportChannels, WebSocketConnector,
};
pub use self::core::{ChatConfig, ChatError, ChatResult, SessionId};
pub use credentials::{CredentialProvider, Credentials};
pub use dispatch::{OutboundDispatcher, SubmitOutcome};
pub use session::{ControllerState, SessionController, SessionSnapshot};
pub use transcript::{
    AggregatorStats, FragmentAggregator, FragmentOutcome, TranscriptEntry, TranscriptRole,
    TranscriptStore,
};
