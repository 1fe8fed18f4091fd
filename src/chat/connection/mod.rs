//! Streaming connection: endpoint derivation, transport seam, lifecycle.

pub mod endpoint;
pub mod manager;
pub mod state;
pub mod transport;
pub mod websocket;

pub use endpoint::{EndpointTemplate, TOKEN_PARAM, authorize};
pub use manager::ConnectionManager;
pub use state::{ConnectionEvent, ConnectionState};
pub use transport::{
    Connector, FrameSink, FrameStream, InboundFrame, TransportChannels, TransportFuture,
};
pub use websocket::WebSocketConnector;
