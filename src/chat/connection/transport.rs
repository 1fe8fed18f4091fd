//! Transport seam between the connection manager and the network.

use std::future::Future;
use std::pin::Pin;

use futures::Sink;
use futures::stream::BoxStream;
use url::Url;

use crate::chat::core::errors::{ChatError, ChatResult};

/// Boxed future type for transport operations.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outbound half: one text frame per item.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = ChatError> + Send>>;

/// Inbound half: data frames in arrival order; ends on close.
pub type FrameStream = BoxStream<'static, ChatResult<InboundFrame>>;

/// Payload of one inbound transport frame.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InboundFrame {
    /// Text frame.
    Text(String),
    /// Binary frame; may or may not be valid UTF-8.
    Binary(Vec<u8>),
}

/// Both halves of an open transport.
pub struct TransportChannels {
    /// Outbound frames.
    pub sink: FrameSink,
    /// Inbound frames.
    pub stream: FrameStream,
}

/// Opens transports to a streaming endpoint.
pub trait Connector: Send + Sync {
    /// Perform the handshake against `endpoint`.
    ///
    /// # Errors
    /// The returned future fails if the endpoint is unreachable or rejects
    /// the handshake.
    fn connect(&self, endpoint: Url) -> TransportFuture<'static, ChatResult<TransportChannels>>;
}
