//! Websocket connector backed by `tokio-tungstenite`.

use futures::future::ready;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tracing::debug;
use url::Url;

use crate::chat::connection::transport::{Connector, InboundFrame, TransportChannels, TransportFuture};
use crate::chat::core::errors::{ChatError, ChatResult};

/// Production connector: one websocket per `connect` call.
#[derive(Clone, Copy, Debug, Default)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    fn connect(&self, endpoint: Url) -> TransportFuture<'static, ChatResult<TransportChannels>> {
        Box::pin(async move {
            let (stream, response) = connect_async(endpoint.as_str()).await?;
            debug!(status = %response.status(), "websocket handshake complete");
            let (sink, source) = stream.split();

            let sink = sink.with(|text: String| ready(Ok::<_, ChatError>(WsMessage::text(text))));
            let stream = source
                .take_while(|message| ready(!matches!(message, Ok(WsMessage::Close(_)))))
                .filter_map(|message| ready(into_frame(message)))
                .boxed();

            Ok(TransportChannels {
                sink: Box::pin(sink),
                stream,
            })
        })
    }
}

fn into_frame(message: Result<WsMessage, tungstenite::Error>) -> Option<ChatResult<InboundFrame>> {
    match message {
        Ok(WsMessage::Text(text)) => Some(Ok(InboundFrame::Text(text.as_str().to_owned()))),
        Ok(WsMessage::Binary(bytes)) => Some(Ok(InboundFrame::Binary(bytes.to_vec()))),
        Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Close(_) | WsMessage::Frame(_)) => {
            None
        }
        Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => None,
        Err(err) => Some(Err(err.into())),
    }
}
