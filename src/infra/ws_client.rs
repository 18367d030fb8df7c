use crate::app::ports::{StreamConnectorPort, StreamFrame, StreamSession};
use crate::error::Result;
use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

/// Opens the `/ws` push connection with tokio-tungstenite.
///
/// No subscription message is sent after the handshake: the URL alone
/// selects the feed.
pub struct TungsteniteConnector {
    url: String,
}

impl TungsteniteConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl StreamConnectorPort for TungsteniteConnector {
    async fn connect(&self) -> Result<Box<dyn StreamSession>> {
        let (ws_stream, response) = connect_async(self.url.as_str()).await?;
        debug!(url = %self.url, status = %response.status(), "WebSocket handshake complete");
        Ok(Box::new(TungsteniteSession { ws_stream }))
    }
}

struct TungsteniteSession {
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl StreamSession for TungsteniteSession {
    async fn next_frame(&mut self) -> Option<Result<StreamFrame>> {
        let msg = match self.ws_stream.next().await? {
            Ok(msg) => msg,
            Err(e) => return Some(Err(e.into())),
        };
        Some(Ok(match msg {
            Message::Text(text) => StreamFrame::Text(text),
            Message::Binary(bytes) => StreamFrame::Binary(bytes),
            Message::Close(_) => StreamFrame::Close,
            _ => StreamFrame::Control,
        }))
    }
}
