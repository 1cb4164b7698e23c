//! WebSocket implementation of the event channel.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::info;

use crate::channel::{Connector, EventChannel};
use crate::error::NetError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Dials the server's event stream endpoint over `ws://` or `wss://`.
pub struct WsConnector {
    url: String,
    auth_token: Option<String>,
}

impl WsConnector {
    pub fn new(url: impl Into<String>, auth_token: Option<String>) -> Self {
        Self {
            url: url.into(),
            auth_token,
        }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn EventChannel>, NetError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| NetError::ConnectFailed(e.to_string()))?;
        if let Some(token) = &self.auth_token {
            let value = format!("Bearer {token}")
                .parse()
                .map_err(|_| NetError::ConnectFailed("auth token is not header-safe".into()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (ws, _response) = connect_async(request)
            .await
            .map_err(|e| NetError::ConnectFailed(e.to_string()))?;
        info!(url = %self.url, "Event stream connected");

        let (sink, stream) = ws.split();
        Ok(Box::new(WsChannel { sink, stream }))
    }
}

struct WsChannel {
    sink: SplitSink<WsStream, Message>,
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl EventChannel for WsChannel {
    async fn send(&mut self, frame: String) -> Result<(), NetError> {
        self.sink
            .send(Message::Text(frame))
            .await
            .map_err(|_| NetError::ChannelClosed)
    }

    async fn recv(&mut self) -> Option<String> {
        while let Some(frame) = self.stream.next().await {
            match frame {
                Ok(Message::Text(text)) => return Some(text),
                Ok(Message::Close(_)) | Err(_) => return None,
                // Pings are answered by the protocol layer; binary frames
                // are not part of this protocol.
                Ok(_) => continue,
            }
        }
        None
    }

    async fn close(&mut self) {
        let _ = self.sink.send(Message::Close(None)).await;
        let _ = self.sink.close().await;
    }
}
