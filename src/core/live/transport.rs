//! Realtime voice transport.
//!
//! The session only sees the [`LiveSink`]/[`LiveSource`] halves, so tests can
//! replay scripted server frames without a socket.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

use crate::api::live::{LiveServerMessage, RealtimeInputMessage, ServerContent, SetupMessage};
use crate::core::live::LiveError;
use crate::utils::url::append_query_param;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[async_trait]
pub trait LiveSink: Send {
    /// Sends one base64 PCM chunk as realtime input.
    async fn send_audio(&mut self, data: String) -> Result<(), LiveError>;

    async fn close(&mut self) -> Result<(), LiveError>;
}

#[async_trait]
pub trait LiveSource: Send {
    /// Next server content frame; `None` once the remote closed the stream.
    async fn next_message(&mut self) -> Result<Option<ServerContent>, LiveError>;
}

#[async_trait]
pub trait LiveConnector: Send + Sync {
    /// Opens the stream and completes the setup handshake.
    async fn connect(
        &self,
        setup: SetupMessage,
    ) -> Result<(Box<dyn LiveSink>, Box<dyn LiveSource>), LiveError>;
}

pub struct WebSocketConnector {
    url: String,
    api_key: String,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
        }
    }

    fn endpoint(&self) -> String {
        append_query_param(&self.url, "key", &self.api_key)
    }
}

#[async_trait]
impl LiveConnector for WebSocketConnector {
    async fn connect(
        &self,
        setup: SetupMessage,
    ) -> Result<(Box<dyn LiveSink>, Box<dyn LiveSource>), LiveError> {
        let (ws_stream, _) = connect_async(self.endpoint())
            .await
            .map_err(|err| LiveError::Connect(err.into()))?;
        let (mut ws_sender, ws_receiver) = ws_stream.split();

        let frame = serde_json::to_string(&setup)
            .map_err(|err| LiveError::Protocol(err.into()))?;
        ws_sender
            .send(WsMessage::Text(frame.into()))
            .await
            .map_err(|err| LiveError::Connect(err.into()))?;

        let mut source = WebSocketSource {
            receiver: ws_receiver,
            finished: false,
        };
        loop {
            match source.next_frame().await? {
                Some(message) if message.setup_complete.is_some() => break,
                Some(_) => continue,
                None => {
                    return Err(LiveError::Connect(
                        "stream closed before setup completed".into(),
                    ))
                }
            }
        }
        debug!("voice setup complete");

        Ok((
            Box::new(WebSocketSink { sender: ws_sender }),
            Box::new(source),
        ))
    }
}

struct WebSocketSink {
    sender: SplitSink<WsStream, WsMessage>,
}

#[async_trait]
impl LiveSink for WebSocketSink {
    async fn send_audio(&mut self, data: String) -> Result<(), LiveError> {
        let frame = serde_json::to_string(&RealtimeInputMessage::audio(data))
            .map_err(|err| LiveError::Protocol(err.into()))?;
        self.sender
            .send(WsMessage::Text(frame.into()))
            .await
            .map_err(|err| LiveError::Transport(err.into()))
    }

    async fn close(&mut self) -> Result<(), LiveError> {
        self.sender
            .close()
            .await
            .map_err(|err| LiveError::Transport(err.into()))
    }
}

struct WebSocketSource {
    receiver: SplitStream<WsStream>,
    finished: bool,
}

impl WebSocketSource {
    async fn next_frame(&mut self) -> Result<Option<LiveServerMessage>, LiveError> {
        if self.finished {
            return Ok(None);
        }
        while let Some(message) = self.receiver.next().await {
            let payload = match message {
                Ok(WsMessage::Text(text)) => text.as_bytes().to_vec(),
                Ok(WsMessage::Binary(bytes)) => bytes.to_vec(),
                Ok(WsMessage::Close(_)) => break,
                Ok(_) => continue,
                Err(err) => {
                    self.finished = true;
                    return Err(LiveError::Transport(err.into()));
                }
            };
            trace!(bytes = payload.len(), "voice frame");
            return serde_json::from_slice(&payload)
                .map(Some)
                .map_err(|err| LiveError::Protocol(err.into()));
        }
        self.finished = true;
        Ok(None)
    }
}

#[async_trait]
impl LiveSource for WebSocketSource {
    async fn next_message(&mut self) -> Result<Option<ServerContent>, LiveError> {
        loop {
            match self.next_frame().await? {
                Some(LiveServerMessage {
                    server_content: Some(content),
                    ..
                }) => return Ok(Some(content)),
                Some(_) => continue,
                None => return Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_is_appended_as_query() {
        let connector = WebSocketConnector::new("wss://example.test/ws", "k1");
        assert_eq!(connector.endpoint(), "wss://example.test/ws?key=k1");

        let connector = WebSocketConnector::new("wss://example.test/ws?alt=1", "k1");
        assert_eq!(connector.endpoint(), "wss://example.test/ws?alt=1&key=k1");
    }
}
