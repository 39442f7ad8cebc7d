//! [`ClientSink`] over the write half of an axum WebSocket.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::SinkExt;
use futures_util::stream::SplitSink;

use crate::domain::ClientSink;
use crate::error::ConnectionError;

#[async_trait]
impl ClientSink for SplitSink<WebSocket, Message> {
    async fn send_text(&mut self, text: String) -> Result<(), ConnectionError> {
        self.send(Message::text(text))
            .await
            .map_err(|e| ConnectionError::Write(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), ConnectionError> {
        SinkExt::close(self)
            .await
            .map_err(|e| ConnectionError::Close(e.to_string()))
    }
}
