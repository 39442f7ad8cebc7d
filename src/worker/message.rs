//! `message` topic handler: forwards chat messages to the gateway.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::broker::EventHandler;
use crate::domain::{BrokerEvent, ChatMessage};
use crate::error::HandlerError;
use crate::rpc::MessagePusher;

/// Decodes each event as a [`ChatMessage`] and pushes it through a
/// [`MessagePusher`].
pub struct MessageForwarder {
    pusher: Arc<dyn MessagePusher>,
}

impl MessageForwarder {
    /// Creates a forwarder calling `pusher`.
    #[must_use]
    pub fn new(pusher: Arc<dyn MessagePusher>) -> Self {
        Self { pusher }
    }
}

impl fmt::Debug for MessageForwarder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageForwarder").finish_non_exhaustive()
    }
}

#[async_trait]
impl EventHandler for MessageForwarder {
    async fn handle(&self, event: &BrokerEvent) -> Result<(), HandlerError> {
        let message: ChatMessage = serde_json::from_slice(&event.payload)?;
        let response = self.pusher.push_message(&message).await?;
        tracing::info!(
            sender = %message.sender,
            recipients = ?message.recipients,
            delivered = response.delivered,
            "message pushed to gateway"
        );
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::domain::Topic;
    use crate::error::RpcError;
    use crate::rpc::PushMessageResponse;

    #[derive(Debug, Default)]
    struct Capture {
        pushed: Mutex<Vec<ChatMessage>>,
        unavailable: bool,
    }

    #[async_trait]
    impl MessagePusher for Capture {
        async fn push_message(
            &self,
            message: &ChatMessage,
        ) -> Result<PushMessageResponse, RpcError> {
            if self.unavailable {
                return Err(RpcError::Status {
                    status: 503,
                    body: String::new(),
                });
            }
            if let Ok(mut pushed) = self.pushed.lock() {
                pushed.push(message.clone());
            }
            Ok(PushMessageResponse {
                success: true,
                delivered: message.recipients.len(),
            })
        }
    }

    #[tokio::test]
    async fn forwards_decoded_message() {
        let capture = Arc::new(Capture::default());
        let forwarder = MessageForwarder::new(Arc::clone(&capture) as Arc<dyn MessagePusher>);
        let msg = ChatMessage::new("A", ["B"], "hi");
        let Ok(event) = BrokerEvent::json(Topic::Message, "A", &msg) else {
            panic!("serializable");
        };

        assert!(forwarder.handle(&event).await.is_ok());
        let pushed = capture.pushed.lock().map(|p| p.clone()).unwrap_or_default();
        assert_eq!(pushed, vec![msg]);
    }

    #[tokio::test]
    async fn undecodable_payload_is_not_forwarded() {
        let capture = Arc::new(Capture::default());
        let forwarder = MessageForwarder::new(Arc::clone(&capture) as Arc<dyn MessagePusher>);
        let Ok(event) = BrokerEvent::json(Topic::Message, "A", &"plain string") else {
            panic!("serializable");
        };

        assert!(matches!(forwarder.handle(&event).await, Err(HandlerError::Decode(_))));
        assert!(capture.pushed.lock().map(|p| p.is_empty()).unwrap_or(false));
    }

    #[tokio::test]
    async fn rpc_failure_surfaces_as_handler_error() {
        let forwarder = MessageForwarder::new(Arc::new(Capture {
            unavailable: true,
            ..Capture::default()
        }));
        let Ok(event) = BrokerEvent::json(Topic::Message, "A", &ChatMessage::new("A", ["B"], "x"))
        else {
            panic!("serializable");
        };
        assert!(matches!(forwarder.handle(&event).await, Err(HandlerError::Rpc(_))));
    }
}
