use std::time::Duration;

use actix_web::http::header::HeaderName;
use actix_web::web::Bytes;
use async_trait::async_trait;
use log::debug;

use crate::constants;
use crate::error::GatewayError;

/// A frame received from a client, on its way upstream.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub body: Bytes,
    pub content_type: &'static str,
    /// Key of the session the frame arrived on.
    pub session: String,
}

impl ReceivedMessage {
    pub fn text(session: impl Into<String>, body: Bytes) -> Self {
        ReceivedMessage {
            body,
            content_type: constants::CONTENT_TYPE_TEXT,
            session: session.into(),
        }
    }

    pub fn binary(session: impl Into<String>, body: Bytes) -> Self {
        ReceivedMessage {
            body,
            content_type: constants::CONTENT_TYPE_BINARY,
            session: session.into(),
        }
    }
}

/// Destination of upstream frames. The recv loop hands every inbound
/// frame to a `Receiver` and carries on regardless of the outcome; a
/// failing receiver never tears the session down.
#[async_trait(?Send)]
pub trait Receiver {
    async fn receive(&self, message: ReceivedMessage) -> Result<(), GatewayError>;
}

/// Swallows frames when no receive callback is configured. The frame body
/// is reference-counted, so dropping it here costs nothing per message.
pub struct DiscardReceiver;

#[async_trait(?Send)]
impl Receiver for DiscardReceiver {
    async fn receive(&self, message: ReceivedMessage) -> Result<(), GatewayError> {
        debug!(
            "discarding {} byte frame from session {}",
            message.body.len(),
            message.session
        );
        Ok(())
    }
}

/// POSTs each frame to the configured receive callback, carrying the
/// session key and this gateway's endpoint so the backend can answer via
/// the admin surface.
pub struct CallbackReceiver {
    client: awc::Client,
    url: String,
    session_header: HeaderName,
    endpoint: String,
    timeout: Option<Duration>,
}

impl CallbackReceiver {
    pub fn new(
        client: awc::Client,
        url: impl Into<String>,
        session_header: HeaderName,
        endpoint: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Self {
        CallbackReceiver {
            client,
            url: url.into(),
            session_header,
            endpoint: endpoint.into(),
            timeout,
        }
    }
}

#[async_trait(?Send)]
impl Receiver for CallbackReceiver {
    async fn receive(&self, message: ReceivedMessage) -> Result<(), GatewayError> {
        let mut req = self
            .client
            .post(self.url.as_str())
            .insert_header(("Content-Type", message.content_type))
            .insert_header((self.session_header.clone(), message.session.as_str()))
            .insert_header((constants::ENDPOINT_HEADER, self.endpoint.as_str()));
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }

        let resp = req
            .send_body(message.body)
            .await
            .map_err(|e| GatewayError::CallbackTransport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(GatewayError::CallbackResponseNotOk {
                status: resp.status(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_web::test]
    async fn test_discard_receiver() {
        let receiver = DiscardReceiver;
        let msg = ReceivedMessage::text(
            "session_uuid",
            Bytes::from_static(b"hello upstream callback"),
        );
        assert!(receiver.receive(msg).await.is_ok());
    }

    #[test]
    fn test_received_message_content_types() {
        let text = ReceivedMessage::text("k", Bytes::new());
        assert_eq!(text.content_type, "text/plain");
        let bin = ReceivedMessage::binary("k", Bytes::new());
        assert_eq!(bin.content_type, "application/octet-stream");
    }
}
