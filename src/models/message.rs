use actix_web::web::Bytes;

use crate::constants;

/// A message traveling through a session's send queue.
///
/// The body is opaque to the gateway. The content type decides the
/// WebSocket frame type on the wire; a `last_word` message instructs the
/// send loop to close the session right after the write succeeds.
#[derive(Debug, Clone)]
pub struct Message {
    pub body: Bytes,
    pub content_type: String,
    /// Key of the target session, filled in during fan-out.
    pub session: Option<String>,
    pub last_word: bool,
}

impl Message {
    pub fn new(body: Bytes, content_type: impl Into<String>) -> Self {
        Message {
            body,
            content_type: content_type.into(),
            session: None,
            last_word: false,
        }
    }

    /// An empty terminal message. Delivering it drains ahead-of-it sends
    /// first, then closes the session.
    pub fn last_word() -> Self {
        Message {
            body: Bytes::new(),
            content_type: String::new(),
            session: None,
            last_word: true,
        }
    }

    pub fn for_session(mut self, key: impl Into<String>) -> Self {
        self.session = Some(key.into());
        self
    }

    /// Whether this message goes out as a binary frame.
    pub fn is_binary(&self) -> bool {
        is_binary_content_type(&self.content_type)
    }
}

/// `application/octet-stream` selects a binary frame; everything else is
/// sent as text. The match is case-insensitive and ignores parameters.
pub fn is_binary_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim();
    essence.eq_ignore_ascii_case(constants::CONTENT_TYPE_BINARY)
}
