//! Inbound and outbound message envelopes.
//!
//! The core consumes `InboundMessage` from an external transport connector
//! (webhook layer, CLI, test driver) and produces `Reply` for an external
//! rendering/delivery collaborator. No wire format is implied here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A normalized message from one user, as handed over by the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Stable channel address of the sender (phone number, peer id, …).
    pub user_id: String,
    /// Raw message text or menu selection.
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(user_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// What the core hands back to the delivery collaborator for one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    pub user_id: String,
    pub text: String,
    /// Quick-reply options the channel may render as buttons. Empty when
    /// the turn has no menu to offer.
    #[serde(default)]
    pub suggested_replies: Vec<String>,
}

impl Reply {
    pub fn text(user_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            text: text.into(),
            suggested_replies: Vec::new(),
        }
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggested_replies = suggestions;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_builder_attaches_suggestions() {
        let reply = Reply::text("u1", "pick one")
            .with_suggestions(vec!["daily horoscope".into(), "tarot".into()]);
        assert_eq!(reply.user_id, "u1");
        assert_eq!(reply.suggested_replies.len(), 2);
    }

    #[test]
    fn inbound_message_round_trips() {
        let msg = InboundMessage::new("u9", "  hello ");
        let json = serde_json::to_string(&msg).unwrap();
        let back: InboundMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back.user_id, "u9");
        assert_eq!(back.text, "  hello ");
    }
}
