use serde::{ Serialize, Deserialize };
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A fragment of a message. Only text and source links are produced here;
/// anything else a caller sends is kept as `Other` and ignored upstream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MessagePart {
    #[serde(rename = "text")] Text {
        text: String,
    },
    #[serde(rename = "source-url", rename_all = "camelCase")] SourceUrl {
        source_id: String,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    #[serde(other)]
    Other,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::User,
            parts: vec![MessagePart::Text { text: text.into() }],
        }
    }

    pub fn assistant(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Assistant,
            parts: Vec::new(),
        }
    }

    /// Concatenated text of every text part, in order.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                MessagePart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Appends to the trailing text part, opening a new one if the message
    /// does not end in text.
    pub fn append_text(&mut self, delta: &str) {
        if let Some(MessagePart::Text { text }) = self.parts.last_mut() {
            text.push_str(delta);
            return;
        }
        self.parts.push(MessagePart::Text { text: delta.to_string() });
    }
}

/// Request body accepted by the relay endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

#[derive(Clone, Debug, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn last_assistant_mut(&mut self) -> Option<&mut ChatMessage> {
        match self.messages.last_mut() {
            Some(m) if m.role == Role::Assistant => Some(m),
            _ => None,
        }
    }

    /// The trailing assistant message, opening a fresh one when the
    /// conversation does not end with one.
    pub fn last_assistant_or_insert(&mut self) -> &mut ChatMessage {
        let ends_with_assistant = matches!(self.messages.last(), Some(m) if m.role == Role::Assistant);
        if !ends_with_assistant {
            self.messages.push(ChatMessage::assistant(Uuid::new_v4().to_string()));
        }
        let last = self.messages.len() - 1;
        &mut self.messages[last]
    }

    pub fn to_request(&self) -> ChatRequest {
        ChatRequest { messages: self.messages.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ui_message_with_unknown_parts() {
        let raw = r#"{
            "id": "m1",
            "role": "user",
            "parts": [
                {"type": "step-start"},
                {"type": "text", "text": "hello"}
            ]
        }"#;
        let msg: ChatMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.parts.len(), 2);
        assert_eq!(msg.parts[0], MessagePart::Other);
        assert_eq!(msg.text(), "hello");
    }

    #[test]
    fn append_text_extends_trailing_part() {
        let mut msg = ChatMessage::assistant("a1");
        msg.append_text("Hel");
        msg.append_text("lo");
        assert_eq!(msg.parts.len(), 1);

        msg.parts.push(MessagePart::SourceUrl {
            source_id: "s1".into(),
            url: "https://x402.org".into(),
            title: None,
        });
        msg.append_text("!");
        assert_eq!(msg.parts.len(), 3);
        assert_eq!(msg.text(), "Hello!");
    }

    #[test]
    fn source_part_uses_camel_case_fields() {
        let part = MessagePart::SourceUrl {
            source_id: "s1".into(),
            url: "https://example.com".into(),
            title: Some("Example".into()),
        };
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(json["type"], "source-url");
        assert_eq!(json["sourceId"], "s1");
    }

    #[test]
    fn last_assistant_only_when_last() {
        let mut conv = Conversation::new();
        conv.push(ChatMessage::user("hi"));
        assert!(conv.last_assistant_mut().is_none());
        conv.push(ChatMessage::assistant("a1"));
        assert!(conv.last_assistant_mut().is_some());
        assert_eq!(conv.to_request().messages.len(), 2);

        conv.push(ChatMessage::user("more"));
        conv.last_assistant_or_insert().append_text("x");
        assert_eq!(conv.len(), 4);
        conv.last_assistant_or_insert().append_text("y");
        assert_eq!(conv.len(), 4);
        assert_eq!(conv.messages()[3].text(), "xy");
    }
}
