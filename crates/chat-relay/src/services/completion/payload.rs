use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::chat::{ChatMessage, ImageAttachment, Role};

/// Body of a chat-completions POST.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<RequestMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Message as sent upstream. Content is either a plain string or, for
/// image analysis, an array of typed parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestMessage {
    pub role: Role,
    pub content: MessageContent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

impl RequestMessage {
    /// User turn carrying a caption and an inline data-URL image.
    pub fn image(caption: impl Into<String>, image: &ImageAttachment) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: caption.into() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl { url: image.data_url() },
                },
            ]),
        }
    }
}

impl From<ChatMessage> for RequestMessage {
    fn from(message: ChatMessage) -> Self {
        Self {
            role: message.role,
            content: MessageContent::Text(message.content),
        }
    }
}

impl PartialEq<ChatMessage> for RequestMessage {
    fn eq(&self, other: &ChatMessage) -> bool {
        self.role == other.role
            && matches!(&self.content, MessageContent::Text(text) if *text == other.content)
    }
}

/// Text parts only; images are skipped.
impl fmt::Display for MessageContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Parts(parts) => {
                let mut first = true;
                for part in parts {
                    if let ContentPart::Text { text } = part {
                        if !first {
                            f.write_str(" ")?;
                        }
                        f.write_str(text)?;
                        first = false;
                    }
                }
                Ok(())
            }
        }
    }
}

/// System instruction, then the most recent `max_context_messages - 1`
/// context entries in original order, then the new user message.
pub fn assemble_messages(
    system_prompt: &str,
    context: &[ChatMessage],
    user_message: &str,
    max_context_messages: usize,
) -> Vec<ChatMessage> {
    let keep = max_context_messages.saturating_sub(1).min(context.len());
    let tail = &context[context.len() - keep..];

    let mut messages = Vec::with_capacity(keep + 2);
    messages.push(ChatMessage::system(system_prompt));
    messages.extend_from_slice(tail);
    messages.push(ChatMessage::user(user_message));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::Role;

    fn numbered(n: usize) -> Vec<ChatMessage> {
        (0..n).map(|i| ChatMessage::user(format!("m{}", i))).collect()
    }

    #[test]
    fn test_without_context() {
        let messages = assemble_messages("persona", &[], "hello", 20);

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], ChatMessage::system("persona"));
        assert_eq!(messages[1], ChatMessage::user("hello"));
    }

    #[test]
    fn test_with_short_context() {
        let context = vec![ChatMessage::user("before"), ChatMessage::assistant("reply")];
        let messages = assemble_messages("persona", &context, "now", 20);

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(&messages[1..3], &context[..]);
        assert_eq!(messages[3], ChatMessage::user("now"));
    }

    #[test]
    fn test_length_is_min_of_context_and_cap_plus_two() {
        for cap in [2usize, 3, 5, 20] {
            for len in [0usize, 1, cap - 1, cap, cap + 7] {
                let context = numbered(len);
                let messages = assemble_messages("s", &context, "u", cap);

                let kept = len.min(cap - 1);
                assert_eq!(messages.len(), kept + 2, "cap={} len={}", cap, len);
                // Kept context is the tail of the input, in order
                assert_eq!(&messages[1..messages.len() - 1], &context[len - kept..]);
            }
        }
    }

    #[test]
    fn test_long_context_keeps_most_recent() {
        let context = numbered(30);
        let messages = assemble_messages("s", &context, "latest", 20);

        assert_eq!(messages.len(), 21);
        assert_eq!(messages[1].content, "m11");
        assert_eq!(messages[19].content, "m29");
        assert_eq!(messages[20], ChatMessage::user("latest"));
    }

    #[test]
    fn test_request_serializes_wire_shape() {
        let request = ChatCompletionRequest {
            model: "some/model".to_string(),
            messages: assemble_messages("s", &[], "u", 20)
                .into_iter()
                .map(RequestMessage::from)
                .collect(),
            temperature: 0.5,
            max_tokens: 500,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "some/model");
        assert_eq!(json["max_tokens"], 500);
        assert_eq!(json["temperature"], 0.5);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "u");
    }

    #[test]
    fn test_image_message_uses_content_parts() {
        let image = ImageAttachment {
            data: "aGVsbG8=".to_string(),
            mime_type: "image/png".to_string(),
        };
        let message = RequestMessage::image("Analyze this image: my cat", &image);

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "role": "user",
                "content": [
                    {"type": "text", "text": "Analyze this image: my cat"},
                    {"type": "image_url", "image_url": {"url": "data:image/png;base64,aGVsbG8="}}
                ]
            })
        );
        assert_eq!(message.content.to_string(), "Analyze this image: my cat");
    }

    #[test]
    fn test_text_message_compares_with_history_entry() {
        let message = RequestMessage::from(ChatMessage::user("hi"));
        assert_eq!(message, ChatMessage::user("hi"));
        assert_ne!(message, ChatMessage::assistant("hi"));
    }
}
