//! Conversation turns.

use serde::Serialize;

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FunctionCall {
    /// Provider-assigned call id, echoed back with the result.
    pub id: String,
    /// Tool name.
    pub name: String,
    /// Raw JSON argument text.
    pub args: String,
}

impl FunctionCall {
    /// Creates a function call.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args: args.into(),
        }
    }
}

/// One part of a user turn. Text parts interleave with media payloads for
/// image/audio input fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserPart {
    /// Plain text.
    Text {
        /// The text content.
        text: String,
    },
    /// Image payload.
    Image {
        /// MIME type of the payload.
        mime_type: String,
        /// Base64-encoded payload.
        data: String,
    },
    /// Audio payload.
    Audio {
        /// Audio container format, e.g. `wav`.
        #[serde(skip_serializing_if = "Option::is_none")]
        format: Option<String>,
        /// Base64-encoded payload.
        data: String,
    },
}

/// One turn of the conversation held in memory and sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Turn {
    /// System instruction.
    System {
        /// Instruction text.
        content: String,
    },
    /// User message, possibly with media parts.
    User {
        /// Message parts.
        content: Vec<UserPart>,
    },
    /// Assistant response (text and/or tool-call requests).
    Assistant {
        /// Response text so far.
        content: Option<String>,
        /// Tool calls requested by the model.
        #[serde(skip_serializing_if = "Vec::is_empty")]
        function_calls: Vec<FunctionCall>,
    },
    /// Result of an executed tool call.
    Function {
        /// The call id this result answers.
        id: String,
        /// Tool name.
        name: String,
        /// Result payload, serialized.
        result: String,
    },
}

impl Turn {
    /// A user turn holding a single text part.
    #[must_use]
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::User {
            content: vec![UserPart::Text { text: text.into() }],
        }
    }

    /// The turn's role label.
    #[must_use]
    pub fn role(&self) -> &'static str {
        match self {
            Self::System { .. } => "system",
            Self::User { .. } => "user",
            Self::Assistant { .. } => "assistant",
            Self::Function { .. } => "function",
        }
    }

    /// The turn's text content, if it has a single text representation.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::System { content } => Some(content),
            Self::Assistant { content, .. } => content.as_deref(),
            Self::Function { result, .. } => Some(result),
            Self::User { content } => match content.as_slice() {
                [UserPart::Text { text }] => Some(text),
                _ => None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_roles() {
        assert_eq!(Turn::user_text("hi").role(), "user");
        assert_eq!(
            Turn::Function {
                id: "1".into(),
                name: "search".into(),
                result: "{}".into()
            }
            .role(),
            "function"
        );
    }

    #[test]
    fn test_text_accessor() {
        assert_eq!(Turn::user_text("hi").text(), Some("hi"));
        let multi = Turn::User {
            content: vec![
                UserPart::Text { text: "a".into() },
                UserPart::Image {
                    mime_type: "image/png".into(),
                    data: "AAAA".into(),
                },
            ],
        };
        assert_eq!(multi.text(), None);
    }

    #[test]
    fn test_serialization_tags_roles() {
        let json = serde_json::to_value(Turn::user_text("hello")).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"][0]["type"], "text");
    }
}
