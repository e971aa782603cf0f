//! Provider-agnostic conversation messages and media attachments.
//!
//! A [`Message`] is a tagged body (system / user / assistant / tool_call /
//! tool_result) plus the monotonic index it holds within its prompt and a
//! creation timestamp. Messages are immutable; prompts are rebuilt by
//! appending, and [`Prompt::push`](crate::prompt::Prompt::push) re-stamps the
//! index so that `messages[i].index == i` always holds.
//!
//! Serde field names follow the checkpoint wire format: `role`, `content`,
//! `name`, `tool_call_id`, `arguments`. `index` and `created_at` are additive
//! keys with defaults, so the minimal documented shape still parses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Token accounting for one LLM call, when the provider reports it.
///
/// **Interaction**: carried in [`ResponseMetadata`] on assistant messages;
/// instrumentation features can aggregate it per run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt (input).
    pub prompt_tokens: u32,
    /// Tokens in the completion (output).
    pub completion_tokens: u32,
    /// Total tokens (prompt + completion).
    pub total_tokens: u32,
}

/// Executor-assigned metadata on an assistant message. All ids and reasons
/// are opaque strings; the core treats them as identifiers only.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    /// Provider message id, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Provider finish reason (e.g. a stop or length marker), if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    /// Token usage for the call that produced this message, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

mod b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        STANDARD.decode(&text).map_err(serde::de::Error::custom)
    }
}

/// Payload of an attachment: opaque bytes, pre-encoded base64, or a URL the
/// executor resolves.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum AttachmentContent {
    /// Raw bytes; serialized as base64 text on the wire.
    Binary {
        #[serde(with = "b64")]
        bytes: Vec<u8>,
    },
    /// Already base64-encoded data.
    Base64 { data: String },
    /// Remote content by URL.
    Url { url: String },
}

/// Media kind of an attachment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    Audio,
    Video,
    TextFile,
    Pdf,
}

/// A media attachment on a user message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub content: AttachmentContent,
    /// MIME type, e.g. `image/png`.
    pub mime_type: String,
    /// Optional format hint, e.g. `png`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl Attachment {
    pub fn image_url(url: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            kind: AttachmentKind::Image,
            content: AttachmentContent::Url { url: url.into() },
            mime_type: mime_type.into(),
            format: None,
        }
    }

    pub fn binary(
        kind: AttachmentKind,
        bytes: Vec<u8>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            content: AttachmentContent::Binary { bytes },
            mime_type: mime_type.into(),
            format: None,
        }
    }

    /// Sets the format hint.
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }
}

/// Tagged message body. A closed set: new kinds require an explicit case in
/// every consumer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum MessageBody {
    /// Instruction turn.
    System { content: String },
    /// End-user turn, optionally with media attachments.
    User {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        attachments: Vec<Attachment>,
    },
    /// Model turn.
    Assistant {
        content: String,
        #[serde(default)]
        metadata: ResponseMetadata,
    },
    /// Model-requested tool invocation. `tool_call_id` is executor-assigned
    /// and opaque.
    ToolCall {
        #[serde(rename = "tool_call_id")]
        id: String,
        name: String,
        arguments: Value,
    },
    /// Result of one tool invocation, correlated by `tool_call_id`.
    ToolResult {
        #[serde(rename = "tool_call_id")]
        call_id: String,
        name: String,
        content: Value,
    },
}

/// One immutable entry in a prompt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Monotonic position within the owning prompt; re-stamped on append.
    #[serde(default)]
    pub index: usize,
    /// Creation time (UTC).
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub body: MessageBody,
}

impl Message {
    fn of(body: MessageBody) -> Self {
        Self {
            index: 0,
            created_at: Utc::now(),
            body,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::of(MessageBody::System {
            content: content.into(),
        })
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::of(MessageBody::User {
            content: content.into(),
            attachments: Vec::new(),
        })
    }

    pub fn user_with_attachments(
        content: impl Into<String>,
        attachments: Vec<Attachment>,
    ) -> Self {
        Self::of(MessageBody::User {
            content: content.into(),
            attachments,
        })
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::of(MessageBody::Assistant {
            content: content.into(),
            metadata: ResponseMetadata::default(),
        })
    }

    pub fn assistant_with_metadata(
        content: impl Into<String>,
        metadata: ResponseMetadata,
    ) -> Self {
        Self::of(MessageBody::Assistant {
            content: content.into(),
            metadata,
        })
    }

    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: Value,
    ) -> Self {
        Self::of(MessageBody::ToolCall {
            id: id.into(),
            name: name.into(),
            arguments,
        })
    }

    pub fn tool_result(
        call_id: impl Into<String>,
        name: impl Into<String>,
        content: Value,
    ) -> Self {
        Self::of(MessageBody::ToolResult {
            call_id: call_id.into(),
            name: name.into(),
            content,
        })
    }

    /// Text content for the textual kinds; `None` for tool calls/results.
    pub fn text(&self) -> Option<&str> {
        match &self.body {
            MessageBody::System { content }
            | MessageBody::User { content, .. }
            | MessageBody::Assistant { content, .. } => Some(content),
            _ => None,
        }
    }

    /// True when the body is a tool call.
    pub fn is_tool_call(&self) -> bool {
        matches!(self.body, MessageBody::ToolCall { .. })
    }

    /// True when the body is an assistant turn.
    pub fn is_assistant(&self) -> bool {
        matches!(self.body, MessageBody::Assistant { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// **Scenario**: serde layout matches the checkpoint wire format keys.
    #[test]
    fn tool_call_serializes_with_wire_keys() {
        let m = Message::tool_call("call-1", "calculator", json!({"op": "MUL"}));
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["role"], "tool_call");
        assert_eq!(v["tool_call_id"], "call-1");
        assert_eq!(v["name"], "calculator");
        assert_eq!(v["arguments"]["op"], "MUL");
    }

    /// **Scenario**: the minimal documented shape (no index/created_at) parses.
    #[test]
    fn minimal_wire_shape_parses_with_defaults() {
        let m: Message =
            serde_json::from_value(json!({"role": "user", "content": "hi"})).unwrap();
        assert_eq!(m.index, 0);
        assert_eq!(m.text(), Some("hi"));
    }

    #[test]
    fn tool_result_round_trips() {
        let m = Message::tool_result("call-7", "calculator", json!(15));
        let v = serde_json::to_value(&m).unwrap();
        let back: Message = serde_json::from_value(v).unwrap();
        assert_eq!(back.body, m.body);
    }

    #[test]
    fn binary_attachment_round_trips_as_base64() {
        let a = Attachment::binary(AttachmentKind::Image, vec![1, 2, 3, 255], "image/png")
            .with_format("png");
        let v = serde_json::to_value(&a).unwrap();
        assert_eq!(v["content"]["source"], "binary");
        assert!(v["content"]["bytes"].is_string(), "bytes serialize as base64 text");
        let back: Attachment = serde_json::from_value(v).unwrap();
        assert_eq!(back, a);
    }

    #[test]
    fn empty_attachments_are_omitted_on_the_wire() {
        let v = serde_json::to_value(Message::user("hello")).unwrap();
        assert!(v.get("attachments").is_none());
    }
}
