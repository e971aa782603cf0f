//! Prompt: an ordered, append-only message sequence plus request parameters.
//!
//! Prompts are value types. `with_params` returns a new prompt; `append`
//! returns a new prompt with one more message. The run-owned prompt inside
//! the environment mutates through [`Prompt::push`], which re-stamps the
//! message index so `messages[i].index == i` stays true.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::message::{Message, MessageBody};

/// Tool-choice mode for an LLM call: when tools are present, controls whether
/// the model may choose (auto), must not use (none), must use (required), or
/// must call one specific tool by name.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    /// Model can pick between a message and tool calls. Default.
    #[default]
    Auto,
    /// Model must call one or more tools.
    Required,
    /// Model will not call any tool.
    None,
    /// The first tool call, if any, must be this tool.
    Named(String),
}

/// Reasoning effort hint for models that support it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
}

/// Request parameters carried by a prompt.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Params {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// How many alternatives `execute_multiple_choices` should produce.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_of_choices: Option<u32>,
    #[serde(default)]
    pub tool_choice: ToolChoice,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<ReasoningEffort>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
    /// Per-LLM-call timeout; node-level timeouts are not a primitive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

impl Params {
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = tool_choice;
        self
    }

    pub fn with_number_of_choices(mut self, n: u32) -> Self {
        self.number_of_choices = Some(n);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Ordered conversation history plus [`Params`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    messages: Vec<Message>,
    params: Params,
}

impl Prompt {
    pub fn new(params: Params) -> Self {
        Self {
            messages: Vec::new(),
            params,
        }
    }

    /// Rebuilds a prompt from existing messages, re-stamping indexes
    /// positionally (used by checkpoint restore).
    pub fn from_messages(messages: Vec<Message>, params: Params) -> Self {
        let mut prompt = Self::new(params);
        for message in messages {
            prompt.push(message);
        }
        prompt
    }

    /// Returns a new prompt with the given params and the same history.
    pub fn with_params(&self, params: Params) -> Self {
        Self {
            messages: self.messages.clone(),
            params,
        }
    }

    /// Returns a new prompt with `message` appended (value-semantic append).
    pub fn append(&self, message: Message) -> Self {
        let mut next = self.clone();
        next.push(message);
        next
    }

    /// Appends in place, stamping `index = previous max + 1`. Returns a
    /// reference to the stored message.
    pub fn push(&mut self, mut message: Message) -> &Message {
        message.index = self.messages.len();
        self.messages.push(message);
        self.messages.last().expect("just pushed")
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn set_params(&mut self, params: Params) {
        self.params = params;
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Text of the last assistant message, if any.
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.messages.iter().rev().find_map(|m| match &m.body {
            MessageBody::Assistant { content, .. } => Some(content.as_str()),
            _ => None,
        })
    }

    /// Trailing tool calls that have no matching tool result yet, in
    /// declaration order.
    pub fn unanswered_tool_calls(&self) -> Vec<&Message> {
        let answered: Vec<&str> = self
            .messages
            .iter()
            .filter_map(|m| match &m.body {
                MessageBody::ToolResult { call_id, .. } => Some(call_id.as_str()),
                _ => None,
            })
            .collect();
        self.messages
            .iter()
            .filter(|m| match &m.body {
                MessageBody::ToolCall { id, .. } => !answered.contains(&id.as_str()),
                _ => false,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// **Scenario**: indexes are monotonic and positional after appends.
    #[test]
    fn push_stamps_monotonic_indexes() {
        let mut p = Prompt::new(Params::default());
        p.push(Message::system("sys"));
        p.push(Message::user("hi"));
        p.push(Message::assistant("hello"));
        for (i, m) in p.messages().iter().enumerate() {
            assert_eq!(m.index, i);
        }
    }

    /// **Scenario**: from_messages re-stamps stale indexes positionally.
    #[test]
    fn from_messages_restamps_indexes() {
        let mut stale = Message::user("hi");
        stale.index = 41;
        let p = Prompt::from_messages(vec![Message::system("sys"), stale], Params::default());
        assert_eq!(p.messages()[0].index, 0);
        assert_eq!(p.messages()[1].index, 1);
    }

    #[test]
    fn with_params_keeps_history() {
        let p = Prompt::new(Params::default()).append(Message::user("hi"));
        let q = p.with_params(Params::default().with_temperature(0.2));
        assert_eq!(q.len(), 1);
        assert_eq!(q.params().temperature, Some(0.2));
        assert_eq!(p.params().temperature, None, "original untouched");
    }

    #[test]
    fn unanswered_tool_calls_excludes_answered() {
        let mut p = Prompt::new(Params::default());
        p.push(Message::tool_call("c1", "a", json!({})));
        p.push(Message::tool_call("c2", "b", json!({})));
        p.push(Message::tool_result("c1", "a", json!("done")));
        let open = p.unanswered_tool_calls();
        assert_eq!(open.len(), 1);
        match &open[0].body {
            MessageBody::ToolCall { id, .. } => assert_eq!(id, "c2"),
            other => panic!("expected tool call, got {:?}", other),
        }
    }

    #[test]
    fn tool_choice_default_is_auto() {
        assert_eq!(ToolChoice::default(), ToolChoice::Auto);
    }
}
