//! Model identity and capability set.
//!
//! Capabilities are advisory to the runtime but enforced by the executor
//! before any network I/O: a call that needs a capability the model lacks
//! fails with `CapabilityUnsupported`.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Boolean trait of an LLM model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Completion,
    Tools,
    ToolChoice,
    MultipleChoices,
    VisionImage,
    VisionVideo,
    Audio,
    Document,
    Embed,
    PromptCaching,
    Moderation,
    SchemaJsonBasic,
    SchemaJsonStandard,
    Speculation,
    Temperature,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Completion => "completion",
            Self::Tools => "tools",
            Self::ToolChoice => "tool_choice",
            Self::MultipleChoices => "multiple_choices",
            Self::VisionImage => "vision.image",
            Self::VisionVideo => "vision.video",
            Self::Audio => "audio",
            Self::Document => "document",
            Self::Embed => "embed",
            Self::PromptCaching => "prompt_caching",
            Self::Moderation => "moderation",
            Self::SchemaJsonBasic => "schema.json.basic",
            Self::SchemaJsonStandard => "schema.json.standard",
            Self::Speculation => "speculation",
            Self::Temperature => "temperature",
        };
        f.write_str(name)
    }
}

/// Provider + model identity and the capabilities the model advertises.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlModel {
    pub provider_id: String,
    pub model_id: String,
    pub capabilities: HashSet<Capability>,
}

impl LlModel {
    pub fn new(
        provider_id: impl Into<String>,
        model_id: impl Into<String>,
        capabilities: impl IntoIterator<Item = Capability>,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            model_id: model_id.into(),
            capabilities: capabilities.into_iter().collect(),
        }
    }

    /// A model advertising every capability; handy for stubs.
    pub fn full(provider_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self::new(
            provider_id,
            model_id,
            [
                Capability::Completion,
                Capability::Tools,
                Capability::ToolChoice,
                Capability::MultipleChoices,
                Capability::VisionImage,
                Capability::VisionVideo,
                Capability::Audio,
                Capability::Document,
                Capability::Embed,
                Capability::PromptCaching,
                Capability::Moderation,
                Capability::SchemaJsonBasic,
                Capability::SchemaJsonStandard,
                Capability::Speculation,
                Capability::Temperature,
            ],
        )
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Pre-I/O capability gate used by executors.
    pub fn require(&self, capability: Capability) -> Result<(), LlmError> {
        if self.supports(capability) {
            Ok(())
        } else {
            Err(LlmError::CapabilityUnsupported(capability))
        }
    }

    pub fn require_all(&self, capabilities: &[Capability]) -> Result<(), LlmError> {
        for capability in capabilities {
            self.require(*capability)?;
        }
        Ok(())
    }
}
