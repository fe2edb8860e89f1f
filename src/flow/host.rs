//! UI host contract: the suspension boundary for interactive nodes.
//!
//! The interpreter places no constraints on how a host renders a prompt; it
//! calls [`FlowHost::present`] with a presentation payload and blocks until
//! the host reports a structured reply. A host backed by a real UI typically
//! parks the call on a channel until the user acts; cancellation is
//! cooperative and halts only the presenting session.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One selectable entry of a choice/button prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptOption {
    /// Rendered display label.
    pub label: String,
    /// Value stored when this entry is picked.
    pub value: Value,
}

/// Presentation payload handed to the host, one variant per suspending node
/// shape. Text is already localized and template-rendered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Prompt {
    /// Display a message and wait for acknowledgement.
    Message {
        /// Presenting node id.
        node_id: String,
        /// Rendered message text.
        text: String,
    },
    /// Ask for free-form input.
    Input {
        /// Presenting node id.
        node_id: String,
        /// Rendered prompt text.
        text: String,
    },
    /// Ask the user to pick one option.
    Choice {
        /// Presenting node id.
        node_id: String,
        /// Rendered prompt text.
        text: String,
        /// Selectable options in declaration order.
        options: Vec<PromptOption>,
    },
    /// Present buttons; like `Choice` but rendered as distinct actions.
    Buttons {
        /// Presenting node id.
        node_id: String,
        /// Rendered prompt text.
        text: String,
        /// Buttons in declaration order.
        options: Vec<PromptOption>,
    },
    /// Present a multi-field form.
    Form {
        /// Presenting node id.
        node_id: String,
        /// Rendered prompt text.
        text: String,
        /// Rendered field labels keyed by field name, in declaration order.
        fields: Vec<(String, String)>,
    },
    /// Display closing content; the session ends after acknowledgement.
    End {
        /// Presenting node id.
        node_id: String,
        /// Rendered closing text.
        text: String,
    },
}

impl Prompt {
    /// Id of the node that raised this prompt.
    pub fn node_id(&self) -> &str {
        match self {
            Prompt::Message { node_id, .. }
            | Prompt::Input { node_id, .. }
            | Prompt::Choice { node_id, .. }
            | Prompt::Buttons { node_id, .. }
            | Prompt::Form { node_id, .. }
            | Prompt::End { node_id, .. } => node_id,
        }
    }
}

/// Structured reply resolving a prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostReply {
    /// The user dismissed the prompt; the session halts.
    pub cancelled: bool,
    /// Captured value (input text, form object, selected value).
    pub value: Option<Value>,
    /// Selected option index for choice/button prompts.
    pub index: Option<usize>,
}

impl HostReply {
    /// Plain acknowledgement.
    pub fn ack() -> Self {
        Self::default()
    }

    /// Cancellation.
    pub fn cancel() -> Self {
        Self {
            cancelled: true,
            ..Self::default()
        }
    }

    /// Submitted value.
    pub fn value(value: Value) -> Self {
        Self {
            value: Some(value),
            ..Self::default()
        }
    }

    /// Selected option index.
    pub fn index(index: usize) -> Self {
        Self {
            index: Some(index),
            ..Self::default()
        }
    }
}

/// External UI collaborator. One implementation per host environment.
pub trait FlowHost {
    /// Present a prompt and block until the user (or the host on their
    /// behalf) resolves it.
    fn present(&mut self, prompt: Prompt) -> HostReply;
}
