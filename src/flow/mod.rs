//! Conversational flow engine.
//!
//! A flow is a directed graph of typed nodes authored as JSON; a session
//! interprets one graph at a time against a per-user variable bag, suspending
//! on interactive nodes through a [`host::FlowHost`] and reaching external
//! services through a [`rest::Transport`]. Cross-flow targets switch the
//! active graph mid-session while the variable bag carries over.

/// Per-session variable bag and locale.
pub mod context;
/// Session state machine and node dispatcher.
pub mod engine;
/// Host suspension contract (prompts and replies).
pub mod host;
/// Flow graph data model (serde types).
pub mod model;
/// External call handler and transport contract.
pub mod rest;

mod loops;

pub use context::RuntimeContext;
pub use engine::{FlowCatalog, FlowSession, Outcome};
pub use host::{FlowHost, HostReply, Prompt, PromptOption};
pub use model::{Flow, FlowMeta, MockMode, Node, Target};
pub use rest::{HttpRequest, HttpResponse, NoTransport, Transport};

use thiserror::Error;

/// Errors raised while setting up a session.
#[derive(Debug, Error)]
pub enum FlowError {
    /// The requested entry flow is not in the catalog.
    #[error("unknown flow '{0}'")]
    UnknownFlow(String),
}
