//! Trellis – an execution engine for conversational decision-flow graphs
//!
//! This crate interprets flow graphs authored as JSON:
//! - An embedded expression language (tokenizer, precedence parser, AST,
//!   evaluator) over the session's variable bag
//! - A `{{...}}` template renderer for node text, URLs, and payloads
//! - A session state machine dispatching typed nodes, suspending on
//!   interactive prompts through a pluggable host
//! - Loop execution (foreach/while) with dynamically scoped loop variables
//! - External REST calls over a pluggable transport with mock/fallback
//!   policies and declarative response mappings
//! - Cross-flow jumps resolved against a flow catalog

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Embedded expression language and template renderer
pub mod expr;
/// Flow graph model, session engine, host and transport contracts
pub mod flow;

// Re-export key types for convenience
pub use flow::{FlowCatalog, FlowHost, FlowSession, HostReply, Outcome, Prompt, Transport};

/// Current version of the engine
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
