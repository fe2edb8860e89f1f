//! Flow graph data model.
//!
//! Flows are authored by an external editor and consumed read-only by the
//! interpreter: node structure is never edited at runtime, only the variable
//! bag. Nodes are polymorphic over a closed `type` tag, with an untagged
//! fallback variant so that graphs from newer editors still traverse (an
//! unrecognized node simply resolves its `next`).

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named, versioned directed graph of nodes plus metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    /// Flow metadata (identity, locales, declared start node).
    pub meta: FlowMeta,
    /// Graph vertices keyed by node id.
    #[serde(default)]
    pub nodes: HashMap<String, Node>,
}

/// Flow metadata block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowMeta {
    /// Stable flow identifier, referenced by cross-flow targets.
    pub flow_id: String,
    /// Human-readable flow name.
    #[serde(default)]
    pub name: Option<String>,
    /// Locales the flow declares content for; the first one is the session
    /// default.
    #[serde(default)]
    pub locales: Vec<String>,
    /// Id of the node traversal starts from.
    #[serde(default)]
    pub start_node: Option<String>,
    /// Editor-assigned version string.
    #[serde(default)]
    pub version: Option<String>,
}

/// Reference to a node, optionally qualified by the flow it lives in.
///
/// The legacy shape is a bare node-id string; the struct form may omit
/// `node_id` (meaning "the target flow's start node") or `flow_id` (meaning
/// "same flow as the referencing node").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Target {
    /// Bare same-flow node id.
    Id(String),
    /// Qualified reference.
    Qualified {
        /// Flow the node lives in; empty or absent means the current flow.
        #[serde(default)]
        flow_id: Option<String>,
        /// Node id within that flow; absent means the flow's start node.
        #[serde(default)]
        node_id: Option<String>,
    },
}

impl Target {
    /// The referenced node id, when one is named.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Target::Id(id) => Some(id),
            Target::Qualified { node_id, .. } => node_id.as_deref(),
        }
    }

    /// The referenced flow id, when the target is flow-qualified.
    pub fn flow_id(&self) -> Option<&str> {
        match self {
            Target::Id(_) => None,
            Target::Qualified { flow_id, .. } => {
                flow_id.as_deref().filter(|id| !id.is_empty())
            }
        }
    }
}

/// Localized text: a single variant or several (one is chosen at random when
/// the node is presented).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LocalizedText {
    /// A single text variant.
    One(String),
    /// Several interchangeable variants.
    Many(Vec<String>),
}

impl LocalizedText {
    /// View the variants as a slice of strings.
    pub fn variants(&self) -> Vec<&str> {
        match self {
            LocalizedText::One(text) => vec![text.as_str()],
            LocalizedText::Many(texts) => texts.iter().map(String::as_str).collect(),
        }
    }
}

/// Per-locale text map used by presenting nodes.
pub type I18n = BTreeMap<String, LocalizedText>;

/// Pick the text variants for a locale: exact locale first, then `en`, then
/// the first declared locale, then the bare `text` field.
pub(crate) fn text_variants<'a>(
    i18n: &'a I18n,
    text: Option<&'a str>,
    locale: &str,
) -> Vec<&'a str> {
    let localized = i18n
        .get(locale)
        .or_else(|| i18n.get("en"))
        .or_else(|| i18n.values().next());
    match localized {
        Some(entry) => entry.variants(),
        None => text.map(|t| vec![t]).unwrap_or_default(),
    }
}

/// One step in a flow, discriminated by its `type` tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    /// Entry marker; followed through with no side effects.
    Start(StartNode),
    /// Display a (possibly localized) message and wait for acknowledgement.
    Response(ResponseNode),
    /// Prompt for free-form input and store it.
    Input(InputNode),
    /// Offer options (interactive) or evaluate cases (switch mode).
    Choice(ChoiceNode),
    /// Offer buttons, each with its own target.
    Button(ButtonNode),
    /// Apply one or more variable assignments.
    AssignVar(AssignVarNode),
    /// Evaluate an expression and branch.
    Condition(ConditionNode),
    /// Record a jump target in the `goto` variable.
    SetGoto(SetGotoNode),
    /// Generic loop; mode selects foreach or while behavior.
    Loop(LoopNode),
    /// Foreach loop over a source list.
    Foreach(LoopNode),
    /// While loop with a guard condition.
    While(LoopNode),
    /// Templated external call with mock/fallback semantics.
    RestCall(RestCallNode),
    /// Terminal node; displays closing content and ends the session.
    End(EndNode),
    /// Multi-field form presented to the host.
    Form(FormNode),
    /// Forward-compatible fallback for unrecognized node types.
    #[serde(untagged)]
    Other(OtherNode),
}

impl Node {
    /// The node's own `next` reference, ignoring any per-option or branch
    /// targets. This is the link the foreach body walk follows.
    pub fn own_next(&self) -> Option<&Target> {
        match self {
            Node::Start(n) => n.next.as_ref(),
            Node::Response(n) => n.next.as_ref(),
            Node::Input(n) => n.next.as_ref(),
            Node::Choice(n) => n.next.as_ref(),
            Node::Button(n) => n.next.as_ref(),
            Node::AssignVar(n) => n.next.as_ref(),
            Node::Condition(_) => None,
            Node::SetGoto(n) => n.next.as_ref(),
            Node::Loop(n) | Node::Foreach(n) | Node::While(n) => n.next.as_ref(),
            Node::RestCall(n) => n.next.as_ref(),
            Node::End(_) => None,
            Node::Form(n) => n.next.as_ref(),
            Node::Other(n) => n.next.as_ref(),
        }
    }
}

/// `start` node payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartNode {
    /// First real node of the flow.
    #[serde(default)]
    pub next: Option<Target>,
}

/// `response` node payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseNode {
    /// Unlocalized fallback text.
    #[serde(default)]
    pub text: Option<String>,
    /// Localized text variants.
    #[serde(default)]
    pub i18n: I18n,
    /// Next node after acknowledgement.
    #[serde(default)]
    pub next: Option<Target>,
}

/// `input` node payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputNode {
    /// Unlocalized prompt text.
    #[serde(default)]
    pub text: Option<String>,
    /// Localized prompt variants.
    #[serde(default)]
    pub i18n: I18n,
    /// Variable the captured value is written to (default `input`).
    #[serde(default)]
    pub save_as: Option<String>,
    /// Next node after submission.
    #[serde(default)]
    pub next: Option<Target>,
}

/// One selectable option or switch case.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChoiceOption {
    /// Display label (interactive mode).
    #[serde(default)]
    pub label: Option<String>,
    /// Localized label variants.
    #[serde(default)]
    pub i18n: I18n,
    /// Value stored when this option is picked; defaults to the label.
    #[serde(default)]
    pub value: Option<Value>,
    /// Case guard expression (switch mode).
    #[serde(default)]
    pub when: Option<String>,
    /// Where this option leads.
    #[serde(default)]
    pub target: Option<Target>,
}

/// `choice` node payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChoiceNode {
    /// Unlocalized prompt text.
    #[serde(default)]
    pub text: Option<String>,
    /// Localized prompt variants.
    #[serde(default)]
    pub i18n: I18n,
    /// `switch` selects the non-interactive case-evaluation mode.
    #[serde(default)]
    pub mode: Option<String>,
    /// Options (interactive) or cases (switch), in declaration order.
    #[serde(default)]
    pub options: Vec<ChoiceOption>,
    /// Switch-mode fallback when no case matches.
    #[serde(default)]
    pub default_target: Option<Target>,
    /// Variable the chosen value is written to (default `input`).
    #[serde(default)]
    pub save_as: Option<String>,
    /// Fallback next when the chosen option has no target of its own.
    #[serde(default)]
    pub next: Option<Target>,
}

/// `button` node payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ButtonNode {
    /// Unlocalized prompt text.
    #[serde(default)]
    pub text: Option<String>,
    /// Localized prompt variants.
    #[serde(default)]
    pub i18n: I18n,
    /// Buttons, each optionally carrying its own target.
    #[serde(default)]
    pub options: Vec<ChoiceOption>,
    /// Variable the pressed button's value is written to (default `input`).
    #[serde(default)]
    pub save_as: Option<String>,
    /// Fallback next when the pressed button has no target of its own.
    #[serde(default)]
    pub next: Option<Target>,
}

/// One `{target, value}` assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    /// Variable name to assign.
    pub target: String,
    /// Raw value; strings are normalized (leading `=` stripped, enclosing
    /// `{{ }}` unwrapped) and evaluated as expressions.
    pub value: Value,
}

/// `assign_var` node payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssignVarNode {
    /// Assignments applied in order.
    #[serde(default)]
    pub assignments: Vec<Assignment>,
    /// Next node.
    #[serde(default)]
    pub next: Option<Target>,
}

/// `condition` node payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConditionNode {
    /// Expression, template-rendered before evaluation.
    #[serde(default)]
    pub expr: String,
    /// Branch when the expression is truthy.
    #[serde(default)]
    pub true_target: Option<Target>,
    /// Branch when the expression is falsy.
    #[serde(default)]
    pub false_target: Option<Target>,
}

/// `set_goto` node payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetGotoNode {
    /// Literal target string written to the `goto` variable.
    #[serde(default)]
    pub target: String,
    /// Next node (the conditional jump itself is left to a downstream node
    /// that reads `goto`).
    #[serde(default)]
    pub next: Option<Target>,
}

/// Loop behavior selector for `loop`-typed nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopMode {
    /// Iterate a resolved source list.
    Foreach,
    /// Iterate while a guard condition holds.
    While,
}

/// Push-a-templated-value action run each loop iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendAction {
    /// Variable holding the list (created as an array if absent).
    pub list: String,
    /// Templated value appended each iteration.
    pub value: Value,
}

/// `loop`/`foreach`/`while` node payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoopNode {
    /// Behavior selector for the generic `loop` type.
    #[serde(default)]
    pub mode: Option<LoopMode>,
    /// Source list: variable name, expression, or dotted path (foreach).
    #[serde(default)]
    pub source_list: Option<String>,
    /// Guard expression evaluated each pass (while).
    #[serde(default)]
    pub condition: Option<String>,
    /// Iteration item variable; defaults to `item` suffixed with the loop
    /// nesting depth.
    #[serde(default)]
    pub item_var: Option<String>,
    /// Iteration index variable; defaults to `index` suffixed with the loop
    /// nesting depth.
    #[serde(default)]
    pub index_var: Option<String>,
    /// First node of the body chain.
    #[serde(default, alias = "loop_body")]
    pub body_start: Option<Target>,
    /// Node to continue with after the loop (falls back to `next`).
    #[serde(default)]
    pub after_loop: Option<Target>,
    /// Append actions run every iteration.
    #[serde(default)]
    pub append_list: Vec<AppendAction>,
    /// Loop exits early when this evaluates truthy after a body pass.
    #[serde(default)]
    pub break_if_expr: Option<String>,
    /// Iteration bound for while loops (default 1000).
    #[serde(default)]
    pub max_iterations: Option<u64>,
    /// Fallback continuation after the loop.
    #[serde(default)]
    pub next: Option<Target>,
}

impl LoopNode {
    /// Whether this loop runs in while mode (the `While` node type forces it;
    /// a generic `loop` consults its `mode` field).
    pub fn is_while(&self, node_type_while: bool) -> bool {
        node_type_while || self.mode == Some(LoopMode::While)
    }
}

/// Mock policy for external calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MockMode {
    /// Always attempt the real call; synthesize a placeholder on failure.
    #[default]
    Off,
    /// Attempt the real call; on failure use the configured mock if present.
    Fallback,
    /// Never attempt the real call; use the mock (or a placeholder).
    Always,
}

/// One declarative response-to-variable mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mapping {
    /// Mapping kind: `responseStatus`, `responseBody`, `responseHeader`, or
    /// anything else for the expression fallback.
    #[serde(rename = "type")]
    pub kind: String,
    /// Variable the extracted value is written to.
    pub target: String,
    /// Source path/header name/expression, depending on the kind.
    #[serde(default)]
    pub source: Option<String>,
}

/// `rest_call` node payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestCallNode {
    /// HTTP method (default `GET`).
    #[serde(default)]
    pub method: Option<String>,
    /// Templated request URL.
    #[serde(default)]
    pub url: String,
    /// Templated request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Templated request body.
    #[serde(default)]
    pub body: Option<Value>,
    /// Mock policy.
    #[serde(default)]
    pub mock_mode: MockMode,
    /// Configured mock response data.
    #[serde(default)]
    pub mock: Option<Value>,
    /// Variable the whole normalized response is stored under.
    #[serde(default)]
    pub save_as: Option<String>,
    /// Declarative field mappings applied after the call.
    #[serde(default)]
    pub mappings: Vec<Mapping>,
    /// Next node.
    #[serde(default)]
    pub next: Option<Target>,
}

/// `end` node payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndNode {
    /// Unlocalized closing text.
    #[serde(default)]
    pub text: Option<String>,
    /// Localized closing variants.
    #[serde(default)]
    pub i18n: I18n,
}

/// One field of a `form` node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormField {
    /// Field name within the captured form object.
    pub name: String,
    /// Display label (templated).
    #[serde(default)]
    pub label: Option<String>,
}

/// `form` node payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormNode {
    /// Unlocalized prompt text.
    #[serde(default)]
    pub text: Option<String>,
    /// Localized prompt variants.
    #[serde(default)]
    pub i18n: I18n,
    /// Form fields presented to the host.
    #[serde(default)]
    pub fields: Vec<FormField>,
    /// Variable the captured form object is written to (default `form`).
    #[serde(default)]
    pub save_as: Option<String>,
    /// Next node after submission.
    #[serde(default)]
    pub next: Option<Target>,
}

/// Payload of an unrecognized node type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OtherNode {
    /// Next node; the only field the interpreter honors.
    #[serde(default)]
    pub next: Option<Target>,
}
