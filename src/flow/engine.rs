//! Flow interpreter: a cooperative state machine over the node graph.
//!
//! States are node ids within the currently active flow; transitions are the
//! id each node handler resolves as "next". Interactive handlers suspend by
//! calling into the [`FlowHost`]; everything else runs to completion
//! synchronously. A session owns all of its mutable state (active flow id,
//! variable bag, loop-nesting depth), so independent sessions never share
//! anything.

use std::collections::HashMap;

use rand::Rng;
use serde_json::Value;

use crate::expr::{self, render, render_str, truthy};

use super::context::RuntimeContext;
use super::host::{FlowHost, Prompt, PromptOption};
use super::model::{
    AssignVarNode, ChoiceNode, ChoiceOption, ConditionNode, Flow, I18n, Node, Target,
    text_variants,
};
use super::rest::Transport;
use super::FlowError;

/// Lookup from flow id to [`Flow`], used to resolve cross-flow targets.
#[derive(Debug, Clone, Default)]
pub struct FlowCatalog {
    flows: HashMap<String, Flow>,
}

impl FlowCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a flow under its declared `flow_id`.
    pub fn insert(&mut self, flow: Flow) {
        self.flows.insert(flow.meta.flow_id.clone(), flow);
    }

    /// Look up a flow by id.
    pub fn get(&self, flow_id: &str) -> Option<&Flow> {
        self.flows.get(flow_id)
    }

    /// Whether the catalog knows the given flow id.
    pub fn contains(&self, flow_id: &str) -> bool {
        self.flows.contains_key(flow_id)
    }
}

impl FromIterator<Flow> for FlowCatalog {
    fn from_iter<I: IntoIterator<Item = Flow>>(iter: I) -> Self {
        let mut catalog = FlowCatalog::new();
        for flow in iter {
            catalog.insert(flow);
        }
        catalog
    }
}

/// How a session run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// An `end` node was reached and acknowledged.
    Completed,
    /// The host cancelled an interactive prompt.
    Cancelled,
    /// Traversal ran out of resolvable targets (dangling reference, missing
    /// start node, or a chain that simply stops). The caller decides whether
    /// to surface this as "flow ended unexpectedly".
    Halted,
}

/// Result of dispatching one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Step {
    /// Continue traversal at the given node id (within the active flow).
    Goto(String),
    /// Stop traversal with the given outcome.
    Halt(Outcome),
}

/// One in-progress flow session: graph catalog, active flow, variable bag,
/// host, and transport. Create one per end user.
pub struct FlowSession<H, T> {
    pub(super) catalog: FlowCatalog,
    pub(super) active: String,
    pub(super) ctx: RuntimeContext,
    pub(super) host: H,
    pub(super) transport: T,
    pub(super) loop_depth: usize,
}

impl<H: FlowHost, T: Transport> FlowSession<H, T> {
    /// Create a session positioned at the entry flow. The session locale
    /// defaults to the entry flow's first declared locale.
    pub fn new(
        catalog: FlowCatalog,
        entry_flow: &str,
        host: H,
        transport: T,
    ) -> Result<Self, FlowError> {
        let flow = catalog
            .get(entry_flow)
            .ok_or_else(|| FlowError::UnknownFlow(entry_flow.to_string()))?;
        let locale = flow.meta.locales.first().cloned().unwrap_or_default();
        Ok(Self {
            catalog,
            active: entry_flow.to_string(),
            ctx: RuntimeContext::with_locale(locale),
            host,
            transport,
            loop_depth: 0,
        })
    }

    /// The id of the currently active flow (changes on cross-flow jumps).
    pub fn active_flow_id(&self) -> &str {
        &self.active
    }

    /// Borrow the runtime context (e.g. for a variable inspection panel).
    pub fn context(&self) -> &RuntimeContext {
        &self.ctx
    }

    /// Mutable access to the runtime context, for seeding variables before a
    /// run.
    pub fn context_mut(&mut self) -> &mut RuntimeContext {
        &mut self.ctx
    }

    /// Borrow the host.
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Mutable access to the host.
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Walk the active flow from its declared start node until traversal
    /// stops.
    pub fn run(&mut self) -> Outcome {
        let Some(mut current) = self.active_flow().meta.start_node.clone() else {
            tracing::warn!(flow = %self.active, "flow declares no start node");
            return Outcome::Halted;
        };

        loop {
            let Some(node) = self.node(&current) else {
                tracing::warn!(flow = %self.active, node = %current, "dangling node reference");
                return Outcome::Halted;
            };
            match self.dispatch(&current, node) {
                Step::Goto(next) => current = next,
                Step::Halt(outcome) => return outcome,
            }
        }
    }

    /// Invariant: `active` is only ever set to ids validated against the
    /// catalog.
    pub(super) fn active_flow(&self) -> &Flow {
        self.catalog
            .get(&self.active)
            .expect("active flow present in catalog")
    }

    /// Clone a node out of the active flow.
    pub(super) fn node(&self, id: &str) -> Option<Node> {
        self.active_flow().nodes.get(id).cloned()
    }

    /// Dispatch one node to its per-type handler.
    pub(super) fn dispatch(&mut self, node_id: &str, node: Node) -> Step {
        match node {
            Node::Start(n) => self.resolve_next(n.next.as_ref()),
            Node::Response(n) => {
                let text = self.render_text(&n.i18n, n.text.as_deref());
                self.host.present(Prompt::Message {
                    node_id: node_id.to_string(),
                    text,
                });
                self.resolve_next(n.next.as_ref())
            }
            Node::Input(n) => {
                let text = self.render_text(&n.i18n, n.text.as_deref());
                let reply = self.host.present(Prompt::Input {
                    node_id: node_id.to_string(),
                    text,
                });
                if reply.cancelled {
                    return Step::Halt(Outcome::Cancelled);
                }
                let name = n.save_as.as_deref().unwrap_or("input");
                self.ctx.set(name, reply.value.unwrap_or(Value::Null));
                self.resolve_next(n.next.as_ref())
            }
            Node::Choice(n) => {
                if n.mode.as_deref() == Some("switch") {
                    self.handle_switch(node_id, &n)
                } else {
                    let text = self.render_text(&n.i18n, n.text.as_deref());
                    self.handle_select(
                        node_id,
                        text,
                        &n.options,
                        n.save_as.as_deref(),
                        n.next.as_ref(),
                        false,
                    )
                }
            }
            Node::Button(n) => {
                let text = self.render_text(&n.i18n, n.text.as_deref());
                self.handle_select(
                    node_id,
                    text,
                    &n.options,
                    n.save_as.as_deref(),
                    n.next.as_ref(),
                    true,
                )
            }
            Node::AssignVar(n) => self.handle_assign(node_id, &n),
            Node::Condition(n) => self.handle_condition(node_id, &n),
            Node::SetGoto(n) => {
                self.ctx.set("goto", Value::String(n.target.clone()));
                self.resolve_next(n.next.as_ref())
            }
            Node::Loop(n) => {
                let while_mode = n.is_while(false);
                self.handle_loop(node_id, &n, while_mode)
            }
            Node::Foreach(n) => self.handle_loop(node_id, &n, false),
            Node::While(n) => self.handle_loop(node_id, &n, true),
            Node::RestCall(n) => self.handle_rest_call(node_id, &n),
            Node::End(n) => {
                let text = self.render_text(&n.i18n, n.text.as_deref());
                let reply = self.host.present(Prompt::End {
                    node_id: node_id.to_string(),
                    text,
                });
                if reply.cancelled {
                    Step::Halt(Outcome::Cancelled)
                } else {
                    Step::Halt(Outcome::Completed)
                }
            }
            Node::Form(n) => {
                let text = self.render_text(&n.i18n, n.text.as_deref());
                let fields = n
                    .fields
                    .iter()
                    .map(|field| {
                        let label = field.label.as_deref().unwrap_or(&field.name);
                        (field.name.clone(), render_str(label, &self.ctx))
                    })
                    .collect();
                let reply = self.host.present(Prompt::Form {
                    node_id: node_id.to_string(),
                    text,
                    fields,
                });
                if reply.cancelled {
                    return Step::Halt(Outcome::Cancelled);
                }
                let name = n.save_as.as_deref().unwrap_or("form");
                self.ctx.set(name, reply.value.unwrap_or(Value::Null));
                self.resolve_next(n.next.as_ref())
            }
            Node::Other(n) => {
                tracing::debug!(node = %node_id, "unrecognized node type; following next");
                self.resolve_next(n.next.as_ref())
            }
        }
    }

    /// Normalize a `next` reference and, for cross-flow targets, switch the
    /// active flow before returning the target node id. A flow-qualified
    /// target without a `node_id` resumes at that flow's declared start
    /// node.
    pub(super) fn resolve_next(&mut self, target: Option<&Target>) -> Step {
        let Some(target) = target else {
            return Step::Halt(Outcome::Halted);
        };
        if let Some(flow_id) = target.flow_id() {
            if flow_id != self.active {
                if !self.catalog.contains(flow_id) {
                    tracing::warn!(flow = %flow_id, "cross-flow target names an unknown flow");
                    return Step::Halt(Outcome::Halted);
                }
                self.active = flow_id.to_string();
                tracing::debug!(flow = %flow_id, "switched active flow");
            }
        }
        match target.node_id() {
            Some(node_id) => Step::Goto(node_id.to_string()),
            None => match self.active_flow().meta.start_node.clone() {
                Some(start) => Step::Goto(start),
                None => {
                    tracing::warn!(flow = %self.active, "target flow declares no start node");
                    Step::Halt(Outcome::Halted)
                }
            },
        }
    }

    /// Pick a localized text variant (uniformly random when several are
    /// declared) and render its templates.
    pub(super) fn render_text(&self, i18n: &I18n, text: Option<&str>) -> String {
        let variants = text_variants(i18n, text, self.ctx.locale());
        let chosen = match variants.len() {
            0 => "",
            1 => variants[0],
            n => variants[rand::rng().random_range(0..n)],
        };
        render_str(chosen, &self.ctx)
    }

    /// Interactive option selection shared by `choice` and `button` nodes.
    fn handle_select(
        &mut self,
        node_id: &str,
        text: String,
        options: &[ChoiceOption],
        save_as: Option<&str>,
        next: Option<&Target>,
        buttons: bool,
    ) -> Step {
        let rendered: Vec<PromptOption> = options
            .iter()
            .map(|option| {
                let label = self.render_text(&option.i18n, option.label.as_deref());
                let value = option
                    .value
                    .clone()
                    .unwrap_or_else(|| Value::String(label.clone()));
                PromptOption { label, value }
            })
            .collect();

        let prompt = if buttons {
            Prompt::Buttons {
                node_id: node_id.to_string(),
                text,
                options: rendered.clone(),
            }
        } else {
            Prompt::Choice {
                node_id: node_id.to_string(),
                text,
                options: rendered.clone(),
            }
        };
        let reply = self.host.present(prompt);
        if reply.cancelled {
            return Step::Halt(Outcome::Cancelled);
        }
        let Some(index) = reply.index.filter(|i| *i < options.len()) else {
            tracing::warn!(node = %node_id, "host reply carried no valid option index");
            return Step::Halt(Outcome::Halted);
        };
        let name = save_as.unwrap_or("input");
        self.ctx.set(name, rendered[index].value.clone());
        self.resolve_next(options[index].target.as_ref().or(next))
    }

    /// Non-interactive `choice` in switch mode: first truthy `when` wins,
    /// later cases are never evaluated.
    fn handle_switch(&mut self, node_id: &str, node: &ChoiceNode) -> Step {
        for case in &node.options {
            let Some(when) = case.when.as_deref() else {
                continue;
            };
            let matched = match expr::evaluate(when, &self.ctx) {
                Ok(value) => truthy(&value),
                Err(err) => {
                    tracing::warn!(node = %node_id, error = %err, "switch case failed to parse");
                    false
                }
            };
            if matched {
                return self.resolve_next(case.target.as_ref().or(node.next.as_ref()));
            }
        }
        self.resolve_next(node.default_target.as_ref().or(node.next.as_ref()))
    }

    fn handle_assign(&mut self, node_id: &str, node: &AssignVarNode) -> Step {
        for assignment in &node.assignments {
            match &assignment.value {
                Value::String(raw) => {
                    let source = normalize_assignment(raw);
                    match expr::evaluate(&source, &self.ctx) {
                        Ok(value) => self.ctx.set(&assignment.target, value),
                        Err(err) => {
                            // A broken expression leaves the target unset
                            // instead of aborting the flow.
                            tracing::warn!(
                                node = %node_id,
                                target = %assignment.target,
                                error = %err,
                                "assignment expression failed; leaving variable unset"
                            );
                        }
                    }
                }
                other => {
                    let value = render(other, &self.ctx);
                    self.ctx.set(&assignment.target, value);
                }
            }
        }
        self.resolve_next(node.next.as_ref())
    }

    fn handle_condition(&mut self, node_id: &str, node: &ConditionNode) -> Step {
        let source = render_str(&node.expr, &self.ctx);
        let branch = match expr::evaluate(&source, &self.ctx) {
            Ok(value) => truthy(&value),
            Err(err) => {
                tracing::warn!(node = %node_id, error = %err, "condition failed to parse");
                false
            }
        };
        if branch {
            self.resolve_next(node.true_target.as_ref())
        } else {
            self.resolve_next(node.false_target.as_ref())
        }
    }
}

/// Assignment value normalization: strip a leading `=`, unwrap a fully
/// enclosing `{{ }}`, and evaluate the remainder as an expression.
fn normalize_assignment(raw: &str) -> String {
    let mut source = raw.trim();
    if let Some(stripped) = source.strip_prefix('=') {
        source = stripped.trim_start();
    }
    if let Some(inner) = source
        .strip_prefix("{{")
        .and_then(|rest| rest.strip_suffix("}}"))
    {
        source = inner.trim();
    }
    source.to_string()
}
