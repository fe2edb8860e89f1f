//! Loop execution: foreach over a resolved list and guarded while passes.
//!
//! Loop variables are scoped dynamically: the controller captures the prior
//! values of the item/index names before the first pass and restores them on
//! every exit path, so nested loops with default names (`item`, `item1`, ...)
//! never clobber each other. The two modes traverse their bodies differently:
//! foreach walks the body chain through each node's own `next` link, while
//! mode re-enters the full dispatcher so branch targets are honored.

use serde_json::Value;

use crate::expr::{self, render, render_str, truthy};

use super::context::RuntimeContext;
use super::engine::{FlowSession, Outcome, Step};
use super::host::FlowHost;
use super::model::{AppendAction, LoopNode, Target};
use super::rest::Transport;

/// How one or more body passes ended.
enum BodyOutcome {
    /// The pass (or the whole loop) ran out of body nodes.
    Finished,
    /// The body raised a session-terminating outcome; propagate it.
    Stop(Outcome),
}

/// Prior value of a loop variable, restored when the loop exits.
struct SavedBinding {
    name: String,
    value: Option<Value>,
}

impl SavedBinding {
    fn capture(ctx: &RuntimeContext, name: &str) -> Self {
        Self {
            name: name.to_string(),
            value: ctx.get(name).cloned(),
        }
    }

    fn restore(self, ctx: &mut RuntimeContext) {
        match self.value {
            Some(value) => ctx.set(self.name, value),
            None => {
                ctx.remove(&self.name);
            }
        }
    }
}

/// Default loop variable name for the given nesting depth: `item`, `item1`,
/// `item2`, ...
fn default_var(base: &str, depth: usize) -> String {
    if depth == 0 {
        base.to_string()
    } else {
        format!("{base}{depth}")
    }
}

impl<H: FlowHost, T: Transport> FlowSession<H, T> {
    /// Run one loop node to completion and resolve its continuation.
    pub(super) fn handle_loop(
        &mut self,
        node_id: &str,
        node: &LoopNode,
        while_mode: bool,
    ) -> Step {
        let depth = self.loop_depth;
        let item_name = node
            .item_var
            .clone()
            .unwrap_or_else(|| default_var("item", depth));
        let index_name = node
            .index_var
            .clone()
            .unwrap_or_else(|| default_var("index", depth));
        let saved = [
            SavedBinding::capture(&self.ctx, &item_name),
            SavedBinding::capture(&self.ctx, &index_name),
        ];

        self.loop_depth += 1;
        let exit = if while_mode {
            self.run_while(node_id, node, &index_name)
        } else {
            self.run_foreach(node_id, node, &item_name, &index_name)
        };
        self.loop_depth -= 1;

        for binding in saved {
            binding.restore(&mut self.ctx);
        }

        match exit {
            BodyOutcome::Stop(outcome) => Step::Halt(outcome),
            BodyOutcome::Finished => {
                self.resolve_next(node.after_loop.as_ref().or(node.next.as_ref()))
            }
        }
    }

    fn run_foreach(
        &mut self,
        node_id: &str,
        node: &LoopNode,
        item_name: &str,
        index_name: &str,
    ) -> BodyOutcome {
        let Some(source) = node.source_list.as_deref() else {
            tracing::warn!(node = %node_id, "foreach loop declares no source list");
            return BodyOutcome::Finished;
        };
        let Some(items) = self.resolve_source_list(source) else {
            tracing::warn!(node = %node_id, source = %source, "foreach source did not resolve to a list");
            return BodyOutcome::Finished;
        };

        for (index, item) in items.into_iter().enumerate() {
            self.ctx.set(item_name, item);
            self.ctx.set(index_name, Value::from(index as u64));
            self.run_append_actions(&node.append_list);
            if let Some(body) = &node.body_start {
                if let BodyOutcome::Stop(outcome) = self.walk_body_chain(body) {
                    return BodyOutcome::Stop(outcome);
                }
            }
            if self.break_requested(node_id, node) {
                break;
            }
        }
        BodyOutcome::Finished
    }

    fn run_while(&mut self, node_id: &str, node: &LoopNode, index_name: &str) -> BodyOutcome {
        // Authored graphs can loop forever; the bound is the safety net.
        let bound = node.max_iterations.unwrap_or(1000);
        let mut iteration: u64 = 0;
        loop {
            if iteration >= bound {
                tracing::warn!(node = %node_id, bound, "while loop hit its iteration bound");
                return BodyOutcome::Finished;
            }
            if !self.guard_holds(node_id, node.condition.as_deref()) {
                return BodyOutcome::Finished;
            }
            self.ctx.set(index_name, Value::from(iteration));
            self.run_append_actions(&node.append_list);
            if let Some(body) = &node.body_start {
                if let BodyOutcome::Stop(outcome) = self.run_body_dispatched(body) {
                    return BodyOutcome::Stop(outcome);
                }
            }
            if self.break_requested(node_id, node) {
                return BodyOutcome::Finished;
            }
            iteration += 1;
        }
    }

    /// Foreach body traversal: dispatch each node in the chain but advance
    /// only along each node's own `next` link.
    fn walk_body_chain(&mut self, start: &Target) -> BodyOutcome {
        let Some(mut current) = start.node_id().map(str::to_string) else {
            return BodyOutcome::Finished;
        };
        loop {
            let Some(node) = self.node(&current) else {
                tracing::warn!(node = %current, "loop body references a missing node");
                return BodyOutcome::Finished;
            };
            let next = node
                .own_next()
                .and_then(Target::node_id)
                .map(str::to_string);
            match self.dispatch(&current, node) {
                Step::Halt(Outcome::Cancelled) => return BodyOutcome::Stop(Outcome::Cancelled),
                Step::Halt(Outcome::Completed) => return BodyOutcome::Stop(Outcome::Completed),
                Step::Halt(Outcome::Halted) | Step::Goto(_) => {}
            }
            match next {
                Some(id) => current = id,
                None => return BodyOutcome::Finished,
            }
        }
    }

    /// While body traversal: follow the dispatcher's own transitions so
    /// conditions and per-option targets take effect inside the body.
    fn run_body_dispatched(&mut self, start: &Target) -> BodyOutcome {
        let Some(mut current) = start.node_id().map(str::to_string) else {
            return BodyOutcome::Finished;
        };
        loop {
            let Some(node) = self.node(&current) else {
                tracing::warn!(node = %current, "loop body references a missing node");
                return BodyOutcome::Finished;
            };
            match self.dispatch(&current, node) {
                Step::Goto(next) => current = next,
                Step::Halt(Outcome::Halted) => return BodyOutcome::Finished,
                Step::Halt(outcome) => return BodyOutcome::Stop(outcome),
            }
        }
    }

    /// Resolve a foreach source: an exact variable holding a list, then an
    /// expression, then a dotted path.
    fn resolve_source_list(&self, source: &str) -> Option<Vec<Value>> {
        if let Some(Value::Array(items)) = self.ctx.get(source) {
            return Some(items.clone());
        }
        if let Ok(Value::Array(items)) = expr::evaluate(source, &self.ctx) {
            return Some(items);
        }
        match self.ctx.get_path(source) {
            Some(Value::Array(items)) => Some(items),
            _ => None,
        }
    }

    fn guard_holds(&self, node_id: &str, condition: Option<&str>) -> bool {
        let Some(source) = condition else {
            return false;
        };
        let rendered = render_str(source, &self.ctx);
        match expr::evaluate(&rendered, &self.ctx) {
            Ok(value) => truthy(&value),
            Err(err) => {
                tracing::warn!(node = %node_id, error = %err, "while guard failed to parse");
                false
            }
        }
    }

    fn break_requested(&self, node_id: &str, node: &LoopNode) -> bool {
        let Some(source) = node.break_if_expr.as_deref() else {
            return false;
        };
        let rendered = render_str(source, &self.ctx);
        match expr::evaluate(&rendered, &self.ctx) {
            Ok(value) => truthy(&value),
            Err(err) => {
                tracing::warn!(node = %node_id, error = %err, "break expression failed to parse");
                false
            }
        }
    }

    /// Template-render each append value and push it onto its list variable,
    /// creating the list when absent.
    fn run_append_actions(&mut self, actions: &[AppendAction]) {
        for action in actions {
            let value = render(&action.value, &self.ctx);
            let mut items = match self.ctx.remove(&action.list) {
                Some(Value::Array(items)) => items,
                Some(other) => vec![other],
                None => Vec::new(),
            };
            items.push(value);
            self.ctx.set(&action.list, Value::Array(items));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::engine::{FlowCatalog, FlowSession, Outcome};
    use super::super::host::{FlowHost, HostReply, Prompt};
    use super::super::model::Flow;
    use super::super::rest::NoTransport;
    use serde_json::json;

    struct AckHost;

    impl FlowHost for AckHost {
        fn present(&mut self, _prompt: Prompt) -> HostReply {
            HostReply::ack()
        }
    }

    fn session(flow_json: serde_json::Value) -> FlowSession<AckHost, NoTransport> {
        let flow: Flow = serde_json::from_value(flow_json).expect("flow json");
        let catalog: FlowCatalog = std::iter::once(flow).collect();
        FlowSession::new(catalog, "L", AckHost, NoTransport).expect("session")
    }

    #[test]
    fn foreach_appends_per_item_and_restores_bindings() {
        let mut session = session(json!({
            "meta": {"flow_id": "L", "locales": ["en"], "start_node": "loop"},
            "nodes": {
                "loop": {
                    "type": "foreach",
                    "source_list": "names",
                    "append_list": [{"list": "greetings", "value": "hi {{item}}"}],
                    "next": "done",
                },
                "done": {"type": "end"},
            },
        }));
        session.context_mut().set("names", json!(["Ana", "Bo"]));
        session.context_mut().set("item", json!("outer"));

        assert_eq!(session.run(), Outcome::Completed);
        assert_eq!(
            session.context().get("greetings"),
            Some(&json!(["hi Ana", "hi Bo"]))
        );
        assert_eq!(session.context().get("item"), Some(&json!("outer")));
    }

    #[test]
    fn nested_loops_use_depth_suffixed_defaults() {
        let mut session = session(json!({
            "meta": {"flow_id": "L", "locales": ["en"], "start_node": "outer"},
            "nodes": {
                "outer": {
                    "type": "foreach",
                    "source_list": "rows",
                    "loop_body": "inner",
                    "next": "done",
                },
                "inner": {
                    "type": "foreach",
                    "source_list": "cols",
                    "append_list": [{"list": "cells", "value": "{{item}}-{{item1}}"}],
                },
                "done": {"type": "end"},
            },
        }));
        session.context_mut().set("rows", json!(["a", "b"]));
        session.context_mut().set("cols", json!([1, 2]));

        assert_eq!(session.run(), Outcome::Completed);
        assert_eq!(
            session.context().get("cells"),
            Some(&json!(["a-1", "a-2", "b-1", "b-2"]))
        );
        assert_eq!(session.context().get("item"), None);
        assert_eq!(session.context().get("item1"), None);
    }

    #[test]
    fn foreach_source_accepts_expressions() {
        let mut session = session(json!({
            "meta": {"flow_id": "L", "locales": ["en"], "start_node": "loop"},
            "nodes": {
                "loop": {
                    "type": "foreach",
                    "source_list": "order.lines",
                    "append_list": [{"list": "skus", "value": "{{item.sku}}"}],
                    "next": "done",
                },
                "done": {"type": "end"},
            },
        }));
        session
            .context_mut()
            .set("order", json!({"lines": [{"sku": "A1"}, {"sku": "B2"}]}));

        assert_eq!(session.run(), Outcome::Completed);
        assert_eq!(session.context().get("skus"), Some(&json!(["A1", "B2"])));
    }

    #[test]
    fn while_loop_honors_iteration_bound() {
        let mut session = session(json!({
            "meta": {"flow_id": "L", "locales": ["en"], "start_node": "loop"},
            "nodes": {
                "loop": {
                    "type": "while",
                    "condition": "true",
                    "max_iterations": 5,
                    "append_list": [{"list": "ticks", "value": "{{index}}"}],
                    "next": "done",
                },
                "done": {"type": "end"},
            },
        }));

        assert_eq!(session.run(), Outcome::Completed);
        assert_eq!(
            session.context().get("ticks"),
            Some(&json!(["0", "1", "2", "3", "4"]))
        );
    }

    #[test]
    fn while_body_runs_through_the_dispatcher() {
        let mut session = session(json!({
            "meta": {"flow_id": "L", "locales": ["en"], "start_node": "seed"},
            "nodes": {
                "seed": {
                    "type": "assign_var",
                    "assignments": [{"target": "n", "value": "= 0"}],
                    "next": "loop",
                },
                "loop": {
                    "type": "while",
                    "condition": "n < 3",
                    "loop_body": "bump",
                    "next": "done",
                },
                "bump": {
                    "type": "assign_var",
                    "assignments": [{"target": "n", "value": "= n + 1"}],
                },
                "done": {"type": "end"},
            },
        }));

        assert_eq!(session.run(), Outcome::Completed);
        assert_eq!(session.context().get("n"), Some(&json!(3)));
    }

    #[test]
    fn break_expression_exits_foreach_early() {
        let mut session = session(json!({
            "meta": {"flow_id": "L", "locales": ["en"], "start_node": "loop"},
            "nodes": {
                "loop": {
                    "type": "foreach",
                    "source_list": "items",
                    "append_list": [{"list": "seen", "value": "{{item}}"}],
                    "break_if_expr": "item == 'stop'",
                    "next": "done",
                },
                "done": {"type": "end"},
            },
        }));
        session
            .context_mut()
            .set("items", json!(["a", "stop", "never"]));

        assert_eq!(session.run(), Outcome::Completed);
        assert_eq!(session.context().get("seen"), Some(&json!(["a", "stop"])));
    }

    #[test]
    fn missing_source_list_falls_through_to_next() {
        let mut session = session(json!({
            "meta": {"flow_id": "L", "locales": ["en"], "start_node": "loop"},
            "nodes": {
                "loop": {"type": "foreach", "source_list": "ghost", "next": "done"},
                "done": {"type": "end"},
            },
        }));
        assert_eq!(session.run(), Outcome::Completed);
    }
}
