use std::collections::VecDeque;

use serde_json::{Value, json};
use trellis::flow::{Flow, FlowCatalog, NoTransport};
use trellis::{FlowHost, FlowSession, HostReply, Outcome, Prompt};

/// Host that records every prompt and replays a scripted reply sequence,
/// acknowledging anything past the end of the script.
#[derive(Default)]
struct ScriptedHost {
    prompts: Vec<Prompt>,
    replies: VecDeque<HostReply>,
}

impl ScriptedHost {
    fn with_replies(replies: Vec<HostReply>) -> Self {
        Self {
            prompts: Vec::new(),
            replies: replies.into(),
        }
    }
}

impl FlowHost for ScriptedHost {
    fn present(&mut self, prompt: Prompt) -> HostReply {
        self.prompts.push(prompt);
        self.replies.pop_front().unwrap_or_else(HostReply::ack)
    }
}

fn flow(value: Value) -> Flow {
    serde_json::from_value(value).expect("flow must deserialize")
}

fn session(
    flows: Vec<Flow>,
    entry: &str,
    host: ScriptedHost,
) -> FlowSession<ScriptedHost, NoTransport> {
    let catalog: FlowCatalog = flows.into_iter().collect();
    FlowSession::new(catalog, entry, host, NoTransport).expect("entry flow must exist")
}

#[test]
fn full_conversation_runs_to_completion() {
    let onboarding = flow(json!({
        "meta": {"flow_id": "onboarding", "locales": ["en"], "start_node": "s"},
        "nodes": {
            "s": {"type": "start", "next": "welcome"},
            "welcome": {"type": "response", "text": "Welcome!", "next": "ask_name"},
            "ask_name": {"type": "input", "text": "What is your name?", "save_as": "name", "next": "branch"},
            "branch": {
                "type": "condition",
                "expr": "len(name) > 0",
                "true_target": "pick",
                "false_target": "bye",
            },
            "pick": {
                "type": "choice",
                "text": "Hi {{name}}, pick a plan",
                "save_as": "plan",
                "options": [
                    {"label": "Basic", "value": "basic"},
                    {"label": "Pro", "value": "pro", "target": "pro_note"},
                ],
                "next": "bye",
            },
            "pro_note": {"type": "response", "text": "Pro it is, {{name}}.", "next": "bye"},
            "bye": {"type": "end", "text": "Bye {{name}}"},
        },
    }));

    let host = ScriptedHost::with_replies(vec![
        HostReply::ack(),
        HostReply::value(json!("Ana")),
        HostReply::index(1),
        HostReply::ack(),
        HostReply::ack(),
    ]);
    let mut session = session(vec![onboarding], "onboarding", host);

    assert_eq!(session.run(), Outcome::Completed);
    assert_eq!(session.context().get("name"), Some(&json!("Ana")));
    assert_eq!(session.context().get("plan"), Some(&json!("pro")));

    let prompts = &session.host().prompts;
    assert_eq!(prompts.len(), 5);
    match &prompts[2] {
        Prompt::Choice { text, options, .. } => {
            assert_eq!(text, "Hi Ana, pick a plan");
            assert_eq!(options[1].label, "Pro");
        }
        other => panic!("expected choice prompt, got {other:?}"),
    }
    match &prompts[3] {
        Prompt::Message { text, .. } => assert_eq!(text, "Pro it is, Ana."),
        other => panic!("expected pro note, got {other:?}"),
    }
}

#[test]
fn switch_choice_takes_the_first_matching_case() {
    let mut session = session(
        vec![flow(json!({
            "meta": {"flow_id": "route", "locales": ["en"], "start_node": "s"},
            "nodes": {
                "s": {"type": "start", "next": "route"},
                "route": {
                    "type": "choice",
                    "mode": "switch",
                    "options": [
                        {"when": "score >= 90", "target": "gold"},
                        {"when": "score >= 50", "target": "silver"},
                        {"when": "score >= 0", "target": "bronze"},
                    ],
                    "default_target": "none",
                },
                "gold": {"type": "end", "text": "gold"},
                "silver": {"type": "end", "text": "silver"},
                "bronze": {"type": "end", "text": "bronze"},
                "none": {"type": "end", "text": "none"},
            },
        }))],
        "route",
        ScriptedHost::default(),
    );
    session.context_mut().set("score", json!(64));

    assert_eq!(session.run(), Outcome::Completed);
    match &session.host().prompts[0] {
        Prompt::End { text, .. } => assert_eq!(text, "silver"),
        other => panic!("expected end prompt, got {other:?}"),
    }
}

#[test]
fn switch_stops_evaluating_after_the_first_match() {
    // The second guard is malformed; because the first case already matched,
    // it must never be reached, so routing succeeds without a hiccup.
    let mut session = session(
        vec![flow(json!({
            "meta": {"flow_id": "route", "locales": ["en"], "start_node": "route"},
            "nodes": {
                "route": {
                    "type": "choice",
                    "mode": "switch",
                    "options": [
                        {"when": "score >= 10", "target": "hit"},
                        {"when": "1 +", "target": "broken"},
                    ],
                    "default_target": "none",
                },
                "hit": {"type": "end", "text": "hit"},
                "broken": {"type": "end", "text": "broken"},
                "none": {"type": "end", "text": "none"},
            },
        }))],
        "route",
        ScriptedHost::default(),
    );
    session.context_mut().set("score", json!(64));

    assert_eq!(session.run(), Outcome::Completed);
    match &session.host().prompts[0] {
        Prompt::End { text, .. } => assert_eq!(text, "hit"),
        other => panic!("expected end prompt, got {other:?}"),
    }
}

#[test]
fn switch_without_matching_case_uses_default_target() {
    let mut session = session(
        vec![flow(json!({
            "meta": {"flow_id": "route", "locales": ["en"], "start_node": "route"},
            "nodes": {
                "route": {
                    "type": "choice",
                    "mode": "switch",
                    "options": [{"when": "score > 100", "target": "gold"}],
                    "default_target": "fallback",
                },
                "gold": {"type": "end", "text": "gold"},
                "fallback": {"type": "end", "text": "fallback"},
            },
        }))],
        "route",
        ScriptedHost::default(),
    );
    session.context_mut().set("score", json!(1));

    assert_eq!(session.run(), Outcome::Completed);
    match &session.host().prompts[0] {
        Prompt::End { text, .. } => assert_eq!(text, "fallback"),
        other => panic!("expected end prompt, got {other:?}"),
    }
}

#[test]
fn cross_flow_jump_carries_the_variable_bag() {
    let main = flow(json!({
        "meta": {"flow_id": "main", "locales": ["en"], "start_node": "s"},
        "nodes": {
            "s": {"type": "start", "next": "remember"},
            "remember": {
                "type": "assign_var",
                "assignments": [{"target": "who", "value": "'Ana'"}],
                "next": {"flow_id": "farewell", "node_id": "wave"},
            },
        },
    }));
    let farewell = flow(json!({
        "meta": {"flow_id": "farewell", "locales": ["en"], "start_node": "wave"},
        "nodes": {
            "wave": {"type": "end", "text": "bye {{who}}"},
        },
    }));

    let mut session = session(vec![main, farewell], "main", ScriptedHost::default());
    assert_eq!(session.run(), Outcome::Completed);
    assert_eq!(session.active_flow_id(), "farewell");
    match &session.host().prompts[0] {
        Prompt::End { text, .. } => assert_eq!(text, "bye Ana"),
        other => panic!("expected end prompt, got {other:?}"),
    }
}

#[test]
fn cross_flow_target_without_node_id_starts_at_the_flow_start() {
    let main = flow(json!({
        "meta": {"flow_id": "main", "locales": ["en"], "start_node": "s"},
        "nodes": {
            "s": {"type": "start", "next": {"flow_id": "other"}},
        },
    }));
    let other = flow(json!({
        "meta": {"flow_id": "other", "locales": ["en"], "start_node": "hello"},
        "nodes": {
            "hello": {"type": "end", "text": "made it"},
        },
    }));

    let mut session = session(vec![main, other], "main", ScriptedHost::default());
    assert_eq!(session.run(), Outcome::Completed);
    match &session.host().prompts[0] {
        Prompt::End { text, .. } => assert_eq!(text, "made it"),
        other => panic!("expected end prompt, got {other:?}"),
    }
}

#[test]
fn unknown_cross_flow_target_halts() {
    let mut session = session(
        vec![flow(json!({
            "meta": {"flow_id": "main", "locales": ["en"], "start_node": "s"},
            "nodes": {
                "s": {"type": "start", "next": {"flow_id": "ghost", "node_id": "x"}},
            },
        }))],
        "main",
        ScriptedHost::default(),
    );
    assert_eq!(session.run(), Outcome::Halted);
    assert_eq!(session.active_flow_id(), "main");
}

#[test]
fn unknown_entry_flow_is_a_setup_error() {
    let catalog = FlowCatalog::new();
    let result = FlowSession::new(catalog, "missing", ScriptedHost::default(), NoTransport);
    assert!(result.is_err());
}

#[test]
fn locale_selection_prefers_the_flow_default() {
    let mut session = session(
        vec![flow(json!({
            "meta": {"flow_id": "greet", "locales": ["de", "en"], "start_node": "hello"},
            "nodes": {
                "hello": {
                    "type": "response",
                    "i18n": {"en": "hello", "de": "hallo"},
                    "next": "done",
                },
                "done": {"type": "end"},
            },
        }))],
        "greet",
        ScriptedHost::default(),
    );
    assert_eq!(session.run(), Outcome::Completed);
    match &session.host().prompts[0] {
        Prompt::Message { text, .. } => assert_eq!(text, "hallo"),
        other => panic!("expected message prompt, got {other:?}"),
    }
}

#[test]
fn button_value_defaults_to_its_label() {
    let mut session = session(
        vec![flow(json!({
            "meta": {"flow_id": "b", "locales": ["en"], "start_node": "buttons"},
            "nodes": {
                "buttons": {
                    "type": "button",
                    "text": "Pick",
                    "save_as": "picked",
                    "options": [{"label": "Red"}, {"label": "Blue"}],
                    "next": "done",
                },
                "done": {"type": "end"},
            },
        }))],
        "b",
        ScriptedHost::with_replies(vec![HostReply::index(0), HostReply::ack()]),
    );
    assert_eq!(session.run(), Outcome::Completed);
    assert_eq!(session.context().get("picked"), Some(&json!("Red")));
}

#[test]
fn form_submission_is_stored_whole() {
    let mut session = session(
        vec![flow(json!({
            "meta": {"flow_id": "f", "locales": ["en"], "start_node": "form"},
            "nodes": {
                "form": {
                    "type": "form",
                    "text": "Your details",
                    "fields": [
                        {"name": "email", "label": "E-mail"},
                        {"name": "city"},
                    ],
                    "save_as": "details",
                    "next": "done",
                },
                "done": {"type": "end"},
            },
        }))],
        "f",
        ScriptedHost::with_replies(vec![
            HostReply::value(json!({"email": "ana@example.test", "city": "Graz"})),
            HostReply::ack(),
        ]),
    );
    assert_eq!(session.run(), Outcome::Completed);
    assert_eq!(
        session.context().get("details"),
        Some(&json!({"email": "ana@example.test", "city": "Graz"}))
    );
    match &session.host().prompts[0] {
        Prompt::Form { fields, .. } => {
            assert_eq!(fields[0], ("email".to_string(), "E-mail".to_string()));
            assert_eq!(fields[1], ("city".to_string(), "city".to_string()));
        }
        other => panic!("expected form prompt, got {other:?}"),
    }
}

#[test]
fn cancelling_mid_conversation_stops_cleanly() {
    let mut session = session(
        vec![flow(json!({
            "meta": {"flow_id": "c", "locales": ["en"], "start_node": "ask"},
            "nodes": {
                "ask": {
                    "type": "choice",
                    "text": "Continue?",
                    "options": [{"label": "Yes"}],
                    "next": "done",
                },
                "done": {"type": "end", "text": "never shown"},
            },
        }))],
        "c",
        ScriptedHost::with_replies(vec![HostReply::cancel()]),
    );
    assert_eq!(session.run(), Outcome::Cancelled);
    assert_eq!(session.host().prompts.len(), 1);
}

#[test]
fn loop_inside_a_conversation_feeds_later_nodes() {
    let mut session = session(
        vec![flow(json!({
            "meta": {"flow_id": "l", "locales": ["en"], "start_node": "collect"},
            "nodes": {
                "collect": {
                    "type": "foreach",
                    "source_list": "cart.items",
                    "append_list": [{"list": "names", "value": "{{item.name}}"}],
                    "after_loop": "summary",
                },
                "summary": {"type": "end", "text": "You chose: {{join(names, ', ')}}"},
            },
        }))],
        "l",
        ScriptedHost::default(),
    );
    session.context_mut().set(
        "cart",
        json!({"items": [{"name": "tea"}, {"name": "honey"}]}),
    );

    assert_eq!(session.run(), Outcome::Completed);
    match &session.host().prompts[0] {
        Prompt::End { text, .. } => assert_eq!(text, "You chose: tea, honey"),
        other => panic!("expected end prompt, got {other:?}"),
    }
}
