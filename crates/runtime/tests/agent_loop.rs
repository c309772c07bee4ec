mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::{ScriptedBackend, call, query_spec, test_registry};
use runtime::{
    Agent, AgentConfig, AgentError, ModelError, ModelReply, ROUND_TRIP_LIMIT_MESSAGE,
    RespondContext, Role, ToolRegistry,
};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

fn agent(backend: &Arc<ScriptedBackend>, executions: &Arc<AtomicUsize>) -> Agent<ScriptedBackend> {
    Agent::new(backend.clone(), Arc::new(test_registry(executions.clone())))
}

fn content_json(content: Option<&str>) -> Value {
    serde_json::from_str(content.unwrap()).unwrap()
}

#[tokio::test]
async fn plain_answer_needs_one_round_trip() {
    let backend = Arc::new(ScriptedBackend::new([ModelReply::text("Try the Musée d'Orsay.")]));
    let executions = Arc::new(AtomicUsize::new(0));
    let mut agent = agent(&backend, &executions);

    let reply = agent.respond("Where can I see Monet?").await.unwrap();

    assert_eq!(reply, "Try the Musée d'Orsay.");
    assert_eq!(backend.calls(), 1);
    let roles: Vec<_> = agent.transcript().iter().map(|t| t.role).collect();
    assert_eq!(roles, [Role::User, Role::Assistant]);
    assert_eq!(executions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn tool_groups_precede_the_final_answer() {
    let backend = Arc::new(ScriptedBackend::new([
        ModelReply::tool_calls(vec![call("1", "echo", r#"{"query":"Pop Art"}"#)]),
        ModelReply::ToolCalls {
            content: Some("Looking further.".into()),
            calls: vec![
                call("2", "echo", r#"{"query":"Warhol"}"#),
                call("3", "echo", r#"{"query":"Lichtenstein"}"#),
            ],
        },
        ModelReply::text("Here is some Pop Art."),
    ]));
    let executions = Arc::new(AtomicUsize::new(0));
    let mut agent = agent(&backend, &executions);

    let reply = agent.respond("Pop Art please").await.unwrap();
    assert_eq!(reply, "Here is some Pop Art.");

    let roles: Vec<_> = agent.transcript().iter().map(|t| t.role).collect();
    assert_eq!(
        roles,
        [
            Role::User,
            Role::Assistant,
            Role::Tool,
            Role::Assistant,
            Role::Tool,
            Role::Tool,
            Role::Assistant,
        ]
    );
    let turns = agent.transcript().turns();
    assert_eq!(turns[1].tool_calls.len(), 1);
    assert!(turns[1].content.is_none());
    assert_eq!(turns[3].content.as_deref(), Some("Looking further."));
    assert_eq!(turns[2].content.as_deref(), Some(r#""Pop Art""#));
    assert_eq!(turns[6].content.as_deref(), Some("Here is some Pop Art."));
    assert!(agent.transcript().unresolved_calls().is_empty());

    // Each round-trip re-sends the whole transcript, tool results included.
    let seen = backend.seen();
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[0].len(), 1);
    assert_eq!(seen[1].len(), 3);
    assert_eq!(seen[2].len(), 6);
    assert_eq!(executions.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn tool_results_follow_request_order_not_latency() {
    let backend = Arc::new(ScriptedBackend::new([
        ModelReply::tool_calls(vec![
            call("a", "slow_a", r#"{"query":"1"}"#),
            call("b", "slow_b", r#"{"query":"2"}"#),
            call("c", "slow_c", r#"{"query":"3"}"#),
        ]),
        ModelReply::text("done"),
    ]));
    let executions = Arc::new(AtomicUsize::new(0));
    let mut agent = agent(&backend, &executions);

    agent.respond("go").await.unwrap();

    let results: Vec<_> = agent
        .transcript()
        .iter()
        .filter(|t| t.role == Role::Tool)
        .map(|t| t.tool_call_id.clone().unwrap())
        .collect();
    assert_eq!(results, ["a", "b", "c"]);
    let first = &agent.transcript().turns()[2];
    assert_eq!(content_json(first.content.as_deref())["tool"], "slow_a");
}

#[tokio::test]
async fn unknown_tool_is_reported_to_the_model() {
    let backend = Arc::new(ScriptedBackend::new([
        ModelReply::tool_calls(vec![call("1", "search_museums", r#"{"query":"Paris"}"#)]),
        ModelReply::text("I can't search museums, sorry."),
    ]));
    let executions = Arc::new(AtomicUsize::new(0));
    let mut agent = agent(&backend, &executions);

    let reply = agent.respond("museums in Paris?").await.unwrap();
    assert_eq!(reply, "I can't search museums, sorry.");

    let tool_turn = &agent.transcript().turns()[2];
    assert_eq!(tool_turn.role, Role::Tool);
    assert!(tool_turn.is_error);
    assert_eq!(
        content_json(tool_turn.content.as_deref())["error"],
        "tool not found: search_museums"
    );
    assert_eq!(backend.calls(), 2);
}

#[tokio::test]
async fn malformed_arguments_never_reach_the_tool() {
    let backend = Arc::new(ScriptedBackend::new([
        ModelReply::tool_calls(vec![
            call("1", "echo", "query=Banksy"),
            call("2", "echo", r#"["Banksy"]"#),
        ]),
        ModelReply::text("Let me try again later."),
    ]));
    let executions = Arc::new(AtomicUsize::new(0));
    let mut agent = agent(&backend, &executions);

    agent.respond("Banksy").await.unwrap();

    for turn in &agent.transcript().turns()[2..4] {
        let error = content_json(turn.content.as_deref())["error"].clone();
        assert!(error.as_str().unwrap().starts_with("malformed arguments"));
    }
    assert_eq!(executions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn tool_failure_does_not_abort_the_turn() {
    let backend = Arc::new(ScriptedBackend::new([
        ModelReply::tool_calls(vec![
            call("1", "broken", r#"{"query":"Rococo"}"#),
            call("2", "echo", r#"{"query":"Rococo"}"#),
        ]),
        ModelReply::text("Partial results only."),
    ]));
    let executions = Arc::new(AtomicUsize::new(0));
    let mut agent = agent(&backend, &executions);

    let reply = agent.respond("Rococo").await.unwrap();
    assert_eq!(reply, "Partial results only.");

    let turns = agent.transcript().turns();
    assert_eq!(
        content_json(turns[2].content.as_deref())["error"],
        "execution failed: art database unavailable"
    );
    assert!(!turns[3].is_error);
    assert_eq!(executions.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn endless_tool_requests_stop_at_the_ceiling() {
    let backend = Arc::new(ScriptedBackend::always(ModelReply::tool_calls(vec![call(
        "loop",
        "echo",
        r#"{"query":"again"}"#,
    )])));
    let executions = Arc::new(AtomicUsize::new(0));
    let mut agent = agent(&backend, &executions).with_config(AgentConfig {
        max_round_trips: 3,
        ..AgentConfig::default()
    });

    let err = agent.respond("never stop").await.unwrap_err();

    assert!(matches!(err, AgentError::RoundTripLimit { limit: 3 }));
    assert_eq!(err.user_message(), ROUND_TRIP_LIMIT_MESSAGE);
    assert_eq!(backend.calls(), 3);
    assert_eq!(executions.load(Ordering::SeqCst), 3);

    let last = agent.transcript().last().unwrap();
    assert_eq!(last.role, Role::Assistant);
    assert_eq!(last.content.as_deref(), Some(ROUND_TRIP_LIMIT_MESSAGE));
    assert!(agent.transcript().unresolved_calls().is_empty());
}

#[tokio::test]
async fn per_call_ceiling_overrides_config() {
    let backend = Arc::new(ScriptedBackend::always(ModelReply::tool_calls(vec![call(
        "loop",
        "echo",
        r#"{"query":"again"}"#,
    )])));
    let executions = Arc::new(AtomicUsize::new(0));
    let mut agent = agent(&backend, &executions);

    let ctx = RespondContext::default().with_max_round_trips(2);
    let err = agent.respond_with("never stop", &ctx).await.unwrap_err();

    assert!(matches!(err, AgentError::RoundTripLimit { limit: 2 }));
    assert_eq!(backend.calls(), 2);
}

#[tokio::test]
async fn zero_ceiling_still_consults_the_model_once() {
    let backend = Arc::new(ScriptedBackend::new([ModelReply::text("hello")]));
    let executions = Arc::new(AtomicUsize::new(0));
    let mut agent = agent(&backend, &executions).with_config(AgentConfig {
        max_round_trips: 0,
        ..AgentConfig::default()
    });

    assert_eq!(agent.respond("hi").await.unwrap(), "hello");
}

#[tokio::test]
async fn gateway_failure_keeps_the_transcript_usable() {
    let backend = Arc::new(ScriptedBackend::with_results([
        Err(ModelError::Network("connection reset".into())),
        Ok(ModelReply::text("Back online.")),
    ]));
    let executions = Arc::new(AtomicUsize::new(0));
    let mut agent = agent(&backend, &executions);

    let err = agent.respond("first").await.unwrap_err();
    assert!(matches!(err, AgentError::Gateway(ModelError::Network(_))));
    assert_eq!(agent.transcript().len(), 1);

    let reply = agent.respond("second").await.unwrap();
    assert_eq!(reply, "Back online.");
    let roles: Vec<_> = agent.transcript().iter().map(|t| t.role).collect();
    assert_eq!(roles, [Role::User, Role::User, Role::Assistant]);
}

#[tokio::test]
async fn cancelled_before_start_records_only_the_user_turn() {
    let backend = Arc::new(ScriptedBackend::new([ModelReply::text("unused")]));
    let executions = Arc::new(AtomicUsize::new(0));
    let mut agent = agent(&backend, &executions);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = agent
        .respond_with("hello?", &RespondContext::new(cancel))
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::Cancelled));
    assert_eq!(backend.calls(), 0);
    assert_eq!(agent.transcript().len(), 1);
    assert_eq!(agent.transcript().turns()[0].role, Role::User);
}

#[tokio::test]
async fn cancel_mid_batch_resolves_every_request() {
    let cancel = CancellationToken::new();
    let started = Arc::new(AtomicUsize::new(0));

    let mut registry = ToolRegistry::new();
    let token = cancel.clone();
    let counter = started.clone();
    registry
        .register_fn(query_spec("hang"), move |_| {
            let token = token.clone();
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                token.cancel();
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(Value::Null)
            }
        })
        .unwrap();

    let backend = Arc::new(ScriptedBackend::new([ModelReply::tool_calls(vec![
        call("1", "hang", r#"{"query":"x"}"#),
        call("2", "hang", r#"{"query":"y"}"#),
    ])]));
    let mut agent = Agent::new(backend.clone(), Arc::new(registry));

    let err = agent
        .respond_with("go", &RespondContext::new(cancel))
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::Cancelled));
    assert_eq!(started.load(Ordering::SeqCst), 1);
    let turns = agent.transcript().turns();
    assert_eq!(turns.len(), 4);
    for turn in &turns[2..] {
        assert_eq!(
            content_json(turn.content.as_deref())["error"],
            "cancelled before completion"
        );
    }
    assert!(agent.transcript().unresolved_calls().is_empty());
}

#[tokio::test]
async fn slow_tool_times_out_and_the_loop_continues() {
    let mut registry = ToolRegistry::new();
    registry
        .register_fn(query_spec("sluggish"), |_| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(json!("too late"))
        })
        .unwrap();

    let backend = Arc::new(ScriptedBackend::new([
        ModelReply::tool_calls(vec![call("1", "sluggish", r#"{"query":"x"}"#)]),
        ModelReply::text("The search took too long."),
    ]));
    let mut agent = Agent::new(backend.clone(), Arc::new(registry)).with_config(AgentConfig {
        tool_timeout: Some(Duration::from_millis(20)),
        ..AgentConfig::default()
    });

    let reply = agent.respond("x").await.unwrap();
    assert_eq!(reply, "The search took too long.");
    assert_eq!(
        content_json(agent.transcript().turns()[2].content.as_deref())["error"],
        "timeout after 20ms"
    );
}

#[tokio::test]
async fn specs_are_sent_on_every_round_trip() {
    struct SpecCounter(std::sync::Mutex<Vec<usize>>);

    impl runtime::Backend for SpecCounter {
        async fn call(
            &self,
            request: runtime::ModelRequest<'_>,
        ) -> Result<runtime::ModelResponse, ModelError> {
            let mut seen = self.0.lock().unwrap();
            seen.push(request.tools.len());
            let reply = if seen.len() == 1 {
                ModelReply::tool_calls(vec![call("1", "echo", r#"{"query":"x"}"#)])
            } else {
                ModelReply::text("ok")
            };
            Ok(reply.into())
        }
    }

    let backend = Arc::new(SpecCounter(Default::default()));
    let executions = Arc::new(AtomicUsize::new(0));
    let mut agent = Agent::new(backend.clone(), Arc::new(test_registry(executions)));
    agent.respond("x").await.unwrap();

    assert_eq!(*backend.0.lock().unwrap(), [5, 5]);
}
