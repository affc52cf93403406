//! End-to-end scenarios driving the real [`Executor`] coordinator against a
//! canned streaming Model double (a bare TCP listener speaking just enough
//! HTTP/1.1 to serve one `chat/completions` SSE response per connection) and
//! the real built-in tool dispatcher. Mirrors the conversational-greeting
//! and external-injection scenarios used to validate the agent loop.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

use agentctl_broadcast::{BroadcastEvent, BroadcastFabric};
use agentctl_context::ContextManager;
use agentctl_core::types::Source;
use agentctl_fsm::model::ModelClient;
use agentctl_fsm::{Executor, Inbound};
use agentctl_store::Store;

/// Serve one canned SSE body per accepted connection, in order. Reqwest
/// opens a fresh connection per request because every response here closes
/// the connection, so request N gets `bodies[N]`.
fn spawn_mock_model(bodies: Vec<String>) -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    std_listener.set_nonblocking(true).unwrap();
    let addr = std_listener.local_addr().unwrap();
    let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();

    tokio::spawn(async move {
        for body in bodies {
            let Ok((mut socket, _)) = listener.accept().await else { break };
            let mut buf = vec![0u8; 8192];
            // Read headers; don't bother parsing Content-Length, the bodies
            // in these tests are small single-read affairs.
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n{body}"
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    format!("http://{addr}")
}

fn plain_text_sse(text: &str) -> String {
    format!(
        "data: {{\"choices\":[{{\"delta\":{{\"content\":\"{text}\"}}}}]}}\n\n\
         data: {{\"choices\":[],\"usage\":{{\"prompt_tokens\":10,\"completion_tokens\":2,\"total_tokens\":12}}}}\n\n\
         data: [DONE]\n\n"
    )
}

struct Harness {
    broadcast: BroadcastFabric,
    inbound: mpsc::Sender<Inbound>,
}

impl Harness {
    async fn start(model_bodies: Vec<String>) -> Self {
        let store = Store::open_in_memory().unwrap();
        let broadcast = BroadcastFabric::new();
        let context_manager = ContextManager::new(128_000);
        let dispatcher = Arc::new(agentctl_tools::build_default_dispatcher(
            store.clone(),
            broadcast.clone(),
        ));
        let endpoint = spawn_mock_model(model_bodies);
        let model = ModelClient::new(reqwest::Client::new(), endpoint, "test-model".to_string());
        let workspace = std::env::temp_dir().join(format!("agentctl-e2e-{}", std::process::id()));
        std::fs::create_dir_all(&workspace).unwrap();

        let executor = Executor::new(
            store,
            broadcast.clone(),
            context_manager,
            dispatcher,
            model,
            workspace,
            None,
        );

        let (inbound_tx, inbound_rx) = mpsc::channel::<Inbound>(16);
        tokio::spawn(async move {
            executor
                .run(
                    "You are a helpful test agent.".to_string(),
                    "[System: autonomous tick, nothing queued.]".to_string(),
                    inbound_rx,
                )
                .await;
        });

        Harness { broadcast, inbound: inbound_tx }
    }
}

#[tokio::test]
async fn conversational_greeting_round_trip() {
    let harness = Harness::start(vec![plain_text_sse("hello")]).await;

    // Register the observer before sending, so nothing is missed.
    let (_id, observer) = harness.broadcast.register();
    harness.inbound.send(Inbound::UserMessage("hi".to_string())).await.unwrap();

    let mut saw_user_message = false;
    let mut saw_assistant_message = false;
    let mut token_text = String::new();
    let mut saw_idle = false;

    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        let remaining = deadline - tokio::time::Instant::now();
        let Ok(event) = tokio::time::timeout(remaining, observer.recv()).await else { break };
        match &*event {
            BroadcastEvent::Message(msg) if matches!(msg.source, Source::User) => {
                assert_eq!(msg.content, "hi");
                saw_user_message = true;
            }
            BroadcastEvent::Message(msg) if matches!(msg.source, Source::Assistant) => {
                assert_eq!(msg.content, "hello");
                saw_assistant_message = true;
            }
            BroadcastEvent::Token { text, .. } => token_text.push_str(text),
            BroadcastEvent::FsmState { state, .. } if state == "idle" && saw_assistant_message => {
                saw_idle = true;
                break;
            }
            _ => {}
        }
    }

    assert!(saw_user_message, "expected a user message broadcast");
    assert_eq!(token_text, "hello");
    assert!(saw_assistant_message, "expected an assistant message broadcast");
    assert!(saw_idle, "expected the fsm to return to idle after the turn");
}

#[tokio::test]
async fn external_injection_wraps_content_and_records_source() {
    let harness = Harness::start(vec![plain_text_sse("noted")]).await;

    let events = {
        let (_id, observer) = harness.broadcast.register();
        harness
            .inbound
            .send(Inbound::ExternalMessage { source: "cron".to_string(), content: "tick".to_string() })
            .await
            .unwrap();

        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
        let mut events = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            let Ok(event) = tokio::time::timeout(remaining, observer.recv()).await else { break };
            let done = matches!(&*event, BroadcastEvent::FsmState { state, .. } if state == "idle");
            events.push(event);
            if done {
                break;
            }
        }
        events
    };

    let external_message = events.iter().find_map(|e| match &**e {
        BroadcastEvent::Message(msg) => match &msg.source {
            Source::External(name) => Some((name.clone(), msg.content.clone())),
            _ => None,
        },
        _ => None,
    });

    let (name, content) = external_message.expect("expected an external-sourced message broadcast");
    assert_eq!(name, "cron");
    assert_eq!(content, "[External message from cron]\ntick");
}
