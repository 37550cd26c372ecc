//! `prime shell` — an offline interactive REPL against a mock LLM provider
//! and the full `prime-tools` toolset, wired to a throwaway in-process
//! store. Useful for exercising the agent runner and tools without a real
//! provider or server; not a substitute for `prime start` + a real channel.

use anyhow::Result;
use chrono::Utc;
use prime_core::agent_runner::AgentRunner;
use prime_core::event_bus::EventBus;
use prime_core::providers::MockLlmProvider;
use prime_core::rag::{NoEmbedder, RagService};
use prime_core::store::memory::InMemoryStore;
use prime_core::types::{ContentType, Message, MessageRole};
use prime_tools::ToolContext;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

pub async fn run(workspace: &Path, gateway_base_url: String) -> Result<()> {
    println!("prime shell — offline demo, responses come from a mock provider, not a real model.");
    println!("Type a message and press Enter; 'exit' or Ctrl-D to quit.\n");

    let store = Arc::new(InMemoryStore::new());
    let rag = Arc::new(RagService::new(store.clone(), Arc::new(NoEmbedder)));
    let agent_id = Uuid::new_v4();
    let events = Arc::new(EventBus::default());

    let ctx = ToolContext {
        workspace: workspace.to_path_buf(),
        agent_id,
        default_kb_id: None,
        rag: rag.clone(),
        kb_store: store.clone(),
        triggers: store.clone(),
        sessions: store.clone(),
        events: events.clone(),
        gateway_base_url,
    };
    let registry = Arc::new(prime_tools::build_registry(&ctx));

    let provider = Arc::new(MockLlmProvider::new());
    provider.queue_response(MockLlmProvider::text_response(
        "This is the offline demo shell; plug in a real provider via `prime start` for live conversations.",
    ));
    let runner = AgentRunner::new(provider, registry);

    let session_id = Uuid::new_v4();
    let mut history = Vec::new();
    let stdin = std::io::stdin();

    loop {
        print!("> ");
        std::io::stdout().flush().ok();
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        history.push(Message {
            id: Uuid::new_v4(),
            session_id,
            role: MessageRole::User,
            content: line.to_string(),
            content_type: ContentType::Text,
            meta: serde_json::Value::Null,
            created_at: Utc::now(),
        });

        match runner.run("You are Prime, a helpful assistant.".to_string(), history.clone(), session_id, 1024).await {
            Ok(result) => {
                println!("{}\n", result.text);
                history.push(Message {
                    id: Uuid::new_v4(),
                    session_id,
                    role: MessageRole::Assistant,
                    content: result.text,
                    content_type: ContentType::Text,
                    meta: serde_json::Value::Null,
                    created_at: Utc::now(),
                });
            }
            Err(e) => eprintln!("error: {e}\n"),
        }
    }

    Ok(())
}
