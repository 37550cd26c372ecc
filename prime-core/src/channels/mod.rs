//! Channel Adapters (C10).
//!
//! Every adapter normalizes its transport-specific inbound event into an
//! [`InboundMessage`] and runs it through the shared twelve-step pipeline
//! in [`process_inbound`]. Transport-specific signature verification
//! lives in the per-channel submodules.

pub mod slack;
pub mod telegram;
pub mod web;
pub mod whatsapp;

use crate::agent_runner::AgentRunner;
use crate::event_bus::EventBus;
use crate::optimizer::{self, CostModel};
use crate::policy::{Decision, MessageContext, PolicyEngine};
use crate::rag::RagService;
use crate::store::{PairingStore, SessionStore};
use crate::types::{
    Agent, ContentType, Message, MessageRole, PairingRequest, Session, SessionStatus,
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// A transport-normalized inbound event, per spec §4.9's shared shape.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub channel: String,
    pub account_id: Option<String>,
    pub peer: String,
    pub sender_user_id: Uuid,
    pub text: String,
    pub is_group: bool,
    pub bot_mentioned: bool,
}

/// Outcome of running the pipeline: either a reply to send back, or a
/// reason the message was dropped/denied before reaching the agent.
#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    Reply(String),
    Dropped { reason: &'static str },
    PairingRequested,
}

/// Per-channel transport behavior: sending replies and chunking/rate
/// limiting rules (step 11 and the streaming-edit note in spec §4.9).
pub trait ChannelAdapter: Send + Sync {
    fn channel_tag(&self) -> &str;
    fn max_message_len(&self) -> usize {
        4096
    }
    fn edit_interval_ms(&self) -> u64 {
        500
    }
}

/// Splits `text` into chunks no larger than `max_len`, breaking on the
/// last newline within the limit when possible.
pub fn chunk_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }
    let mut chunks = Vec::new();
    let mut rest = text;
    while rest.len() > max_len {
        let slice = &rest[..max_len];
        let split_at = slice.rfind('\n').unwrap_or(max_len);
        let split_at = if split_at == 0 { max_len } else { split_at };
        chunks.push(rest[..split_at].to_string());
        rest = rest[split_at..].trim_start_matches('\n');
    }
    if !rest.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}

/// Services shared by the pipeline across every channel. Binding
/// resolution (step 1-2) is a precondition the caller runs via
/// [`crate::binding::BindingResolver`] before invoking [`process_inbound`]
/// with the agent it resolved.
pub struct PipelineDeps {
    pub pairing_store: Arc<dyn PairingStore>,
    pub session_store: Arc<dyn SessionStore>,
    pub rag: Arc<RagService>,
    pub runner: Arc<AgentRunner>,
    pub event_bus: Arc<EventBus>,
}

/// Runs the shared twelve-step pipeline for one inbound message against
/// one resolved agent and its default provider/model config.
pub async fn process_inbound(
    deps: &PipelineDeps,
    agent: &Agent,
    provider_id: Uuid,
    msg: &InboundMessage,
) -> PipelineOutcome {
    // Step 2 — binding resolution is assumed already done by the caller,
    // which picked `agent` from the Binding Resolver before invoking the
    // pipeline; step 1 (bot lookup) is likewise a channel-specific
    // precondition that happens before this call.

    // Step 3 — DM policy.
    let is_paired = deps
        .pairing_store
        .is_paired(agent.id, &msg.channel, msg.account_id.as_deref(), &msg.peer)
        .await;
    let ctx = MessageContext {
        is_group: msg.is_group,
        bot_mentioned: msg.bot_mentioned,
        sender_user_id: msg.sender_user_id,
        is_paired,
        peer: &msg.peer,
    };
    match PolicyEngine::evaluate(agent, &ctx) {
        Decision::Denied { reason } => return PipelineOutcome::Dropped { reason },
        Decision::PairingRequired => {
            deps.pairing_store
                .create_request(PairingRequest {
                    id: Uuid::new_v4(),
                    agent_id: agent.id,
                    channel: msg.channel.clone(),
                    account_id: msg.account_id.clone(),
                    peer: msg.peer.clone(),
                    expires_at: Utc::now() + chrono::Duration::hours(24),
                    approved: None,
                })
                .await;
            deps.event_bus
                .publish(
                    "pairing.requested",
                    serde_json::json!({ "agent_id": agent.id, "peer": msg.peer }),
                )
                .await;
            return PipelineOutcome::PairingRequested;
        }
        Decision::Allowed => {}
    }

    // Step 4 — find-or-create active session.
    let session = match deps.session_store.find_active(None, msg.sender_user_id, agent.id).await {
        Some(s) => s,
        None => {
            let s = Session {
                id: Uuid::new_v4(),
                bot_id: None,
                user_id: msg.sender_user_id,
                agent_id: agent.id,
                provider_id,
                status: SessionStatus::Active,
                created_at: Utc::now(),
            };
            deps.session_store.create(s.clone()).await;
            s
        }
    };

    let user_message = Message {
        id: Uuid::new_v4(),
        session_id: session.id,
        role: MessageRole::User,
        content: msg.text.clone(),
        content_type: ContentType::Text,
        meta: serde_json::Value::Null,
        created_at: Utc::now(),
    };
    deps.session_store.append_message(user_message.clone()).await;

    // Step 5 — conversation history.
    let history = if agent.memory_enabled {
        deps.session_store.history(session.id, agent.max_history_messages).await
    } else {
        vec![user_message.clone()]
    };

    // Step 6 — RAG context (agent-scoped).
    let rag_hits = deps.rag.search_for_agent(agent.id, &msg.text, 5).await;
    let rag_context = RagService::format_context(&rag_hits);

    // Step 7 is web search, out of scope for this in-process pipeline
    // (delegated to the `search_web` tool when the agent has it enabled).

    // Step 8 — system prompt assembly.
    let mut system_prompt = agent.system_prompt.clone();
    if let Some(ctx) = rag_context {
        system_prompt.push_str("\n\n");
        system_prompt.push_str(&ctx);
    }

    // Step 9 — token optimization.
    let opt_config = Default::default();
    let (plan, trimmed_history) = optimizer::build_plan(
        &msg.text,
        &system_prompt,
        &history,
        &opt_config,
        &Default::default(),
        CostModel::default(),
    );

    // Step 10 — run the agent. Code-execution-enabled agents need tools in
    // scope, which rules out streaming; everything else streams its
    // tokens to the Event Bus as they're produced.
    deps.event_bus
        .publish("stream.start", serde_json::json!({ "session_id": session.id, "agent_id": agent.id }))
        .await;

    let result = if agent.code_execution_enabled {
        deps.runner.run(system_prompt, trimmed_history, session.id, plan.output_budget_tokens).await
    } else {
        deps.runner
            .run_streaming(system_prompt, trimmed_history, session.id, plan.output_budget_tokens, &deps.event_bus)
            .await
    };

    let reply = match result {
        Ok(r) => {
            deps.event_bus
                .publish("stream.end", serde_json::json!({ "session_id": session.id, "agent_id": agent.id }))
                .await;
            r.text
        }
        Err(e) => {
            deps.event_bus
                .publish("stream.error", serde_json::json!({ "session_id": session.id, "agent_id": agent.id, "error": e.to_string() }))
                .await;
            format!("Sorry, I couldn't process that: {e}")
        }
    };

    // Step 12 — persist the assistant reply with usage metadata.
    let assistant_message = Message {
        id: Uuid::new_v4(),
        session_id: session.id,
        role: MessageRole::Assistant,
        content: reply.clone(),
        content_type: ContentType::Text,
        meta: serde_json::json!({ "optimizer": plan }),
        created_at: Utc::now(),
    };
    deps.session_store.append_message(assistant_message).await;

    PipelineOutcome::Reply(reply)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_message_returns_single_chunk_when_short() {
        let chunks = chunk_message("hello", 4096);
        assert_eq!(chunks, vec!["hello".to_string()]);
    }

    #[test]
    fn chunk_message_splits_long_text() {
        let text = "a".repeat(5000);
        let chunks = chunk_message(&text, 4096);
        assert!(chunks.len() >= 2);
        assert!(chunks.iter().all(|c| c.len() <= 4096));
    }

    #[test]
    fn chunk_message_prefers_newline_boundary() {
        let text = format!("{}\n{}", "a".repeat(10), "b".repeat(10));
        let chunks = chunk_message(&text, 15);
        assert_eq!(chunks[0], "a".repeat(10));
    }
}
