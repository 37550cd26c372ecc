//! DM Policy (C4).
//!
//! Decides whether an inbound message is allowed to reach an agent, per
//! spec §4.4's policy table. `pairing` is the only policy with a
//! side effect (emitting a pairing request) and so is handled by
//! [`PolicyEngine::evaluate`] returning a [`Decision::PairingRequired`]
//! for the caller to act on, rather than performing the write itself.

use crate::types::{Agent, DmPolicy};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied { reason: &'static str },
    /// `pairing` policy with no existing pairing: caller must create a
    /// `PairingRequest` and notify the admin chat, then deny this message.
    PairingRequired,
}

#[derive(Debug, Clone, Copy)]
pub struct MessageContext<'a> {
    pub is_group: bool,
    pub bot_mentioned: bool,
    pub sender_user_id: Uuid,
    pub is_paired: bool,
    pub peer: &'a str,
}

pub struct PolicyEngine;

impl PolicyEngine {
    pub fn evaluate(agent: &Agent, ctx: &MessageContext<'_>) -> Decision {
        match agent.dm_policy {
            DmPolicy::Disabled => Decision::Denied { reason: "dm_policy_disabled" },
            DmPolicy::Open => {
                if Self::group_mention_ok(agent, ctx) {
                    Decision::Allowed
                } else {
                    Decision::Denied { reason: "mention_required" }
                }
            }
            DmPolicy::Allowlist => {
                if !agent.allowed_user_ids.contains(&ctx.sender_user_id) {
                    return Decision::Denied { reason: "not_in_allowlist" };
                }
                if Self::group_mention_ok(agent, ctx) {
                    Decision::Allowed
                } else {
                    Decision::Denied { reason: "mention_required" }
                }
            }
            DmPolicy::Pairing => {
                if agent.allowed_user_ids.contains(&ctx.sender_user_id) || ctx.is_paired {
                    if Self::group_mention_ok(agent, ctx) {
                        Decision::Allowed
                    } else {
                        Decision::Denied { reason: "mention_required" }
                    }
                } else {
                    Decision::PairingRequired
                }
            }
        }
    }

    fn group_mention_ok(agent: &Agent, ctx: &MessageContext<'_>) -> bool {
        !ctx.is_group || !agent.group_requires_mention || ctx.bot_mentioned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(policy: DmPolicy, allowed: Vec<Uuid>, group_requires_mention: bool) -> Agent {
        Agent {
            id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            name: "a".into(),
            default_provider_id: Uuid::new_v4(),
            workspace_path: None,
            dm_policy: policy,
            allowed_user_ids: allowed,
            group_requires_mention,
            system_prompt: String::new(),
            web_search_enabled: false,
            memory_enabled: false,
            max_history_messages: 20,
            code_execution_enabled: false,
            active: true,
        }
    }

    fn ctx(is_group: bool, bot_mentioned: bool, sender: Uuid, is_paired: bool) -> MessageContext<'static> {
        MessageContext {
            is_group,
            bot_mentioned,
            sender_user_id: sender,
            is_paired,
            peer: "peer",
        }
    }

    #[test]
    fn disabled_always_denies() {
        let a = agent(DmPolicy::Disabled, vec![], false);
        let c = ctx(false, false, Uuid::new_v4(), false);
        assert_eq!(PolicyEngine::evaluate(&a, &c), Decision::Denied { reason: "dm_policy_disabled" });
    }

    #[test]
    fn open_private_chat_allowed() {
        let a = agent(DmPolicy::Open, vec![], false);
        let c = ctx(false, false, Uuid::new_v4(), false);
        assert_eq!(PolicyEngine::evaluate(&a, &c), Decision::Allowed);
    }

    #[test]
    fn open_group_requires_mention_when_configured() {
        let a = agent(DmPolicy::Open, vec![], true);
        let unmentioned = ctx(true, false, Uuid::new_v4(), false);
        assert_eq!(
            PolicyEngine::evaluate(&a, &unmentioned),
            Decision::Denied { reason: "mention_required" }
        );
        let mentioned = ctx(true, true, Uuid::new_v4(), false);
        assert_eq!(PolicyEngine::evaluate(&a, &mentioned), Decision::Allowed);
    }

    #[test]
    fn allowlist_denies_unknown_sender() {
        let known = Uuid::new_v4();
        let a = agent(DmPolicy::Allowlist, vec![known], false);
        let c = ctx(false, false, Uuid::new_v4(), false);
        assert_eq!(PolicyEngine::evaluate(&a, &c), Decision::Denied { reason: "not_in_allowlist" });
    }

    #[test]
    fn pairing_requires_pairing_for_unknown_sender() {
        let a = agent(DmPolicy::Pairing, vec![], false);
        let c = ctx(false, false, Uuid::new_v4(), false);
        assert_eq!(PolicyEngine::evaluate(&a, &c), Decision::PairingRequired);
    }

    #[test]
    fn pairing_allows_already_paired_sender() {
        let a = agent(DmPolicy::Pairing, vec![], false);
        let c = ctx(false, false, Uuid::new_v4(), true);
        assert_eq!(PolicyEngine::evaluate(&a, &c), Decision::Allowed);
    }

    #[test]
    fn pairing_allows_allowlisted_sender_without_prior_pairing() {
        let sender = Uuid::new_v4();
        let a = agent(DmPolicy::Pairing, vec![sender], false);
        let c = ctx(false, false, sender, false);
        assert_eq!(PolicyEngine::evaluate(&a, &c), Decision::Allowed);
    }
}
