//! Binding Resolver (C3) — read-only, side-effect free.
//!
//! Resolves which agent should handle an inbound message on a given
//! channel/bot/account/peer, preferring the most specific configured
//! binding.

use crate::store::BindingStore;
use crate::types::Binding;
use std::sync::Arc;

pub struct BindingResolver {
    store: Arc<dyn BindingStore>,
}

impl BindingResolver {
    pub fn new(store: Arc<dyn BindingStore>) -> Self {
        Self { store }
    }

    /// Resolve the single active binding for `(channel, bot_id, account_id, peer)`,
    /// or `None` if nothing matches.
    pub async fn resolve(
        &self,
        channel: &str,
        bot_id: Option<uuid::Uuid>,
        account_id: Option<&str>,
        peer: Option<&str>,
    ) -> Option<Binding> {
        let candidates = self.store.active_bindings(channel).await;
        resolve_from(&candidates, bot_id, account_id, peer)
    }
}

/// Tier: lower is more specific. Mirrors spec §4.3's four-tier table.
fn tier(binding: &Binding, bot_id: Option<uuid::Uuid>, account_id: Option<&str>, peer: Option<&str>) -> Option<u8> {
    let bot_matches = binding.bot_id == bot_id;
    let bot_wild = binding.bot_id.is_none();
    let account_matches = binding.account_id.as_deref() == account_id;
    let account_wild = binding.account_id.is_none();
    let peer_matches = binding.peer.as_deref() == peer;
    let peer_wild = binding.peer.is_none();

    if bot_matches && account_matches && peer_matches {
        Some(0)
    } else if bot_matches && account_matches && peer_wild {
        Some(1)
    } else if bot_matches && account_wild && peer_wild {
        Some(2)
    } else if bot_wild && account_wild && peer_wild {
        Some(3)
    } else {
        None
    }
}

fn resolve_from(
    candidates: &[Binding],
    bot_id: Option<uuid::Uuid>,
    account_id: Option<&str>,
    peer: Option<&str>,
) -> Option<Binding> {
    let mut best: Option<(u8, &Binding)> = None;
    for binding in candidates {
        let Some(t) = tier(binding, bot_id, account_id, peer) else {
            continue;
        };
        best = match best {
            None => Some((t, binding)),
            Some((best_tier, best_binding)) => {
                if t < best_tier
                    || (t == best_tier && binding.priority < best_binding.priority)
                    || (t == best_tier
                        && binding.priority == best_binding.priority
                        && binding.id < best_binding.id)
                {
                    Some((t, binding))
                } else {
                    Some((best_tier, best_binding))
                }
            }
        };
    }
    best.map(|(_, b)| b.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn binding(
        bot_id: Option<Uuid>,
        account_id: Option<&str>,
        peer: Option<&str>,
        priority: i64,
    ) -> Binding {
        Binding {
            id: Uuid::new_v4(),
            agent_id: Uuid::new_v4(),
            bot_id,
            channel: "telegram".into(),
            account_id: account_id.map(str::to_string),
            peer: peer.map(str::to_string),
            priority,
            active: true,
        }
    }

    #[test]
    fn exact_match_wins_over_wildcard() {
        let bot = Uuid::new_v4();
        let exact = binding(Some(bot), Some("acct"), Some("peer1"), 10);
        let wild = binding(Some(bot), None, None, 0);
        let resolved =
            resolve_from(&[wild, exact.clone()], Some(bot), Some("acct"), Some("peer1")).unwrap();
        assert_eq!(resolved.id, exact.id);
    }

    #[test]
    fn peer_wildcard_beats_account_wildcard() {
        let bot = Uuid::new_v4();
        let peer_wild = binding(Some(bot), Some("acct"), None, 10);
        let account_wild = binding(Some(bot), None, None, 0);
        let resolved = resolve_from(
            &[account_wild, peer_wild.clone()],
            Some(bot),
            Some("acct"),
            Some("peer1"),
        )
        .unwrap();
        assert_eq!(resolved.id, peer_wild.id);
    }

    #[test]
    fn lowest_priority_wins_within_tier() {
        let bot = Uuid::new_v4();
        let low = binding(Some(bot), None, None, 1);
        let high = binding(Some(bot), None, None, 5);
        let resolved = resolve_from(&[high, low.clone()], Some(bot), Some("x"), Some("y")).unwrap();
        assert_eq!(resolved.id, low.id);
    }

    #[test]
    fn no_match_returns_none() {
        let bot = Uuid::new_v4();
        let other_bot = Uuid::new_v4();
        let b = binding(Some(other_bot), Some("acct"), Some("peer"), 0);
        assert!(resolve_from(&[b], Some(bot), Some("acct"), Some("peer")).is_none());
    }
}
