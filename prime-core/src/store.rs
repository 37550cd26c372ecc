//! Repository trait boundary over the relational persistence collaborator.
//!
//! Spec §1 names relational persistence as an external collaborator. Every
//! service in this crate is written against these narrow async traits rather
//! than a concrete SQL driver; [`memory`] provides a simple in-process
//! implementation used by tests and by the `prime` CLI's standalone mode.

use crate::types::*;
use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

#[async_trait]
pub trait BindingStore: Send + Sync {
    async fn active_bindings(&self, channel: &str) -> Vec<Binding>;
}

#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn get(&self, key: &str, actor_id: Uuid) -> Option<IdempotencyKey>;
    async fn insert_in_progress(
        &self,
        key: &str,
        actor_id: Uuid,
        method: &str,
        request_hash: &str,
        ttl_secs: i64,
    ) -> bool;
    async fn complete(&self, key: &str, actor_id: Uuid, response: serde_json::Value);
    async fn fail(&self, key: &str, actor_id: Uuid);
}

#[async_trait]
pub trait PairingStore: Send + Sync {
    async fn create_request(&self, req: PairingRequest);
    async fn is_paired(&self, agent_id: Uuid, channel: &str, account_id: Option<&str>, peer: &str) -> bool;
    async fn pair(&self, agent_id: Uuid, channel: &str, account_id: Option<&str>, peer: &str);
    async fn list_pending(&self) -> Vec<PairingRequest>;
    async fn resolve(&self, id: Uuid, approved: bool) -> bool;
}

#[async_trait]
pub trait KnowledgeBaseStore: Send + Sync {
    async fn chunks_for_kb(&self, kb_id: Uuid, limit: usize) -> Vec<DocumentChunk>;
    async fn active_kbs_for_agent(&self, agent_id: Uuid) -> Vec<KnowledgeBase>;
    async fn replace_chunks(&self, document_id: Uuid, chunks: Vec<DocumentChunk>);
}

#[async_trait]
pub trait NodeExecutionStore: Send + Sync {
    async fn insert_execution(&self, execution: NodeExecution);
    async fn get_execution(&self, id: Uuid) -> Option<NodeExecution>;
    async fn update_execution(&self, execution: NodeExecution);
    async fn insert_queue_entry(&self, entry: NodeApprovalQueueEntry);
    async fn get_queue_entry(&self, id: Uuid) -> Option<NodeApprovalQueueEntry>;
    async fn update_queue_entry(&self, entry: NodeApprovalQueueEntry);
    async fn list_pending_approvals(&self, limit: usize) -> Vec<NodeApprovalQueueEntry>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn find_active(&self, bot_id: Option<Uuid>, user_id: Uuid, agent_id: Uuid) -> Option<Session>;
    async fn create(&self, session: Session);
    async fn append_message(&self, message: Message);
    async fn history(&self, session_id: Uuid, limit: usize) -> Vec<Message>;
}

#[async_trait]
pub trait TriggerStore: Send + Sync {
    async fn active_cron_triggers(&self) -> Vec<CronTrigger>;
    async fn active_webhook_triggers(&self) -> Vec<WebhookTrigger>;
    async fn find_webhook_by_path(&self, path: &str) -> Option<WebhookTrigger>;
    async fn all_cron_triggers(&self) -> Vec<CronTrigger>;
    async fn all_webhook_triggers(&self) -> Vec<WebhookTrigger>;
    async fn create_cron(&self, trigger: CronTrigger);
    async fn create_webhook(&self, trigger: WebhookTrigger);
    async fn deactivate_cron(&self, id: Uuid) -> bool;
    async fn deactivate_webhook(&self, id: Uuid) -> bool;
}

#[async_trait]
pub trait DeviceAuthStore: Send + Sync {
    async fn create(&self, req: DeviceAuthRequest);
    async fn find_by_user_code(&self, user_code: &str) -> Option<DeviceAuthRequest>;
    async fn find_by_device_hash(&self, device_code_hash: &str) -> Option<DeviceAuthRequest>;
    async fn update(&self, req: DeviceAuthRequest);
}

/// Simple in-process implementations backed by `HashMap`s behind a `Mutex`.
/// Suitable for tests and for the CLI's `--standalone` mode; a real deployment
/// plugs in a SQL-backed implementation of these same traits.
pub mod memory {
    use super::*;
    use chrono::Utc;
    use tokio::sync::Mutex;

    #[derive(Default)]
    pub struct InMemoryStore {
        pub bindings: Mutex<Vec<Binding>>,
        pub idempotency: Mutex<HashMap<(String, Uuid), IdempotencyKey>>,
        pub pairing_requests: Mutex<Vec<PairingRequest>>,
        pub paired_devices: Mutex<Vec<PairedDevice>>,
        pub kb_chunks: Mutex<HashMap<Uuid, Vec<DocumentChunk>>>,
        pub kbs: Mutex<Vec<KnowledgeBase>>,
        pub executions: Mutex<HashMap<Uuid, NodeExecution>>,
        pub queue: Mutex<HashMap<Uuid, NodeApprovalQueueEntry>>,
        pub sessions: Mutex<Vec<Session>>,
        pub messages: Mutex<Vec<Message>>,
        pub cron_triggers: Mutex<Vec<CronTrigger>>,
        pub webhook_triggers: Mutex<Vec<WebhookTrigger>>,
        pub device_auth: Mutex<Vec<DeviceAuthRequest>>,
    }

    impl InMemoryStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl BindingStore for InMemoryStore {
        async fn active_bindings(&self, channel: &str) -> Vec<Binding> {
            self.bindings
                .lock()
                .await
                .iter()
                .filter(|b| b.active && b.channel == channel)
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl IdempotencyStore for InMemoryStore {
        async fn get(&self, key: &str, actor_id: Uuid) -> Option<IdempotencyKey> {
            let map = self.idempotency.lock().await;
            map.get(&(key.to_string(), actor_id)).cloned().filter(|k| k.expires_at > Utc::now())
        }

        async fn insert_in_progress(
            &self,
            key: &str,
            actor_id: Uuid,
            method: &str,
            request_hash: &str,
            ttl_secs: i64,
        ) -> bool {
            let mut map = self.idempotency.lock().await;
            let k = (key.to_string(), actor_id);
            if map.get(&k).map(|e| e.expires_at > Utc::now()).unwrap_or(false) {
                return false;
            }
            map.insert(
                k,
                IdempotencyKey {
                    key: key.to_string(),
                    actor_id,
                    method: method.to_string(),
                    request_hash: request_hash.to_string(),
                    status: IdempotencyStatus::InProgress,
                    response: None,
                    expires_at: Utc::now() + chrono::Duration::seconds(ttl_secs),
                },
            );
            true
        }

        async fn complete(&self, key: &str, actor_id: Uuid, response: serde_json::Value) {
            let mut map = self.idempotency.lock().await;
            if let Some(entry) = map.get_mut(&(key.to_string(), actor_id)) {
                entry.status = IdempotencyStatus::Completed;
                entry.response = Some(response);
            }
        }

        async fn fail(&self, key: &str, actor_id: Uuid) {
            let mut map = self.idempotency.lock().await;
            if let Some(entry) = map.get_mut(&(key.to_string(), actor_id)) {
                entry.status = IdempotencyStatus::Failed;
            }
        }
    }

    #[async_trait]
    impl PairingStore for InMemoryStore {
        async fn create_request(&self, req: PairingRequest) {
            self.pairing_requests.lock().await.push(req);
        }

        async fn is_paired(
            &self,
            agent_id: Uuid,
            channel: &str,
            account_id: Option<&str>,
            peer: &str,
        ) -> bool {
            self.paired_devices.lock().await.iter().any(|d| {
                d.agent_id == agent_id
                    && d.channel == channel
                    && d.account_id.as_deref() == account_id
                    && d.peer == peer
                    && d.revoked_at.is_none()
            })
        }

        async fn pair(&self, agent_id: Uuid, channel: &str, account_id: Option<&str>, peer: &str) {
            self.paired_devices.lock().await.push(PairedDevice {
                id: Uuid::new_v4(),
                agent_id,
                channel: channel.to_string(),
                account_id: account_id.map(str::to_string),
                peer: peer.to_string(),
                paired_at: Utc::now(),
                revoked_at: None,
            });
        }

        async fn list_pending(&self) -> Vec<PairingRequest> {
            self.pairing_requests.lock().await.iter().filter(|r| r.approved.is_none()).cloned().collect()
        }

        async fn resolve(&self, id: Uuid, approved: bool) -> bool {
            let mut requests = self.pairing_requests.lock().await;
            let Some(req) = requests.iter_mut().find(|r| r.id == id) else { return false };
            req.approved = Some(approved);
            if approved {
                let (agent_id, channel, account_id, peer) =
                    (req.agent_id, req.channel.clone(), req.account_id.clone(), req.peer.clone());
                drop(requests);
                self.pair(agent_id, &channel, account_id.as_deref(), &peer).await;
            }
            true
        }
    }

    #[async_trait]
    impl KnowledgeBaseStore for InMemoryStore {
        async fn chunks_for_kb(&self, kb_id: Uuid, limit: usize) -> Vec<DocumentChunk> {
            self.kb_chunks
                .lock()
                .await
                .get(&kb_id)
                .map(|c| c.iter().take(limit).cloned().collect())
                .unwrap_or_default()
        }

        async fn active_kbs_for_agent(&self, agent_id: Uuid) -> Vec<KnowledgeBase> {
            self.kbs
                .lock()
                .await
                .iter()
                .filter(|kb| kb.active && kb.agent_id == Some(agent_id))
                .cloned()
                .collect()
        }

        async fn replace_chunks(&self, document_id: Uuid, chunks: Vec<DocumentChunk>) {
            let mut map = self.kb_chunks.lock().await;
            for bucket in map.values_mut() {
                bucket.retain(|c| c.document_id != document_id);
            }
            if let Some(first) = chunks.first() {
                map.entry(first.knowledge_base_id).or_default().extend(chunks);
            }
        }
    }

    #[async_trait]
    impl NodeExecutionStore for InMemoryStore {
        async fn insert_execution(&self, execution: NodeExecution) {
            self.executions.lock().await.insert(execution.id, execution);
        }

        async fn get_execution(&self, id: Uuid) -> Option<NodeExecution> {
            self.executions.lock().await.get(&id).cloned()
        }

        async fn update_execution(&self, execution: NodeExecution) {
            self.executions.lock().await.insert(execution.id, execution);
        }

        async fn insert_queue_entry(&self, entry: NodeApprovalQueueEntry) {
            self.queue.lock().await.insert(entry.id, entry);
        }

        async fn get_queue_entry(&self, id: Uuid) -> Option<NodeApprovalQueueEntry> {
            self.queue.lock().await.get(&id).cloned()
        }

        async fn update_queue_entry(&self, entry: NodeApprovalQueueEntry) {
            self.queue.lock().await.insert(entry.id, entry);
        }

        async fn list_pending_approvals(&self, limit: usize) -> Vec<NodeApprovalQueueEntry> {
            let mut entries: Vec<_> = self
                .queue
                .lock()
                .await
                .values()
                .filter(|e| e.status == ApprovalStatus::Pending && e.expires_at > Utc::now())
                .cloned()
                .collect();
            entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            entries.truncate(limit);
            entries
        }
    }

    #[async_trait]
    impl SessionStore for InMemoryStore {
        async fn find_active(
            &self,
            bot_id: Option<Uuid>,
            user_id: Uuid,
            agent_id: Uuid,
        ) -> Option<Session> {
            self.sessions
                .lock()
                .await
                .iter()
                .find(|s| {
                    s.bot_id == bot_id
                        && s.user_id == user_id
                        && s.agent_id == agent_id
                        && s.status == SessionStatus::Active
                })
                .cloned()
        }

        async fn create(&self, session: Session) {
            self.sessions.lock().await.push(session);
        }

        async fn append_message(&self, message: Message) {
            self.messages.lock().await.push(message);
        }

        async fn history(&self, session_id: Uuid, limit: usize) -> Vec<Message> {
            let mut msgs: Vec<_> = self
                .messages
                .lock()
                .await
                .iter()
                .filter(|m| m.session_id == session_id)
                .cloned()
                .collect();
            let start = msgs.len().saturating_sub(limit);
            msgs.split_off(start)
        }
    }

    #[async_trait]
    impl TriggerStore for InMemoryStore {
        async fn active_cron_triggers(&self) -> Vec<CronTrigger> {
            self.cron_triggers.lock().await.iter().filter(|t| t.active).cloned().collect()
        }

        async fn active_webhook_triggers(&self) -> Vec<WebhookTrigger> {
            self.webhook_triggers.lock().await.iter().filter(|t| t.active).cloned().collect()
        }

        async fn find_webhook_by_path(&self, path: &str) -> Option<WebhookTrigger> {
            self.webhook_triggers
                .lock()
                .await
                .iter()
                .find(|t| t.active && t.path == path)
                .cloned()
        }

        async fn all_cron_triggers(&self) -> Vec<CronTrigger> {
            self.cron_triggers.lock().await.clone()
        }

        async fn all_webhook_triggers(&self) -> Vec<WebhookTrigger> {
            self.webhook_triggers.lock().await.clone()
        }

        async fn create_cron(&self, trigger: CronTrigger) {
            self.cron_triggers.lock().await.push(trigger);
        }

        async fn create_webhook(&self, trigger: WebhookTrigger) {
            self.webhook_triggers.lock().await.push(trigger);
        }

        async fn deactivate_cron(&self, id: Uuid) -> bool {
            let mut triggers = self.cron_triggers.lock().await;
            let Some(t) = triggers.iter_mut().find(|t| t.id == id) else { return false };
            t.active = false;
            true
        }

        async fn deactivate_webhook(&self, id: Uuid) -> bool {
            let mut triggers = self.webhook_triggers.lock().await;
            let Some(t) = triggers.iter_mut().find(|t| t.id == id) else { return false };
            t.active = false;
            true
        }
    }

    #[async_trait]
    impl DeviceAuthStore for InMemoryStore {
        async fn create(&self, req: DeviceAuthRequest) {
            self.device_auth.lock().await.push(req);
        }

        async fn find_by_user_code(&self, user_code: &str) -> Option<DeviceAuthRequest> {
            self.device_auth.lock().await.iter().find(|r| r.user_code == user_code).cloned()
        }

        async fn find_by_device_hash(&self, device_code_hash: &str) -> Option<DeviceAuthRequest> {
            self.device_auth
                .lock()
                .await
                .iter()
                .find(|r| r.device_code_hash == device_code_hash)
                .cloned()
        }

        async fn update(&self, req: DeviceAuthRequest) {
            let mut all = self.device_auth.lock().await;
            if let Some(existing) = all.iter_mut().find(|r| r.id == req.id) {
                *existing = req;
            }
        }
    }
}
