//! Cron triggers (C14) — loads active [`CronTrigger`] rows on start and
//! fires the agent runner with the stored message as a user turn against a
//! synthetic session on each trigger's schedule.

use crate::agent_runner::AgentRunner;
use crate::error::SchedulerError;
use crate::event_bus::EventBus;
use crate::store::SessionStore;
use crate::types::{ContentType, CronTrigger, Message, MessageRole, Session, SessionStatus};
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};
use uuid::Uuid;

/// Runtime tracking for one active cron trigger, mirroring the
/// last_run/next_run bookkeeping of a simple in-process scheduler.
struct TrackedJob {
    trigger: CronTrigger,
    last_run: Option<DateTime<Utc>>,
    next_run: Option<DateTime<Utc>>,
    run_count: u64,
}

impl TrackedJob {
    fn new(trigger: CronTrigger) -> Result<Self, SchedulerError> {
        let schedule = parse_cron_expression(&trigger.schedule)?;
        let next_run = schedule.after(&Utc::now()).next();
        Ok(Self { trigger, last_run: None, next_run, run_count: 0 })
    }

    fn is_due(&self) -> bool {
        self.trigger.active && self.next_run.map(|n| n <= Utc::now()).unwrap_or(false)
    }

    fn mark_executed(&mut self) {
        let now = Utc::now();
        self.last_run = Some(now);
        self.run_count += 1;
        if let Ok(schedule) = parse_cron_expression(&self.trigger.schedule) {
            self.next_run = schedule.after(&now).next();
        }
    }
}

fn parse_cron_expression(expr: &str) -> Result<Schedule, SchedulerError> {
    Schedule::from_str(expr).map_err(|e| SchedulerError::InvalidCronExpression {
        expression: expr.to_string(),
        message: e.to_string(),
    })
}

/// Per-agent runners the scheduler fires triggers against, keyed by
/// `Agent.id`. Built by the caller (CLI wiring) from each agent's
/// configured provider and tool set.
pub type RunnerTable = HashMap<Uuid, Arc<AgentRunner>>;

pub struct CronScheduler {
    jobs: Mutex<HashMap<Uuid, TrackedJob>>,
    session_store: Arc<dyn SessionStore>,
    runners: RunnerTable,
    event_bus: Arc<EventBus>,
}

impl CronScheduler {
    pub fn new(session_store: Arc<dyn SessionStore>, runners: RunnerTable, event_bus: Arc<EventBus>) -> Self {
        Self { jobs: Mutex::new(HashMap::new()), session_store, runners, event_bus }
    }

    /// Register (or replace) a trigger. Parses and validates its cron
    /// expression immediately so bad schedules fail at load time.
    pub async fn load_trigger(&self, trigger: CronTrigger) -> Result<(), SchedulerError> {
        let job = TrackedJob::new(trigger)?;
        self.jobs.lock().await.insert(job.trigger.id, job);
        Ok(())
    }

    pub async fn load_all(&self, triggers: Vec<CronTrigger>) {
        for trigger in triggers {
            let id = trigger.id.to_string();
            if let Err(e) = self.load_trigger(trigger).await {
                error!(trigger_id = %id, error = %e, "skipping cron trigger with invalid schedule");
            }
        }
    }

    /// Run every due trigger once. Intended to be called on a short tick
    /// (e.g. every 30s) by the hosting binary. A failed run is logged and
    /// does not disable the trigger, per spec.
    pub async fn run_due(&self) {
        let due_ids: Vec<Uuid> = {
            let jobs = self.jobs.lock().await;
            jobs.values().filter(|j| j.is_due()).map(|j| j.trigger.id).collect()
        };
        for id in due_ids {
            self.fire(id).await;
        }
    }

    async fn fire(&self, trigger_id: Uuid) {
        let (agent_id, message) = {
            let jobs = self.jobs.lock().await;
            match jobs.get(&trigger_id) {
                Some(job) => (job.trigger.agent_id, job.trigger.message.clone()),
                None => return,
            }
        };

        let Some(runner) = self.runners.get(&agent_id) else {
            error!(%trigger_id, %agent_id, "no agent runner configured for cron trigger");
            return;
        };

        let session = Session {
            id: Uuid::new_v4(),
            bot_id: None,
            user_id: agent_id,
            agent_id,
            provider_id: agent_id,
            status: SessionStatus::Active,
            created_at: Utc::now(),
        };
        self.session_store.create(session.clone()).await;
        let user_message = Message {
            id: Uuid::new_v4(),
            session_id: session.id,
            role: MessageRole::User,
            content: message.clone(),
            content_type: ContentType::Text,
            meta: serde_json::Value::Null,
            created_at: Utc::now(),
        };
        self.session_store.append_message(user_message.clone()).await;

        match runner
            .run(String::new(), vec![user_message], session.id, crate::optimizer::DEFAULT_OUTPUT_MAX_TOKENS)
            .await
        {
            Ok(result) => {
                info!(%trigger_id, "cron trigger fired successfully");
                self.event_bus
                    .publish("cron.fired", serde_json::json!({ "trigger_id": trigger_id, "text": result.text }))
                    .await;
            }
            Err(e) => {
                error!(%trigger_id, error = %e, "cron trigger run failed");
                self.event_bus
                    .publish("cron.failed", serde_json::json!({ "trigger_id": trigger_id, "error": e.to_string() }))
                    .await;
            }
        }

        if let Some(job) = self.jobs.lock().await.get_mut(&trigger_id) {
            job.mark_executed();
        }
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MockLlmProvider;
    use crate::store::memory::InMemoryStore;
    use crate::tools::ToolRegistry;

    fn trigger(schedule: &str) -> CronTrigger {
        CronTrigger {
            id: Uuid::new_v4(),
            agent_id: Uuid::new_v4(),
            name: "daily-standup".to_string(),
            schedule: schedule.to_string(),
            message: "post the standup summary".to_string(),
            active: true,
        }
    }

    #[tokio::test]
    async fn invalid_schedule_is_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let scheduler = CronScheduler::new(store, RunnerTable::new(), Arc::new(EventBus::default()));
        let mut bad = trigger("not a cron");
        bad.schedule = "nope".to_string();
        assert!(scheduler.load_trigger(bad).await.is_err());
    }

    #[tokio::test]
    async fn valid_schedule_is_tracked() {
        let store = Arc::new(InMemoryStore::new());
        let scheduler = CronScheduler::new(store, RunnerTable::new(), Arc::new(EventBus::default()));
        scheduler.load_trigger(trigger("0 * * * * * *")).await.unwrap();
        assert_eq!(scheduler.len().await, 1);
    }

    #[tokio::test]
    async fn due_job_fires_agent_runner() {
        let store: Arc<dyn SessionStore> = Arc::new(InMemoryStore::new());
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_response(MockLlmProvider::text_response("standup: all green"));
        let tools = Arc::new(ToolRegistry::new());
        let runner = Arc::new(AgentRunner::new(provider, tools));
        let mut runners = RunnerTable::new();
        let t = trigger("* * * * * * *");
        runners.insert(t.agent_id, runner);
        let event_bus = Arc::new(EventBus::default());
        let mut sub = event_bus.subscribe().await;
        let scheduler = CronScheduler::new(store, runners, event_bus);
        scheduler.load_trigger(t).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        scheduler.run_due().await;
        let event = sub.rx.recv().await.unwrap();
        assert_eq!(event.topic, "cron.fired");
    }
}
