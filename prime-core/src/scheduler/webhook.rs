//! Webhook triggers (C14) — an inbound POST to a registered path is
//! signature-verified (if the trigger has a secret) and its JSON payload is
//! interpolated into `message_template` before being dispatched as a turn.

use crate::agent_runner::AgentRunner;
use crate::error::SchedulerError;
use crate::optimizer::DEFAULT_OUTPUT_MAX_TOKENS;
use crate::store::{SessionStore, TriggerStore};
use crate::types::{ContentType, Message, MessageRole, Session, SessionStatus, WebhookTrigger};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use std::sync::Arc;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Verify an inbound webhook's `X-Signature: sha256=<hex>` header against
/// `secret`. A trigger with no secret configured skips verification.
pub fn verify_signature(secret: Option<&str>, body: &[u8], signature: Option<&str>) -> Result<bool, SchedulerError> {
    let Some(secret) = secret else { return Ok(true) };
    let sig = signature.ok_or_else(|| SchedulerError::WebhookVerificationFailed {
        message: "missing signature header".to_string(),
    })?;
    let hex_sig = sig.strip_prefix("sha256=").unwrap_or(sig);
    let expected = hex_decode(hex_sig).ok_or_else(|| SchedulerError::WebhookVerificationFailed {
        message: "invalid hex signature".to_string(),
    })?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| SchedulerError::WebhookVerificationFailed { message: e.to_string() })?;
    mac.update(body);
    Ok(mac.verify_slice(&expected).is_ok())
}

/// Substitutes `{{field}}` placeholders in `template` with string values
/// looked up from a flat JSON object payload. Missing fields are left as an
/// empty string rather than failing the dispatch.
pub fn interpolate_template(template: &str, payload: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        rest = &rest[start + 2..];
        let Some(end) = rest.find("}}") else {
            out.push_str("{{");
            out.push_str(rest);
            rest = "";
            break;
        };
        let field = rest[..end].trim();
        let value = payload.get(field).map(value_to_text).unwrap_or_default();
        out.push_str(&value);
        rest = &rest[end + 2..];
    }
    out.push_str(rest);
    out
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

/// Looks up a registered trigger by path, verifies and dispatches the
/// inbound POST as an agent turn against a synthetic session.
pub struct WebhookDispatcher {
    trigger_store: Arc<dyn TriggerStore>,
    session_store: Arc<dyn SessionStore>,
    runner: Arc<AgentRunner>,
}

impl WebhookDispatcher {
    pub fn new(trigger_store: Arc<dyn TriggerStore>, session_store: Arc<dyn SessionStore>, runner: Arc<AgentRunner>) -> Self {
        Self { trigger_store, session_store, runner }
    }

    pub async fn dispatch(&self, path: &str, body: &[u8], signature: Option<&str>) -> Result<String, SchedulerError> {
        let trigger = self
            .trigger_store
            .find_webhook_by_path(path)
            .await
            .ok_or_else(|| SchedulerError::UnknownWebhookPath { path: path.to_string() })?;

        if !verify_signature(trigger.secret.as_deref(), body, signature)? {
            return Err(SchedulerError::WebhookVerificationFailed { message: "signature mismatch".to_string() });
        }

        let payload: Value = serde_json::from_slice(body).unwrap_or(Value::Null);
        let text = interpolate_template(&trigger.message_template, &payload);
        let result = self.run_turn(&trigger, text).await;
        Ok(result)
    }

    async fn run_turn(&self, trigger: &WebhookTrigger, text: String) -> String {
        let session = Session {
            id: Uuid::new_v4(),
            bot_id: None,
            user_id: trigger.agent_id,
            agent_id: trigger.agent_id,
            provider_id: trigger.agent_id,
            status: SessionStatus::Active,
            created_at: chrono::Utc::now(),
        };
        self.session_store.create(session.clone()).await;
        let user_message = Message {
            id: Uuid::new_v4(),
            session_id: session.id,
            role: MessageRole::User,
            content: text,
            content_type: ContentType::Text,
            meta: Value::Null,
            created_at: chrono::Utc::now(),
        };
        self.session_store.append_message(user_message.clone()).await;

        match self.runner.run(String::new(), vec![user_message], session.id, DEFAULT_OUTPUT_MAX_TOKENS).await {
            Ok(result) => result.text,
            Err(e) => format!("webhook dispatch failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_secret_skips_verification() {
        assert!(verify_signature(None, b"body", None).unwrap());
    }

    #[test]
    fn missing_signature_header_is_rejected() {
        let err = verify_signature(Some("secret"), b"body", None).unwrap_err();
        assert!(matches!(err, SchedulerError::WebhookVerificationFailed { .. }));
    }

    #[test]
    fn matching_signature_verifies() {
        let mut mac = HmacSha256::new_from_slice(b"secret").unwrap();
        mac.update(b"hello");
        let sig = mac.finalize().into_bytes();
        let hex: String = sig.iter().map(|b| format!("{b:02x}")).collect();
        let header = format!("sha256={hex}");
        assert!(verify_signature(Some("secret"), b"hello", Some(&header)).unwrap());
    }

    #[test]
    fn tampered_body_fails_verification() {
        let mut mac = HmacSha256::new_from_slice(b"secret").unwrap();
        mac.update(b"hello");
        let sig = mac.finalize().into_bytes();
        let hex: String = sig.iter().map(|b| format!("{b:02x}")).collect();
        let header = format!("sha256={hex}");
        assert!(!verify_signature(Some("secret"), b"goodbye", Some(&header)).unwrap());
    }

    #[test]
    fn interpolate_substitutes_known_fields() {
        let payload = serde_json::json!({"name": "Ada", "repo": "prime"});
        let out = interpolate_template("new PR from {{name}} on {{repo}}", &payload);
        assert_eq!(out, "new PR from Ada on prime");
    }

    #[test]
    fn interpolate_leaves_missing_fields_blank() {
        let payload = serde_json::json!({"name": "Ada"});
        let out = interpolate_template("{{name}} touched {{missing}}", &payload);
        assert_eq!(out, "Ada touched ");
    }
}
