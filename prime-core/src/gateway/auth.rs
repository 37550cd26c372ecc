//! Nonce-challenge + JWT/password handshake for `/ws/events` (spec §4.12).
//!
//! Unlike the bare token list this is generalized from, a client must first
//! request a single-use nonce, then present a JWT (or legacy password) signed
//! over that nonce within [`NONCE_TTL_SECS`].

use crate::error::GatewayError;
use crate::types::{User, UserRole};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, Validation, decode};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub const NONCE_TTL_SECS: i64 = 60;
pub const NONCE_BYTES: usize = 24;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthClaims {
    pub sub: Uuid,
    pub scopes: Vec<String>,
    pub exp: i64,
}

struct PendingNonce {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Issues and verifies connect-handshake nonces, then validates the
/// JWT (or password) a client presents against that nonce.
pub struct GatewayAuth {
    jwt_secret: Option<String>,
    pending: std::sync::Mutex<HashMap<Uuid, PendingNonce>>,
}

impl GatewayAuth {
    pub fn new(jwt_secret: Option<String>) -> Self {
        Self { jwt_secret, pending: std::sync::Mutex::new(HashMap::new()) }
    }

    /// Whether the gateway is running with no secret configured (open mode,
    /// used only for local/standalone development per spec §4.12).
    pub fn is_open_mode(&self) -> bool {
        self.jwt_secret.is_none()
    }

    /// Mint a nonce for a freshly-connected socket, keyed by connection id.
    pub fn issue_nonce(&self, connection_id: Uuid) -> String {
        let mut bytes = [0u8; NONCE_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        let nonce = hex_encode(&bytes);
        let mut pending = self.pending.lock().expect("nonce map poisoned");
        pending.insert(
            connection_id,
            PendingNonce { value: nonce.clone(), expires_at: Utc::now() + Duration::seconds(NONCE_TTL_SECS) },
        );
        nonce
    }

    fn take_nonce(&self, connection_id: Uuid, presented: &str) -> Result<(), GatewayError> {
        let mut pending = self.pending.lock().expect("nonce map poisoned");
        match pending.remove(&connection_id) {
            Some(entry) if entry.expires_at > Utc::now() && entry.value == presented => Ok(()),
            _ => Err(GatewayError::AuthFailed),
        }
    }

    /// Validate a `connect` request: the presented nonce must match the one
    /// issued for this connection, and the token must decode to live claims.
    pub fn authenticate(&self, connection_id: Uuid, nonce: &str, token: Option<&str>) -> Result<AuthClaims, GatewayError> {
        self.take_nonce(connection_id, nonce)?;
        if self.is_open_mode() {
            return Ok(AuthClaims { sub: Uuid::nil(), scopes: vec!["*".to_string()], exp: 0 });
        }
        let secret = self.jwt_secret.as_deref().unwrap_or_default();
        let token = token.ok_or(GatewayError::AuthFailed)?;
        let data = decode::<AuthClaims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| GatewayError::AuthFailed)?;
        Ok(data.claims)
    }

    /// Password fallback for clients that can't hold a JWT (legacy CLI use).
    /// Compares against [`User::password_hash`] using the same SHA-256
    /// digest the idempotency service uses for canonical hashing.
    pub fn authenticate_password(&self, user: &User, password: &str) -> Result<AuthClaims, GatewayError> {
        let hash = user.password_hash.as_deref().ok_or(GatewayError::AuthFailed)?;
        if sha256_hex(password) != hash {
            return Err(GatewayError::AuthFailed);
        }
        let scopes = match user.role {
            UserRole::Admin => vec!["*".to_string()],
            UserRole::User => vec!["health.read".to_string(), "bindings.resolve".to_string()],
        };
        Ok(AuthClaims { sub: user.id, scopes, exp: 0 })
    }
}

fn sha256_hex(input: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(input.as_bytes());
    hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_mode_accepts_any_matching_nonce() {
        let auth = GatewayAuth::new(None);
        let conn = Uuid::new_v4();
        let nonce = auth.issue_nonce(conn);
        let claims = auth.authenticate(conn, &nonce, None).unwrap();
        assert!(claims.scopes.contains(&"*".to_string()));
    }

    #[test]
    fn wrong_nonce_is_rejected() {
        let auth = GatewayAuth::new(None);
        let conn = Uuid::new_v4();
        auth.issue_nonce(conn);
        let err = auth.authenticate(conn, "not-the-nonce", None).unwrap_err();
        assert!(matches!(err, GatewayError::AuthFailed));
    }

    #[test]
    fn nonce_is_single_use() {
        let auth = GatewayAuth::new(None);
        let conn = Uuid::new_v4();
        let nonce = auth.issue_nonce(conn);
        assert!(auth.authenticate(conn, &nonce, None).is_ok());
        assert!(auth.authenticate(conn, &nonce, None).is_err());
    }

    #[test]
    fn password_auth_checks_hash() {
        let auth = GatewayAuth::new(Some("secret".to_string()));
        let user = User {
            id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            username: "alice".to_string(),
            telegram_id: None,
            role: UserRole::Admin,
            password_hash: Some(sha256_hex("correct horse")),
            api_token_hash: None,
        };
        assert!(auth.authenticate_password(&user, "correct horse").is_ok());
        assert!(auth.authenticate_password(&user, "wrong").is_err());
    }
}
