//! Slack adapter — Events API / Socket Mode transport. Requests are
//! verified with HMAC-SHA256 over `v0:{timestamp}:{body}`, rejecting any
//! request whose timestamp has drifted more than 5 minutes.

use super::ChannelAdapter;
use hmac::{Hmac, Mac};
use sha2::Sha256;

pub const MAX_MESSAGE_LEN: usize = 40_000;
const MAX_SKEW_SECS: i64 = 300;

type HmacSha256 = Hmac<Sha256>;

pub struct SlackAdapter {
    pub bot_token: String,
    pub signing_secret: String,
}

impl SlackAdapter {
    pub fn new(bot_token: String, signing_secret: String) -> Self {
        Self { bot_token, signing_secret }
    }
}

impl ChannelAdapter for SlackAdapter {
    fn channel_tag(&self) -> &str {
        "slack"
    }

    fn max_message_len(&self) -> usize {
        MAX_MESSAGE_LEN
    }
}

/// Verifies `X-Slack-Signature` against `v0:{timestamp}:{body}`, rejecting
/// requests whose timestamp is more than 5 minutes away from `now`.
pub fn verify_signature(
    signing_secret: &str,
    timestamp: i64,
    body: &str,
    signature: &str,
    now: i64,
) -> bool {
    if (now - timestamp).abs() > MAX_SKEW_SECS {
        return false;
    }
    let base = format!("v0:{timestamp}:{body}");
    let expected = compute_signature(signing_secret, &base);
    constant_time_eq(expected.as_bytes(), signature.as_bytes())
}

fn compute_signature(signing_secret: &str, base: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(signing_secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(base.as_bytes());
    format!("v0={}", hex_encode(&mac.finalize().into_bytes()))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_signature_within_skew_is_accepted() {
        let secret = "shhh";
        let ts = 1_700_000_000;
        let body = "payload=hello";
        let sig = compute_signature(secret, &format!("v0:{ts}:{body}"));
        assert!(verify_signature(secret, ts, body, &sig, ts + 10));
    }

    #[test]
    fn signature_outside_skew_is_rejected() {
        let secret = "shhh";
        let ts = 1_700_000_000;
        let body = "payload=hello";
        let sig = compute_signature(secret, &format!("v0:{ts}:{body}"));
        assert!(!verify_signature(secret, ts, body, &sig, ts + 301));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let ts = 1_700_000_000;
        let body = "payload=hello";
        let sig = compute_signature("right-secret", &format!("v0:{ts}:{body}"));
        assert!(!verify_signature("wrong-secret", ts, body, &sig, ts));
    }
}
