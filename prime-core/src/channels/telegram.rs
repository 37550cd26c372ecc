//! Telegram adapter — long-poll transport, no request signature (the bot
//! token itself is the secret). Outbound message edits are rate-limited
//! to roughly one per 500 ms and chunked at 4096 characters.

use super::ChannelAdapter;

pub const MAX_MESSAGE_LEN: usize = 4096;
pub const EDIT_INTERVAL_MS: u64 = 500;

pub struct TelegramAdapter {
    pub bot_token: String,
}

impl TelegramAdapter {
    pub fn new(bot_token: String) -> Self {
        Self { bot_token }
    }
}

impl ChannelAdapter for TelegramAdapter {
    fn channel_tag(&self) -> &str {
        "telegram"
    }

    fn max_message_len(&self) -> usize {
        MAX_MESSAGE_LEN
    }

    fn edit_interval_ms(&self) -> u64 {
        EDIT_INTERVAL_MS
    }
}

/// Extracts `@botname` mentions from message entities text, used to
/// populate `InboundMessage::bot_mentioned` for group chats.
pub fn text_mentions_bot(text: &str, bot_username: &str) -> bool {
    let needle = format!("@{bot_username}");
    text.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_mention_case_insensitively() {
        assert!(text_mentions_bot("hey @MyBot can you help", "mybot"));
        assert!(!text_mentions_bot("hey there", "mybot"));
    }

    #[test]
    fn adapter_reports_telegram_limits() {
        let adapter = TelegramAdapter::new("token".into());
        assert_eq!(adapter.channel_tag(), "telegram");
        assert_eq!(adapter.max_message_len(), 4096);
        assert_eq!(adapter.edit_interval_ms(), 500);
    }
}
