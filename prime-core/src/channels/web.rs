//! Web/WebSocket channel — inbound text arrives over the same gateway
//! connection used for control-plane RPC (§4.12); no external signature
//! verification is needed since the connection is already authenticated.

use super::ChannelAdapter;

pub const MAX_MESSAGE_LEN: usize = 16_384;

pub struct WebAdapter;

impl ChannelAdapter for WebAdapter {
    fn channel_tag(&self) -> &str {
        "web"
    }

    fn max_message_len(&self) -> usize {
        MAX_MESSAGE_LEN
    }

    fn edit_interval_ms(&self) -> u64 {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_web_limits() {
        let adapter = WebAdapter;
        assert_eq!(adapter.channel_tag(), "web");
        assert_eq!(adapter.edit_interval_ms(), 0);
    }
}
