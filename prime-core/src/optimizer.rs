//! Token Optimizer (C5).
//!
//! Produces a request plan before every provider call: which model to
//! route to, how many output tokens to budget, and which slice of history
//! fits the input budget. Constants and heuristics are carried over
//! verbatim from the original token optimizer so that behavior doesn't
//! silently drift from a system operators have already tuned.

use crate::types::{Message, MessageRole, ModelConfig, TokenOptimizationConfig};
use regex::Regex;
use std::sync::OnceLock;

pub const DEFAULT_INPUT_BUDGET_TOKENS: i64 = 6000;
pub const DEFAULT_OUTPUT_MIN_TOKENS: i64 = 192;
pub const DEFAULT_OUTPUT_MAX_TOKENS: i64 = 1024;
pub const DEFAULT_MESSAGE_TOKEN_CAP: i64 = 1200;
pub const DEFAULT_TOKEN_BUFFER: i64 = 96;
pub const MIN_TRUNCATION_TOKENS: i64 = 48;
pub const DEFAULT_OUTPUT_RATIO: f64 = 1.8;
pub const SHORT_HINT_CAP: i64 = 256;
pub const LONG_HINT_FLOOR: i64 = 1024;

const SIMPLE_MAX_CHARS: usize = 600;
const SIMPLE_MAX_NEWLINES: usize = 5;

fn complex_prompt_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)```|\b(architect|migration|benchmark|optimiz|refactor|debug|deploy|pipeline|sql|python|typescript)\b").unwrap()
    })
}

fn complex_prompt_ru_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(архитект|миграц|оптимиз|рефактор|дебаг|деплой|пайплайн|тест|документац|поэтапн|подробно|код)").unwrap()
    })
}

fn short_answer_hint_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(brief|briefly|short|one[- ]line|tl;?dr|кратко|вкратце)\b").unwrap())
}

fn long_answer_hint_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(detailed|in[- ]depth|step[- ]by[- ]step|comprehensive|подробно|пошагово)\b").unwrap()
    })
}

/// `ceil(chars/4)`, floored at 1 for any non-empty text.
pub fn estimate_text_tokens(text: &str) -> i64 {
    let len = text.chars().count() as i64;
    if len == 0 {
        return 0;
    }
    std::cmp::max(1, (len + 3) / 4)
}

fn is_simple_prompt(text: &str) -> bool {
    let chars = text.chars().count();
    let newlines = text.matches('\n').count();
    chars <= SIMPLE_MAX_CHARS
        && newlines <= SIMPLE_MAX_NEWLINES
        && !complex_prompt_re().is_match(text)
        && !complex_prompt_ru_re().is_match(text)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Complexity {
    Simple,
    Complex,
}

/// Step 1 — model routing. Returns the model name to use, or `None` to
/// keep the provider's default model.
pub fn route_model(
    user_text: &str,
    opt: &TokenOptimizationConfig,
    models: &std::collections::HashMap<String, ModelConfig>,
) -> Option<String> {
    if !opt.auto_route_enabled {
        return None;
    }
    let complexity = if is_simple_prompt(user_text) {
        Complexity::Simple
    } else {
        Complexity::Complex
    };
    let key = match complexity {
        Complexity::Simple => "simple",
        Complexity::Complex => "complex",
    };
    if let Some(model) = opt.route_by_complexity.get(key) {
        return Some(model.clone());
    }
    if complexity == Complexity::Simple {
        return models
            .iter()
            .min_by(|(_, a), (_, b)| {
                let cost_a = a.cost_per_1m_input.unwrap_or(f64::MAX) + a.cost_per_1m_output.unwrap_or(f64::MAX);
                let cost_b = b.cost_per_1m_input.unwrap_or(f64::MAX) + b.cost_per_1m_output.unwrap_or(f64::MAX);
                cost_a.partial_cmp(&cost_b).unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(name, _)| name.clone());
    }
    None
}

/// `max(low, min(high, value))`, matching the original's `_clamp` rather
/// than `i64::clamp`, which panics if `high < low`.
fn clamp(value: i64, low: i64, high: i64) -> i64 {
    std::cmp::max(low, std::cmp::min(high, value))
}

/// Step 2 — output token budget.
pub fn choose_output_budget(user_text: &str, user_tokens: i64, opt: &TokenOptimizationConfig, model_max_output: Option<i64>) -> i64 {
    let max_output_ceiling = model_max_output.unwrap_or(DEFAULT_OUTPUT_MAX_TOKENS);
    if let Some(cap) = opt.max_output_tokens {
        return clamp(cap, 64, max_output_ceiling);
    }
    let ratio = opt.output_to_input_ratio.unwrap_or(DEFAULT_OUTPUT_RATIO);
    let dynamic = (user_tokens as f64 * ratio).round() as i64;
    let max_allowed = std::cmp::min(DEFAULT_OUTPUT_MAX_TOKENS, max_output_ceiling);
    let mut budget = clamp(dynamic, DEFAULT_OUTPUT_MIN_TOKENS, max_allowed);

    if short_answer_hint_re().is_match(user_text) {
        budget = std::cmp::min(budget, SHORT_HINT_CAP);
    } else if long_answer_hint_re().is_match(user_text) {
        budget = std::cmp::max(budget, LONG_HINT_FLOOR);
    }
    clamp(budget, 64, max_output_ceiling)
}

fn role_overhead(role: MessageRole) -> i64 {
    match role {
        MessageRole::User | MessageRole::Assistant => 8,
        MessageRole::Tool => 8,
    }
}

fn system_overhead() -> i64 {
    10
}

/// Clips `text` to its last `max_tokens` worth of characters (roughly
/// `max_tokens * 4` chars), keeping the tail rather than the head — the
/// most recent content in a message is what the model most needs.
fn truncate_text_to_tokens(text: &str, max_tokens: i64) -> String {
    if max_tokens <= 0 {
        return String::new();
    }
    if estimate_text_tokens(text) <= max_tokens {
        return text.to_string();
    }
    let max_chars = (max_tokens * 4) as usize;
    if max_chars <= 3 {
        return String::new();
    }
    let chars: Vec<char> = text.chars().collect();
    let start = chars.len().saturating_sub(max_chars);
    chars[start..].iter().collect()
}

/// Step 3 — trim history to fit the remaining input budget, walking
/// newest-first and re-emitting in chronological order. Tool-role messages
/// are excluded from budget accounting entirely, same as the original.
pub fn trim_history_to_budget(
    history: &[Message],
    system_prompt: &str,
    user_text: &str,
    input_budget: i64,
    max_message_tokens: i64,
) -> Vec<Message> {
    let mut remaining = input_budget
        - system_overhead()
        - estimate_text_tokens(system_prompt)
        - role_overhead(MessageRole::User)
        - estimate_text_tokens(user_text)
        - DEFAULT_TOKEN_BUFFER;

    let mut admitted = Vec::new();
    for msg in history.iter().rev() {
        if msg.role == MessageRole::Tool {
            continue;
        }
        if remaining <= 0 {
            break;
        }
        let overhead = role_overhead(msg.role);
        let content = truncate_text_to_tokens(&msg.content, max_message_tokens);
        let tokens = estimate_text_tokens(&content);
        let cost = overhead + tokens;
        if cost <= remaining {
            let mut kept = msg.clone();
            kept.content = content;
            admitted.push(kept);
            remaining -= cost;
        } else {
            let available_for_text = remaining - overhead;
            if available_for_text >= MIN_TRUNCATION_TOKENS {
                let clipped = truncate_text_to_tokens(&content, available_for_text);
                if !clipped.is_empty() {
                    let mut truncated = msg.clone();
                    truncated.content = clipped;
                    admitted.push(truncated);
                    remaining = 0;
                }
            }
            break;
        }
    }
    admitted.reverse();
    admitted
}

/// Per-token cost rates used for step 4's cost estimate.
#[derive(Debug, Clone, Copy, Default)]
pub struct CostModel {
    pub cost_per_1m_input: f64,
    pub cost_per_1m_output: f64,
}

impl CostModel {
    pub fn estimate(&self, input_tokens: i64, output_tokens: i64) -> f64 {
        (input_tokens as f64 / 1_000_000.0) * self.cost_per_1m_input
            + (output_tokens as f64 / 1_000_000.0) * self.cost_per_1m_output
    }
}

/// The plan attached to outbound message metadata under `optimizer`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct OptimizationPlan {
    pub model: Option<String>,
    pub output_budget_tokens: i64,
    pub input_tokens_estimated: i64,
    pub history_trimmed: bool,
    pub estimated_cost: f64,
}

pub fn build_plan(
    user_text: &str,
    system_prompt: &str,
    history: &[Message],
    opt: &TokenOptimizationConfig,
    models: &std::collections::HashMap<String, ModelConfig>,
    cost_model: CostModel,
) -> (OptimizationPlan, Vec<Message>) {
    let model = route_model(user_text, opt, models);
    let user_tokens = estimate_text_tokens(user_text);
    let model_max_output = model
        .as_ref()
        .and_then(|m| models.get(m))
        .and_then(|m| m.max_tokens);
    let output_budget = choose_output_budget(user_text, user_tokens, opt, model_max_output);
    let input_budget = opt.input_budget_tokens.unwrap_or(DEFAULT_INPUT_BUDGET_TOKENS);
    let max_message_tokens = opt.max_message_tokens.unwrap_or(DEFAULT_MESSAGE_TOKEN_CAP);
    let trimmed = trim_history_to_budget(history, system_prompt, user_text, input_budget, max_message_tokens);
    let history_trimmed = trimmed.len() < history.len();

    let input_tokens_estimated = estimate_text_tokens(system_prompt)
        + user_tokens
        + trimmed.iter().map(|m| estimate_text_tokens(&m.content)).sum::<i64>();

    let plan = OptimizationPlan {
        model,
        output_budget_tokens: output_budget,
        input_tokens_estimated,
        history_trimmed,
        estimated_cost: cost_model.estimate(input_tokens_estimated, output_budget),
    };
    (plan, trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn msg(role: MessageRole, content: &str) -> Message {
        Message {
            id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            role,
            content: content.to_string(),
            content_type: crate::types::ContentType::Text,
            meta: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn estimate_text_tokens_matches_ceil_chars_over_4() {
        assert_eq!(estimate_text_tokens(""), 0);
        assert_eq!(estimate_text_tokens("ab"), 1);
        assert_eq!(estimate_text_tokens("abcde"), 2);
        assert_eq!(estimate_text_tokens(&"x".repeat(400)), 100);
    }

    #[test]
    fn simple_prompt_detection() {
        assert!(is_simple_prompt("hello there, how are you"));
        assert!(!is_simple_prompt("please explain the architecture of this system in detail"));
        assert!(!is_simple_prompt(&"\n".repeat(6)));
    }

    #[test]
    fn output_budget_respects_explicit_cap() {
        let opt = TokenOptimizationConfig {
            max_output_tokens: Some(500),
            ..Default::default()
        };
        assert_eq!(choose_output_budget("hi", 1, &opt, None), 500);
    }

    #[test]
    fn output_budget_short_hint_caps_at_256() {
        let opt = TokenOptimizationConfig::default();
        let budget = choose_output_budget("give me a brief answer", 500, &opt, None);
        assert!(budget <= SHORT_HINT_CAP);
    }

    #[test]
    fn output_budget_long_hint_floors_at_1024() {
        let opt = TokenOptimizationConfig::default();
        let budget = choose_output_budget("give a detailed step-by-step answer", 10, &opt, None);
        assert_eq!(budget, LONG_HINT_FLOOR);
    }

    #[test]
    fn trim_history_keeps_most_recent_within_budget() {
        let history = vec![
            msg(MessageRole::User, "first message way back"),
            msg(MessageRole::Assistant, "first reply"),
            msg(MessageRole::User, "second message"),
            msg(MessageRole::Assistant, "second reply"),
        ];
        let trimmed = trim_history_to_budget(&history, "system", "latest user text", 60, DEFAULT_MESSAGE_TOKEN_CAP);
        assert!(trimmed.len() <= history.len());
        // chronological order preserved
        for w in trimmed.windows(2) {
            assert!(w[0].created_at <= w[1].created_at);
        }
    }

    #[test]
    fn trim_history_tail_truncates_when_partial_budget_remains() {
        let history = vec![msg(MessageRole::User, &"word ".repeat(100))];
        let trimmed = trim_history_to_budget(&history, "", "", 40, DEFAULT_MESSAGE_TOKEN_CAP);
        if let Some(m) = trimmed.first() {
            assert!(m.content.len() < "word ".repeat(100).len());
        }
    }

    #[test]
    fn route_model_picks_cheapest_for_simple_prompt() {
        let mut models = std::collections::HashMap::new();
        models.insert(
            "cheap".to_string(),
            ModelConfig {
                cost_per_1m_input: Some(0.1),
                cost_per_1m_output: Some(0.2),
                ..Default::default()
            },
        );
        models.insert(
            "expensive".to_string(),
            ModelConfig {
                cost_per_1m_input: Some(5.0),
                cost_per_1m_output: Some(10.0),
                ..Default::default()
            },
        );
        let opt = TokenOptimizationConfig {
            auto_route_enabled: true,
            ..Default::default()
        };
        let chosen = route_model("hello there", &opt, &models);
        assert_eq!(chosen.as_deref(), Some("cheap"));
    }

    #[test]
    fn route_model_disabled_returns_none() {
        let opt = TokenOptimizationConfig::default();
        assert_eq!(route_model("hello", &opt, &std::collections::HashMap::new()), None);
    }
}
