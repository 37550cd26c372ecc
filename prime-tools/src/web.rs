//! Web tools that don't need a full browser: a text-stripping page fetch
//! and a DuckDuckGo-backed search.

use async_trait::async_trait;
use prime_core::error::ToolError;
use prime_core::tools::Tool;
use prime_core::types::RiskLevel;
use std::time::Duration;

const FETCH_CAP_BYTES: usize = 8 * 1024;

/// Crude tag/script/style stripper; good enough for cap-then-read content,
/// not a full HTML parse.
fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    let mut skip_until: Option<&str> = None;
    let lower = html.to_lowercase();

    let mut chars = html.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if let Some(tag) = skip_until {
            if lower[i..].starts_with(&format!("</{tag}")) {
                skip_until = None;
            }
            continue;
        }
        if c == '<' {
            in_tag = true;
            if lower[i..].starts_with("<script") {
                skip_until = Some("script");
            } else if lower[i..].starts_with("<style") {
                skip_until = Some("style");
            }
            continue;
        }
        if c == '>' {
            in_tag = false;
            out.push(' ');
            continue;
        }
        if !in_tag {
            out.push(c);
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub struct WebFetchTool {
    client: reqwest::Client,
}

impl WebFetchTool {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .user_agent("prime-agent/1.0")
                .build()
                .expect("static reqwest client config is always valid"),
        }
    }
}

impl Default for WebFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetch a URL and return its text content, with scripts/styles/tags stripped and capped at 8 KB."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {"type": "string"}
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<String, ToolError> {
        let url = args["url"].as_str().ok_or_else(|| ToolError::InvalidArguments {
            name: "web_fetch".into(),
            reason: "'url' is required".into(),
        })?;

        let response = self.client.get(url).send().await.map_err(|e| ToolError::ExecutionFailed {
            name: "web_fetch".into(),
            message: format!("request failed: {e}"),
        })?;
        let body = response.text().await.map_err(|e| ToolError::ExecutionFailed {
            name: "web_fetch".into(),
            message: format!("failed reading body: {e}"),
        })?;

        let mut text = strip_html(&body);
        if text.len() > FETCH_CAP_BYTES {
            text.truncate(FETCH_CAP_BYTES);
        }
        Ok(text)
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Low
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(15)
    }

    fn disables_streaming(&self) -> bool {
        false
    }
}

pub struct SearchWebTool {
    client: reqwest::Client,
}

impl SearchWebTool {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .user_agent("prime-agent/1.0")
                .build()
                .expect("static reqwest client config is always valid"),
        }
    }
}

impl Default for SearchWebTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for SearchWebTool {
    fn name(&self) -> &str {
        "search_web"
    }

    fn description(&self) -> &str {
        "Search the web via DuckDuckGo's instant-answer API and return matching topics."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "max_results": {"type": "integer", "default": 5}
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<String, ToolError> {
        let query = args["query"].as_str().ok_or_else(|| ToolError::InvalidArguments {
            name: "search_web".into(),
            reason: "'query' is required".into(),
        })?;
        let max_results = args["max_results"].as_u64().unwrap_or(5).min(10) as usize;

        let response = self
            .client
            .get("https://api.duckduckgo.com/")
            .query(&[("q", query), ("format", "json"), ("no_html", "1")])
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                name: "search_web".into(),
                message: format!("request failed: {e}"),
            })?;

        let body: serde_json::Value = response.json().await.map_err(|e| ToolError::ExecutionFailed {
            name: "search_web".into(),
            message: format!("failed parsing response: {e}"),
        })?;

        let mut results = Vec::new();
        if let Some(text) = body["AbstractText"].as_str().filter(|t| !t.is_empty()) {
            results.push(serde_json::json!({
                "title": body["Heading"].as_str().unwrap_or(query),
                "snippet": text,
                "url": body["AbstractURL"].as_str().unwrap_or(""),
            }));
        }
        if let Some(topics) = body["RelatedTopics"].as_array() {
            for topic in topics.iter().take(max_results) {
                if let Some(text) = topic["Text"].as_str() {
                    results.push(serde_json::json!({
                        "title": text,
                        "snippet": text,
                        "url": topic["FirstURL"].as_str().unwrap_or(""),
                    }));
                }
            }
        }
        results.truncate(max_results);

        serde_json::to_string(&results).map_err(|e| ToolError::ExecutionFailed {
            name: "search_web".into(),
            message: e.to_string(),
        })
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Low
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(15)
    }

    fn disables_streaming(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_html_drops_script_and_style_content() {
        let html = "<html><head><style>.a{}</style></head><body><script>evil()</script><p>Hello world</p></body></html>";
        let text = strip_html(html);
        assert!(text.contains("Hello world"));
        assert!(!text.contains("evil"));
        assert!(!text.contains(".a{}"));
    }
}
