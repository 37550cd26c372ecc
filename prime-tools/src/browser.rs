//! Browser automation tools, gated behind the `browser` feature. Drives a
//! real headless Chrome/Chromium instance over the DevTools Protocol via
//! `chromiumoxide`. One `BrowserSession` holds a single page shared by all
//! `browser_*` tools registered against it.

use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use prime_core::error::ToolError;
use prime_core::tools::Tool;
use prime_core::types::RiskLevel;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A single headless Chrome instance and its active page, shared by every
/// `browser_*` tool so they act on the same browsing context.
pub struct BrowserSession {
    page: Mutex<Option<Page>>,
    browser: Mutex<Option<Browser>>,
    headless: bool,
}

impl BrowserSession {
    pub fn new(headless: bool) -> Arc<Self> {
        Arc::new(Self { page: Mutex::new(None), browser: Mutex::new(None), headless })
    }

    async fn ensure_page(&self) -> Result<(), ToolError> {
        if self.page.lock().await.is_some() {
            return Ok(());
        }

        let mut builder = BrowserConfig::builder();
        if self.headless {
            builder = builder.arg("--headless=new");
        }
        builder = builder
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage");
        let config = builder.build().map_err(|e| ToolError::ExecutionFailed {
            name: "browser_open".into(),
            message: format!("invalid browser config: {e}"),
        })?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(|e| ToolError::ExecutionFailed {
            name: "browser_open".into(),
            message: format!("failed to launch chrome: {e}"),
        })?;
        tokio::spawn(async move {
            while handler.next().await.is_some() {}
        });

        let page = browser.new_page("about:blank").await.map_err(|e| ToolError::ExecutionFailed {
            name: "browser_open".into(),
            message: format!("failed to open page: {e}"),
        })?;

        *self.browser.lock().await = Some(browser);
        *self.page.lock().await = Some(page);
        Ok(())
    }

    async fn with_page<F, Fut, T>(&self, tool_name: &str, f: F) -> Result<T, ToolError>
    where
        F: FnOnce(Page) -> Fut,
        Fut: std::future::Future<Output = Result<T, chromiumoxide::error::CdpError>>,
    {
        self.ensure_page().await?;
        let page = self.page.lock().await.clone().ok_or_else(|| ToolError::ExecutionFailed {
            name: tool_name.to_string(),
            message: "no active page".into(),
        })?;
        f(page).await.map_err(|e| ToolError::ExecutionFailed {
            name: tool_name.to_string(),
            message: e.to_string(),
        })
    }

    async fn close(&self) {
        self.page.lock().await.take();
        if let Some(mut browser) = self.browser.lock().await.take() {
            let _ = browser.close().await;
        }
    }
}

fn required_str<'a>(args: &'a Value, field: &str, tool: &str) -> Result<&'a str, ToolError> {
    args[field].as_str().ok_or_else(|| ToolError::InvalidArguments {
        name: tool.to_string(),
        reason: format!("'{field}' is required"),
    })
}

macro_rules! browser_tool {
    ($struct_name:ident, $tool_name:literal, $desc:literal, $schema:expr, |$session:ident, $args:ident| $body:block) => {
        pub struct $struct_name {
            session: Arc<BrowserSession>,
        }

        impl $struct_name {
            pub fn new(session: Arc<BrowserSession>) -> Self {
                Self { session }
            }
        }

        #[async_trait]
        impl Tool for $struct_name {
            fn name(&self) -> &str {
                $tool_name
            }
            fn description(&self) -> &str {
                $desc
            }
            fn parameters_schema(&self) -> serde_json::Value {
                $schema
            }
            async fn execute(&self, args: serde_json::Value) -> Result<String, ToolError> {
                let $session = &self.session;
                let $args = args;
                $body
            }
            fn risk_level(&self) -> RiskLevel {
                RiskLevel::Medium
            }
            fn disables_streaming(&self) -> bool {
                true
            }
        }
    };
}

browser_tool!(
    BrowserOpenTool,
    "browser_open",
    "Launch the browser session if it isn't already running.",
    serde_json::json!({"type": "object", "properties": {}}),
    |session, _args| {
        session.ensure_page().await?;
        Ok("browser open".to_string())
    }
);

browser_tool!(
    BrowserNavigateTool,
    "browser_navigate",
    "Navigate the browser to a URL.",
    serde_json::json!({"type": "object", "properties": {"url": {"type": "string"}}, "required": ["url"]}),
    |session, args| {
        let url = required_str(&args, "url", "browser_navigate")?.to_string();
        session.with_page("browser_navigate", |page| async move { page.goto(&url).await.map(|_| ()) }).await?;
        Ok("navigated".to_string())
    }
);

browser_tool!(
    BrowserClickTool,
    "browser_click",
    "Click the element matching a CSS selector.",
    serde_json::json!({"type": "object", "properties": {"selector": {"type": "string"}}, "required": ["selector"]}),
    |session, args| {
        let selector = required_str(&args, "selector", "browser_click")?.to_string();
        session
            .with_page("browser_click", |page| async move {
                let el = page.find_element(&selector).await?;
                el.click().await.map(|_| ())
            })
            .await?;
        Ok("clicked".to_string())
    }
);

browser_tool!(
    BrowserTypeTool,
    "browser_type",
    "Type text into the element matching a CSS selector.",
    serde_json::json!({
        "type": "object",
        "properties": {"selector": {"type": "string"}, "text": {"type": "string"}},
        "required": ["selector", "text"]
    }),
    |session, args| {
        let selector = required_str(&args, "selector", "browser_type")?.to_string();
        let text = required_str(&args, "text", "browser_type")?.to_string();
        session
            .with_page("browser_type", |page| async move {
                let el = page.find_element(&selector).await?;
                el.type_str(&text).await.map(|_| ())
            })
            .await?;
        Ok("typed".to_string())
    }
);

browser_tool!(
    BrowserFillTool,
    "browser_fill",
    "Clear and fill a form field matching a CSS selector.",
    serde_json::json!({
        "type": "object",
        "properties": {"selector": {"type": "string"}, "value": {"type": "string"}},
        "required": ["selector", "value"]
    }),
    |session, args| {
        let selector = required_str(&args, "selector", "browser_fill")?.to_string();
        let value = required_str(&args, "value", "browser_fill")?.to_string();
        session
            .with_page("browser_fill", |page| {
                let selector2 = selector.clone();
                async move {
                    let clear_js = format!("document.querySelector('{}').value = ''", selector2.replace('\'', "\\'"));
                    page.evaluate(clear_js).await?;
                    let el = page.find_element(&selector2).await?;
                    el.click().await?;
                    el.type_str(&value).await.map(|_| ())
                }
            })
            .await?;
        Ok("filled".to_string())
    }
);

browser_tool!(
    BrowserScrollTool,
    "browser_scroll",
    "Scroll the page by a pixel offset.",
    serde_json::json!({
        "type": "object",
        "properties": {"x": {"type": "integer", "default": 0}, "y": {"type": "integer", "default": 0}}
    }),
    |session, args| {
        let x = args["x"].as_i64().unwrap_or(0);
        let y = args["y"].as_i64().unwrap_or(0);
        session
            .with_page("browser_scroll", |page| async move { page.evaluate(format!("window.scrollBy({x}, {y})")).await.map(|_| ()) })
            .await?;
        Ok("scrolled".to_string())
    }
);

browser_tool!(
    BrowserSnapshotTool,
    "browser_snapshot",
    "Return the current page's URL, title, and visible text.",
    serde_json::json!({"type": "object", "properties": {}}),
    |session, _args| {
        let url = session.with_page("browser_snapshot", |page| async move { Ok(page.url().await?.unwrap_or_default()) }).await?;
        let title = session
            .with_page("browser_snapshot", |page| async move { Ok(page.get_title().await?.unwrap_or_default()) })
            .await?;
        let text = session
            .with_page("browser_snapshot", |page| async move {
                let result = page.evaluate("document.body.innerText").await?;
                Ok(result.into_value::<String>().unwrap_or_default())
            })
            .await?;
        serde_json::to_string(&serde_json::json!({ "url": url, "title": title, "text": text }))
            .map_err(|e| ToolError::ExecutionFailed { name: "browser_snapshot".into(), message: e.to_string() })
    }
);

browser_tool!(
    BrowserExtractTool,
    "browser_extract",
    "Evaluate a JavaScript expression in the page and return its JSON-serialized result.",
    serde_json::json!({"type": "object", "properties": {"script": {"type": "string"}}, "required": ["script"]}),
    |session, args| {
        let script = required_str(&args, "script", "browser_extract")?.to_string();
        let value = session
            .with_page("browser_extract", |page| async move {
                let result = page.evaluate(script).await?;
                Ok(result.into_value::<Value>().unwrap_or(Value::Null))
            })
            .await?;
        serde_json::to_string(&value).map_err(|e| ToolError::ExecutionFailed { name: "browser_extract".into(), message: e.to_string() })
    }
);

browser_tool!(
    BrowserCloseTool,
    "browser_close",
    "Close the browser session.",
    serde_json::json!({"type": "object", "properties": {}}),
    |session, _args| {
        session.close().await;
        Ok("closed".to_string())
    }
);
