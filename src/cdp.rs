// ABOUTME: Minimal client for a browser's remote-debugging protocol
// ABOUTME: Tab listing, cookie reads, and expression evaluation over JSON-RPC

pub mod frame;
pub(crate) mod transport;

use crate::{Error, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;

/// Cookie names relevant to the provider's identity system. Everything
/// else a tab can see stays in the browser.
pub const ALLOWED_COOKIE_NAMES: [&str; 6] = [
    "__session",
    "__client",
    "__client_uat",
    "cf_clearance",
    "__cf_bm",
    "_cfuvid",
];

/// One open tab as reported by the debugging endpoint. Ephemeral: tabs
/// appear, vanish, and change URL between polls.
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserTab {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(rename = "webSocketDebuggerUrl", default)]
    pub ws_url: Option<String>,
}

pub struct DebugClient {
    http: reqwest::Client,
    port: u16,
    rpc_timeout: Duration,
}

impl DebugClient {
    pub fn new(port: u16) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(3))
            .build()?;

        Ok(DebugClient {
            http,
            port,
            rpc_timeout: Duration::from_secs(8),
        })
    }

    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn list_tabs(&self) -> Result<Vec<BrowserTab>> {
        let url = format!("http://127.0.0.1:{}/json/list", self.port);
        let response = self.http.get(&url).send().await.map_err(|e| {
            Error::Debugger(format!(
                "cannot reach debugging endpoint on port {}: {}. \
                 Start your browser with --remote-debugging-port={}",
                self.port, e, self.port
            ))
        })?;

        response.json().await.map_err(|e| {
            Error::Debugger(format!(
                "debugging endpoint on port {} returned an unexpected payload: {}",
                self.port, e
            ))
        })
    }

    /// One JSON-RPC command over a fresh channel. Protocol-level errors
    /// come back as Debugger errors.
    async fn command(&self, ws_url: &str, method: &str, params: Value) -> Result<Value> {
        let id = transport::next_call_id();
        let payload = json!({ "id": id, "method": method, "params": params }).to_string();
        let response = transport::round_trip(ws_url, id, &payload, self.rpc_timeout).await?;

        if let Some(err) = response.get("error") {
            return Err(Error::Debugger(format!("{} failed: {}", method, err)));
        }
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Reads the allow-listed cookies a tab can see for `urls`, keeping
    /// only cookies scoped to `host` or a parent domain of it. Cookie
    /// absence is an expected transient state during login, so every
    /// lower-level failure collapses to an empty map.
    pub async fn get_cookies(
        &self,
        ws_url: &str,
        urls: &[String],
        host: &str,
    ) -> BTreeMap<String, String> {
        // Some channel targets reject Network.enable; that's fine
        let _ = self.command(ws_url, "Network.enable", json!({})).await;

        let result = match self
            .command(ws_url, "Network.getCookies", json!({ "urls": urls }))
            .await
        {
            Ok(v) => v,
            Err(_) => return BTreeMap::new(),
        };

        let mut cookies = BTreeMap::new();
        let Some(items) = result.get("cookies").and_then(|v| v.as_array()) else {
            return cookies;
        };

        for item in items {
            let (Some(name), Some(value)) = (
                item.get("name").and_then(|v| v.as_str()),
                item.get("value").and_then(|v| v.as_str()),
            ) else {
                continue;
            };
            let domain = item.get("domain").and_then(|v| v.as_str()).unwrap_or("");

            if ALLOWED_COOKIE_NAMES.contains(&name) && domain_matches(domain, host) {
                cookies.insert(name.to_string(), value.to_string());
            }
        }

        cookies
    }

    /// Evaluates a JavaScript expression in the tab, awaiting promises
    /// and returning the value by JSON. In-page exceptions surface as
    /// typed failures.
    pub async fn evaluate(&self, ws_url: &str, expression: &str) -> Result<Value> {
        let result = self
            .command(
                ws_url,
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;

        if let Some(details) = result.get("exceptionDetails") {
            let text = details
                .get("exception")
                .and_then(|e| e.get("description"))
                .and_then(|d| d.as_str())
                .or_else(|| details.get("text").and_then(|t| t.as_str()))
                .unwrap_or("unknown in-page exception");
            return Err(Error::Evaluate(text.to_string()));
        }

        Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }
}

/// True if a cookie scoped to `cookie_domain` is visible on `host`.
fn domain_matches(cookie_domain: &str, host: &str) -> bool {
    let domain = cookie_domain.trim_start_matches('.');
    if domain.is_empty() {
        return false;
    }
    host == domain || host.ends_with(&format!(".{}", domain))
}
