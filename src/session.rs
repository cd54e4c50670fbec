// ABOUTME: Session credential manager for the identity provider's cookie
// ABOUTME: Exchanges the stored __session cookie for short-lived bearer tokens

use crate::store::{
    SecretStore, ACCOUNT_CLIENT_UAT, ACCOUNT_EXTRA_COOKIES, ACCOUNT_SESSION_COOKIE,
    ACCOUNT_SESSION_ID,
};
use crate::util::truncate_str;
use crate::{Error, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_CLERK_BASE: &str = "https://clerk.jobtrail.app";
pub const DEFAULT_APP_ORIGIN: &str = "https://app.jobtrail.app";

/// Sentinel the provider receives when no __client_uat was ever observed.
/// Unverified whether the literal "1" is meaningful upstream; preserved as-is.
const CLIENT_UAT_SENTINEL: &str = "1";

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Persisted session artifacts. Cookie and id are both present or the
/// whole record is treated as absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSession {
    pub cookie: String,
    pub session_id: String,
    pub client_uat: Option<String>,
    pub extra_cookies: BTreeMap<String, String>,
}

impl StoredSession {
    pub fn new(cookie: impl Into<String>, session_id: impl Into<String>) -> Self {
        StoredSession {
            cookie: cookie.into(),
            session_id: session_id.into(),
            client_uat: None,
            extra_cookies: BTreeMap::new(),
        }
    }
}

/// Cookie names replayed to or accepted from the provider. Anything
/// outside this charset is dropped, not escaped.
pub(crate) fn is_safe_cookie_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Recovers the provider session id embedded in the cookie's middle
/// segment. Absence is the only failure signal; never errors.
pub fn extract_session_id(cookie: &str) -> Option<String> {
    let segments: Vec<&str> = cookie.split('.').collect();
    if segments.len() != 3 {
        return None;
    }

    let payload = URL_SAFE_NO_PAD
        .decode(segments[1].trim_end_matches('='))
        .ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&payload).ok()?;

    // The provider has used both claim names across versions
    let sid = claims
        .get("sid")
        .and_then(|v| v.as_str())
        .or_else(|| claims.get("session_id").and_then(|v| v.as_str()))?;

    if sid.starts_with("sess_") {
        Some(sid.to_string())
    } else {
        None
    }
}

/// Builds the Cookie request header for a token exchange. Extra cookies
/// with unsafe names are silently omitted.
pub(crate) fn build_cookie_header(session: &StoredSession) -> String {
    let mut header = format!(
        "__session={}; __client_uat={}",
        session.cookie,
        session.client_uat.as_deref().unwrap_or(CLIENT_UAT_SENTINEL)
    );

    for (name, value) in &session.extra_cookies {
        if is_safe_cookie_name(name) {
            header.push_str("; ");
            header.push_str(name);
            header.push('=');
            header.push_str(value);
        }
    }

    header
}

/// Applies Set-Cookie deltas from a refresh response to a session
/// snapshot. Pure: returns the updated snapshot, persistence is the
/// caller's problem.
pub(crate) fn apply_set_cookie_headers(session: &StoredSession, headers: &[String]) -> StoredSession {
    let mut updated = session.clone();

    for header in headers {
        let pair = header.split(';').next().unwrap_or("");
        let Some((name, value)) = pair.split_once('=') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();

        match name {
            "__session" => updated.cookie = value.to_string(),
            "__client_uat" => updated.client_uat = Some(value.to_string()),
            _ if is_safe_cookie_name(name) => {
                updated.extra_cookies.insert(name.into(), value.into());
            }
            _ => {}
        }
    }

    updated
}

pub struct SessionManager<S: SecretStore> {
    store: S,
    http: reqwest::Client,
    clerk_base: String,
    app_origin: String,
}

impl<S: SecretStore> SessionManager<S> {
    pub fn new(store: S, clerk_base: Option<String>, app_origin: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(SessionManager {
            store,
            http,
            clerk_base: clerk_base.unwrap_or_else(|| DEFAULT_CLERK_BASE.into()),
            app_origin: app_origin.unwrap_or_else(|| DEFAULT_APP_ORIGIN.into()),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn has_session(&self) -> bool {
        matches!(self.load_session(), Ok(Some(_)))
    }

    /// A partial record (cookie without id or vice versa, or either one
    /// empty) reads as absent.
    pub fn load_session(&self) -> Result<Option<StoredSession>> {
        let cookie = self.store.get(ACCOUNT_SESSION_COOKIE)?;
        let session_id = self.store.get(ACCOUNT_SESSION_ID)?;

        let (Some(cookie), Some(session_id)) = (cookie, session_id) else {
            return Ok(None);
        };
        if cookie.is_empty() || session_id.is_empty() {
            return Ok(None);
        }

        let client_uat = self.store.get(ACCOUNT_CLIENT_UAT)?;
        let extra_cookies = self
            .store
            .get(ACCOUNT_EXTRA_COOKIES)?
            .and_then(|json| serde_json::from_str(&json).ok())
            .unwrap_or_default();

        Ok(Some(StoredSession {
            cookie,
            session_id,
            client_uat,
            extra_cookies,
        }))
    }

    /// Upserts all four fields as a unit.
    pub fn save_session(&self, session: &StoredSession) -> Result<()> {
        self.store.set(ACCOUNT_SESSION_COOKIE, &session.cookie)?;
        self.store.set(ACCOUNT_SESSION_ID, &session.session_id)?;
        self.store.set(
            ACCOUNT_CLIENT_UAT,
            session.client_uat.as_deref().unwrap_or(CLIENT_UAT_SENTINEL),
        )?;
        let extras = serde_json::to_string(&session.extra_cookies)?;
        self.store.set(ACCOUNT_EXTRA_COOKIES, &extras)?;
        Ok(())
    }

    /// Removes all four fields; a second call is a no-op.
    pub fn clear_session(&self) -> Result<()> {
        self.store.delete(ACCOUNT_SESSION_COOKIE)?;
        self.store.delete(ACCOUNT_SESSION_ID)?;
        self.store.delete(ACCOUNT_CLIENT_UAT)?;
        self.store.delete(ACCOUNT_EXTRA_COOKIES)?;
        Ok(())
    }

    /// Exchanges the stored session for a bearer token, persisting any
    /// cookie rotation the provider sent back. Skipping the persist
    /// would make the next refresh fail once the provider rotates.
    pub async fn fresh_token(&self) -> Result<String> {
        let session = self.load_session()?.ok_or(Error::NoSession)?;
        let (token, rotated) = self.refresh_with(&session).await?;
        self.save_session(&rotated)?;
        Ok(token)
    }

    /// Performs one token exchange with the given session and returns
    /// the token plus the rotated snapshot. Does not touch the store;
    /// the check flow relies on that.
    pub async fn refresh_with(&self, session: &StoredSession) -> Result<(String, StoredSession)> {
        let url = format!(
            "{}/v1/client/sessions/{}/tokens?_is_native=1",
            self.clerk_base, session.session_id
        );

        // The provider's edge rejects calls that don't look like a browser
        let response = self
            .http
            .post(&url)
            .header("Cookie", build_cookie_header(session))
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/json")
            .header("Origin", &self.app_origin)
            .header("Referer", format!("{}/", self.app_origin))
            .header("Sec-Fetch-Dest", "empty")
            .header("Sec-Fetch-Mode", "cors")
            .header("Sec-Fetch-Site", "same-site")
            .send()
            .await?;

        let status = response.status();
        let set_cookies: Vec<String> = response
            .headers()
            .get_all(reqwest::header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(String::from)
            .collect();

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::SessionExpired {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::RefreshFailed {
                status: status.as_u16(),
                body: truncate_str(&body, 200),
            });
        }

        let json: serde_json::Value = serde_json::from_str(&body).map_err(|_| {
            Error::UnexpectedResponse {
                body: truncate_str(&body, 200),
            }
        })?;

        // Response shape has drifted across provider versions
        let token = ["jwt", "token", "client_jwt"]
            .iter()
            .find_map(|field| json.get(*field).and_then(|v| v.as_str()))
            .ok_or_else(|| Error::UnexpectedResponse {
                body: truncate_str(&body, 200),
            })?;

        let rotated = apply_set_cookie_headers(session, &set_cookies);
        Ok((token.to_string(), rotated))
    }
}
