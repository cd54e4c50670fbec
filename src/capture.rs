// ABOUTME: Interactive capture flow that lifts a live session out of the browser
// ABOUTME: Launch/probe debugger, poll for an authenticated tab, validate, persist

use crate::cdp::{BrowserTab, DebugClient};
use crate::session::{extract_session_id, SessionManager, StoredSession};
use crate::store::SecretStore;
use crate::util::{describe_cookie_shape, truncate_str};
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use url::Url;

/// Reads the provider session id out of the page's live client object.
/// Second source of truth, cross-checking the id decoded from the cookie.
const SESSION_ID_FROM_PAGE_JS: &str = "(() => { try { \
    const c = window.Clerk; \
    return c && c.session ? c.session.id : null; \
  } catch (_) { return null; } })()";

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub cdp_port: u16,
    /// Dedicated, reusable profile so repeated launches keep prior login state.
    pub profile_dir: PathBuf,
    pub app_url: String,
    pub settle_delay: Duration,
    pub tab_timeout: Duration,
    pub login_timeout: Duration,
    pub poll_interval: Duration,
}

impl CaptureConfig {
    pub fn new(cdp_port: u16, profile_dir: PathBuf, app_url: String) -> Self {
        CaptureConfig {
            cdp_port,
            profile_dir,
            app_url,
            settle_delay: Duration::from_millis(1500),
            tab_timeout: Duration::from_secs(15),
            login_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_millis(1500),
        }
    }

    fn origin(&self) -> String {
        crate::util::origin_of(&self.app_url)
    }

    fn host(&self) -> String {
        Url::parse(&self.app_url)
            .ok()
            .and_then(|u| u.host_str().map(String::from))
            .unwrap_or_default()
    }

    fn cookie_urls(&self) -> Vec<String> {
        vec![self.app_url.clone(), format!("{}/", self.origin())]
    }
}

/// Interactive capture: ensure a debuggable browser, wait for the human
/// to log in, validate the captured cookie with a real token exchange,
/// then persist it.
pub async fn capture_session<S: SecretStore>(
    manager: &SessionManager<S>,
    client: &DebugClient,
    cfg: &CaptureConfig,
) -> Result<()> {
    println!(
        "Probing browser debugging endpoint on port {}...",
        client.port()
    );
    let tabs = ensure_debugger(client, cfg).await?;

    println!("Looking for a {} tab...", cfg.host());
    if pick_provider_tab(&tabs, &cfg.origin()).is_none() {
        println!("None open; opening {} in the debug browser...", cfg.app_url);
        launch_browser(cfg)?;
        wait_for_provider_tab(client, cfg).await?;
    }

    println!(
        "Waiting for an authenticated {} session (log in in the browser window)...",
        cfg.host()
    );

    let deadline = Instant::now() + cfg.login_timeout;
    let mut last_url: Option<String> = None;
    let mut last_shape: Option<String> = None;
    let mut last_error: Option<String> = None;

    while Instant::now() < deadline {
        let tabs = client.list_tabs().await.unwrap_or_default();

        for tab in provider_tabs(&tabs, &cfg.origin()) {
            let Some(ws_url) = tab.ws_url.as_deref() else {
                continue;
            };
            last_url = Some(tab.url.clone());

            let cookies = client.get_cookies(ws_url, &cfg.cookie_urls(), &cfg.host()).await;
            let Some(cookie) = cookies.get("__session") else {
                continue;
            };
            last_shape = Some(describe_cookie_shape(cookie));

            let session_id = match resolve_session_id(client, ws_url, cookie).await {
                Some(id) => id,
                None => {
                    last_error = Some("__session cookie present but no usable session id".into());
                    continue;
                }
            };

            let candidate = candidate_from_snapshot(cookie, &session_id, &cookies);
            println!("Found candidate session in {}, validating...", tab.url);

            match manager.refresh_with(&candidate).await {
                Ok((_token, rotated)) => {
                    manager.save_session(&rotated)?;
                    // End-to-end smoke test through the store before declaring success
                    manager.fresh_token().await?;
                    println!("Session captured and verified. You're good to go.");
                    return Ok(());
                }
                Err(e) => {
                    last_error = Some(e.to_string());
                }
            }
        }

        tokio::time::sleep(cfg.poll_interval).await;
    }

    Err(Error::CaptureTimeout(format!(
        "gave up after {}s. last tab: {}; last __session cookie: {}; last error: {}",
        cfg.login_timeout.as_secs(),
        last_url.as_deref().unwrap_or("none seen"),
        last_shape.as_deref().unwrap_or("never seen"),
        last_error.as_deref().unwrap_or("none"),
    )))
}

/// Non-destructive diagnostic: one pass of the capture pipeline with a
/// full report and no writes to the store.
pub async fn check_session<S: SecretStore>(
    manager: &SessionManager<S>,
    client: &DebugClient,
    cfg: &CaptureConfig,
) -> Result<()> {
    println!(
        "Probing browser debugging endpoint on port {}...",
        client.port()
    );
    let tabs = ensure_debugger(client, cfg).await?;

    let Some(tab) = pick_provider_tab(&tabs, &cfg.origin()) else {
        return Err(Error::TabNotFound(format!(
            "no {} tab open. Open {} in the debug browser and retry",
            cfg.host(),
            cfg.app_url
        )));
    };
    println!("Inspecting tab: {}", tab.url);

    let Some(ws_url) = tab.ws_url.as_deref() else {
        return Err(Error::TabNotFound(format!(
            "tab {} exposes no debugging channel",
            tab.url
        )));
    };

    let cookies = client.get_cookies(ws_url, &cfg.cookie_urls(), &cfg.host()).await;
    if cookies.is_empty() {
        println!("No provider cookies visible in this tab.");
    } else {
        println!("Provider cookies visible:");
        for (name, value) in &cookies {
            println!("  {} = {}", name, truncate_str(value, 16));
        }
    }

    let Some(cookie) = cookies.get("__session") else {
        return Err(Error::Auth(
            "no __session cookie visible yet. Log in to the provider in that tab and retry".into(),
        ));
    };
    println!("__session shape: {}", describe_cookie_shape(cookie));

    match extract_session_id(cookie) {
        Some(id) => println!("Session id (from cookie): {}", id),
        None => println!("Session id not decodable from cookie; trying the page object..."),
    }

    let session_id = match resolve_session_id(client, ws_url, cookie).await {
        Some(id) => id,
        None => {
            return Err(Error::Auth(
                "could not derive a session id from the cookie or the page".into(),
            ))
        }
    };

    let candidate = candidate_from_snapshot(cookie, &session_id, &cookies);
    println!("Validating with a token exchange (nothing will be stored)...");

    let (token, _rotated) = manager.refresh_with(&candidate).await?;
    println!("Validation succeeded; token {}", truncate_str(&token, 20));
    Ok(())
}

/// Probe, launch once on failure, settle, re-probe once.
async fn ensure_debugger(client: &DebugClient, cfg: &CaptureConfig) -> Result<Vec<BrowserTab>> {
    match client.list_tabs().await {
        Ok(tabs) => Ok(tabs),
        Err(_) => {
            println!("Debugger not reachable; launching a browser with remote debugging...");
            launch_browser(cfg)?;
            tokio::time::sleep(cfg.settle_delay).await;

            client.list_tabs().await.map_err(|_| {
                Error::Debugger(format!(
                    "debugging endpoint on port {} still unreachable after launch. \
                     Start the browser yourself: \
                     <chrome> --remote-debugging-port={} --user-data-dir={} {}",
                    cfg.cdp_port,
                    cfg.cdp_port,
                    cfg.profile_dir.display(),
                    cfg.app_url
                ))
            })
        }
    }
}

async fn wait_for_provider_tab(client: &DebugClient, cfg: &CaptureConfig) -> Result<()> {
    let deadline = Instant::now() + cfg.tab_timeout;
    while Instant::now() < deadline {
        if let Ok(tabs) = client.list_tabs().await {
            if pick_provider_tab(&tabs, &cfg.origin()).is_some() {
                return Ok(());
            }
        }
        tokio::time::sleep(cfg.poll_interval).await;
    }

    Err(Error::TabNotFound(format!(
        "no {} tab appeared within {}s. Open {} in the debug browser, log in, and retry",
        cfg.host(),
        cfg.tab_timeout.as_secs(),
        cfg.app_url
    )))
}

async fn resolve_session_id(
    client: &DebugClient,
    ws_url: &str,
    cookie: &str,
) -> Option<String> {
    if let Some(id) = extract_session_id(cookie) {
        return Some(id);
    }

    let value = client.evaluate(ws_url, SESSION_ID_FROM_PAGE_JS).await.ok()?;
    let id = value.as_str()?;
    if id.starts_with("sess_") {
        Some(id.to_string())
    } else {
        None
    }
}

fn candidate_from_snapshot(
    cookie: &str,
    session_id: &str,
    cookies: &BTreeMap<String, String>,
) -> StoredSession {
    let mut candidate = StoredSession::new(cookie, session_id);
    candidate.client_uat = cookies.get("__client_uat").cloned();
    candidate.extra_cookies = cookies
        .iter()
        .filter(|(name, _)| name.as_str() != "__session" && name.as_str() != "__client_uat")
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    candidate
}

/// Provider tabs in preference order: app pages (path deeper than the
/// bare root) before the marketing/login root, listing order otherwise.
/// First match wins when several are equally eligible.
fn provider_tabs<'a>(tabs: &'a [BrowserTab], origin: &str) -> Vec<&'a BrowserTab> {
    let mut matched: Vec<&BrowserTab> = tabs
        .iter()
        .filter(|t| t.kind == "page" && url_on_origin(&t.url, origin))
        .collect();
    matched.sort_by_key(|t| !is_app_page(&t.url));
    matched
}

/// Exact-origin match: a lookalike host that merely extends the origin
/// string (app.jobtrail.app.evil.example) does not qualify.
fn url_on_origin(url: &str, origin: &str) -> bool {
    match url.strip_prefix(origin) {
        Some(rest) => rest.is_empty() || rest.starts_with(['/', '?', '#']),
        None => false,
    }
}

fn pick_provider_tab<'a>(tabs: &'a [BrowserTab], origin: &str) -> Option<&'a BrowserTab> {
    provider_tabs(tabs, origin).into_iter().next()
}

fn is_app_page(url: &str) -> bool {
    Url::parse(url)
        .map(|u| !u.path().is_empty() && u.path() != "/")
        .unwrap_or(false)
}

/// Spawns a detached debug browser pointed at the app. No further
/// interaction with the child; the debug client connects over loopback.
fn launch_browser(cfg: &CaptureConfig) -> Result<()> {
    let executable = find_browser_executable().ok_or_else(|| {
        Error::Debugger(
            "no Chrome/Chromium executable found. Install one or set JOBTRAIL_BROWSER \
             to the binary path"
                .into(),
        )
    })?;

    std::fs::create_dir_all(&cfg.profile_dir)?;

    let mut cmd = Command::new(&executable);
    cmd.arg(format!("--remote-debugging-port={}", cfg.cdp_port))
        .arg(format!("--user-data-dir={}", cfg.profile_dir.display()))
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg(&cfg.app_url)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    #[cfg(unix)]
    std::os::unix::process::CommandExt::process_group(&mut cmd, 0);

    cmd.spawn().map_err(|e| {
        Error::Debugger(format!(
            "failed to launch {}: {}",
            executable.display(),
            e
        ))
    })?;
    Ok(())
}

fn find_browser_executable() -> Option<PathBuf> {
    if let Ok(path) = env::var("JOBTRAIL_BROWSER") {
        return Some(PathBuf::from(path));
    }

    let candidates: &[&str] = if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
        ]
    } else {
        &[
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
            "brave-browser",
        ]
    };

    candidates.iter().find_map(|c| resolve_executable(c))
}

fn resolve_executable(name: &str) -> Option<PathBuf> {
    let path = Path::new(name);
    if path.is_absolute() {
        return path.exists().then(|| path.to_path_buf());
    }

    env::var_os("PATH").and_then(|paths| {
        env::split_paths(&paths)
            .map(|dir| dir.join(name))
            .find(|p| p.exists())
    })
}
