use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use futures_util::{SinkExt, StreamExt};
use jobtrail::capture::{capture_session, check_session, CaptureConfig};
use jobtrail::cdp::DebugClient;
use jobtrail::store::MemoryStore;
use jobtrail::{Error, SessionManager};
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn session_cookie_with_sid(sid: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sid":"{}"}}"#, sid).as_bytes());
    format!("{}.{}.sig", header, payload)
}

/// Stands in for a browser tab's debugging channel: answers the three
/// commands the capture flow issues, one fresh connection per command.
async fn spawn_cdp_stub(
    session_cookie: String,
    page_session_id: Option<String>,
) -> (String, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let cookie = session_cookie.clone();
            let page_id = page_session_id.clone();

            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(message)) = ws.next().await {
                    let Message::Text(text) = message else {
                        continue;
                    };
                    let Ok(request) = serde_json::from_str::<serde_json::Value>(&text) else {
                        continue;
                    };
                    let id = request["id"].as_u64().unwrap_or(0);
                    let result = match request["method"].as_str().unwrap_or("") {
                        "Network.getCookies" => serde_json::json!({
                            "cookies": [
                                {"name": "__session", "value": cookie, "domain": ".jobtrail.app"},
                                {"name": "__client_uat", "value": "1700000000", "domain": ".jobtrail.app"},
                                {"name": "cf_clearance", "value": "cf-val", "domain": ".jobtrail.app"},
                                {"name": "tracking_id", "value": "nope", "domain": ".jobtrail.app"}
                            ]
                        }),
                        "Runtime.evaluate" => serde_json::json!({
                            "result": {"type": "string", "value": page_id}
                        }),
                        _ => serde_json::json!({}),
                    };
                    let reply = serde_json::json!({ "id": id, "result": result }).to_string();
                    if ws.send(Message::Text(reply)).await.is_err() {
                        break;
                    }
                }
            });
        }
    });

    (format!("ws://{}/devtools/page/STUB", addr), handle)
}

async fn mount_tab_list(server: &MockServer, ws_url: &str) {
    Mock::given(method("GET"))
        .and(path("/json/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {
                "id": "TAB1",
                "title": "JobTrail",
                "type": "page",
                "url": "https://app.jobtrail.app/boards",
                "webSocketDebuggerUrl": ws_url
            }
        ])))
        .mount(server)
        .await;
}

fn fast_config(cdp_port: u16, profile: &tempfile::TempDir) -> CaptureConfig {
    let mut cfg = CaptureConfig::new(
        cdp_port,
        profile.path().to_path_buf(),
        "https://app.jobtrail.app".into(),
    );
    cfg.settle_delay = Duration::from_millis(10);
    cfg.tab_timeout = Duration::from_millis(500);
    cfg.login_timeout = Duration::from_secs(2);
    cfg.poll_interval = Duration::from_millis(100);
    cfg
}

#[tokio::test]
async fn test_capture_succeeds_and_persists_rotated_session() {
    let cookie = session_cookie_with_sid("sess_123");
    let (ws_url, stub) = spawn_cdp_stub(cookie, None).await;

    let cdp_endpoint = MockServer::start().await;
    mount_tab_list(&cdp_endpoint, &ws_url).await;

    let clerk = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/client/sessions/sess_123/tokens"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "jwt": "eyJminted" }))
                .append_header("Set-Cookie", "__session=rotated-by-provider; Path=/"),
        )
        // Validation exchange plus the post-persist smoke test
        .expect(2)
        .mount(&clerk)
        .await;

    let profile = tempfile::TempDir::new().unwrap();
    let cfg = fast_config(cdp_endpoint.address().port(), &profile);
    let client = DebugClient::new(cdp_endpoint.address().port()).unwrap();
    let manager = SessionManager::new(MemoryStore::new(), Some(clerk.uri()), None).unwrap();

    capture_session(&manager, &client, &cfg).await.unwrap();

    let stored = manager.load_session().unwrap().unwrap();
    assert_eq!(stored.session_id, "sess_123");
    assert_eq!(stored.cookie, "rotated-by-provider");
    assert_eq!(stored.client_uat.as_deref(), Some("1700000000"));
    assert_eq!(stored.extra_cookies.get("cf_clearance").unwrap(), "cf-val");
    assert!(!stored.extra_cookies.contains_key("__session"));
    assert!(!stored.extra_cookies.contains_key("tracking_id"));

    stub.abort();
}

#[tokio::test]
async fn test_capture_falls_back_to_page_session_id() {
    // Cookie that extract_session_id can't decode; the page object has it
    let (ws_url, stub) = spawn_cdp_stub("opaque-cookie".into(), Some("sess_frompage".into())).await;

    let cdp_endpoint = MockServer::start().await;
    mount_tab_list(&cdp_endpoint, &ws_url).await;

    let clerk = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/client/sessions/sess_frompage/tokens"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "jwt": "eyJminted"
        })))
        .mount(&clerk)
        .await;

    let profile = tempfile::TempDir::new().unwrap();
    let cfg = fast_config(cdp_endpoint.address().port(), &profile);
    let client = DebugClient::new(cdp_endpoint.address().port()).unwrap();
    let manager = SessionManager::new(MemoryStore::new(), Some(clerk.uri()), None).unwrap();

    capture_session(&manager, &client, &cfg).await.unwrap();

    let stored = manager.load_session().unwrap().unwrap();
    assert_eq!(stored.session_id, "sess_frompage");

    stub.abort();
}

#[tokio::test]
async fn test_capture_exhaustion_never_saves() {
    let cookie = session_cookie_with_sid("sess_123");
    let (ws_url, stub) = spawn_cdp_stub(cookie, None).await;

    let cdp_endpoint = MockServer::start().await;
    mount_tab_list(&cdp_endpoint, &ws_url).await;

    // Every validation attempt comes back unauthorized
    let clerk = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&clerk)
        .await;

    let profile = tempfile::TempDir::new().unwrap();
    let cfg = fast_config(cdp_endpoint.address().port(), &profile);
    let client = DebugClient::new(cdp_endpoint.address().port()).unwrap();
    let manager = SessionManager::new(MemoryStore::new(), Some(clerk.uri()), None).unwrap();

    match capture_session(&manager, &client, &cfg).await {
        Err(Error::CaptureTimeout(msg)) => {
            assert!(msg.contains("https://app.jobtrail.app/boards"));
            assert!(msg.contains("401"));
            assert!(msg.contains("dot-segment"));
        }
        other => panic!("expected CaptureTimeout, got {:?}", other),
    }
    assert!(!manager.has_session());

    stub.abort();
}

#[tokio::test]
async fn test_check_reports_without_writing() {
    let cookie = session_cookie_with_sid("sess_check");
    let (ws_url, stub) = spawn_cdp_stub(cookie, None).await;

    let cdp_endpoint = MockServer::start().await;
    mount_tab_list(&cdp_endpoint, &ws_url).await;

    let clerk = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/client/sessions/sess_check/tokens"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "jwt": "eyJvalidated"
        })))
        .expect(1)
        .mount(&clerk)
        .await;

    let profile = tempfile::TempDir::new().unwrap();
    let cfg = fast_config(cdp_endpoint.address().port(), &profile);
    let client = DebugClient::new(cdp_endpoint.address().port()).unwrap();
    let manager = SessionManager::new(MemoryStore::new(), Some(clerk.uri()), None).unwrap();

    check_session(&manager, &client, &cfg).await.unwrap();
    assert!(!manager.has_session());

    stub.abort();
}

#[tokio::test]
async fn test_check_fails_when_session_invalid() {
    let cookie = session_cookie_with_sid("sess_check");
    let (ws_url, stub) = spawn_cdp_stub(cookie, None).await;

    let cdp_endpoint = MockServer::start().await;
    mount_tab_list(&cdp_endpoint, &ws_url).await;

    let clerk = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&clerk)
        .await;

    let profile = tempfile::TempDir::new().unwrap();
    let cfg = fast_config(cdp_endpoint.address().port(), &profile);
    let client = DebugClient::new(cdp_endpoint.address().port()).unwrap();
    let manager = SessionManager::new(MemoryStore::new(), Some(clerk.uri()), None).unwrap();

    match check_session(&manager, &client, &cfg).await {
        Err(Error::SessionExpired { status }) => assert_eq!(status, 401),
        other => panic!("expected SessionExpired, got {:?}", other),
    }
    assert!(!manager.has_session());

    stub.abort();
}
