// ABOUTME: One-shot JSON-RPC round trips over a debugging WebSocket channel
// ABOUTME: Native tungstenite client with a hand-rolled raw-socket fallback

use super::frame;
use crate::{Error, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

static NEXT_CALL_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_call_id() -> u64 {
    NEXT_CALL_ID.fetch_add(1, Ordering::Relaxed)
}

/// Opens a fresh channel, sends one request, and returns the response
/// whose id matches. The whole round trip sits under `timeout`; a tab
/// that never answers produces an error, never a hang.
pub async fn round_trip(ws_url: &str, id: u64, payload: &str, timeout: Duration) -> Result<Value> {
    match tokio::time::timeout(timeout, attempt(ws_url, id, payload)).await {
        Ok(result) => result,
        Err(_) => Err(Error::Debugger(format!(
            "no reply from {} within {}ms",
            ws_url,
            timeout.as_millis()
        ))),
    }
}

async fn attempt(ws_url: &str, id: u64, payload: &str) -> Result<Value> {
    // The fallback only covers connect/handshake failures. Once the
    // native channel is up the request may already be delivered, and
    // resending a Runtime.evaluate would execute it twice.
    match tokio_tungstenite::connect_async(ws_url).await {
        Ok((ws, _)) => native_round_trip(ws, id, payload).await,
        // Callers never learn which transport served them
        Err(connect_err) => raw_round_trip(ws_url, id, payload).await.map_err(|_| {
            Error::Debugger(format!("cannot open channel to {}: {}", ws_url, connect_err))
        }),
    }
}

async fn native_round_trip(
    mut ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    id: u64,
    payload: &str,
) -> Result<Value> {
    ws.send(Message::Text(payload.to_string()))
        .await
        .map_err(|e| Error::Debugger(format!("channel send failed: {}", e)))?;

    loop {
        let message = ws
            .next()
            .await
            .ok_or_else(|| Error::Debugger("channel closed before reply".into()))?
            .map_err(|e| Error::Debugger(format!("channel read failed: {}", e)))?;

        match message {
            Message::Text(text) => {
                let value: Value = match serde_json::from_str(&text) {
                    Ok(v) => v,
                    Err(_) => continue,
                };
                // Protocol events carry no id; skip until our reply arrives
                if value.get("id").and_then(|v| v.as_u64()) == Some(id) {
                    let _ = ws.close(None).await;
                    return Ok(value);
                }
            }
            Message::Close(_) => {
                return Err(Error::Debugger("channel closed before reply".into()));
            }
            _ => {}
        }
    }
}

/// Fallback: HTTP/1.1 Upgrade handshake plus hand-framed messages over
/// a plain TCP stream.
async fn raw_round_trip(ws_url: &str, id: u64, payload: &str) -> Result<Value> {
    let parsed = url::Url::parse(ws_url)
        .map_err(|e| Error::Debugger(format!("bad channel address {}: {}", ws_url, e)))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| Error::Debugger(format!("channel address has no host: {}", ws_url)))?
        .to_string();
    let port = parsed.port().unwrap_or(80);
    let path = match parsed.query() {
        Some(q) => format!("{}?{}", parsed.path(), q),
        None => parsed.path().to_string(),
    };

    let mut stream = TcpStream::connect((host.as_str(), port))
        .await
        .map_err(|e| Error::Debugger(format!("cannot connect to {}:{}: {}", host, port, e)))?;

    let key = BASE64.encode(rand::random::<[u8; 16]>());
    let handshake = format!(
        "GET {} HTTP/1.1\r\n\
         Host: {}:{}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {}\r\n\
         Sec-WebSocket-Version: 13\r\n\r\n",
        path, host, port, key
    );
    stream.write_all(handshake.as_bytes()).await?;

    // Read headers; bytes past the blank line are already frame data
    let mut buf: Vec<u8> = Vec::with_capacity(4096);
    let header_end = loop {
        let mut chunk = [0u8; 2048];
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(Error::Debugger("connection closed during handshake".into()));
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_blank_line(&buf) {
            break pos;
        }
        if buf.len() > 16 * 1024 {
            return Err(Error::Debugger("oversized handshake response".into()));
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]);
    if !head.starts_with("HTTP/1.1 101") {
        let status = head.lines().next().unwrap_or("").to_string();
        return Err(Error::Debugger(format!("upgrade refused: {}", status)));
    }
    buf.drain(..header_end + 4);

    let mask: [u8; 4] = rand::random();
    stream
        .write_all(&frame::encode_text(payload.as_bytes(), mask))
        .await?;

    // Reassemble frames until the matching response shows up
    let mut assembling: Vec<u8> = Vec::new();
    loop {
        while let Some((decoded, consumed)) = frame::decode(&buf) {
            buf.drain(..consumed);
            match decoded.opcode {
                frame::OPCODE_CLOSE => {
                    return Err(Error::Debugger("channel closed before reply".into()));
                }
                frame::OPCODE_TEXT | frame::OPCODE_CONTINUATION => {
                    assembling.extend_from_slice(&decoded.payload);
                    if !decoded.fin {
                        continue;
                    }
                    let message = std::mem::take(&mut assembling);
                    if let Ok(value) = serde_json::from_slice::<Value>(&message) {
                        if value.get("id").and_then(|v| v.as_u64()) == Some(id) {
                            return Ok(value);
                        }
                    }
                }
                frame::OPCODE_PING => {}
                _ => {}
            }
        }

        let mut chunk = [0u8; 8192];
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(Error::Debugger("channel closed before reply".into()));
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

fn find_blank_line(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}
