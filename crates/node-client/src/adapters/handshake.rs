//! WebSocket upgrade handshake (client side).
//!
//! The request is written and the response head validated here; framing
//! afterwards belongs to `tungstenite`. Validation order is fixed: status,
//! `Connection`, `Upgrade`, `Sec-WebSocket-Accept`. The first mismatch aborts
//! the attempt with [`ClientError::Protocol`].

use crate::domain::error::ClientError;
use crate::domain::peer::Endpoint;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_tungstenite::tungstenite::http::header::{CONNECTION, SEC_WEBSOCKET_ACCEPT, UPGRADE};
use tokio_tungstenite::tungstenite::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use tracing::{debug, trace};

/// GUID appended to the client key before hashing (RFC 6455 §1.3).
pub const ACCEPT_MAGIC: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Fresh `Sec-WebSocket-Key`: base64 of 16 random bytes.
pub fn generate_key() -> String {
    let nonce: [u8; 16] = rand::random();
    BASE64.encode(nonce)
}

/// Expected `Sec-WebSocket-Accept` for `key`.
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(ACCEPT_MAGIC.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// The upgrade request for `endpoint`.
pub fn build_request(endpoint: &Endpoint, key: &str) -> String {
    format!(
        "GET {path} HTTP/1.1\r\n\
         Host: {host}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         Sec-WebSocket-Version: 13\r\n\
         \r\n",
        path = endpoint.path(),
        host = endpoint.host_header(),
        key = key,
    )
}

/// Status line and headers of the upgrade response.
#[derive(Debug, Clone)]
pub struct HandshakeResponse {
    pub status: StatusCode,
    pub reason: String,
    pub headers: HeaderMap,
}

/// Parse a response head (everything up to and including the blank line).
pub fn parse_response(head: &[u8]) -> Result<HandshakeResponse, ClientError> {
    let text = std::str::from_utf8(head)
        .map_err(|_| ClientError::protocol("upgrade response head is not valid utf-8"))?;
    let mut lines = text.split("\r\n");

    let status_line = lines
        .next()
        .filter(|l| !l.is_empty())
        .ok_or_else(|| ClientError::protocol("empty upgrade response"))?;
    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/") {
        return Err(ClientError::protocol(format!(
            "malformed status line '{}'",
            status_line
        )));
    }
    let status = parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .and_then(|code| StatusCode::from_u16(code).ok())
        .ok_or_else(|| {
            ClientError::protocol(format!("malformed status line '{}'", status_line))
        })?;
    let reason = parts.next().unwrap_or_default().to_string();

    let mut headers = HeaderMap::new();
    for line in lines.take_while(|l| !l.is_empty()) {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| ClientError::protocol(format!("malformed header line '{}'", line)))?;
        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|_| ClientError::protocol(format!("invalid header name '{}'", name)))?;
        let value = HeaderValue::from_str(value.trim())
            .map_err(|_| ClientError::protocol(format!("invalid value for header {}", name)))?;
        headers.append(name, value);
    }

    Ok(HandshakeResponse {
        status,
        reason,
        headers,
    })
}

fn header<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Check an upgrade response against the key that was sent.
pub fn validate_response(response: &HandshakeResponse, key: &str) -> Result<(), ClientError> {
    if response.status != StatusCode::SWITCHING_PROTOCOLS {
        return Err(ClientError::protocol(format!(
            "Expected HTTP 101 response but was '{} {}'",
            response.status.as_u16(),
            response.reason
        )));
    }

    let connection = header(&response.headers, &CONNECTION);
    if !connection.is_some_and(|v| v.eq_ignore_ascii_case("Upgrade")) {
        return Err(ClientError::protocol(format!(
            "Expected 'Connection' header value 'Upgrade' but was '{}'",
            connection.unwrap_or("null")
        )));
    }

    let upgrade = header(&response.headers, &UPGRADE);
    if !upgrade.is_some_and(|v| v.eq_ignore_ascii_case("websocket")) {
        return Err(ClientError::protocol(format!(
            "Expected 'Upgrade' header value 'websocket' but was '{}'",
            upgrade.unwrap_or("null")
        )));
    }

    let accept = header(&response.headers, &SEC_WEBSOCKET_ACCEPT);
    let expected = accept_key(key);
    if accept != Some(expected.as_str()) {
        return Err(ClientError::protocol(format!(
            "Expected 'Sec-WebSocket-Accept' header value '{}' but was '{}'",
            expected,
            accept.unwrap_or("null")
        )));
    }

    Ok(())
}

/// Reason a close code may not be sent, if any.
pub fn close_code_error(code: u16) -> Option<String> {
    if !(1000..5000).contains(&code) {
        Some(format!("Code must be in range [1000,5000): {}", code))
    } else if (1004..=1006).contains(&code) || (1012..=2999).contains(&code) {
        Some(format!("Code {} is reserved and may not be used.", code))
    } else {
        None
    }
}

pub fn validate_close_code(code: u16) -> Result<(), ClientError> {
    match close_code_error(code) {
        Some(message) => Err(ClientError::Protocol(message)),
        None => Ok(()),
    }
}

/// Run the client handshake over an established byte stream.
///
/// Returns any bytes the server sent after the response head; they belong to
/// the first WebSocket frame.
pub async fn perform<S>(
    stream: &mut S,
    endpoint: &Endpoint,
    max_head_bytes: usize,
) -> Result<Vec<u8>, ClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let key = generate_key();
    let request = build_request(endpoint, &key);
    stream.write_all(request.as_bytes()).await?;
    stream.flush().await?;
    trace!(endpoint = %endpoint, "Upgrade request sent");

    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    let head_len = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(ClientError::transport(
                "connection closed during upgrade handshake",
            ));
        }
        // terminator may straddle the previous chunk
        let search_from = buf.len().saturating_sub(HEAD_TERMINATOR.len() - 1);
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf[search_from..]
            .windows(HEAD_TERMINATOR.len())
            .position(|w| w == HEAD_TERMINATOR)
        {
            let head_len = search_from + pos + HEAD_TERMINATOR.len();
            if head_len > max_head_bytes {
                return Err(ClientError::protocol(format!(
                    "upgrade response head exceeds {} bytes",
                    max_head_bytes
                )));
            }
            break head_len;
        }
        if buf.len() > max_head_bytes {
            return Err(ClientError::protocol(format!(
                "upgrade response head exceeds {} bytes",
                max_head_bytes
            )));
        }
    };

    let response = parse_response(&buf[..head_len])?;
    validate_response(&response, &key)?;
    debug!(endpoint = %endpoint, "WebSocket upgrade accepted");

    Ok(buf.split_off(head_len))
}
