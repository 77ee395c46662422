//! Farm gateway client
//!
//! Client library for the game gateway. Every request is one HMAC-signed JSON envelope on its
//! own line, answered by at most one signed envelope on the same connection.

use anyhow::{Context, Result};
use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

#[cfg(unix)]
pub const DEFAULT_ADDR: &str = "/tmp/farm-gateway.sock";
#[cfg(not(unix))]
pub const DEFAULT_ADDR: &str = "127.0.0.1:17650";

pub const GATEWAY_IDENT: &str = "gateway";
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(10);

pub const MSG_REGISTER: &str = "REGISTER";
pub const MSG_CALL: &str = "CALL";
pub const MSG_REPLY: &str = "REPLY";
pub const MSG_POLL: &str = "POLL";
pub const MSG_PUSH: &str = "PUSH";
pub const MSG_ACK: &str = "ACK";
pub const MSG_ERR: &str = "ERR";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("disconnected")]
    Disconnected,
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("timeout")]
    Timeout,
    #[error("rejected by gateway: {0}")]
    Rejected(String),
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Msg {
    pub msg_type: String, // REGISTER, CALL, REPLY, POLL, PUSH, ACK, ERR
    pub msg_id: String,
    pub from: String,
    pub to: String,
    pub ts: u64,
    pub nonce: String,
    pub hmac: String,
    pub payload: serde_json::Value,
}

impl Msg {
    /// Builds and signs a fresh envelope.
    pub fn new(typ: &str, from: &str, to: &str, payload: serde_json::Value, secret: &str) -> Self {
        let mut msg = Msg {
            msg_type: typ.to_string(),
            msg_id: Uuid::new_v4().to_string(),
            from: from.to_string(),
            to: to.to_string(),
            ts: now_ts(),
            nonce: Uuid::new_v4().to_string(),
            hmac: String::new(),
            payload,
        };
        sign_msg(&mut msg, secret);
        msg
    }

    pub fn verify(&self, secret: &str) -> bool {
        verify_hmac(self, secret).unwrap_or(false)
    }

    /// The `message` field of an `ERR` payload.
    pub fn error_message(&self) -> Option<&str> {
        self.payload.get("message").and_then(|v| v.as_str())
    }
}

/// A server push extracted from a `PUSH` envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushMessage {
    pub event: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Endpoint<'a> {
    #[cfg(unix)]
    Unix(&'a str),
    Tcp(&'a str),
}

fn endpoint(addr: &str) -> Endpoint<'_> {
    let addr = addr.trim();
    if let Some(tcp) = addr.strip_prefix("tcp://") {
        return Endpoint::Tcp(tcp);
    }
    #[cfg(unix)]
    {
        if let Some(path) = addr.strip_prefix("unix://") {
            return Endpoint::Unix(path);
        }
        if addr.starts_with('/') || addr.starts_with('.') || !addr.contains(':') {
            return Endpoint::Unix(addr);
        }
    }
    Endpoint::Tcp(addr)
}

/// Client for the farm game gateway
pub struct GatewayClient {
    addr: String,
    ident: String,
    secret: String,
    reply_timeout: Duration,
    gateway_version: Option<String>,
}

impl GatewayClient {
    /// Connect to the gateway and register `ident`
    pub async fn connect(addr: &str, ident: &str, secret: &str) -> Result<Self> {
        let mut client = Self {
            addr: addr.to_string(),
            ident: ident.to_string(),
            secret: secret.to_string(),
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            gateway_version: None,
        };
        client.register().await?;
        Ok(client)
    }

    pub fn with_reply_timeout(mut self, reply_timeout: Duration) -> Self {
        self.reply_timeout = reply_timeout;
        self
    }

    /// Get client identifier
    pub fn ident(&self) -> &str {
        &self.ident
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Version reported by the gateway during registration, when available.
    pub fn gateway_version(&self) -> Option<&str> {
        self.gateway_version.as_deref()
    }

    async fn send_message(&self, msg: Msg) -> Result<Option<Msg>> {
        match endpoint(&self.addr) {
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                let stream = UnixStream::connect(path)
                    .await
                    .with_context(|| format!("failed to connect to gateway at {}", path))?;
                self.exchange(stream, msg).await
            }
            Endpoint::Tcp(addr) => {
                let stream = TcpStream::connect(addr)
                    .await
                    .with_context(|| format!("failed to connect to gateway at {}", addr))?;
                self.exchange(stream, msg).await
            }
        }
    }

    async fn exchange<S>(&self, stream: S, msg: Msg) -> Result<Option<Msg>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (reader, mut writer) = tokio::io::split(stream);
        let mut buf_reader = BufReader::new(reader);

        let line = serde_json::to_string(&msg)? + "\n";
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;

        let mut response_line = String::new();
        match timeout(self.reply_timeout, buf_reader.read_line(&mut response_line)).await {
            Err(_) => Ok(None),    // No response within timeout
            Ok(Ok(0)) => Ok(None), // Connection closed without response
            Ok(Ok(_)) => Ok(self.decode_response(response_line.trim())),
            Ok(Err(err)) => Err(err.into()),
        }
    }

    fn decode_response(&self, raw: &str) -> Option<Msg> {
        if raw.is_empty() {
            return None;
        }
        match serde_json::from_str::<Msg>(raw) {
            Ok(response) if response.verify(&self.secret) => Some(response),
            Ok(response) => {
                warn!("Invalid HMAC in {} response", response.msg_type);
                None
            }
            Err(e) => {
                error!("Failed to parse response: {}", e);
                None
            }
        }
    }

    /// Register with the gateway
    pub async fn register(&mut self) -> Result<()> {
        let payload = serde_json::json!({
            "pid": std::process::id(),
            "version": env!("CARGO_PKG_VERSION"),
        });
        let msg = Msg::new(MSG_REGISTER, &self.ident, GATEWAY_IDENT, payload, &self.secret);
        match self.send_message(msg).await? {
            Some(response) => match response.msg_type.as_str() {
                MSG_ACK => {
                    if let Some(version) = response
                        .payload
                        .get("gateway_version")
                        .and_then(|v| v.as_str())
                    {
                        self.gateway_version = Some(version.to_string());
                        info!("Registered against gateway {}", version);
                    }
                    debug!("Registered client: {}", self.ident);
                    Ok(())
                }
                MSG_ERR => Err(ClientError::Rejected(
                    response
                        .error_message()
                        .unwrap_or("gateway rejected registration")
                        .to_string(),
                )
                .into()),
                other => {
                    warn!("Unexpected response to REGISTER: {}", other);
                    Ok(())
                }
            },
            None => {
                debug!("Registered client: {}", self.ident);
                Ok(())
            }
        }
    }

    /// Invoke `service`/`method` with an encoded request body and return the reply body
    pub async fn call(&self, service: &str, method: &str, body: &[u8]) -> Result<Vec<u8>> {
        let payload = serde_json::json!({
            "service": service,
            "method": method,
            "body": general_purpose::STANDARD.encode(body),
        });
        let msg = Msg::new(MSG_CALL, &self.ident, GATEWAY_IDENT, payload, &self.secret);
        match self.send_message(msg).await? {
            Some(reply) => match reply.msg_type.as_str() {
                MSG_REPLY => decode_body(&reply.payload),
                MSG_ERR => Err(ClientError::Rejected(
                    reply
                        .error_message()
                        .unwrap_or("gateway rejected call")
                        .to_string(),
                )
                .into()),
                other => Err(ClientError::InvalidResponse(format!(
                    "unexpected {} to {}/{}",
                    other, service, method
                ))
                .into()),
            },
            None => Err(ClientError::Timeout.into()),
        }
    }

    /// Poll for the next pending server push. `ACK` means nothing is pending; `ERR` is an error.
    pub async fn poll(&self) -> Result<Option<Msg>> {
        let msg = Msg::new(
            MSG_POLL,
            &self.ident,
            GATEWAY_IDENT,
            serde_json::json!({}),
            &self.secret,
        );
        match self.send_message(msg).await? {
            Some(reply) if reply.msg_type == MSG_ACK => Ok(None),
            Some(reply) if reply.msg_type == MSG_ERR => Err(ClientError::Rejected(
                reply
                    .error_message()
                    .unwrap_or("gateway rejected poll")
                    .to_string(),
            )
            .into()),
            other => Ok(other),
        }
    }

    /// Check if a message is a server push
    pub fn is_push(msg: &Msg) -> bool {
        msg.msg_type == MSG_PUSH
    }

    /// Extract event name and body from a push message
    pub fn extract_push(msg: &Msg) -> Result<PushMessage> {
        if !Self::is_push(msg) {
            return Err(ClientError::InvalidResponse(format!(
                "expected PUSH, got {}",
                msg.msg_type
            ))
            .into());
        }
        let event = msg
            .payload
            .get("event")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ClientError::InvalidResponse("push without event name".into()))?;
        Ok(PushMessage {
            event: event.to_string(),
            body: decode_body(&msg.payload)?,
        })
    }
}

fn decode_body(payload: &serde_json::Value) -> Result<Vec<u8>> {
    let encoded = payload.get("body").and_then(|v| v.as_str()).unwrap_or("");
    general_purpose::STANDARD
        .decode(encoded.as_bytes())
        .map_err(|e| ClientError::InvalidResponse(format!("body is not base64: {}", e)).into())
}

// HMAC utilities
fn now_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn sign_msg(msg: &mut Msg, secret: &str) {
    let body = canonical_body(msg);
    // HMAC-SHA256 accepts keys of any length.
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return;
    };
    mac.update(body.as_bytes());
    let sig = mac.finalize().into_bytes();
    msg.hmac = general_purpose::STANDARD.encode(sig);
}

fn verify_hmac(msg: &Msg, secret: &str) -> Result<bool> {
    let body = canonical_body(msg);
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(body.as_bytes());
    let bytes = general_purpose::STANDARD
        .decode(msg.hmac.as_bytes())
        .unwrap_or_default();
    Ok(mac.verify_slice(&bytes).is_ok())
}

fn canonical_body(msg: &Msg) -> String {
    let payload = serde_json::to_string(&msg.payload).unwrap_or("{}".to_string());
    format!(
        "{}|{}|{}|{}|{}|{}|{}",
        msg.msg_type, msg.msg_id, msg.from, msg.to, msg.ts, msg.nonce, payload
    )
}
