use anyhow::Result;
use async_trait::async_trait;

/// Request/reply channel to the game services.
///
/// Payloads are opaque bytes; encoding and decoding belong to the caller.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn call(&self, service: &str, method: &str, body: Vec<u8>) -> Result<Vec<u8>>;
}
