use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use farm_gateway_client::{GatewayClient, PushMessage};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::events::{NetworkEvent, NetworkEvents};
use crate::transport::RpcTransport;
use crate::types::{TaskInfoNotify, TASK_INFO_NOTIFY};

/// [`RpcTransport`] over the game gateway. Reconnects lazily after a failed exchange.
pub struct GatewayTransport {
    config: GatewayConfig,
    client: Mutex<Option<Arc<GatewayClient>>>,
}

impl GatewayTransport {
    pub async fn connect(config: GatewayConfig) -> Result<Self> {
        let transport = Self {
            config,
            client: Mutex::new(None),
        };

        match transport.ensure_connected().await {
            Ok(_) => info!("Connected to gateway at {}", transport.config.address),
            Err(err) => {
                warn!("Unable to connect to gateway: {:#}", err);
                return Err(err);
            }
        }

        Ok(transport)
    }

    async fn ensure_connected(&self) -> Result<Arc<GatewayClient>> {
        {
            let guard = self.client.lock().await;
            if let Some(client) = guard.as_ref() {
                return Ok(client.clone());
            }
        }

        let client = Arc::new(
            GatewayClient::connect(
                &self.config.address,
                &self.config.ident,
                &self.config.secret,
            )
            .await
            .with_context(|| format!("failed to register at gateway {}", self.config.address))?,
        );
        let mut guard = self.client.lock().await;
        *guard = Some(client.clone());
        Ok(client)
    }

    async fn invalidate_client(&self) {
        let mut guard = self.client.lock().await;
        *guard = None;
    }

    async fn with_client<F, Fut, T>(&self, op: F) -> Result<T>
    where
        F: FnOnce(Arc<GatewayClient>) -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let client = self.ensure_connected().await?;
        match op(client).await {
            Ok(value) => Ok(value),
            Err(err) => {
                self.invalidate_client().await;
                Err(err)
            }
        }
    }

    /// Drains every pending push into `events`. Returns how many were published.
    ///
    /// Stops at the first reply that is not a push. A rejected poll drops the client and is
    /// returned as an error.
    pub async fn poll_pushes(&self, events: &NetworkEvents) -> Result<usize> {
        let client = self.ensure_connected().await?;
        let mut published = 0;

        loop {
            let message = match client.poll().await {
                Ok(Some(message)) => message,
                Ok(None) => break,
                Err(err) => {
                    self.invalidate_client().await;
                    return Err(err);
                }
            };

            if !GatewayClient::is_push(&message) {
                debug!("Ignoring gateway message type: {}", message.msg_type);
                break;
            }

            match GatewayClient::extract_push(&message) {
                Ok(push) => {
                    if let Some(event) = decode_push(push) {
                        events.publish(event);
                        published += 1;
                    }
                }
                Err(err) => warn!("Dropping malformed push {}: {:#}", message.msg_id, err),
            }
        }

        Ok(published)
    }
}

#[async_trait]
impl RpcTransport for GatewayTransport {
    async fn call(&self, service: &str, method: &str, body: Vec<u8>) -> Result<Vec<u8>> {
        self.with_client(|client| async move { client.call(service, method, &body).await })
            .await
    }
}

/// Routes a push to its event; `None` when a known event carries an undecodable body.
pub fn decode_push(push: PushMessage) -> Option<NetworkEvent> {
    if push.event != TASK_INFO_NOTIFY {
        return Some(NetworkEvent::Other { name: push.event });
    }

    match serde_json::from_slice::<TaskInfoNotify>(&push.body) {
        Ok(notify) => Some(NetworkEvent::TaskInfoNotify(notify.task_info)),
        Err(err) => {
            warn!("Invalid {} payload: {}", TASK_INFO_NOTIFY, err);
            None
        }
    }
}

/// Polls the gateway every `interval` and publishes its pushes until aborted.
pub fn spawn_push_pump(
    transport: Arc<GatewayTransport>,
    events: NetworkEvents,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!("Push pump started");
        loop {
            if let Err(err) = transport.poll_pushes(&events).await {
                warn!("Push poll failed: {:#}", err);
            }
            sleep(interval).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_info_push_decodes_snapshot() {
        let body = br#"{"task_info":{"daily_tasks":[{"id":9,"progress":1,"total_progress":1,"is_unlocked":true}]}}"#;
        let event = decode_push(PushMessage {
            event: TASK_INFO_NOTIFY.to_string(),
            body: body.to_vec(),
        });
        match event {
            Some(NetworkEvent::TaskInfoNotify(Some(info))) => {
                let daily = info.daily_tasks.unwrap_or_default();
                assert_eq!(daily.len(), 1);
                assert!(daily[0].is_claimable());
                assert_eq!(daily[0].share_multiple, 1);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn unknown_push_is_routed_by_name() {
        let event = decode_push(PushMessage {
            event: "kickout".to_string(),
            body: Vec::new(),
        });
        assert!(matches!(event, Some(NetworkEvent::Other { name }) if name == "kickout"));
    }

    #[test]
    fn garbled_task_info_push_is_dropped() {
        let event = decode_push(PushMessage {
            event: TASK_INFO_NOTIFY.to_string(),
            body: b"not json".to_vec(),
        });
        assert!(event.is_none());
    }

    #[cfg(unix)]
    mod rejecting_gateway {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;
        use std::time::Duration;

        use farm_gateway_client::{Msg, GATEWAY_IDENT, MSG_ACK, MSG_ERR, MSG_POLL};
        use serde_json::json;
        use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
        use tokio::net::UnixListener;
        use tokio::time::sleep;

        use crate::config::GatewayConfig;
        use crate::events::NetworkEvents;
        use crate::gateway::{spawn_push_pump, GatewayTransport};

        const SECRET: &str = "pump-secret";

        fn spawn_gateway(listener: UnixListener, polls: Arc<AtomicUsize>) {
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let polls = polls.clone();
                    tokio::spawn(async move {
                        let (reader, mut writer) = stream.into_split();
                        let mut line = String::new();
                        if BufReader::new(reader).read_line(&mut line).await.is_err() {
                            return;
                        }
                        let Ok(request) = serde_json::from_str::<Msg>(line.trim()) else {
                            return;
                        };
                        let to = request.from.as_str();
                        let reply = if request.msg_type == MSG_POLL {
                            polls.fetch_add(1, Ordering::SeqCst);
                            let payload = json!({"message": "not registered"});
                            Msg::new(MSG_ERR, GATEWAY_IDENT, to, payload, SECRET)
                        } else {
                            Msg::new(MSG_ACK, GATEWAY_IDENT, to, json!({}), SECRET)
                        };
                        let out = serde_json::to_string(&reply).unwrap() + "\n";
                        let _ = writer.write_all(out.as_bytes()).await;
                    });
                }
            });
        }

        fn config(address: String, poll_interval_ms: u64) -> GatewayConfig {
            GatewayConfig {
                address,
                ident: "farmbot:test".to_string(),
                secret: SECRET.to_string(),
                poll_interval_ms,
            }
        }

        #[tokio::test]
        async fn rejected_poll_ends_the_drain_and_drops_the_client() {
            let dir = tempfile::tempdir().unwrap();
            let socket = dir.path().join("gateway.sock");
            let polls = Arc::new(AtomicUsize::new(0));
            spawn_gateway(UnixListener::bind(&socket).unwrap(), polls.clone());

            let address = socket.to_string_lossy().to_string();
            let transport = GatewayTransport::connect(config(address, 10)).await.unwrap();
            let events = NetworkEvents::new();

            let drained = tokio::time::timeout(
                Duration::from_secs(2),
                transport.poll_pushes(&events),
            )
            .await
            .expect("a rejected poll must end the drain");

            assert!(drained.is_err());
            assert_eq!(polls.load(Ordering::SeqCst), 1);
            assert!(transport.client.lock().await.is_none());
        }

        #[tokio::test]
        async fn pump_keeps_its_interval_while_polls_are_rejected() {
            let dir = tempfile::tempdir().unwrap();
            let socket = dir.path().join("gateway.sock");
            let polls = Arc::new(AtomicUsize::new(0));
            spawn_gateway(UnixListener::bind(&socket).unwrap(), polls.clone());

            let address = socket.to_string_lossy().to_string();
            let gateway = config(address, 200);
            let interval = gateway.poll_interval();
            let transport = Arc::new(GatewayTransport::connect(gateway).await.unwrap());

            let pump = spawn_push_pump(transport, NetworkEvents::new(), interval);
            sleep(Duration::from_millis(500)).await;
            pump.abort();

            let sent = polls.load(Ordering::SeqCst);
            assert!((1..=4).contains(&sent), "{} polls in 500ms", sent);
        }
    }
}
