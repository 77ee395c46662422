use tokio::sync::broadcast;
use tracing::debug;

use crate::types::{TaskInfo, TASK_INFO_NOTIFY};

const EVENT_CAPACITY: usize = 64;

/// A server push, decoded far enough to route it.
#[derive(Clone, Debug)]
pub enum NetworkEvent {
    TaskInfoNotify(Option<TaskInfo>),
    Other { name: String },
}

impl NetworkEvent {
    pub fn name(&self) -> &str {
        match self {
            NetworkEvent::TaskInfoNotify(_) => TASK_INFO_NOTIFY,
            NetworkEvent::Other { name } => name,
        }
    }
}

/// Fan-out of server pushes to every subscribed listener.
#[derive(Clone)]
pub struct NetworkEvents {
    tx: broadcast::Sender<NetworkEvent>,
}

impl NetworkEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NetworkEvent> {
        self.tx.subscribe()
    }

    /// Returns the number of listeners reached. Publishing with no listener is not an error.
    pub fn publish(&self, event: NetworkEvent) -> usize {
        match self.tx.send(event) {
            Ok(count) => count,
            Err(broadcast::error::SendError(event)) => {
                debug!("no listener for {} push", event.name());
                0
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for NetworkEvents {
    fn default() -> Self {
        Self::new()
    }
}
