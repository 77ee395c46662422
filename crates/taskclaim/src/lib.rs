//! Automatic task reward claiming for the farm bot.
//!
//! Task snapshots arrive from a startup poll or a `taskInfoNotify` push, are filtered down to
//! claimable candidates, and claimed one at a time.

pub mod analyzer;
pub mod api;
pub mod config;
pub mod error;
pub mod events;
#[cfg(feature = "gateway")]
pub mod gateway;
pub mod lifecycle;
pub mod orchestrator;
pub mod report;
pub mod summary;
pub mod transport;
pub mod triggers;
pub mod types;

pub use analyzer::{analyze_task_info, analyze_task_list};
pub use api::TaskApi;
pub use config::TaskClaimConfig;
pub use error::{ConfigError, TaskError, TaskResult};
pub use events::{NetworkEvent, NetworkEvents};
#[cfg(feature = "gateway")]
pub use gateway::{spawn_push_pump, GatewayTransport};
pub use lifecycle::{LifecycleOptions, TaskSystem};
pub use orchestrator::ClaimOrchestrator;
pub use report::{ClaimLog, TracingLog};
pub use summary::{ItemCatalog, ItemNames, RewardSummarizer};
pub use transport::RpcTransport;
pub use triggers::{check_and_claim_tasks, StartupPolicy};
pub use types::*;
