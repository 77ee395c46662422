//! Typed wrappers over the task service methods.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{TaskError, TaskResult};
use crate::transport::RpcTransport;
use crate::types::{
    BatchClaimTaskRewardReply, BatchClaimTaskRewardRequest, ClaimTaskRewardReply,
    ClaimTaskRewardRequest, TaskInfoReply, TaskInfoRequest, METHOD_BATCH_CLAIM_TASK_REWARD,
    METHOD_CLAIM_TASK_REWARD, METHOD_TASK_INFO, TASK_SERVICE,
};

#[derive(Clone)]
pub struct TaskApi {
    transport: Arc<dyn RpcTransport>,
}

impl TaskApi {
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self { transport }
    }

    /// Fetches the full current task state. A reply without `task_info` is not an error.
    pub async fn get_task_info(&self) -> TaskResult<TaskInfoReply> {
        self.invoke(METHOD_TASK_INFO, &TaskInfoRequest::default())
            .await
    }

    pub async fn claim_task_reward(
        &self,
        task_id: u64,
        do_shared: bool,
    ) -> TaskResult<ClaimTaskRewardReply> {
        let request = ClaimTaskRewardRequest {
            id: task_id,
            do_shared,
        };
        self.invoke(METHOD_CLAIM_TASK_REWARD, &request).await
    }

    /// Claims several tasks in one call. The orchestrator claims one task at a time instead so
    /// each outcome can be attributed; this stays available for callers that do not need that.
    pub async fn batch_claim_task_reward(
        &self,
        task_ids: &[u64],
        do_shared: bool,
    ) -> TaskResult<BatchClaimTaskRewardReply> {
        let request = BatchClaimTaskRewardRequest {
            ids: task_ids.to_vec(),
            do_shared,
        };
        self.invoke(METHOD_BATCH_CLAIM_TASK_REWARD, &request).await
    }

    async fn invoke<Req, Rep>(&self, method: &'static str, request: &Req) -> TaskResult<Rep>
    where
        Req: Serialize,
        Rep: DeserializeOwned,
    {
        let body = serde_json::to_vec(request).map_err(|source| TaskError::Encode {
            what: method,
            source,
        })?;

        debug!("calling {}/{}", TASK_SERVICE, method);
        let reply = self
            .transport
            .call(TASK_SERVICE, method, body)
            .await
            .map_err(|err| TaskError::Remote {
                service: TASK_SERVICE,
                method,
                message: format!("{err:#}"),
            })?;

        serde_json::from_slice(&reply).map_err(|source| TaskError::Decode {
            what: method,
            source,
        })
    }
}
