use serde::{Deserialize, Serialize};

pub const TASK_SERVICE: &str = "gamepb.taskpb.TaskService";
pub const METHOD_TASK_INFO: &str = "TaskInfo";
pub const METHOD_CLAIM_TASK_REWARD: &str = "ClaimTaskReward";
pub const METHOD_BATCH_CLAIM_TASK_REWARD: &str = "BatchClaimTaskReward";
pub const TASK_INFO_NOTIFY: &str = "taskInfoNotify";
pub const LOG_CATEGORY: &str = "task";

/// One task instance as reported by the task service.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskRecord {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub progress: u64,
    #[serde(default)]
    pub total_progress: u64,
    #[serde(default)]
    pub is_unlocked: bool,
    #[serde(default)]
    pub is_claimed: bool,
    #[serde(default = "default_share_multiple")]
    pub share_multiple: u32,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub rewards: Vec<RewardItem>,
}

impl TaskRecord {
    pub fn is_claimable(&self) -> bool {
        self.is_unlocked
            && !self.is_claimed
            && self.progress >= self.total_progress
            && self.total_progress > 0
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RewardItem {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub count: u64,
}

/// Point-in-time task state, grouped by category.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskInfo {
    #[serde(default)]
    pub growth_tasks: Option<Vec<TaskRecord>>,
    #[serde(default)]
    pub daily_tasks: Option<Vec<TaskRecord>>,
    #[serde(default)]
    pub tasks: Option<Vec<TaskRecord>>,
}

impl TaskInfo {
    /// Growth, daily and generic tasks in that order; absent categories contribute nothing.
    pub fn all_tasks(&self) -> impl Iterator<Item = &TaskRecord> {
        [&self.growth_tasks, &self.daily_tasks, &self.tasks]
            .into_iter()
            .flat_map(|category| category.iter().flatten())
    }
}

/// A task that passed the claimability check during one reconciliation pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClaimableTask {
    pub id: u64,
    pub desc: String,
    pub share_multiple: u32,
    pub rewards: Vec<RewardItem>,
}

impl ClaimableTask {
    pub fn use_share(&self) -> bool {
        self.share_multiple > 1
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TaskInfoRequest {}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TaskInfoReply {
    #[serde(default)]
    pub task_info: Option<TaskInfo>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClaimTaskRewardRequest {
    pub id: u64,
    pub do_shared: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ClaimTaskRewardReply {
    #[serde(default)]
    pub items: Option<Vec<RewardItem>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchClaimTaskRewardRequest {
    pub ids: Vec<u64>,
    pub do_shared: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BatchClaimTaskRewardReply {
    #[serde(default)]
    pub items: Option<Vec<RewardItem>>,
}

/// Payload of the `taskInfoNotify` push.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TaskInfoNotify {
    #[serde(default)]
    pub task_info: Option<TaskInfo>,
}

/// Outcome counts of one orchestrator pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassReport {
    pub claimed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl PassReport {
    pub fn attempted(&self) -> usize {
        self.claimed + self.failed
    }
}

pub fn default_share_multiple() -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_reply_tolerates_omitted_zero_fields() {
        let reply: ClaimTaskRewardReply =
            serde_json::from_str(r#"{"items":[{"id":1},{"count":3},{}]}"#).unwrap();
        assert_eq!(
            reply.items.unwrap_or_default(),
            vec![
                RewardItem { id: 1, count: 0 },
                RewardItem { id: 0, count: 3 },
                RewardItem { id: 0, count: 0 },
            ]
        );
    }

    #[test]
    fn task_record_without_fields_decodes_to_defaults() {
        let record: TaskRecord = serde_json::from_str("{}").unwrap();
        assert_eq!(record.id, 0);
        assert_eq!(record.share_multiple, 1);
        assert!(record.desc.is_none());
        assert!(!record.is_claimable());
    }
}
