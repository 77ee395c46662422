use crate::types::{ClaimableTask, TaskInfo, TaskRecord};

/// Collects the claimable tasks of a snapshot, growth first, then daily, then generic.
pub fn analyze_task_info(info: &TaskInfo) -> Vec<ClaimableTask> {
    analyze_task_list(info.all_tasks())
}

pub fn analyze_task_list<'a, I>(tasks: I) -> Vec<ClaimableTask>
where
    I: IntoIterator<Item = &'a TaskRecord>,
{
    tasks
        .into_iter()
        .filter(|task| task.is_claimable())
        .map(|task| ClaimableTask {
            id: task.id,
            desc: task
                .desc
                .as_deref()
                .filter(|desc| !desc.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("task#{}", task.id)),
            share_multiple: task.share_multiple,
            rewards: task.rewards.clone(),
        })
        .collect()
}
