#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use farm_taskclaim::{
    ClaimLog, ClaimOrchestrator, ClaimableTask, RewardItem, RewardSummarizer, RpcTransport,
    TaskApi, TaskInfo, TaskRecord, METHOD_CLAIM_TASK_REWARD, METHOD_TASK_INFO,
};
use serde_json::{json, Value};
use tokio::time::{sleep, Instant};

#[derive(Debug, Clone)]
pub struct Call {
    pub method: String,
    pub request: Value,
    pub at: Instant,
}

/// In-memory task service with configurable failures and latency.
#[derive(Default)]
pub struct ScriptedTransport {
    task_info: Mutex<Option<TaskInfo>>,
    fail_task_info: Mutex<bool>,
    failing_claims: Mutex<HashSet<u64>>,
    claim_items: Mutex<HashMap<u64, Vec<RewardItem>>>,
    claim_latency: Mutex<Duration>,
    calls: Mutex<Vec<Call>>,
    claims_in_flight: Mutex<HashSet<u64>>,
    overlapping_claims: Mutex<Vec<u64>>,
    concurrent: Mutex<(usize, usize)>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_task_info(&self, info: Option<TaskInfo>) {
        *self.task_info.lock().unwrap() = info;
    }

    pub fn fail_task_info(&self) {
        *self.fail_task_info.lock().unwrap() = true;
    }

    pub fn fail_claim(&self, id: u64) {
        self.failing_claims.lock().unwrap().insert(id);
    }

    pub fn grant(&self, id: u64, items: Vec<RewardItem>) {
        self.claim_items.lock().unwrap().insert(id, items);
    }

    pub fn set_claim_latency(&self, latency: Duration) {
        *self.claim_latency.lock().unwrap() = latency;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn claim_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| call.method == METHOD_CLAIM_TASK_REWARD)
            .collect()
    }

    pub fn claimed_ids(&self) -> Vec<u64> {
        self.claim_calls()
            .iter()
            .map(|call| call.request["id"].as_u64().unwrap())
            .collect()
    }

    pub fn task_info_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| call.method == METHOD_TASK_INFO)
            .collect()
    }

    /// Ids that were submitted while an earlier claim for the same id was still running.
    pub fn overlapping_claims(&self) -> Vec<u64> {
        self.overlapping_claims.lock().unwrap().clone()
    }

    pub fn max_concurrent_claims(&self) -> usize {
        self.concurrent.lock().unwrap().1
    }

    async fn claim(&self, id: u64) -> Result<Value> {
        let first = self.claims_in_flight.lock().unwrap().insert(id);
        if !first {
            self.overlapping_claims.lock().unwrap().push(id);
        }
        {
            let mut concurrent = self.concurrent.lock().unwrap();
            concurrent.0 += 1;
            concurrent.1 = concurrent.1.max(concurrent.0);
        }

        let latency = *self.claim_latency.lock().unwrap();
        if !latency.is_zero() {
            sleep(latency).await;
        }

        self.concurrent.lock().unwrap().0 -= 1;
        self.claims_in_flight.lock().unwrap().remove(&id);

        let failing = self.failing_claims.lock().unwrap().contains(&id);
        if failing {
            return Err(anyhow!("task {} is not finished", id));
        }
        let items = self
            .claim_items
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_default();
        Ok(json!({ "items": items }))
    }
}

#[async_trait]
impl RpcTransport for ScriptedTransport {
    async fn call(&self, service: &str, method: &str, body: Vec<u8>) -> Result<Vec<u8>> {
        assert_eq!(service, farm_taskclaim::TASK_SERVICE);
        let request: Value = serde_json::from_slice(&body)?;
        self.calls.lock().unwrap().push(Call {
            method: method.to_string(),
            request: request.clone(),
            at: Instant::now(),
        });

        let reply = match method {
            METHOD_TASK_INFO => {
                let failing = *self.fail_task_info.lock().unwrap();
                if failing {
                    return Err(anyhow!("connection reset"));
                }
                let info = self.task_info.lock().unwrap().clone();
                json!({ "task_info": info })
            }
            METHOD_CLAIM_TASK_REWARD => {
                let id = request["id"].as_u64().ok_or_else(|| anyhow!("missing id"))?;
                self.claim(id).await?
            }
            other => return Err(anyhow!("unexpected method {}", other)),
        };
        Ok(serde_json::to_vec(&reply)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
}

#[derive(Default)]
pub struct RecordingLog {
    lines: Mutex<Vec<(Level, String, String)>>,
}

impl RecordingLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn infos(&self) -> Vec<String> {
        self.messages(Level::Info)
    }

    pub fn warnings(&self) -> Vec<String> {
        self.messages(Level::Warn)
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().unwrap().is_empty()
    }

    fn messages(&self, level: Level) -> Vec<String> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _, _)| *l == level)
            .map(|(_, _, message)| message.clone())
            .collect()
    }
}

impl ClaimLog for RecordingLog {
    fn info(&self, category: &str, message: &str) {
        self.lines
            .lock()
            .unwrap()
            .push((Level::Info, category.to_string(), message.to_string()));
    }

    fn warn(&self, category: &str, message: &str) {
        self.lines
            .lock()
            .unwrap()
            .push((Level::Warn, category.to_string(), message.to_string()));
    }
}

pub fn orchestrator(
    transport: &Arc<ScriptedTransport>,
    log: &Arc<RecordingLog>,
) -> Arc<ClaimOrchestrator> {
    let api = TaskApi::new(transport.clone());
    Arc::new(ClaimOrchestrator::new(
        api,
        RewardSummarizer::default(),
        log.clone(),
    ))
}

pub fn finished(id: u64) -> TaskRecord {
    TaskRecord {
        id,
        progress: 5,
        total_progress: 5,
        is_unlocked: true,
        is_claimed: false,
        share_multiple: 1,
        desc: Some(format!("Harvest {} crops", id)),
        rewards: Vec::new(),
    }
}

pub fn candidate(id: u64) -> ClaimableTask {
    ClaimableTask {
        id,
        desc: format!("Harvest {} crops", id),
        share_multiple: 1,
        rewards: Vec::new(),
    }
}

pub fn daily_snapshot(tasks: Vec<TaskRecord>) -> TaskInfo {
    TaskInfo {
        growth_tasks: None,
        daily_tasks: Some(tasks),
        tasks: None,
    }
}
