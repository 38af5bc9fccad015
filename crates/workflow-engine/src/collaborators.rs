//! External services the default catalog talks to, with in-process stand-ins.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use pagekeeper_core_types::AutomationTask;
use pagekeeper_event_bus::InMemoryBus;

/// Remote record store plus cross-tab fan-out.
#[async_trait]
pub trait DataSync: Send + Sync {
    async fn is_connected(&self) -> bool;

    /// Returns false when the store refused the record.
    async fn push(&self, record: &Value) -> anyhow::Result<bool>;

    async fn broadcast(&self, channel: &str, record: &Value) -> anyhow::Result<bool>;
}

/// Service worker and offline cache.
#[async_trait]
pub trait CacheProvider: Send + Sync {
    async fn has_active_worker(&self) -> bool;
    async fn has_manifest(&self) -> bool;
    async fn test_offline(&self) -> bool;
    async fn refresh_cache(&self) -> anyhow::Result<bool>;
}

/// Performs the agent's actual work inside the `execute_agent_task` step.
#[async_trait]
pub trait AgentTaskRunner: Send + Sync {
    async fn run(
        &self,
        task: Option<Arc<AutomationTask>>,
        cancel: CancellationToken,
    ) -> anyhow::Result<Value>;
}

/// Message fanned out to other tabs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncMessage {
    pub channel: String,
    pub record: Value,
}

/// Keeps pushed records in memory and fans broadcasts out over an in-memory bus.
pub struct LocalDataSync {
    connected: AtomicBool,
    pushed: Mutex<Vec<Value>>,
    tabs: Arc<InMemoryBus<SyncMessage>>,
}

impl LocalDataSync {
    pub fn new(tabs: Arc<InMemoryBus<SyncMessage>>) -> Self {
        Self {
            connected: AtomicBool::new(true),
            pushed: Mutex::new(Vec::new()),
            tabs,
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    pub fn pushed(&self) -> Vec<Value> {
        self.pushed.lock().clone()
    }

    pub fn tabs(&self) -> Arc<InMemoryBus<SyncMessage>> {
        Arc::clone(&self.tabs)
    }
}

impl Default for LocalDataSync {
    fn default() -> Self {
        Self::new(InMemoryBus::new(16))
    }
}

#[async_trait]
impl DataSync for LocalDataSync {
    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    async fn push(&self, record: &Value) -> anyhow::Result<bool> {
        if !self.is_connected().await {
            return Ok(false);
        }
        self.pushed.lock().push(record.clone());
        debug!("record pushed");
        Ok(true)
    }

    async fn broadcast(&self, channel: &str, record: &Value) -> anyhow::Result<bool> {
        self.tabs.emit(SyncMessage {
            channel: channel.to_string(),
            record: record.clone(),
        });
        debug!(%channel, listeners = self.tabs.subscriber_count(), "record broadcast");
        Ok(true)
    }
}

/// Cache provider with fixed answers.
pub struct StaticCacheProvider {
    worker: bool,
    manifest: bool,
    offline: bool,
    refresh_ok: bool,
    refreshes: AtomicU64,
}

impl StaticCacheProvider {
    pub fn new(worker: bool, manifest: bool, offline: bool, refresh_ok: bool) -> Self {
        Self {
            worker,
            manifest,
            offline,
            refresh_ok,
            refreshes: AtomicU64::new(0),
        }
    }

    pub fn healthy() -> Self {
        Self::new(true, true, true, true)
    }

    pub fn refreshes(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }
}

impl Default for StaticCacheProvider {
    fn default() -> Self {
        Self::healthy()
    }
}

#[async_trait]
impl CacheProvider for StaticCacheProvider {
    async fn has_active_worker(&self) -> bool {
        self.worker
    }

    async fn has_manifest(&self) -> bool {
        self.manifest
    }

    async fn test_offline(&self) -> bool {
        self.offline
    }

    async fn refresh_cache(&self) -> anyhow::Result<bool> {
        self.refreshes.fetch_add(1, Ordering::Relaxed);
        Ok(self.refresh_ok)
    }
}

/// Acknowledges the task after an optional delay.
#[derive(Clone, Debug, Default)]
pub struct EchoTaskRunner {
    delay: Duration,
}

impl EchoTaskRunner {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl AgentTaskRunner for EchoTaskRunner {
    async fn run(
        &self,
        task: Option<Arc<AutomationTask>>,
        cancel: CancellationToken,
    ) -> anyhow::Result<Value> {
        info!(task = ?task.as_ref().map(|t| t.kind.label()), "Executing agent task");
        if !self.delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(self.delay) => {}
                _ = cancel.cancelled() => anyhow::bail!("agent task cancelled"),
            }
        }
        Ok(json!({ "success": true, "task": task.as_deref() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagekeeper_core_types::{TaskKind, UiTask};

    #[tokio::test]
    async fn local_sync_refuses_pushes_when_disconnected() {
        let sync = LocalDataSync::default();
        assert!(sync.push(&json!({"a": 1})).await.unwrap());
        sync.set_connected(false);
        assert!(!sync.push(&json!({"a": 2})).await.unwrap());
        assert_eq!(sync.pushed(), vec![json!({"a": 1})]);
    }

    #[tokio::test]
    async fn broadcast_reaches_other_tabs() {
        let sync = LocalDataSync::default();
        let mut tab = sync.tabs().subscribe();
        sync.broadcast("agent_update", &json!(7)).await.unwrap();
        let msg = tab.recv().await.unwrap();
        assert_eq!(msg.channel, "agent_update");
        assert_eq!(msg.record, json!(7));
    }

    #[tokio::test]
    async fn echo_runner_returns_task_payload() {
        let task = Arc::new(AutomationTask::new(TaskKind::UiDevelopment(UiTask::default())));
        let out = EchoTaskRunner::default()
            .run(Some(task), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out["success"], json!(true));
        assert_eq!(out["task"]["kind"]["type"], json!("ui-development"));
    }

    #[tokio::test(start_paused = true)]
    async fn echo_runner_honours_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let res = EchoTaskRunner::new(Duration::from_secs(5))
            .run(None, cancel)
            .await;
        assert!(res.is_err());
    }
}
