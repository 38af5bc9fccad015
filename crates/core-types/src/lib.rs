use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Inner size of the page's visual viewport in CSS pixels.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Viewport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrollPosition {
    pub x: f64,
    pub y: f64,
}

impl ScrollPosition {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A unit of automated work submitted to the orchestrator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AutomationTask {
    pub id: TaskId,
    pub kind: TaskKind,
    #[serde(default)]
    pub label: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

impl AutomationTask {
    pub fn new(kind: TaskKind) -> Self {
        Self {
            id: TaskId::new(),
            kind,
            label: None,
            submitted_at: Utc::now(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Closed set of task kinds. Each kind carries its own payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TaskKind {
    UiDevelopment(UiTask),
    MobileDevelopment(MobileTask),
    SyncOperation(SyncTask),
    PwaMaintenance(PwaTask),
    General(GeneralTask),
}

impl TaskKind {
    pub fn label(&self) -> &'static str {
        match self {
            TaskKind::UiDevelopment(_) => "ui-development",
            TaskKind::MobileDevelopment(_) => "mobile-development",
            TaskKind::SyncOperation(_) => "sync-operation",
            TaskKind::PwaMaintenance(_) => "pwa-maintenance",
            TaskKind::General(_) => "general",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UiTask {
    #[serde(default)]
    pub instructions: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MobileTask {
    pub target_width: u32,
}

impl Default for MobileTask {
    fn default() -> Self {
        Self { target_width: 375 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncTask {
    pub channel: String,
    #[serde(default)]
    pub record: serde_json::Value,
}

impl Default for SyncTask {
    fn default() -> Self {
        Self {
            channel: "agent_update".to_string(),
            record: serde_json::Value::Null,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PwaTask {
    pub refresh_cache: bool,
}

impl Default for PwaTask {
    fn default() -> Self {
        Self {
            refresh_cache: true,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneralTask {
    #[serde(default)]
    pub description: String,
}
