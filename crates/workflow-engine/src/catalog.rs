//! Built-in workflows for the tax portal front end.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{ensure, Context};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use pagekeeper_core_types::{AutomationTask, TaskKind, Viewport};
use pagekeeper_layout::LayoutController;
use pagekeeper_page_port::{PagePort, Selector};

use crate::collaborators::{AgentTaskRunner, CacheProvider, DataSync};
use crate::engine::WorkflowEngine;
use crate::policy::WorkflowPolicy;
use crate::types::{Step, StepAction, StepInput, WorkflowDefinition};

pub const UI_LAYOUT_PRESERVATION: &str = "ui-layout-preservation";
pub const MOBILE_FIRST_DEVELOPMENT: &str = "mobile-first-development";
pub const CROSS_DEVICE_SYNC: &str = "cross-device-sync";
pub const PWA_MAINTENANCE: &str = "pwa-maintenance";

const CRITICAL_SELECTORS: [&str; 5] = ["body", "main", ".container", ".btn", ".card"];
const MOBILE_SELECTORS: [&str; 3] = [".mobile-nav", ".mobile-menu", ".mobile-header"];
const RESPONSIVE_BREAKPOINTS: [u32; 4] = [375, 768, 1024, 1440];
const DEFAULT_MOBILE_WIDTH: u32 = 375;
const DEFAULT_SYNC_CHANNEL: &str = "agent_update";

/// Wires the four default workflows to their collaborators.
#[derive(Clone)]
pub struct DefaultCatalog {
    page: Arc<dyn PagePort>,
    layout: Arc<LayoutController>,
    sync: Arc<dyn DataSync>,
    cache: Arc<dyn CacheProvider>,
    runner: Arc<dyn AgentTaskRunner>,
    strict_integrity: bool,
}

impl DefaultCatalog {
    pub fn new(
        page: Arc<dyn PagePort>,
        layout: Arc<LayoutController>,
        sync: Arc<dyn DataSync>,
        cache: Arc<dyn CacheProvider>,
        runner: Arc<dyn AgentTaskRunner>,
        policy: &WorkflowPolicy,
    ) -> Self {
        Self {
            page,
            layout,
            sync,
            cache,
            runner,
            strict_integrity: policy.strict_integrity,
        }
    }

    /// Adds every default workflow to `engine`.
    pub fn register(&self, engine: &dyn WorkflowEngine) {
        engine.add_workflow(UI_LAYOUT_PRESERVATION, self.ui_layout_preservation());
        engine.add_workflow(MOBILE_FIRST_DEVELOPMENT, self.mobile_first_development());
        engine.add_workflow(CROSS_DEVICE_SYNC, self.cross_device_sync());
        engine.add_workflow(PWA_MAINTENANCE, self.pwa_maintenance());
        info!("default workflows registered");
    }

    pub fn ui_layout_preservation(&self) -> WorkflowDefinition {
        let layout = Arc::clone(&self.layout);
        let detect = StepAction::from_fn(move |_| {
            Ok(serde_json::to_value(layout.detect_current_layout())?)
        });

        let layout = Arc::clone(&self.layout);
        let backup = StepAction::from_fn(move |_| {
            let backup = layout.backup_current_state();
            Ok(json!({ "sequence": backup.sequence }))
        });

        let layout = Arc::clone(&self.layout);
        let enable = StepAction::from_fn(move |_| Ok(json!(layout.enable_agent_mode())));

        let runner = Arc::clone(&self.runner);
        let execute = StepAction::from_async(move |input: StepInput| {
            let runner = Arc::clone(&runner);
            async move { runner.run(input.task, input.cancel).await }
        });

        let page = Arc::clone(&self.page);
        let strict = self.strict_integrity;
        let validate = StepAction::from_fn(move |_| validate_layout_integrity(page.as_ref(), strict));

        let layout = Arc::clone(&self.layout);
        let restore = StepAction::from_fn(move |_| {
            layout.restore_state()?;
            Ok(json!(true))
        });

        let layout = Arc::clone(&self.layout);
        let disable = StepAction::from_fn(move |_| Ok(json!(layout.disable_agent_mode())));

        WorkflowDefinition::new(
            "UI Layout Preservation",
            "Run an agent task with the layout backed up, frozen and restored",
        )
        .step(Step::new("detect_current_layout", detect).with_timeout_ms(1_000))
        .step(Step::new("backup_ui_state", backup).with_timeout_ms(2_000))
        .step(Step::new("enable_agent_mode", enable).with_timeout_ms(1_000))
        .step(Step::new("execute_agent_task", execute).with_timeout_ms(30_000))
        .step(Step::new("validate_layout_integrity", validate).with_timeout_ms(2_000))
        .step(Step::new("restore_ui_state", restore).with_timeout_ms(2_000))
        .step(Step::new("disable_agent_mode", disable).with_timeout_ms(1_000))
    }

    pub fn mobile_first_development(&self) -> WorkflowDefinition {
        let page = Arc::clone(&self.page);
        let set_viewport = StepAction::from_fn(move |input: StepInput| {
            let width = mobile_width(input.task.as_deref());
            let meta = format!("width={width}, initial-scale=1.0");
            let written = page.set_viewport_meta(&meta);
            Ok(json!({ "width": width, "meta_written": written }))
        });

        let page = Arc::clone(&self.page);
        let theme = StepAction::from_fn(move |_| {
            page.add_class(page.root(), "theme-mobile")?;
            Ok(json!(true))
        });

        let page = Arc::clone(&self.page);
        let breakpoints = StepAction::from_fn(move |_| test_responsive_breakpoints(page.as_ref()));

        let page = Arc::clone(&self.page);
        let validate = StepAction::from_fn(move |_| {
            let found = any_present(page.as_ref(), &MOBILE_SELECTORS)?;
            info!(found, "mobile UI validation");
            Ok(json!(found))
        });

        WorkflowDefinition::new(
            "Mobile-First Development",
            "Switch to the mobile viewport and theme and probe responsive breakpoints",
        )
        .step(Step::new("set_mobile_viewport", set_viewport).with_timeout_ms(1_000))
        .step(Step::new("apply_mobile_theme", theme).with_timeout_ms(1_000))
        .step(Step::new("test_responsive_breakpoints", breakpoints).with_timeout_ms(3_000))
        .step(Step::new("validate_mobile_ui", validate).with_timeout_ms(2_000))
    }

    pub fn cross_device_sync(&self) -> WorkflowDefinition {
        let sync = Arc::clone(&self.sync);
        let check = StepAction::from_async(move |_| {
            let sync = Arc::clone(&sync);
            async move {
                ensure!(sync.is_connected().await, "sync backend not connected");
                Ok(json!(true))
            }
        });

        let page = Arc::clone(&self.page);
        let backup_storage = StepAction::from_fn(move |_| {
            let storage = page.local_storage();
            info!(keys = storage.len(), "local storage backed up");
            Ok(serde_json::to_value(storage)?)
        });

        let sync = Arc::clone(&self.sync);
        let push = StepAction::from_async(move |input: StepInput| {
            let sync = Arc::clone(&sync);
            async move {
                let (_, record) = sync_payload(input.task.as_deref())?;
                ensure!(sync.push(&record).await?, "sync backend refused the record");
                Ok(json!(true))
            }
        });

        let sync = Arc::clone(&self.sync);
        let broadcast = StepAction::from_async(move |input: StepInput| {
            let sync = Arc::clone(&sync);
            async move {
                let (channel, record) = sync_payload(input.task.as_deref())?;
                ensure!(
                    sync.broadcast(&channel, &record).await?,
                    "broadcast to other tabs unavailable"
                );
                Ok(json!({ "channel": channel }))
            }
        });

        let sync = Arc::clone(&self.sync);
        let verify = StepAction::from_async(move |_| {
            let sync = Arc::clone(&sync);
            async move {
                ensure!(sync.is_connected().await, "sync backend dropped during sync");
                Ok(json!(true))
            }
        });

        WorkflowDefinition::new(
            "Cross-Device Sync",
            "Push a record to the sync backend and fan it out to other tabs",
        )
        .step(Step::new("check_sync_connection", check).with_timeout_ms(5_000))
        .step(Step::new("backup_local_storage", backup_storage).with_timeout_ms(1_000))
        .step(Step::new("sync_record", push).with_timeout_ms(10_000))
        .step(Step::new("broadcast_to_other_tabs", broadcast).with_timeout_ms(1_000))
        .step(Step::new("verify_sync_success", verify).with_timeout_ms(2_000))
    }

    pub fn pwa_maintenance(&self) -> WorkflowDefinition {
        let cache = Arc::clone(&self.cache);
        let worker = StepAction::from_async(move |_| {
            let cache = Arc::clone(&cache);
            async move {
                ensure!(cache.has_active_worker().await, "service worker not active");
                Ok(json!(true))
            }
        });

        let cache = Arc::clone(&self.cache);
        let page = Arc::clone(&self.page);
        let manifest = StepAction::from_async(move |_| {
            let cache = Arc::clone(&cache);
            let page = Arc::clone(&page);
            async move {
                let linked = any_present(page.as_ref(), &["link[rel=\"manifest\"]"])?;
                ensure!(
                    linked || cache.has_manifest().await,
                    "web app manifest not found"
                );
                Ok(json!({ "linked": linked }))
            }
        });

        let cache = Arc::clone(&self.cache);
        let offline = StepAction::from_async(move |_| {
            let cache = Arc::clone(&cache);
            async move {
                ensure!(cache.test_offline().await, "offline check failed");
                Ok(json!(true))
            }
        });

        let cache = Arc::clone(&self.cache);
        let update = StepAction::from_async(move |input| {
            let cache = Arc::clone(&cache);
            async move {
                if !refresh_requested(input.task.as_deref()) {
                    debug!("cache refresh not requested by task");
                    return Ok(json!({ "skipped": true }));
                }
                ensure!(cache.refresh_cache().await?, "cache refresh rejected");
                Ok(json!(true))
            }
        });

        WorkflowDefinition::new(
            "PWA Maintenance",
            "Check the service worker, manifest and offline cache, then refresh it",
        )
        .step(Step::new("check_service_worker", worker).with_timeout_ms(2_000))
        .step(Step::new("validate_manifest", manifest).with_timeout_ms(1_000))
        .step(Step::new("test_offline_functionality", offline).with_timeout_ms(3_000))
        .step(Step::new("update_cache", update).with_timeout_ms(5_000))
    }
}

fn parse_all(selectors: &[&str]) -> anyhow::Result<Vec<Selector>> {
    selectors
        .iter()
        .map(|raw| Selector::parse(raw).with_context(|| format!("bad selector {raw}")))
        .collect()
}

fn any_present(page: &dyn PagePort, selectors: &[&str]) -> anyhow::Result<bool> {
    Ok(parse_all(selectors)?
        .iter()
        .any(|selector| page.query_selector(selector).is_some()))
}

fn validate_layout_integrity(page: &dyn PagePort, strict: bool) -> anyhow::Result<Value> {
    let missing: Vec<String> = parse_all(&CRITICAL_SELECTORS)?
        .into_iter()
        .filter(|selector| page.query_selector(selector).is_none())
        .map(|selector| selector.to_string())
        .collect();
    if missing.is_empty() {
        info!("layout integrity validated");
    } else {
        warn!(?missing, "missing critical elements");
        ensure!(!strict, "missing critical elements: {}", missing.join(", "));
    }
    Ok(json!({ "valid": missing.is_empty(), "missing": missing }))
}

/// Emulates each breakpoint width and checks `.container` fits inside it.
fn test_responsive_breakpoints(page: &dyn PagePort) -> anyhow::Result<Value> {
    let container = Selector::parse(".container")?;
    let original = page.viewport();
    let mut results = BTreeMap::new();
    for width in RESPONSIVE_BREAKPOINTS {
        page.emulate_viewport(Viewport::new(width, original.height));
        let fits = page
            .query_selector(&container)
            .and_then(|node| page.computed_style(node, "width"))
            .and_then(|raw| parse_px(&raw))
            .is_some_and(|px| px <= f64::from(width));
        results.insert(width.to_string(), fits);
    }
    page.emulate_viewport(original);
    info!(?results, "responsive breakpoint results");
    Ok(serde_json::to_value(results)?)
}

fn parse_px(raw: &str) -> Option<f64> {
    raw.trim().trim_end_matches("px").trim().parse().ok()
}

fn mobile_width(task: Option<&AutomationTask>) -> u32 {
    match task.map(|t| &t.kind) {
        Some(TaskKind::MobileDevelopment(mobile)) => mobile.target_width,
        _ => DEFAULT_MOBILE_WIDTH,
    }
}

/// Only a PWA task can opt out of the cache refresh.
fn refresh_requested(task: Option<&AutomationTask>) -> bool {
    match task.map(|t| &t.kind) {
        Some(TaskKind::PwaMaintenance(pwa)) => pwa.refresh_cache,
        _ => true,
    }
}

/// Channel and record to sync. Non-sync tasks are synced whole.
fn sync_payload(task: Option<&AutomationTask>) -> anyhow::Result<(String, Value)> {
    match task {
        Some(AutomationTask {
            kind: TaskKind::SyncOperation(sync),
            ..
        }) => Ok((sync.channel.clone(), sync.record.clone())),
        Some(other) => Ok((DEFAULT_SYNC_CHANNEL.to_string(), serde_json::to_value(other)?)),
        None => Ok((DEFAULT_SYNC_CHANNEL.to_string(), Value::Null)),
    }
}
