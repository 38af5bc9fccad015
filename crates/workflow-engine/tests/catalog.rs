use std::sync::Arc;

use serde_json::json;

use pagekeeper_core_types::{
    AutomationTask, MobileTask, PwaTask, SyncTask, TaskKind, UiTask, Viewport,
};
use pagekeeper_layout::{LayoutController, LayoutPolicy};
use pagekeeper_page_port::{InMemoryPage, PagePort};
use pagekeeper_workflow::{
    DefaultCatalog, DefaultWorkflowEngine, EchoTaskRunner, LocalDataSync, StaticCacheProvider,
    WorkflowEngine, WorkflowError, WorkflowPolicy, CROSS_DEVICE_SYNC, MOBILE_FIRST_DEVELOPMENT,
    PWA_MAINTENANCE, UI_LAYOUT_PRESERVATION,
};

struct Fixture {
    page: Arc<InMemoryPage>,
    layout: Arc<LayoutController>,
    sync: Arc<LocalDataSync>,
    cache: Arc<StaticCacheProvider>,
    engine: DefaultWorkflowEngine,
}

fn fixture(cache: StaticCacheProvider) -> Fixture {
    let page = InMemoryPage::tax_portal_demo(
        "https://portal.example.gov/index.html",
        Viewport::new(390, 844),
    )
    .unwrap();
    let layout = Arc::new(LayoutController::new(page.clone(), LayoutPolicy::default()));
    let sync = Arc::new(LocalDataSync::default());
    let cache = Arc::new(cache);
    let policy = WorkflowPolicy::default();
    let engine = DefaultWorkflowEngine::new(policy.clone());
    DefaultCatalog::new(
        page.clone(),
        layout.clone(),
        sync.clone(),
        cache.clone(),
        Arc::new(EchoTaskRunner::default()),
        &policy,
    )
    .register(&engine);
    Fixture {
        page,
        layout,
        sync,
        cache,
        engine,
    }
}

fn task(kind: TaskKind) -> Option<Arc<AutomationTask>> {
    Some(Arc::new(AutomationTask::new(kind)))
}

#[tokio::test]
async fn registers_the_four_default_workflows() {
    let fx = fixture(StaticCacheProvider::healthy());
    assert_eq!(
        fx.engine.status().workflows,
        vec![
            UI_LAYOUT_PRESERVATION,
            MOBILE_FIRST_DEVELOPMENT,
            CROSS_DEVICE_SYNC,
            PWA_MAINTENANCE
        ]
    );
    let info = fx.engine.definition(UI_LAYOUT_PRESERVATION).unwrap();
    assert_eq!(info.steps.len(), 7);
    assert_eq!(info.steps[3].timeout_ms, 30_000);
}

#[tokio::test]
async fn ui_layout_preservation_runs_every_step_and_leaves_page_clean() {
    let fx = fixture(StaticCacheProvider::healthy());
    let body = fx.page.root();
    let classes_before = fx.page.class_list(body);

    let report = fx
        .engine
        .start_workflow(
            UI_LAYOUT_PRESERVATION,
            task(TaskKind::UiDevelopment(UiTask {
                instructions: "tidy the refund card".into(),
            })),
        )
        .await
        .unwrap();

    assert_eq!(
        report.step_names(),
        vec![
            "detect_current_layout",
            "backup_ui_state",
            "enable_agent_mode",
            "execute_agent_task",
            "validate_layout_integrity",
            "restore_ui_state",
            "disable_agent_mode",
        ]
    );
    assert!(report.steps.iter().all(|s| s.success));
    assert_eq!(report.steps[0].output["category"], json!("user-interface"));
    assert_eq!(report.steps[3].output["success"], json!(true));
    assert_eq!(report.steps[4].output["valid"], json!(true));

    assert!(!fx.layout.is_agent_mode());
    assert!(fx.page.overlays().is_empty());
    assert_eq!(fx.page.class_list(body), classes_before);
    let style = fx.page.get_attribute(body, "style").unwrap_or_default();
    assert!(style.contains("pointer-events: auto"));
}

#[tokio::test]
async fn mobile_workflow_uses_task_width_and_restores_viewport() {
    let fx = fixture(StaticCacheProvider::healthy());
    let report = fx
        .engine
        .start_workflow(
            MOBILE_FIRST_DEVELOPMENT,
            task(TaskKind::MobileDevelopment(MobileTask { target_width: 414 })),
        )
        .await
        .unwrap();

    assert_eq!(
        fx.page.viewport_meta().as_deref(),
        Some("width=414, initial-scale=1.0")
    );
    assert!(fx.page.class_list(fx.page.root()).contains(&"theme-mobile".to_string()));
    assert_eq!(fx.page.viewport(), Viewport::new(390, 844));

    let breakpoints = &report.steps[2].output;
    for width in ["375", "768", "1024", "1440"] {
        assert_eq!(breakpoints[width], json!(true), "breakpoint {width}");
    }
    assert_eq!(report.steps[3].output, json!(true));
}

#[tokio::test]
async fn sync_pushes_and_broadcasts_task_record() {
    let fx = fixture(StaticCacheProvider::healthy());
    let mut other_tab = fx.sync.tabs().subscribe();
    let report = fx
        .engine
        .start_workflow(
            CROSS_DEVICE_SYNC,
            task(TaskKind::SyncOperation(SyncTask {
                channel: "returns".into(),
                record: json!({ "draft": 3 }),
            })),
        )
        .await
        .unwrap();

    assert_eq!(report.steps.len(), 5);
    assert_eq!(report.steps[1].output["session.lang"], json!("en"));
    assert_eq!(fx.sync.pushed(), vec![json!({ "draft": 3 })]);
    let msg = other_tab.recv().await.unwrap();
    assert_eq!(msg.channel, "returns");
    assert_eq!(msg.record, json!({ "draft": 3 }));
}

#[tokio::test]
async fn sync_fails_fast_when_disconnected() {
    let fx = fixture(StaticCacheProvider::healthy());
    fx.sync.set_connected(false);
    let err = fx
        .engine
        .start_workflow(CROSS_DEVICE_SYNC, None)
        .await
        .unwrap_err();
    assert_eq!(err.step(), Some("check_sync_connection"));
    assert!(fx.sync.pushed().is_empty());
    assert!(!fx.engine.status().running);
}

#[tokio::test]
async fn pwa_accepts_linked_manifest_and_refreshes_cache() {
    let fx = fixture(StaticCacheProvider::new(true, false, true, true));
    let report = fx.engine.start_workflow(PWA_MAINTENANCE, None).await.unwrap();
    assert_eq!(report.steps[1].output["linked"], json!(true));
    assert_eq!(fx.cache.refreshes(), 1);
}

#[tokio::test]
async fn pwa_task_can_skip_cache_refresh() {
    let fx = fixture(StaticCacheProvider::healthy());
    let report = fx
        .engine
        .start_workflow(
            PWA_MAINTENANCE,
            task(TaskKind::PwaMaintenance(PwaTask {
                refresh_cache: false,
            })),
        )
        .await
        .unwrap();
    assert!(report.success);
    assert_eq!(report.steps[3].output, json!({ "skipped": true }));
    assert_eq!(fx.cache.refreshes(), 0);

    fx.engine
        .start_workflow(PWA_MAINTENANCE, task(TaskKind::PwaMaintenance(PwaTask::default())))
        .await
        .unwrap();
    assert_eq!(fx.cache.refreshes(), 1);
}

#[tokio::test]
async fn pwa_stops_when_service_worker_is_missing() {
    let fx = fixture(StaticCacheProvider::new(false, true, true, true));
    let err = fx.engine.start_workflow(PWA_MAINTENANCE, None).await.unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::StepFailed { ref step, .. } if step == "check_service_worker"
    ));
    assert_eq!(fx.cache.refreshes(), 0);
}
