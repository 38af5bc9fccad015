use std::sync::Arc;

use pagekeeper_core_types::{ScrollPosition, Viewport};
use pagekeeper_layout::{LayoutController, LayoutError, LayoutPolicy, PageCategory, ViewportClass};
use pagekeeper_page_port::{InMemoryPage, PagePort, Selector};

fn controller(path: &str, viewport: Viewport) -> (Arc<InMemoryPage>, LayoutController) {
    let url = format!("https://portal.example.gov{path}");
    let page = InMemoryPage::tax_portal_demo(&url, viewport).unwrap();
    let ctrl = LayoutController::new(page.clone(), LayoutPolicy::default());
    (page, ctrl)
}

#[test]
fn detects_user_interface_on_index_at_tablet_width() {
    let (_page, ctrl) = controller("/index.html", Viewport::new(800, 600));
    let snapshot = ctrl.detect_current_layout();
    assert_eq!(snapshot.category, PageCategory::UserInterface);
    assert_eq!(snapshot.preset.mode, Some(ViewportClass::Tablet));
    assert_eq!(snapshot.preset.theme, "user");
    // The preset table itself stays unrefined.
    assert_eq!(ctrl.presets()[2].mode, None);
    assert_eq!(ctrl.presets()[2].category, snapshot.category);
    assert!(ctrl.current_preset().is_none());
}

#[test]
fn apply_layout_swaps_theme_and_loads_css_once() {
    let (page, ctrl) = controller("/admin/reports", Viewport::new(1300, 900));
    let body = page.root();
    page.add_class(body, "theme-mobile").unwrap();

    let preset = ctrl.detect_current_layout().preset;
    ctrl.apply_layout(&preset).unwrap();
    ctrl.apply_layout(&preset).unwrap();

    let classes = page.class_list(body);
    assert!(classes.contains(&"theme-admin".to_string()));
    assert!(!classes.contains(&"theme-mobile".to_string()));
    assert!(classes.contains(&"page-dashboard".to_string()));
    assert_eq!(page.stylesheet_links_matching("admin-theme.css"), 1);
    assert_eq!(page.viewport_meta().as_deref(), Some("width=1200, initial-scale=1.0"));
    assert_eq!(ctrl.layout_info().current, Some(preset));
}

#[test]
fn agent_mode_round_trip_restores_scroll_and_classes() {
    let (page, ctrl) = controller("/index.html", Viewport::new(390, 844));
    let body = page.root();
    page.scroll_to(ScrollPosition::new(0.0, 320.0));
    let before = page.class_list(body);

    assert!(ctrl.enable_agent_mode());
    assert!(!ctrl.enable_agent_mode());
    assert_eq!(page.overlays().len(), 1);
    let style = page.get_attribute(body, "style").unwrap();
    assert!(style.contains("pointer-events: none;"));

    page.scroll_to(ScrollPosition::new(0.0, 0.0));
    page.add_class(body, "agent-scratch").unwrap();

    assert!(ctrl.disable_agent_mode());
    assert_eq!(page.scroll_position(), ScrollPosition::new(0.0, 320.0));
    assert_eq!(page.class_list(body), before);
    assert!(page.overlays().is_empty());
    assert!(page.get_attribute(body, "style").unwrap().contains("user-select: auto;"));
    assert!(!ctrl.disable_agent_mode());
}

#[test]
fn resize_is_ignored_in_agent_mode() {
    let (page, ctrl) = controller("/login.html", Viewport::new(375, 667));
    ctrl.enable_agent_mode();
    page.emulate_viewport(Viewport::new(1280, 800));
    assert!(ctrl.handle_resize().is_none());
    ctrl.disable_agent_mode();
    let snapshot = ctrl.handle_resize().unwrap();
    assert_eq!(snapshot.preset.mode, Some(ViewportClass::Desktop));
    assert_eq!(snapshot.category, PageCategory::MobileFirst);
}

#[test]
fn backups_are_bounded_with_increasing_sequence() {
    let (_page, ctrl) = controller("/index.html", Viewport::new(390, 844));
    assert_eq!(ctrl.restore_state(), Err(LayoutError::RestoreUnavailable));
    for _ in 0..7 {
        ctrl.backup_current_state();
    }
    let backups = ctrl.backups();
    assert_eq!(backups.len(), 5);
    let sequences: Vec<u64> = backups.iter().map(|b| b.sequence).collect();
    assert_eq!(sequences, vec![3, 4, 5, 6, 7]);

    let latest = backups.last().unwrap();
    assert!(latest.components.iter().any(|c| c.tag == "button"));
    assert!(latest.stylesheets.iter().any(|s| s.key() == "inline-1"));
    assert!(ctrl.restore_state().is_ok());
}

#[test]
fn component_text_is_truncated() {
    let (page, ctrl) = controller("/index.html", Viewport::new(390, 844));
    let card = page.query_selector(&Selector::parse(".card").unwrap()).unwrap();
    page.set_inner_html(card, &"x".repeat(300)).unwrap();
    let backup = ctrl.backup_current_state();
    let digest = backup
        .components
        .iter()
        .find(|c| c.id.as_deref() == Some("refund-status"))
        .unwrap();
    assert_eq!(digest.text.chars().count(), 100);
}
