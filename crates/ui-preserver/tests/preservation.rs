use std::sync::Arc;
use std::time::Duration;

use pagekeeper_core_types::{ScrollPosition, Viewport};
use pagekeeper_page_port::{ElementSpec, InMemoryPage, PagePort, Selector};
use pagekeeper_preserver::{
    MutationPolicy, PreserveError, PreserverPolicy, UiPreserver, WarningKind, PROTECTED_ATTR,
    PROTECTED_CLASS,
};

fn setup(policy: PreserverPolicy) -> (Arc<InMemoryPage>, Arc<UiPreserver>) {
    let page =
        InMemoryPage::tax_portal_demo("https://portal.example.gov/index.html", Viewport::new(390, 844))
            .unwrap();
    let preserver = UiPreserver::new(page.clone(), policy).unwrap();
    (page, preserver)
}

fn node(page: &InMemoryPage, selector: &str) -> pagekeeper_page_port::NodeId {
    page.query_selector(&Selector::parse(selector).unwrap()).unwrap()
}

fn tagged_count(page: &InMemoryPage) -> usize {
    let marker = Selector::parse(&format!("[{PROTECTED_ATTR}]")).unwrap();
    page.query_selector_all(&marker).len()
}

async fn wait_until(check: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !check() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn end_preservation_restores_page_and_removes_every_tag() {
    let (page, preserver) = setup(PreserverPolicy::default());
    let body = page.root();
    let card = node(&page, ".card");
    let original_html = page.inner_html(card).unwrap();
    page.scroll_to(ScrollPosition::new(0.0, 240.0));

    assert!(preserver.start_preservation());
    assert!(!preserver.start_preservation());
    assert!(tagged_count(&page) > 0);
    assert!(page.class_list(card).contains(&PROTECTED_CLASS.to_string()));
    assert_eq!(page.overlays().len(), 1);

    page.set_inner_html(card, "").unwrap();
    page.scroll_to(ScrollPosition::new(0.0, 0.0));
    page.add_class(body, "agent-busy").unwrap();

    assert!(preserver.end_preservation());
    assert!(!preserver.end_preservation());

    assert_eq!(page.inner_html(card).unwrap(), original_html);
    assert_eq!(page.scroll_position(), ScrollPosition::new(0.0, 240.0));
    assert_eq!(page.class_list(body), vec!["page-dashboard".to_string()]);
    assert_eq!(page.class_list(card), vec!["card".to_string()]);
    assert_eq!(tagged_count(&page), 0);
    assert!(page.overlays().is_empty());

    let status = preserver.status();
    assert!(!status.active);
    assert_eq!(status.origin_entries, 0);
    assert_eq!(status.protected_selectors, 14);
}

#[tokio::test]
async fn long_inner_html_is_restored_truncated() {
    let (page, preserver) = setup(PreserverPolicy::default());
    let card = node(&page, ".card");
    page.set_inner_html(card, &"é".repeat(800)).unwrap();

    preserver.start_preservation();
    let capture = preserver.backups()[0]
        .elements
        .iter()
        .find(|c| c.selector.as_str() == ".card")
        .cloned()
        .unwrap();
    assert!(capture.inner_html_truncated);
    assert_eq!(capture.inner_html.chars().count(), 500);

    page.set_inner_html(card, "").unwrap();
    preserver.end_preservation();
    assert_eq!(page.inner_html(card).unwrap(), "é".repeat(500));
}

#[tokio::test]
async fn backup_history_is_bounded() {
    let (_page, preserver) = setup(PreserverPolicy::default());
    assert_eq!(preserver.save_current_state(), None);
    preserver.start_preservation();
    for _ in 0..6 {
        preserver.save_current_state();
    }
    let sequences: Vec<u64> = preserver.backups().iter().map(|b| b.sequence).collect();
    assert_eq!(sequences, vec![3, 4, 5, 6, 7]);
    preserver.end_preservation();
}

#[tokio::test]
async fn force_restore_requires_a_backup() {
    let (_page, preserver) = setup(PreserverPolicy::default());
    assert_eq!(preserver.force_restore(), Err(PreserveError::RestoreUnavailable));
}

#[tokio::test]
async fn log_only_policy_reports_without_healing() {
    let (page, preserver) = setup(PreserverPolicy::default());
    preserver.start_preservation();

    let btn = node(&page, ".btn");
    page.remove_node(btn).unwrap();
    let card = node(&page, ".card");
    page.set_attribute(card, "class", "card card--broken").unwrap();

    wait_until(|| preserver.recent_warnings().len() >= 2).await;
    let warnings = preserver.recent_warnings();
    assert!(matches!(
        &warnings[0].kind,
        WarningKind::ProtectedRemoved { selector } if selector == ".btn"
    ));
    assert_eq!(
        warnings[1].kind,
        WarningKind::ProtectedModified {
            attribute: "class".into()
        }
    );
    assert_eq!(page.get_attribute(card, "class").as_deref(), Some("card card--broken"));
    preserver.end_preservation();
}

#[tokio::test]
async fn auto_restore_policy_puts_tagged_class_back() {
    let policy = PreserverPolicy {
        mutation_policy: MutationPolicy::AutoRestore,
        ..PreserverPolicy::default()
    };
    let (page, preserver) = setup(policy);
    preserver.start_preservation();

    let card = node(&page, ".card");
    page.set_attribute(card, "class", "broken").unwrap();
    wait_until(|| page.get_attribute(card, "class").as_deref() == Some("card agent-protected")).await;
    assert_eq!(preserver.recent_warnings().len(), 1);

    preserver.end_preservation();
    assert_eq!(page.get_attribute(card, "class").as_deref(), Some("card"));
}

#[tokio::test]
async fn removed_capture_is_not_replayed_onto_a_sibling_match() {
    let (page, preserver) = setup(PreserverPolicy::default());
    let content = node(&page, ".content");
    let plan = page
        .append_element(
            content,
            ElementSpec::new("div")
                .class("card")
                .id("payment-plan")
                .html("<h2>Payment plan</h2>"),
        )
        .unwrap();
    preserver.start_preservation();

    let refund = node(&page, "#refund-status");
    page.remove_node(refund).unwrap();
    preserver.end_preservation();

    assert_eq!(page.get_attribute(plan, "id").as_deref(), Some("payment-plan"));
    assert_eq!(page.inner_html(plan).as_deref(), Some("<h2>Payment plan</h2>"));
    assert!(page
        .query_selector(&Selector::parse("#refund-status").unwrap())
        .is_none());
}

#[tokio::test]
async fn restore_follows_the_captured_element_after_its_class_changes() {
    let (page, preserver) = setup(PreserverPolicy::default());
    preserver.start_preservation();

    let card = node(&page, ".card");
    page.set_attribute(card, "class", "broken").unwrap();
    page.set_inner_html(card, "").unwrap();
    preserver.end_preservation();

    assert_eq!(page.class_list(card), vec!["card".to_string()]);
    assert!(page.inner_html(card).unwrap().contains("Refund status"));
}

#[tokio::test]
async fn registry_changes_apply_on_next_session() {
    let (page, preserver) = setup(PreserverPolicy::default());
    assert!(preserver.add_protected_element("#return-form").unwrap());
    assert!(!preserver.add_protected_element("#return-form").unwrap());
    assert!(matches!(
        preserver.add_protected_element("main .card"),
        Err(PreserveError::InvalidSelector(_))
    ));
    assert!(preserver.remove_protected_element(".btn"));
    assert!(!preserver.remove_protected_element(".btn"));

    preserver.start_preservation();
    let btn = node(&page, "button");
    assert!(page.get_attribute(btn, PROTECTED_ATTR).is_none());
    assert_eq!(preserver.status().protected_selectors, 14);
    preserver.end_preservation();
}

#[test]
fn start_outside_runtime_still_tags() {
    let (page, preserver) = setup(PreserverPolicy::default());
    assert!(preserver.start_preservation());
    assert!(tagged_count(&page) > 0);
    assert!(preserver.end_preservation());
    assert_eq!(tagged_count(&page), 0);
}
