use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use pagekeeper_page_port::{MutationRecord, NodeId, PagePort, Selector};

use crate::errors::PreserveError;
use crate::history::BackupRing;
use crate::model::{
    ElementCapture, OriginContent, PreserveWarning, PreserverStatus, StyleCapture, UiBackup,
    WarningKind, ORIGINAL_CONTENT_ATTR, PROTECTED_ATTR, PROTECTED_CLASS,
};
use crate::policy::{MutationPolicy, PreserverPolicy};
use crate::watch::{classify, spawn_watcher};

pub type PreserveResult<T> = Result<T, PreserveError>;

struct PreserverState {
    active: bool,
    registry: Vec<Selector>,
    origins: HashMap<NodeId, OriginContent>,
    backups: BackupRing,
    warnings: VecDeque<PreserveWarning>,
    watcher: Option<JoinHandle<()>>,
}

/// Captures restorable UI state and guards protected elements while an agent
/// works on the page.
pub struct UiPreserver {
    page: Arc<dyn PagePort>,
    policy: PreserverPolicy,
    state: Mutex<PreserverState>,
}

impl UiPreserver {
    pub fn new(page: Arc<dyn PagePort>, policy: PreserverPolicy) -> PreserveResult<Arc<Self>> {
        let mut registry: Vec<Selector> = Vec::with_capacity(policy.protected_selectors.len());
        for raw in &policy.protected_selectors {
            let selector = Selector::parse(raw)?;
            if !registry.contains(&selector) {
                registry.push(selector);
            }
        }
        let backups = BackupRing::new(policy.max_backups);
        Ok(Arc::new(Self {
            page,
            policy,
            state: Mutex::new(PreserverState {
                active: false,
                registry,
                origins: HashMap::new(),
                backups,
                warnings: VecDeque::new(),
                watcher: None,
            }),
        }))
    }

    pub fn policy(&self) -> &PreserverPolicy {
        &self.policy
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    /// Returns false when preservation was already active.
    pub fn start_preservation(self: &Arc<Self>) -> bool {
        let registry = {
            let mut state = self.state.lock();
            if state.active {
                debug!("preservation already active");
                return false;
            }
            state.active = true;
            state.registry.clone()
        };

        let backup = self.capture(&registry);
        let sequence = self.state.lock().backups.push(backup).sequence;
        let origins = self.tag_protected(&registry);
        let tagged = origins.len();
        self.page.show_overlay(self.policy.indicator.clone());

        let records = self.page.subscribe_mutations();
        let watcher = spawn_watcher(Arc::downgrade(self), records);
        {
            let mut state = self.state.lock();
            state.origins = origins;
            state.watcher = watcher;
        }
        info!(sequence, tagged, "UI preservation active");
        true
    }

    /// Returns false when preservation was not active.
    pub fn end_preservation(&self) -> bool {
        let watcher = {
            let mut state = self.state.lock();
            if !state.active {
                return false;
            }
            state.active = false;
            state.watcher.take()
        };
        if let Some(watcher) = watcher {
            watcher.abort();
        }

        match self.force_restore() {
            Ok(()) => {}
            Err(PreserveError::RestoreUnavailable) => warn!("no UI backup to restore"),
            Err(err) => error!(error = %err, "UI restore failed"),
        }
        self.untag_all();
        self.state.lock().origins.clear();
        self.page.remove_overlay(&self.policy.indicator.id);
        info!("UI preservation ended");
        true
    }

    /// Replays the newest backup onto the page.
    pub fn force_restore(&self) -> PreserveResult<()> {
        let backup = self
            .state
            .lock()
            .backups
            .latest()
            .ok_or(PreserveError::RestoreUnavailable)?;
        self.apply_backup(&backup)?;
        debug!(sequence = backup.sequence, "UI restored from backup");
        Ok(())
    }

    /// Takes an extra backup while active. Returns its sequence number.
    pub fn save_current_state(&self) -> Option<u64> {
        let registry = {
            let state = self.state.lock();
            if !state.active {
                return None;
            }
            state.registry.clone()
        };
        let backup = self.capture(&registry);
        Some(self.state.lock().backups.push(backup).sequence)
    }

    /// Registers `selector`; applies from the next preservation session.
    pub fn add_protected_element(&self, selector: &str) -> PreserveResult<bool> {
        let selector = Selector::parse(selector)?;
        let mut state = self.state.lock();
        if state.registry.contains(&selector) {
            return Ok(false);
        }
        state.registry.push(selector);
        Ok(true)
    }

    pub fn remove_protected_element(&self, selector: &str) -> bool {
        let Ok(selector) = Selector::parse(selector) else {
            return false;
        };
        let mut state = self.state.lock();
        let before = state.registry.len();
        state.registry.retain(|existing| existing != &selector);
        state.registry.len() != before
    }

    pub fn protected_selectors(&self) -> Vec<Selector> {
        self.state.lock().registry.clone()
    }

    pub fn status(&self) -> PreserverStatus {
        let state = self.state.lock();
        PreserverStatus {
            active: state.active,
            protected_selectors: state.registry.len(),
            backups: state.backups.len(),
            origin_entries: state.origins.len(),
        }
    }

    pub fn backups(&self) -> Vec<Arc<UiBackup>> {
        self.state.lock().backups.snapshot()
    }

    pub fn recent_warnings(&self) -> Vec<PreserveWarning> {
        self.state.lock().warnings.iter().cloned().collect()
    }

    pub(crate) fn handle_mutation(&self, record: &MutationRecord) {
        let root = self.page.root();
        let warning = {
            let state = self.state.lock();
            if !state.active {
                return;
            }
            match classify(
                record,
                &state.registry,
                &state.origins,
                root,
                &self.policy.root_managed_attributes,
            ) {
                Some(warning) => warning,
                None => return,
            }
        };
        match &warning.kind {
            WarningKind::ProtectedRemoved { selector } => {
                warn!(node = %warning.node, tag = %warning.tag, %selector, "protected element removed");
            }
            WarningKind::ProtectedModified { attribute } => {
                warn!(node = %warning.node, tag = %warning.tag, %attribute, "protected element modified");
            }
        }
        {
            let mut state = self.state.lock();
            state.warnings.push_back(warning.clone());
            while state.warnings.len() > self.policy.max_warnings.max(1) {
                state.warnings.pop_front();
            }
        }
        if self.policy.mutation_policy == MutationPolicy::AutoRestore {
            self.heal(&warning);
        }
    }

    fn heal(&self, warning: &PreserveWarning) {
        let result = match &warning.kind {
            WarningKind::ProtectedRemoved { .. } => self.force_restore(),
            WarningKind::ProtectedModified { attribute } => {
                let expected = self
                    .state
                    .lock()
                    .origins
                    .get(&warning.node)
                    .map(|origin| origin.expected(attribute));
                match expected {
                    Some(Some(value)) => self
                        .page
                        .set_attribute(warning.node, attribute, &value)
                        .map_err(PreserveError::from),
                    Some(None) => self
                        .page
                        .remove_attribute(warning.node, attribute)
                        .map_err(PreserveError::from),
                    None => Ok(()),
                }
            }
        };
        if let Err(err) = result {
            warn!(error = %err, node = %warning.node, "automatic restore failed");
        }
    }

    fn capture(&self, registry: &[Selector]) -> UiBackup {
        let page = &self.page;
        let root = page.root();

        let mut stylesheets = BTreeMap::new();
        for (index, sheet) in page.stylesheets().into_iter().enumerate() {
            match (sheet.href, sheet.inline_content) {
                (Some(href), _) => {
                    if !sheet.readable {
                        debug!(%href, "cross-origin stylesheet recorded without content");
                    }
                    stylesheets.insert(
                        href.clone(),
                        StyleCapture::External {
                            href,
                            disabled: sheet.disabled,
                        },
                    );
                }
                (None, Some(content)) => {
                    stylesheets.insert(
                        format!("inline-{index}"),
                        StyleCapture::Inline {
                            content,
                            disabled: sheet.disabled,
                        },
                    );
                }
                (None, None) => {}
            }
        }

        let elements = registry
            .iter()
            .filter_map(|selector| {
                let node = page.query_selector(selector)?;
                self.capture_element(selector, node)
            })
            .collect();

        UiBackup {
            sequence: 0,
            taken_at: Utc::now(),
            viewport: page.viewport(),
            scroll: page.scroll_position(),
            active_element: page.active_element_tag(),
            root_classes: page.class_list(root),
            stylesheets,
            elements,
            metrics: page.document_metrics(),
        }
    }

    fn capture_element(&self, selector: &Selector, node: NodeId) -> Option<ElementCapture> {
        let summary = self.page.describe(node)?;
        let full_html = self.page.inner_html(node).unwrap_or_default();
        let (inner_html, inner_html_truncated) =
            truncate_chars(&full_html, self.policy.max_inner_html_chars);
        let computed_style = self
            .policy
            .style_allowlist
            .iter()
            .filter_map(|property| {
                self.page
                    .computed_style(node, property)
                    .map(|value| (property.clone(), value))
            })
            .collect();
        Some(ElementCapture {
            selector: selector.clone(),
            node,
            classes: summary.classes().map(str::to_string).collect(),
            id: summary.id().map(str::to_string),
            tag: summary.tag,
            inner_html,
            inner_html_truncated,
            attributes: summary.attributes,
            computed_style,
        })
    }

    fn tag_protected(&self, registry: &[Selector]) -> HashMap<NodeId, OriginContent> {
        let mut origins = HashMap::new();
        for selector in registry {
            for node in self.page.query_selector_all(selector) {
                if origins.contains_key(&node) {
                    continue;
                }
                let origin = OriginContent {
                    inner_html: self.page.inner_html(node).unwrap_or_default(),
                    class_name: self.page.get_attribute(node, "class").unwrap_or_default(),
                    style: self.page.get_attribute(node, "style").unwrap_or_default(),
                };
                if let Err(err) = self.tag_element(node, &origin) {
                    warn!(error = %err, %node, "failed to tag protected element");
                    continue;
                }
                origins.insert(node, origin);
            }
        }
        origins
    }

    fn tag_element(&self, node: NodeId, origin: &OriginContent) -> PreserveResult<()> {
        let encoded = serde_json::to_string(origin).unwrap_or_default();
        self.page.add_class(node, PROTECTED_CLASS)?;
        self.page.set_attribute(node, PROTECTED_ATTR, "true")?;
        self.page.set_attribute(node, ORIGINAL_CONTENT_ATTR, &encoded)?;
        Ok(())
    }

    fn untag_all(&self) {
        let Ok(marker) = Selector::parse(&format!("[{PROTECTED_ATTR}]")) else {
            return;
        };
        for node in self.page.query_selector_all(&marker) {
            let result = self
                .page
                .remove_class(node, PROTECTED_CLASS)
                .and_then(|_| self.page.remove_attribute(node, PROTECTED_ATTR))
                .and_then(|_| self.page.remove_attribute(node, ORIGINAL_CONTENT_ATTR));
            if let Err(err) = result {
                warn!(error = %err, %node, "failed to untag element");
            }
        }
    }

    /// Finds the element a capture belongs to: the captured node while it is
    /// still attached, otherwise a selector match carrying the captured id.
    /// Without an id a removed element is not restored onto another match.
    fn locate(&self, capture: &ElementCapture) -> Option<NodeId> {
        if self.page.is_attached(capture.node) {
            return Some(capture.node);
        }
        let id = capture.id.as_deref()?;
        self.page
            .query_selector_all(&capture.selector)
            .into_iter()
            .find(|node| self.page.get_attribute(*node, "id").as_deref() == Some(id))
    }

    fn apply_backup(&self, backup: &UiBackup) -> PreserveResult<()> {
        let page = &self.page;
        page.scroll_to(backup.scroll);
        page.set_class_list(page.root(), &backup.root_classes)?;

        for capture in &backup.elements {
            let Some(node) = self.locate(capture) else {
                debug!(selector = %capture.selector, "captured element no longer present");
                continue;
            };
            for (name, value) in &capture.attributes {
                page.set_attribute(node, name, value)?;
            }
            if capture.classes.is_empty() {
                page.remove_attribute(node, "class")?;
            } else {
                page.set_class_list(node, &capture.classes)?;
            }
            let current = page.inner_html(node).unwrap_or_default();
            if current != capture.inner_html {
                if capture.inner_html_truncated {
                    warn!(selector = %capture.selector, "restoring truncated inner HTML");
                } else {
                    debug!(selector = %capture.selector, "restoring inner HTML");
                }
                page.set_inner_html(node, &capture.inner_html)?;
            }
        }
        Ok(())
    }
}

impl Drop for UiPreserver {
    fn drop(&mut self) {
        if let Some(watcher) = self.state.get_mut().watcher.take() {
            watcher.abort();
        }
    }
}

/// Cuts `text` to at most `max` characters. The flag reports whether anything was cut.
fn truncate_chars(text: &str, max: usize) -> (String, bool) {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => (text[..byte_idx].to_string(), true),
        None => (text.to_string(), false),
    }
}
