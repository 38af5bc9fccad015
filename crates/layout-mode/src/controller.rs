use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use pagekeeper_page_port::{PagePort, Selector};

use crate::errors::LayoutError;
use crate::model::{
    ComponentDigest, LayoutBackup, LayoutInfo, LayoutPreset, LayoutSnapshot, PageCategory,
    StyleRef, ViewportClass,
};
use crate::policy::LayoutPolicy;

#[derive(Default)]
struct ControllerState {
    agent_mode: bool,
    current: Option<LayoutPreset>,
    backups: VecDeque<LayoutBackup>,
    next_sequence: u64,
}

/// Detects the page layout, applies presets and toggles agent mode.
pub struct LayoutController {
    page: Arc<dyn PagePort>,
    policy: LayoutPolicy,
    components: Option<Selector>,
    state: Mutex<ControllerState>,
}

impl LayoutController {
    pub fn new(page: Arc<dyn PagePort>, policy: LayoutPolicy) -> Self {
        let components = match Selector::parse(&policy.component_selector) {
            Ok(selector) => Some(selector),
            Err(err) => {
                warn!(error = %err, "component selector rejected; backups will omit components");
                None
            }
        };
        Self {
            page,
            policy,
            components,
            state: Mutex::new(ControllerState::default()),
        }
    }

    pub fn policy(&self) -> &LayoutPolicy {
        &self.policy
    }

    pub fn presets(&self) -> Vec<LayoutPreset> {
        self.policy.presets.all()
    }

    pub fn is_agent_mode(&self) -> bool {
        self.state.lock().agent_mode
    }

    pub fn current_preset(&self) -> Option<LayoutPreset> {
        self.state.lock().current.clone()
    }

    /// Reads path and viewport; does not touch the page.
    pub fn detect_current_layout(&self) -> LayoutSnapshot {
        let path = self.page.location_path();
        let viewport = self.page.viewport();
        let category = PageCategory::from_path(&path);
        let mode = ViewportClass::classify(
            viewport.width,
            self.policy.tablet_min_width,
            self.policy.desktop_min_width,
        );
        debug!(%path, %viewport, %category, %mode, "layout detected");
        LayoutSnapshot {
            viewport,
            category,
            preset: self.policy.presets.get(category).refined(mode),
            captured_at: Utc::now(),
        }
    }

    pub fn apply_layout(&self, preset: &LayoutPreset) -> Result<(), LayoutError> {
        let meta = format!("width={}, initial-scale=1.0", preset.viewport.width);
        if !self.page.set_viewport_meta(&meta) {
            debug!("no viewport meta tag; skipping");
        }

        let root = self.page.root();
        let mut classes: Vec<String> = self
            .page
            .class_list(root)
            .into_iter()
            .filter(|class| !is_theme_class(class))
            .collect();
        classes.push(preset.theme_class());
        self.page.set_class_list(root, &classes)?;

        let already_loaded = self.page.stylesheets().iter().any(|sheet| {
            sheet
                .href
                .as_deref()
                .is_some_and(|href| href.contains(preset.css_file.as_str()))
        });
        if already_loaded {
            debug!(css = %preset.css_file, "stylesheet already present");
        } else {
            self.page.append_stylesheet_link(&preset.css_href());
        }

        self.state.lock().current = Some(preset.clone());
        info!(category = %preset.category, theme = %preset.theme, "layout applied");
        Ok(())
    }

    /// Returns false when agent mode was already on.
    pub fn enable_agent_mode(&self) -> bool {
        {
            let mut state = self.state.lock();
            if state.agent_mode {
                return false;
            }
            state.agent_mode = true;
        }
        self.backup_current_state();
        self.page.show_overlay(self.policy.indicator.clone());
        self.set_root_interaction("none");
        info!("agent mode enabled");
        true
    }

    /// Returns whether agent mode was on. Cleanup runs either way.
    pub fn disable_agent_mode(&self) -> bool {
        let was_active = std::mem::replace(&mut self.state.lock().agent_mode, false);
        if let Err(err) = self.restore_state() {
            warn!(error = %err, "agent mode disabled without a layout restore");
        }
        self.page.remove_overlay(&self.policy.indicator.id);
        self.set_root_interaction("auto");
        if was_active {
            info!("agent mode disabled");
        }
        was_active
    }

    /// Re-detects and re-applies on resize. Ignored while agent mode is on.
    pub fn handle_resize(&self) -> Option<LayoutSnapshot> {
        if self.is_agent_mode() {
            debug!("resize ignored in agent mode");
            return None;
        }
        let snapshot = self.detect_current_layout();
        if let Err(err) = self.apply_layout(&snapshot.preset) {
            warn!(error = %err, "failed to apply layout after resize");
        }
        Some(snapshot)
    }

    pub fn backup_current_state(&self) -> LayoutBackup {
        let root = self.page.root();
        let stylesheets = self
            .page
            .stylesheets()
            .into_iter()
            .enumerate()
            .filter_map(|(index, sheet)| match (sheet.href, sheet.inline_content) {
                (Some(href), _) => Some(StyleRef::External { href }),
                (None, Some(content)) => Some(StyleRef::Inline { index, content }),
                (None, None) => None,
            })
            .collect();
        let components = self
            .components
            .as_ref()
            .map(|selector| self.component_digests(selector))
            .unwrap_or_default();

        let mut state = self.state.lock();
        state.next_sequence += 1;
        let backup = LayoutBackup {
            sequence: state.next_sequence,
            taken_at: Utc::now(),
            viewport: self.page.viewport(),
            scroll: self.page.scroll_position(),
            active_element: self.page.active_element_tag(),
            root_classes: self.page.class_list(root),
            stylesheets,
            components,
        };
        state.backups.push_back(backup.clone());
        while state.backups.len() > self.policy.max_backups.max(1) {
            state.backups.pop_front();
        }
        debug!(sequence = backup.sequence, "layout backup taken");
        backup
    }

    /// Re-applies scroll offset and root classes from the newest backup.
    pub fn restore_state(&self) -> Result<(), LayoutError> {
        let backup = self
            .state
            .lock()
            .backups
            .back()
            .cloned()
            .ok_or(LayoutError::RestoreUnavailable)?;
        self.page.scroll_to(backup.scroll);
        self.page
            .set_class_list(self.page.root(), &backup.root_classes)?;
        debug!(sequence = backup.sequence, "layout restored");
        Ok(())
    }

    pub fn backups(&self) -> Vec<LayoutBackup> {
        self.state.lock().backups.iter().cloned().collect()
    }

    pub fn layout_info(&self) -> LayoutInfo {
        let state = self.state.lock();
        LayoutInfo {
            current: state.current.clone(),
            backups: state.backups.len(),
            agent_mode: state.agent_mode,
            presets: self.presets(),
        }
    }

    fn component_digests(&self, selector: &Selector) -> Vec<ComponentDigest> {
        self.page
            .query_selector_all(selector)
            .into_iter()
            .filter_map(|node| {
                let summary = self.page.describe(node)?;
                let text = self.page.text_content(node).unwrap_or_default();
                Some(ComponentDigest {
                    class_name: summary.attributes.get("class").cloned().unwrap_or_default(),
                    id: summary.id().map(str::to_string),
                    tag: summary.tag,
                    text: text.chars().take(self.policy.component_text_chars).collect(),
                })
            })
            .collect()
    }

    fn set_root_interaction(&self, value: &str) {
        let root = self.page.root();
        for property in ["pointer-events", "user-select"] {
            if let Err(err) = self.page.set_style_property(root, property, value) {
                warn!(error = %err, property, "failed to update root style");
            }
        }
    }
}

fn is_theme_class(class: &str) -> bool {
    class
        .strip_prefix("theme-")
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_alphanumeric() || c == '_'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn theme_classes_are_word_suffixed() {
        assert!(is_theme_class("theme-mobile"));
        assert!(is_theme_class("theme-dark_2"));
        assert!(!is_theme_class("theme-"));
        assert!(!is_theme_class("themes"));
        assert!(!is_theme_class("page-dashboard"));
    }
}
