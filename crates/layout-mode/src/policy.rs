use serde::{Deserialize, Serialize};

use pagekeeper_core_types::Viewport;
use pagekeeper_page_port::Overlay;

use crate::model::{LayoutPreset, PageCategory};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutPolicy {
    pub presets: PresetTable,
    pub tablet_min_width: u32,
    pub desktop_min_width: u32,
    pub max_backups: usize,
    pub component_selector: String,
    pub component_text_chars: usize,
    pub indicator: Overlay,
}

impl Default for LayoutPolicy {
    fn default() -> Self {
        Self {
            presets: PresetTable::default(),
            tablet_min_width: 768,
            desktop_min_width: 1024,
            max_backups: 5,
            component_selector: "[class*=\"card\"], [class*=\"btn\"], [class*=\"form\"]".into(),
            component_text_chars: 100,
            indicator: default_indicator(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PresetTable {
    pub mobile_first: LayoutPreset,
    pub admin_panel: LayoutPreset,
    pub user_interface: LayoutPreset,
    pub desktop: LayoutPreset,
}

impl PresetTable {
    pub fn get(&self, category: PageCategory) -> &LayoutPreset {
        match category {
            PageCategory::MobileFirst => &self.mobile_first,
            PageCategory::AdminPanel => &self.admin_panel,
            PageCategory::UserInterface => &self.user_interface,
            PageCategory::Desktop => &self.desktop,
        }
    }

    pub fn all(&self) -> Vec<LayoutPreset> {
        vec![
            self.mobile_first.clone(),
            self.admin_panel.clone(),
            self.user_interface.clone(),
            self.desktop.clone(),
        ]
    }
}

impl Default for PresetTable {
    fn default() -> Self {
        Self {
            mobile_first: LayoutPreset::new(
                PageCategory::MobileFirst,
                Viewport::new(375, 667),
                &[768, 1024],
                "mobile",
                "mobile-first.css",
            ),
            admin_panel: LayoutPreset::new(
                PageCategory::AdminPanel,
                Viewport::new(1200, 800),
                &[1024, 1440],
                "admin",
                "admin-theme.css",
            ),
            user_interface: LayoutPreset::new(
                PageCategory::UserInterface,
                Viewport::new(375, 667),
                &[768, 1024],
                "user",
                "user-theme.css",
            ),
            desktop: LayoutPreset::new(
                PageCategory::Desktop,
                Viewport::new(1920, 1080),
                &[1440, 1920],
                "desktop",
                "desktop-theme.css",
            ),
        }
    }
}

fn default_indicator() -> Overlay {
    Overlay {
        id: "agent-mode-indicator".into(),
        text: "🤖 Agent Mode Active".into(),
        css: "position: fixed; top: 10px; right: 10px; background: #ff6b6b; color: white; \
              padding: 5px 10px; border-radius: 15px; font-size: 12px; z-index: 10000;"
            .into(),
    }
}
