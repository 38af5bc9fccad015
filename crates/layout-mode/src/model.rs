use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pagekeeper_core_types::{ScrollPosition, Viewport};

/// Page family inferred from the location path.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageCategory {
    MobileFirst,
    AdminPanel,
    UserInterface,
    Desktop,
}

impl PageCategory {
    /// Path rules, first match wins.
    pub fn from_path(path: &str) -> Self {
        if path.contains("admin") {
            PageCategory::AdminPanel
        } else if path.contains("login") {
            PageCategory::MobileFirst
        } else if path.contains("index") {
            PageCategory::UserInterface
        } else {
            PageCategory::MobileFirst
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PageCategory::MobileFirst => "mobile-first",
            PageCategory::AdminPanel => "admin-panel",
            PageCategory::UserInterface => "user-interface",
            PageCategory::Desktop => "desktop",
        }
    }
}

impl fmt::Display for PageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewportClass {
    Mobile,
    Tablet,
    Desktop,
}

impl ViewportClass {
    pub fn classify(width: u32, tablet_min: u32, desktop_min: u32) -> Self {
        if width < tablet_min {
            ViewportClass::Mobile
        } else if width < desktop_min {
            ViewportClass::Tablet
        } else {
            ViewportClass::Desktop
        }
    }
}

impl fmt::Display for ViewportClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ViewportClass::Mobile => "mobile",
            ViewportClass::Tablet => "tablet",
            ViewportClass::Desktop => "desktop",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutPreset {
    pub category: PageCategory,
    /// Nominal viewport written into the viewport meta tag.
    pub viewport: Viewport,
    pub breakpoints: Vec<u32>,
    pub theme: String,
    pub css_file: String,
    /// Viewport class of the page this preset was matched against. Unset in
    /// the preset table; filled in by detection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ViewportClass>,
}

impl LayoutPreset {
    pub fn new(
        category: PageCategory,
        viewport: Viewport,
        breakpoints: &[u32],
        theme: &str,
        css_file: &str,
    ) -> Self {
        Self {
            category,
            viewport,
            breakpoints: breakpoints.to_vec(),
            theme: theme.to_string(),
            css_file: css_file.to_string(),
            mode: None,
        }
    }

    /// Copy of this preset refined for a detected viewport class.
    pub fn refined(&self, mode: ViewportClass) -> Self {
        Self {
            mode: Some(mode),
            ..self.clone()
        }
    }

    pub fn theme_class(&self) -> String {
        format!("theme-{}", self.theme)
    }

    pub fn css_href(&self) -> String {
        format!("css/{}", self.css_file)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayoutSnapshot {
    pub viewport: Viewport,
    pub category: PageCategory,
    pub preset: LayoutPreset,
    pub captured_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StyleRef {
    External { href: String },
    Inline { index: usize, content: String },
}

impl StyleRef {
    pub fn key(&self) -> String {
        match self {
            StyleRef::External { href } => href.clone(),
            StyleRef::Inline { index, .. } => format!("inline-{index}"),
        }
    }
}

/// Short description of a card/button/form component at backup time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentDigest {
    pub tag: String,
    pub class_name: String,
    pub id: Option<String>,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayoutBackup {
    pub sequence: u64,
    pub taken_at: DateTime<Utc>,
    pub viewport: Viewport,
    pub scroll: ScrollPosition,
    pub active_element: Option<String>,
    pub root_classes: Vec<String>,
    pub stylesheets: Vec<StyleRef>,
    pub components: Vec<ComponentDigest>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayoutInfo {
    pub current: Option<LayoutPreset>,
    pub backups: usize,
    pub agent_mode: bool,
    pub presets: Vec<LayoutPreset>,
}
