use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pagekeeper_core_types::{ScrollPosition, Viewport};
use pagekeeper_page_port::{DocumentMetrics, NodeId, Selector};

/// Marker class placed on every protected element.
pub const PROTECTED_CLASS: &str = "agent-protected";
pub const PROTECTED_ATTR: &str = "data-agent-protected";
pub const ORIGINAL_CONTENT_ATTR: &str = "data-original-content";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StyleCapture {
    External { href: String, disabled: bool },
    Inline { content: String, disabled: bool },
}

/// First element matching a protected selector at capture time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementCapture {
    pub selector: Selector,
    /// Element the capture was taken from.
    pub node: NodeId,
    pub tag: String,
    pub classes: Vec<String>,
    pub id: Option<String>,
    /// Possibly cut at the configured bound; restore is best effort.
    pub inner_html: String,
    pub inner_html_truncated: bool,
    pub attributes: BTreeMap<String, String>,
    pub computed_style: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UiBackup {
    pub sequence: u64,
    pub taken_at: DateTime<Utc>,
    pub viewport: Viewport,
    pub scroll: ScrollPosition,
    pub active_element: Option<String>,
    pub root_classes: Vec<String>,
    pub stylesheets: BTreeMap<String, StyleCapture>,
    pub elements: Vec<ElementCapture>,
    pub metrics: DocumentMetrics,
}

/// Pre-tag content of a protected element, also written to `data-original-content`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginContent {
    #[serde(rename = "innerHTML")]
    pub inner_html: String,
    #[serde(rename = "className")]
    pub class_name: String,
    pub style: String,
}

impl OriginContent {
    /// Value an attribute should hold while the element is tagged.
    pub fn expected(&self, attribute: &str) -> Option<String> {
        match attribute {
            "class" => {
                let mut classes: Vec<&str> = self.class_name.split_whitespace().collect();
                if !classes.contains(&PROTECTED_CLASS) {
                    classes.push(PROTECTED_CLASS);
                }
                Some(classes.join(" "))
            }
            "style" if self.style.is_empty() => None,
            "style" => Some(self.style.clone()),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WarningKind {
    ProtectedRemoved { selector: String },
    ProtectedModified { attribute: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreserveWarning {
    pub node: NodeId,
    pub tag: String,
    #[serde(flatten)]
    pub kind: WarningKind,
    pub observed_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreserverStatus {
    pub active: bool,
    pub protected_selectors: usize,
    pub backups: usize,
    pub origin_entries: usize,
}
