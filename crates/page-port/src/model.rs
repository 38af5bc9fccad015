use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque handle to an element owned by the page.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Tag plus attribute map of an element, enough to evaluate a selector.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementSummary {
    pub node: NodeId,
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
}

impl ElementSummary {
    pub fn id(&self) -> Option<&str> {
        self.attributes
            .get("id")
            .map(String::as_str)
            .filter(|id| !id.is_empty())
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attributes
            .get("class")
            .map(|c| c.split_whitespace())
            .into_iter()
            .flatten()
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }
}

/// One entry of `document.styleSheets`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleSheetEntry {
    pub href: Option<String>,
    pub inline_content: Option<String>,
    pub disabled: bool,
    /// False for cross-origin sheets whose rules cannot be read.
    pub readable: bool,
}

impl StyleSheetEntry {
    pub fn external(href: impl Into<String>) -> Self {
        Self {
            href: Some(href.into()),
            inline_content: None,
            disabled: false,
            readable: true,
        }
    }

    pub fn cross_origin(href: impl Into<String>) -> Self {
        Self {
            href: Some(href.into()),
            inline_content: None,
            disabled: false,
            readable: false,
        }
    }

    pub fn inline(content: impl Into<String>) -> Self {
        Self {
            href: None,
            inline_content: Some(content.into()),
            disabled: false,
            readable: true,
        }
    }
}

/// Fixed-position badge drawn above the page (mode indicators).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overlay {
    pub id: String,
    pub text: String,
    pub css: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetrics {
    pub scroll_width: u32,
    pub scroll_height: u32,
}

/// DOM change notification, mirroring the records a MutationObserver delivers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MutationRecord {
    ChildRemoved {
        parent: Option<NodeId>,
        removed: ElementSummary,
    },
    Attribute {
        target: ElementSummary,
        name: String,
        old_value: Option<String>,
    },
}
