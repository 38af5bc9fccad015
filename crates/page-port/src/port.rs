use std::collections::BTreeMap;

use pagekeeper_core_types::{ScrollPosition, Viewport};
use tokio::sync::broadcast;

use crate::errors::PageError;
use crate::model::{DocumentMetrics, ElementSummary, MutationRecord, NodeId, Overlay, StyleSheetEntry};
use crate::selector::Selector;

/// Everything the engine reads from or writes to the hosting page.
///
/// Implementations wrap a live document (a CDP session, a webview bridge) or
/// an in-process model such as [`crate::InMemoryPage`]. Calls are synchronous;
/// the page is expected to apply writes immediately from the caller's view.
pub trait PagePort: Send + Sync {
    fn location_path(&self) -> String;

    fn viewport(&self) -> Viewport;

    /// Emulates a viewport change (device emulation or window resize).
    fn emulate_viewport(&self, viewport: Viewport);

    fn scroll_position(&self) -> ScrollPosition;

    fn scroll_to(&self, position: ScrollPosition);

    fn document_metrics(&self) -> DocumentMetrics;

    fn active_element_tag(&self) -> Option<String>;

    /// The `<body>` element.
    fn root(&self) -> NodeId;

    fn stylesheets(&self) -> Vec<StyleSheetEntry>;

    fn viewport_meta(&self) -> Option<String>;

    /// Returns false when the document carries no viewport meta tag.
    fn set_viewport_meta(&self, content: &str) -> bool;

    fn append_stylesheet_link(&self, href: &str);

    /// Matches in document order.
    fn query_selector_all(&self, selector: &Selector) -> Vec<NodeId>;

    fn query_selector(&self, selector: &Selector) -> Option<NodeId> {
        self.query_selector_all(selector).into_iter().next()
    }

    fn describe(&self, node: NodeId) -> Option<ElementSummary>;

    /// False once the node, or one of its ancestors, has been removed.
    fn is_attached(&self, node: NodeId) -> bool;

    fn get_attribute(&self, node: NodeId, name: &str) -> Option<String>;

    fn set_attribute(&self, node: NodeId, name: &str, value: &str) -> Result<(), PageError>;

    fn remove_attribute(&self, node: NodeId, name: &str) -> Result<(), PageError>;

    fn inner_html(&self, node: NodeId) -> Option<String>;

    fn set_inner_html(&self, node: NodeId, html: &str) -> Result<(), PageError>;

    fn text_content(&self, node: NodeId) -> Option<String>;

    fn computed_style(&self, node: NodeId, property: &str) -> Option<String>;

    fn show_overlay(&self, overlay: Overlay);

    /// Returns whether an overlay with that id existed.
    fn remove_overlay(&self, id: &str) -> bool;

    fn local_storage(&self) -> BTreeMap<String, String>;

    /// Records produced after the call; earlier changes are not replayed.
    fn subscribe_mutations(&self) -> broadcast::Receiver<MutationRecord>;

    fn class_list(&self, node: NodeId) -> Vec<String> {
        self.get_attribute(node, "class")
            .map(|c| c.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    fn set_class_list(&self, node: NodeId, classes: &[String]) -> Result<(), PageError> {
        self.set_attribute(node, "class", &classes.join(" "))
    }

    fn add_class(&self, node: NodeId, class: &str) -> Result<(), PageError> {
        let mut classes = self.class_list(node);
        if classes.iter().any(|c| c == class) {
            return Ok(());
        }
        classes.push(class.to_string());
        self.set_class_list(node, &classes)
    }

    fn remove_class(&self, node: NodeId, class: &str) -> Result<(), PageError> {
        let classes = self.class_list(node);
        if !classes.iter().any(|c| c == class) {
            return Ok(());
        }
        let kept: Vec<String> = classes.into_iter().filter(|c| c != class).collect();
        self.set_class_list(node, &kept)
    }

    /// Sets one declaration inside the inline `style` attribute.
    fn set_style_property(&self, node: NodeId, property: &str, value: &str) -> Result<(), PageError> {
        let current = self.get_attribute(node, "style").unwrap_or_default();
        let mut declarations = parse_inline_style(&current);
        match declarations.iter_mut().find(|(name, _)| name == property) {
            Some(entry) => entry.1 = value.to_string(),
            None => declarations.push((property.to_string(), value.to_string())),
        }
        self.set_attribute(node, "style", &render_inline_style(&declarations))
    }
}

/// Splits `a: b; c: d` into ordered declarations.
pub fn parse_inline_style(style: &str) -> Vec<(String, String)> {
    style
        .split(';')
        .filter_map(|decl| {
            let (name, value) = decl.split_once(':')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_ascii_lowercase(), value.trim().to_string()))
        })
        .collect()
}

pub fn render_inline_style(declarations: &[(String, String)]) -> String {
    declarations
        .iter()
        .map(|(name, value)| format!("{name}: {value};"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_style_roundtrip_keeps_order() {
        let parsed = parse_inline_style("pointer-events: none; User-Select:none;;");
        assert_eq!(
            parsed,
            vec![
                ("pointer-events".to_string(), "none".to_string()),
                ("user-select".to_string(), "none".to_string())
            ]
        );
        assert_eq!(
            render_inline_style(&parsed),
            "pointer-events: none; user-select: none;"
        );
    }
}
