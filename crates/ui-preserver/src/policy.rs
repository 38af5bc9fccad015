use serde::{Deserialize, Serialize};

use pagekeeper_page_port::Overlay;

/// What the watcher does after reporting a change to protected content.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationPolicy {
    /// Record a warning and leave the page alone.
    #[default]
    LogOnly,
    /// Record a warning, then put the protected state back.
    AutoRestore,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PreserverPolicy {
    pub protected_selectors: Vec<String>,
    pub max_backups: usize,
    pub max_inner_html_chars: usize,
    pub style_allowlist: Vec<String>,
    pub mutation_policy: MutationPolicy,
    /// Root attributes the layout controller owns during a session. Writes to
    /// them are neither reported nor healed; the root classes still come
    /// back from the backup on restore.
    pub root_managed_attributes: Vec<String>,
    pub max_warnings: usize,
    pub indicator: Overlay,
}

impl Default for PreserverPolicy {
    fn default() -> Self {
        Self {
            protected_selectors: [
                "body",
                "main",
                ".container",
                ".header",
                ".footer",
                ".navigation",
                ".sidebar",
                ".content",
                ".btn",
                ".card",
                ".form",
                ".modal",
                ".alert",
                ".toast",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            max_backups: 5,
            max_inner_html_chars: 500,
            style_allowlist: [
                "display",
                "position",
                "width",
                "height",
                "margin",
                "padding",
                "border",
                "background",
                "color",
                "font-size",
                "font-family",
                "flex",
                "grid",
                "float",
                "clear",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            mutation_policy: MutationPolicy::LogOnly,
            root_managed_attributes: vec!["class".into(), "style".into()],
            max_warnings: 64,
            indicator: default_indicator(),
        }
    }
}

fn default_indicator() -> Overlay {
    Overlay {
        id: "ui-preservation-indicator".into(),
        text: "🛡️ UI Protected".into(),
        css: "position: fixed; top: 50px; right: 10px; background: #2ecc71; color: white; \
              padding: 8px 12px; border-radius: 4px; font-size: 12px; z-index: 9998; \
              font-family: monospace;"
            .into(),
    }
}
