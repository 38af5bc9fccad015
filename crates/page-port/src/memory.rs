//! In-process document used by tests and the CLI demo.
//!
//! Markup inside an element is kept as opaque text (`inner_html`); the element
//! tree itself is made of the nodes appended through [`InMemoryPage::append_element`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use pagekeeper_core_types::{ScrollPosition, Viewport};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;
use url::Url;

use crate::errors::PageError;
use crate::model::{
    DocumentMetrics, ElementSummary, MutationRecord, NodeId, Overlay, StyleSheetEntry,
};
use crate::port::{parse_inline_style, PagePort};
use crate::selector::Selector;

const MUTATION_CAPACITY: usize = 256;

/// Declarative description of an element to append.
#[derive(Clone, Debug, Default)]
pub struct ElementSpec {
    tag: String,
    attributes: BTreeMap<String, String>,
    inner_html: String,
    computed: BTreeMap<String, String>,
}

impl ElementSpec {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            ..Self::default()
        }
    }

    pub fn class(mut self, class: &str) -> Self {
        let entry = self.attributes.entry("class".to_string()).or_default();
        if !entry.is_empty() {
            entry.push(' ');
        }
        entry.push_str(class);
        self
    }

    pub fn id(self, id: &str) -> Self {
        self.attr("id", id)
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn html(mut self, html: impl Into<String>) -> Self {
        self.inner_html = html.into();
        self
    }

    pub fn computed(mut self, property: &str, value: &str) -> Self {
        self.computed.insert(property.to_string(), value.to_string());
        self
    }
}

#[derive(Clone, Debug)]
struct NodeData {
    tag: String,
    attributes: BTreeMap<String, String>,
    inner_html: String,
    computed: BTreeMap<String, String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl NodeData {
    fn from_spec(spec: ElementSpec, parent: Option<NodeId>) -> Self {
        Self {
            tag: spec.tag,
            attributes: spec.attributes,
            inner_html: spec.inner_html,
            computed: spec.computed,
            parent,
            children: Vec::new(),
        }
    }
}

struct PageState {
    url: Url,
    viewport: Viewport,
    scroll: ScrollPosition,
    metrics: DocumentMetrics,
    active: Option<NodeId>,
    nodes: HashMap<NodeId, NodeData>,
    next_id: u64,
    html: NodeId,
    head: NodeId,
    body: NodeId,
    meta_viewport: Option<String>,
    stylesheets: Vec<StyleSheetEntry>,
    overlays: Vec<Overlay>,
    local_storage: BTreeMap<String, String>,
}

impl PageState {
    fn summary(&self, node: NodeId) -> Option<ElementSummary> {
        self.nodes.get(&node).map(|data| ElementSummary {
            node,
            tag: data.tag.clone(),
            attributes: data.attributes.clone(),
        })
    }

    fn is_attached(&self, node: NodeId) -> bool {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if current == self.html {
                return true;
            }
            cursor = self.nodes.get(&current).and_then(|data| data.parent);
        }
        false
    }

    fn document_order(&self) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![self.html];
        while let Some(node) = stack.pop() {
            order.push(node);
            if let Some(data) = self.nodes.get(&node) {
                stack.extend(data.children.iter().rev().copied());
            }
        }
        order
    }

    fn insert(&mut self, spec: ElementSpec, parent: Option<NodeId>) -> NodeId {
        self.next_id += 1;
        let id = NodeId(self.next_id);
        self.nodes.insert(id, NodeData::from_spec(spec, parent));
        if let Some(parent) = parent {
            if let Some(data) = self.nodes.get_mut(&parent) {
                data.children.push(id);
            }
        }
        id
    }
}

pub struct InMemoryPage {
    state: Mutex<PageState>,
    mutations: broadcast::Sender<MutationRecord>,
}

impl InMemoryPage {
    pub fn new(url: &str, viewport: Viewport) -> Result<Arc<Self>, PageError> {
        let url = Url::parse(url).map_err(|err| PageError::InvalidUrl(format!("{url}: {err}")))?;
        let mut state = PageState {
            url,
            viewport,
            scroll: ScrollPosition::default(),
            metrics: DocumentMetrics {
                scroll_width: viewport.width,
                scroll_height: viewport.height,
            },
            active: None,
            nodes: HashMap::new(),
            next_id: 0,
            html: NodeId(0),
            head: NodeId(0),
            body: NodeId(0),
            meta_viewport: None,
            stylesheets: Vec::new(),
            overlays: Vec::new(),
            local_storage: BTreeMap::new(),
        };
        let html = state.insert(ElementSpec::new("html"), None);
        let head = state.insert(ElementSpec::new("head"), Some(html));
        let body = state.insert(ElementSpec::new("body"), Some(html));
        state.html = html;
        state.head = head;
        state.body = body;
        state.active = Some(body);
        let (mutations, _) = broadcast::channel(MUTATION_CAPACITY);
        Ok(Arc::new(Self {
            state: Mutex::new(state),
            mutations,
        }))
    }

    /// A small tax-portal shaped document: header, navigation, content cards,
    /// a return form and a footer, with one external, one inline and one
    /// cross-origin stylesheet.
    pub fn tax_portal_demo(url: &str, viewport: Viewport) -> Result<Arc<Self>, PageError> {
        let page = Self::new(url, viewport)?;
        let head = page.head();
        let body = page.body();
        page.set_meta_viewport(Some("width=device-width, initial-scale=1.0"));
        page.append_element(head, ElementSpec::new("link").attr("rel", "manifest").attr("href", "/manifest.json"))?;
        page.add_stylesheet(StyleSheetEntry::external("/css/main.css"));
        page.add_stylesheet(StyleSheetEntry::inline(".toast { display: none; }"));
        page.add_stylesheet(StyleSheetEntry::cross_origin("https://fonts.example.net/inter.css"));
        page.add_root_class("page-dashboard");

        let main = page.append_element(body, ElementSpec::new("main").class("container").computed("max-width", "1140px"))?;
        page.append_element(
            main,
            ElementSpec::new("header")
                .class("header")
                .class("mobile-header")
                .html("<h1>Tax Portal</h1>"),
        )?;
        page.append_element(
            main,
            ElementSpec::new("nav")
                .class("navigation")
                .class("mobile-nav")
                .html("<a href=\"/index.html\">Home</a><a href=\"/returns.html\">Returns</a>"),
        )?;
        let content = page.append_element(main, ElementSpec::new("section").class("content"))?;
        page.append_element(
            content,
            ElementSpec::new("div")
                .class("card")
                .id("refund-status")
                .html("<h2>Refund status</h2><p>Your 2025 refund is being processed.</p>"),
        )?;
        page.append_element(
            content,
            ElementSpec::new("button")
                .class("btn")
                .class("btn-primary")
                .id("file-return")
                .html("File a return"),
        )?;
        page.append_element(
            content,
            ElementSpec::new("form")
                .class("form")
                .id("return-form")
                .html("<input name=\"tin\"><input name=\"year\" value=\"2025\">"),
        )?;
        page.append_element(body, ElementSpec::new("footer").class("footer").html("<small>Support line</small>"))?;
        page.set_local_item("session.lang", "en");
        page.set_local_item("draft.return", "{\"year\":2025}");
        Ok(page)
    }

    pub fn head(&self) -> NodeId {
        self.state.lock().head
    }

    pub fn body(&self) -> NodeId {
        self.state.lock().body
    }

    pub fn append_element(&self, parent: NodeId, spec: ElementSpec) -> Result<NodeId, PageError> {
        let mut state = self.state.lock();
        if !state.nodes.contains_key(&parent) {
            return Err(PageError::NodeNotFound(parent));
        }
        Ok(state.insert(spec, Some(parent)))
    }

    /// Detaches `node` (and its subtree) and reports it as a removed child.
    pub fn remove_node(&self, node: NodeId) -> Result<(), PageError> {
        let record = {
            let mut state = self.state.lock();
            if !state.is_attached(node) {
                return Err(PageError::Detached(node));
            }
            let parent = state
                .nodes
                .get(&node)
                .and_then(|data| data.parent)
                .ok_or(PageError::NodeNotFound(node))?;
            if let Some(data) = state.nodes.get_mut(&parent) {
                data.children.retain(|child| *child != node);
            }
            if let Some(data) = state.nodes.get_mut(&node) {
                data.parent = None;
            }
            let removed = state.summary(node).ok_or(PageError::NodeNotFound(node))?;
            MutationRecord::ChildRemoved {
                parent: Some(parent),
                removed,
            }
        };
        self.notify(record);
        Ok(())
    }

    pub fn navigate(&self, url: &str) -> Result<(), PageError> {
        let parsed = Url::parse(url).map_err(|err| PageError::InvalidUrl(format!("{url}: {err}")))?;
        self.state.lock().url = parsed;
        Ok(())
    }

    pub fn set_meta_viewport(&self, content: Option<&str>) {
        self.state.lock().meta_viewport = content.map(str::to_string);
    }

    pub fn add_stylesheet(&self, entry: StyleSheetEntry) {
        self.state.lock().stylesheets.push(entry);
    }

    pub fn set_local_item(&self, key: &str, value: &str) {
        self.state
            .lock()
            .local_storage
            .insert(key.to_string(), value.to_string());
    }

    pub fn set_active_element(&self, node: Option<NodeId>) {
        self.state.lock().active = node;
    }

    pub fn set_document_metrics(&self, metrics: DocumentMetrics) {
        self.state.lock().metrics = metrics;
    }

    pub fn overlays(&self) -> Vec<Overlay> {
        self.state.lock().overlays.clone()
    }

    /// Count of `<link>`-style stylesheet entries whose href contains `needle`.
    pub fn stylesheet_links_matching(&self, needle: &str) -> usize {
        self.state
            .lock()
            .stylesheets
            .iter()
            .filter(|entry| entry.href.as_deref().is_some_and(|href| href.contains(needle)))
            .count()
    }

    fn add_root_class(&self, class: &str) {
        let body = self.body();
        // Body always exists, so this cannot fail.
        let _ = self.add_class(body, class);
    }

    fn notify(&self, record: MutationRecord) {
        if self.mutations.send(record).is_err() {
            debug!("mutation dropped: no observers");
        }
    }

    fn write_attribute(&self, node: NodeId, name: &str, value: Option<&str>) -> Result<(), PageError> {
        let record = {
            let mut state = self.state.lock();
            let data = state.nodes.get_mut(&node).ok_or(PageError::NodeNotFound(node))?;
            let old_value = match value {
                Some(value) => data.attributes.insert(name.to_string(), value.to_string()),
                None => data.attributes.remove(name),
            };
            if old_value.as_deref() == value {
                return Ok(());
            }
            let attached = state.is_attached(node);
            let target = state.summary(node).ok_or(PageError::NodeNotFound(node))?;
            attached.then(|| MutationRecord::Attribute {
                target,
                name: name.to_string(),
                old_value,
            })
        };
        if let Some(record) = record {
            self.notify(record);
        }
        Ok(())
    }
}

impl PagePort for InMemoryPage {
    fn location_path(&self) -> String {
        self.state.lock().url.path().to_string()
    }

    fn viewport(&self) -> Viewport {
        self.state.lock().viewport
    }

    fn emulate_viewport(&self, viewport: Viewport) {
        let mut state = self.state.lock();
        state.viewport = viewport;
        state.metrics.scroll_width = state.metrics.scroll_width.max(viewport.width);
    }

    fn scroll_position(&self) -> ScrollPosition {
        self.state.lock().scroll
    }

    fn scroll_to(&self, position: ScrollPosition) {
        self.state.lock().scroll = position;
    }

    fn document_metrics(&self) -> DocumentMetrics {
        self.state.lock().metrics
    }

    fn active_element_tag(&self) -> Option<String> {
        let state = self.state.lock();
        state
            .active
            .and_then(|node| state.nodes.get(&node))
            .map(|data| data.tag.to_ascii_uppercase())
    }

    fn root(&self) -> NodeId {
        self.body()
    }

    fn stylesheets(&self) -> Vec<StyleSheetEntry> {
        self.state.lock().stylesheets.clone()
    }

    fn viewport_meta(&self) -> Option<String> {
        self.state.lock().meta_viewport.clone()
    }

    fn set_viewport_meta(&self, content: &str) -> bool {
        let mut state = self.state.lock();
        match state.meta_viewport.as_mut() {
            Some(meta) => {
                *meta = content.to_string();
                true
            }
            None => false,
        }
    }

    fn append_stylesheet_link(&self, href: &str) {
        self.add_stylesheet(StyleSheetEntry::external(href));
    }

    fn query_selector_all(&self, selector: &Selector) -> Vec<NodeId> {
        let state = self.state.lock();
        state
            .document_order()
            .into_iter()
            .filter(|node| {
                state
                    .summary(*node)
                    .is_some_and(|summary| selector.matches(&summary))
            })
            .collect()
    }

    fn describe(&self, node: NodeId) -> Option<ElementSummary> {
        self.state.lock().summary(node)
    }

    fn is_attached(&self, node: NodeId) -> bool {
        self.state.lock().is_attached(node)
    }

    fn get_attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.state
            .lock()
            .nodes
            .get(&node)
            .and_then(|data| data.attributes.get(name).cloned())
    }

    fn set_attribute(&self, node: NodeId, name: &str, value: &str) -> Result<(), PageError> {
        self.write_attribute(node, name, Some(value))
    }

    fn remove_attribute(&self, node: NodeId, name: &str) -> Result<(), PageError> {
        self.write_attribute(node, name, None)
    }

    fn inner_html(&self, node: NodeId) -> Option<String> {
        self.state
            .lock()
            .nodes
            .get(&node)
            .map(|data| data.inner_html.clone())
    }

    fn set_inner_html(&self, node: NodeId, html: &str) -> Result<(), PageError> {
        let mut state = self.state.lock();
        let data = state.nodes.get_mut(&node).ok_or(PageError::NodeNotFound(node))?;
        data.inner_html = html.to_string();
        Ok(())
    }

    fn text_content(&self, node: NodeId) -> Option<String> {
        self.inner_html(node).map(|html| strip_tags(&html))
    }

    fn computed_style(&self, node: NodeId, property: &str) -> Option<String> {
        let state = self.state.lock();
        let data = state.nodes.get(&node)?;
        let inline = data
            .attributes
            .get("style")
            .map(|style| parse_inline_style(style))
            .unwrap_or_default();
        if let Some((_, value)) = inline.iter().find(|(name, _)| name == property) {
            return Some(value.clone());
        }
        if let Some(value) = data.computed.get(property) {
            return Some(value.clone());
        }
        if property == "width" {
            let max = data
                .computed
                .get("max-width")
                .and_then(|raw| raw.trim_end_matches("px").parse::<u32>().ok())
                .unwrap_or(u32::MAX);
            return Some(format!("{}px", state.viewport.width.min(max)));
        }
        None
    }

    fn show_overlay(&self, overlay: Overlay) {
        let mut state = self.state.lock();
        state.overlays.retain(|existing| existing.id != overlay.id);
        state.overlays.push(overlay);
    }

    fn remove_overlay(&self, id: &str) -> bool {
        let mut state = self.state.lock();
        let before = state.overlays.len();
        state.overlays.retain(|existing| existing.id != id);
        state.overlays.len() != before
    }

    fn local_storage(&self) -> BTreeMap<String, String> {
        self.state.lock().local_storage.clone()
    }

    fn subscribe_mutations(&self) -> broadcast::Receiver<MutationRecord> {
        self.mutations.subscribe()
    }
}

fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}
