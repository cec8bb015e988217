//! Component tree keyed by opaque node handles.

use std::fmt::Write as _;

use serde_json::Value;

/// Opaque handle to a node in one [`ComponentTree`].
///
/// Slots are reused after removal; the generation tells a stale handle apart
/// from the node that now occupies its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: usize,
    generation: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementKind {
    Container,
    Image { src: String },
    /// Output pane that hosts a rendered artifact.
    Pane,
    /// Interactive chart rendered from a chart spec.
    Chart { data: Value, layout: Value },
    Editor { text: String },
    Button { label: String, enabled: bool },
    Label { text: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Style {
    /// Occupies space but may be invisible (`visibility`).
    pub visible: bool,
    /// Takes part in layout at all (`display`).
    pub displayed: bool,
    pub opacity: f32,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            visible: true,
            displayed: true,
            opacity: 1.0,
        }
    }
}

impl Style {
    pub fn hidden() -> Self {
        Self {
            visible: false,
            displayed: true,
            opacity: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Element {
    pub kind: ElementKind,
    pub style: Style,
    children: Vec<NodeId>,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    element: Option<Element>,
}

#[derive(Debug, Default)]
pub struct ComponentTree {
    slots: Vec<Slot>,
    free: Vec<usize>,
}

impl ComponentTree {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, kind: ElementKind, style: Style) -> NodeId {
        let element = Element {
            kind,
            style,
            children: Vec::new(),
        };
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.element = Some(element);
                NodeId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    element: Some(element),
                });
                NodeId {
                    index: self.slots.len() - 1,
                    generation: 0,
                }
            }
        }
    }

    fn remove(&mut self, id: NodeId) -> Option<Element> {
        let slot = self.slots.get_mut(id.index)?;
        if slot.generation != id.generation {
            return None;
        }
        let removed = slot.element.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        Some(removed)
    }

    /// Add a detached node, e.g. a page section container.
    pub fn add_root(&mut self, kind: ElementKind) -> NodeId {
        self.insert(kind, Style::default())
    }

    /// Append a child under `parent`. Returns `None` if `parent` is gone.
    pub fn append(&mut self, parent: NodeId, kind: ElementKind) -> Option<NodeId> {
        self.append_styled(parent, kind, Style::default())
    }

    pub fn append_styled(
        &mut self,
        parent: NodeId,
        kind: ElementKind,
        style: Style,
    ) -> Option<NodeId> {
        if !self.contains(parent) {
            return None;
        }
        let id = self.insert(kind, style);
        if let Some(p) = self.get_mut(parent) {
            p.children.push(id);
        }
        Some(id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: NodeId) -> Option<&Element> {
        self.slots
            .get(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.element.as_ref())
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        self.slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.element.as_mut())
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map(|e| e.children.as_slice()).unwrap_or(&[])
    }

    pub fn style_mut(&mut self, id: NodeId) -> Option<&mut Style> {
        self.get_mut(id).map(|e| &mut e.style)
    }

    /// Remove every descendant of `id`, keeping `id` itself.
    pub fn clear_children(&mut self, id: NodeId) {
        let Some(element) = self.get_mut(id) else {
            return;
        };
        let mut stack = std::mem::take(&mut element.children);
        while let Some(child) = stack.pop() {
            if let Some(removed) = self.remove(child) {
                stack.extend(removed.children);
            }
        }
    }

    /// Replace the subtree under `id` with a single new child.
    pub fn replace_children(&mut self, id: NodeId, kind: ElementKind) -> Option<NodeId> {
        self.clear_children(id);
        self.append(id, kind)
    }

    pub fn editor_text(&self, id: NodeId) -> Option<&str> {
        match &self.get(id)?.kind {
            ElementKind::Editor { text } => Some(text),
            _ => None,
        }
    }

    pub fn set_editor_text(&mut self, id: NodeId, value: impl Into<String>) {
        if let Some(ElementKind::Editor { text }) = self.get_mut(id).map(|e| &mut e.kind) {
            *text = value.into();
        }
    }

    /// Label and enabled state of a button.
    pub fn button(&self, id: NodeId) -> Option<(&str, bool)> {
        match &self.get(id)?.kind {
            ElementKind::Button { label, enabled } => Some((label, *enabled)),
            _ => None,
        }
    }

    pub fn set_button(&mut self, id: NodeId, new_label: impl Into<String>, is_enabled: bool) {
        if let Some(ElementKind::Button { label, enabled }) =
            self.get_mut(id).map(|e| &mut e.kind)
        {
            *label = new_label.into();
            *enabled = is_enabled;
        }
    }

    /// Serialize the subtree rooted at `id` as HTML.
    pub fn to_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_html(id, &mut out);
        out
    }

    fn write_html(&self, id: NodeId, out: &mut String) {
        let Some(element) = self.get(id) else {
            return;
        };
        let style = style_attr(&element.style);
        match &element.kind {
            ElementKind::Container | ElementKind::Pane => {
                let class = if element.kind == ElementKind::Pane {
                    "sim-pane"
                } else {
                    "sim-block"
                };
                let _ = write!(out, "<div class=\"{class}\"{style}>");
                for child in &element.children {
                    self.write_html(*child, out);
                }
                out.push_str("</div>");
            }
            ElementKind::Image { src } => {
                let _ = write!(out, "<img src=\"{}\"{style}>", escape(src));
            }
            ElementKind::Chart { data, layout } => {
                let spec = serde_json::json!({ "data": data, "layout": layout });
                let _ = write!(
                    out,
                    "<div class=\"sim-chart\" data-spec=\"{}\"{style}></div>",
                    escape(&spec.to_string())
                );
            }
            ElementKind::Editor { text } => {
                let _ = write!(out, "<pre class=\"sim-editor\"{style}>{}</pre>", escape(text));
            }
            ElementKind::Button { label, enabled } => {
                let disabled = if *enabled { "" } else { " disabled" };
                let _ = write!(out, "<button{disabled}{style}>{}</button>", escape(label));
            }
            ElementKind::Label { text } => {
                let _ = write!(out, "<span{style}>{}</span>", escape(text));
            }
        }
    }
}

fn style_attr(style: &Style) -> String {
    if *style == Style::default() {
        return String::new();
    }
    let mut css = Vec::new();
    if !style.visible {
        css.push("visibility:hidden".to_string());
    }
    if !style.displayed {
        css.push("display:none".to_string());
    }
    if style.opacity < 1.0 {
        css.push(format!("opacity:{}", style.opacity));
    }
    format!(" style=\"{}\"", css.join(";"))
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
