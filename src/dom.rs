//! Virtual HTML fragment tree.
//!
//! Dictionary definitions arrive as HTML fragments with a fixed class
//! schema. The enrichment pass needs tree queries (descendants, siblings,
//! closest ancestor) and targeted mutation, not a browser engine, so the
//! fragment is held in a flat node arena addressed by [`NodeId`].

use std::collections::BTreeMap;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
pub(crate) enum NodeKind {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone)]
pub(crate) struct Element {
    pub(crate) tag: String,
    pub(crate) attrs: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    kind: NodeKind,
}

/// A parsed HTML fragment with a synthetic root above the top-level nodes.
#[derive(Debug, Clone)]
pub struct Fragment {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Fragment {
    /// Parses a fragment. The parser is tolerant: stray end tags are
    /// dropped and unclosed elements are closed at end of input, matching
    /// how the upstream dictionary HTML actually behaves.
    pub fn parse(html: &str) -> Self {
        Parser::new(html).run()
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.node(id).kind {
            NodeKind::Element(el) => Some(el),
            NodeKind::Text(_) => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.node_mut(id).kind {
            NodeKind::Element(el) => Some(el),
            NodeKind::Text(_) => None,
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.element(id).is_some()
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|el| el.tag.as_str())
    }

    // ---- construction ----------------------------------------------------

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: None,
            children: Vec::new(),
            kind,
        });
        id
    }

    /// Creates a detached element.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeKind::Element(Element {
            tag: tag.to_ascii_lowercase(),
            attrs: BTreeMap::new(),
        }))
    }

    /// Creates a detached text node.
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeKind::Text(text.to_string()))
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.node_mut(child).parent = Some(parent);
        self.node_mut(parent).children.push(child);
    }

    pub fn prepend_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.node_mut(child).parent = Some(parent);
        self.node_mut(parent).children.insert(0, child);
    }

    /// Inserts `node` as the next sibling of `anchor`.
    pub fn insert_after(&mut self, anchor: NodeId, node: NodeId) {
        let Some(parent) = self.node(anchor).parent else {
            return;
        };
        self.detach(node);
        let pos = self
            .node(parent)
            .children
            .iter()
            .position(|&c| c == anchor)
            .map(|p| p + 1)
            .unwrap_or(self.node(parent).children.len());
        self.node_mut(node).parent = Some(parent);
        self.node_mut(parent).children.insert(pos, node);
    }

    fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.node(id).parent {
            self.node_mut(parent).children.retain(|&c| c != id);
            self.node_mut(id).parent = None;
        }
    }

    /// Detaches a node from the tree. The arena slot is abandoned.
    pub fn remove(&mut self, id: NodeId) {
        self.detach(id);
    }

    /// Replaces `old` with `new` at the same position.
    pub fn replace(&mut self, old: NodeId, new: NodeId) {
        let Some(parent) = self.node(old).parent else {
            return;
        };
        self.detach(new);
        let pos = self
            .node(parent)
            .children
            .iter()
            .position(|&c| c == old)
            .unwrap_or(0);
        self.node_mut(old).parent = None;
        self.node_mut(new).parent = Some(parent);
        self.node_mut(parent).children[pos] = new;
    }

    /// Moves `target` inside `wrapper`, which takes target's tree position.
    pub fn wrap(&mut self, target: NodeId, wrapper: NodeId) {
        if self.node(target).parent.is_some() {
            self.replace(target, wrapper);
        }
        self.append_child(wrapper, target);
    }

    /// Deep-copies the subtree rooted at `id`; the copy is detached.
    pub fn clone_subtree(&mut self, id: NodeId) -> NodeId {
        let kind = self.node(id).kind.clone();
        let copy = self.push(kind);
        let children = self.node(id).children.clone();
        for child in children {
            let child_copy = self.clone_subtree(child);
            self.append_child(copy, child_copy);
        }
        copy
    }

    // ---- traversal -------------------------------------------------------

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id).children.clone()
    }

    pub fn child_elements(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id)
            .children
            .iter()
            .copied()
            .filter(|&c| self.is_element(c))
            .collect()
    }

    /// Element siblings, excluding `id` itself.
    pub fn siblings(&self, id: NodeId) -> Vec<NodeId> {
        let Some(parent) = self.node(id).parent else {
            return Vec::new();
        };
        self.node(parent)
            .children
            .iter()
            .copied()
            .filter(|&c| c != id && self.is_element(c))
            .collect()
    }

    /// Number of preceding element siblings, i.e. the element index of `id`
    /// within its parent.
    pub fn element_index(&self, id: NodeId) -> usize {
        let Some(parent) = self.node(id).parent else {
            return 0;
        };
        self.node(parent)
            .children
            .iter()
            .take_while(|&&c| c != id)
            .filter(|&&c| self.is_element(c))
            .count()
    }

    /// Preorder descendants of `id`, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.node(id).children.iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.node(next).children.iter().rev().copied());
        }
        out
    }

    /// Descendant elements matching a predicate, in document order.
    pub fn find<F>(&self, root: NodeId, pred: F) -> Vec<NodeId>
    where
        F: Fn(&Fragment, NodeId) -> bool,
    {
        self.descendants(root)
            .into_iter()
            .filter(|&id| self.is_element(id) && pred(self, id))
            .collect()
    }

    /// Descendant elements matching a comma-separated simple selector.
    pub fn select(&self, root: NodeId, selector: &Selector) -> Vec<NodeId> {
        self.find(root, |frag, id| selector.matches(frag, id))
    }

    pub fn select_first(&self, root: NodeId, selector: &Selector) -> Option<NodeId> {
        self.select(root, selector).into_iter().next()
    }

    /// Nearest ancestor-or-self element matching the predicate.
    pub fn closest<F>(&self, id: NodeId, pred: F) -> Option<NodeId>
    where
        F: Fn(&Fragment, NodeId) -> bool,
    {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if current == self.root {
                return None;
            }
            if self.is_element(current) && pred(self, current) {
                return Some(current);
            }
            cursor = self.node(current).parent;
        }
        None
    }

    // ---- text ------------------------------------------------------------

    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.node(id).kind, NodeKind::Text(_))
    }

    /// Descendant text nodes in document order.
    pub fn text_nodes(&self, id: NodeId) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|&d| self.is_text(d))
            .collect()
    }

    pub fn text_value(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Text(text) => Some(text),
            NodeKind::Element(_) => None,
        }
    }

    pub fn set_text_value(&mut self, id: NodeId, text: &str) {
        if let NodeKind::Text(value) = &mut self.node_mut(id).kind {
            *value = text.to_string();
        }
    }

    /// Concatenated text content of the subtree.
    pub fn text(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        match &self.node(id).kind {
            NodeKind::Text(text) => out.push_str(text),
            NodeKind::Element(_) => {
                for &child in &self.node(id).children {
                    self.collect_text(child, out);
                }
            }
        }
    }

    /// Replaces the subtree's content with a single text node.
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        let children = self.node(id).children.clone();
        for child in children {
            self.detach(child);
        }
        let text_node = self.create_text(text);
        self.append_child(id, text_node);
    }

    // ---- attributes and classes -------------------------------------------

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?.attrs.get(name).map(String::as_str)
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        if let Some(el) = self.element_mut(id) {
            el.attrs.insert(name.to_string(), value.to_string());
        }
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) {
        if let Some(el) = self.element_mut(id) {
            el.attrs.remove(name);
        }
    }

    pub fn classes(&self, id: NodeId) -> Vec<String> {
        self.attr(id, "class")
            .map(|value| value.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn first_class(&self, id: NodeId) -> Option<String> {
        self.attr(id, "class")
            .and_then(|value| value.split_whitespace().next())
            .map(str::to_string)
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.attr(id, "class")
            .map(|value| value.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) {
        if self.has_class(id, class) {
            return;
        }
        let mut value = self.attr(id, "class").unwrap_or_default().to_string();
        if !value.is_empty() {
            value.push(' ');
        }
        value.push_str(class);
        self.set_attr(id, "class", &value);
    }

    pub fn remove_class(&mut self, id: NodeId, class: &str) {
        let Some(existing) = self.attr(id, "class") else {
            return;
        };
        let value = existing
            .split_whitespace()
            .filter(|&c| c != class)
            .collect::<Vec<_>>()
            .join(" ");
        self.set_attr(id, "class", &value);
    }

    pub fn set_class(&mut self, id: NodeId, value: &str) {
        self.set_attr(id, "class", value);
    }

    // ---- visibility --------------------------------------------------------

    /// Hides a node via an inline `display:none`, preserving other inline
    /// style declarations.
    pub fn hide(&mut self, id: NodeId) {
        if self.is_hidden(id) {
            return;
        }
        let mut style = self.attr(id, "style").unwrap_or_default().to_string();
        if !style.is_empty() && !style.trim_end().ends_with(';') {
            style.push(';');
        }
        style.push_str("display:none");
        self.set_attr(id, "style", &style);
    }

    pub fn show(&mut self, id: NodeId) {
        let Some(existing) = self.attr(id, "style") else {
            return;
        };
        let style = existing
            .split(';')
            .map(str::trim)
            .filter(|decl| !decl.is_empty() && !is_display_none(decl))
            .collect::<Vec<_>>()
            .join(";");
        if style.is_empty() {
            self.remove_attr(id, "style");
        } else {
            self.set_attr(id, "style", &style);
        }
    }

    pub fn set_visible(&mut self, id: NodeId, visible: bool) {
        if visible {
            self.show(id);
        } else {
            self.hide(id);
        }
    }

    /// Whether the node itself carries `display:none`.
    pub fn is_hidden(&self, id: NodeId) -> bool {
        self.attr(id, "style")
            .map(|style| style.split(';').any(|decl| is_display_none(decl.trim())))
            .unwrap_or(false)
    }

    /// Whether the node and all its ancestors are displayed.
    pub fn is_visible(&self, id: NodeId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if self.is_hidden(current) {
                return false;
            }
            cursor = self.node(current).parent;
        }
        true
    }

    // ---- serialization -----------------------------------------------------

    /// Serializes the whole fragment (the synthetic root is transparent).
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for &child in &self.node(self.root).children {
            self.write_node(child, &mut out);
        }
        out
    }

    /// Serializes a single subtree.
    pub fn node_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(id, &mut out);
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        match &self.node(id).kind {
            NodeKind::Text(text) => out.push_str(text),
            NodeKind::Element(el) => {
                out.push('<');
                out.push_str(&el.tag);
                for (name, value) in &el.attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&value.replace('"', "&quot;"));
                    out.push('"');
                }
                out.push('>');
                if VOID_ELEMENTS.contains(&el.tag.as_str()) {
                    return;
                }
                for &child in &self.node(id).children {
                    self.write_node(child, out);
                }
                out.push_str("</");
                out.push_str(&el.tag);
                out.push('>');
            }
        }
    }
}

fn is_display_none(decl: &str) -> bool {
    let Some((prop, value)) = decl.split_once(':') else {
        return false;
    };
    prop.trim().eq_ignore_ascii_case("display") && value.trim().eq_ignore_ascii_case("none")
}

// ---- selectors -------------------------------------------------------------

/// A comma-separated list of simple selectors (`tag`, `.class`,
/// `tag.class.other`). Combinators are expressed in code with
/// [`Fragment::closest`] and parent checks, which is all the fixed
/// dictionary schema needs.
#[derive(Debug, Clone)]
pub struct Selector {
    alternatives: Vec<Simple>,
}

#[derive(Debug, Clone)]
struct Simple {
    tag: Option<String>,
    classes: Vec<String>,
}

impl Selector {
    pub fn parse(input: &str) -> Self {
        let alternatives = input
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                let mut tag = None;
                let mut classes = Vec::new();
                for (i, piece) in part.split('.').enumerate() {
                    if i == 0 {
                        if !piece.is_empty() {
                            tag = Some(piece.to_ascii_lowercase());
                        }
                    } else if !piece.is_empty() {
                        classes.push(piece.to_string());
                    }
                }
                Simple { tag, classes }
            })
            .collect();
        Self { alternatives }
    }

    pub fn matches(&self, frag: &Fragment, id: NodeId) -> bool {
        let Some(tag) = frag.tag(id) else {
            return false;
        };
        self.alternatives.iter().any(|simple| {
            if let Some(expected) = &simple.tag {
                if expected != tag {
                    return false;
                }
            }
            simple.classes.iter().all(|class| frag.has_class(id, class))
        })
    }
}

// ---- parser -----------------------------------------------------------------

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
    frag: Fragment,
    stack: Vec<NodeId>,
}

impl<'a> Parser<'a> {
    fn new(html: &'a str) -> Self {
        let mut frag = Fragment {
            nodes: Vec::new(),
            root: NodeId(0),
        };
        let root = frag.push(NodeKind::Element(Element {
            tag: "#fragment".to_string(),
            attrs: BTreeMap::new(),
        }));
        frag.root = root;
        Self {
            input: html.as_bytes(),
            pos: 0,
            frag,
            stack: vec![root],
        }
    }

    fn run(mut self) -> Fragment {
        while self.pos < self.input.len() {
            if self.input[self.pos] == b'<' {
                self.tag_or_text();
            } else {
                self.text();
            }
        }
        self.frag
    }

    fn current(&self) -> NodeId {
        *self.stack.last().expect("root never popped")
    }

    fn text(&mut self) {
        let start = self.pos;
        while self.pos < self.input.len() && self.input[self.pos] != b'<' {
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.input[start..self.pos])
            .unwrap_or_default()
            .to_string();
        if !text.is_empty() {
            let parent = self.current();
            let node = self.frag.create_text(&text);
            self.frag.append_child(parent, node);
        }
    }

    fn tag_or_text(&mut self) {
        if self.input[self.pos..].starts_with(b"<!--") {
            self.comment();
        } else if self.input[self.pos..].starts_with(b"</") {
            self.end_tag();
        } else if self
            .input
            .get(self.pos + 1)
            .map(|b| b.is_ascii_alphabetic() || *b == b'!')
            .unwrap_or(false)
        {
            self.start_tag();
        } else {
            // A bare '<' in text.
            let parent = self.current();
            let node = self.frag.create_text("<");
            self.frag.append_child(parent, node);
            self.pos += 1;
        }
    }

    fn comment(&mut self) {
        self.pos += 4;
        while self.pos < self.input.len() && !self.input[self.pos..].starts_with(b"-->") {
            self.pos += 1;
        }
        self.pos = (self.pos + 3).min(self.input.len());
    }

    fn end_tag(&mut self) {
        self.pos += 2;
        let name = self.read_name().to_ascii_lowercase();
        while self.pos < self.input.len() && self.input[self.pos] != b'>' {
            self.pos += 1;
        }
        self.pos = (self.pos + 1).min(self.input.len());
        if let Some(depth) = self
            .stack
            .iter()
            .rposition(|&id| self.frag.tag(id) == Some(name.as_str()))
        {
            // Close everything the stray markup left open.
            if depth > 0 {
                self.stack.truncate(depth);
            }
        }
    }

    fn start_tag(&mut self) {
        self.pos += 1;
        if self.input[self.pos] == b'!' {
            // Doctype or bogus declaration: skip to '>'.
            while self.pos < self.input.len() && self.input[self.pos] != b'>' {
                self.pos += 1;
            }
            self.pos = (self.pos + 1).min(self.input.len());
            return;
        }
        let name = self.read_name().to_ascii_lowercase();
        let mut attrs = BTreeMap::new();
        let mut self_closing = false;
        loop {
            self.skip_whitespace();
            match self.input.get(self.pos) {
                None => break,
                Some(b'>') => {
                    self.pos += 1;
                    break;
                }
                Some(b'/') => {
                    self.pos += 1;
                    if self.input.get(self.pos) == Some(&b'>') {
                        self.pos += 1;
                        self_closing = true;
                        break;
                    }
                }
                Some(_) => {
                    let attr_name = self.read_name().to_ascii_lowercase();
                    if attr_name.is_empty() {
                        self.pos += 1;
                        continue;
                    }
                    self.skip_whitespace();
                    let value = if self.input.get(self.pos) == Some(&b'=') {
                        self.pos += 1;
                        self.skip_whitespace();
                        self.read_attr_value()
                    } else {
                        String::new()
                    };
                    attrs.insert(attr_name, value);
                }
            }
        }
        let parent = self.current();
        let node = self.frag.push(NodeKind::Element(Element {
            tag: name.clone(),
            attrs,
        }));
        self.frag.append_child(parent, node);
        if RAW_TEXT_ELEMENTS.contains(&name.as_str()) {
            self.raw_text(node, &name);
            return;
        }
        if !self_closing && !VOID_ELEMENTS.contains(&name.as_str()) {
            self.stack.push(node);
        }
    }

    fn raw_text(&mut self, node: NodeId, tag: &str) {
        let close = format!("</{tag}");
        let start = self.pos;
        while self.pos < self.input.len() {
            if self.input[self.pos..]
                .to_ascii_lowercase()
                .starts_with(close.as_bytes())
            {
                break;
            }
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.input[start..self.pos])
            .unwrap_or_default()
            .to_string();
        if !text.is_empty() {
            let text_node = self.frag.create_text(&text);
            self.frag.append_child(node, text_node);
        }
        while self.pos < self.input.len() && self.input[self.pos] != b'>' {
            self.pos += 1;
        }
        self.pos = (self.pos + 1).min(self.input.len());
    }

    fn read_name(&mut self) -> String {
        let start = self.pos;
        while self.pos < self.input.len() {
            let b = self.input[self.pos];
            if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b':' {
                self.pos += 1;
            } else {
                break;
            }
        }
        String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()
    }

    fn read_attr_value(&mut self) -> String {
        match self.input.get(self.pos) {
            Some(&quote @ (b'"' | b'\'')) => {
                self.pos += 1;
                let start = self.pos;
                while self.pos < self.input.len() && self.input[self.pos] != quote {
                    self.pos += 1;
                }
                let value = String::from_utf8_lossy(&self.input[start..self.pos]).into_owned();
                self.pos = (self.pos + 1).min(self.input.len());
                value.replace("&quot;", "\"")
            }
            _ => {
                let start = self.pos;
                while self.pos < self.input.len()
                    && !self.input[self.pos].is_ascii_whitespace()
                    && self.input[self.pos] != b'>'
                {
                    self.pos += 1;
                }
                String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()
            }
        }
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.input.len() && self.input[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_roundtrip_preserves_structure() {
        let html = r#"<div class="lexfold"><span class="hwd">break</span><td class="header">x</td></div>"#;
        let frag = Fragment::parse(html);
        assert_eq!(frag.to_html(), html);
    }

    #[test]
    fn selector_matches_tag_and_class() {
        let frag = Fragment::parse(r#"<div class="sense big"><span class="sensenum">1</span></div>"#);
        let sel = Selector::parse(".sensenum, .missing");
        let hits = frag.select(frag.root(), &sel);
        assert_eq!(hits.len(), 1);
        assert_eq!(frag.text(hits[0]), "1");

        let compound = Selector::parse("div.sense.big");
        assert_eq!(frag.select(frag.root(), &compound).len(), 1);
        assert!(frag.select(frag.root(), &Selector::parse("div.other")).is_empty());
    }

    #[test]
    fn closest_finds_ancestor_not_self_text() {
        let frag = Fragment::parse(r#"<div class="entry"><p class="sense"><b>x</b></p></div>"#);
        let b = frag.select_first(frag.root(), &Selector::parse("b")).unwrap();
        let sense = frag.closest(b, |f, id| f.has_class(id, "sense")).unwrap();
        assert_eq!(frag.tag(sense), Some("p"));
        assert!(frag.closest(b, |f, id| f.has_class(id, "absent")).is_none());
    }

    #[test]
    fn stray_end_tags_are_tolerated() {
        let frag = Fragment::parse("<div><span>a</i></span>b</div></p>");
        assert_eq!(frag.text(frag.root()), "ab");
    }

    #[test]
    fn hide_and_show_preserve_other_declarations() {
        let mut frag = Fragment::parse(r#"<div style="color:red"><b>x</b></div>"#);
        let div = frag.select_first(frag.root(), &Selector::parse("div")).unwrap();
        frag.hide(div);
        assert!(frag.is_hidden(div));
        assert!(frag.attr(div, "style").unwrap().contains("color:red"));
        frag.show(div);
        assert!(!frag.is_hidden(div));
        assert_eq!(frag.attr(div, "style"), Some("color:red"));
    }

    #[test]
    fn visibility_considers_ancestors() {
        let mut frag = Fragment::parse("<div><span>x</span></div>");
        let div = frag.select_first(frag.root(), &Selector::parse("div")).unwrap();
        let span = frag.select_first(frag.root(), &Selector::parse("span")).unwrap();
        assert!(frag.is_visible(span));
        frag.hide(div);
        assert!(!frag.is_hidden(span));
        assert!(!frag.is_visible(span));
    }

    #[test]
    fn wrap_moves_node_inside_wrapper() {
        let mut frag = Fragment::parse(r#"<div><span class="wfwd">happy</span></div>"#);
        let span = frag
            .select_first(frag.root(), &Selector::parse(".wfwd"))
            .unwrap();
        let anchor = frag.create_element("a");
        frag.set_attr(anchor, "href", "/happy");
        frag.wrap(span, anchor);
        assert_eq!(
            frag.to_html(),
            r#"<div><a href="/happy"><span class="wfwd">happy</span></a></div>"#
        );
    }

    #[test]
    fn clone_subtree_is_detached_and_deep() {
        let mut frag = Fragment::parse(r#"<div class="section"><b class="exp">tag</b>body</div>"#);
        let div = frag.select_first(frag.root(), &Selector::parse(".section")).unwrap();
        let copy = frag.clone_subtree(div);
        assert!(frag.parent(copy).is_none());
        assert_eq!(frag.node_html(copy), frag.node_html(div));
        // Mutating the copy leaves the original alone.
        frag.set_class(copy, "content");
        assert!(frag.has_class(div, "section"));
    }

    #[test]
    fn void_and_raw_text_elements() {
        let frag = Fragment::parse("<p>a<br>b</p><script>if (1 < 2) {}</script>");
        assert_eq!(
            frag.to_html(),
            "<p>a<br>b</p><script>if (1 < 2) {}</script>"
        );
    }

    #[test]
    fn element_index_counts_element_siblings_only() {
        let frag = Fragment::parse("<div>text<span>a</span> <span>b</span></div>");
        let spans = frag.select(frag.root(), &Selector::parse("span"));
        assert_eq!(frag.element_index(spans[0]), 0);
        assert_eq!(frag.element_index(spans[1]), 1);
    }
}
