use anyhow::{anyhow, Context};

use super::xml::{escape_attr, read_events, unescape_attr, write_events, XmlEvent};

/// Handle into an [`XmlTree`] arena. Stays valid for the life of the tree; nodes are never
/// removed, only attached or detached.
pub type NodeId = usize;

#[derive(Clone, Debug)]
pub enum NodeData {
    Element {
        name: String,
        attrs: Vec<(String, String)>,
        self_closing: bool,
    },
    Text(String),
    CData(String),
    /// Declarations, comments, processing instructions and doctypes, kept verbatim.
    Raw(String),
}

#[derive(Clone, Debug)]
pub struct Node {
    pub data: NodeData,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// Mutable arena view of one XML part.
///
/// Everything outside the root element (declaration, whitespace, comments) is kept as
/// top-level nodes so that serialization reproduces the original prolog exactly.
#[derive(Clone, Debug)]
pub struct XmlTree {
    pub name: String,
    nodes: Vec<Node>,
    top: Vec<NodeId>,
    root: NodeId,
}

impl XmlTree {
    pub fn parse(name: &str, xml: &[u8]) -> anyhow::Result<Self> {
        let events = read_events(name, xml).with_context(|| format!("parse xml: {name}"))?;
        Self::from_events(name, events)
    }

    pub fn from_events(name: &str, events: Vec<XmlEvent>) -> anyhow::Result<Self> {
        let part_name = name;
        let mut nodes: Vec<Node> = Vec::with_capacity(events.len());
        let mut top: Vec<NodeId> = Vec::new();
        let mut stack: Vec<NodeId> = Vec::new();
        let mut root: Option<NodeId> = None;

        fn attach(
            nodes: &mut Vec<Node>,
            top: &mut Vec<NodeId>,
            stack: &[NodeId],
            data: NodeData,
        ) -> NodeId {
            let id = nodes.len();
            let parent = stack.last().copied();
            nodes.push(Node {
                data,
                parent,
                children: Vec::new(),
            });
            match parent {
                Some(p) => nodes[p].children.push(id),
                None => top.push(id),
            }
            id
        }

        for ev in events {
            match ev {
                XmlEvent::Start { name, attrs } => {
                    if stack.is_empty() && root.is_some() {
                        return Err(anyhow!("{}: more than one root element", part_name));
                    }
                    let id = attach(
                        &mut nodes,
                        &mut top,
                        &stack,
                        NodeData::Element {
                            name,
                            attrs,
                            self_closing: false,
                        },
                    );
                    if stack.is_empty() {
                        root = Some(id);
                    }
                    stack.push(id);
                }
                XmlEvent::Empty { name, attrs } => {
                    if stack.is_empty() && root.is_some() {
                        return Err(anyhow!("{}: more than one root element", part_name));
                    }
                    let id = attach(
                        &mut nodes,
                        &mut top,
                        &stack,
                        NodeData::Element {
                            name,
                            attrs,
                            self_closing: true,
                        },
                    );
                    if stack.is_empty() {
                        root = Some(id);
                    }
                }
                XmlEvent::End { name } => {
                    let open = stack
                        .pop()
                        .with_context(|| format!("{}: unexpected </{name}>", part_name))?;
                    let open_name = match &nodes[open].data {
                        NodeData::Element { name, .. } => name.as_str(),
                        _ => "",
                    };
                    if open_name != name {
                        return Err(anyhow!(
                            "{}: </{name}> closes <{open_name}>",
                            part_name
                        ));
                    }
                }
                XmlEvent::Text(text) => {
                    attach(&mut nodes, &mut top, &stack, NodeData::Text(text));
                }
                XmlEvent::CData(text) => {
                    attach(&mut nodes, &mut top, &stack, NodeData::CData(text));
                }
                XmlEvent::Raw(markup) => {
                    attach(&mut nodes, &mut top, &stack, NodeData::Raw(markup));
                }
            }
        }

        if let Some(open) = stack.last() {
            return Err(anyhow!(
                "{}: unclosed element <{}>",
                part_name,
                match &nodes[*open].data {
                    NodeData::Element { name, .. } => name.as_str(),
                    _ => "?",
                }
            ));
        }
        let root = root.with_context(|| format!("{}: no root element", part_name))?;
        Ok(Self {
            name: part_name.to_string(),
            nodes,
            top,
            root,
        })
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn element_name(&self, id: NodeId) -> Option<&str> {
        match &self.nodes.get(id)?.data {
            NodeData::Element { name, .. } => Some(name.as_str()),
            _ => None,
        }
    }

    pub fn attrs(&self, id: NodeId) -> &[(String, String)] {
        match &self.nodes[id].data {
            NodeData::Element { attrs, .. } => attrs,
            _ => &[],
        }
    }

    /// Unescaped attribute value.
    pub fn attr(&self, id: NodeId, key: &str) -> Option<String> {
        self.attrs(id)
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| unescape_attr(v))
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn element_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[id]
            .children
            .iter()
            .copied()
            .filter(move |c| matches!(self.nodes[*c].data, NodeData::Element { .. }))
    }

    /// Pre-order walk of `id` and everything below it.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            out.push(cur);
            for c in self.nodes[cur].children.iter().rev() {
                stack.push(*c);
            }
        }
        out
    }

    /// Resolves the prefix bound to `uri` on the root element. `Some("")` means the default
    /// namespace.
    pub fn prefix_for_namespace(&self, uri: &str) -> Option<String> {
        for (k, v) in self.attrs(self.root) {
            if unescape_attr(v) != uri {
                continue;
            }
            if k == "xmlns" {
                return Some(String::new());
            }
            if let Some(prefix) = k.strip_prefix("xmlns:") {
                return Some(prefix.to_string());
            }
        }
        None
    }

    /// Creates a detached element. `attrs` are plain values and get escaped here.
    pub fn create_element(&mut self, name: &str, attrs: &[(&str, &str)]) -> NodeId {
        let attrs = attrs
            .iter()
            .map(|(k, v)| (k.to_string(), escape_attr(v)))
            .collect();
        self.push_detached(NodeData::Element {
            name: name.to_string(),
            attrs,
            self_closing: true,
        })
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push_detached(NodeData::Text(text.to_string()))
    }

    fn push_detached(&mut self, data: NodeData) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            data,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
    }

    pub fn insert_before(&mut self, reference: NodeId, new: NodeId) -> anyhow::Result<()> {
        self.insert_at_offset(reference, new, 0)
    }

    pub fn insert_after(&mut self, reference: NodeId, new: NodeId) -> anyhow::Result<()> {
        self.insert_at_offset(reference, new, 1)
    }

    fn insert_at_offset(&mut self, reference: NodeId, new: NodeId, offset: usize) -> anyhow::Result<()> {
        self.detach(new);
        let parent = self.nodes[reference]
            .parent
            .with_context(|| format!("{}: reference node {reference} is detached", self.name))?;
        let pos = self.nodes[parent]
            .children
            .iter()
            .position(|c| *c == reference)
            .with_context(|| format!("{}: node {reference} missing from its parent", self.name))?;
        self.nodes[parent].children.insert(pos + offset, new);
        self.nodes[new].parent = Some(parent);
        Ok(())
    }

    fn detach(&mut self, id: NodeId) {
        if let Some(p) = self.nodes[id].parent.take() {
            self.nodes[p].children.retain(|c| *c != id);
        }
    }

    pub fn to_events(&self) -> Vec<XmlEvent> {
        let mut events = Vec::with_capacity(self.nodes.len() * 2);
        for id in &self.top {
            self.emit(*id, &mut events);
        }
        events
    }

    fn emit(&self, id: NodeId, out: &mut Vec<XmlEvent>) {
        let node = &self.nodes[id];
        match &node.data {
            NodeData::Element {
                name,
                attrs,
                self_closing,
            } => {
                if node.children.is_empty() && *self_closing {
                    out.push(XmlEvent::Empty {
                        name: name.clone(),
                        attrs: attrs.clone(),
                    });
                    return;
                }
                out.push(XmlEvent::Start {
                    name: name.clone(),
                    attrs: attrs.clone(),
                });
                for c in &node.children {
                    self.emit(*c, out);
                }
                out.push(XmlEvent::End { name: name.clone() });
            }
            NodeData::Text(text) => out.push(XmlEvent::Text(text.clone())),
            NodeData::CData(text) => out.push(XmlEvent::CData(text.clone())),
            NodeData::Raw(markup) => out.push(XmlEvent::Raw(markup.clone())),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        write_events(&self.to_events())
    }
}

/// Local part of a qualified name (`w:p` -> `p`).
pub fn local_name(name: &str) -> &str {
    name.rsplit_once(':').map(|(_, l)| l).unwrap_or(name)
}
