use super::tree::{NodeData, NodeId, XmlTree};
use super::wml::WordNames;

/// Plain text of a paragraph: `t` content verbatim, `tab` as `\t`, `br`/`cr` as `\n`.
///
/// Walks every descendant, so runs nested in `ins`, `hyperlink`, `smartTag` and similar
/// wrappers count. Property subtrees (`pPr`, `rPr`) only hold tab stops and formatting and
/// are skipped, as is `mc:Fallback` content which duplicates its `mc:Choice`.
pub fn paragraph_text(tree: &XmlTree, names: &WordNames, paragraph: NodeId) -> String {
    let mut out = String::new();
    push_text(tree, names, paragraph, &mut out);
    out
}

/// Character count contributed by the subtree at `id`, using the same rules as
/// [`paragraph_text`].
pub fn subtree_text_len(tree: &XmlTree, names: &WordNames, id: NodeId) -> usize {
    let mut out = String::new();
    push_text(tree, names, id, &mut out);
    out.chars().count()
}

fn push_text(tree: &XmlTree, names: &WordNames, id: NodeId, out: &mut String) {
    let Some(name) = tree.element_name(id) else {
        return;
    };
    if names.in_namespace(name) {
        match super::tree::local_name(name) {
            "pPr" | "rPr" => return,
            "t" => {
                for c in tree.children(id) {
                    match &tree.node(*c).data {
                        NodeData::Text(t) | NodeData::CData(t) => out.push_str(t),
                        _ => {}
                    }
                }
                return;
            }
            "tab" => {
                out.push('\t');
                return;
            }
            "br" | "cr" => {
                out.push('\n');
                return;
            }
            _ => {}
        }
    } else if name.ends_with(":Fallback") {
        return;
    }
    for c in tree.children(id) {
        push_text(tree, names, *c, out);
    }
}

#[derive(Clone, Debug)]
pub struct IndexedParagraph {
    pub node: NodeId,
    pub text: String,
}

/// Document-order paragraphs with text snapshots taken before any mutation.
///
/// Texts are a cache of [`paragraph_text`] and are never refreshed during a merge run, so
/// markers inserted for one record cannot shift the offsets chosen for later ones.
#[derive(Clone, Debug, Default)]
pub struct ParagraphIndex {
    entries: Vec<IndexedParagraph>,
}

impl ParagraphIndex {
    pub fn build(tree: &XmlTree, names: &WordNames) -> Self {
        let entries = tree
            .descendants(tree.root())
            .into_iter()
            .filter(|id| names.node_is(tree, *id, "p"))
            .map(|node| IndexedParagraph {
                node,
                text: paragraph_text(tree, names, node),
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&IndexedParagraph> {
        self.entries.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexedParagraph> {
        self.entries.iter()
    }
}
