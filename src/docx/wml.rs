//! Package paths, namespaces, content types and relationship types used by the merge.

use super::tree::{local_name, NodeId, XmlTree};

pub const DOCUMENT_PART: &str = "word/document.xml";
pub const COMMENTS_PART: &str = "word/comments.xml";
pub const DOCUMENT_RELS_PART: &str = "word/_rels/document.xml.rels";
pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
pub const PACKAGE_RELS_PART: &str = "_rels/.rels";

/// Relationship target of the comments part, relative to `word/`.
pub const COMMENTS_TARGET: &str = "comments.xml";

pub const WML_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
pub const REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
pub const CT_NS: &str = "http://schemas.openxmlformats.org/package/2006/content-types";

pub const WML_COMMENTS_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.comments+xml";
pub const COMMENTS_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/comments";

pub const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

/// Qualified-name helper for the WordprocessingML main namespace of one tree.
#[derive(Clone, Debug)]
pub struct WordNames {
    prefix: String,
}

impl WordNames {
    /// Uses the prefix the tree's root binds to the main namespace; `w` when undeclared.
    pub fn for_tree(tree: &XmlTree) -> Self {
        Self {
            prefix: tree
                .prefix_for_namespace(WML_NS)
                .unwrap_or_else(|| "w".to_string()),
        }
    }

    pub fn qn(&self, local: &str) -> String {
        if self.prefix.is_empty() {
            local.to_string()
        } else {
            format!("{}:{local}", self.prefix)
        }
    }

    /// True when `name` is `local` in the main namespace.
    pub fn is(&self, name: &str, local: &str) -> bool {
        self.in_namespace(name) && local_name(name) == local
    }

    pub fn in_namespace(&self, name: &str) -> bool {
        match name.rsplit_once(':') {
            Some((p, _)) => p == self.prefix,
            None => self.prefix.is_empty(),
        }
    }

    pub fn node_is(&self, tree: &XmlTree, id: NodeId, local: &str) -> bool {
        tree.element_name(id).is_some_and(|n| self.is(n, local))
    }
}
