use once_cell::sync::Lazy;
use regex::Regex;

use super::tree::{local_name, XmlTree};
use super::wml::{
    COMMENTS_PART, COMMENTS_REL_TYPE, COMMENTS_TARGET, REL_NS, WML_COMMENTS_CONTENT_TYPE,
    XML_DECL,
};
use crate::error::MergeError;

static RID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^rId(\d+)$").expect("rid"));

/// Body of a document relationships part created for packages that have none.
pub fn empty_relationships_xml() -> String {
    format!("{XML_DECL}\r\n<Relationships xmlns=\"{REL_NS}\"></Relationships>")
}

/// Element name for a new child of `tree`'s root, reusing the prefix the root itself uses.
fn sibling_name(tree: &XmlTree, local: &str) -> String {
    match tree.element_name(tree.root()).and_then(|n| n.rsplit_once(':')) {
        Some((prefix, _)) => format!("{prefix}:{local}"),
        None => local.to_string(),
    }
}

fn children_named<'a>(tree: &'a XmlTree, local: &'a str) -> impl Iterator<Item = usize> + 'a {
    tree.element_children(tree.root())
        .filter(move |c| tree.element_name(*c).is_some_and(|n| local_name(n) == local))
}

/// Adds an `Override` for the comments part unless one exists. Returns whether it changed.
pub fn ensure_comments_content_type(types: &mut XmlTree) -> bool {
    let part_name = format!("/{COMMENTS_PART}");
    let present = children_named(types, "Override").any(|o| {
        types
            .attr(o, "PartName")
            .is_some_and(|p| p.eq_ignore_ascii_case(&part_name))
    });
    if present {
        return false;
    }
    let name = sibling_name(types, "Override");
    let node = types.create_element(
        &name,
        &[
            ("PartName", part_name.as_str()),
            ("ContentType", WML_COMMENTS_CONTENT_TYPE),
        ],
    );
    let root = types.root();
    types.append_child(root, node);
    true
}

/// Next free `rIdN`, one above the highest numeric id present.
pub fn next_relationship_id(rels: &XmlTree) -> anyhow::Result<String> {
    let max = children_named(rels, "Relationship")
        .filter_map(|r| rels.attr(r, "Id"))
        .filter_map(|id| {
            RID_RE
                .captures(id.trim())
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<u64>().ok())
        })
        .max()
        .unwrap_or(0);
    let next = max.checked_add(1).ok_or_else(|| {
        MergeError::InvalidPackage(format!("relationship id rId{max} leaves no room for a new id"))
    })?;
    Ok(format!("rId{next}"))
}

/// Adds a comments relationship unless one of that type exists. Returns the id it added.
pub fn ensure_comments_relationship(rels: &mut XmlTree) -> anyhow::Result<Option<String>> {
    let present = children_named(rels, "Relationship")
        .any(|r| rels.attr(r, "Type").as_deref() == Some(COMMENTS_REL_TYPE));
    if present {
        return Ok(None);
    }
    let id = next_relationship_id(rels)?;
    let name = sibling_name(rels, "Relationship");
    let node = rels.create_element(
        &name,
        &[
            ("Id", id.as_str()),
            ("Type", COMMENTS_REL_TYPE),
            ("Target", COMMENTS_TARGET),
        ],
    );
    let root = rels.root();
    rels.append_child(root, node);
    Ok(Some(id))
}
