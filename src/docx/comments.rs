use anyhow::Context;

use super::tree::{NodeId, XmlTree};
use super::wml::{WordNames, WML_NS, XML_DECL};
use super::xml::{is_xml_char, strip_invalid_chars};
use crate::error::MergeError;

/// Body of a comments part created for packages that have none.
pub fn empty_comments_xml() -> String {
    format!("{XML_DECL}\r\n<w:comments xmlns:w=\"{WML_NS}\"></w:comments>")
}

/// Sequential comment ids, starting above every id already in use.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommentIds {
    next: u64,
}

impl CommentIds {
    /// Scans `comment` elements of the comments part plus comment markers in the document,
    /// so dangling markers cannot collide either.
    pub fn scan(document: &XmlTree, comments: &XmlTree) -> anyhow::Result<Self> {
        let max_comments = max_id(comments, &["comment"]);
        let max_document = max_id(
            document,
            &["commentRangeStart", "commentRangeEnd", "commentReference"],
        );
        let next = match max_comments.max(max_document) {
            Some(m) => m.checked_add(1).ok_or_else(|| ids_exhausted(m))?,
            None => 0,
        };
        Ok(Self { next })
    }

    /// Fails once the id space is used up rather than reusing an id.
    pub fn next_id(&mut self) -> anyhow::Result<u64> {
        let id = self.next;
        self.next = id.checked_add(1).ok_or_else(|| ids_exhausted(id))?;
        Ok(id)
    }

    pub fn peek(&self) -> u64 {
        self.next
    }
}

fn ids_exhausted(max: u64) -> anyhow::Error {
    MergeError::InvalidPackage(format!("comment id {max} leaves no room for a new id")).into()
}

fn max_id(tree: &XmlTree, locals: &[&str]) -> Option<u64> {
    let names = WordNames::for_tree(tree);
    let id_attr = names.qn("id");
    tree.descendants(tree.root())
        .into_iter()
        .filter(|n| locals.iter().any(|l| names.node_is(tree, *n, l)))
        .filter_map(|n| tree.attr(n, &id_attr))
        .filter_map(|v| v.trim().parse::<u64>().ok())
        .max()
}

#[derive(Clone, Debug)]
pub struct NewComment<'a> {
    pub id: u64,
    pub author: &'a str,
    pub initials: &'a str,
    /// ISO-8601, e.g. `2024-05-01T12:00:00Z`.
    pub date: &'a str,
    pub text: &'a str,
}

/// `[label] text`, or just `text` when the label is absent or blank.
pub fn comment_body(text: &str, edit_type_label: Option<&str>) -> String {
    match edit_type_label.map(str::trim).filter(|l| !l.is_empty()) {
        Some(label) => format!("[{label}] {text}"),
        None => text.to_string(),
    }
}

/// Up to three uppercase initials from the author's words; `R` for a blank name.
pub fn initials(author: &str) -> String {
    let out: String = author
        .split_whitespace()
        .filter_map(|w| w.chars().find(|c| c.is_alphanumeric()))
        .flat_map(char::to_uppercase)
        .take(3)
        .collect();
    if out.is_empty() {
        "R".to_string()
    } else {
        out
    }
}

/// Appends `<w:comment>` with one paragraph: an `annotationRef` run, then the text run.
///
/// Inside that run `\n` and vertical tab become `w:br` and `\t` becomes `w:tab`. Carriage
/// returns and characters XML 1.0 forbids are dropped, here and in the attributes.
pub fn append_comment(comments: &mut XmlTree, comment: &NewComment<'_>) -> NodeId {
    let names = WordNames::for_tree(comments);
    let id = comment.id.to_string();
    let author = strip_invalid_chars(comment.author);
    let date = strip_invalid_chars(comment.date);
    let initials = strip_invalid_chars(comment.initials);
    let (id_q, author_q, date_q, initials_q) = (
        names.qn("id"),
        names.qn("author"),
        names.qn("date"),
        names.qn("initials"),
    );
    let node = comments.create_element(
        &names.qn("comment"),
        &[
            (id_q.as_str(), id.as_str()),
            (author_q.as_str(), author.as_str()),
            (date_q.as_str(), date.as_str()),
            (initials_q.as_str(), initials.as_str()),
        ],
    );

    let p = comments.create_element(&names.qn("p"), &[]);
    let ref_run = comments.create_element(&names.qn("r"), &[]);
    let annotation_ref = comments.create_element(&names.qn("annotationRef"), &[]);
    comments.append_child(ref_run, annotation_ref);
    comments.append_child(p, ref_run);

    let text_run = comments.create_element(&names.qn("r"), &[]);
    let mut segment = String::new();
    for c in comment.text.chars() {
        let mark = match c {
            '\n' | '\u{B}' => "br",
            '\t' => "tab",
            '\r' => continue,
            c => {
                if is_xml_char(c) {
                    segment.push(c);
                }
                continue;
            }
        };
        push_text(comments, &names, text_run, &std::mem::take(&mut segment));
        let mark = comments.create_element(&names.qn(mark), &[]);
        comments.append_child(text_run, mark);
    }
    push_text(comments, &names, text_run, &segment);
    comments.append_child(p, text_run);
    comments.append_child(node, p);

    let root = comments.root();
    comments.append_child(root, node);
    node
}

fn push_text(comments: &mut XmlTree, names: &WordNames, run: NodeId, text: &str) {
    let t = comments.create_element(&names.qn("t"), &[("xml:space", "preserve")]);
    let node = comments.create_text(text);
    comments.append_child(t, node);
    comments.append_child(run, t);
}

/// Puts `commentRangeStart` before `anchor`, `commentRangeEnd` after it, then a run holding
/// the `commentReference`. The anchor itself does not move.
pub fn wrap_anchor(
    document: &mut XmlTree,
    names: &WordNames,
    anchor: NodeId,
    id: u64,
) -> anyhow::Result<()> {
    let id = id.to_string();
    let id_attr = names.qn("id");
    let attrs = [(id_attr.as_str(), id.as_str())];
    let start = document.create_element(&names.qn("commentRangeStart"), &attrs);
    let end = document.create_element(&names.qn("commentRangeEnd"), &attrs);
    let ref_run = document.create_element(&names.qn("r"), &[]);
    let reference = document.create_element(&names.qn("commentReference"), &attrs);
    document.append_child(ref_run, reference);

    document
        .insert_before(anchor, start)
        .context("insert commentRangeStart")?;
    document
        .insert_after(anchor, end)
        .context("insert commentRangeEnd")?;
    document
        .insert_after(end, ref_run)
        .context("insert commentReference run")?;
    Ok(())
}

/// Both halves of a comment: the comments-part entry and the document markers.
pub fn insert_comment(
    document: &mut XmlTree,
    names: &WordNames,
    comments: &mut XmlTree,
    anchor: NodeId,
    comment: &NewComment<'_>,
) -> anyhow::Result<()> {
    wrap_anchor(document, names, anchor, comment.id)?;
    append_comment(comments, comment);
    Ok(())
}
