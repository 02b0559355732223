use std::collections::HashSet;

use serde::Serialize;

use crate::docx::text::subtree_text_len;
use crate::docx::tree::{NodeId, XmlTree};
use crate::docx::wml::WordNames;

use super::fuzz::partial_ratio_chars;
use super::normalize::normalize;

#[derive(Clone, Debug, PartialEq)]
pub struct LocateSettings {
    /// Normalized anchor characters used for the prefix search.
    pub prefix_chars: usize,
    /// Prefixes shorter than this are too ambiguous to search for.
    pub min_prefix_chars: usize,
    pub window_min: usize,
    pub window_max: usize,
    pub window_step: usize,
    /// Normalized anchor characters scored against each window.
    pub anchor_sample_chars: usize,
    pub accept_score: f64,
    pub exact_score: f64,
}

impl Default for LocateSettings {
    fn default() -> Self {
        Self {
            prefix_chars: 80,
            min_prefix_chars: 12,
            window_min: 80,
            window_max: 260,
            window_step: 5,
            anchor_sample_chars: 220,
            accept_score: 60.0,
            exact_score: 98.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StartMethod {
    Substring,
    Prefix,
    Fuzzy,
    None,
}

impl StartMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Substring => "substring",
            Self::Prefix => "prefix",
            Self::Fuzzy => "fuzzy",
            Self::None => "none",
        }
    }
}

/// Approximate character offset of an anchor inside a paragraph's text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ApproxStart {
    pub offset: Option<usize>,
    pub method: StartMethod,
}

impl ApproxStart {
    const NONE: Self = Self {
        offset: None,
        method: StartMethod::None,
    };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AnchorPlacement {
    pub approx_char_offset: Option<usize>,
    pub start_method: StartMethod,
    /// Position among the paragraph's eligible direct children.
    pub anchor_node_index: usize,
    pub anchor_node: NodeId,
}

/// Stage A: substring, then prefix, then a fuzzy window scan, all in normalized space.
pub fn approximate_start(anchor: &str, paragraph_text: &str, settings: &LocateSettings) -> ApproxStart {
    let na = normalize(anchor);
    let np = normalize(paragraph_text);
    if na.is_empty() || np.is_empty() {
        return ApproxStart::NONE;
    }

    if let Some(pos) = np.find(&na.text) {
        return ApproxStart {
            offset: np.original_offset(pos),
            method: StartMethod::Substring,
        };
    }

    let prefix = na.head(settings.prefix_chars);
    if prefix.chars().count() >= settings.min_prefix_chars {
        if let Some(pos) = np.find(&prefix) {
            return ApproxStart {
                offset: np.original_offset(pos),
                method: StartMethod::Prefix,
            };
        }
    }

    let sample: Vec<char> = na.chars.iter().copied().take(settings.anchor_sample_chars).collect();
    let window = na.len().clamp(settings.window_min, settings.window_max.max(settings.window_min));
    let step = settings.window_step.max(1);
    let mut best: Option<(usize, f64)> = None;
    let mut start = 0usize;
    while start < np.len() {
        let end = (start + window).min(np.len());
        let s = partial_ratio_chars(&sample, &np.chars[start..end]);
        if best.map_or(true, |(_, b)| s > b) {
            best = Some((start, s));
        }
        if s >= settings.exact_score || end == np.len() {
            break;
        }
        start += step;
    }
    match best {
        Some((pos, s)) if s >= settings.accept_score => ApproxStart {
            offset: np.original_offset(pos),
            method: StartMethod::Fuzzy,
        },
        _ => ApproxStart::NONE,
    }
}

/// Direct children of a paragraph that comment markers may be placed around.
///
/// Paragraph properties, existing range markers and anything already holding a
/// `commentReference` are excluded, so indices stay stable while comments are added.
pub fn anchor_candidates(tree: &XmlTree, names: &WordNames, paragraph: NodeId) -> Vec<NodeId> {
    tree.element_children(paragraph)
        .filter(|c| {
            let Some(name) = tree.element_name(*c) else {
                return false;
            };
            if names.is(name, "pPr")
                || names.is(name, "commentRangeStart")
                || names.is(name, "commentRangeEnd")
            {
                return false;
            }
            !tree
                .descendants(*c)
                .into_iter()
                .any(|d| names.node_is(tree, d, "commentReference"))
        })
        .collect()
}

/// Stage B: pick the eligible child whose text span contains `offset`, stepping forward past
/// indices already used in this paragraph. Appends a space run when nothing is left.
pub fn select_anchor_node(
    tree: &mut XmlTree,
    names: &WordNames,
    paragraph: NodeId,
    offset: usize,
    used: &mut HashSet<usize>,
) -> (usize, NodeId) {
    let candidates = anchor_candidates(tree, names, paragraph);

    let mut chosen = candidates.len().saturating_sub(1);
    let mut cumulative = 0usize;
    for (i, c) in candidates.iter().enumerate() {
        let len = subtree_text_len(tree, names, *c);
        if offset < cumulative + len {
            chosen = i;
            break;
        }
        cumulative += len;
    }

    while used.contains(&chosen) && chosen < candidates.len() {
        chosen += 1;
    }
    let node = match candidates.get(chosen) {
        Some(node) => *node,
        None => {
            chosen = candidates.len();
            append_space_run(tree, names, paragraph)
        }
    };
    used.insert(chosen);
    (chosen, node)
}

/// `<w:r><w:t xml:space="preserve"> </w:t></w:r>` appended to the paragraph.
pub fn append_space_run(tree: &mut XmlTree, names: &WordNames, paragraph: NodeId) -> NodeId {
    let run = tree.create_element(&names.qn("r"), &[]);
    let t = tree.create_element(&names.qn("t"), &[("xml:space", "preserve")]);
    let space = tree.create_text(" ");
    tree.append_child(t, space);
    tree.append_child(run, t);
    tree.append_child(paragraph, run);
    run
}

/// Stages A and B together. A paragraph whose anchor position cannot be approximated is
/// anchored at offset 0.
pub fn place_anchor(
    tree: &mut XmlTree,
    names: &WordNames,
    paragraph: NodeId,
    paragraph_text: &str,
    anchor: &str,
    used: &mut HashSet<usize>,
    settings: &LocateSettings,
) -> AnchorPlacement {
    let approx = approximate_start(anchor, paragraph_text, settings);
    let (anchor_node_index, anchor_node) =
        select_anchor_node(tree, names, paragraph, approx.offset.unwrap_or(0), used);
    AnchorPlacement {
        approx_char_offset: approx.offset,
        start_method: approx.method,
        anchor_node_index,
        anchor_node,
    }
}
