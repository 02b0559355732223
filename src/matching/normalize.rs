/// Lowercased, whitespace-collapsed, quote-folded text with a map back to the source.
///
/// `index_map[i]` is the character offset in the original string that produced
/// `chars[i]`. The map is non-decreasing and every entry is a valid source offset.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NormalizedText {
    pub text: String,
    pub chars: Vec<char>,
    pub index_map: Vec<usize>,
}

pub fn normalize(input: &str) -> NormalizedText {
    let mut chars: Vec<char> = Vec::with_capacity(input.len());
    let mut index_map: Vec<usize> = Vec::with_capacity(input.len());
    let mut pending_space: Option<usize> = None;

    for (i, ch) in input.chars().enumerate() {
        if ch.is_whitespace() {
            pending_space.get_or_insert(i);
            continue;
        }
        // Leading whitespace is dropped; trailing whitespace is never flushed.
        if let Some(sp) = pending_space.take() {
            if !chars.is_empty() {
                chars.push(' ');
                index_map.push(sp);
            }
        }
        match fold_punctuation(ch) {
            Some(folded) => {
                chars.push(folded);
                index_map.push(i);
            }
            None => {
                for lower in ch.to_lowercase() {
                    chars.push(lower);
                    index_map.push(i);
                }
            }
        }
    }

    NormalizedText {
        text: chars.iter().collect(),
        chars,
        index_map,
    }
}

fn fold_punctuation(ch: char) -> Option<char> {
    match ch {
        '\u{2019}' | '\u{2018}' | '\u{02BC}' | '\u{FF07}' | '\u{201B}' => Some('\''),
        '\u{201C}' | '\u{201D}' => Some('"'),
        '\u{2013}' | '\u{2014}' => Some('-'),
        _ => None,
    }
}

/// Whitespace trim and collapse, without any other change. Used on anchors before scoring.
pub fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl NormalizedText {
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// Character position of the first occurrence of `needle` in the normalized text.
    pub fn find(&self, needle: &str) -> Option<usize> {
        if needle.is_empty() {
            return None;
        }
        let byte = self.text.find(needle)?;
        Some(self.text[..byte].chars().count())
    }

    /// Source offset for a normalized position.
    pub fn original_offset(&self, pos: usize) -> Option<usize> {
        self.index_map.get(pos).copied()
    }

    /// The first `n` normalized characters.
    pub fn head(&self, n: usize) -> String {
        self.chars.iter().take(n).collect()
    }
}
