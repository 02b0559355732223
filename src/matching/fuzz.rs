//! Partial-ratio similarity on raw strings.
//!
//! No preprocessing happens here: case, punctuation and quotes all count. Callers decide
//! what cleanup to apply first, so two phrases differing only in their quotation marks never
//! score as identical by accident.

use std::collections::HashMap;

/// Best indel-normalized similarity between the shorter string and any equally long window
/// of the longer one, including windows clipped at either edge. 0..=100.
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    partial_ratio_chars(&a, &b)
}

pub fn partial_ratio_chars(a: &[char], b: &[char]) -> f64 {
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    if short.is_empty() {
        return if long.is_empty() { 100.0 } else { 0.0 };
    }
    let m = short.len();
    let n = long.len();
    let pm = PatternMask::new(short);
    let mut best = 0.0f64;

    let mut consider = |window: &[char]| -> bool {
        let s = score(pm.lcs(window), m, window.len());
        if s > best {
            best = s;
        }
        best >= 100.0
    };

    // Windows clipped at the left edge: only worth scoring when they end on a shared char.
    for end in 1..m.min(n) {
        if pm.contains(long[end - 1]) && consider(&long[..end]) {
            return 100.0;
        }
    }
    for start in 0..=(n - m) {
        if pm.contains(long[start]) && consider(&long[start..start + m]) {
            return 100.0;
        }
    }
    // Windows clipped at the right edge.
    for start in (n - m + 1)..n {
        if pm.contains(long[start]) && consider(&long[start..]) {
            return 100.0;
        }
    }
    best
}

fn score(lcs: usize, len_a: usize, len_b: usize) -> f64 {
    let total = len_a + len_b;
    if total == 0 {
        return 100.0;
    }
    100.0 * (2 * lcs) as f64 / total as f64
}

/// Per-character bit masks of a pattern for bit-parallel LCS (Hyyrö's formulation).
struct PatternMask {
    len: usize,
    words: usize,
    masks: HashMap<char, Vec<u64>>,
    zeros: Vec<u64>,
}

impl PatternMask {
    fn new(pattern: &[char]) -> Self {
        let words = pattern.len().div_ceil(64).max(1);
        let mut masks: HashMap<char, Vec<u64>> = HashMap::new();
        for (i, ch) in pattern.iter().enumerate() {
            let m = masks.entry(*ch).or_insert_with(|| vec![0u64; words]);
            m[i / 64] |= 1u64 << (i % 64);
        }
        Self {
            len: pattern.len(),
            words,
            masks,
            zeros: vec![0u64; words],
        }
    }

    fn contains(&self, ch: char) -> bool {
        self.masks.contains_key(&ch)
    }

    fn lcs(&self, text: &[char]) -> usize {
        let mut s = vec![u64::MAX; self.words];
        for ch in text {
            let m = self.masks.get(ch).unwrap_or(&self.zeros);
            let mut carry = 0u64;
            for w in 0..self.words {
                let u = s[w] & m[w];
                let (sum, c1) = s[w].overflowing_add(u);
                let (sum, c2) = sum.overflowing_add(carry);
                carry = u64::from(c1 || c2);
                s[w] = sum | (s[w] & !m[w]);
            }
        }
        let mut lcs = 0usize;
        for (w, word) in s.iter().enumerate() {
            let bits = (self.len - w * 64).min(64);
            let valid = if bits == 64 { u64::MAX } else { (1u64 << bits) - 1 };
            lcs += (!word & valid).count_ones() as usize;
        }
        lcs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ratio(a: &str, b: &str) -> f64 {
        let a: Vec<char> = a.chars().collect();
        let b: Vec<char> = b.chars().collect();
        score(PatternMask::new(&a).lcs(&b), a.len(), b.len())
    }

    fn naive_lcs(a: &[char], b: &[char]) -> usize {
        let mut dp = vec![vec![0usize; b.len() + 1]; a.len() + 1];
        for i in 1..=a.len() {
            for j in 1..=b.len() {
                dp[i][j] = if a[i - 1] == b[j - 1] {
                    dp[i - 1][j - 1] + 1
                } else {
                    dp[i - 1][j].max(dp[i][j - 1])
                };
            }
        }
        dp[a.len()][b.len()]
    }

    #[test]
    fn bit_parallel_lcs_matches_dynamic_programming() {
        let cases = [
            ("kitten", "sitting"),
            ("", "abc"),
            ("abc", "abc"),
            ("the quick brown fox", "brown fox jumps"),
        ];
        for (a, b) in cases {
            let a: Vec<char> = a.chars().collect();
            let b: Vec<char> = b.chars().collect();
            assert_eq!(PatternMask::new(&a).lcs(&b), naive_lcs(&a, &b), "{a:?} {b:?}");
        }
        // multi-word patterns
        let long_a: Vec<char> = "abcdefghij".repeat(20).chars().collect();
        let long_b: Vec<char> = "acegikbdfh".repeat(17).chars().collect();
        assert_eq!(
            PatternMask::new(&long_a).lcs(&long_b),
            naive_lcs(&long_a, &long_b)
        );
    }

    #[test]
    fn ratio_basics() {
        assert_eq!(ratio("", ""), 100.0);
        assert_eq!(ratio("abc", "abc"), 100.0);
        assert_eq!(ratio("abc", ""), 0.0);
        assert!((ratio("kitten", "sitting") - 100.0 * 8.0 / 13.0).abs() < 1e-9);
    }

    #[test]
    fn contained_phrase_scores_full() {
        let p = "The quick brown fox jumps over the lazy dog.";
        assert_eq!(partial_ratio("brown fox jumps", p), 100.0);
        assert_eq!(partial_ratio(p, "brown fox jumps"), 100.0);
    }

    #[test]
    fn no_implicit_case_or_quote_folding() {
        assert!(partial_ratio("“cozy corner”", "\"cozy corner\"") < 100.0);
        assert!(partial_ratio("Brown", "brown") < 100.0);
    }

    #[test]
    fn edge_windows_are_considered() {
        // the best alignment hangs off the end of the longer string
        // "dog and" against the clipped tail window scores 2*7/(11+7)
        let s = partial_ratio("dog and cat", "the lazy dog and");
        assert!((s - 100.0 * 14.0 / 18.0).abs() < 1e-9, "{s}");
        assert_eq!(partial_ratio("", "abc"), 0.0);
        assert_eq!(partial_ratio("xyz", "abc"), 0.0);
    }

    #[test]
    fn near_miss_scores_high_but_not_full() {
        let s = partial_ratio("brown fax jumps", "The quick brown fox jumps over");
        assert!(s >= 90.0 && s < 100.0, "{s}");
    }
}
