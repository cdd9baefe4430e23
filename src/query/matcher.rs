//! Matching of completion patterns against names.

/// Matches names for code completion: by case-insensitive prefix, or by camel-case
/// abbreviation when the pattern has an upper-case letter after its first character
/// (`gFB` matches `getFooBar`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentAssistMatcher {
    pattern: Vec<u8>,
    segments: Vec<Vec<u8>>,
}

impl ContentAssistMatcher {
    /// Matcher for `pattern`.
    pub fn new(pattern: &str) -> Self {
        let pattern = pattern.as_bytes().to_vec();
        let mut segments: Vec<Vec<u8>> = Vec::new();
        for (index, &byte) in pattern.iter().enumerate() {
            match segments.last_mut() {
                Some(segment) if index == 0 || !byte.is_ascii_uppercase() => segment.push(byte),
                _ => segments.push(vec![byte]),
            }
        }
        Self { pattern, segments }
    }

    /// The pattern.
    pub fn pattern(&self) -> &[u8] {
        &self.pattern
    }

    /// Prefix every match starts with, ignoring case. Index descent uses it to narrow
    /// the candidates before [`ContentAssistMatcher::matches`] confirms them.
    pub fn search_prefix(&self) -> &[u8] {
        self.segments.first().map(Vec::as_slice).unwrap_or_default()
    }

    fn is_camel_case(&self) -> bool {
        self.segments.len() > 1
    }

    /// Returns true if `name` matches the pattern.
    pub fn matches(&self, name: &[u8]) -> bool {
        if name.len() >= self.pattern.len()
            && name[..self.pattern.len()].eq_ignore_ascii_case(&self.pattern)
        {
            return true;
        }
        if !self.is_camel_case() {
            return false;
        }
        let first = self.search_prefix();
        if name.len() < first.len() || !name[..first.len()].eq_ignore_ascii_case(first) {
            return false;
        }
        match_segments(name, first.len(), &self.segments[1..])
    }
}

fn word_starts(name: &[u8], from: usize) -> impl Iterator<Item = usize> + '_ {
    (from.max(1)..name.len()).filter(move |&at| {
        name[at].is_ascii_uppercase() || (name[at - 1] == b'_' && name[at] != b'_')
    })
}

fn match_segments(name: &[u8], from: usize, segments: &[Vec<u8>]) -> bool {
    let Some((segment, rest)) = segments.split_first() else {
        return true;
    };
    word_starts(name, from).any(|start| {
        let end = start + segment.len();
        end <= name.len()
            && name[start..end].eq_ignore_ascii_case(segment)
            && match_segments(name, end, rest)
    })
}
