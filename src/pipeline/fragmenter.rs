use std::borrow::Cow;

/// Rough byte size of a word, used to budget trimmed summaries.
pub const ESTIMATED_WORD_SIZE: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightTags {
    pub open: String,
    pub close: String,
}

impl Default for HighlightTags {
    fn default() -> Self {
        HighlightTags {
            open: "<b>".to_string(),
            close: "</b>".to_string(),
        }
    }
}

/// A candidate snippet: a byte span of the field plus the matched term
/// ranges inside it. Scored by match count, ties to earlier position.
#[derive(Debug, Clone)]
pub struct Fragment {
    pub start: usize,
    pub end: usize,
    pub matches: Vec<(usize, usize)>,
}

impl Fragment {
    pub fn score(&self) -> usize {
        self.matches.len()
    }
}

/// Collapse runs of whitespace to single spaces and trim the tail.
pub fn normalize_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_space = false;
    for c in s.chars() {
        if c.is_whitespace() {
            if !last_space {
                out.push(' ');
                last_space = true;
            }
        } else {
            out.push(c);
            last_space = false;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

fn is_token_separator(c: char) -> bool {
    !(c.is_alphanumeric() || c == '_')
}

/// Snap a byte position left/right to the nearest token separator so
/// fragments never cut through a word.
fn snap_left(text: &str, mut pos: usize) -> usize {
    while pos > 0 && !text.is_char_boundary(pos) {
        pos -= 1;
    }
    while pos > 0 {
        let prev = text[..pos].chars().next_back();
        match prev {
            Some(c) if is_token_separator(c) => break,
            Some(c) => pos -= c.len_utf8(),
            None => break,
        }
    }
    pos
}

fn snap_right(text: &str, mut pos: usize) -> usize {
    while pos < text.len() && !text.is_char_boundary(pos) {
        pos += 1;
    }
    while pos < text.len() {
        let next = text[pos..].chars().next();
        match next {
            Some(c) if is_token_separator(c) => break,
            Some(c) => pos += c.len_utf8(),
            None => break,
        }
    }
    pos
}

/// Cluster matched byte ranges into context windows. `context_bytes` pads
/// each side; overlapping windows merge.
pub fn fragmentize(text: &str, mut ranges: Vec<(usize, usize)>, context_bytes: usize) -> Vec<Fragment> {
    ranges.sort_unstable();
    ranges.retain(|&(s, e)| s < e && e <= text.len());

    let mut frags: Vec<Fragment> = Vec::new();
    for (s, e) in ranges {
        let start = snap_left(text, s.saturating_sub(context_bytes));
        let end = snap_right(text, (e + context_bytes).min(text.len()));
        match frags.last_mut() {
            Some(last) if start <= last.end => {
                last.end = last.end.max(end);
                last.matches.push((s, e));
            }
            _ => frags.push(Fragment {
                start,
                end,
                matches: vec![(s, e)],
            }),
        }
    }
    frags
}

/// Wrap every matched range of `text` with the open/close tags.
pub fn highlight_ranges(text: &str, ranges: &[(usize, usize)], tags: &HighlightTags) -> String {
    let mut sorted: Vec<(usize, usize)> = ranges.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut out = String::with_capacity(text.len() + sorted.len() * 8);
    let mut cursor = 0;
    for (s, e) in sorted {
        if s < cursor || e > text.len() || s >= e {
            continue;
        }
        out.push_str(&text[cursor..s]);
        out.push_str(&tags.open);
        out.push_str(&text[s..e]);
        out.push_str(&tags.close);
        cursor = e;
    }
    out.push_str(&text[cursor..]);
    out
}

/// Render the top fragments, best first by score then position, joined with
/// the separator. Matched ranges are wrapped when tags are given.
pub fn summarize(
    text: &str,
    frags: &[Fragment],
    num_frags: usize,
    separator: &str,
    tags: Option<&HighlightTags>,
) -> String {
    let mut order: Vec<usize> = (0..frags.len()).collect();
    order.sort_by_key(|&i| (std::cmp::Reverse(frags[i].score()), frags[i].start));
    order.truncate(num_frags.max(1));
    // Present the selected fragments in document order.
    order.sort_unstable();

    let mut parts = Vec::with_capacity(order.len());
    for i in order {
        let f = &frags[i];
        let piece: Cow<str> = match tags {
            Some(tags) => {
                let local: Vec<(usize, usize)> = f
                    .matches
                    .iter()
                    .map(|&(s, e)| (s - f.start, e - f.start))
                    .collect();
                Cow::Owned(highlight_ranges(&text[f.start..f.end], &local, tags))
            }
            None => Cow::Borrowed(&text[f.start..f.end]),
        };
        parts.push(normalize_whitespace(&piece));
    }
    parts.join(separator)
}

/// Fallback when no byte offsets are available: take the head of the field
/// up to the budget, stopping at a token separator.
pub fn trim_field(text: &str, context_len: usize, num_frags: usize) -> String {
    let budget = (context_len * num_frags * ESTIMATED_WORD_SIZE + ESTIMATED_WORD_SIZE)
        .min(text.len());
    let cut = snap_left(text, budget);
    let cut = if cut == 0 { budget } else { cut };
    normalize_whitespace(&text[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_highlight_whole_field() {
        let text = "hello cruel world";
        let out = highlight_ranges(text, &[(0, 5), (12, 17)], &HighlightTags::default());
        assert_eq!(out, "<b>hello</b> cruel <b>world</b>");
    }

    #[test]
    fn test_fragmentize_merges_close_matches() {
        let text = "aaa bbb ccc ddd eee fff ggg";
        let frags = fragmentize(text, vec![(4, 7), (8, 11)], 4);
        assert_eq!(frags.len(), 1);
        assert_eq!(frags[0].matches.len(), 2);

        let frags = fragmentize(text, vec![(0, 3), (24, 27)], 2);
        assert_eq!(frags.len(), 2);
    }

    #[test]
    fn test_summarize_orders_by_score() {
        let text = "one two three four five six seven eight nine ten";
        let frags = fragmentize(text, vec![(0, 3), (24, 27), (28, 33)], 3);
        let out = summarize(text, &frags, 1, "...", None);
        // The two-match fragment wins over the lone leading match.
        assert!(out.contains("six seven"));
        assert!(!out.contains("one"));
    }

    #[test]
    fn test_whitespace_normalized() {
        assert_eq!(normalize_whitespace("a  b\t c "), "a b c");
    }

    #[test]
    fn test_trim_field_stops_at_separator() {
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa";
        let out = trim_field(text, 1, 1);
        assert!(out.len() <= 13);
        assert!(!out.ends_with(char::is_alphanumeric) || text.starts_with(&out));
    }
}
