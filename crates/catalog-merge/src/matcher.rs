//! Case-insensitive text matchers used by the column filters.
//!
//! Three variants cover every filter:
//!
//! - [`Matcher::Contains`]: free substring match.
//! - [`Matcher::DelimitedToken`]: the needle must be bounded on both sides by the start/end of
//!   the cell, a comma, or whitespace. This is membership in a `"a, b c"` style list cell.
//! - [`Matcher::WholeWord`]: the needle must not be glued to another word character, so `12`
//!   matches `"12 سال"` but not `"120"`.
//!
//! Both sides are lower-cased before matching; a missing cell never matches.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    Contains(String),
    DelimitedToken(String),
    WholeWord(String),
}

impl Matcher {
    pub fn contains(needle: &str) -> Self {
        Matcher::Contains(needle.to_lowercase())
    }

    pub fn delimited_token(needle: &str) -> Self {
        Matcher::DelimitedToken(needle.to_lowercase())
    }

    pub fn whole_word(needle: &str) -> Self {
        Matcher::WholeWord(needle.to_lowercase())
    }

    pub fn needle(&self) -> &str {
        match self {
            Matcher::Contains(n) | Matcher::DelimitedToken(n) | Matcher::WholeWord(n) => n,
        }
    }

    pub fn matches(&self, cell: Option<&str>) -> bool {
        let Some(cell) = cell else {
            return false;
        };
        let haystack = cell.to_lowercase();
        match self {
            Matcher::Contains(needle) => haystack.contains(needle.as_str()),
            Matcher::DelimitedToken(needle) => {
                bounded_match(&haystack, needle, |c| c == ',' || c.is_whitespace())
            },
            Matcher::WholeWord(needle) => bounded_match(&haystack, needle, |c| !is_word_char(c)),
        }
    }
}

#[inline]
fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Finds an occurrence of `needle` whose neighbours (if any) satisfy `is_boundary`.
fn bounded_match<F>(haystack: &str, needle: &str, is_boundary: F) -> bool
where
    F: Fn(char) -> bool,
{
    if needle.is_empty() {
        return false;
    }
    // overlapping candidates are checked too, so walk every char offset
    haystack
        .char_indices()
        .map(|(start, _)| start)
        .filter(|&start| haystack[start..].starts_with(needle))
        .any(|start| {
            let end = start + needle.len();
            let before_ok = haystack[..start].chars().next_back().is_none_or(&is_boundary);
            let after_ok = haystack[end..].chars().next().is_none_or(&is_boundary);
            before_ok && after_ok
        })
}
