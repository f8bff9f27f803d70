use std::{collections::BTreeSet, fmt::Display, ops::RangeInclusive};

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use tracing::warn;

lazy_static! {
    static ref CHAPTER_TOKEN_REGEX: Regex = Regex::new(r"^(\d+)(?:-(\d+))?$").unwrap();
}

pub(crate) const DEFAULT_CHAPTERS: RangeInclusive<u32> = 4..=50;
const MAX_CHAPTER_SPAN: u32 = 1000;

/// The set of BLFS chapters a run is restricted to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct ChapterSelection(BTreeSet<u32>);

impl Default for ChapterSelection {
    fn default() -> Self {
        ChapterSelection(DEFAULT_CHAPTERS.collect())
    }
}

impl ChapterSelection {
    /// Builds the selection from a `--chapters` value such as `5,6` or `4-10,12`.
    ///
    /// A missing, empty or malformed list selects every default chapter
    /// instead of failing.
    pub fn parse(value: Option<&str>) -> ChapterSelection {
        let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
            return ChapterSelection::default();
        };
        match Self::parse_list(value) {
            Some(chapters) => ChapterSelection(chapters),
            None => {
                warn!(
                    target: "user-log",
                    "Ignoring malformed chapter list '{}', processing chapters {}-{}",
                    value,
                    DEFAULT_CHAPTERS.start(),
                    DEFAULT_CHAPTERS.end()
                );
                ChapterSelection::default()
            }
        }
    }

    fn parse_list(value: &str) -> Option<BTreeSet<u32>> {
        let mut chapters = BTreeSet::new();
        for token in value.split(',') {
            let captures = CHAPTER_TOKEN_REGEX.captures(token.trim())?;
            let start: u32 = captures.get(1)?.as_str().parse().ok()?;
            let end: u32 = match captures.get(2) {
                Some(end) => end.as_str().parse().ok()?,
                None => start,
            };
            if end < start || end - start > MAX_CHAPTER_SPAN {
                return None;
            }
            chapters.extend(start..=end);
        }
        Some(chapters)
    }

    pub fn contains(&self, chapter: u32) -> bool {
        self.0.contains(&chapter)
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().copied()
    }
}

impl Display for ChapterSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            self.iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(",")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_list_limits_selection() {
        let selection = ChapterSelection::parse(Some("5,6"));
        assert_eq!(selection.iter().collect::<Vec<_>>(), vec![5, 6]);
        assert!(!selection.contains(4));
        assert!(!selection.contains(7));
    }

    #[test]
    fn ranges_and_whitespace() {
        let selection = ChapterSelection::parse(Some(" 4-6, 9 ,12-12"));
        assert_eq!(selection.iter().collect::<Vec<_>>(), vec![4, 5, 6, 9, 12]);
    }

    #[test]
    fn unset_or_empty_selects_default_range() {
        assert_eq!(ChapterSelection::parse(None), ChapterSelection::default());
        assert_eq!(ChapterSelection::parse(Some("")), ChapterSelection::default());
        assert_eq!(ChapterSelection::parse(Some("  ")), ChapterSelection::default());
        let all = ChapterSelection::default();
        assert_eq!(all.iter().next(), Some(4));
        assert_eq!(all.iter().last(), Some(50));
        assert_eq!(all.iter().count(), 47);
    }

    #[test]
    fn malformed_list_selects_default_range() {
        for value in ["abc", "5,x", "5,,6", "6-5", "-3", "5;6", "4-"] {
            assert_eq!(
                ChapterSelection::parse(Some(value)),
                ChapterSelection::default(),
                "'{}' should fall back to the default range",
                value
            );
        }
    }

    #[test]
    fn displays_as_comma_list() {
        assert_eq!(ChapterSelection::parse(Some("6,5")).to_string(), "5,6");
    }
}
