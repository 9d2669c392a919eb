//! Case-insensitive search over the active history, plus the media gallery.

use std::ops::Range;

use crate::core::message::{Entry, Role};

const SNIPPET_CONTEXT: usize = 30;
const ELLIPSIS: &str = "...";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub id: String,
    pub role: Role,
    pub snippet: String,
    /// Byte ranges of every match inside `snippet`.
    pub matches: Vec<Range<usize>>,
}

/// Entries whose first text part contains `query`, in history order.
pub fn search(entries: &[Entry], query: &str) -> Vec<SearchHit> {
    let needle: Vec<char> = fold(query.trim());
    if needle.is_empty() {
        return Vec::new();
    }

    entries
        .iter()
        .filter_map(|entry| {
            let text = entry.text()?;
            let (snippet, matches) = snippet_for(text, &needle)?;
            Some(SearchHit {
                id: entry.id.clone(),
                role: entry.role,
                snippet,
                matches,
            })
        })
        .collect()
}

fn fold(text: &str) -> Vec<char> {
    text.chars()
        .map(|c| c.to_lowercase().next().unwrap_or(c))
        .collect()
}

fn find_from(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    (from..=haystack.len() - needle.len()).find(|&start| haystack[start..].starts_with(needle))
}

fn snippet_for(text: &str, needle: &[char]) -> Option<(String, Vec<Range<usize>>)> {
    let chars: Vec<char> = text.chars().collect();
    let folded = fold(text);
    let first = find_from(&folded, needle, 0)?;

    let start = first.saturating_sub(SNIPPET_CONTEXT);
    let end = (first + needle.len() + SNIPPET_CONTEXT).min(chars.len());

    let mut snippet = String::new();
    if start > 0 {
        snippet.push_str(ELLIPSIS);
    }
    let mut matches = Vec::new();
    let mut cursor = start;
    while let Some(hit) = find_from(&folded[..end], needle, cursor) {
        let before: String = chars[cursor..hit].iter().collect();
        snippet.push_str(&before);
        let matched: String = chars[hit..hit + needle.len()].iter().collect();
        let offset = snippet.len();
        snippet.push_str(&matched);
        matches.push(offset..snippet.len());
        cursor = hit + needle.len();
    }
    let rest: String = chars[cursor..end].iter().collect();
    snippet.push_str(&rest);
    if end < chars.len() {
        snippet.push_str(ELLIPSIS);
    }
    Some((snippet, matches))
}

/// Image and video parts of `entries`, newest first, as `data:` URLs.
pub fn media_gallery(entries: &[Entry]) -> Vec<String> {
    entries
        .iter()
        .rev()
        .flat_map(|entry| {
            entry
                .attachments()
                .filter(|data| data.is_visual())
                .map(|data| data.data_url())
                .collect::<Vec<_>>()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::Part;

    #[test]
    fn short_text_has_no_ellipsis_and_marks_all_matches() {
        let entries = vec![Entry::user_text("msg-1", "Cat and cat and CAT")];
        let hits = search(&entries, "cat");
        assert_eq!(hits.len(), 1);
        let hit = &hits[0];
        assert_eq!(hit.snippet, "Cat and cat and CAT");
        assert_eq!(hit.matches, vec![0..3, 8..11, 16..19]);
    }

    #[test]
    fn long_text_is_trimmed_to_context_window() {
        let text = format!("{}needle{}", "a".repeat(50), "b".repeat(50));
        let entries = vec![Entry::model_text("msg-1", text)];
        let hit = &search(&entries, "NEEDLE")[0];
        let expected = format!("...{}needle{}...", "a".repeat(30), "b".repeat(30));
        assert_eq!(hit.snippet, expected);
        assert_eq!(&hit.snippet[hit.matches[0].clone()], "needle");
        assert_eq!(hit.role, Role::Model);
    }

    #[test]
    fn cyrillic_search_is_case_insensitive() {
        let entries = vec![
            Entry::user_text("msg-1", "Привет, Мир"),
            Entry::user_text("msg-2", "ничего"),
        ];
        let hits = search(&entries, "мир");
        assert_eq!(hits.len(), 1);
        assert_eq!(&hits[0].snippet[hits[0].matches[0].clone()], "Мир");
    }

    #[test]
    fn blank_query_finds_nothing() {
        let entries = vec![Entry::user_text("msg-1", "anything")];
        assert!(search(&entries, "   ").is_empty());
    }

    #[test]
    fn gallery_lists_visual_media_newest_first() {
        let entries = vec![
            Entry::new(
                "msg-1",
                Role::User,
                vec![Part::inline("image/png", "AAA"), Part::inline("application/pdf", "PDF")],
            ),
            Entry::new("msg-2", Role::User, vec![Part::inline("video/mp4", "VID")]),
        ];
        assert_eq!(
            media_gallery(&entries),
            vec!["data:video/mp4;base64,VID", "data:image/png;base64,AAA"]
        );
    }
}
