//! Result excerpts and highlight fragments

use crate::store::TestCase;

pub const PRD_EXCERPT_CHARS: usize = 200;
pub const TEST_CASE_FIELD_CHARS: usize = 100;
pub const HIGHLIGHT_CHUNK_CHARS: usize = 150;
pub const HIGHLIGHT_COUNT: usize = 3;

/// Cut `text` to at most `max_chars` characters, appending "..." if cut
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => format!("{}...", &text[..byte_index]),
        None => text.to_string(),
    }
}

pub fn prd_excerpt(content: &str) -> String {
    truncate_chars(content, PRD_EXCERPT_CHARS)
}

/// Precondition and expected result, each truncated on its own
pub fn test_case_excerpt(test_case: &TestCase) -> String {
    let mut excerpt = String::new();

    if !test_case.precondition.is_empty() {
        excerpt.push_str("Precondition: ");
        excerpt.push_str(&truncate_chars(
            &test_case.precondition,
            TEST_CASE_FIELD_CHARS,
        ));
        excerpt.push('\n');
    }
    if !test_case.expected_result.is_empty() {
        excerpt.push_str("Expected: ");
        excerpt.push_str(&truncate_chars(
            &test_case.expected_result,
            TEST_CASE_FIELD_CHARS,
        ));
    }

    excerpt
}

/// Leading fixed-size chunks of `content`
///
/// Every chunk except one that reaches the end of the text gets a "..."
/// suffix.
pub fn highlights(content: &str, count: usize, chunk_chars: usize) -> Vec<String> {
    if chunk_chars == 0 {
        return Vec::new();
    }

    let chars: Vec<char> = content.chars().collect();
    chars
        .chunks(chunk_chars)
        .take(count)
        .enumerate()
        .map(|(i, chunk)| {
            let mut fragment: String = chunk.iter().collect();
            if (i + 1) * chunk_chars < chars.len() {
                fragment.push_str("...");
            }
            fragment
        })
        .collect()
}
