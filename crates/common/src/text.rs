//! Word accounting, sentence splitting, and markdown helpers.
//!
//! Two word measures exist and are not interchangeable: raw words (any
//! markdown artifact, syntax stripped) and spoken words (dialogue text only,
//! see [`crate::dialogue`]). Budget conformance is always judged on spoken
//! words.

/// Abbreviations that do not terminate a sentence.
const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "sr", "jr", "vs", "etc", "i.e", "e.g",
];

/// Count whitespace-separated word tokens, ignoring pure-punctuation tokens.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace()
        .filter(|token| token.chars().any(|c| c.is_alphanumeric()))
        .count()
}

/// Count raw words in a markdown document: headers, emphasis markers, list
/// markers, and link URLs are stripped before counting.
pub fn count_raw_words(markdown: &str) -> usize {
    markdown
        .lines()
        .map(|line| count_words(&strip_markdown_line(line)))
        .sum()
}

fn strip_markdown_line(line: &str) -> String {
    let line = line.trim_start();
    let line = line.trim_start_matches('#').trim_start();
    let line = line
        .strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .unwrap_or(line);
    let line = strip_ordered_marker(line);

    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' | '_' | '`' | '[' => {}
            ']' => {
                // Drop the "(url)" half of a markdown link, keep the text.
                if chars.peek() == Some(&'(') {
                    for next in chars.by_ref() {
                        if next == ')' {
                            break;
                        }
                    }
                }
            }
            _ => out.push(c),
        }
    }
    out
}

fn strip_ordered_marker(line: &str) -> &str {
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        if let Some(rest) = line[digits..].strip_prefix(". ") {
            return rest;
        }
    }
    line
}

/// Remove every `[...]` span from the text. Unclosed brackets drop the rest
/// of the line.
pub fn strip_bracketed(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut depth = 0usize;
    for c in text.chars() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

/// Split a block of prose into sentences.
///
/// A `.`, `!`, or `?` followed by whitespace or end-of-input terminates a
/// sentence unless the preceding word is a known abbreviation.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        current.push(c);

        if matches!(c, '.' | '!' | '?') {
            let mut j = i + 1;
            while j < chars.len() && matches!(chars[j], '"' | '\'' | ')' | ']') {
                current.push(chars[j]);
                j += 1;
            }
            let at_end = j >= chars.len();
            let boundary = at_end || chars[j].is_whitespace();
            if boundary && !ends_with_abbreviation(&current) {
                push_sentence(&mut sentences, &mut current);
            }
            i = j;
            continue;
        }
        i += 1;
    }

    push_sentence(&mut sentences, &mut current);
    sentences
}

fn push_sentence(sentences: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    current.clear();
}

fn ends_with_abbreviation(fragment: &str) -> bool {
    let trimmed = fragment.trim_end_matches(|c: char| matches!(c, '"' | '\'' | ')' | ']'));
    let trimmed = trimmed.trim_end_matches('.');
    let Some(word) = trimmed.split_whitespace().last() else {
        return false;
    };
    let word = word.trim_start_matches(|c: char| !c.is_alphanumeric());
    let lowered = word.to_lowercase();
    ABBREVIATIONS
        .iter()
        .any(|abbr| lowered == *abbr || lowered == abbr.replace('.', ""))
}

/// Extract the body of the first `##`/`###` section whose heading contains
/// `title` (case-insensitive). The body runs until the next heading of the
/// same or higher level.
pub fn extract_section(markdown: &str, title: &str) -> Option<String> {
    let needle = title.to_lowercase();
    let mut open_level: Option<usize> = None;
    let mut lines: Vec<&str> = Vec::new();

    for line in markdown.lines() {
        let level = heading_level(line);
        match open_level {
            None => {
                if level > 0
                    && line
                        .trim_start_matches('#')
                        .trim()
                        .to_lowercase()
                        .contains(&needle)
                {
                    open_level = Some(level);
                }
            }
            Some(open) => {
                if level > 0 && level <= open {
                    break;
                }
                lines.push(line);
            }
        }
    }

    open_level.map(|_| lines.join("\n").trim().to_string())
}

/// Whether a section with the given heading text exists.
pub fn has_section(markdown: &str, title: &str) -> bool {
    let needle = title.to_lowercase();
    markdown.lines().any(|line| {
        heading_level(line) > 0
            && line
                .trim_start_matches('#')
                .trim()
                .to_lowercase()
                .contains(&needle)
    })
}

fn heading_level(line: &str) -> usize {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    if hashes > 0 && trimmed.chars().nth(hashes).map_or(false, |c| c == ' ') {
        hashes
    } else {
        0
    }
}

/// Collect the text of `-`/`*` bullet items in a markdown fragment.
pub fn bullet_items(markdown: &str) -> Vec<String> {
    markdown
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim_start();
            trimmed
                .strip_prefix("- ")
                .or_else(|| trimmed.strip_prefix("* "))
                .map(|item| item.trim().to_string())
        })
        .filter(|item| !item.is_empty())
        .collect()
}
