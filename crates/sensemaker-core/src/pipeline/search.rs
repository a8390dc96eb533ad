//! Search term sanitation
//!
//! Agents asked for "just the search term" still wrap it in quotes or pad it
//! with whitespace. The term is unwrapped until stable, then capped.

/// Quote pairs stripped from a derived search term
const QUOTE_PAIRS: [(char, char); 4] = [('"', '"'), ('\'', '\''), ('“', '”'), ('‘', '’')];

/// Trim whitespace and any nesting of the four quote styles, then cap the
/// result at `max_chars` characters.
#[must_use]
pub fn sanitize_search_term(raw: &str, max_chars: usize) -> String {
    let mut term = raw.trim();

    loop {
        let unwrapped = QUOTE_PAIRS.iter().find_map(|(open, close)| {
            term.strip_prefix(*open)
                .and_then(|rest| rest.strip_suffix(*close))
        });
        match unwrapped {
            Some(inner) => term = inner.trim(),
            None => break,
        }
    }

    term.chars().take(max_chars).collect::<String>().trim_end().to_string()
}
