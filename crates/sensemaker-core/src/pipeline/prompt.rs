//! Prompt assembly for context, expansion and reduction

use super::retrieval::RetrievedDocument;
use super::store::Matter;
use super::types::CandidateAnswer;
use chrono::{DateTime, Utc};
use std::fmt::Write;

/// Instructions for the agent that derives a search term
pub const EXPANSION_PROMPT: &str = "You turn a user's question into a short search term for a \
document index. Reply with the search term only: no quotes, no explanation.";

/// Instructions for the summarizer
pub const SUMMARIZER_PROMPT: &str = "You write the final answer to the user's question from a set \
of draft answers. Reconcile the drafts: keep what they agree on, resolve or flag contradictions \
and remove repetition. Answer in your own voice as a single assistant. Never mention drafts, \
sources, other assistants or that more than one answer was considered.";

/// Metadata block prepended to every request's context
#[must_use]
pub fn metadata_header(
    clock: u64,
    now: DateTime<Utc>,
    subject: Option<&str>,
    matter: Option<&Matter>,
) -> String {
    let mut header = String::from("[metadata]\n");
    let _ = writeln!(header, "clock: {}", clock);
    let _ = writeln!(header, "timestamp: {}", now.to_rfc3339());

    if let Some(subject) = subject.filter(|s| !s.trim().is_empty()) {
        let _ = writeln!(header, "subject: {}", subject.trim());
    }

    if let Some(matter) = matter {
        let _ = writeln!(header, "matter: {}", matter.title);
        if let Some(description) = matter.description.as_deref() {
            let _ = writeln!(header, "matter description: {}", description);
        }
        for (i, attachment) in matter.attachments.iter().enumerate() {
            let _ = writeln!(header, "[attachment {}]\n{}", i + 1, attachment);
        }
    }

    header
}

/// Documents found by expansion, as a context block
#[must_use]
pub fn documents_block(term: &str, documents: &[RetrievedDocument]) -> String {
    let mut block = format!("[documents matching \"{}\"]\n", term);
    for doc in documents {
        let _ = writeln!(block, "- ({}) {}", doc.id, doc.content);
    }
    block
}

/// Query asking for a search term
#[must_use]
pub fn expansion_query(query: &str) -> String {
    format!("Question:\n{}\n\nSearch term:", query)
}

/// Query handed to the summarizer
#[must_use]
pub fn reduction_query(query: &str, candidates: &[CandidateAnswer]) -> String {
    let mut prompt = format!("Question:\n{}\n", query);
    for (i, candidate) in candidates.iter().enumerate() {
        let _ = write!(prompt, "\nDraft {}:\n{}\n", i + 1, candidate.content);
    }
    prompt.push_str("\nFinal answer:");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_header_carries_clock_and_matter() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let matter = Matter {
            id: "m1".to_string(),
            title: "Smith v. Jones".to_string(),
            description: Some("Lease dispute".to_string()),
            attachments: vec!["Exhibit A".to_string()],
        };

        let header = metadata_header(7, now, Some("Tenancy"), Some(&matter));
        assert!(header.contains("clock: 7"));
        assert!(header.contains("timestamp: 2026-03-01T12:00:00+00:00"));
        assert!(header.contains("subject: Tenancy"));
        assert!(header.contains("matter: Smith v. Jones"));
        assert!(header.contains("[attachment 1]\nExhibit A"));
    }

    #[test]
    fn test_blank_subject_omitted() {
        let header = metadata_header(1, Utc::now(), Some("  "), None);
        assert!(!header.contains("subject"));
    }

    #[test]
    fn test_reduction_query_hides_agent_names() {
        let candidates = vec![
            CandidateAnswer::fulfilled("alpha", "Twelve months."),
            CandidateAnswer::fulfilled("beta", "One year."),
        ];
        let prompt = reduction_query("How long is the lease?", &candidates);

        assert!(prompt.contains("Draft 1:\nTwelve months."));
        assert!(prompt.contains("Draft 2:\nOne year."));
        assert!(!prompt.contains("alpha"));
        assert!(!prompt.contains("beta"));
    }
}
