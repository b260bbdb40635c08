//! Citation marker helpers.
//!
//! Answers carry inline `[Source: file, Page N]` tokens. The display
//! layer peels these out of the prose; these helpers guarantee that
//! doing so never disturbs paragraph or list-item boundaries, which is
//! the one contract the presentation side relies on.

use std::sync::OnceLock;

use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Citation {
    pub source: String,
    pub page: String,
}

fn citation_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[Source:\s*([^,\]]+?)\s*,\s*Page\s*([^\]]+?)\s*\]")
            .expect("citation pattern is valid")
    })
}

/// All citation tokens in an answer, in order of appearance.
pub fn extract_citations(answer: &str) -> Vec<Citation> {
    citation_regex()
        .captures_iter(answer)
        .map(|caps| Citation {
            source: caps[1].to_string(),
            page: caps[2].to_string(),
        })
        .collect()
}

pub fn contains_citation(answer: &str) -> bool {
    citation_regex().is_match(answer)
}

/// Remove citation tokens while leaving the line structure untouched.
/// Only horizontal whitespace around a removed token is tidied up;
/// newlines are never merged.
pub fn strip_citations(answer: &str) -> String {
    answer
        .split('\n')
        .map(|line| {
            let stripped = citation_regex().replace_all(line, "");
            let mut cleaned = stripped.to_string();
            while cleaned.contains("  ") {
                cleaned = cleaned.replace("  ", " ");
            }
            cleaned.trim_end().to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_the_exact_bracket_shape() {
        let answer = "Acme was founded in 1947. [Source: history.pdf, Page 2]";
        let citations = extract_citations(answer);
        assert_eq!(
            citations,
            vec![Citation {
                source: "history.pdf".to_string(),
                page: "2".to_string(),
            }]
        );
    }

    #[test]
    fn extracts_multiple_independent_citations() {
        let answer = "Revenue grew. [Source: q1.pdf, Page 4] Margins held. [Source: q2.pdf, Page 1]";
        let citations = extract_citations(answer);
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].source, "q1.pdf");
        assert_eq!(citations[1].page, "1");
    }

    #[test]
    fn handles_the_not_available_page() {
        let citations = extract_citations("Fact. [Source: scan.pdf, Page N/A]");
        assert_eq!(citations[0].page, "N/A");
    }

    #[test]
    fn ignores_unrelated_brackets() {
        assert!(!contains_citation("See [chapter 3] and [Source without page]"));
        assert!(extract_citations("[1] a numbered reference").is_empty());
    }

    #[test]
    fn stripping_preserves_paragraph_boundaries() {
        let answer = "First paragraph. [Source: a.pdf, Page 1]\n\nSecond paragraph. [Source: b.pdf, Page 2]";
        let stripped = strip_citations(answer);
        assert_eq!(stripped, "First paragraph.\n\nSecond paragraph.");
    }

    #[test]
    fn stripping_preserves_list_items() {
        let answer = "- point one [Source: a.pdf, Page 1]\n- point two [Source: a.pdf, Page 2]\n- point three";
        let stripped = strip_citations(answer);
        assert_eq!(stripped, "- point one\n- point two\n- point three");
    }

    #[test]
    fn stripping_mid_sentence_token_keeps_single_spaces() {
        let answer = "Rockets [Source: a.pdf, Page 1] are the core product.";
        assert_eq!(strip_citations(answer), "Rockets are the core product.");
    }
}
