//! Structural cue detection for chunking

use regex::Regex;
use std::sync::OnceLock;

/// Structural kind of a text segment
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentKind {
    Paragraph,
    CodeFence { language: Option<String> },
    Definition { term: Option<String> },
    Example { number: Option<u32> },
    Exercise { number: Option<u32> },
    Summary,
}

impl SegmentKind {
    /// Typed segments should not be packed together with a different type
    pub fn is_typed(&self) -> bool {
        !matches!(self, SegmentKind::Paragraph)
    }
}

/// A structurally delimited run of text within a section
#[derive(Debug, Clone)]
pub struct Segment {
    pub kind: SegmentKind,
    pub text: String,
}

fn definition_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(definition|theorem|lemma|corollary)\s*(?:\(([^)]+)\))?\s*\d*\s*[:.]")
            .unwrap()
    })
}

fn example_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^example\s*(\d+)?\s*[:.]").unwrap())
}

fn exercise_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(?:exercise|problem)\s*(\d+)\s*[:.]?").unwrap())
}

fn summary_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(summary|in summary|key points|takeaways)\b").unwrap())
}

fn defined_term_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // "Definition: A binary tree is ..." -> capture the phrase before is/are
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:definition|theorem|lemma|corollary)\s*\d*\s*[:.]\s*(?:an?\s+|the\s+)?([\w][\w\s-]{1,50}?)\s+(?:is|are|states)\b").unwrap()
    })
}

/// Classify the marker (if any) that opens a paragraph
pub fn classify_marker(paragraph: &str) -> SegmentKind {
    let first_line = paragraph.lines().next().unwrap_or("").trim();

    if let Some(caps) = definition_re().captures(first_line) {
        let term = caps
            .get(2)
            .map(|m| m.as_str().trim().to_string())
            .or_else(|| {
                defined_term_re()
                    .captures(first_line)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().trim().to_string())
            });
        return SegmentKind::Definition { term };
    }
    if let Some(caps) = example_re().captures(first_line) {
        let number = caps.get(1).and_then(|m| m.as_str().parse().ok());
        return SegmentKind::Example { number };
    }
    if let Some(caps) = exercise_re().captures(first_line) {
        let number = caps.get(1).and_then(|m| m.as_str().parse().ok());
        return SegmentKind::Exercise { number };
    }
    if summary_re().is_match(first_line) {
        return SegmentKind::Summary;
    }
    SegmentKind::Paragraph
}

/// Split section text into structurally typed segments: code fences are kept
/// whole, everything else splits on blank lines and gets marker-classified.
pub fn segment_text(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut fence: Option<(Option<String>, Vec<&str>)> = None;

    let flush = |buf: &mut Vec<&str>, out: &mut Vec<Segment>| {
        let para = buf.join("\n").trim().to_string();
        buf.clear();
        if !para.is_empty() {
            out.push(Segment {
                kind: classify_marker(&para),
                text: para,
            });
        }
    };

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            match fence.take() {
                Some((language, body)) => {
                    segments.push(Segment {
                        kind: SegmentKind::CodeFence { language },
                        text: body.join("\n"),
                    });
                }
                None => {
                    flush(&mut current, &mut segments);
                    let info = trimmed.trim_start_matches(['`', '~']).trim();
                    let language = if info.is_empty() {
                        None
                    } else {
                        Some(info.to_string())
                    };
                    fence = Some((language, Vec::new()));
                }
            }
            continue;
        }

        if let Some((_, ref mut body)) = fence {
            body.push(line);
        } else if trimmed.is_empty() {
            flush(&mut current, &mut segments);
        } else {
            current.push(line);
        }
    }

    // Unterminated fence: keep the body as code rather than dropping it
    if let Some((language, body)) = fence {
        segments.push(Segment {
            kind: SegmentKind::CodeFence { language },
            text: body.join("\n"),
        });
    }
    flush(&mut current, &mut segments);

    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_code_fence() {
        let text = "Some prose.\n\n```rust\nfn main() {}\n```\n\nMore prose.";
        let segments = segment_text(text);

        assert_eq!(segments.len(), 3);
        assert_eq!(
            segments[1].kind,
            SegmentKind::CodeFence {
                language: Some("rust".to_string())
            }
        );
        assert!(segments[1].text.contains("fn main"));
    }

    #[test]
    fn test_classify_definition_with_term() {
        let kind = classify_marker("Definition: A binary tree is a hierarchical structure.");
        match kind {
            SegmentKind::Definition { term } => {
                assert_eq!(term.as_deref(), Some("binary tree"));
            }
            other => panic!("expected definition, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_exercise_number() {
        assert_eq!(
            classify_marker("Exercise 3: Implement merge sort."),
            SegmentKind::Exercise { number: Some(3) }
        );
        assert_eq!(
            classify_marker("Problem 12. Prove the bound."),
            SegmentKind::Exercise { number: Some(12) }
        );
    }

    #[test]
    fn test_classify_summary_and_plain() {
        assert_eq!(classify_marker("In summary, trees are useful."), SegmentKind::Summary);
        assert_eq!(
            classify_marker("Plain narrative paragraph."),
            SegmentKind::Paragraph
        );
    }

    #[test]
    fn test_unterminated_fence_kept() {
        let text = "```python\nprint('hi')";
        let segments = segment_text(text);
        assert_eq!(segments.len(), 1);
        assert!(matches!(segments[0].kind, SegmentKind::CodeFence { .. }));
    }
}
