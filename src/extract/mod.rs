//! Document structure extraction
//!
//! Turns raw document text into a Document -> Chapter -> Section hierarchy
//! with page ranges, titles, and per-node extraction confidence. Heading
//! detection combines a markdown pass (pulldown-cmark) with regex passes for
//! numbered and all-caps headings found in plain-text sources. Extraction
//! degrades gracefully: a document with no detectable chapter boundaries
//! becomes a single synthetic chapter/section, never an ingestion failure.

use crate::error::Result;
use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag};
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Confidence assigned to unambiguous markdown headings
const CONFIDENCE_MARKDOWN: f64 = 1.0;
/// Confidence assigned to "Chapter N" / dotted-number headings
const CONFIDENCE_NUMBERED: f64 = 0.9;
/// Confidence assigned to the all-caps title-line heuristic
const CONFIDENCE_ALLCAPS: f64 = 0.6;
/// Confidence assigned to synthetic fallback nodes
const CONFIDENCE_SYNTHETIC: f64 = 0.3;

/// Metadata declared by the caller at ingestion time
#[derive(Debug, Clone)]
pub struct DocumentMeta {
    pub title: String,
    pub subject: String,
    pub authors: Vec<String>,
    pub language: String,
}

/// Extracted hierarchy, prior to chunking and persistence
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub title: String,
    pub confidence: f64,
    pub chapters: Vec<ExtractedChapter>,
    pub word_count: usize,
}

#[derive(Debug, Clone)]
pub struct ExtractedChapter {
    pub seq_index: i32,
    pub title: String,
    pub confidence: f64,
    pub synthetic: bool,
    pub page_start: i32,
    pub page_end: i32,
    pub sections: Vec<ExtractedSection>,
}

#[derive(Debug, Clone)]
pub struct ExtractedSection {
    pub numbering: String,
    pub level: i32,
    pub title: String,
    pub text: String,
    pub confidence: f64,
    pub synthetic: bool,
    pub page_start: i32,
    pub page_end: i32,
}

/// Maps byte offsets to 1-based page numbers; pages delimited by form feed
#[derive(Debug, Clone)]
pub struct PageMap {
    breaks: Vec<usize>,
}

impl PageMap {
    pub fn new(text: &str) -> Self {
        let breaks = text
            .char_indices()
            .filter(|(_, c)| *c == '\u{c}')
            .map(|(i, _)| i)
            .collect();
        Self { breaks }
    }

    pub fn page_at(&self, offset: usize) -> i32 {
        let before = self.breaks.iter().filter(|b| **b < offset).count();
        before as i32 + 1
    }

    pub fn page_count(&self) -> i32 {
        self.breaks.len() as i32 + 1
    }
}

#[derive(Debug, Clone)]
struct HeadingCandidate {
    /// Byte offset of the heading line start
    offset: usize,
    /// Byte offset just past the heading line
    body_start: usize,
    level: i32,
    title: String,
    numbering: Option<String>,
    confidence: f64,
}

fn chapter_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^chapter\s+(\d+)\s*[:.]?\s*(.*)$").unwrap())
}

fn numbered_heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // "2.1 Title" or "2.1.3 Title" at line start
    RE.get_or_init(|| Regex::new(r"^(\d+(?:\.\d+)+)\s+(\S.*)$").unwrap())
}

/// Extract the chapter/section hierarchy from raw document text.
pub fn extract_structure(text: &str, meta: &DocumentMeta) -> Result<ExtractedDocument> {
    let pages = PageMap::new(text);
    let mut candidates = markdown_headings(text);
    candidates.extend(plain_text_headings(text));

    // One candidate per line, markdown pass wins on overlap
    candidates.sort_by(|a, b| {
        a.offset
            .cmp(&b.offset)
            .then(b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal))
    });
    candidates.dedup_by_key(|c| c.offset);

    let chapter_marks: Vec<&HeadingCandidate> =
        candidates.iter().filter(|c| c.level == 1).collect();

    let word_count = count_words(text);

    if chapter_marks.is_empty() {
        warn!("No chapter boundaries detected; falling back to a synthetic chapter");
        return Ok(ExtractedDocument {
            title: meta.title.clone(),
            confidence: CONFIDENCE_SYNTHETIC,
            chapters: vec![synthetic_chapter(1, &meta.title, text, 0, text.len(), &pages)],
            word_count,
        });
    }

    let mut chapters = Vec::with_capacity(chapter_marks.len());
    for (i, mark) in chapter_marks.iter().enumerate() {
        let span_end = chapter_marks
            .get(i + 1)
            .map(|next| next.offset)
            .unwrap_or(text.len());
        let seq = i as i32 + 1;
        let body = &text[mark.body_start..span_end];

        let section_marks: Vec<&HeadingCandidate> = candidates
            .iter()
            .filter(|c| c.level >= 2 && c.offset >= mark.body_start && c.offset < span_end)
            .collect();

        let sections = if section_marks.is_empty() {
            debug!(chapter = seq, "No section headings; synthesizing one section");
            vec![ExtractedSection {
                numbering: format!("{}.1", seq),
                level: 2,
                title: mark.title.clone(),
                text: body.trim().to_string(),
                confidence: CONFIDENCE_SYNTHETIC,
                synthetic: true,
                page_start: pages.page_at(mark.body_start),
                page_end: pages.page_at(span_end.saturating_sub(1)),
            }]
        } else {
            build_sections(text, seq, mark, &section_marks, span_end, &pages)
        };

        chapters.push(ExtractedChapter {
            seq_index: seq,
            title: mark.title.clone(),
            confidence: mark.confidence,
            synthetic: false,
            page_start: pages.page_at(mark.offset),
            page_end: pages.page_at(span_end.saturating_sub(1)),
            sections,
        });
    }

    let confidence = chapters.iter().map(|c| c.confidence).sum::<f64>() / chapters.len() as f64;

    Ok(ExtractedDocument {
        title: meta.title.clone(),
        confidence,
        chapters,
        word_count,
    })
}

/// Merge sections below the threshold into their predecessor (or the
/// chapter's leading section) instead of discarding them.
pub fn merge_small_sections(sections: Vec<ExtractedSection>, min_words: usize) -> Vec<ExtractedSection> {
    let mut merged: Vec<ExtractedSection> = Vec::with_capacity(sections.len());

    for section in sections {
        let words = count_words(&section.text);
        if words < min_words && !merged.is_empty() {
            let prev = merged.last_mut().unwrap();
            debug!(
                from = %section.numbering,
                into = %prev.numbering,
                words,
                "Merging undersized section into predecessor"
            );
            prev.text.push_str("\n\n");
            if !section.title.is_empty() {
                prev.text.push_str(&section.title);
                prev.text.push_str("\n\n");
            }
            prev.text.push_str(&section.text);
            prev.page_end = prev.page_end.max(section.page_end);
            prev.confidence = prev.confidence.min(section.confidence);
        } else {
            merged.push(section);
        }
    }

    merged
}

fn build_sections(
    text: &str,
    chapter_seq: i32,
    chapter_mark: &HeadingCandidate,
    section_marks: &[&HeadingCandidate],
    span_end: usize,
    pages: &PageMap,
) -> Vec<ExtractedSection> {
    let mut sections = Vec::new();

    // Leading text between the chapter heading and its first section
    let lead = text[chapter_mark.body_start..section_marks[0].offset].trim();
    if !lead.is_empty() {
        sections.push(ExtractedSection {
            numbering: format!("{}.0", chapter_seq),
            level: 2,
            title: String::new(),
            text: lead.to_string(),
            confidence: chapter_mark.confidence,
            synthetic: false,
            page_start: pages.page_at(chapter_mark.body_start),
            page_end: pages.page_at(section_marks[0].offset.saturating_sub(1)),
        });
    }

    for (i, mark) in section_marks.iter().enumerate() {
        let end = section_marks
            .get(i + 1)
            .map(|next| next.offset)
            .unwrap_or(span_end);
        let numbering = mark
            .numbering
            .clone()
            .unwrap_or_else(|| format!("{}.{}", chapter_seq, i + 1));
        sections.push(ExtractedSection {
            level: numbering.matches('.').count() as i32 + 1,
            numbering,
            title: mark.title.clone(),
            text: text[mark.body_start..end].trim().to_string(),
            confidence: mark.confidence,
            synthetic: false,
            page_start: pages.page_at(mark.offset),
            page_end: pages.page_at(end.saturating_sub(1)),
        });
    }

    sections
}

fn synthetic_chapter(
    seq: i32,
    title: &str,
    text: &str,
    start: usize,
    end: usize,
    pages: &PageMap,
) -> ExtractedChapter {
    ExtractedChapter {
        seq_index: seq,
        title: title.to_string(),
        confidence: CONFIDENCE_SYNTHETIC,
        synthetic: true,
        page_start: pages.page_at(start),
        page_end: pages.page_at(end.saturating_sub(1)),
        sections: vec![ExtractedSection {
            numbering: format!("{}.1", seq),
            level: 2,
            title: title.to_string(),
            text: text[start..end].trim().to_string(),
            confidence: CONFIDENCE_SYNTHETIC,
            synthetic: true,
            page_start: pages.page_at(start),
            page_end: pages.page_at(end.saturating_sub(1)),
        }],
    }
}

/// Markdown heading pass: H1 -> chapter, H2+ -> section
fn markdown_headings(text: &str) -> Vec<HeadingCandidate> {
    let mut candidates = Vec::new();

    for (event, range) in Parser::new_ext(text, Options::empty()).into_offset_iter() {
        if let Event::Start(Tag::Heading { level, .. }) = event {
            let raw = &text[range.clone()];
            let title = raw
                .lines()
                .next()
                .unwrap_or("")
                .trim_start_matches('#')
                .trim()
                .to_string();
            if title.is_empty() {
                continue;
            }
            let body_start = text[range.start..]
                .find('\n')
                .map(|n| range.start + n + 1)
                .unwrap_or(text.len());
            candidates.push(HeadingCandidate {
                offset: range.start,
                body_start,
                level: heading_level_to_i32(level),
                title,
                numbering: None,
                confidence: CONFIDENCE_MARKDOWN,
            });
        }
    }

    candidates
}

/// Plain-text passes: "Chapter N" lines, dotted numbering, all-caps titles
fn plain_text_headings(text: &str) -> Vec<HeadingCandidate> {
    let mut candidates = Vec::new();
    let lines: Vec<&str> = text.lines().collect();
    let mut offset = 0usize;

    for (i, line) in lines.iter().enumerate() {
        let line_start = offset;
        offset += line.len() + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let body_start = (line_start + line.len() + 1).min(text.len());

        if let Some(caps) = chapter_line_re().captures(trimmed) {
            let number = &caps[1];
            let rest = caps[2].trim();
            let title = if rest.is_empty() {
                format!("Chapter {}", number)
            } else {
                rest.to_string()
            };
            candidates.push(HeadingCandidate {
                offset: line_start,
                body_start,
                level: 1,
                title,
                numbering: None,
                confidence: CONFIDENCE_NUMBERED,
            });
            continue;
        }

        if let Some(caps) = numbered_heading_re().captures(trimmed) {
            let numbering = caps[1].to_string();
            let level = numbering.matches('.').count() as i32 + 1;
            candidates.push(HeadingCandidate {
                offset: line_start,
                body_start,
                level,
                title: caps[2].trim().to_string(),
                numbering: Some(numbering),
                confidence: CONFIDENCE_NUMBERED,
            });
            continue;
        }

        if is_all_caps_title(trimmed)
            && blank_neighbor(&lines, i, -1)
            && blank_neighbor(&lines, i, 1)
        {
            candidates.push(HeadingCandidate {
                offset: line_start,
                body_start,
                level: 1,
                title: title_case(trimmed),
                numbering: None,
                confidence: CONFIDENCE_ALLCAPS,
            });
        }
    }

    candidates
}

fn heading_level_to_i32(level: HeadingLevel) -> i32 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

fn is_all_caps_title(line: &str) -> bool {
    let words: Vec<&str> = line.split_whitespace().collect();
    if words.len() < 2 || line.len() > 80 {
        return false;
    }
    let letters: Vec<char> = line.chars().filter(|c| c.is_alphabetic()).collect();
    !letters.is_empty() && letters.iter().all(|c| c.is_uppercase())
}

fn blank_neighbor(lines: &[&str], index: usize, delta: isize) -> bool {
    let target = index as isize + delta;
    if target < 0 || target as usize >= lines.len() {
        return true;
    }
    lines[target as usize].trim().is_empty()
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> DocumentMeta {
        DocumentMeta {
            title: "Algorithms".to_string(),
            subject: "computer science".to_string(),
            authors: vec![],
            language: "en".to_string(),
        }
    }

    #[test]
    fn test_markdown_chapters_and_sections() {
        let text = "# Sorting\n\nIntro text here.\n\n## Bubble Sort\n\nBubble sort body.\n\n## Quick Sort\n\nQuick sort body.\n\n# Searching\n\n## Binary Search\n\nBinary search body.\n";
        let doc = extract_structure(text, &meta()).unwrap();

        assert_eq!(doc.chapters.len(), 2);
        assert_eq!(doc.chapters[0].title, "Sorting");
        // leading intro + two headed sections
        assert_eq!(doc.chapters[0].sections.len(), 3);
        assert_eq!(doc.chapters[1].sections.len(), 1);
        assert_eq!(doc.chapters[1].sections[0].title, "Binary Search");
        assert!((doc.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_plain_text_chapter_lines() {
        let text = "Chapter 1: Arrays\n\nArrays hold elements.\n\n1.1 Indexing\n\nIndexing is O(1).\n\nChapter 2: Lists\n\nLinked lists differ.\n";
        let doc = extract_structure(text, &meta()).unwrap();

        assert_eq!(doc.chapters.len(), 2);
        assert_eq!(doc.chapters[0].title, "Arrays");
        let numbered = doc.chapters[0]
            .sections
            .iter()
            .find(|s| s.numbering == "1.1")
            .expect("numbered section");
        assert_eq!(numbered.title, "Indexing");
        assert!(doc.confidence < 1.0);
    }

    #[test]
    fn test_no_boundaries_yields_synthetic_chapter() {
        let text = "Just a blob of prose without any headings at all. It keeps going.";
        let doc = extract_structure(text, &meta()).unwrap();

        assert_eq!(doc.chapters.len(), 1);
        assert!(doc.chapters[0].synthetic);
        assert_eq!(doc.chapters[0].sections.len(), 1);
        assert!(doc.chapters[0].sections[0].synthetic);
        assert!(doc.chapters[0].sections[0].text.contains("blob of prose"));
        assert!((doc.confidence - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_chapter_without_sections_gets_one_synthetic_section() {
        // Chapter 2 has no detectable section headings
        let text = "# One\n\n## A\n\nSection a text.\n\n# Two\n\nHeadingless chapter body spanning the whole chapter.\n\n# Three\n\n## C\n\nSection c text.\n";
        let doc = extract_structure(text, &meta()).unwrap();

        assert_eq!(doc.chapters.len(), 3);
        let ch2 = &doc.chapters[1];
        assert_eq!(ch2.sections.len(), 1);
        assert!(ch2.sections[0].synthetic);
        assert!(ch2.sections[0].text.contains("Headingless chapter body"));
    }

    #[test]
    fn test_all_caps_heading_low_confidence() {
        let text = "INTRODUCTION TO GRAPHS\n\nGraphs have vertices and edges.\n";
        let doc = extract_structure(text, &meta()).unwrap();

        assert_eq!(doc.chapters.len(), 1);
        assert!(!doc.chapters[0].synthetic);
        assert_eq!(doc.chapters[0].title, "Introduction To Graphs");
        assert!((doc.chapters[0].confidence - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_page_map_form_feeds() {
        let text = "page one\u{c}page two\u{c}page three";
        let pages = PageMap::new(text);
        assert_eq!(pages.page_count(), 3);
        assert_eq!(pages.page_at(0), 1);
        assert_eq!(pages.page_at(10), 2);
        assert_eq!(pages.page_at(text.len() - 1), 3);
    }

    #[test]
    fn test_merge_small_sections() {
        let sections = vec![
            ExtractedSection {
                numbering: "1.1".into(),
                level: 2,
                title: "Big".into(),
                text: "word ".repeat(50).trim().to_string(),
                confidence: 0.9,
                synthetic: false,
                page_start: 1,
                page_end: 1,
            },
            ExtractedSection {
                numbering: "1.2".into(),
                level: 2,
                title: "Tiny".into(),
                text: "only four words here".into(),
                confidence: 0.9,
                synthetic: false,
                page_start: 1,
                page_end: 2,
            },
        ];
        let merged = merge_small_sections(sections, 30);
        assert_eq!(merged.len(), 1);
        assert!(merged[0].text.contains("only four words here"));
        assert_eq!(merged[0].page_end, 2);
    }
}
