//! Content-aware chunking
//!
//! Splits section text into bounded, typed chunks. Tier one segments on
//! structural cues (paragraph breaks, code fences, definition/exercise
//! markers); tier two falls back to sentence-boundary packing when a segment
//! has no structural cue inside the word window. Each chunk records which
//! strategy produced it, its content type, concept/prerequisite tags, and a
//! difficulty score.

pub mod boundaries;

pub use boundaries::{segment_text, Segment, SegmentKind};

use crate::config::ChunkConfig;
use crate::model::{ChunkMetadata, ChunkingStrategy, ContentType};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;
use tracing::trace;
use unicode_segmentation::UnicodeSegmentation;

/// A chunk before scoring and persistence
#[derive(Debug, Clone)]
pub struct RawChunk {
    pub text: String,
    pub metadata: ChunkMetadata,
    pub strategy: ChunkingStrategy,
    pub word_count: usize,
    pub sentence_count: usize,
    pub concepts: Vec<String>,
    pub prerequisites: Vec<String>,
    pub difficulty: f64,
}

/// Section-text chunker with a bounded word window
pub struct Chunker {
    min_words: usize,
    max_words: usize,
}

/// Working state for one chunk being assembled
struct PendingChunk {
    text: String,
    kinds: Vec<SegmentKind>,
    words: usize,
    strategy: ChunkingStrategy,
}

impl PendingChunk {
    fn new() -> Self {
        Self {
            text: String::new(),
            kinds: Vec::new(),
            words: 0,
            strategy: ChunkingStrategy::ContentAware,
        }
    }

    fn push(&mut self, piece: &Piece) {
        if !self.text.is_empty() {
            self.text.push_str("\n\n");
        }
        self.text.push_str(&piece.text);
        self.words += piece.words;
        self.kinds.push(piece.kind.clone());
        if piece.strategy == ChunkingStrategy::Fallback {
            self.strategy = ChunkingStrategy::Fallback;
        }
    }

    fn typed_kinds(&self) -> Vec<&SegmentKind> {
        self.kinds.iter().filter(|k| k.is_typed()).collect()
    }
}

/// A window-sized piece of a segment, ready for packing
struct Piece {
    text: String,
    kind: SegmentKind,
    words: usize,
    strategy: ChunkingStrategy,
}

impl Chunker {
    pub fn new(config: &ChunkConfig) -> Self {
        Self {
            min_words: config.min_words,
            max_words: config.max_words,
        }
    }

    /// Chunk one section's text. `vocabulary` carries the subject-scoped
    /// concept names already known to the graph.
    pub fn chunk_section(&self, text: &str, vocabulary: &[String]) -> Vec<RawChunk> {
        let segments = segment_text(text);
        let pieces = self.size_segments(segments);
        let mut chunks = self.pack(pieces);
        self.merge_trailing(&mut chunks);

        chunks
            .into_iter()
            .filter(|c| !c.text.trim().is_empty())
            .map(|c| self.finish(c, vocabulary))
            .collect()
    }

    /// Split any segment exceeding the window into sentence-packed pieces
    fn size_segments(&self, segments: Vec<Segment>) -> Vec<Piece> {
        let mut pieces = Vec::new();

        for segment in segments {
            let words = count_words(&segment.text);
            if words <= self.max_words {
                pieces.push(Piece {
                    text: segment.text,
                    kind: segment.kind,
                    words,
                    strategy: ChunkingStrategy::ContentAware,
                });
                continue;
            }

            trace!(words, "Segment exceeds window; sentence-boundary fallback");
            for window in pack_sentences(&segment.text, self.max_words) {
                let words = count_words(&window);
                pieces.push(Piece {
                    text: window,
                    kind: segment.kind.clone(),
                    words,
                    strategy: ChunkingStrategy::Fallback,
                });
            }
        }

        pieces
    }

    /// Greedy packing: paragraphs fill the current chunk; typed segments
    /// start a fresh chunk unless the current one is still below minimum.
    fn pack(&self, pieces: Vec<Piece>) -> Vec<PendingChunk> {
        let mut chunks: Vec<PendingChunk> = Vec::new();
        let mut current = PendingChunk::new();

        for piece in pieces {
            let fits = current.words + piece.words <= self.max_words;
            let fresh_for_typed = piece.kind.is_typed() && current.words >= self.min_words;

            if current.words > 0 && (!fits || fresh_for_typed) {
                chunks.push(std::mem::replace(&mut current, PendingChunk::new()));
            }
            current.push(&piece);
        }

        if current.words > 0 {
            chunks.push(current);
        }
        chunks
    }

    /// An undersized trailing chunk merges backward rather than surviving
    /// as a sliver.
    fn merge_trailing(&self, chunks: &mut Vec<PendingChunk>) {
        while chunks.len() > 1 {
            let last_words = chunks.last().map(|c| c.words).unwrap_or(0);
            if last_words >= self.min_words {
                break;
            }
            let last = chunks.pop().unwrap();
            let prev = chunks.last_mut().unwrap();
            prev.text.push_str("\n\n");
            prev.text.push_str(&last.text);
            prev.words += last.words;
            prev.kinds.extend(last.kinds);
            if last.strategy == ChunkingStrategy::Fallback {
                prev.strategy = ChunkingStrategy::Fallback;
            }
        }
    }

    fn finish(&self, pending: PendingChunk, vocabulary: &[String]) -> RawChunk {
        let metadata = resolve_metadata(&pending);
        let mut concepts = tag_concepts(&pending.text, vocabulary);
        for discovered in discover_concepts(&pending.text, &metadata) {
            if !concepts
                .iter()
                .any(|c| c.eq_ignore_ascii_case(&discovered))
            {
                concepts.push(discovered);
            }
        }
        let prerequisites = extract_prerequisites(&pending.text);
        let difficulty = difficulty_score(&pending.text);
        let sentence_count = pending.text.unicode_sentences().count();

        RawChunk {
            word_count: pending.words,
            sentence_count,
            metadata,
            strategy: pending.strategy,
            concepts,
            prerequisites,
            difficulty,
            text: pending.text,
        }
    }
}

/// Resolve a pending chunk's kinds to one content type; `Mixed` only when
/// distinct typed kinds remain together after packing.
fn resolve_metadata(pending: &PendingChunk) -> ChunkMetadata {
    let typed = pending.typed_kinds();
    let mut distinct: Vec<ContentType> = Vec::new();
    for kind in &typed {
        let ct = kind_content_type(kind);
        if !distinct.contains(&ct) {
            distinct.push(ct);
        }
    }

    match distinct.len() {
        0 => ChunkMetadata::Narrative,
        1 => kind_metadata(typed[0]),
        _ => ChunkMetadata::Mixed { types: distinct },
    }
}

fn kind_content_type(kind: &SegmentKind) -> ContentType {
    match kind {
        SegmentKind::Paragraph => ContentType::Narrative,
        SegmentKind::CodeFence { .. } => ContentType::Code,
        SegmentKind::Definition { .. } => ContentType::Definition,
        SegmentKind::Example { .. } => ContentType::Example,
        SegmentKind::Exercise { .. } => ContentType::Exercise,
        SegmentKind::Summary => ContentType::Summary,
    }
}

fn kind_metadata(kind: &SegmentKind) -> ChunkMetadata {
    match kind {
        SegmentKind::Paragraph => ChunkMetadata::Narrative,
        SegmentKind::CodeFence { language } => ChunkMetadata::Code {
            language: language.clone(),
        },
        SegmentKind::Definition { term } => ChunkMetadata::Definition { term: term.clone() },
        SegmentKind::Example { number } => ChunkMetadata::Example { number: *number },
        SegmentKind::Exercise { number } => ChunkMetadata::Exercise { number: *number },
        SegmentKind::Summary => ChunkMetadata::Summary,
    }
}

/// Pack sentences into windows of at most `max_words` words
fn pack_sentences(text: &str, max_words: usize) -> Vec<String> {
    let mut windows = Vec::new();
    let mut current = String::new();
    let mut words = 0usize;

    for sentence in text.unicode_sentences() {
        let sentence_words = count_words(sentence);
        if words > 0 && words + sentence_words > max_words {
            windows.push(current.trim().to_string());
            current = String::new();
            words = 0;
        }
        current.push_str(sentence);
        words += sentence_words;
    }
    if !current.trim().is_empty() {
        windows.push(current.trim().to_string());
    }
    windows
}

/// Whole-word, case-insensitive match of known concept names in the text
pub fn tag_concepts(text: &str, vocabulary: &[String]) -> Vec<String> {
    let mut tags = Vec::new();
    for name in vocabulary {
        if name.trim().is_empty() {
            continue;
        }
        let pattern = format!(r"(?i)\b{}\b", regex::escape(name));
        if let Ok(re) = Regex::new(&pattern) {
            if re.is_match(text) && !tags.contains(name) {
                tags.push(name.clone());
            }
        }
    }
    tags
}

fn capitalized_phrase_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b([A-Z][a-z]+(?:[ -][A-Z][a-z]+)+)\b").unwrap())
}

const PHRASE_STOPWORDS: &[&str] = &[
    "The", "This", "That", "These", "Those", "In", "On", "If", "For", "With", "When", "While",
    "After", "Before", "Chapter", "Section", "Figure", "Table",
];

/// Discover candidate concept names: defined terms plus capitalized
/// multi-word phrases that do not start with a stopword.
pub fn discover_concepts(text: &str, metadata: &ChunkMetadata) -> Vec<String> {
    let mut found = BTreeSet::new();

    if let ChunkMetadata::Definition { term: Some(term) } = metadata {
        found.insert(term.clone());
    }

    for caps in capitalized_phrase_re().captures_iter(text) {
        let phrase = caps[1].to_string();
        let first = phrase.split([' ', '-']).next().unwrap_or("");
        if !PHRASE_STOPWORDS.contains(&first) {
            found.insert(phrase);
        }
    }

    found.into_iter().collect()
}

fn prerequisite_phrase_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?:requires(?: knowledge of)?|recall(?: that)?|assumes familiarity with|as we saw in|builds on)\s+(?:the\s+)?([A-Z][\w-]*(?:\s+[A-Z][\w-]*){0,3})",
        )
        .unwrap()
    })
}

fn prerequisite_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(requires|recall|prerequisite|assumes familiarity|as we saw|builds on)\b")
            .unwrap()
    })
}

/// Extract prerequisite tags from marker phrases
pub fn extract_prerequisites(text: &str) -> Vec<String> {
    let mut prereqs = Vec::new();
    for caps in prerequisite_phrase_re().captures_iter(text) {
        let name = caps[1].trim().to_string();
        if !prereqs.contains(&name) {
            prereqs.push(name);
        }
    }
    prereqs
}

/// Difficulty in [0,1]: weighted over vocabulary rarity, sentence complexity,
/// and prerequisite-marker presence. Monotone non-decreasing in each signal.
pub fn difficulty_score(text: &str) -> f64 {
    let words: Vec<&str> = text.unicode_words().collect();
    if words.is_empty() {
        return 0.0;
    }

    let rare = words.iter().filter(|w| w.chars().count() >= 10).count() as f64 / words.len() as f64;

    let sentences = text.unicode_sentences().count().max(1);
    let avg_sentence_words = words.len() as f64 / sentences as f64;
    let complexity = (avg_sentence_words / 40.0).min(1.0);

    let markers = prerequisite_marker_re().find_iter(text).count() as f64;
    let prereq_presence = (markers * 0.5).min(1.0);

    (0.4 * rare + 0.4 * complexity + 0.2 * prereq_presence).clamp(0.0, 1.0)
}

pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChunkConfig;

    fn chunker() -> Chunker {
        Chunker::new(&ChunkConfig {
            min_words: 10,
            max_words: 60,
            min_section_words: 30,
        })
    }

    fn prose(words: usize) -> String {
        (0..words)
            .map(|i| format!("word{}", i))
            .collect::<Vec<_>>()
            .join(" ")
            + "."
    }

    #[test]
    fn test_paragraphs_pack_within_window() {
        let text = format!("{}\n\n{}\n\n{}", prose(20), prose(20), prose(30));
        let chunks = chunker().chunk_section(&text, &[]);

        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.word_count <= 60));
        assert!(chunks
            .iter()
            .all(|c| c.strategy == ChunkingStrategy::ContentAware));
    }

    #[test]
    fn test_oversized_paragraph_uses_sentence_fallback() {
        let long: String = (0..10)
            .map(|_| prose(15))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunker().chunk_section(&long, &[]);

        assert!(chunks.len() > 1);
        assert!(chunks
            .iter()
            .any(|c| c.strategy == ChunkingStrategy::Fallback));
    }

    #[test]
    fn test_code_fence_becomes_code_chunk() {
        let text = format!(
            "{}\n\n```python\ndef bubble_sort(a):\n    return sorted(a)\n```",
            prose(15)
        );
        let chunks = chunker().chunk_section(&text, &[]);

        let code = chunks
            .iter()
            .find(|c| matches!(c.metadata, ChunkMetadata::Code { .. }))
            .expect("code chunk");
        match &code.metadata {
            ChunkMetadata::Code { language } => assert_eq!(language.as_deref(), Some("python")),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_definition_marker_classification() {
        let text = format!(
            "Definition: A heap is a tree-shaped priority structure that keeps its smallest element on top for quick access. {}",
            prose(20)
        );
        let chunks = chunker().chunk_section(&text, &[]);

        assert_eq!(chunks.len(), 1);
        assert!(matches!(
            chunks[0].metadata,
            ChunkMetadata::Definition { .. }
        ));
    }

    #[test]
    fn test_mixed_when_trailing_merge_joins_types() {
        // A definition followed by a short exercise that cannot stand alone
        let text = format!(
            "Definition: A graph is a set of vertices joined by edges, {}\n\nExercise 1: Draw one.",
            prose(20)
        );
        let chunks = chunker().chunk_section(&text, &[]);

        assert_eq!(chunks.len(), 1);
        match &chunks[0].metadata {
            ChunkMetadata::Mixed { types } => {
                assert!(types.contains(&ContentType::Definition));
                assert!(types.contains(&ContentType::Exercise));
            }
            other => panic!("expected mixed, got {:?}", other),
        }
    }

    #[test]
    fn test_concept_tagging_from_vocabulary() {
        let vocab = vec!["Binary Search".to_string(), "Hash Table".to_string()];
        let text = format!(
            "The binary search algorithm halves the range each step. {}",
            prose(15)
        );
        let tags = tag_concepts(&text, &vocab);
        assert_eq!(tags, vec!["Binary Search".to_string()]);
    }

    #[test]
    fn test_discover_concepts_skips_stopword_phrases() {
        let text = "This Chapter Covers things. Quick Sort and Merge Sort are compared.";
        let found = discover_concepts(text, &ChunkMetadata::Narrative);
        assert!(found.contains(&"Quick Sort".to_string()));
        assert!(found.contains(&"Merge Sort".to_string()));
        assert!(!found.iter().any(|c| c.starts_with("This")));
    }

    #[test]
    fn test_extract_prerequisites() {
        let text = "This chapter builds on Sorting Basics and assumes familiarity with Arrays.";
        let prereqs = extract_prerequisites(text);
        assert_eq!(prereqs, vec!["Sorting Basics".to_string(), "Arrays".to_string()]);
    }

    #[test]
    fn test_difficulty_monotonic_in_jargon() {
        let plain = "The cat sat on the mat. It was warm there.";
        let dense = "The isomorphism characterization presupposes combinatorial foundations. \
                     Understanding amortization requires asymptotic sophistication.";
        assert!(difficulty_score(dense) > difficulty_score(plain));
    }

    #[test]
    fn test_difficulty_monotonic_in_sentence_length() {
        let short = "One two three. Four five six. Seven eight nine.";
        let long = "One two three four five six seven eight nine ten eleven twelve thirteen \
                    fourteen fifteen sixteen seventeen eighteen nineteen twenty and more words.";
        assert!(difficulty_score(long) > difficulty_score(short));
    }

    #[test]
    fn test_difficulty_bounds() {
        assert_eq!(difficulty_score(""), 0.0);
        let extreme = "incomprehensibility ".repeat(100) + "requires recall prerequisite";
        let score = difficulty_score(&extreme);
        assert!((0.0..=1.0).contains(&score));
    }
}
