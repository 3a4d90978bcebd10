//! Chunk quality scoring
//!
//! Quality combines length-normalized coherence (does the chunk read as a
//! complete thought), educational alignment (definitions, examples, key
//! points), and the extraction confidence inherited from the parent section.
//! Chunks below the configured quality floor are retained but excluded from
//! default retrieval ranking.

use crate::model::{ChunkMetadata, ContentType};
use regex::Regex;
use std::sync::OnceLock;
use unicode_segmentation::UnicodeSegmentation;

const WEIGHT_COHERENCE: f64 = 0.4;
const WEIGHT_ALIGNMENT: f64 = 0.35;
const WEIGHT_CONFIDENCE: f64 = 0.25;

/// The ideal word window for embedding quality
const IDEAL_MIN_WORDS: f64 = 50.0;
const IDEAL_MAX_WORDS: f64 = 500.0;

/// Combined quality assessment for one chunk
#[derive(Debug, Clone, Copy)]
pub struct QualityScores {
    pub coherence: f64,
    pub alignment: f64,
    pub quality: f64,
}

/// Score a chunk's quality given its text, metadata, and the extraction
/// confidence of the section it came from.
pub fn score_chunk(text: &str, metadata: &ChunkMetadata, section_confidence: f64) -> QualityScores {
    let coherence = coherence_score(text, metadata);
    let alignment = alignment_score(text, metadata);
    let quality = (WEIGHT_COHERENCE * coherence
        + WEIGHT_ALIGNMENT * alignment
        + WEIGHT_CONFIDENCE * section_confidence.clamp(0.0, 1.0))
    .clamp(0.0, 1.0);

    QualityScores {
        coherence,
        alignment,
        quality,
    }
}

fn terminal_punct(sentence: &str) -> bool {
    matches!(
        sentence.trim_end().chars().last(),
        Some('.') | Some('!') | Some('?') | Some(':') | Some(';')
    )
}

/// Length-normalized coherence: complete-sentence ratio, penalized when the
/// chunk falls outside the ideal word window. Code chunks are judged on the
/// window only; sentence structure means nothing in source code.
pub fn coherence_score(text: &str, metadata: &ChunkMetadata) -> f64 {
    let words = text.split_whitespace().count() as f64;
    if words == 0.0 {
        return 0.0;
    }

    let length_factor = if words < IDEAL_MIN_WORDS {
        words / IDEAL_MIN_WORDS
    } else if words > IDEAL_MAX_WORDS {
        (IDEAL_MAX_WORDS / words).max(0.5)
    } else {
        1.0
    };

    if metadata.content_type() == ContentType::Code {
        return length_factor.clamp(0.0, 1.0);
    }

    let sentences: Vec<&str> = text.unicode_sentences().collect();
    if sentences.is_empty() {
        return (0.3 * length_factor).clamp(0.0, 1.0);
    }
    let complete = sentences.iter().filter(|s| terminal_punct(s)).count() as f64;
    let complete_ratio = complete / sentences.len() as f64;

    (complete_ratio * length_factor).clamp(0.0, 1.0)
}

fn key_point_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(key point|important|note that|remember|in other words|that is,)\b")
            .unwrap()
    })
}

fn educational_cue_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(definition|theorem|example|for instance|exercise|summary|such as)\b")
            .unwrap()
    })
}

/// Educational alignment: typed content starts ahead of plain narrative,
/// and in-text cues raise the score further.
pub fn alignment_score(text: &str, metadata: &ChunkMetadata) -> f64 {
    let base = match metadata.content_type() {
        ContentType::Definition | ContentType::Example | ContentType::Exercise => 0.8,
        ContentType::Summary | ContentType::Code => 0.7,
        ContentType::Mixed => 0.6,
        ContentType::Narrative => 0.4,
    };

    let cues = educational_cue_re().find_iter(text).count() as f64;
    let key_points = key_point_re().find_iter(text).count() as f64;
    let bonus = (cues * 0.05 + key_points * 0.05).min(0.2);

    (base + bonus).clamp(0.0, 1.0)
}
