//! Prerequisite-aware learning path planning
//!
//! Plans an ordered reading path toward target concepts: collect the
//! transitive prerequisite closure, subtract what the learner already knows
//! (knowing a concept implies knowing its prerequisites), topologically
//! order the remainder, and attach the best chunk plus a time estimate to
//! each step.

use crate::config::PathPlanConfig;
use crate::error::{Error, Result};
use crate::graph::{GraphStore, PrerequisiteSnapshot};
use crate::model::{Chunk, Concept, ContentType};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// The chunk chosen to teach one concept
#[derive(Debug, Clone, Serialize)]
pub struct SegmentChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub content_type: String,
    pub quality: f64,
    pub word_count: i32,
    pub page_start: i32,
    pub page_end: i32,
}

/// One step of a learning path
#[derive(Debug, Clone, Serialize)]
pub struct PathSegment {
    pub concept_id: String,
    pub concept_name: String,
    pub difficulty: f64,
    /// Best available chunk; a concept can exist with no teaching material
    pub chunk: Option<SegmentChunk>,
    pub estimated_hours: f64,
}

/// A planned learning path
#[derive(Debug, Clone, Serialize)]
pub struct LearningPath {
    pub targets: Vec<String>,
    pub segments: Vec<PathSegment>,
    pub total_hours: f64,
    /// True when a time budget cut the path short
    pub truncated: bool,
    /// Concept names dropped by the budget, in planned order
    pub dropped: Vec<String>,
}

/// In-memory prerequisite graph built from a store snapshot
pub struct PrerequisiteGraph {
    concepts: HashMap<String, Concept>,
    /// concept id -> ids of its direct prerequisites
    prerequisites: HashMap<String, Vec<String>>,
    /// concept id -> ids of concepts that require it
    dependents: HashMap<String, Vec<String>>,
}

impl PrerequisiteGraph {
    pub fn from_snapshot(snapshot: PrerequisiteSnapshot) -> Self {
        let mut prerequisites: HashMap<String, Vec<String>> = HashMap::new();
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();

        for edge in &snapshot.edges {
            prerequisites
                .entry(edge.from_concept_id.clone())
                .or_default()
                .push(edge.to_concept_id.clone());
            dependents
                .entry(edge.to_concept_id.clone())
                .or_default()
                .push(edge.from_concept_id.clone());
        }

        let concepts = snapshot
            .concepts
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();

        Self {
            concepts,
            prerequisites,
            dependents,
        }
    }

    pub fn concept(&self, id: &str) -> Option<&Concept> {
        self.concepts.get(id)
    }

    /// Transitive prerequisite closure of `roots`, including the roots
    fn closure(&self, roots: &[String]) -> HashSet<String> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut stack: Vec<String> = roots.to_vec();

        while let Some(id) = stack.pop() {
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(prereqs) = self.prerequisites.get(&id) {
                for p in prereqs {
                    if !seen.contains(p) {
                        stack.push(p.clone());
                    }
                }
            }
        }
        seen
    }

    /// Order `targets` and their unmet prerequisites so every prerequisite
    /// precedes its dependent. Knowing a concept implies knowing its whole
    /// prerequisite closure, so known concepts subtract theirs too.
    ///
    /// Deterministic: among ready concepts, lowest difficulty first, then
    /// highest importance, then id.
    pub fn plan_order(&self, targets: &[String], known: &[String]) -> Result<Vec<String>> {
        let known_closure = self.closure(known);
        let needed: HashSet<String> = self
            .closure(targets)
            .into_iter()
            .filter(|id| !known_closure.contains(id))
            .collect();

        debug!(
            targets = targets.len(),
            needed = needed.len(),
            "Planning prerequisite order"
        );

        // Kahn's algorithm over the induced subgraph
        let mut in_degree: HashMap<&str, usize> = needed
            .iter()
            .map(|id| {
                let unmet = self
                    .prerequisites
                    .get(id)
                    .map(|ps| ps.iter().filter(|p| needed.contains(*p)).count())
                    .unwrap_or(0);
                (id.as_str(), unmet)
            })
            .collect();

        let mut ready: Vec<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut ordered: Vec<String> = Vec::with_capacity(needed.len());

        while !ready.is_empty() {
            ready.sort_by(|a, b| {
                let ca = self.concepts.get(*a);
                let cb = self.concepts.get(*b);
                let da = ca.map(|c| c.difficulty).unwrap_or(0.5);
                let db = cb.map(|c| c.difficulty).unwrap_or(0.5);
                let ia = ca.map(|c| c.importance).unwrap_or(0.5);
                let ib = cb.map(|c| c.importance).unwrap_or(0.5);
                da.partial_cmp(&db)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| ib.partial_cmp(&ia).unwrap_or(std::cmp::Ordering::Equal))
                    .then_with(|| a.cmp(b))
            });

            let next = ready.remove(0);
            ordered.push(next.to_string());

            if let Some(deps) = self.dependents.get(next) {
                for dep in deps {
                    if let Some(d) = in_degree.get_mut(dep.as_str()) {
                        *d -= 1;
                        if *d == 0 {
                            ready.push(dep.as_str());
                        }
                    }
                }
            }
        }

        if ordered.len() != needed.len() {
            // Store-side acyclicity makes this unreachable in practice
            let stuck: Vec<String> = needed
                .iter()
                .filter(|id| !ordered.contains(*id))
                .map(|id| {
                    self.concepts
                        .get(id)
                        .map(|c| c.name.clone())
                        .unwrap_or_else(|| id.clone())
                })
                .collect();
            return Err(Error::PrerequisiteCycle(stuck.join(", ")));
        }

        Ok(ordered)
    }
}

/// Estimated reading time in hours for one chunk
pub fn estimate_hours(chunk: &Chunk, config: &PathPlanConfig) -> f64 {
    let mut hours = chunk.word_count as f64 / (config.reading_wpm * 60.0);
    if chunk
        .get_content_type()
        .map(|t| t == ContentType::Exercise)
        .unwrap_or(false)
    {
        hours *= config.exercise_multiplier;
    }
    hours.max(config.min_segment_hours)
}

/// Pick the chunk that best teaches a concept: highest quality weighted by
/// mention relevance, tie-broken by chunk id.
pub fn best_chunk(candidates: &[(Chunk, f64)]) -> Option<&Chunk> {
    candidates
        .iter()
        .max_by(|(a, ra), (b, rb)| {
            (a.quality * ra)
                .partial_cmp(&(b.quality * rb))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.id.cmp(&a.id))
        })
        .map(|(chunk, _)| chunk)
}

/// Apply a time budget: keep segments while they fit, drop the rest.
///
/// Pure, so truncation behavior is testable without a store.
pub fn apply_budget(
    mut segments: Vec<PathSegment>,
    budget_hours: Option<f64>,
) -> (Vec<PathSegment>, bool, Vec<String>) {
    let Some(budget) = budget_hours else {
        return (segments, false, Vec::new());
    };

    let mut total = 0.0;
    let mut cut = segments.len();
    for (i, segment) in segments.iter().enumerate() {
        if total + segment.estimated_hours > budget {
            cut = i;
            break;
        }
        total += segment.estimated_hours;
    }

    let dropped: Vec<String> = segments
        .drain(cut..)
        .map(|s| s.concept_name)
        .collect();
    let truncated = !dropped.is_empty();
    (segments, truncated, dropped)
}

/// Path planner over the graph store
pub struct PathPlanner<'a> {
    store: &'a GraphStore,
    config: PathPlanConfig,
}

impl<'a> PathPlanner<'a> {
    pub fn new(store: &'a GraphStore, config: PathPlanConfig) -> Self {
        Self { store, config }
    }

    /// Plan a path toward `targets` (concept names), skipping `known` ones.
    ///
    /// Unknown target names are an error; unknown known-names are ignored.
    pub async fn plan(
        &self,
        targets: &[String],
        known: &[String],
        subject: Option<&str>,
        budget_hours: Option<f64>,
    ) -> Result<LearningPath> {
        let mut target_ids = Vec::with_capacity(targets.len());
        for name in targets {
            let concept = self
                .store
                .find_concept(name, subject)
                .await?
                .ok_or_else(|| Error::ConceptNotFound(name.clone()))?;
            target_ids.push(concept.id);
        }

        let mut known_ids = Vec::new();
        for name in known {
            if let Some(concept) = self.store.find_concept(name, subject).await? {
                known_ids.push(concept.id);
            }
        }

        let snapshot = self.store.load_prerequisite_snapshot().await?;
        let graph = PrerequisiteGraph::from_snapshot(snapshot);
        let ordered = graph.plan_order(&target_ids, &known_ids)?;

        let mut segments = Vec::with_capacity(ordered.len());
        for concept_id in &ordered {
            let concept = graph
                .concept(concept_id)
                .ok_or_else(|| Error::ConceptNotFound(concept_id.clone()))?;

            let candidates = self.store.chunks_for_concept(concept_id).await?;
            let chosen = best_chunk(&candidates);

            let estimated_hours = chosen
                .map(|c| estimate_hours(c, &self.config))
                .unwrap_or(self.config.min_segment_hours);

            segments.push(PathSegment {
                concept_id: concept_id.clone(),
                concept_name: concept.name.clone(),
                difficulty: concept.difficulty,
                chunk: chosen.map(|c| SegmentChunk {
                    chunk_id: c.id.clone(),
                    document_id: c.document_id.clone(),
                    content_type: c.content_type.clone(),
                    quality: c.quality,
                    word_count: c.word_count,
                    page_start: c.page_start,
                    page_end: c.page_end,
                }),
                estimated_hours,
            });
        }

        let (segments, truncated, dropped) = apply_budget(segments, budget_hours);
        let total_hours = segments.iter().map(|s| s.estimated_hours).sum();

        Ok(LearningPath {
            targets: targets.to_vec(),
            segments,
            total_hours,
            truncated,
            dropped,
        })
    }
}
