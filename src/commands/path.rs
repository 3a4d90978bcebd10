//! Path command: plan a prerequisite-ordered learning path

use crate::config::Config;
use crate::error::Result;
use crate::graph::GraphStore;
use crate::path::{LearningPath, PathPlanner};

/// Plan a learning path toward the target concepts
pub async fn cmd_path(
    config: &Config,
    store: &GraphStore,
    targets: &[String],
    known: &[String],
    subject: Option<&str>,
    budget_hours: Option<f64>,
) -> Result<LearningPath> {
    let planner = PathPlanner::new(store, config.path.clone());
    planner.plan(targets, known, subject, budget_hours).await
}

/// Plain-text path printer
pub fn print_learning_path(path: &LearningPath) {
    if path.segments.is_empty() {
        println!(
            "Nothing to learn: target(s) already covered ({}).",
            path.targets.join(", ")
        );
        return;
    }

    println!(
        "Learning path toward {} ({} step(s), ~{:.1}h):\n",
        path.targets.join(", "),
        path.segments.len(),
        path.total_hours
    );

    for (i, segment) in path.segments.iter().enumerate() {
        println!(
            "{}. {} (difficulty {:.2}, ~{:.1}h)",
            i + 1,
            segment.concept_name,
            segment.difficulty,
            segment.estimated_hours
        );
        match &segment.chunk {
            Some(chunk) => println!(
                "   read: {} chunk, pages {}-{} (quality {:.2})",
                chunk.content_type, chunk.page_start, chunk.page_end, chunk.quality
            ),
            None => println!("   no teaching material indexed yet"),
        }
    }

    if path.truncated {
        println!(
            "\n⚠ Time budget reached; dropped: {}",
            path.dropped.join(", ")
        );
    }
}
