//! Link command: manage REQUIRES edges between concepts by name

use crate::error::{Error, Result};
use crate::graph::GraphStore;
use crate::model::Concept;
use serde::Serialize;

/// Outcome of a link operation
#[derive(Debug, Clone, Serialize)]
pub struct LinkStats {
    pub from: String,
    pub to: String,
    pub strength: f64,
}

/// Add a REQUIRES edge: `from` depends on `to`.
///
/// Both concepts must already exist; the store rejects edges that would
/// close a cycle.
pub async fn cmd_link(
    store: &GraphStore,
    from_name: &str,
    to_name: &str,
    subject: Option<&str>,
    strength: f64,
) -> Result<LinkStats> {
    let from = resolve(store, from_name, subject).await?;
    let to = resolve(store, to_name, subject).await?;

    store.add_requires_edge(&from.id, &to.id, strength).await?;

    Ok(LinkStats {
        from: from.name,
        to: to.name,
        strength,
    })
}

async fn resolve(store: &GraphStore, name: &str, subject: Option<&str>) -> Result<Concept> {
    store
        .find_concept(name, subject)
        .await?
        .ok_or_else(|| Error::ConceptNotFound(name.to_string()))
}

pub fn print_link_stats(stats: &LinkStats) {
    println!(
        "✓ '{}' now requires '{}' (strength {:.2})",
        stats.from, stats.to, stats.strength
    );
}
