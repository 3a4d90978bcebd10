//! Search command: expansion-backed retrieval over the vector index

use crate::config::Config;
use crate::embed::{Embedder, GuardedService};
use crate::error::Result;
use crate::expand::QueryExpander;
use crate::graph::GraphStore;
use crate::index::VectorIndex;
use crate::search::{CompareOutcome, SearchEngine, SearchMethod, SearchOptions, SearchOutcome};

/// Run a search and resolve hit text from the graph
pub async fn cmd_search(
    config: &Config,
    index: &VectorIndex,
    embedder: &dyn Embedder,
    guard: &GuardedService,
    expander: Option<&dyn QueryExpander>,
    query: &str,
    options: SearchOptions,
) -> Result<SearchOutcome> {
    let engine = SearchEngine::new(config, index, embedder, guard, expander);
    engine.search(query, &options).await
}

/// Run expanded vs. direct retrieval side by side
pub async fn cmd_compare(
    config: &Config,
    index: &VectorIndex,
    embedder: &dyn Embedder,
    guard: &GuardedService,
    expander: Option<&dyn QueryExpander>,
    query: &str,
    options: SearchOptions,
) -> Result<CompareOutcome> {
    let engine = SearchEngine::new(config, index, embedder, guard, expander);
    engine.compare(query, &options).await
}

/// Plain-text results printer; pulls chunk text snippets from the graph
pub async fn print_search_results(store: &GraphStore, outcome: &SearchOutcome) -> Result<()> {
    match outcome.method {
        SearchMethod::Fallback => {
            println!("⚠ Search ran degraded: expansion or embedding was unavailable.");
        }
        SearchMethod::Expanded => {
            if let Some(expanded) = &outcome.expanded {
                println!("Expanded query: {}\n", expanded);
            }
        }
        SearchMethod::Direct => {}
    }

    if outcome.results.is_empty() {
        println!("No results for '{}'.", outcome.query);
        return Ok(());
    }

    println!(
        "{} result(s) for '{}' ({}):\n",
        outcome.results.len(),
        outcome.query,
        outcome.method
    );

    for (i, hit) in outcome.results.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} (difficulty {:.2}, quality {:.2}, pages {}-{})",
            i + 1,
            hit.score,
            hit.content_type,
            hit.difficulty,
            hit.quality,
            hit.page_start,
            hit.page_end
        );
        if !hit.concepts.is_empty() {
            println!("   concepts: {}", hit.concepts.join(", "));
        }
        if let Some(chunk) = store.get_chunk(&hit.chunk_id).await? {
            println!("   {}", snippet(&chunk.text, 200));
        }
        println!();
    }

    Ok(())
}

/// Plain-text comparison printer
pub fn print_compare_results(outcome: &CompareOutcome) {
    println!(
        "Expanded: {} result(s) ({})",
        outcome.expanded.results.len(),
        outcome.expanded.method
    );
    println!(
        "Direct:   {} result(s) ({})",
        outcome.direct.results.len(),
        outcome.direct.method
    );

    if !outcome.only_expanded.is_empty() {
        println!("\nOnly found via expansion:");
        for id in &outcome.only_expanded {
            println!("  {}", id);
        }
    }
    if !outcome.only_direct.is_empty() {
        println!("\nOnly found via the raw query:");
        for id in &outcome.only_direct {
            println!("  {}", id);
        }
    }
}

fn snippet(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}…", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snippet_truncates_on_char_boundary() {
        let s = snippet("a".repeat(300).as_str(), 200);
        assert_eq!(s.chars().count(), 201); // 200 chars + ellipsis
        assert!(s.ends_with('…'));
    }

    #[test]
    fn test_snippet_flattens_whitespace() {
        assert_eq!(snippet("a\n\nb\tc", 100), "a b c");
    }
}
