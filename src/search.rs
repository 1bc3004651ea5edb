//! The `aula search` command.

use anyhow::Result;

use aula_retrieval_core::models::{SearchOutcome, SENTINEL_DISTANCE};

use crate::system::RetrievalSystem;

pub async fn run_search(
    system: &RetrievalSystem,
    query: &str,
    results: Option<usize>,
    json: bool,
) -> Result<()> {
    let desired = results.unwrap_or(system.config().retrieval.default_results);
    let outcome = system.search(query, desired).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print!("{}", format_outcome(&outcome));
    }
    Ok(())
}

/// Human-readable rendering of a search outcome.
pub fn format_outcome(outcome: &SearchOutcome) -> String {
    if outcome.best_distance == SENTINEL_DISTANCE {
        return "No search performed (small talk, short query, or empty index).\n".to_string();
    }
    if !outcome.has_context() {
        return format!(
            "No confident match (best distance {:.3}).\n",
            outcome.best_distance
        );
    }

    let mut out = String::new();
    out.push_str(&format!("best distance: {:.3}\n", outcome.best_distance));
    out.push_str(&format!("sources: {}\n", outcome.sources.join(", ")));
    out.push('\n');
    out.push_str(&outcome.context);
    out.push('\n');
    out
}
