//! Index statistics.
//!
//! Provides a quick summary of what's indexed: chunk totals per subject and
//! the size of the vector store. Used by `aula stats` to give confidence
//! that indexing worked as expected.

use anyhow::Result;

use aula_retrieval_core::models::IndexStats;

use crate::system::RetrievalSystem;

/// Run the stats command: read the live index and print a summary.
pub async fn run_stats(system: &RetrievalSystem, json: bool) -> Result<()> {
    let stats = system.stats().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let config = system.config();
    let db_path = config.storage.vectors_path();
    let db_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    println!("Aula Retrieval - Index Stats");
    println!("============================");
    println!();
    println!("  Corpus:      {}", config.corpus.dir.display());
    println!("  Collection:  {}", config.storage.collection);
    println!("  Store:       {} ({})", db_path.display(), format_bytes(db_size));
    println!();
    print!("{}", format_stats(&stats));
    println!();

    Ok(())
}

/// Render totals and the per-subject table.
pub fn format_stats(stats: &IndexStats) -> String {
    let status = serde_json::to_value(stats.status)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();

    let mut out = String::new();
    out.push_str(&format!("  Status:      {}\n", status));
    out.push_str(&format!("  Chunks:      {}\n", stats.total_chunks));

    if !stats.per_subject.is_empty() {
        out.push('\n');
        out.push_str("  By subject:\n");
        out.push_str(&format!("  {:<28} {:>8}\n", "SUBJECT", "CHUNKS"));
        out.push_str(&format!("  {}\n", "-".repeat(37)));
        for (subject, count) in &stats.per_subject {
            out.push_str(&format!("  {:<28} {:>8}\n", subject, count));
        }
    }

    out
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
