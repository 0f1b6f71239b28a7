use anyhow::Result;

use crate::config::GlimpseConfig;
use crate::pipeline::Embedder;

/// Run a similarity search from the terminal.
pub fn search(config: &GlimpseConfig, query: &str, limit: Option<usize>) -> Result<()> {
    let conn = crate::db::open_database(config.resolved_db_path())?;

    let embedder = Embedder::from_config(&config.embedding);
    let Some(provider) = embedder.provider() else {
        anyhow::bail!("embedding backend unavailable; run `glimpse model download` first");
    };

    let hits = crate::context::search::search_by_text(
        &conn,
        provider.as_ref(),
        query,
        limit.unwrap_or(config.search.max_results),
        config.search.min_similarity,
    )?;

    if hits.is_empty() {
        println!("No matching captures.");
        return Ok(());
    }

    println!("Found {} capture(s)\n", hits.len());
    for (i, hit) in hits.iter().enumerate() {
        let preview = preview(&hit.description, 120);
        println!(
            "  {}. {} (similarity: {:.3}) at {}",
            i + 1,
            hit.capture_id,
            hit.similarity,
            hit.timestamp,
        );
        println!("     {preview}");
        if !hit.tags.is_empty() {
            println!("     tags: {}", hit.tags);
        }
        println!();
    }

    Ok(())
}

/// Truncate a description to at most `max_chars` characters, respecting
/// character boundaries.
fn preview(description: &str, max_chars: usize) -> String {
    match description.char_indices().nth(max_chars) {
        Some((byte_index, _)) => format!("{}...", &description[..byte_index]),
        None => description.to_string(),
    }
}
