use anyhow::Result;

use crate::config::GlimpseConfig;
use crate::context::resurface;
use crate::pipeline::Embedder;

/// Print resurfacing suggestions. With a query, suggestions are anchored on
/// its embedding; without one, the recency fallback applies.
pub fn resurface(
    config: &GlimpseConfig,
    query: Option<&str>,
    window_days: Option<f64>,
) -> Result<()> {
    let conn = crate::db::open_database(config.resolved_db_path())?;

    let suggestions = match query {
        Some(query) => {
            let embedder = Embedder::from_config(&config.embedding);
            let Some(provider) = embedder.provider() else {
                anyhow::bail!("embedding backend unavailable; run `glimpse model download` first");
            };
            resurface::resurface_by_text(
                &conn,
                provider.as_ref(),
                query,
                &config.resurfacing,
                window_days,
            )?
        }
        None => resurface::recent_suggestions(&conn, &config.resurfacing, window_days)?,
    };

    if suggestions.is_empty() {
        println!("Nothing to resurface.");
        return Ok(());
    }

    println!("{} suggestion(s)\n", suggestions.len());
    for (i, s) in suggestions.iter().enumerate() {
        println!(
            "  {}. {} (relevance: {:.3}, similarity: {:.3}) from {}",
            i + 1,
            s.capture_id,
            s.relevance,
            s.similarity,
            s.timestamp,
        );
        if !s.description.is_empty() {
            println!("     {}", s.description);
        }
        println!();
    }

    Ok(())
}
