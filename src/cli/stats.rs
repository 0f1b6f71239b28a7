use anyhow::Result;
use rusqlite::Connection;

use crate::config::GlimpseConfig;

/// Display capture statistics in the terminal.
pub fn stats(config: &GlimpseConfig) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = crate::db::open_database(&db_path)?;

    let total = crate::context::store::capture_count(&conn)?;
    let analyzed = count(&conn, "SELECT COUNT(*) FROM captures WHERE analyzed = 1")?;
    let embedded = count(&conn, "SELECT COUNT(*) FROM captures WHERE embedded = 1")?;
    let indexed = crate::index::count(&conn)?;
    let tasks = count(&conn, "SELECT COUNT(*) FROM tasks")?;
    let active_tasks = count(&conn, "SELECT COUNT(*) FROM tasks WHERE status = 'active'")?;
    let links = count(&conn, "SELECT COUNT(*) FROM activity_links")?;
    let disk = count(&conn, "SELECT COALESCE(SUM(file_size), 0) FROM captures")?;
    let db_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    println!("Capture Statistics");
    println!("{}", "=".repeat(40));
    println!("  Captures:            {total}");
    println!("  Analyzed:            {analyzed}");
    println!("  Embedded:            {embedded}");
    println!("  Indexed vectors:     {indexed}");
    println!("  Pending embeddings:  {}", analyzed.saturating_sub(embedded));
    println!();
    println!("  Tasks:               {tasks} ({active_tasks} active)");
    println!("  Activity links:      {links}");
    println!();
    println!("  Image bytes on disk: {disk}");
    println!("  Database size:       {db_size} bytes");

    let newest: Option<String> = conn
        .query_row("SELECT MAX(created_at) FROM captures", [], |r| r.get(0))
        .unwrap_or(None);
    if let Some(newest) = newest {
        println!("  Newest capture:      {newest}");
    }

    Ok(())
}

fn count(conn: &Connection, sql: &str) -> Result<u64> {
    let n: i64 = conn.query_row(sql, [], |r| r.get(0))?;
    Ok(n.max(0) as u64)
}
