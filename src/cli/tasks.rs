use anyhow::Result;

use crate::config::GlimpseConfig;
use crate::context::store;
use crate::context::types::{Task, TaskStatus};
use crate::pipeline::Embedder;

/// Register a task for activity matching. The task text is embedded up
/// front so the matcher never has to.
pub fn add(config: &GlimpseConfig, title: &str, description: Option<&str>) -> Result<()> {
    let conn = crate::db::open_database(config.resolved_db_path())?;
    let embedder = Embedder::from_config(&config.embedding);

    let now = chrono::Utc::now().to_rfc3339();
    let task = Task {
        id: uuid::Uuid::now_v7().to_string(),
        title: title.to_string(),
        description: description.map(Into::into),
        status: TaskStatus::Active,
        embedding: None,
        created_at: now.clone(),
        updated_at: now,
    };
    let embedding = embedder.generate(&task.matchable_text());

    store::insert_task(&conn, &task)?;
    match embedding {
        Some(embedding) => {
            store::set_task_embedding(&conn, &task.id, &embedding)?;
            println!("Task {} added and embedded.", task.id);
        }
        None => {
            println!(
                "Task {} added without an embedding; semantic matching will skip it.",
                task.id
            );
        }
    }
    Ok(())
}

/// List tasks and how much linked activity each has accumulated.
pub fn list(config: &GlimpseConfig) -> Result<()> {
    let conn = crate::db::open_database(config.resolved_db_path())?;

    let mut stmt = conn.prepare(
        "SELECT t.id, t.title, t.status, t.embedding IS NOT NULL, \
                COUNT(l.id), COALESCE(SUM(l.duration_minutes), 0) \
         FROM tasks t LEFT JOIN activity_links l ON l.task_id = t.id \
         GROUP BY t.id ORDER BY t.created_at DESC",
    )?;
    let rows: Vec<(String, String, String, bool, i64, i64)> = stmt
        .query_map([], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    if rows.is_empty() {
        println!("No tasks.");
        return Ok(());
    }

    for (id, title, status, has_embedding, links, minutes) in rows {
        let marker = if has_embedding { "" } else { " (no embedding)" };
        println!("  [{status}] {title}{marker}");
        println!("      {id} — {links} link(s), ~{minutes} min tracked");
    }
    Ok(())
}

/// Change a task's status.
pub fn set_status(config: &GlimpseConfig, task_id: &str, status: TaskStatus) -> Result<()> {
    let conn = crate::db::open_database(config.resolved_db_path())?;
    if store::set_task_status(&conn, task_id, status)? {
        println!("Task {task_id} is now {status}.");
    } else {
        anyhow::bail!("task not found: {task_id}");
    }
    Ok(())
}
