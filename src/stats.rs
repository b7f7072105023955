//! Index statistics and health overview.
//!
//! Summarizes what's indexed: entry counts, embedding coverage and a
//! per-section breakdown. Used by `ncm stats` to confirm that seeding and
//! embedding runs did what they should.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;
use crate::store::{NomenclatureStore, SqliteStore};

struct SectionStats {
    section: String,
    entry_count: i64,
    embedded_count: i64,
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);
    let stats = store.stats().await?;

    let last_update: Option<i64> = sqlx::query_scalar("SELECT MAX(updated_at) FROM ncm_entries")
        .fetch_one(store.pool())
        .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    let pending = stats.entries.saturating_sub(stats.embedded);

    println!("NCM Search: Index Stats");
    println!("========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!(
        "  Updated:     {}",
        last_update
            .map(format_ts_relative)
            .unwrap_or_else(|| "never".to_string())
    );
    println!();
    println!("  Entries:     {}", stats.entries);
    println!("  Chapters:    {}", stats.chapters);
    println!(
        "  Embedded:    {} / {} ({}%)",
        stats.embedded,
        stats.entries,
        if stats.entries > 0 {
            (stats.embedded * 100) / stats.entries
        } else {
            0
        }
    );
    println!("  Stale:       {}", stats.stale);
    println!("  Pending:     {}", pending);
    if let Some(dims) = stats.dims {
        println!("  Dimensions:  {}", dims);
    }

    let section_rows = sqlx::query(
        r#"
        SELECT
            COALESCE(e.section, '?') AS section,
            COUNT(*) AS entry_count,
            COUNT(v.code) AS embedded_count
        FROM ncm_entries e
        LEFT JOIN ncm_vectors v
               ON v.code = e.code AND v.description_hash = e.description_hash
        GROUP BY e.section
        ORDER BY MIN(e.chapter) ASC
        "#,
    )
    .fetch_all(store.pool())
    .await?;

    let sections: Vec<SectionStats> = section_rows
        .iter()
        .map(|row| SectionStats {
            section: row.get("section"),
            entry_count: row.get("entry_count"),
            embedded_count: row.get("embedded_count"),
        })
        .collect();

    if !sections.is_empty() {
        println!();
        println!("  By section:");
        println!("  {:<8} {:>8} {:>10}", "SECTION", "ENTRIES", "EMBEDDED");
        println!("  {}", "-".repeat(28));
        for s in &sections {
            println!(
                "  {:<8} {:>8} {:>10}",
                s.section, s.entry_count, s.embedded_count
            );
        }
    }

    println!();

    store.pool().close().await;
    Ok(())
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

/// Format a Unix timestamp relative to now (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
