//! Collection overview.
//!
//! Backs `civic collections`: lists every collection in the index with its
//! entry count and the fingerprint it was built with, and flags the one the
//! current configuration would query.

use anyhow::Result;

use crate::config::Config;
use crate::store::{CollectionInfo, SqliteIndex, VectorIndex};

/// Run the collections command: read the index and print a summary.
pub async fn run_collections(config: &Config) -> Result<()> {
    let index = SqliteIndex::open(&config.db.path).await?;
    let collections = index.list_collections().await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Index:       {}", config.db.path.display());
    println!("Size:        {}", format_bytes(db_size));
    println!("Active:      {}", config.collection.name);
    println!();

    if collections.is_empty() {
        println!("No collections. Run `civic build` first.");
    } else {
        print!("{}", render_table(&collections, &config.collection.name));
    }

    index.close().await;
    Ok(())
}

fn render_table(collections: &[CollectionInfo], active: &str) -> String {
    let mut out = format!(
        "  {:<24} {:>8}   {:<26} {:>5}  {:<7} {:>6} {:>7}   {}\n",
        "COLLECTION", "ENTRIES", "MODEL", "DIMS", "METRIC", "CHUNK", "OVERLAP", "CREATED"
    );
    out.push_str(&format!("  {}\n", "-".repeat(108)));

    for c in collections {
        let marker = if c.name == active { "*" } else { " " };
        let fp = &c.fingerprint;
        out.push_str(&format!(
            "{} {:<24} {:>8}   {:<26} {:>5}  {:<7} {:>6} {:>7}   {}\n",
            marker,
            c.name,
            c.count,
            fp.model,
            fp.dims,
            fp.similarity.as_str(),
            fp.chunk_size,
            fp.overlap,
            format_ts_iso(c.created_at)
        ));
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

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Similarity;
    use crate::store::Fingerprint;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_table_marks_active_collection() {
        let info = |name: &str| CollectionInfo {
            name: name.to_string(),
            fingerprint: Fingerprint {
                model: "multilingual-e5-base".into(),
                dims: 768,
                similarity: Similarity::Cosine,
                chunk_size: 1024,
                overlap: 200,
            },
            created_at: 0,
            count: 42,
        };
        let table = render_table(&[info("public_admin_kb"), info("public_services_kb")], "public_services_kb");
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[2].starts_with("  public_admin_kb"));
        assert!(lines[3].starts_with("* public_services_kb"));
        assert!(lines[3].contains("multilingual-e5-base"));
        assert!(lines[3].contains("1970-01-01 00:00"));
    }
}
