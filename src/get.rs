//! Nomenclature entry lookup by code.
//!
//! Used by the `ncm get` CLI command and the `GET /ncm/{code}` endpoint.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::db;
use crate::models::NomenclatureEntry;
use crate::ncm;
use crate::store::{NomenclatureStore, SqliteStore};

/// Resolve a raw code (dotted or not) and load the entry.
///
/// `Ok(None)` when the code is well formed but not indexed.
pub async fn find_entry(
    store: &dyn NomenclatureStore,
    raw_code: &str,
) -> Result<Option<NomenclatureEntry>> {
    let Some(code) = ncm::canonical_code(raw_code) else {
        bail!("invalid NCM code: {}", raw_code);
    };
    store.get_entry(&code).await
}

/// CLI entry point: look up an entry and print it to stdout.
pub async fn run_get(config: &Config, raw_code: &str, json: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);

    let found = find_entry(&store, raw_code).await;
    store.pool().close().await;

    let Some(entry) = found? else {
        bail!("entry not found: {}", raw_code);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
        return Ok(());
    }

    println!("--- NCM Entry ---");
    println!("code:        {}", entry.code);
    println!("chapter:     {}", entry.chapter);
    println!(
        "section:     {}",
        entry.section.as_deref().unwrap_or("(unknown)")
    );
    println!();
    println!("{}", entry.description);
    if let Some(ref notes) = entry.notes {
        println!();
        println!("--- Notes ---");
        println!("{}", notes);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    #[tokio::test]
    async fn test_find_entry_accepts_undotted_code() {
        let store = InMemoryStore::new();
        let entry = NomenclatureEntry::new("8471.30.12", "Portable computers", None).unwrap();
        store.insert_entries(&[entry]).await.unwrap();

        let found = find_entry(&store, "84713012").await.unwrap().unwrap();
        assert_eq!(found.code, "8471.30.12");
        assert!(find_entry(&store, "8471.30.19").await.unwrap().is_none());
        assert!(find_entry(&store, "not-a-code").await.is_err());
    }
}
