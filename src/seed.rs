//! Bulk load and administrative correction of nomenclature entries.
//!
//! The seed dataset is a JSON array of `{code, description, chapter?, notes?}`
//! records. Records are validated and normalized into [`NomenclatureEntry`]
//! values, then inserted in batches of `seed.batch_size`. Codes already in
//! the index are left untouched, so seeding the same file twice is a no-op.

use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::path::Path;

use crate::config::Config;
use crate::db;
use crate::models::{NomenclatureEntry, SeedRecord};
use crate::ncm;
use crate::store::{NomenclatureStore, SqliteStore};

/// Counts from one seed run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SeedReport {
    pub read: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub invalid: usize,
}

/// Read a seed dataset from disk.
pub fn read_seed_file(path: &Path) -> Result<Vec<SeedRecord>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read seed file: {}", path.display()))?;
    let records: Vec<SeedRecord> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse seed file: {}", path.display()))?;
    Ok(records)
}

/// Turn raw records into entries.
///
/// Returns the valid entries (first occurrence of each code wins) and the
/// number of records rejected for a bad code or a blank description.
pub fn prepare_entries(records: Vec<SeedRecord>) -> (Vec<NomenclatureEntry>, usize) {
    let mut entries = Vec::with_capacity(records.len());
    let mut invalid = 0usize;

    for record in records {
        if record.description.trim().is_empty() {
            tracing::warn!(code = %record.code, "skipping seed record with blank description");
            invalid += 1;
            continue;
        }
        let Some(entry) = NomenclatureEntry::new(&record.code, &record.description, record.notes)
        else {
            tracing::warn!(code = %record.code, "skipping seed record with invalid code");
            invalid += 1;
            continue;
        };

        if let Some(chapter) = record.chapter.as_deref().map(str::trim) {
            let given = ncm::code_digits(chapter).unwrap_or_else(|| chapter.to_string());
            if given != entry.chapter {
                tracing::warn!(
                    code = %entry.code,
                    dataset_chapter = %chapter,
                    derived_chapter = %entry.chapter,
                    "chapter in dataset disagrees with code, using the code"
                );
            }
        }

        entries.push(entry);
    }

    (entries, invalid)
}

/// Insert records into `store` in batches of `batch_size`.
pub async fn seed_entries(
    store: &dyn NomenclatureStore,
    records: Vec<SeedRecord>,
    batch_size: usize,
) -> Result<SeedReport> {
    let read = records.len();
    let (entries, invalid) = prepare_entries(records);

    let mut seen = HashSet::new();
    let unique: Vec<NomenclatureEntry> = entries
        .into_iter()
        .filter(|e| seen.insert(e.code.clone()))
        .collect();

    let valid = read - invalid;
    let mut inserted = 0usize;
    for batch in unique.chunks(batch_size.max(1)) {
        inserted += store.insert_entries(batch).await?;
        tracing::debug!(inserted, total = valid, "seed batch written");
    }

    Ok(SeedReport {
        read,
        inserted,
        duplicates: valid - inserted,
        invalid,
    })
}

pub async fn run_seed(config: &Config, path: &Path) -> Result<()> {
    let records = read_seed_file(path)?;
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);

    let report = seed_entries(&store, records, config.seed.batch_size).await?;

    println!("seed {}", path.display());
    println!("  records read: {}", report.read);
    println!("  inserted: {}", report.inserted);
    println!("  duplicates skipped: {}", report.duplicates);
    println!("  invalid skipped: {}", report.invalid);
    println!("ok");

    store.pool().close().await;
    Ok(())
}

pub async fn run_correct(
    config: &Config,
    code: &str,
    description: &str,
    notes: Option<&str>,
) -> Result<()> {
    let Some(code) = ncm::canonical_code(code) else {
        bail!("Invalid NCM code: {}", code);
    };
    if description.trim().is_empty() {
        bail!("Description must not be empty");
    }

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);

    if !store.correct_entry(&code, description, notes).await? {
        bail!("No nomenclature entry with code {}", code);
    }
    tracing::info!(code = %code, "description corrected, embedding marked stale");

    println!("corrected {}", code);
    println!("  run `ncm embed pending` to refresh its embedding");

    store.pool().close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn record(code: &str, description: &str) -> SeedRecord {
        SeedRecord {
            code: code.to_string(),
            description: description.to_string(),
            chapter: None,
            notes: None,
        }
    }

    #[test]
    fn test_prepare_rejects_bad_records() {
        let (entries, invalid) = prepare_entries(vec![
            record("8471.30.12", "Computadores portáteis"),
            record("84A1", "Bad code"),
            record("8471.41.00", "   "),
        ]);
        assert_eq!(entries.len(), 1);
        assert_eq!(invalid, 2);
    }

    #[test]
    fn test_prepare_keeps_code_derived_chapter() {
        let mut r = record("0901.21.00", "Café torrado");
        r.chapter = Some("10".to_string());
        let (entries, _) = prepare_entries(vec![r]);
        assert_eq!(entries[0].chapter, "09");
    }

    #[tokio::test]
    async fn test_seed_skips_duplicates() {
        let store = InMemoryStore::new();
        let records = vec![
            record("8471.30.12", "Computadores portáteis"),
            record("84713012", "Duplicate in file"),
            record("8471.30.19", "Outros"),
            record("8517.13.00", "Smartphones"),
        ];
        let report = seed_entries(&store, records.clone(), 2).await.unwrap();
        assert_eq!(
            report,
            SeedReport {
                read: 4,
                inserted: 3,
                duplicates: 1,
                invalid: 0
            }
        );

        let again = seed_entries(&store, records, 2).await.unwrap();
        assert_eq!(again.inserted, 0);
        assert_eq!(again.duplicates, 4);

        let kept = store.get_entry("8471.30.12").await.unwrap().unwrap();
        assert_eq!(kept.description, "Computadores portáteis");
    }

    #[test]
    fn test_read_seed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ncm.json");
        std::fs::write(
            &path,
            r#"[{"code": "0101.21.00", "description": "Reprodutores de raça pura", "chapter": "01"}]"#,
        )
        .unwrap();
        let records = read_seed_file(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].chapter.as_deref(), Some("01"));
    }
}
