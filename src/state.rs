use crate::error::{PipelineError, Result};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Row-level changes between the previous and current snapshot. The three
/// lists are disjoint; computed once per run, never persisted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiffResult {
    pub new: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
}

impl DiffResult {
    pub fn has_changes(&self) -> bool {
        !(self.new.is_empty() && self.updated.is_empty() && self.removed.is_empty())
    }
}

/// Persisted `pk -> hash` mapping, one table per dataset, representing the
/// last snapshot that went through change detection.
///
/// The commit here and the artifact publication that follows are two separate
/// steps. A crash between them leaves published outputs one snapshot behind
/// this table until the next successful run, and that run's diff will
/// under-report the already-committed changes. Known limitation, inherited
/// from the reference behavior.
pub struct ChangeStore {
    conn: Connection,
}

impl ChangeStore {
    /// Open (or create) the state database, creating parent directories.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Ok(Self { conn })
    }

    /// Diff the current snapshot against the persisted table and commit the
    /// new snapshot, all in one transaction. `current` must hold one entry
    /// per identity key (the pipeline dedupes last-wins beforehand). After a
    /// successful call the table equals exactly the current snapshot; on
    /// failure it is left at the old one.
    pub fn diff_and_commit(
        &mut self,
        dataset: &str,
        current: &[(String, String)],
    ) -> Result<DiffResult> {
        let table = table_ident(dataset)?;
        let tx = self.conn.transaction()?;
        tx.execute(
            &format!("CREATE TABLE IF NOT EXISTS {table} (pk TEXT PRIMARY KEY, hash TEXT NOT NULL)"),
            [],
        )?;

        let mut existing: HashMap<String, String> = HashMap::new();
        {
            let mut stmt = tx.prepare(&format!("SELECT pk, hash FROM {table}"))?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                existing.insert(row.get(0)?, row.get(1)?);
            }
        }

        let mut diff = DiffResult::default();
        let mut seen: HashSet<&str> = HashSet::new();
        for (pk, hash) in current {
            seen.insert(pk.as_str());
            match existing.get(pk) {
                None => diff.new.push(pk.clone()),
                Some(old) if old != hash => diff.updated.push(pk.clone()),
                Some(_) => {}
            }
        }
        diff.removed = existing
            .keys()
            .filter(|pk| !seen.contains(pk.as_str()))
            .cloned()
            .collect();
        // HashMap iteration order is unstable; keep the delta manifest deterministic
        diff.removed.sort();

        {
            let mut upsert = tx.prepare(&format!(
                "INSERT OR REPLACE INTO {table} (pk, hash) VALUES (?1, ?2)"
            ))?;
            for (pk, hash) in current {
                upsert.execute(params![pk, hash])?;
            }
            let mut delete = tx.prepare(&format!("DELETE FROM {table} WHERE pk = ?1"))?;
            for pk in &diff.removed {
                delete.execute(params![pk])?;
            }
        }
        tx.commit()?;
        Ok(diff)
    }

    /// Current contents of a dataset's table, for inspection and tests.
    pub fn snapshot(&self, dataset: &str) -> Result<HashMap<String, String>> {
        let table = table_ident(dataset)?;
        let exists: bool = self.conn.query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |row| row.get(0),
        )?;
        if !exists {
            return Ok(HashMap::new());
        }
        let mut stmt = self.conn.prepare(&format!("SELECT pk, hash FROM {table}"))?;
        let mut rows = stmt.query([])?;
        let mut snapshot = HashMap::new();
        while let Some(row) = rows.next()? {
            snapshot.insert(row.get(0)?, row.get(1)?);
        }
        Ok(snapshot)
    }
}

/// Dataset names double as table names; restrict them to plain identifiers
/// since they are interpolated into SQL.
fn table_ident(name: &str) -> Result<String> {
    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(PipelineError::Persistence(format!(
            "invalid dataset table name: {name:?}"
        )));
    }
    Ok(name.to_string())
}
