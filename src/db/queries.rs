use super::models::AnalysisSummary;
use super::{Database, Result};
use crate::analysis::{AnalysisSnapshot, Field, FieldValue};
use rusqlite::{OptionalExtension, params};
use std::collections::BTreeMap;

impl Database {
    /// Store every populated field of a snapshot in a single transaction.
    /// Fields already cached for the track but absent from the snapshot are
    /// kept. Returns the number of fields written.
    pub fn store_analysis(
        &self,
        snapshot: &AnalysisSnapshot,
        source_path: Option<&str>,
    ) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            "INSERT INTO analyses (track_id, source_path, updated_at)
             VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(track_id) DO UPDATE SET
                source_path = COALESCE(excluded.source_path, analyses.source_path),
                updated_at = datetime('now')",
            params![snapshot.id, source_path],
        )?;

        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO analysis_fields (track_id, field, value, fetched_at)
                 VALUES (?1, ?2, ?3, datetime('now'))
                 ON CONFLICT(track_id, field) DO UPDATE SET
                    value = excluded.value,
                    fetched_at = excluded.fetched_at",
            )?;
            for (field, value) in &snapshot.fields {
                let json = serde_json::to_string(value)?;
                stmt.execute(params![snapshot.id, field.name(), json])?;
            }
        }

        tx.commit()?;
        log::info!(
            "Cached {} fields of {}",
            snapshot.fields.len(),
            snapshot.id
        );
        Ok(snapshot.fields.len())
    }

    /// The cached snapshot of a track, or `None` if it was never stored.
    pub fn load_snapshot(&self, track_id: &str) -> Result<Option<AnalysisSnapshot>> {
        let known: Option<String> = self
            .conn
            .query_row(
                "SELECT track_id FROM analyses WHERE track_id = ?1",
                params![track_id],
                |row| row.get(0),
            )
            .optional()?;
        if known.is_none() {
            return Ok(None);
        }

        let mut stmt = self
            .conn
            .prepare("SELECT field, value FROM analysis_fields WHERE track_id = ?1")?;
        let rows = stmt
            .query_map(params![track_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut fields = BTreeMap::new();
        for (name, json) in rows {
            let Ok(field) = name.parse::<Field>() else {
                log::warn!("Skipping unknown cached field '{name}' of {track_id}");
                continue;
            };
            let value: FieldValue = serde_json::from_str(&json)?;
            fields.insert(field, value);
        }

        log::info!("Loaded {} cached fields of {}", fields.len(), track_id);
        Ok(Some(AnalysisSnapshot {
            id: track_id.to_string(),
            fields,
        }))
    }

    /// Track id previously resolved from `source_path`, if any.
    pub fn find_by_source(&self, source_path: &str) -> Result<Option<String>> {
        let id = self
            .conn
            .query_row(
                "SELECT track_id FROM analyses WHERE source_path = ?1
                 ORDER BY updated_at DESC LIMIT 1",
                params![source_path],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// All cached analyses, most recently updated first.
    pub fn list_analyses(&self) -> Result<Vec<AnalysisSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT a.track_id, a.source_path, COUNT(f.field), a.created_at, a.updated_at
             FROM analyses a
             LEFT JOIN analysis_fields f ON f.track_id = a.track_id
             GROUP BY a.track_id
             ORDER BY a.updated_at DESC, a.track_id",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok(AnalysisSummary {
                    track_id: row.get(0)?,
                    source_path: row.get(1)?,
                    field_count: row.get(2)?,
                    created_at: row.get(3)?,
                    updated_at: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Drop a track and its fields. Returns whether anything was removed.
    pub fn forget_analysis(&self, track_id: &str) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM analyses WHERE track_id = ?1", params![track_id])?;
        Ok(removed > 0)
    }
}
