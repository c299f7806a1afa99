use crate::db::models::FileRecord;
use chrono::{DateTime, NaiveDateTime, Utc};
use duckdb::{params, Connection, Result as DbResult, Row};

const FILE_COLUMNS: &str =
    "key, pathname, content_type, size, CAST(uploaded_at AS VARCHAR)";

pub struct DbService;

impl DbService {
    fn row_to_file(row: &Row) -> DbResult<FileRecord> {
        // Timestamps are selected AS VARCHAR; DuckDB renders them without a zone.
        let uploaded_str: String = row.get(4)?;
        let uploaded_at = parse_timestamp(&uploaded_str).unwrap_or_else(Utc::now);

        Ok(FileRecord {
            key: row.get(0)?,
            pathname: row.get(1)?,
            content_type: row.get(2)?,
            size: row.get(3)?,
            uploaded_at,
        })
    }

    pub fn insert_file(
        conn: &Connection,
        key: &str,
        pathname: &str,
        content_type: &str,
        size: i64,
    ) -> DbResult<FileRecord> {
        conn.execute(
            "INSERT INTO files (key, pathname, content_type, size) VALUES (?, ?, ?, ?)",
            params![key, pathname, content_type, size],
        )?;

        Self::get_file(conn, key)?.ok_or(duckdb::Error::QueryReturnedNoRows)
    }

    pub fn get_file(conn: &Connection, key: &str) -> DbResult<Option<FileRecord>> {
        let sql = format!("SELECT {} FROM files WHERE key = ?", FILE_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query_map(params![key], Self::row_to_file)?;

        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    pub fn list_files(conn: &Connection, limit: usize, offset: usize) -> DbResult<Vec<FileRecord>> {
        let sql = format!(
            "SELECT {} FROM files ORDER BY uploaded_at DESC, key ASC LIMIT ? OFFSET ?",
            FILE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit as i64, offset as i64], Self::row_to_file)?;

        let mut files = Vec::new();
        for row in rows {
            files.push(row?);
        }
        Ok(files)
    }

    /// Returns whether a row was removed.
    pub fn delete_file(conn: &Connection, key: &str) -> DbResult<bool> {
        let removed = conn.execute("DELETE FROM files WHERE key = ?", params![key])?;
        Ok(removed > 0)
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
        .or_else(|| raw.parse::<DateTime<Utc>>().ok())
}
