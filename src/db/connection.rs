use crate::config::DatabaseConfig;
use duckdb::{Connection, Result as DbResult};
use std::sync::{Arc, Mutex};
use tracing::info;

pub type DbPool = Arc<Mutex<Connection>>;

pub(crate) const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    key VARCHAR PRIMARY KEY,
    pathname VARCHAR NOT NULL,
    content_type VARCHAR NOT NULL,
    size BIGINT NOT NULL,
    uploaded_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_files_uploaded ON files(uploaded_at);
"#;

pub fn get_connection(config: &DatabaseConfig) -> DbResult<DbPool> {
    info!("Connecting to DuckDB at {}", config.path);
    let conn = if config.path == ":memory:" {
        Connection::open_in_memory()?
    } else {
        Connection::open(&config.path)?
    };

    init_schema(&conn)?;

    Ok(Arc::new(Mutex::new(conn)))
}

pub fn init_schema(conn: &Connection) -> DbResult<()> {
    info!("Initializing database schema");
    conn.execute_batch(SCHEMA)?;
    Ok(())
}
