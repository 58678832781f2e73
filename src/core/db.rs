use crate::core::error;
use crate::core::schemas;
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};

pub fn db_connect(db_path: &str) -> Result<Connection, error::RaasError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .map_err(error::RaasError::RusqliteError)?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))
        .map_err(error::RaasError::RusqliteError)?;
    conn.execute("PRAGMA foreign_keys=ON;", [])
        .map_err(error::RaasError::RusqliteError)?;
    Ok(conn)
}

pub fn corpus_db_path(root: &Path) -> PathBuf {
    root.join(schemas::CORPUS_DB_NAME)
}

pub fn initialize_corpus_db(root: &Path) -> Result<(), error::RaasError> {
    fs::create_dir_all(root).map_err(error::RaasError::IoError)?;
    let conn = db_connect(&corpus_db_path(root).to_string_lossy())?;
    ensure_schema(&conn)?;
    Ok(())
}

pub fn ensure_schema(conn: &Connection) -> Result<(), error::RaasError> {
    conn.execute(schemas::CORPUS_DB_SCHEMA_META, [])?;

    let current: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .map_or_else(
            |e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(error::RaasError::RusqliteError(other)),
            },
            |v| Ok(Some(v)),
        )?;

    let current_version: u32 = current
        .as_deref()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(0);

    if current_version >= schemas::CORPUS_SCHEMA_VERSION {
        return Ok(());
    }

    for stmt in schemas::CORPUS_DB_SCHEMA_ALL {
        conn.execute(stmt, [])?;
    }

    conn.execute(
        "INSERT INTO meta(key, value) VALUES('schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [schemas::CORPUS_SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}
