use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

use crate::error::IndexError;

/// Database file name inside the index directory.
pub const DB_FILE_NAME: &str = "dac.sqlite";

/// Open the SQLite store backing the vector index and snapshot.
///
/// A store that cannot be opened is [`IndexError::Unavailable`] — callers
/// surface this distinctly from an empty result set.
pub async fn connect(index_dir: &Path) -> Result<SqlitePool, IndexError> {
    std::fs::create_dir_all(index_dir)
        .map_err(|e| IndexError::Unavailable(format!("{}: {}", index_dir.display(), e)))?;

    let db_path = index_dir.join(DB_FILE_NAME);
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))
        .map_err(|e| IndexError::Unavailable(e.to_string()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(|e| IndexError::Unavailable(format!("{}: {}", db_path.display(), e)))
}
