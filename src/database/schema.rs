use sqlx::{
    Pool, Sqlite,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::str::FromStr;
use tracing::{info, instrument};

use crate::error::AppError;

pub const CURRENT_SCHEMA: &str = r#"
PRAGMA foreign_keys = 1;

CREATE TABLE IF NOT EXISTS students (
    name TEXT PRIMARY KEY NOT NULL,
    password TEXT NOT NULL,
    class TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS scores (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    subject TEXT NOT NULL,
    score INTEGER NOT NULL,
    FOREIGN KEY (name) REFERENCES students (name) ON UPDATE CASCADE ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_scores_name ON scores (name);
CREATE INDEX IF NOT EXISTS idx_scores_subject_score ON scores (subject, score);
"#;

/// Opens a pool with foreign keys enforced on every connection, creating the
/// database file when it does not exist yet.
#[instrument]
pub async fn connect_pool(database_url: &str, max_connections: u32) -> Result<Pool<Sqlite>, AppError> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    Ok(pool)
}

#[instrument(skip(pool))]
pub async fn init_schema(pool: &Pool<Sqlite>) -> Result<(), AppError> {
    info!("Applying database schema");
    sqlx::raw_sql(CURRENT_SCHEMA).execute(pool).await?;
    Ok(())
}
