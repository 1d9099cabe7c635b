use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite, SqliteConnection};
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

use crate::db::{insert_score, insert_student};
use crate::error::AppError;
use crate::models::{MAX_SCORE, RecordKind, Score, Student};
use crate::upload::{discard, prepare_upload};

/// Outcome of one import: how many rows landed and a message for each row
/// that did not.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub imported: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ScoreRow {
    name: String,
    subject: String,
    score: Option<i64>,
}

/// A decoded row, or the message explaining why the row could not be used.
type RowResult<T> = Result<T, String>;

fn read_rows<T>(path: &Path) -> Result<Vec<RowResult<T>>, AppError>
where
    T: for<'de> Deserialize<'de>,
{
    let mut reader = csv::Reader::from_path(path)?;
    let rows = reader
        .deserialize::<T>()
        .enumerate()
        .map(|(index, row)| row.map_err(|e| format!("Row {} could not be read: {}", index + 1, e)))
        .collect();

    Ok(rows)
}

fn score_from_row(row: ScoreRow) -> RowResult<Score> {
    match row.score {
        Some(value) if (0..=MAX_SCORE).contains(&value) => {
            Ok(Score::new(&row.name, &row.subject, value))
        }
        Some(value) => Err(format!(
            "Score {} for Student {} in subject {} is out of range.",
            value, row.name, row.subject
        )),
        None => Err(format!(
            "Score for Student {} in subject {} is missing.",
            row.name, row.subject
        )),
    }
}

trait ImportRow: Sync {
    fn insert_into<'c>(
        &'c self,
        conn: &'c mut SqliteConnection,
    ) -> impl Future<Output = Result<(), AppError>> + Send + 'c;
}

impl ImportRow for Student {
    fn insert_into<'c>(
        &'c self,
        conn: &'c mut SqliteConnection,
    ) -> impl Future<Output = Result<(), AppError>> + Send + 'c {
        insert_student(conn, self)
    }
}

impl ImportRow for Score {
    fn insert_into<'c>(
        &'c self,
        conn: &'c mut SqliteConnection,
    ) -> impl Future<Output = Result<(), AppError>> + Send + 'c {
        insert_score(conn, self)
    }
}

/// Inserts one record in its own transaction. Conflicts roll the row back and
/// come back as a message; anything else stops the import.
async fn insert_row<T: ImportRow>(
    pool: &Pool<Sqlite>,
    record: &T,
) -> Result<Option<String>, AppError> {
    let mut tx = pool.begin().await?;

    match record.insert_into(&mut *tx).await {
        Ok(()) => {
            tx.commit().await?;
            Ok(None)
        }
        Err(AppError::DuplicateKey(msg) | AppError::MissingReference(msg)) => {
            tx.rollback().await?;
            warn!(message = %msg, "Skipping conflicting row");
            Ok(Some(msg))
        }
        Err(e) => Err(e),
    }
}

#[instrument(skip(pool))]
pub async fn import_students(pool: &Pool<Sqlite>, path: &Path) -> Result<ImportReport, AppError> {
    info!("Importing students");
    let rows = run_blocking(path, read_rows::<Student>).await?;
    let mut report = ImportReport::default();

    for row in rows {
        let student = match row {
            Ok(student) => student,
            Err(msg) => {
                report.errors.push(msg);
                continue;
            }
        };

        match insert_row(pool, &student).await? {
            None => report.imported += 1,
            Some(msg) => report.errors.push(msg),
        }
    }

    info!(imported = report.imported, rejected = report.errors.len(), "Student import finished");
    Ok(report)
}

#[instrument(skip(pool))]
pub async fn import_scores(pool: &Pool<Sqlite>, path: &Path) -> Result<ImportReport, AppError> {
    info!("Importing scores");
    let rows = run_blocking(path, read_rows::<ScoreRow>).await?;
    let mut report = ImportReport::default();

    for row in rows {
        let score = match row.and_then(score_from_row) {
            Ok(score) => score,
            Err(msg) => {
                report.errors.push(msg);
                continue;
            }
        };

        match insert_row(pool, &score).await? {
            None => report.imported += 1,
            Some(msg) => report.errors.push(msg),
        }
    }

    info!(imported = report.imported, rejected = report.errors.len(), "Score import finished");
    Ok(report)
}

pub async fn import_file(
    pool: &Pool<Sqlite>,
    path: &Path,
    kind: RecordKind,
) -> Result<ImportReport, AppError> {
    match kind {
        RecordKind::Student => import_students(pool, path).await,
        RecordKind::Score => import_scores(pool, path).await,
    }
}

/// Full pipeline for a saved upload: check and normalize the file, then insert
/// its rows. The file is removed once the import has run.
#[instrument(skip(pool))]
pub async fn process_upload(
    pool: &Pool<Sqlite>,
    path: &Path,
    kind: RecordKind,
) -> Result<ImportReport, AppError> {
    run_blocking(path, move |p| prepare_upload(p, kind)).await?;

    let report = import_file(pool, path, kind).await;
    run_blocking(path, |p| {
        discard(p);
        Ok(())
    })
    .await?;

    report
}

async fn run_blocking<T, F>(path: &Path, work: F) -> Result<T, AppError>
where
    T: Send + 'static,
    F: FnOnce(&Path) -> Result<T, AppError> + Send + 'static,
{
    let path: PathBuf = path.to_path_buf();
    rocket::tokio::task::spawn_blocking(move || work(&path)).await?
}
